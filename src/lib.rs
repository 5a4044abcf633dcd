//! # Symbios Neuroevo
//!
//! A neuroevolution engine: populations of variable-topology neural agents
//! evolved by crossover, mutation and tournament selection against a
//! caller-supplied fitness function.
//!
//! ## Features
//!
//! - **Sparse Indexed Graph**: Neurons are addressed by `(type, index)` and
//!   every connection is stored on both endpoints, edited only through
//!   [`Agent::connect_neurons`] and its removal counterparts
//! - **Genome as View**: An agent's genome is the ordered export of its
//!   connections, the unit exchanged by genetic operators and encoders
//! - **Recurrent Memory**: Memory agents keep hidden values between steps;
//!   plain agents are zeroed every step and pruned of causally dead edges
//! - **Layered Agents**: Fixed hidden-layer partitions wired layer to layer
//! - **Parallel Evaluation**: Agents of one generation are scored through
//!   `rayon` (feature `parallel`, on by default); reproduction stays on one
//!   seeded RNG so runs are reproducible
//!
//! ## Quick Start
//!
//! ```rust
//! use symbios_neuroevo::{AgentShape, DataRow, EvaluationContext, EvolutionConfig, World, Agent};
//!
//! let config = EvolutionConfig::layered().with_seed(42);
//! let mut world = World::new("xor", config).unwrap();
//! world.create_agents(20, &AgentShape::layered(3, vec![3, 2], 1)).unwrap();
//!
//! let data = vec![
//!     DataRow::new(vec![1.0, 0.0, 0.0], vec![0.0]),
//!     DataRow::new(vec![1.0, 0.0, 1.0], vec![1.0]),
//!     DataRow::new(vec![1.0, 1.0, 0.0], vec![1.0]),
//!     DataRow::new(vec![1.0, 1.0, 1.0], vec![0.0]),
//! ];
//! let fitness = |agent: &Agent, row: &DataRow, _: &EvaluationContext<'_>| {
//!     1.0 - (agent.output_values()[0] - row.output[0]).abs()
//! };
//!
//! for _ in 0..5 {
//!     world.next_generation(&fitness, &data, 0.8).unwrap();
//! }
//! assert!(world.best_fitness().unwrap() > 0.0);
//! ```
//!
//! ## Genome Order
//!
//! Genes are exported Hidden neurons first, then Output neurons, each by
//! ascending index, and within a neuron by source type then source index.
//! [`crossover`] grafts the second parent's genes onto a copy of the first
//! parent, while [`dominance`] splices two genomes by position.
//!
//! ## Encodings
//!
//! [`GeneEncoder`] turns genes into text: a 58-bit binary record, the same
//! record in hex, a JSON array, or a human-readable line (encode only).
//! Checkpoints store one genome string per agent per line.

pub mod activation;
pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod encoder;
pub mod error;
pub mod gene;
pub mod genetic;
pub mod neuron;
pub mod world;

// Re-exports for convenience
pub use activation::Activation;
pub use agent::{Agent, AgentSummary};
pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::{EvolutionConfig, MutationRates};
pub use encoder::{decode_genome, encode_genome, GeneEncoder};
pub use error::{EvolutionError, Result};
pub use gene::{Gene, NeuronKey, NeuronType, MAX_NEURON_INDEX, MAX_WEIGHT};
pub use genetic::{crossover, dominance, mutate, translocation};
pub use neuron::Neuron;
pub use world::{AgentShape, DataRow, EvaluationContext, Fitness, StepOptions, StopCondition, World};
