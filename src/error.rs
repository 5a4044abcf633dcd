//! Error taxonomy for the evolution engine.
//!
//! Structural and range violations are rejected at the call site and never
//! coerced. Mutation sub-steps that find nothing to act on are not errors and
//! never reach this type.

use std::path::PathBuf;

use thiserror::Error;

use crate::gene::NeuronType;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EvolutionError>;

/// Errors raised by agents, operators, encoders and the world loop.
#[derive(Error, Debug)]
pub enum EvolutionError {
    /// A neuron index outside `0..=MAX_NEURON_INDEX`.
    #[error("neuron index {index} is out of the allowed range 0..={max}")]
    IndexOutOfRange { index: usize, max: u16 },

    /// A connection weight outside `[-MAX_WEIGHT, MAX_WEIGHT]` (or not finite).
    #[error("weight {weight} is out of the allowed range of +-{max}")]
    WeightOutOfRange { weight: f64, max: f64 },

    /// An illegal connection direction, e.g. input to input.
    #[error("cannot connect {from} to {to}")]
    InvalidTopology { from: NeuronType, to: NeuronType },

    /// `Agent::step` received fewer values than the agent has inputs.
    #[error("expected {expected} input values, got {actual}")]
    InputLength { expected: usize, actual: usize },

    /// Crossover and mutation kept producing empty genomes.
    #[error(
        "reproduction produced an empty genome {attempts} times in a row\nparent a:{parent_a}\nparent b:{parent_b}"
    )]
    DegenerateReproduction {
        attempts: usize,
        parent_a: String,
        parent_b: String,
    },

    /// The encoder is one-way and cannot turn text back into genes.
    #[error("the {0} encoder does not support decoding")]
    UnsupportedDecode(&'static str),

    /// An encoded gene could not be parsed.
    #[error("malformed gene {gene:?}: {reason}")]
    MalformedGene { gene: String, reason: String },

    /// Configuration values that cannot drive a run.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A world needs at least two agents to reproduce.
    #[error("the world cannot have only {0} agent(s); population must be greater than 1")]
    PopulationTooSmall(usize),

    /// A checkpoint that was asked for does not exist.
    #[error("checkpoint not found: {}", .0.display())]
    MissingCheckpoint(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
