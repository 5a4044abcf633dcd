//! Run configuration threaded through [`World`](crate::World) and the genetic
//! operators.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::encoder::{GeneEncoder, DEFAULT_GENE_SEPARATOR};
use crate::error::{EvolutionError, Result};

/// Per-offspring mutation probabilities.
///
/// Each probability is rolled independently with 1/10000 granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationRates {
    /// Probability of resampling connection weights.
    pub weight: f64,
    /// Number of weights resampled when the weight mutation fires.
    pub weight_count: usize,
    /// Probability of growing a hidden neuron.
    pub add_neuron: f64,
    /// Probability of adding one missing legal connection.
    pub add_connection: f64,
    /// Probability of removing a hidden neuron.
    pub delete_neuron: f64,
    /// Probability of removing one connection.
    pub delete_connection: f64,
}

impl Default for MutationRates {
    fn default() -> Self {
        Self {
            weight: 0.4,
            weight_count: 1,
            add_neuron: 0.04,
            add_connection: 0.1,
            delete_neuron: 0.04,
            delete_connection: 0.1,
        }
    }
}

impl MutationRates {
    /// Weight perturbation only, no structural change.
    #[must_use]
    pub fn weights_only(weight: f64, weight_count: usize) -> Self {
        Self {
            weight,
            weight_count,
            add_neuron: 0.0,
            add_connection: 0.0,
            delete_neuron: 0.0,
            delete_connection: 0.0,
        }
    }

    fn probabilities(&self) -> [(&'static str, f64); 5] {
        [
            ("mutation.weight", self.weight),
            ("mutation.add_neuron", self.add_neuron),
            ("mutation.add_connection", self.add_connection),
            ("mutation.delete_neuron", self.delete_neuron),
            ("mutation.delete_connection", self.delete_connection),
        ]
    }
}

/// Configuration of an evolutionary run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Probability that each of the second parent's genes is grafted.
    pub crossover_probability: f64,
    pub mutation: MutationRates,
    /// Activation applied by every Hidden and Output neuron.
    pub activation: Activation,
    /// Save the whole population every this many generations; 0 disables.
    /// Ignored while the world has no checkpoint store.
    pub autosave_every: u64,
    /// Directory for file checkpoints. Without one no checkpoints are written
    /// unless a store is attached explicitly.
    pub checkpoint_dir: Option<PathBuf>,
    pub checkpoint_encoder: GeneEncoder,
    pub gene_separator: String,
    /// Retries before reproduction gives up on a pair of parents.
    pub max_reproduction_attempts: usize,
    /// Seed for the world RNG; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            crossover_probability: 0.5,
            mutation: MutationRates::default(),
            activation: Activation::Sigmoid,
            autosave_every: 0,
            checkpoint_dir: None,
            checkpoint_encoder: GeneEncoder::Hex,
            gene_separator: DEFAULT_GENE_SEPARATOR.to_string(),
            max_reproduction_attempts: 100,
            seed: None,
        }
    }
}

impl EvolutionConfig {
    /// Free-form topology growth for dynamic agents.
    #[must_use]
    pub fn dynamic() -> Self {
        Self {
            autosave_every: 10,
            ..Default::default()
        }
    }

    /// Weight-only evolution for agents with fixed hidden layers.
    #[must_use]
    pub fn layered() -> Self {
        Self {
            mutation: MutationRates::weights_only(0.4, 2),
            autosave_every: 200,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check every field before a run starts.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let probabilities = std::iter::once(("crossover_probability", self.crossover_probability))
            .chain(self.mutation.probabilities());
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(EvolutionError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }
        if self.max_reproduction_attempts == 0 {
            return Err(EvolutionError::InvalidConfig(
                "max_reproduction_attempts must be at least 1".into(),
            ));
        }
        if self.gene_separator.is_empty() {
            return Err(EvolutionError::InvalidConfig(
                "gene_separator must not be empty".into(),
            ));
        }
        if self.gene_separator.contains('\n') {
            return Err(EvolutionError::InvalidConfig(
                "gene_separator must not contain a newline".into(),
            ));
        }
        if self.checkpoint_encoder == GeneEncoder::Human {
            return Err(EvolutionError::InvalidConfig(
                "checkpoint_encoder must be decodable".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON config; missing fields take defaults.
    ///
    /// # Errors
    ///
    /// JSON syntax errors or [`EvolutionError::InvalidConfig`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file.
    ///
    /// # Errors
    ///
    /// I/O errors plus everything [`from_json_str`](Self::from_json_str) rejects.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
