//! Gene-level building blocks: neuron roles, neuron addresses and the
//! connection record exchanged by encoders and genetic operators.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EvolutionError, Result};

/// Largest absolute connection weight.
///
/// `MAX_WEIGHT * 10^6` is `0xFF_FFFF`, so a shifted weight fits the 24-bit
/// field of the binary gene encoding.
pub const MAX_WEIGHT: f64 = 8.388607;

/// Largest neuron index within one neuron type.
pub const MAX_NEURON_INDEX: u16 = u16::MAX;

/// Weights are sampled and encoded in millionths.
pub(crate) const WEIGHT_SCALE: f64 = 1_000_000.0;

/// The role of a neuron in an agent.
///
/// Variant order is significant: adjacency maps and genome export iterate
/// source neurons grouped Input, Hidden, Output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NeuronType {
    /// Receives an external value; nothing feeds it.
    Input,
    /// Internal neuron grown by evolution.
    Hidden,
    /// Produces an external value; feeds nothing.
    Output,
}

impl NeuronType {
    /// Numeric code used by the JSON encoding.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Input => 0,
            Self::Hidden => 1,
            Self::Output => 2,
        }
    }

    /// Inverse of [`code`](Self::code).
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Input),
            1 => Some(Self::Hidden),
            2 => Some(Self::Output),
            _ => None,
        }
    }

    /// Whether an edge from `self` to `to` is structurally legal.
    ///
    /// Input to Input, Output to Output and Hidden to Input are rejected.
    /// Output never sources an edge, so Output to Input/Hidden is rejected too.
    #[must_use]
    pub fn can_feed(self, to: NeuronType) -> bool {
        !matches!(
            (self, to),
            (Self::Input, Self::Input)
                | (Self::Output, _)
                | (Self::Hidden, Self::Input)
        )
    }
}

impl fmt::Display for NeuronType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Hidden => "hidden",
            Self::Output => "output",
        })
    }
}

/// Address of a neuron inside an agent: its type plus its per-type index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NeuronKey {
    pub kind: NeuronType,
    pub index: u16,
}

impl NeuronKey {
    #[must_use]
    pub const fn new(kind: NeuronType, index: u16) -> Self {
        Self { kind, index }
    }

    #[must_use]
    pub const fn input(index: u16) -> Self {
        Self::new(NeuronType::Input, index)
    }

    #[must_use]
    pub const fn hidden(index: u16) -> Self {
        Self::new(NeuronType::Hidden, index)
    }

    #[must_use]
    pub const fn output(index: u16) -> Self {
        Self::new(NeuronType::Output, index)
    }
}

impl fmt::Display for NeuronKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.index)
    }
}

/// One directed, weighted connection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    pub from: NeuronKey,
    pub to: NeuronKey,
    pub weight: f64,
}

impl Gene {
    #[must_use]
    pub const fn new(from: NeuronKey, to: NeuronKey, weight: f64) -> Self {
        Self { from, to, weight }
    }

    /// Check weight range and connection direction without touching any agent.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::WeightOutOfRange`] or [`EvolutionError::InvalidTopology`].
    pub fn validate(&self) -> Result<()> {
        check_weight(self.weight)?;
        if !self.from.kind.can_feed(self.to.kind) {
            return Err(EvolutionError::InvalidTopology {
                from: self.from.kind,
                to: self.to.kind,
            });
        }
        Ok(())
    }
}

/// Reject weights outside `[-MAX_WEIGHT, MAX_WEIGHT]`.
///
/// # Errors
///
/// [`EvolutionError::WeightOutOfRange`] for out-of-range or non-finite weights.
pub fn check_weight(weight: f64) -> Result<()> {
    if weight.is_finite() && (-MAX_WEIGHT..=MAX_WEIGHT).contains(&weight) {
        Ok(())
    } else {
        Err(EvolutionError::WeightOutOfRange {
            weight,
            max: MAX_WEIGHT,
        })
    }
}

/// Convert a caller-supplied index into a neuron index.
///
/// # Errors
///
/// [`EvolutionError::IndexOutOfRange`] past [`MAX_NEURON_INDEX`].
pub fn check_index(index: usize) -> Result<u16> {
    u16::try_from(index).map_err(|_| EvolutionError::IndexOutOfRange {
        index,
        max: MAX_NEURON_INDEX,
    })
}

/// Uniform random weight in `[-MAX_WEIGHT, MAX_WEIGHT]`, quantized to 1e-6.
pub fn random_weight<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let limit = (MAX_WEIGHT * WEIGHT_SCALE).round() as i64;
    rng.random_range(-limit..=limit) as f64 / WEIGHT_SCALE
}
