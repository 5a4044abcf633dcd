//! Textual gene encodings.
//!
//! A genome string is its genes encoded one by one and joined with a
//! separator (`;` by default). A world dump is one genome string per line.
//!
//! | Encoder | Layout | Decodable |
//! |---------|--------|-----------|
//! | Binary  | `from(1) from_index(16) to(1) to_index(16) weight(24)` bitstring | yes |
//! | Hex     | the binary record as one base-16 number | yes |
//! | Json    | `[from_type, from_index, to_type, to_index, weight]` | yes |
//! | Human   | `From input 2 to neuron 3 weight 1.5` | no |

use serde::{Deserialize, Serialize};

use crate::error::{EvolutionError, Result};
use crate::gene::{Gene, NeuronKey, NeuronType, MAX_WEIGHT, WEIGHT_SCALE};

/// Number of bits in one binary gene record.
pub const BINARY_GENE_BITS: usize = 58;

const INDEX_BITS: usize = 16;
const WEIGHT_BITS: usize = 24;

/// Default separator between genes of one genome.
pub const DEFAULT_GENE_SEPARATOR: &str = ";";

/// Separator between genomes in a world dump.
pub const GENOME_SEPARATOR: &str = "\n";

/// A stateless gene encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GeneEncoder {
    /// 58-character bitstring.
    #[default]
    Binary,
    /// The binary record in base 16.
    Hex,
    /// Five-element JSON array.
    Json,
    /// Diagnostic text, encode only.
    Human,
}

impl GeneEncoder {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Hex => "hex",
            Self::Json => "json",
            Self::Human => "human",
        }
    }

    /// Encode a single gene.
    #[must_use]
    pub fn encode(self, gene: &Gene) -> String {
        match self {
            Self::Binary => format!("{:0width$b}", pack(gene), width = BINARY_GENE_BITS),
            Self::Hex => format!("{:x}", pack(gene)),
            Self::Json => {
                let record = (
                    gene.from.kind.code(),
                    gene.from.index,
                    gene.to.kind.code(),
                    gene.to.index,
                    gene.weight,
                );
                // A tuple of integers and a float always serializes; NaN becomes `null`.
                serde_json::to_string(&record).unwrap_or_default()
            }
            Self::Human => format!(
                "From {} {} to {} {} weight {}",
                if gene.from.kind == NeuronType::Input {
                    "input"
                } else {
                    "neuron"
                },
                gene.from.index,
                if gene.to.kind == NeuronType::Hidden {
                    "neuron"
                } else {
                    "output"
                },
                gene.to.index,
                gene.weight
            ),
        }
    }

    /// Decode a single gene.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::MalformedGene`] for unparsable text and
    /// [`EvolutionError::UnsupportedDecode`] for the human encoder.
    pub fn decode(self, encoded: &str) -> Result<Gene> {
        let encoded = encoded.trim();
        match self {
            Self::Binary => {
                if encoded.len() != BINARY_GENE_BITS {
                    return Err(malformed(
                        encoded,
                        format!("expected {BINARY_GENE_BITS} bits, got {}", encoded.len()),
                    ));
                }
                let packed = u64::from_str_radix(encoded, 2)
                    .map_err(|e| malformed(encoded, e.to_string()))?;
                Ok(unpack(packed))
            }
            Self::Hex => {
                let packed = u64::from_str_radix(encoded, 16)
                    .map_err(|e| malformed(encoded, e.to_string()))?;
                if packed >> BINARY_GENE_BITS != 0 {
                    return Err(malformed(
                        encoded,
                        format!("value exceeds {BINARY_GENE_BITS} bits"),
                    ));
                }
                Ok(unpack(packed))
            }
            Self::Json => {
                let (from_type, from_index, to_type, to_index, weight): (u8, u16, u8, u16, f64) =
                    serde_json::from_str(encoded).map_err(|e| malformed(encoded, e.to_string()))?;
                let kind = |code| {
                    NeuronType::from_code(code)
                        .ok_or_else(|| malformed(encoded, format!("unknown neuron type {code}")))
                };
                Ok(Gene::new(
                    NeuronKey::new(kind(from_type)?, from_index),
                    NeuronKey::new(kind(to_type)?, to_index),
                    weight,
                ))
            }
            Self::Human => Err(EvolutionError::UnsupportedDecode(self.name())),
        }
    }
}

/// Join encoded genes with `separator`.
#[must_use]
pub fn encode_genome(genes: &[Gene], encoder: GeneEncoder, separator: &str) -> String {
    genes
        .iter()
        .map(|gene| encoder.encode(gene))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Split `encoded` on `separator` and decode each non-empty piece.
///
/// # Errors
///
/// The first decoding error encountered.
pub fn decode_genome(encoded: &str, encoder: GeneEncoder, separator: &str) -> Result<Vec<Gene>> {
    encoded
        .split(separator)
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(|piece| encoder.decode(piece))
        .collect()
}

fn malformed(gene: &str, reason: String) -> EvolutionError {
    EvolutionError::MalformedGene {
        gene: gene.to_string(),
        reason,
    }
}

fn pack(gene: &Gene) -> u64 {
    let from_bit = u64::from(gene.from.kind != NeuronType::Input);
    let to_bit = u64::from(gene.to.kind == NeuronType::Output);
    let weight = quantize_weight(gene.weight);

    (from_bit << (BINARY_GENE_BITS - 1))
        | (u64::from(gene.from.index) << (1 + INDEX_BITS + WEIGHT_BITS))
        | (to_bit << (INDEX_BITS + WEIGHT_BITS))
        | (u64::from(gene.to.index) << WEIGHT_BITS)
        | weight
}

fn unpack(packed: u64) -> Gene {
    let index_mask = (1u64 << INDEX_BITS) - 1;
    let weight_mask = (1u64 << WEIGHT_BITS) - 1;

    let from_kind = if (packed >> (BINARY_GENE_BITS - 1)) & 1 == 0 {
        NeuronType::Input
    } else {
        NeuronType::Hidden
    };
    let from_index = (packed >> (1 + INDEX_BITS + WEIGHT_BITS)) & index_mask;
    let to_kind = if (packed >> (INDEX_BITS + WEIGHT_BITS)) & 1 == 0 {
        NeuronType::Hidden
    } else {
        NeuronType::Output
    };
    let to_index = (packed >> WEIGHT_BITS) & index_mask;
    let stored = packed & weight_mask;

    // 24 bits can hold one step past 2 * MAX_WEIGHT
    let weight = (stored as f64 / WEIGHT_SCALE - MAX_WEIGHT).clamp(-MAX_WEIGHT, MAX_WEIGHT);

    Gene::new(
        NeuronKey::new(from_kind, from_index as u16),
        NeuronKey::new(to_kind, to_index as u16),
        weight,
    )
}

fn quantize_weight(weight: f64) -> u64 {
    let clamped = if weight.is_nan() {
        0.0
    } else {
        weight.clamp(-MAX_WEIGHT, MAX_WEIGHT)
    };
    ((clamped + MAX_WEIGHT) * WEIGHT_SCALE).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::random_weight;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn sample_genes() -> Vec<Gene> {
        vec![
            Gene::new(NeuronKey::input(0), NeuronKey::hidden(0), 1.5),
            Gene::new(NeuronKey::input(2), NeuronKey::output(1), -MAX_WEIGHT),
            Gene::new(NeuronKey::hidden(3), NeuronKey::hidden(3), MAX_WEIGHT),
            Gene::new(NeuronKey::hidden(65535), NeuronKey::output(65535), 0.0),
        ]
    }

    #[test]
    fn test_binary_layout() {
        let gene = Gene::new(NeuronKey::input(1), NeuronKey::output(2), -MAX_WEIGHT);
        let bits = GeneEncoder::Binary.encode(&gene);
        assert_eq!(bits.len(), BINARY_GENE_BITS);
        assert_eq!(&bits[0..1], "0");
        assert_eq!(&bits[1..17], "0000000000000001");
        assert_eq!(&bits[17..18], "1");
        assert_eq!(&bits[18..34], "0000000000000010");
        assert_eq!(&bits[34..], "0".repeat(24));
    }

    #[test]
    fn test_binary_and_hex_preserve_structure() {
        for encoder in [GeneEncoder::Binary, GeneEncoder::Hex] {
            for gene in sample_genes() {
                let decoded = encoder.decode(&encoder.encode(&gene)).unwrap();
                assert_eq!(decoded.from, gene.from, "{encoder:?}");
                assert_eq!(decoded.to, gene.to, "{encoder:?}");
                assert!((decoded.weight - gene.weight).abs() <= 1e-6, "{encoder:?}");
            }
        }
    }

    #[test]
    fn test_weight_quantization_floor() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..500 {
            let weight = rng.random_range(-MAX_WEIGHT..=MAX_WEIGHT);
            let gene = Gene::new(NeuronKey::hidden(1), NeuronKey::output(0), weight);
            let decoded = GeneEncoder::Hex
                .decode(&GeneEncoder::Hex.encode(&gene))
                .unwrap();
            assert!((decoded.weight - weight).abs() <= 1e-6);
            assert!(decoded.weight.abs() <= MAX_WEIGHT);
        }
        let sampled = random_weight(&mut rng);
        let gene = Gene::new(NeuronKey::input(0), NeuronKey::hidden(0), sampled);
        let decoded = GeneEncoder::Binary
            .decode(&GeneEncoder::Binary.encode(&gene))
            .unwrap();
        assert!((decoded.weight - sampled).abs() < 1e-9);
    }

    #[test]
    fn test_hex_is_compact() {
        let gene = Gene::new(NeuronKey::hidden(4), NeuronKey::output(0), 1.0);
        let hex = GeneEncoder::Hex.encode(&gene);
        assert!(hex.len() <= 15);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_json_layout() {
        let gene = Gene::new(NeuronKey::input(2), NeuronKey::hidden(3), 1.5);
        let json = GeneEncoder::Json.encode(&gene);
        assert_eq!(json, "[0,2,1,3,1.5]");
        assert_eq!(GeneEncoder::Json.decode(&json).unwrap(), gene);
    }

    #[test]
    fn test_human_is_encode_only() {
        let gene = Gene::new(NeuronKey::input(2), NeuronKey::hidden(3), 1.5);
        let text = GeneEncoder::Human.encode(&gene);
        assert_eq!(text, "From input 2 to neuron 3 weight 1.5");
        assert!(matches!(
            GeneEncoder::Human.decode(&text),
            Err(EvolutionError::UnsupportedDecode("human"))
        ));
    }

    #[test]
    fn test_malformed_genes_are_rejected() {
        assert!(GeneEncoder::Binary.decode("0101").is_err());
        assert!(GeneEncoder::Binary.decode(&"2".repeat(58)).is_err());
        assert!(GeneEncoder::Hex.decode("zz").is_err());
        assert!(GeneEncoder::Hex.decode("ffffffffffffffff").is_err());
        assert!(GeneEncoder::Json.decode("[0,1,7,0,1.0]").is_err());
        assert!(GeneEncoder::Json.decode("not json").is_err());
    }

    #[test]
    fn test_genome_string_join_and_split() {
        let genes = sample_genes();
        let encoded = encode_genome(&genes, GeneEncoder::Json, DEFAULT_GENE_SEPARATOR);
        assert_eq!(encoded.matches(';').count(), genes.len() - 1);

        let decoded = decode_genome(&encoded, GeneEncoder::Json, DEFAULT_GENE_SEPARATOR).unwrap();
        assert_eq!(decoded, genes);

        assert!(decode_genome("", GeneEncoder::Hex, ";").unwrap().is_empty());
    }
}
