//! Genetic operators over agents and genomes.
//!
//! Operators never fail on stochastic no-ops: a mutation with no eligible
//! target is skipped. Errors only surface for genuinely invalid genes, which
//! the operators themselves never produce.

use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;

use crate::agent::Agent;
use crate::config::MutationRates;
use crate::error::Result;
use crate::gene::{random_weight, Gene, NeuronKey, NeuronType};
use crate::neuron::Neuron;

/// Probabilities are rolled in steps of 1/10000.
const ROLL_RESOLUTION: u32 = 10_000;

/// Roll `probability` at 1/10000 granularity.
pub fn roll<R: Rng + ?Sized>(probability: f64, rng: &mut R) -> bool {
    let threshold = (probability.clamp(0.0, 1.0) * f64::from(ROLL_RESOLUTION)).round() as u32;
    threshold > 0 && rng.random_range(1..=ROLL_RESOLUTION) <= threshold
}

/// Topology-aware graft of `b` onto `a`.
///
/// The child starts as a structural copy of `a`. Each of `b`'s genes is then
/// grafted with probability `probability`, overwriting or adding the edge, but
/// only when both endpoints already exist in the child.
///
/// # Errors
///
/// Only if a parent holds an invalid gene.
pub fn crossover<R: Rng + ?Sized>(
    a: &Agent,
    b: &Agent,
    probability: f64,
    rng: &mut R,
) -> Result<Agent> {
    let mut child = a.fresh_copy()?;
    for gene in b.genome_iter() {
        if rng.random::<f64>() >= probability {
            continue;
        }
        if child.contains(gene.from) && child.contains(gene.to) {
            child.connect_neurons(gene.from, gene.to, gene.weight)?;
        }
    }
    child.delete_redundant_genes();
    Ok(child)
}

/// Apply each enabled mutation with its own independent roll.
///
/// Order: add neuron, add connection, change weights, delete neuron, delete
/// connection. Layered agents only receive weight changes so their layer
/// partition stays intact.
///
/// # Errors
///
/// Only if the agent already holds an invalid gene.
pub fn mutate<R: Rng + ?Sized>(agent: &mut Agent, rates: &MutationRates, rng: &mut R) -> Result<()> {
    let structural = !agent.is_layered();

    if structural && roll(rates.add_neuron, rng) {
        add_neuron(agent, rng)?;
    }
    if structural && roll(rates.add_connection, rng) {
        add_connection(agent, rng)?;
    }
    if roll(rates.weight, rng) {
        for _ in 0..rates.weight_count {
            change_weight(agent, rng)?;
        }
    }
    if structural && roll(rates.delete_neuron, rng) {
        delete_neuron(agent, rng);
    }
    if structural && roll(rates.delete_connection, rng) {
        delete_connection(agent, rng)?;
    }
    Ok(())
}

/// Grow one hidden neuron between a random input and a random output.
fn add_neuron<R: Rng + ?Sized>(agent: &mut Agent, rng: &mut R) -> Result<bool> {
    let (Some(input), Some(output)) = (
        agent.random_neuron(NeuronType::Input, rng),
        agent.random_neuron(NeuronType::Output, rng),
    ) else {
        return Ok(false);
    };
    let Some(hidden) = agent.create_neurons(NeuronType::Hidden, 1)? else {
        return Ok(false);
    };
    agent.connect_neurons(input, hidden, random_weight(rng))?;
    agent.connect_neurons(hidden, output, random_weight(rng))?;
    agent.delete_redundant_genes();
    Ok(true)
}

/// Every legal edge the agent does not have yet.
///
/// Hidden to Hidden edges may only point forward (or to self with memory) so
/// that new structure never depends on not-yet-computed values.
pub fn missing_connections(agent: &Agent) -> Vec<(NeuronKey, NeuronKey)> {
    let inputs: Vec<&Neuron> = agent.neurons(NeuronType::Input).collect();
    let hidden: Vec<&Neuron> = agent.neurons(NeuronType::Hidden).collect();
    let outputs: Vec<&Neuron> = agent.neurons(NeuronType::Output).collect();

    let mut missing = Vec::new();
    let mut consider = |from: &Neuron, to: &Neuron| {
        if !from.out_connections().contains_key(&to.key()) {
            missing.push((from.key(), to.key()));
        }
    };

    for &from in inputs.iter().chain(&hidden) {
        for &to in &hidden {
            let forward = match from.kind() {
                NeuronType::Hidden if agent.has_memory() => from.index() <= to.index(),
                NeuronType::Hidden => from.index() < to.index(),
                _ => true,
            };
            if forward {
                consider(from, to);
            }
        }
        for &to in &outputs {
            consider(from, to);
        }
    }
    missing
}

fn add_connection<R: Rng + ?Sized>(agent: &mut Agent, rng: &mut R) -> Result<bool> {
    let Some(&(from, to)) = missing_connections(agent).choose(rng) else {
        return Ok(false);
    };
    agent.connect_neurons(from, to, random_weight(rng))?;
    Ok(true)
}

fn change_weight<R: Rng + ?Sized>(agent: &mut Agent, rng: &mut R) -> Result<bool> {
    let count = agent.connection_count();
    if count == 0 {
        return Ok(false);
    }
    let pick = rng.random_range(0..count);
    let Some(gene) = agent.genome_iter().nth(pick) else {
        return Ok(false);
    };
    agent.connect_neurons(gene.from, gene.to, random_weight(rng))?;
    Ok(true)
}

/// Hidden neurons whose removal leaves no Input or Output neuron isolated.
pub fn deletable_neurons(agent: &Agent) -> Vec<NeuronKey> {
    let protected: Vec<NeuronKey> = agent
        .neurons(NeuronType::Input)
        .chain(agent.neurons(NeuronType::Output))
        .filter(|n| n.connection_count() == 1)
        .flat_map(|n| n.in_connections().keys().chain(n.out_connections().keys()))
        .copied()
        .collect();

    agent
        .neurons(NeuronType::Hidden)
        .map(Neuron::key)
        .filter(|key| !protected.contains(key))
        .collect()
}

fn delete_neuron<R: Rng + ?Sized>(agent: &mut Agent, rng: &mut R) -> bool {
    let Some(&key) = deletable_neurons(agent).choose(rng) else {
        return false;
    };
    agent.remove_neuron(key);
    agent.delete_redundant_genes();
    true
}

fn delete_connection<R: Rng + ?Sized>(agent: &mut Agent, rng: &mut R) -> Result<bool> {
    let count = agent.connection_count();
    if count == 0 {
        return Ok(false);
    }
    let pick = rng.random_range(0..count);
    let Some(gene) = agent.genome_iter().nth(pick) else {
        return Ok(false);
    };
    agent.remove_connection(gene.from, gene.to);

    let isolated: Vec<NeuronKey> = agent
        .neurons(NeuronType::Input)
        .chain(agent.neurons(NeuronType::Output))
        .filter(|n| n.connection_count() == 0)
        .map(Neuron::key)
        .collect();
    for key in isolated {
        agent.connect_to_all(key, rng)?;
    }

    agent.delete_redundant_genes();
    Ok(true)
}

/// Swap two genes with probability `probability`.
///
/// Only gene order changes, which shifts future positional alignment.
pub fn translocation<R: Rng + ?Sized>(genome: &mut [Gene], probability: f64, rng: &mut R) -> bool {
    if genome.len() < 2 || !roll(probability, rng) {
        return false;
    }
    let i = rng.random_range(0..genome.len());
    let mut j = rng.random_range(0..genome.len() - 1);
    if j >= i {
        j += 1;
    }
    genome.swap(i, j);
    true
}

/// Length-based splice of two genomes.
///
/// The parents are put in random order, then the first one's prefix up to a
/// cut at a random fraction in `[low_ratio, high_ratio]` of its length is
/// joined with the second one's suffix from the same position. The cut stays
/// within `[1, len - 1]` when the first genome has at least two genes.
pub fn dominance<R: Rng + ?Sized>(
    genome1: &[Gene],
    genome2: &[Gene],
    low_ratio: f64,
    high_ratio: f64,
    rng: &mut R,
) -> Vec<Gene> {
    let mut parents = [genome1, genome2];
    parents.shuffle(rng);
    let [first, second] = parents;

    let low = unit_ratio(low_ratio);
    let high = unit_ratio(high_ratio);
    let ratio = rng.random_range(low.min(high)..=low.max(high));

    let len = first.len();
    let mut cut = (ratio * len as f64).round() as usize;
    if cut == 0 && len > 1 {
        cut = 1;
    }
    if cut == len && len > 0 {
        cut = len - 1;
    }

    first[..cut]
        .iter()
        .chain(second.iter().skip(cut))
        .copied()
        .collect()
}

/// Clamp a cut ratio to `[0, 1]`; NaN cuts in the middle.
fn unit_ratio(ratio: f64) -> f64 {
    if ratio.is_nan() {
        0.5
    } else {
        ratio.clamp(0.0, 1.0)
    }
}
