//! Agents: the sparse, indexed neuron graph that is both genome and phenotype.
//!
//! An [`Agent`] owns its neurons grouped by [`NeuronType`] and keyed by index.
//! Connections live redundantly on both endpoints and are only ever created
//! through [`Agent::connect_neurons`] and removed through
//! [`Agent::remove_connection`] / [`Agent::remove_neuron`], so the two sides
//! cannot drift apart.
//!
//! A layered agent is an agent with a fixed hidden-layer partition
//! ([`Agent::layered`]); its hidden neurons are split contiguously into layers
//! and its random wiring is strictly layer to layer.
//!
//! ## Genome order
//!
//! [`Agent::genome`] exports Hidden neurons by ascending index, then Output
//! neurons by ascending index, and for each of them its incoming connections
//! grouped by source type then ascending source index. Crossover aligns genes
//! by this order.

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::IteratorRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::encoder::{decode_genome, encode_genome, GeneEncoder};
use crate::error::{EvolutionError, Result};
use crate::gene::{check_index, random_weight, Gene, NeuronKey, NeuronType};
use crate::neuron::Neuron;

/// Short structural report of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub fitness: f64,
    pub hidden_neurons: usize,
    pub connections: usize,
}

/// A neural agent: neurons, their connections and runtime state.
#[derive(Debug, Clone, Default)]
pub struct Agent {
    neurons: BTreeMap<NeuronType, BTreeMap<u16, Neuron>>,
    /// Hidden-layer sizes for layered agents.
    layers: Option<Vec<usize>>,
    has_memory: bool,
    activation: Activation,
    fitness: f64,
    step: u64,
    additional: Option<serde_json::Value>,
}

impl Agent {
    /// Create an empty dynamic agent.
    #[must_use]
    pub fn new(has_memory: bool) -> Self {
        Self {
            has_memory,
            ..Self::default()
        }
    }

    /// Create an empty layered agent with `layers` hidden neurons per layer.
    ///
    /// The hidden neurons themselves are allocated by
    /// [`create_layer_neurons`](Self::create_layer_neurons).
    #[must_use]
    pub fn layered(layers: Vec<usize>, has_memory: bool) -> Self {
        Self {
            layers: Some(layers),
            has_memory,
            ..Self::default()
        }
    }

    /// Rebuild an agent from genes.
    ///
    /// # Errors
    ///
    /// Any gene rejected by [`connect_neurons`](Self::connect_neurons).
    pub fn from_genome(genome: &[Gene], has_memory: bool) -> Result<Self> {
        let mut agent = Self::new(has_memory);
        agent.set_genome(genome)?;
        Ok(agent)
    }

    /// Rebuild an agent from an encoded genome string.
    ///
    /// # Errors
    ///
    /// Decoding errors or any gene rejected by [`connect_neurons`](Self::connect_neurons).
    pub fn from_genome_str(
        encoded: &str,
        encoder: GeneEncoder,
        separator: &str,
        has_memory: bool,
    ) -> Result<Self> {
        let mut agent = Self::new(has_memory);
        agent.set_genome_str(encoded, encoder, separator)?;
        Ok(agent)
    }

    /// A structural copy without runtime state.
    ///
    /// Keeps every Input and Output neuron (connected or not), the genome, the
    /// memory flag, layers and activation; values, step counter, fitness and
    /// the user payload start fresh.
    ///
    /// # Errors
    ///
    /// Only if the agent's own genome is invalid, which the agent never allows.
    pub fn fresh_copy(&self) -> Result<Self> {
        let mut agent = Self {
            layers: self.layers.clone(),
            has_memory: self.has_memory,
            activation: self.activation,
            ..Self::default()
        };
        for kind in [NeuronType::Input, NeuronType::Output] {
            for neuron in self.neurons(kind) {
                agent.ensure_neuron(neuron.key());
            }
        }
        agent.set_genome(&self.genome())?;
        Ok(agent)
    }

    #[must_use]
    pub fn has_memory(&self) -> bool {
        self.has_memory
    }

    pub fn set_has_memory(&mut self, has_memory: bool) -> &mut Self {
        self.has_memory = has_memory;
        self
    }

    #[must_use]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn set_activation(&mut self, activation: Activation) -> &mut Self {
        self.activation = activation;
        self
    }

    #[must_use]
    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    pub fn set_fitness(&mut self, fitness: f64) -> &mut Self {
        self.fitness = fitness;
        self
    }

    pub fn add_fitness(&mut self, delta: f64) -> &mut Self {
        self.fitness += delta;
        self
    }

    /// Number of steps taken since the last memory reset.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.step
    }

    /// Opaque caller payload carried by this agent.
    #[must_use]
    pub fn additional(&self) -> Option<&serde_json::Value> {
        self.additional.as_ref()
    }

    pub fn set_additional(&mut self, additional: Option<serde_json::Value>) -> &mut Self {
        self.additional = additional;
        self
    }

    /// Hidden-layer sizes, `None` for dynamic agents.
    #[must_use]
    pub fn layers(&self) -> Option<&[usize]> {
        self.layers.as_deref()
    }

    #[must_use]
    pub fn is_layered(&self) -> bool {
        self.layers.is_some()
    }

    /// Neurons of one type in ascending index order.
    pub fn neurons(&self, kind: NeuronType) -> impl Iterator<Item = &Neuron> + '_ {
        self.neurons.get(&kind).into_iter().flat_map(|m| m.values())
    }

    #[must_use]
    pub fn neuron_count(&self, kind: NeuronType) -> usize {
        self.neurons.get(&kind).map_or(0, BTreeMap::len)
    }

    #[must_use]
    pub fn neuron(&self, key: NeuronKey) -> Option<&Neuron> {
        self.neurons.get(&key.kind)?.get(&key.index)
    }

    #[must_use]
    pub fn contains(&self, key: NeuronKey) -> bool {
        self.neuron(key).is_some()
    }

    /// A uniformly chosen neuron of `kind`.
    pub fn random_neuron<R: Rng + ?Sized>(&self, kind: NeuronType, rng: &mut R) -> Option<NeuronKey> {
        self.neurons(kind).map(Neuron::key).choose(rng)
    }

    /// Hidden neurons of layer `layer` (0-based) of a layered agent.
    pub fn neurons_in_layer(&self, layer: usize) -> Vec<&Neuron> {
        let Some(layers) = self.layers.as_deref() else {
            return Vec::new();
        };
        let Some(&size) = layers.get(layer) else {
            return Vec::new();
        };
        let start: usize = layers[..layer].iter().sum();
        self.neurons(NeuronType::Hidden).skip(start).take(size).collect()
    }

    #[must_use]
    pub fn input_values(&self) -> Vec<f64> {
        self.neurons(NeuronType::Input).map(Neuron::value).collect()
    }

    #[must_use]
    pub fn output_values(&self) -> Vec<f64> {
        self.neurons(NeuronType::Output).map(Neuron::value).collect()
    }

    #[must_use]
    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            fitness: self.fitness,
            hidden_neurons: self.neuron_count(NeuronType::Hidden),
            connections: self.connection_count(),
        }
    }

    /// Number of genes, i.e. connections into Hidden and Output neurons.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        [NeuronType::Hidden, NeuronType::Output]
            .into_iter()
            .flat_map(|kind| self.neurons(kind))
            .map(|n| n.in_connections().len())
            .sum()
    }

    /// Return the neuron at `(kind, index)`, allocating it if absent.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::IndexOutOfRange`] if `index > 65535`.
    pub fn find_or_create_neuron(&mut self, kind: NeuronType, index: usize) -> Result<&mut Neuron> {
        let index = check_index(index)?;
        Ok(self.ensure_neuron(NeuronKey::new(kind, index)))
    }

    fn ensure_neuron(&mut self, key: NeuronKey) -> &mut Neuron {
        self.neurons
            .entry(key.kind)
            .or_default()
            .entry(key.index)
            .or_insert_with(|| Neuron::new(key.kind, key.index))
    }

    fn neuron_mut(&mut self, key: NeuronKey) -> Option<&mut Neuron> {
        self.neurons.get_mut(&key.kind)?.get_mut(&key.index)
    }

    fn next_index(&self, kind: NeuronType) -> Result<u16> {
        let next = self
            .neurons
            .get(&kind)
            .and_then(|m| m.keys().next_back())
            .map_or(0, |&last| usize::from(last) + 1);
        check_index(next)
    }

    /// Append `count` unconnected neurons at the next free indices.
    ///
    /// Returns the last created neuron.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::IndexOutOfRange`] once indices are exhausted.
    pub fn create_neurons(&mut self, kind: NeuronType, count: usize) -> Result<Option<NeuronKey>> {
        let mut last = None;
        for _ in 0..count {
            let key = NeuronKey::new(kind, self.next_index(kind)?);
            self.ensure_neuron(key);
            last = Some(key);
        }
        Ok(last)
    }

    /// Append `count` neurons and wire each into the graph.
    ///
    /// Hidden neurons are wired with [`connect_to_all`](Self::connect_to_all);
    /// other types are created unconnected.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::IndexOutOfRange`] once indices are exhausted.
    pub fn create_connected_neurons<R: Rng + ?Sized>(
        &mut self,
        kind: NeuronType,
        count: usize,
        rng: &mut R,
    ) -> Result<Option<NeuronKey>> {
        let mut last = None;
        for _ in 0..count {
            let created = self.create_neurons(kind, 1)?;
            if let (Some(key), NeuronType::Hidden) = (created, kind) {
                self.connect_to_all(key, rng)?;
            }
            last = created;
        }
        Ok(last)
    }

    /// Allocate the hidden neurons of a layered agent.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::IndexOutOfRange`] once indices are exhausted.
    pub fn create_layer_neurons(&mut self) -> Result<()> {
        let total: usize = self.layers.as_deref().map_or(0, |l| l.iter().sum());
        self.create_neurons(NeuronType::Hidden, total)?;
        Ok(())
    }

    /// Remove a neuron and every connection that references it.
    pub fn remove_neuron(&mut self, key: NeuronKey) -> bool {
        let Some(neuron) = self.neurons.get_mut(&key.kind).and_then(|m| m.remove(&key.index)) else {
            return false;
        };
        let peers: BTreeSet<NeuronKey> = neuron
            .in_connections()
            .keys()
            .chain(neuron.out_connections().keys())
            .copied()
            .collect();
        for peer in peers {
            if let Some(peer) = self.neuron_mut(peer) {
                peer.delete_both_connections(key);
            }
        }
        true
    }

    /// Create or overwrite the edge `from -> to`.
    ///
    /// Missing endpoint neurons are allocated. Nothing is modified when the
    /// edge is rejected.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::WeightOutOfRange`] or [`EvolutionError::InvalidTopology`].
    pub fn connect_neurons(&mut self, from: NeuronKey, to: NeuronKey, weight: f64) -> Result<()> {
        Gene::new(from, to, weight).validate()?;
        self.ensure_neuron(to).set_in_connection(from, weight);
        self.ensure_neuron(from).set_out_connection(to, weight);
        Ok(())
    }

    /// Remove the edge `from -> to` from both endpoints.
    pub fn remove_connection(&mut self, from: NeuronKey, to: NeuronKey) -> bool {
        let removed_out = self
            .neuron_mut(from)
            .is_some_and(|n| n.delete_out_connection(to));
        let removed_in = self
            .neuron_mut(to)
            .is_some_and(|n| n.delete_in_connection(from));
        removed_out || removed_in
    }

    /// Wire `key` into the existing graph with fresh random weights.
    ///
    /// * Input: feeds every Hidden and Output neuron.
    /// * Output: fed by every Input and Hidden neuron.
    /// * Hidden: fed by every Input, feeds every Output and every other
    ///   Hidden neuron; the self-loop only exists for memory agents.
    ///
    /// # Errors
    ///
    /// None in practice; weights are sampled in range and directions are legal.
    pub fn connect_to_all<R: Rng + ?Sized>(&mut self, key: NeuronKey, rng: &mut R) -> Result<()> {
        let mut edges = Vec::new();
        for kind in [NeuronType::Input, NeuronType::Hidden, NeuronType::Output] {
            for other in self.neurons(kind).map(Neuron::key) {
                let edge = match (key.kind, other.kind) {
                    (NeuronType::Input, NeuronType::Hidden | NeuronType::Output) => Some((key, other)),
                    (NeuronType::Output, NeuronType::Input | NeuronType::Hidden) => Some((other, key)),
                    (NeuronType::Hidden, NeuronType::Input) => Some((other, key)),
                    (NeuronType::Hidden, NeuronType::Hidden) if other == key => {
                        self.has_memory.then_some((key, key))
                    }
                    (NeuronType::Hidden, NeuronType::Hidden | NeuronType::Output) => Some((key, other)),
                    _ => None,
                };
                edges.extend(edge);
            }
        }
        for (from, to) in edges {
            self.connect_neurons(from, to, random_weight(rng))?;
        }
        Ok(())
    }

    /// Replace all connections with the genesis topology.
    ///
    /// * Layered agents: input to layer 0, each layer to the next, last
    ///   layer to output, fully connected between adjacent groups.
    /// * Dynamic agents with hidden neurons: every input to every hidden
    ///   neuron and every hidden neuron to every output.
    /// * Dynamic agents without hidden neurons: every input to every output.
    ///
    /// # Errors
    ///
    /// None in practice; weights are sampled in range and directions are legal.
    pub fn init_random_connections<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        self.clear_connections();

        let inputs: Vec<NeuronKey> = self.neurons(NeuronType::Input).map(Neuron::key).collect();
        let outputs: Vec<NeuronKey> = self.neurons(NeuronType::Output).map(Neuron::key).collect();

        let hidden: Vec<NeuronKey> = self.neurons(NeuronType::Hidden).map(Neuron::key).collect();

        let mut groups = vec![inputs];
        match self.layers.as_deref() {
            Some(layers) => {
                let mut start = 0;
                for &size in layers {
                    let end = (start + size).min(hidden.len());
                    groups.push(hidden[start..end].to_vec());
                    start = end;
                }
            }
            None => groups.push(hidden),
        }
        groups.push(outputs);
        groups.retain(|g| !g.is_empty());

        for pair in groups.windows(2) {
            for &from in &pair[0] {
                for &to in &pair[1] {
                    self.connect_neurons(from, to, random_weight(rng))?;
                }
            }
        }

        self.delete_redundant_genes();
        Ok(())
    }

    fn clear_connections(&mut self) {
        for neuron in self.neurons.values_mut().flat_map(BTreeMap::values_mut) {
            neuron.delete_connections();
        }
    }

    /// Iterate genes in genome order.
    pub fn genome_iter(&self) -> impl Iterator<Item = Gene> + '_ {
        [NeuronType::Hidden, NeuronType::Output]
            .into_iter()
            .flat_map(|kind| self.neurons(kind))
            .flat_map(|neuron| {
                neuron
                    .in_connections()
                    .iter()
                    .map(|(&from, &weight)| Gene::new(from, neuron.key(), weight))
            })
    }

    #[must_use]
    pub fn genome(&self) -> Vec<Gene> {
        self.genome_iter().collect()
    }

    /// Encode every gene with `encoder`.
    #[must_use]
    pub fn encoded_genome(&self, encoder: GeneEncoder) -> Vec<String> {
        self.genome_iter().map(|gene| encoder.encode(&gene)).collect()
    }

    /// The genome as one encoded string.
    #[must_use]
    pub fn genome_string(&self, encoder: GeneEncoder, separator: &str) -> String {
        encode_genome(&self.genome(), encoder, separator)
    }

    /// Clear all connections and rebuild them from `genome`.
    ///
    /// Neurons (and with them recurrent values) survive; neurons referenced by
    /// the genome are allocated on demand. Redundant structure is pruned
    /// afterwards. The genome is validated before anything is cleared.
    ///
    /// # Errors
    ///
    /// The first gene rejected by [`Gene::validate`].
    pub fn set_genome(&mut self, genome: &[Gene]) -> Result<()> {
        genome.iter().try_for_each(Gene::validate)?;

        self.clear_connections();
        for gene in genome {
            self.connect_neurons(gene.from, gene.to, gene.weight)?;
        }
        self.delete_redundant_genes();
        Ok(())
    }

    /// Decode `encoded` and apply it with [`set_genome`](Self::set_genome).
    ///
    /// # Errors
    ///
    /// Decoding errors or an invalid gene.
    pub fn set_genome_str(&mut self, encoded: &str, encoder: GeneEncoder, separator: &str) -> Result<()> {
        let genome = decode_genome(encoded, encoder, separator)?;
        self.set_genome(&genome)
    }

    /// Remove structure that cannot influence outputs.
    ///
    /// 1. No inputs or no outputs: every connection is dropped.
    /// 2. Without memory, hidden self-loops and edges from higher-indexed
    ///    hidden neurons are dropped on both endpoints.
    /// 3. Hidden neurons with no inputs or no outputs, or whose only input or
    ///    only output is a self-loop, are removed until none remain.
    /// 4. Dangling references are swept and an empty hidden bucket dropped.
    ///
    /// Running it twice is the same as running it once.
    pub fn delete_redundant_genes(&mut self) {
        if self.neuron_count(NeuronType::Input) == 0 || self.neuron_count(NeuronType::Output) == 0 {
            self.clear_connections();
        }

        if !self.has_memory {
            let backward: Vec<(NeuronKey, NeuronKey)> = self
                .neurons(NeuronType::Hidden)
                .flat_map(|neuron| {
                    let to = neuron.key();
                    neuron
                        .in_connections()
                        .keys()
                        .filter(move |from| from.kind == NeuronType::Hidden && from.index >= to.index)
                        .map(move |&from| (from, to))
                })
                .collect();
            for (from, to) in backward {
                self.remove_connection(from, to);
            }
        }

        loop {
            let inert: Vec<NeuronKey> = self
                .neurons(NeuronType::Hidden)
                .filter(|n| is_inert(n))
                .map(Neuron::key)
                .collect();
            if inert.is_empty() {
                break;
            }
            for key in inert {
                self.remove_neuron(key);
            }
        }

        let existing: BTreeSet<NeuronKey> = self
            .neurons
            .values()
            .flat_map(BTreeMap::values)
            .map(Neuron::key)
            .collect();
        for neuron in self.neurons.values_mut().flat_map(BTreeMap::values_mut) {
            neuron.retain_peers(|peer| existing.contains(peer));
        }

        if self.neuron_count(NeuronType::Hidden) == 0 {
            self.neurons.remove(&NeuronType::Hidden);
        }
    }

    /// Feed `inputs` forward once.
    ///
    /// The i-th value goes to the i-th input neuron by ascending index. Hidden
    /// neurons are zeroed first unless the agent has memory. Hidden neurons
    /// are then computed by ascending index, then outputs, each as the
    /// activated weighted sum of its sources' current values; a source not yet
    /// recomputed this pass contributes its previous value.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::InputLength`] if fewer values than input neurons.
    pub fn step(&mut self, inputs: &[f64]) -> Result<&mut Self> {
        let expected = self.neuron_count(NeuronType::Input);
        if inputs.len() < expected {
            return Err(EvolutionError::InputLength {
                expected,
                actual: inputs.len(),
            });
        }

        if let Some(input_neurons) = self.neurons.get_mut(&NeuronType::Input) {
            for (neuron, &value) in input_neurons.values_mut().zip(inputs) {
                neuron.set_value(value);
            }
        }

        if !self.has_memory {
            self.zero_values(NeuronType::Hidden);
        }

        for kind in [NeuronType::Hidden, NeuronType::Output] {
            let keys: Vec<u16> = self
                .neurons
                .get(&kind)
                .map(|m| m.keys().copied().collect())
                .unwrap_or_default();
            for index in keys {
                let key = NeuronKey::new(kind, index);
                let sum = self.neuron(key).map_or(0.0, |neuron| {
                    neuron
                        .in_connections()
                        .iter()
                        .map(|(&from, &weight)| weight * self.neuron(from).map_or(0.0, Neuron::value))
                        .sum::<f64>()
                });
                let activation = self.activation;
                if let Some(neuron) = self.neuron_mut(key) {
                    neuron.set_value(sum).apply_activation(Some(activation));
                }
            }
        }

        self.step += 1;
        Ok(self)
    }

    fn zero_values(&mut self, kind: NeuronType) {
        if let Some(neurons) = self.neurons.get_mut(&kind) {
            for neuron in neurons.values_mut() {
                neuron.set_value(0.0);
            }
        }
    }

    /// Zero hidden and output values and the step counter.
    pub fn reset_memory(&mut self) -> &mut Self {
        self.zero_values(NeuronType::Hidden);
        self.zero_values(NeuronType::Output);
        self.step = 0;
        self
    }

    /// [`reset_memory`](Self::reset_memory) plus zero fitness.
    pub fn reset(&mut self) -> &mut Self {
        self.reset_memory();
        self.fitness = 0.0;
        self
    }
}

fn is_inert(neuron: &Neuron) -> bool {
    let ins = neuron.in_connections();
    let outs = neuron.out_connections();
    let key = neuron.key();
    ins.is_empty()
        || outs.is_empty()
        || (ins.len() == 1 && ins.contains_key(&key))
        || (outs.len() == 1 && outs.contains_key(&key))
}
