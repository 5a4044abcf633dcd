//! A single computational unit with redundant in/out adjacency.
//!
//! Every connection is recorded on both endpoints. The setters that touch
//! adjacency are crate-private; [`Agent`](crate::Agent) is the only place that
//! edits them, always on both sides at once.

use std::collections::BTreeMap;

use crate::activation::Activation;
use crate::gene::{NeuronKey, NeuronType};

/// A neuron: identity, current activation value and weighted adjacency.
#[derive(Debug, Clone, PartialEq)]
pub struct Neuron {
    key: NeuronKey,
    value: f64,
    /// Who feeds this neuron, grouped by source type then ascending index.
    in_connections: BTreeMap<NeuronKey, f64>,
    /// Whom this neuron feeds.
    out_connections: BTreeMap<NeuronKey, f64>,
}

impl Neuron {
    #[must_use]
    pub fn new(kind: NeuronType, index: u16) -> Self {
        Self {
            key: NeuronKey::new(kind, index),
            value: 0.0,
            in_connections: BTreeMap::new(),
            out_connections: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> NeuronKey {
        self.key
    }

    #[must_use]
    pub fn kind(&self) -> NeuronType {
        self.key.kind
    }

    #[must_use]
    pub fn index(&self) -> u16 {
        self.key.index
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_value(&mut self, value: f64) -> &mut Self {
        self.value = value;
        self
    }

    /// Replace the value with `activation(value)`, sigmoid when `None`.
    pub fn apply_activation(&mut self, activation: Option<Activation>) -> &mut Self {
        self.value = activation.unwrap_or_default().apply(self.value);
        self
    }

    #[must_use]
    pub fn in_connections(&self) -> &BTreeMap<NeuronKey, f64> {
        &self.in_connections
    }

    #[must_use]
    pub fn out_connections(&self) -> &BTreeMap<NeuronKey, f64> {
        &self.out_connections
    }

    /// Total number of edges touching this neuron, a self-loop counted twice.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.in_connections.len() + self.out_connections.len()
    }

    #[must_use]
    pub fn has_self_loop(&self) -> bool {
        self.in_connections.contains_key(&self.key)
    }

    pub(crate) fn set_in_connection(&mut self, from: NeuronKey, weight: f64) {
        self.in_connections.insert(from, weight);
    }

    pub(crate) fn set_out_connection(&mut self, to: NeuronKey, weight: f64) {
        self.out_connections.insert(to, weight);
    }

    pub(crate) fn delete_in_connection(&mut self, from: NeuronKey) -> bool {
        self.in_connections.remove(&from).is_some()
    }

    pub(crate) fn delete_out_connection(&mut self, to: NeuronKey) -> bool {
        self.out_connections.remove(&to).is_some()
    }

    /// Drop `peer` from both adjacency maps of this neuron.
    pub(crate) fn delete_both_connections(&mut self, peer: NeuronKey) -> bool {
        let removed_in = self.delete_in_connection(peer);
        let removed_out = self.delete_out_connection(peer);
        removed_in || removed_out
    }

    pub(crate) fn delete_connections(&mut self) {
        self.in_connections.clear();
        self.out_connections.clear();
    }

    /// Drop adjacency entries whose peer fails `exists`.
    pub(crate) fn retain_peers(&mut self, exists: impl Fn(&NeuronKey) -> bool) -> bool {
        let before = self.connection_count();
        self.in_connections.retain(|peer, _| exists(peer));
        self.out_connections.retain(|peer, _| exists(peer));
        before != self.connection_count()
    }
}
