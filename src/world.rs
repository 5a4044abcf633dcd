//! The generational loop: evaluation, ranking, best-agent tracking,
//! tournament reproduction and checkpoints.
//!
//! All randomness comes from the world's single [`ChaCha8Rng`], consumed
//! sequentially during reproduction, so a seeded run is reproducible no
//! matter how many threads evaluate agents.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::activation::Activation;
use crate::agent::Agent;
use crate::checkpoint::{CheckpointStore, FileCheckpointStore};
use crate::config::EvolutionConfig;
use crate::encoder::{GeneEncoder, GENOME_SEPARATOR};
use crate::error::{EvolutionError, Result};
use crate::gene::NeuronType;
use crate::genetic::{crossover, mutate};

/// One sample of the training data.
///
/// A row with no inputs is a memory-reset marker: agents reset their memory
/// instead of stepping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataRow {
    pub input: Vec<f64>,
    pub output: Vec<f64>,
}

impl DataRow {
    #[must_use]
    pub fn new(input: Vec<f64>, output: Vec<f64>) -> Self {
        Self { input, output }
    }

    /// A memory-reset marker.
    #[must_use]
    pub fn reset() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_reset(&self) -> bool {
        self.input.is_empty()
    }
}

/// Read-only view handed to the fitness function.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Generation being evaluated, starting at 1.
    pub generation: u64,
    /// Best fitness ever recorded before this generation.
    pub best_fitness: Option<f64>,
    population: &'a [Agent],
    index: usize,
}

impl<'a> EvaluationContext<'a> {
    /// The population as it was before this generation's evaluation.
    #[must_use]
    pub fn population(&self) -> &'a [Agent] {
        self.population
    }

    /// Position of the evaluated agent in [`population`](Self::population).
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Every agent except the one being evaluated.
    pub fn others(&self) -> impl Iterator<Item = &'a Agent> + 'a {
        let index = self.index;
        self.population
            .iter()
            .enumerate()
            .filter(move |&(i, _)| i != index)
            .map(|(_, agent)| agent)
    }
}

/// Scores one agent on one data row; higher is better.
///
/// Called once per row per agent per generation, right after the agent stepped
/// on that row's input. Implemented for any matching closure.
pub trait Fitness: Sync {
    fn score(&self, agent: &Agent, row: &DataRow, context: &EvaluationContext<'_>) -> f64;
}

impl<F> Fitness for F
where
    F: Fn(&Agent, &DataRow, &EvaluationContext<'_>) -> f64 + Sync,
{
    fn score(&self, agent: &Agent, row: &DataRow, context: &EvaluationContext<'_>) -> f64 {
        self(agent, row, context)
    }
}

/// Neuron layout shared by every agent of a population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentShape {
    pub inputs: usize,
    pub outputs: usize,
    /// Hidden-layer sizes; empty for dynamic agents.
    pub layers: Vec<usize>,
    pub has_memory: bool,
}

impl AgentShape {
    /// Free-form agents seeded with a single hidden neuron.
    #[must_use]
    pub fn dynamic(inputs: usize, outputs: usize) -> Self {
        Self {
            inputs,
            outputs,
            layers: Vec::new(),
            has_memory: false,
        }
    }

    /// Agents with fixed hidden layers.
    #[must_use]
    pub fn layered(inputs: usize, layers: Vec<usize>, outputs: usize) -> Self {
        Self {
            inputs,
            outputs,
            layers,
            has_memory: false,
        }
    }

    #[must_use]
    pub fn with_memory(mut self, has_memory: bool) -> Self {
        self.has_memory = has_memory;
        self
    }

    /// Input and Output neurons without any connection.
    fn skeleton(&self, activation: Activation) -> Result<Agent> {
        let mut agent = if self.layers.is_empty() {
            Agent::new(self.has_memory)
        } else {
            Agent::layered(self.layers.clone(), self.has_memory)
        };
        agent.set_activation(activation);
        agent.create_neurons(NeuronType::Input, self.inputs)?;
        agent.create_neurons(NeuronType::Output, self.outputs)?;
        Ok(agent)
    }

    /// A freshly wired agent.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::IndexOutOfRange`] for more than 65536 neurons of a type.
    pub fn build<R: Rng + ?Sized>(&self, activation: Activation, rng: &mut R) -> Result<Agent> {
        let mut agent = self.skeleton(activation)?;
        if agent.is_layered() {
            agent.create_layer_neurons()?;
        } else {
            agent.create_neurons(NeuronType::Hidden, 1)?;
        }
        agent.init_random_connections(rng)?;
        Ok(agent)
    }
}

/// Controls for [`World::step`].
#[derive(Debug, Clone)]
pub struct StepOptions {
    /// Generations to run; 0 runs until another terminator fires.
    pub generations: u64,
    /// Fraction of the ranked population eligible for the tournament.
    pub survive_rate: f64,
    /// Rows per generation, rotating through the data; 0 uses all rows.
    pub batch_size: usize,
    /// Wall-clock budget for the whole call.
    pub time_limit: Option<Duration>,
    /// Checked before every generation.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            generations: 1,
            survive_rate: 0.5,
            batch_size: 0,
            time_limit: None,
            cancel: None,
        }
    }
}

impl StepOptions {
    #[must_use]
    pub fn generations(generations: u64, survive_rate: f64) -> Self {
        Self {
            generations,
            survive_rate,
            ..Default::default()
        }
    }

    fn is_unbounded(&self) -> bool {
        self.generations == 0 && self.time_limit.is_none() && self.cancel.is_none()
    }
}

/// Caller-supplied early stop, checked after every generation.
pub type StopCondition<'a> = &'a dyn Fn(&World) -> bool;

/// A population evolving over generations.
pub struct World {
    name: String,
    config: EvolutionConfig,
    agents: Vec<Agent>,
    generation: u64,
    best_agent: Option<Agent>,
    rng: ChaCha8Rng,
    store: Option<Box<dyn CheckpointStore>>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("population", &self.agents.len())
            .field("best_fitness", &self.best_fitness())
            .field("has_store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl World {
    /// Create an empty world.
    ///
    /// A file checkpoint store is attached when `config.checkpoint_dir` is set.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::InvalidConfig`] if the configuration does not validate.
    pub fn new(name: impl Into<String>, config: EvolutionConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        let store = config
            .checkpoint_dir
            .as_ref()
            .map(|dir| Box::new(FileCheckpointStore::new(dir)) as Box<dyn CheckpointStore>);
        Ok(Self {
            name: name.into(),
            config,
            agents: Vec::new(),
            generation: 1,
            best_agent: None,
            rng,
            store,
        })
    }

    /// Replace the checkpoint store.
    #[must_use]
    pub fn with_store(mut self, store: Box<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Rebuild a world from its last population checkpoint.
    ///
    /// Every agent is created with `shape`'s Input and Output neurons before
    /// its genome is applied, so unconnected inputs keep their positions.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::InvalidConfig`] without a checkpoint store,
    /// [`EvolutionError::MissingCheckpoint`] if nothing was saved, decoding
    /// errors, or [`EvolutionError::PopulationTooSmall`].
    pub fn load_autosaved(
        name: impl Into<String>,
        config: EvolutionConfig,
        shape: &AgentShape,
        store: Option<Box<dyn CheckpointStore>>,
    ) -> Result<Self> {
        let mut world = Self::new(name, config)?;
        if let Some(store) = store {
            world.store = Some(store);
        }
        let Some(store) = world.store.as_ref() else {
            return Err(EvolutionError::InvalidConfig(
                "loading a world requires a checkpoint store".into(),
            ));
        };
        let dump = store.load_world(&world.name)?;

        let mut agents = Vec::new();
        for line in dump.split(GENOME_SEPARATOR).filter(|l| !l.trim().is_empty()) {
            let mut agent = shape.skeleton(world.config.activation)?;
            agent.set_genome_str(
                line.trim(),
                world.config.checkpoint_encoder,
                &world.config.gene_separator,
            )?;
            agents.push(agent);
        }
        world.set_agents(agents)?;
        info!(world = %world.name, population = world.agents.len(), "world loaded from checkpoint");
        Ok(world)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// The generation that the next call to
    /// [`next_generation`](Self::next_generation) evaluates.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    #[must_use]
    pub fn population_size(&self) -> usize {
        self.agents.len()
    }

    /// Replace the population.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::PopulationTooSmall`] for fewer than two agents.
    pub fn set_agents(&mut self, agents: Vec<Agent>) -> Result<&mut Self> {
        if agents.len() <= 1 {
            return Err(EvolutionError::PopulationTooSmall(agents.len()));
        }
        self.agents = agents;
        Ok(self)
    }

    /// Highest-fitness agent ever evaluated.
    #[must_use]
    pub fn best_agent(&self) -> Option<&Agent> {
        self.best_agent.as_ref()
    }

    #[must_use]
    pub fn best_fitness(&self) -> Option<f64> {
        self.best_agent.as_ref().map(Agent::fitness)
    }

    /// Every agent's genome, one per line.
    #[must_use]
    pub fn genomes_string(&self, encoder: GeneEncoder, separator: &str) -> String {
        self.agents
            .iter()
            .map(|agent| agent.genome_string(encoder, separator))
            .collect::<Vec<_>>()
            .join(GENOME_SEPARATOR)
    }

    /// Populate the world with `count` randomly wired agents.
    ///
    /// Dynamic agents start with one hidden neuron, layered agents with their
    /// full hidden layers.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::PopulationTooSmall`] if `count <= 1`.
    pub fn create_agents(&mut self, count: usize, shape: &AgentShape) -> Result<&mut Self> {
        if count <= 1 {
            return Err(EvolutionError::PopulationTooSmall(count));
        }
        let agents = (0..count)
            .map(|_| shape.build(self.config.activation, &mut self.rng))
            .collect::<Result<Vec<_>>>()?;
        info!(
            world = %self.name,
            count,
            inputs = shape.inputs,
            outputs = shape.outputs,
            layered = !shape.layers.is_empty(),
            "agents created"
        );
        self.set_agents(agents)
    }

    /// Crossover, mutate and rebuild until the child has a non-empty genome.
    ///
    /// Memory and layers come from `a`.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::DegenerateReproduction`] after
    /// `max_reproduction_attempts` empty children.
    pub fn reproduce(&mut self, a: &Agent, b: &Agent) -> Result<Agent> {
        let attempts = self.config.max_reproduction_attempts;
        for attempt in 1..=attempts {
            let mut child = crossover(a, b, self.config.crossover_probability, &mut self.rng)?;
            mutate(&mut child, &self.config.mutation, &mut self.rng)?;
            let mut child = child.fresh_copy()?;
            if child.connection_count() > 0 {
                child.set_activation(self.config.activation);
                return Ok(child);
            }
            debug!(attempt, "offspring genome empty, retrying");
        }
        Err(EvolutionError::DegenerateReproduction {
            attempts,
            parent_a: a.genome_string(GeneEncoder::Human, GENOME_SEPARATOR),
            parent_b: b.genome_string(GeneEncoder::Human, GENOME_SEPARATOR),
        })
    }

    /// Breed a full population from `ranked` entrants.
    ///
    /// Entrants are shuffled into buckets of `ceil(population / 10)` (at least
    /// two), where the population is the world's current size,
    /// each bucket sorted by fitness. Buckets are visited round-robin; each
    /// visit pairs the two fittest remaining entrants of the bucket and yields
    /// two offspring, one per parent order. Once no bucket holds a pair, the
    /// buckets are rebuilt from the full standings.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::PopulationTooSmall`] for fewer than two entrants or
    /// an empty world, or a reproduction error.
    pub fn tournament(&mut self, ranked: &[Agent]) -> Result<Vec<Agent>> {
        let target = self.agents.len();
        if ranked.len() < 2 {
            return Err(EvolutionError::PopulationTooSmall(ranked.len()));
        }
        if target < 2 {
            return Err(EvolutionError::PopulationTooSmall(target));
        }

        let bucket_size = bucket_size(target);
        let mut offspring = Vec::with_capacity(target + 1);
        let mut buckets = self.buckets(ranked, bucket_size);
        let mut cursor = 0;

        while offspring.len() < target {
            if buckets.iter().all(|bucket| bucket.len() < 2) {
                debug!(produced = offspring.len(), "tournament buckets exhausted, refilling");
                buckets = self.buckets(ranked, bucket_size);
                cursor = 0;
            }
            let slot = cursor % buckets.len();
            cursor += 1;
            if buckets[slot].len() < 2 {
                continue;
            }
            let first = &ranked[buckets[slot].remove(0)];
            let second = &ranked[buckets[slot].remove(0)];
            offspring.push(self.reproduce(first, second)?);
            offspring.push(self.reproduce(second, first)?);
        }

        offspring.truncate(target);
        Ok(offspring)
    }

    /// Shuffled buckets of indices into `ranked`, each sorted fittest first.
    fn buckets(&mut self, ranked: &[Agent], bucket_size: usize) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..ranked.len()).collect();
        order.shuffle(&mut self.rng);
        order
            .chunks(bucket_size)
            .map(|chunk| {
                let mut bucket = chunk.to_vec();
                bucket.sort_by(|&a, &b| {
                    rank_key(ranked[b].fitness()).total_cmp(&rank_key(ranked[a].fitness()))
                });
                bucket
            })
            .collect()
    }

    /// Evaluate, rank and replace the population once.
    ///
    /// Agents are reset, stepped through `data` and scored row by row. The
    /// best agent is replaced only by a strictly fitter one, which is then
    /// checkpointed. The top `round(population * survive_rate)` agents (at
    /// least two) enter the tournament that breeds the next population.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::PopulationTooSmall`], [`EvolutionError::InputLength`]
    /// for a row shorter than the agents' inputs, or a reproduction error.
    pub fn next_generation<F>(&mut self, fitness: &F, data: &[DataRow], survive_rate: f64) -> Result<&mut Self>
    where
        F: Fitness + ?Sized,
    {
        let population = self.agents.len();
        if population <= 1 {
            return Err(EvolutionError::PopulationTooSmall(population));
        }

        for agent in &mut self.agents {
            agent.reset();
        }
        self.evaluate(fitness, data)?;

        self.agents
            .sort_by(|a, b| rank_key(b.fitness()).total_cmp(&rank_key(a.fitness())));
        let top = self.agents[0].fitness();
        self.record_best(top);

        let survivors = ((population as f64 * survive_rate).round() as usize).clamp(2, population);
        let ranked = self.agents[..survivors].to_vec();
        let next = self.tournament(&ranked)?;
        self.agents = next;

        info!(
            world = %self.name,
            generation = self.generation,
            top_fitness = top,
            best_fitness = self.best_fitness(),
            survivors,
            "generation complete"
        );

        if let Err(e) = self.autosave() {
            warn!(world = %self.name, generation = self.generation, error = %e, "autosave failed");
        }

        self.generation += 1;
        Ok(self)
    }

    /// Save the population if this generation is due and a store is attached.
    ///
    /// Returns whether a save happened.
    fn autosave(&mut self) -> Result<bool> {
        let every = self.config.autosave_every;
        if every == 0 || self.generation % every != 0 || self.store.is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    fn evaluate<F>(&mut self, fitness: &F, data: &[DataRow]) -> Result<()>
    where
        F: Fitness + ?Sized,
    {
        let snapshot = self.agents.clone();
        let generation = self.generation;
        let best_fitness = self.best_fitness();
        let run = |(index, agent): (usize, &mut Agent)| {
            let context = EvaluationContext {
                generation,
                best_fitness,
                population: &snapshot,
                index,
            };
            evaluate_agent(agent, fitness, data, &context)
        };

        #[cfg(feature = "parallel")]
        let result = self.agents.par_iter_mut().enumerate().try_for_each(run);
        #[cfg(not(feature = "parallel"))]
        let result = self.agents.iter_mut().enumerate().try_for_each(run);
        result
    }

    fn record_best(&mut self, top: f64) {
        let improved = match self.best_fitness() {
            _ if top.is_nan() => false,
            Some(best) => top > best,
            None => true,
        };
        if !improved {
            return;
        }

        let best = self.agents[0].clone();
        info!(world = %self.name, generation = self.generation, fitness = top, "new best agent");
        if let Some(store) = self.store.as_mut() {
            let genome = best.genome_string(self.config.checkpoint_encoder, &self.config.gene_separator);
            if let Err(e) = store.save_best(&self.name, &genome) {
                warn!(world = %self.name, error = %e, "saving best agent failed");
            }
        }
        self.best_agent = Some(best);
    }

    /// Persist the whole population through the checkpoint store.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::InvalidConfig`] without a store, or the store's error.
    pub fn save(&mut self) -> Result<()> {
        let dump = self.genomes_string(self.config.checkpoint_encoder, &self.config.gene_separator);
        let Some(store) = self.store.as_mut() else {
            return Err(EvolutionError::InvalidConfig("no checkpoint store configured".into()));
        };
        store.save_world(&self.name, &dump)?;
        debug!(world = %self.name, generation = self.generation, "world saved");
        Ok(())
    }

    /// Run several generations.
    ///
    /// Stops after `options.generations` generations (never, when 0), when the
    /// time limit elapses, when the cancel flag is raised, or when `stop`
    /// returns true after a generation. With a batch size smaller than the
    /// data, each generation sees the next contiguous chunk of rows, wrapping
    /// around the end.
    ///
    /// Returns the number of generations run.
    ///
    /// # Errors
    ///
    /// Everything [`next_generation`](Self::next_generation) returns.
    pub fn step<F>(
        &mut self,
        fitness: &F,
        data: &[DataRow],
        options: &StepOptions,
        stop: Option<StopCondition<'_>>,
    ) -> Result<u64>
    where
        F: Fitness + ?Sized,
    {
        if options.is_unbounded() && stop.is_none() {
            warn!(world = %self.name, "running without generation count, stop condition, time limit or cancel flag");
        }

        let started = Instant::now();
        let mut run = 0;
        loop {
            if options.generations > 0 && run >= options.generations {
                break;
            }
            if options
                .cancel
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Relaxed))
            {
                info!(world = %self.name, generations = run, "evolution cancelled");
                break;
            }
            if options.time_limit.is_some_and(|limit| started.elapsed() >= limit) {
                info!(world = %self.name, generations = run, "time limit reached");
                break;
            }

            let batch = batch(data, options.batch_size, run);
            self.next_generation(fitness, &batch, options.survive_rate)?;
            run += 1;

            if stop.is_some_and(|stop| stop(self)) {
                info!(world = %self.name, generations = run, "stop condition met");
                break;
            }
        }
        Ok(run)
    }
}

/// Tournament bucket size for a population.
fn bucket_size(population: usize) -> usize {
    population.div_ceil(10).max(2)
}

/// NaN fitness ranks below everything.
fn rank_key(fitness: f64) -> f64 {
    if fitness.is_nan() {
        f64::NEG_INFINITY
    } else {
        fitness
    }
}

fn evaluate_agent<F>(agent: &mut Agent, fitness: &F, data: &[DataRow], context: &EvaluationContext<'_>) -> Result<()>
where
    F: Fitness + ?Sized,
{
    for row in data {
        if row.is_reset() {
            agent.reset_memory();
            continue;
        }
        agent.step(&row.input)?;
        let score = fitness.score(agent, row, context);
        agent.add_fitness(score);
    }
    Ok(())
}

/// The rows evaluated in generation number `run` of a batched run.
fn batch(data: &[DataRow], batch_size: usize, run: u64) -> Cow<'_, [DataRow]> {
    if batch_size == 0 || batch_size >= data.len() {
        return Cow::Borrowed(data);
    }
    let start = (run as usize).wrapping_mul(batch_size) % data.len();
    if start + batch_size <= data.len() {
        Cow::Borrowed(&data[start..start + batch_size])
    } else {
        Cow::Owned(data.iter().cycle().skip(start).take(batch_size).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::config::MutationRates;

    fn seeded_config() -> EvolutionConfig {
        EvolutionConfig::default().with_seed(42)
    }

    fn output_fitness(agent: &Agent, _row: &DataRow, _ctx: &EvaluationContext<'_>) -> f64 {
        agent.output_values()[0]
    }

    /// A store whose every write fails.
    struct FullDisk;

    impl CheckpointStore for FullDisk {
        fn save_best(&mut self, _name: &str, _genome: &str) -> Result<()> {
            Err(std::io::Error::other("disk full").into())
        }

        fn save_world(&mut self, _name: &str, _genomes: &str) -> Result<()> {
            Err(std::io::Error::other("disk full").into())
        }

        fn load_best(&self, name: &str) -> Result<String> {
            Err(EvolutionError::MissingCheckpoint(name.into()))
        }

        fn load_world(&self, name: &str) -> Result<String> {
            Err(EvolutionError::MissingCheckpoint(name.into()))
        }
    }

    #[test]
    fn test_create_agents_requires_population() {
        let mut world = World::new("tiny", seeded_config()).unwrap();
        assert!(matches!(
            world.create_agents(1, &AgentShape::dynamic(2, 1)),
            Err(EvolutionError::PopulationTooSmall(1))
        ));
        assert!(world.create_agents(0, &AgentShape::dynamic(2, 1)).is_err());
    }

    #[test]
    fn test_create_dynamic_agents() {
        let mut world = World::new("dynamic", seeded_config()).unwrap();
        world.create_agents(10, &AgentShape::dynamic(3, 2)).unwrap();
        assert_eq!(world.population_size(), 10);
        for agent in world.agents() {
            assert_eq!(agent.neuron_count(NeuronType::Input), 3);
            assert_eq!(agent.neuron_count(NeuronType::Output), 2);
            assert!(agent.neuron_count(NeuronType::Hidden) >= 1);
            assert!(!agent.is_layered());
        }
    }

    #[test]
    fn test_create_layered_agents() {
        let mut world = World::new("layered", seeded_config()).unwrap();
        world
            .create_agents(4, &AgentShape::layered(2, vec![4, 3], 1))
            .unwrap();
        for agent in world.agents() {
            assert_eq!(agent.neuron_count(NeuronType::Hidden), 7);
            assert_eq!(agent.layers(), Some(&[4, 3][..]));
        }
    }

    #[test]
    fn test_data_row_reset_marker() {
        assert!(DataRow::reset().is_reset());
        assert!(!DataRow::new(vec![1.0], vec![]).is_reset());
    }

    #[test]
    fn test_batch_rotation() {
        let data: Vec<DataRow> = (0..5).map(|i| DataRow::new(vec![f64::from(i)], vec![])).collect();
        let firsts: Vec<f64> = (0..4).map(|run| batch(&data, 2, run)[0].input[0]).collect();
        assert_eq!(firsts, vec![0.0, 2.0, 4.0, 1.0]);
        assert_eq!(batch(&data, 2, 2).len(), 2);
        assert_eq!(batch(&data, 2, 2)[1].input[0], 0.0);
        assert_eq!(batch(&data, 0, 3).len(), 5);
        assert_eq!(batch(&data, 9, 3).len(), 5);
    }

    #[test]
    fn test_evaluation_context_others() {
        let mut world = World::new("ctx", seeded_config()).unwrap();
        world.create_agents(3, &AgentShape::dynamic(1, 1)).unwrap();
        let context = EvaluationContext {
            generation: 1,
            best_fitness: None,
            population: world.agents(),
            index: 1,
        };
        assert_eq!(context.others().count(), 2);
        assert_eq!(context.index(), 1);
    }

    #[test]
    fn test_tournament_fills_population() {
        let mut world = World::new("tournament", seeded_config()).unwrap();
        world.create_agents(20, &AgentShape::dynamic(2, 1)).unwrap();
        let mut ranked = world.agents().to_vec();
        for (i, agent) in ranked.iter_mut().enumerate() {
            agent.set_fitness(i as f64);
        }
        ranked.reverse();

        let offspring = world.tournament(&ranked[..6]).unwrap();
        assert_eq!(offspring.len(), 20);
        assert!(offspring.iter().all(|agent| agent.connection_count() > 0));
        assert!(offspring.iter().all(|agent| agent.fitness() == 0.0));
    }

    #[test]
    fn test_bucket_size_follows_population() {
        assert_eq!(bucket_size(2), 2);
        assert_eq!(bucket_size(20), 2);
        assert_eq!(bucket_size(50), 5);
        assert_eq!(bucket_size(101), 11);

        let mut world = World::new("buckets", seeded_config()).unwrap();
        world.create_agents(50, &AgentShape::dynamic(2, 1)).unwrap();
        let ranked = world.agents()[..40].to_vec();
        let buckets = world.buckets(&ranked, bucket_size(world.population_size()));
        assert_eq!(buckets.len(), 8);
        assert!(buckets.iter().all(|bucket| bucket.len() == 5));

        let offspring = world.tournament(&ranked).unwrap();
        assert_eq!(offspring.len(), 50);
    }

    #[test]
    fn test_tournament_rejects_single_entrant() {
        let mut world = World::new("single", seeded_config()).unwrap();
        world.create_agents(4, &AgentShape::dynamic(2, 1)).unwrap();
        let ranked = world.agents()[..1].to_vec();
        assert!(matches!(
            world.tournament(&ranked),
            Err(EvolutionError::PopulationTooSmall(1))
        ));
    }

    #[test]
    fn test_reproduce_propagates_shape() {
        let mut world = World::new("shape", seeded_config()).unwrap();
        world
            .create_agents(2, &AgentShape::layered(2, vec![2], 1).with_memory(true))
            .unwrap();
        let (a, b) = (world.agents()[0].clone(), world.agents()[1].clone());
        let child = world.reproduce(&a, &b).unwrap();
        assert!(child.has_memory());
        assert_eq!(child.layers(), Some(&[2][..]));
    }

    #[test]
    fn test_reproduce_gives_up_on_empty_parents() {
        let mut world = World::new("empty", seeded_config()).unwrap();
        let mut a = Agent::new(false);
        a.create_neurons(NeuronType::Output, 1).unwrap();
        let b = a.clone();
        match world.reproduce(&a, &b) {
            Err(EvolutionError::DegenerateReproduction { attempts, .. }) => assert_eq!(attempts, 100),
            other => panic!("expected degenerate reproduction, got {other:?}"),
        }
    }

    #[test]
    fn test_next_generation_tracks_best_monotonically() {
        let mut world = World::new("best", seeded_config()).unwrap();
        world.create_agents(12, &AgentShape::dynamic(2, 1)).unwrap();
        let data = vec![DataRow::new(vec![1.0, 0.0], vec![1.0])];

        let mut previous = f64::NEG_INFINITY;
        for generation in 1..=5 {
            assert_eq!(world.generation(), generation);
            world.next_generation(&output_fitness, &data, 0.5).unwrap();
            let best = world.best_fitness().unwrap();
            assert!(best >= previous);
            previous = best;
        }
        assert_eq!(world.population_size(), 12);
    }

    #[test]
    fn test_next_generation_reports_short_rows() {
        let mut world = World::new("short", seeded_config()).unwrap();
        world.create_agents(4, &AgentShape::dynamic(3, 1)).unwrap();
        let data = vec![DataRow::new(vec![1.0], vec![1.0])];
        assert!(matches!(
            world.next_generation(&output_fitness, &data, 0.5),
            Err(EvolutionError::InputLength { expected: 3, actual: 1 })
        ));
    }

    #[test]
    fn test_nan_fitness_never_becomes_best() {
        let mut world = World::new("nan", seeded_config()).unwrap();
        world.create_agents(4, &AgentShape::dynamic(1, 1)).unwrap();
        let data = vec![DataRow::new(vec![1.0], vec![])];
        let nan = |_: &Agent, _: &DataRow, _: &EvaluationContext<'_>| f64::NAN;
        world.next_generation(&nan, &data, 0.5).unwrap();
        assert!(world.best_agent().is_none());
    }

    #[test]
    fn test_best_agent_checkpointed_on_improvement() {
        let mut world = World::new("ckpt", seeded_config())
            .unwrap()
            .with_store(Box::new(MemoryCheckpointStore::new()));
        world.create_agents(6, &AgentShape::dynamic(2, 1)).unwrap();
        let data = vec![DataRow::new(vec![0.5, 0.5], vec![])];
        world.next_generation(&output_fitness, &data, 0.5).unwrap();

        let best = world.best_agent().unwrap().genome_string(GeneEncoder::Hex, ";");
        let saved = world.store.as_ref().unwrap().load_best("ckpt").unwrap();
        assert_eq!(saved, best);
    }

    #[test]
    fn test_step_runs_requested_generations() {
        let mut world = World::new("steps", seeded_config()).unwrap();
        world.create_agents(6, &AgentShape::dynamic(2, 1)).unwrap();
        let data = vec![
            DataRow::new(vec![0.0, 1.0], vec![1.0]),
            DataRow::reset(),
            DataRow::new(vec![1.0, 0.0], vec![1.0]),
        ];
        let ran = world
            .step(&output_fitness, &data, &StepOptions::generations(3, 0.5), None)
            .unwrap();
        assert_eq!(ran, 3);
        assert_eq!(world.generation(), 4);
    }

    #[test]
    fn test_step_stop_condition_and_cancel() {
        let mut world = World::new("stop", seeded_config()).unwrap();
        world.create_agents(4, &AgentShape::dynamic(1, 1)).unwrap();
        let data = vec![DataRow::new(vec![1.0], vec![])];

        let stop: StopCondition<'_> = &|w: &World| w.generation() > 2;
        let ran = world
            .step(&output_fitness, &data, &StepOptions::generations(0, 0.5), Some(stop))
            .unwrap();
        assert_eq!(ran, 2);

        let cancel = Arc::new(AtomicBool::new(true));
        let options = StepOptions {
            generations: 0,
            cancel: Some(Arc::clone(&cancel)),
            ..Default::default()
        };
        assert_eq!(world.step(&output_fitness, &data, &options, None).unwrap(), 0);

        let options = StepOptions {
            generations: 0,
            time_limit: Some(Duration::ZERO),
            ..Default::default()
        };
        assert_eq!(world.step(&output_fitness, &data, &options, None).unwrap(), 0);
    }

    #[test]
    fn test_autosave_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = EvolutionConfig {
            autosave_every: 1,
            checkpoint_dir: Some(dir.path().to_path_buf()),
            mutation: MutationRates::weights_only(0.4, 1),
            ..seeded_config()
        };
        let shape = AgentShape::dynamic(3, 2);
        let mut world = World::new("reload", config.clone()).unwrap();
        world.create_agents(5, &shape).unwrap();
        let data = vec![DataRow::new(vec![1.0, 0.0, 1.0], vec![])];
        world.next_generation(&output_fitness, &data, 0.6).unwrap();

        let loaded = World::load_autosaved("reload", config, &shape, None).unwrap();
        assert_eq!(loaded.population_size(), 5);
        for (original, restored) in world.agents().iter().zip(loaded.agents()) {
            assert_eq!(restored.neuron_count(NeuronType::Input), 3);
            assert_eq!(original.genome().len(), restored.genome().len());
        }
    }

    #[test]
    fn test_load_autosaved_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let config = EvolutionConfig {
            checkpoint_dir: Some(dir.path().to_path_buf()),
            ..seeded_config()
        };
        assert!(matches!(
            World::load_autosaved("absent", config, &AgentShape::dynamic(1, 1), None),
            Err(EvolutionError::MissingCheckpoint(_))
        ));
        assert!(matches!(
            World::load_autosaved("absent", seeded_config(), &AgentShape::dynamic(1, 1), None),
            Err(EvolutionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_failing_store_does_not_abort_run() {
        let config = EvolutionConfig {
            autosave_every: 1,
            ..seeded_config()
        };
        let mut world = World::new("full", config).unwrap().with_store(Box::new(FullDisk));
        world.create_agents(6, &AgentShape::dynamic(2, 1)).unwrap();
        assert!(world.autosave().is_err());

        let data = vec![DataRow::new(vec![0.4, 0.6], vec![])];
        let ran = world
            .step(&output_fitness, &data, &StepOptions::generations(3, 0.5), None)
            .unwrap();
        assert_eq!(ran, 3);
        assert_eq!(world.generation(), 4);
        assert!(world.best_agent().is_some());
    }

    #[test]
    fn test_autosave_skipped_without_store() {
        let mut world = World::new("preset", EvolutionConfig::dynamic().with_seed(3)).unwrap();
        world.create_agents(4, &AgentShape::dynamic(2, 1)).unwrap();
        world.generation = 10;
        assert!(!world.autosave().unwrap());

        let mut world = world.with_store(Box::new(MemoryCheckpointStore::new()));
        assert!(world.autosave().unwrap());
        world.generation = 11;
        assert!(!world.autosave().unwrap());
    }

    #[test]
    fn test_save_without_store_is_an_error() {
        let mut world = World::new("nostore", seeded_config()).unwrap();
        world.create_agents(2, &AgentShape::dynamic(1, 1)).unwrap();
        assert!(matches!(world.save(), Err(EvolutionError::InvalidConfig(_))));
        assert_eq!(world.genomes_string(GeneEncoder::Json, ";").lines().count(), 2);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let run = || {
            let mut world = World::new("repro", seeded_config()).unwrap();
            world.create_agents(8, &AgentShape::dynamic(2, 1)).unwrap();
            let data = vec![DataRow::new(vec![0.2, 0.8], vec![])];
            world
                .step(&output_fitness, &data, &StepOptions::generations(3, 0.5), None)
                .unwrap();
            world.genomes_string(GeneEncoder::Hex, ";")
        };
        assert_eq!(run(), run());
    }
}
