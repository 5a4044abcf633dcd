//! Evolve layered agents that solve XOR with a bias input.
//!
//! Run with `cargo run --example xor`. Log verbosity comes from `XOR_LOG`
//! (`info` by default).

use symbios_neuroevo::{
    Agent, AgentShape, DataRow, EvaluationContext, EvolutionConfig, GeneEncoder, StepOptions,
    StopCondition, World,
};
use tracing::info;
use tracing_subscriber::fmt;

const POPULATION: usize = 100;
const GENERATIONS: u64 = 300;
const SURVIVE_RATE: f64 = 0.8;

fn main() -> symbios_neuroevo::Result<()> {
    let level = std::env::var("XOR_LOG")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(tracing::Level::INFO);
    fmt().with_max_level(level).init();

    let data = vec![
        DataRow::new(vec![1.0, 0.0, 0.0], vec![0.0]),
        DataRow::new(vec![1.0, 0.0, 1.0], vec![1.0]),
        DataRow::new(vec![1.0, 1.0, 0.0], vec![1.0]),
        DataRow::new(vec![1.0, 1.0, 1.0], vec![0.0]),
    ];
    let fitness = |agent: &Agent, row: &DataRow, _: &EvaluationContext<'_>| {
        1.0 - (agent.output_values()[0] - row.output[0]).abs()
    };

    let mut world = World::new("xor", EvolutionConfig::layered())?;
    world.create_agents(POPULATION, &AgentShape::layered(3, vec![3, 2], 1))?;

    let solved: StopCondition<'_> = &|w: &World| w.best_fitness().is_some_and(|f| f > 3.9);
    let ran = world.step(
        &fitness,
        &data,
        &StepOptions::generations(GENERATIONS, SURVIVE_RATE),
        Some(solved),
    )?;

    let Some(best) = world.best_agent() else {
        return Ok(());
    };
    info!(generations = ran, fitness = best.fitness(), "evolution finished");

    let mut best = best.clone();
    for row in &data {
        best.reset_memory();
        best.step(&row.input)?;
        info!(input = ?&row.input[1..], expected = row.output[0], output = best.output_values()[0], "xor");
    }
    println!("{}", best.genome_string(GeneEncoder::Human, "\n"));
    Ok(())
}
