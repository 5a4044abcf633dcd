//! Checkpoint persistence for best agents and whole populations.
//!
//! Checkpoints are plain text: a best-agent checkpoint is one genome string,
//! a world checkpoint is one genome string per line. Both are namespaced by
//! the world name.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{EvolutionError, Result};

/// Storage backend for checkpoint text.
pub trait CheckpointStore: Send {
    /// Persist the best agent's genome string.
    fn save_best(&mut self, name: &str, genome: &str) -> Result<()>;

    /// Persist the whole population dump.
    fn save_world(&mut self, name: &str, genomes: &str) -> Result<()>;

    fn load_best(&self, name: &str) -> Result<String>;

    fn load_world(&self, name: &str) -> Result<String>;
}

/// Files under one directory: `{name}_best_agent.txt` and `{name}_world.txt`.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn best_agent_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}_best_agent.txt"))
    }

    #[must_use]
    pub fn world_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}_world.txt"))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(path, contents)?;
        Ok(())
    }

    fn read(path: PathBuf) -> Result<String> {
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(EvolutionError::MissingCheckpoint(path)),
            Err(e) => Err(e.into()),
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save_best(&mut self, name: &str, genome: &str) -> Result<()> {
        self.write(&self.best_agent_path(name), genome)
    }

    fn save_world(&mut self, name: &str, genomes: &str) -> Result<()> {
        self.write(&self.world_path(name), genomes)
    }

    fn load_best(&self, name: &str) -> Result<String> {
        Self::read(self.best_agent_path(name))
    }

    fn load_world(&self, name: &str) -> Result<String> {
        Self::read(self.world_path(name))
    }
}

/// In-memory store, handy for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    best: HashMap<String, String>,
    worlds: HashMap<String, String>,
}

impl MemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save_best(&mut self, name: &str, genome: &str) -> Result<()> {
        self.best.insert(name.to_string(), genome.to_string());
        Ok(())
    }

    fn save_world(&mut self, name: &str, genomes: &str) -> Result<()> {
        self.worlds.insert(name.to_string(), genomes.to_string());
        Ok(())
    }

    fn load_best(&self, name: &str) -> Result<String> {
        self.best
            .get(name)
            .cloned()
            .ok_or_else(|| EvolutionError::MissingCheckpoint(PathBuf::from(format!("{name}_best_agent"))))
    }

    fn load_world(&self, name: &str) -> Result<String> {
        self.worlds
            .get(name)
            .cloned()
            .ok_or_else(|| EvolutionError::MissingCheckpoint(PathBuf::from(format!("{name}_world"))))
    }
}
