use std::path::PathBuf;

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    chunk::{ChunkError, ChunkSize, ChunkSweep},
    result::{ResultFile, discover},
};

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Malformed measurement in {path:?}, expected `used <secs> secs`, got {line:?}")]
    Format { path: PathBuf, line: String },
    #[error("No result files for chunk size {0}")]
    NoData(ChunkSize),
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Sweep(#[from] ChunkError),
}

/// Mean transfer time of every run with one chunk size
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkMean {
    pub chunk_size: ChunkSize,
    pub label: String,
    pub mean: f64,
    pub samples: usize,
}

/// Reads benchmark result files out of a single directory. Nothing is cached, every
/// call rescans the directory.
#[derive(Debug, Clone)]
pub struct Aggregator {
    dir: PathBuf,
}

impl Aggregator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn average_duration(&self, chunk_size: ChunkSize) -> Result<f64, AggregateError> {
        self.chunk_mean(chunk_size).map(|x| x.mean)
    }

    pub fn chunk_mean(&self, chunk_size: ChunkSize) -> Result<ChunkMean, AggregateError> {
        let files = discover(&self.dir, chunk_size)?;
        if files.is_empty() {
            return Err(AggregateError::NoData(chunk_size));
        }

        let mut sum = 0.0;
        for file in &files {
            sum += file.read_duration()?;
        }
        let mean = sum / files.len() as f64;
        debug!("chunk size {chunk_size}: {mean} secs over {} runs", files.len());

        Ok(ChunkMean {
            chunk_size,
            label: chunk_size.label(),
            mean,
            samples: files.len(),
        })
    }

    /// One [`ChunkMean`] per chunk size of `sweep`, in increasing chunk size order. On
    /// failure the error of the smallest failing chunk size is returned.
    pub fn chunk_means(&self, sweep: &ChunkSweep) -> Result<Vec<ChunkMean>, AggregateError> {
        let sizes = sweep.sizes()?;
        info!("Aggregating {} chunk sizes in {:?}", sizes.len(), self.dir);
        let results = sizes
            .into_par_iter()
            .map(|chunk_size| self.chunk_mean(chunk_size))
            .collect::<Vec<_>>();
        results.into_iter().collect()
    }

    /// Result files found for each chunk size of `sweep`
    pub fn inventory(
        &self,
        sweep: &ChunkSweep,
    ) -> Result<Vec<(ChunkSize, Vec<ResultFile>)>, AggregateError> {
        sweep
            .sizes()?
            .into_iter()
            .map(|chunk_size| Ok((chunk_size, discover(&self.dir, chunk_size)?)))
            .collect()
    }
}
