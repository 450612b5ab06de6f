use std::{
    fs::{File, read_dir},
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use tracing::{debug, trace};

use crate::{aggregate::AggregateError, chunk::ChunkSize};

static RESULT_FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^output_(.*)_([0-9]+)\.log$").unwrap());
static DURATION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^used (.*?) secs").unwrap());

/// A log written by one benchmark run, ie. `output_3_4096.log`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResultFile {
    pub path: PathBuf,
    pub run_index: String,
    pub chunk_size: ChunkSize,
}

impl ResultFile {
    /// Recognises a result file by name. Names with a chunk size that is not a valid
    /// [`ChunkSize`] are not result files.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let caps = RESULT_FILENAME.captures(name)?;
        let digits = caps.get(2)?.as_str();
        if digits.starts_with('0') {
            return None;
        }
        let chunk_size = ChunkSize::new(digits.parse().ok()?).ok()?;
        Some(Self {
            path: path.to_path_buf(),
            run_index: caps.get(1)?.as_str().to_owned(),
            chunk_size,
        })
    }

    pub fn read_duration(&self) -> Result<f64, AggregateError> {
        read_duration(&self.path)
    }
}

/// Extracts the duration from a `used <secs> secs ...` line
pub fn parse_duration(line: &str) -> Option<f64> {
    let caps = DURATION_LINE.captures(line)?;
    let secs = caps.get(1)?.as_str().trim().parse::<f64>().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(secs)
}

/// Reads only the first line of `path` and parses its duration
pub fn read_duration(path: &Path) -> Result<f64, AggregateError> {
    let io_err = |source| AggregateError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = BufReader::new(File::open(path).map_err(io_err)?);
    let mut buf = Vec::new();
    reader.read_until(b'\n', &mut buf).map_err(io_err)?;
    let format_err = |line: &str| AggregateError::Format {
        path: path.to_path_buf(),
        line: line.trim_end_matches(['\r', '\n']).to_owned(),
    };
    // undecodable bytes are a malformed measurement, not an IO failure
    let line = String::from_utf8(buf)
        .map_err(|e| format_err(&String::from_utf8_lossy(e.as_bytes())))?;
    let line = line.trim_end_matches(['\r', '\n']);

    let secs = parse_duration(line).ok_or_else(|| format_err(line))?;
    trace!("{path:?}: {secs} secs");
    Ok(secs)
}

/// Result files in `dir` for `chunk_size`, sorted by path
pub fn discover(dir: &Path, chunk_size: ChunkSize) -> Result<Vec<ResultFile>, AggregateError> {
    let entries = read_dir(dir).map_err(|source| AggregateError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| AggregateError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let Some(file) = ResultFile::from_path(&entry.path()) else {
            continue;
        };
        if file.chunk_size != chunk_size {
            continue;
        }
        if !entry.path().is_file() {
            debug!("Skipping non-file {:?}", entry.path());
            continue;
        }
        files.push(file);
    }
    files.sort();
    debug!("Found {} result files for chunk size {chunk_size}", files.len());
    Ok(files)
}
