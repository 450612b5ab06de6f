use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{KIB, MIB};

/// The transfer client rejects chunks of 4MB or more
pub const MAX_CHUNK_EXPONENT: u32 = 21;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("Chunk size must be a positive power of two, got {0}")]
    NotPowerOfTwo(u64),
    #[error("Chunk size {0} exceeds the 2^21 byte limit")]
    TooLarge(u64),
    #[error("Invalid chunk sweep 2^{min}..=2^{max}")]
    InvalidSweep { min: u32, max: u32 },
}

/// Transfer block size in bytes of one benchmark configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ChunkSize(u64);

impl ChunkSize {
    pub fn new(bytes: u64) -> Result<Self, ChunkError> {
        if !bytes.is_power_of_two() {
            return Err(ChunkError::NotPowerOfTwo(bytes));
        }
        if bytes > 1 << MAX_CHUNK_EXPONENT {
            return Err(ChunkError::TooLarge(bytes));
        }
        Ok(Self(bytes))
    }

    pub fn from_exponent(exponent: u32) -> Result<Self, ChunkError> {
        if exponent > MAX_CHUNK_EXPONENT {
            return Err(ChunkError::TooLarge(1u64 << exponent.min(63)));
        }
        Ok(Self(1 << exponent))
    }

    pub fn bytes(self) -> u64 {
        self.0
    }

    /// Axis label, ie. `4K` or `2M`
    pub fn label(self) -> String {
        match self.0 {
            b if b >= MIB && b % MIB == 0 => format!("{}M", b / MIB),
            b if b >= KIB && b % KIB == 0 => format!("{}K", b / KIB),
            b => b.to_string(),
        }
    }
}

impl fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for ChunkSize {
    type Error = ChunkError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChunkSize> for u64 {
    fn from(value: ChunkSize) -> Self {
        value.0
    }
}

/// Inclusive range of power of two exponents that a benchmark swept through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChunkSweep {
    pub min_exponent: u32,
    pub max_exponent: u32,
}

impl Default for ChunkSweep {
    fn default() -> Self {
        Self {
            min_exponent: 10,
            max_exponent: MAX_CHUNK_EXPONENT,
        }
    }
}

impl ChunkSweep {
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.min_exponent > self.max_exponent || self.max_exponent > MAX_CHUNK_EXPONENT {
            return Err(ChunkError::InvalidSweep {
                min: self.min_exponent,
                max: self.max_exponent,
            });
        }
        Ok(())
    }

    /// Chunk sizes in increasing order
    pub fn sizes(&self) -> Result<Vec<ChunkSize>, ChunkError> {
        self.validate()?;
        (self.min_exponent..=self.max_exponent)
            .map(ChunkSize::from_exponent)
            .collect()
    }

    pub fn len(&self) -> usize {
        match self.validate() {
            Ok(()) => (self.max_exponent - self.min_exponent + 1) as usize,
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sweep_matches_size_labels() {
        let labels = ChunkSweep::default()
            .sizes()
            .unwrap()
            .into_iter()
            .map(ChunkSize::label)
            .collect::<Vec<_>>();
        assert_eq!(
            labels,
            [
                "1K", "2K", "4K", "8K", "16K", "32K", "64K", "128K", "256K", "512K", "1M", "2M"
            ]
        );
    }

    #[test]
    fn default_sweep_bytes() {
        let sizes = ChunkSweep::default().sizes().unwrap();
        assert_eq!(sizes.len(), 12);
        assert_eq!(sizes.first().unwrap().bytes(), 1024);
        assert_eq!(sizes.last().unwrap().bytes(), 2_097_152);
        assert!(sizes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn rejects_invalid_sizes() {
        assert_eq!(ChunkSize::new(0), Err(ChunkError::NotPowerOfTwo(0)));
        assert_eq!(ChunkSize::new(1000), Err(ChunkError::NotPowerOfTwo(1000)));
        assert_eq!(ChunkSize::new(4 * MIB), Err(ChunkError::TooLarge(4 * MIB)));
        assert!(ChunkSize::new(2 * MIB).is_ok());
    }

    #[test]
    fn small_sizes_label_in_bytes() {
        assert_eq!(ChunkSize::new(512).unwrap().label(), "512");
        assert_eq!(ChunkSize::from_exponent(0).unwrap().label(), "1");
    }

    #[test]
    fn rejects_inverted_sweep() {
        let sweep = ChunkSweep {
            min_exponent: 15,
            max_exponent: 12,
        };
        assert!(sweep.sizes().is_err());
        assert!(sweep.is_empty());

        let sweep = ChunkSweep {
            min_exponent: 10,
            max_exponent: 22,
        };
        assert_eq!(
            sweep.validate(),
            Err(ChunkError::InvalidSweep { min: 10, max: 22 })
        );
    }
}
