use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    chart::{ChartOptions, ConfigurationError},
    chunk::{ChunkError, ChunkSweep},
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parsing {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Sweep(#[from] ChunkError),
    #[error(transparent)]
    Chart(#[from] ConfigurationError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the `output_<run>_<chunk>.log` files
    pub results_dir: PathBuf,
    pub sweep: ChunkSweep,
    pub chart: ChartOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("."),
            sweep: ChunkSweep::default(),
            chart: ChartOptions::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sweep.validate()?;
        self.chart.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs::write;

    use tempfile::tempdir;

    use super::*;
    use crate::chart::{LegendLocation, ValueFormat};

    #[test]
    fn empty_file_is_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunk-plot.toml");
        write(&path, "").unwrap();
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn partial_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunk-plot.toml");
        write(
            &path,
            r##"
results_dir = "logs"

[sweep]
max_exponent = 15

[chart]
bar_width = 0.8
figure_size = [10, 5]
bar_color = "#336699"
legend_location = "lower_left"
value_label_format = { style = "fixed", precision = 3 }
"##,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.results_dir, PathBuf::from("logs"));
        assert_eq!(config.sweep.min_exponent, 10);
        assert_eq!(config.sweep.len(), 6);
        assert_eq!(config.chart.bar_width, 0.8);
        assert_eq!(config.chart.figure_size, (10.0, 5.0));
        assert_eq!(config.chart.legend_location, LegendLocation::LowerLeft);
        assert_eq!(
            config.chart.value_label_format,
            ValueFormat::Fixed { precision: 3 }
        );
        assert_eq!(config.chart.y_max, 10.0);
    }

    #[test]
    fn unknown_fields_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunk-plot.toml");
        write(&path, "[chart]\nbar_colour = \"#000000\"\n").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunk-plot.toml");
        write(&path, "[chart]\nbar_width = -1.0\n").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Chart(ConfigurationError::InvalidOption {
                field: "bar_width",
                ..
            }))
        ));

        write(&path, "[sweep]\nmin_exponent = 12\nmax_exponent = 11\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Sweep(_))));
    }

    #[test]
    fn missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Config::load(&dir.path().join("nope.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
