use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::derived::{BackgroundRange, DetectorPair};
use super::error::ConfigError;

/// Structure representing the application configuration. Contains pathing and run information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub data_path: PathBuf,
    pub file_prefix: String,
    pub file_extension: String,
    pub first_run_number: i32,
    pub last_run_number: i32,
    /// Overrides the default binning of each run when set
    pub binning: Option<i32>,
    /// Detector pair whose mean asymmetry is reported for each run
    pub asymmetry: Option<DetectorPair>,
}

impl Default for Config {
    /// Generate a new Config object. All fields will be empty/invalid
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("None"),
            file_prefix: String::from("deltat_"),
            file_extension: String::from("bin"),
            first_run_number: 0,
            last_run_number: 0,
            binning: None,
            asymmetry: Some(DetectorPair {
                plus: 0,
                minus: 1,
                alpha: 1.0,
                binning: 1,
                plus_background: BackgroundRange::new(0, 0),
                minus_background: BackgroundRange::new(0, 0),
            }),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Check if a specific run exists
    pub fn does_run_exist(&self, run_number: i32) -> bool {
        self.get_run_file(run_number).exists()
    }

    /// Get the path to a run file, `{prefix}{run:0>4}.{extension}` in the data directory
    pub fn get_run_file(&self, run_number: i32) -> PathBuf {
        self.data_path.join(format!(
            "{}{}.{}",
            self.file_prefix,
            self.get_run_str(run_number),
            self.file_extension
        ))
    }

    fn get_run_str(&self, run_number: i32) -> String {
        format!("{run_number:0>4}")
    }

    /// Number of runs in the configured (inclusive) range
    pub fn n_runs(&self) -> i32 {
        (self.last_run_number - self.first_run_number + 1).max(0)
    }

    pub fn is_binning_valid(&self) -> bool {
        self.binning.map(|b| b >= 1).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_file() {
        let config = Config {
            data_path: PathBuf::from("/data/gps"),
            first_run_number: 3,
            last_run_number: 5,
            ..Default::default()
        };
        assert_eq!(
            config.get_run_file(42),
            PathBuf::from("/data/gps/deltat_0042.bin")
        );
        assert_eq!(
            config.get_run_file(12345),
            PathBuf::from("/data/gps/deltat_12345.bin")
        );
        assert_eq!(config.n_runs(), 3);
        assert!(!config.does_run_exist(42));
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let config = Config {
            binning: Some(4),
            ..Default::default()
        };
        config.write_config_file(&path).unwrap();
        let loaded = Config::read_config_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_and_malformed() {
        assert!(matches!(
            Config::read_config_file(Path::new("/not/a/config.yaml")),
            Err(ConfigError::BadFilePath(_))
        ));
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "data_path: [unclosed").unwrap();
        assert!(matches!(
            Config::read_config_file(&path),
            Err(ConfigError::ParsingError(_))
        ));
    }

    #[test]
    fn test_binning_validation() {
        let mut config = Config::default();
        assert!(config.is_binning_valid());
        config.binning = Some(0);
        assert!(!config.is_binning_valid());
    }
}
