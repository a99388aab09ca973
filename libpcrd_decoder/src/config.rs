use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::{DEFAULT_SECRET_ENV_VAR, INPUT_EXTENSION, OUTPUT_EXTENSION};
use super::error::ConfigError;
use super::pipeline::DecodeOptions;

/// Structure representing the application configuration. Contains pathing and decode options.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
///
/// The archive secret itself is never part of the config; only the name of the environment
/// variable that holds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub secret_env_var: String,
    pub strict_windows: bool,
    pub include_unassigned_wells: bool,
    pub n_threads: i32,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be empty/invalid
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            secret_env_var: String::from(DEFAULT_SECRET_ENV_VAR),
            strict_windows: false,
            include_unassigned_wells: false,
            n_threads: 1,
        }
    }
}

fn is_input_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(INPUT_EXTENSION))
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

    /// Look up the archive secret in the configured environment variable
    pub fn read_secret(&self) -> Result<String, ConfigError> {
        match std::env::var(&self.secret_env_var) {
            Ok(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(ConfigError::MissingSecret(self.secret_env_var.clone())),
        }
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            strict_windows: self.strict_windows,
            include_unassigned_wells: self.include_unassigned_wells,
        }
    }

    /// List the instrument files to decode, sorted by path.
    ///
    /// The input path is either a single file or a directory, which is scanned (not recursively).
    pub fn collect_input_files(&self) -> Result<Vec<PathBuf>, ConfigError> {
        if !self.input_path.exists() {
            return Err(ConfigError::BadFilePath(self.input_path.clone()));
        }
        if self.input_path.is_file() {
            return Ok(vec![self.input_path.clone()]);
        }

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(&self.input_path)? {
            let path = entry?.path();
            if is_input_file(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(ConfigError::NoInputFiles(self.input_path.clone()));
        }
        files.sort();
        Ok(files)
    }

    /// Get the path to the output dataset for an input file
    pub fn get_output_file_name(&self, input: &Path) -> Result<PathBuf, ConfigError> {
        if !self.output_path.exists() {
            return Err(ConfigError::BadFilePath(self.output_path.clone()));
        }
        let stem = input
            .file_stem()
            .ok_or_else(|| ConfigError::BadFilePath(input.to_path_buf()))?;
        Ok(self
            .output_path
            .join(format!("{}.{OUTPUT_EXTENSION}", stem.to_string_lossy())))
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }
}
