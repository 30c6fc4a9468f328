//! Single-command training from YAML configuration

use super::schema::RunSpec;
use super::validate::validate_config;
use crate::error::{Error, Result};
use crate::run::{run, RunOptions, RunSummary};
use std::fs;
use std::path::Path;

/// Run cross-validated training from a YAML configuration file
///
/// This is the main entry point for declarative training. It:
/// 1. Loads, parses and validates the YAML config
/// 2. Splits the training table into stratified folds
/// 3. Trains one model per pending fold
/// 4. Writes the ensemble outputs into the run directory
///
/// # Example
///
/// ```no_run
/// use foldwise::config::train_from_yaml;
/// use foldwise::run::RunOptions;
///
/// let summary = train_from_yaml("config.yaml", &RunOptions::default())?;
/// println!("{} folds trained", summary.trained.len());
/// # Ok::<(), foldwise::Error>(())
/// ```
pub fn train_from_yaml<P: AsRef<Path>>(config_path: P, options: &RunOptions) -> Result<RunSummary> {
    let spec = load_config(config_path)?;
    run(&spec, options)
}

/// Load a run spec from YAML file (without running training)
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<RunSpec> {
    let yaml_content = fs::read_to_string(config_path.as_ref()).map_err(|e| {
        Error::ConfigError(format!(
            "Failed to read config file {}: {}",
            config_path.as_ref().display(),
            e
        ))
    })?;

    let spec = parse_config(&yaml_content)?;
    validate_config(&spec).map_err(|e| Error::ConfigError(format!("Invalid config: {}", e)))?;

    Ok(spec)
}

/// Parse a run spec without validating it
pub fn parse_config(yaml: &str) -> Result<RunSpec> {
    serde_yaml::from_str(yaml)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {}", e)))
}
