//! CLI argument parsing
//!
//! # Usage
//!
//! ```bash
//! foldwise train config.yaml
//! foldwise train config.yaml --epochs 20 --lr 0.001
//! foldwise train config.yaml --continue-train 2 --continue-from result/mlp_0
//! foldwise train config.yaml --resume --continue-from result/mlp_0
//! foldwise validate config.yaml
//! foldwise info config.yaml --format json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::schema::RunSpec;

/// Foldwise: cross-validated training for audio classification
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "foldwise")]
#[command(version)]
#[command(about = "Stratified k-fold training with a resumable ensemble of fold models")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Train all folds of a run from YAML configuration
    Train(TrainArgs),

    /// Check a run configuration and its input tables without training
    Validate(ValidateArgs),

    /// Print the resolved run configuration
    Info(InfoArgs),
}

/// Arguments for the train command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct TrainArgs {
    /// Run configuration (YAML)
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Skip the first N folds of the run given by --continue-from
    #[arg(long, default_value_t = 0, conflicts_with = "resume")]
    pub continue_train: usize,

    /// Existing run directory to continue
    #[arg(long, value_name = "DIR")]
    pub continue_from: Option<PathBuf>,

    /// Continue with every fold the run's manifest lacks
    #[arg(long, requires = "continue_from")]
    pub resume: bool,

    /// Stop after training this many folds
    #[arg(long)]
    pub max_folds: Option<usize>,

    /// Override training.epochs
    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// Override batch size (skips probing)
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Override optimizer.lr
    #[arg(short, long)]
    pub lr: Option<f32>,

    /// Override the split seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Dry run (validate config and print the fold plan)
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Run configuration (YAML)
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Print a summary of every section
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for the info command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct InfoArgs {
    /// Run configuration (YAML)
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Output format (text, json, yaml)
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format for info command
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            _ => Err(format!(
                "Unknown output format: {}. Valid formats: text, json, yaml",
                s
            )),
        }
    }
}

/// Parse CLI arguments from a string slice (for testing)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Apply command-line overrides to a RunSpec
pub fn apply_overrides(spec: &mut RunSpec, args: &TrainArgs) {
    if let Some(epochs) = args.epochs {
        spec.training.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        spec.training.batch_size = Some(batch_size);
    }
    if let Some(lr) = args.lr {
        spec.optimizer.lr = lr;
    }
    if let Some(seed) = args.seed {
        spec.cv.seed = seed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train_args(args: &[&str]) -> TrainArgs {
        let mut argv = vec!["foldwise", "train", "config.yaml"];
        argv.extend_from_slice(args);
        match parse_args(argv).unwrap().command {
            Command::Train(args) => args,
            _ => panic!("Expected Train command"),
        }
    }

    #[test]
    fn test_parse_train_command() {
        let args = train_args(&[]);
        assert_eq!(args.config, PathBuf::from("config.yaml"));
        assert_eq!(args.continue_train, 0);
        assert_eq!(args.continue_from, None);
        assert!(!args.resume);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_parse_train_with_overrides() {
        let args = train_args(&["--epochs", "10", "--batch-size", "32", "--lr", "0.001"]);
        assert_eq!(args.epochs, Some(10));
        assert_eq!(args.batch_size, Some(32));
        assert!((args.lr.unwrap() - 0.001).abs() < 1e-6);
    }

    #[test]
    fn test_parse_continue_train() {
        let args = train_args(&["--continue-train", "2", "--continue-from", "result/mlp_0"]);
        assert_eq!(args.continue_train, 2);
        assert_eq!(args.continue_from, Some(PathBuf::from("result/mlp_0")));
    }

    #[test]
    fn test_parse_resume_with_limit() {
        let args = train_args(&[
            "--resume",
            "--continue-from",
            "result/mlp_0",
            "--max-folds",
            "1",
        ]);
        assert!(args.resume);
        assert_eq!(args.max_folds, Some(1));
    }

    #[test]
    fn test_resume_requires_run_dir() {
        assert!(parse_args(["foldwise", "train", "config.yaml", "--resume"]).is_err());
    }

    #[test]
    fn test_resume_conflicts_with_continue_train() {
        let result = parse_args([
            "foldwise",
            "train",
            "config.yaml",
            "--resume",
            "--continue-train",
            "2",
            "--continue-from",
            "result/mlp_0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_validate_detailed() {
        let cli = parse_args(["foldwise", "validate", "config.yaml", "--detailed"]).unwrap();
        match cli.command {
            Command::Validate(args) => {
                assert_eq!(args.config, PathBuf::from("config.yaml"));
                assert!(args.detailed);
            }
            _ => panic!("Expected Validate command"),
        }
    }

    #[test]
    fn test_parse_info_json_format() {
        let cli = parse_args(["foldwise", "info", "config.yaml", "--format", "json"]).unwrap();
        match cli.command {
            Command::Info(args) => assert_eq!(args.format, OutputFormat::Json),
            _ => panic!("Expected Info command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = parse_args(["foldwise", "-v", "train", "config.yaml"]).unwrap();
        assert!(cli.verbose);
        assert!(!cli.quiet);

        let cli = parse_args(["foldwise", "train", "config.yaml", "-q"]).unwrap();
        assert!(cli.quiet);
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("yaml".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert!("invalid".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut spec: RunSpec = serde_yaml::from_str(
            r#"
data:
  train: train.csv
  test: test.csv
  submission: sample_submission.csv
model:
  kind: linear
optimizer:
  name: adam
  lr: 0.01
cv:
  k: 3
output: {}
device: {}
"#,
        )
        .unwrap();
        let args = train_args(&["--epochs", "3", "--batch-size", "8", "--seed", "7"]);
        apply_overrides(&mut spec, &args);

        assert_eq!(spec.training.epochs, 3);
        assert_eq!(spec.training.batch_size, Some(8));
        assert_eq!(spec.cv.seed, 7);
        assert!((spec.optimizer.lr - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_command() {
        assert!(parse_args(["foldwise", "quantize", "model.json"]).is_err());
    }
}
