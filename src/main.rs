//! Foldwise CLI
//!
//! # Usage
//!
//! ```bash
//! # Train every fold of a new run
//! foldwise train config.yaml
//!
//! # Train with overrides
//! foldwise train config.yaml --epochs 10 --lr 0.001
//!
//! # Continue a run after its first two folds
//! foldwise train config.yaml --continue-train 2 --continue-from result/mlp_0
//!
//! # Finish whatever folds an interrupted run lacks
//! foldwise train config.yaml --resume --continue-from result/mlp_0
//!
//! # Validate config
//! foldwise validate config.yaml
//!
//! # Show config info
//! foldwise info config.yaml
//! ```

use clap::Parser;
use foldwise::config::{
    apply_overrides, load_config, Cli, Command, InfoArgs, OutputFormat, TrainArgs, ValidateArgs,
};
use foldwise::features::FeatureSpec;
use foldwise::run::{plan, run, RunOptions};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Configure output based on verbose/quiet flags
    let log_level = if cli.quiet {
        LogLevel::Quiet
    } else if cli.verbose {
        LogLevel::Verbose
    } else {
        LogLevel::Normal
    };
    init_logger(log_level);

    let result = match cli.command {
        Command::Train(args) => run_train(args, log_level),
        Command::Validate(args) => run_validate(args, log_level),
        Command::Info(args) => run_info(args, log_level),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum LogLevel {
    Quiet,
    Normal,
    Verbose,
}

fn init_logger(level: LogLevel) {
    let filter = match level {
        LogLevel::Quiet => "error",
        LogLevel::Normal => "info",
        LogLevel::Verbose => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp_secs()
        .init();
}

fn log(level: LogLevel, required: LogLevel, msg: &str) {
    if level != LogLevel::Quiet && (level == required || required == LogLevel::Normal) {
        println!("{msg}");
    }
}

fn run_train(args: TrainArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("Foldwise: training from {}", args.config.display()),
    );

    // Load and validate config
    let mut spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;

    // Apply command-line overrides
    apply_overrides(&mut spec, &args);

    if args.dry_run {
        let (plan, num_train, num_test) =
            plan(&spec).map_err(|e| format!("Config error: {e}"))?;
        log(
            level,
            LogLevel::Normal,
            "Dry run - config validated successfully",
        );
        log(
            level,
            LogLevel::Normal,
            &format!(
                "  {} training / {} test examples in {} folds",
                num_train,
                num_test,
                plan.k()
            ),
        );
        for fold in &plan.folds {
            log(
                level,
                LogLevel::Verbose,
                &format!(
                    "  {}: {} train / {} valid",
                    fold.dir_name(),
                    fold.train.len(),
                    fold.valid.len()
                ),
            );
        }
        return Ok(());
    }

    let options = RunOptions {
        continue_train: args.continue_train,
        continue_from: args.continue_from.clone(),
        resume: args.resume,
        max_folds: args.max_folds,
    };
    let summary = run(&spec, &options).map_err(|e| format!("Training error: {e}"))?;

    log(
        level,
        LogLevel::Normal,
        &format!(
            "Trained {} folds, skipped {} (run directory {})",
            summary.trained.len(),
            summary.skipped.len(),
            summary.run_dir.display()
        ),
    );
    match &summary.submission {
        Some(path) => log(
            level,
            LogLevel::Normal,
            &format!("Training complete! Submission: {}", path.display()),
        ),
        None => log(
            level,
            LogLevel::Normal,
            &format!(
                "Run incomplete; continue with --resume --continue-from {}",
                summary.run_dir.display()
            ),
        ),
    }
    Ok(())
}

fn run_validate(args: ValidateArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("Validating config: {}", args.config.display()),
    );

    let spec = load_config(&args.config).map_err(|e| format!("Validation failed: {e}"))?;

    log(level, LogLevel::Normal, "Configuration is valid");

    if args.detailed {
        println!();
        println!("Configuration Summary:");
        println!("  Training table: {}", spec.data.train.display());
        println!("  Test table: {}", spec.data.test.display());
        println!("  Submission template: {}", spec.data.submission.display());
        if let Some(root) = &spec.data.root {
            println!("  Audio root: {}", root.display());
        }
        println!("  Classes: {}", spec.data.num_classes);
        println!();
        match &spec.features {
            FeatureSpec::Spectral(p) => println!(
                "  Features: spectral ({} MFCCs, n_fft={}, hop={}, {} Hz)",
                p.n_mfcc, p.n_fft, p.hop_length, p.sample_rate
            ),
            FeatureSpec::Pretrained(p) => println!(
                "  Features: pretrained (frame_size={}, {} Hz)",
                p.frame_size, p.sample_rate
            ),
        }
        println!("  Model: {} (hidden={})", spec.model.kind, spec.model.hidden_size);
        println!();
        println!("  Optimizer: {}", spec.optimizer.name);
        println!("  Learning rate: {}", spec.optimizer.lr);
        println!();
        println!("  Epochs: {}", spec.training.epochs);
        println!("  Patience: {}", spec.training.patience);
        match spec.training.batch_size {
            Some(size) => println!("  Batch size: {size}"),
            None => println!(
                "  Batch size: probed (max {})",
                spec.training.max_batch_size
            ),
        }
        if let Some(clip) = spec.training.grad_clip {
            println!("  Gradient clipping: {clip}");
        }
        println!();
        println!("  Folds: {} (seed {})", spec.cv.k, spec.cv.seed);
        println!("  Result path: {}", spec.output.result_path.display());
        println!("  Model format: {}", spec.output.model_format.extension());
    }

    Ok(())
}

fn run_info(args: InfoArgs, level: LogLevel) -> Result<(), String> {
    let spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;

    match args.format {
        OutputFormat::Text => {
            log(level, LogLevel::Normal, "Configuration Info:");
            println!();
            println!("Model: {}", spec.model.kind);
            println!("Features: {}", spec.features.kind());
            println!(
                "Optimizer: {} (lr={})",
                spec.optimizer.name, spec.optimizer.lr
            );
            println!("Epochs: {}", spec.training.epochs);
            println!("Folds: {}", spec.cv.k);
            if let Some(memory_mb) = spec.device.memory_mb {
                println!("Device memory: {memory_mb} MB");
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&spec)
                .map_err(|e| format!("JSON serialization error: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&spec)
                .map_err(|e| format!("YAML serialization error: {e}"))?;
            println!("{yaml}");
        }
    }

    Ok(())
}
