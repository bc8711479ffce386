use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use nf_data::Equation;
use nf_model::NetworkSize;
use nf_results::RunStore;
use nf_solver::Method;
use nf_train::{CheckpointEvent, TrainConfig, TrainResult, Trainer};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nodefit")]
#[command(about = "Fit a Neural ODE to a synthetic 3D trajectory", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a vector field on a generated trajectory
    Train(TrainArgs),
    /// List stored runs
    Runs {
        /// Run store directory
        runs_dir: PathBuf,
    },
    /// Show the checkpoint history of a stored run
    ShowRun {
        /// Run store directory
        runs_dir: PathBuf,
        /// Run ID to display
        run_id: String,
    },
}

/// Every flag is optional so that only the ones given override the config file.
#[derive(Args, Debug)]
struct TrainArgs {
    /// Base configuration (YAML); flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Integration method: dopri5, adams, rk4 or euler
    #[arg(long)]
    method: Option<Method>,
    #[arg(long)]
    data_size: Option<usize>,
    #[arg(long)]
    batch_time: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    /// Minibatch iterations
    #[arg(long)]
    niters: Option<usize>,
    /// Evaluate every N iterations
    #[arg(long)]
    test_freq: Option<usize>,
    /// Write a figure at every evaluation
    #[arg(long)]
    viz: bool,
    /// CUDA device index
    #[arg(long)]
    gpu: Option<usize>,
    /// Backpropagate with the adjoint method
    #[arg(long)]
    adjoint: bool,
    /// Add the learned vector field panel to figures
    #[arg(long)]
    vecfield: bool,
    /// spiral, expanding_spiral, ellipse or parabola
    #[arg(long)]
    equation: Option<Equation>,
    #[arg(long, allow_hyphen_values = true)]
    start_time: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    end_time: Option<f64>,
    #[arg(short = 'l', long)]
    learning_rate: Option<f64>,
    /// Network size; repeat for larger networks (-s, -ss)
    #[arg(short = 's', long, action = ArgAction::Count)]
    network_size: u8,
    /// Full-batch iterations after the minibatch phase
    #[arg(long)]
    nfull: Option<usize>,
    #[arg(long)]
    momentum: Option<f64>,
    /// Seed for batch sampling
    #[arg(long)]
    seed: Option<u64>,
    /// Figure directory
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Store the run (manifest, checkpoints, weights) under this directory
    #[arg(long)]
    runs_dir: Option<PathBuf>,
    #[arg(long)]
    rtol: Option<f64>,
    #[arg(long)]
    atol: Option<f64>,
}

impl TrainArgs {
    fn into_config(self) -> TrainResult<TrainConfig> {
        let mut cfg = match &self.config {
            Some(path) => TrainConfig::from_yaml_file(path)?,
            None => TrainConfig::default(),
        };

        if let Some(v) = self.method {
            cfg.method = v;
        }
        if let Some(v) = self.data_size {
            cfg.data_size = v;
        }
        if let Some(v) = self.batch_time {
            cfg.batch_time = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.niters {
            cfg.niters = v;
        }
        if let Some(v) = self.test_freq {
            cfg.test_freq = v;
        }
        if let Some(v) = self.gpu {
            cfg.gpu = v;
        }
        if let Some(v) = self.equation {
            cfg.equation = v;
        }
        if let Some(v) = self.start_time {
            cfg.start_time = v;
        }
        if let Some(v) = self.end_time {
            cfg.end_time = v;
        }
        if let Some(v) = self.learning_rate {
            cfg.learning_rate = v;
        }
        if let Some(v) = self.nfull {
            cfg.nfull = v;
        }
        if let Some(v) = self.momentum {
            cfg.momentum = v;
        }
        if let Some(v) = self.out_dir {
            cfg.out_dir = v;
        }

        cfg.viz |= self.viz;
        cfg.adjoint |= self.adjoint;
        cfg.vecfield |= self.vecfield;
        if self.network_size > 0 {
            cfg.network_size = NetworkSize::from_count(self.network_size);
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if self.runs_dir.is_some() {
            cfg.runs_dir = self.runs_dir;
        }
        if let Some(rtol) = self.rtol {
            cfg.solver.rtol = rtol;
        }
        if let Some(atol) = self.atol {
            cfg.solver.atol = atol;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() -> TrainResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => cmd_train(args),
        Commands::Runs { runs_dir } => cmd_runs(&runs_dir),
        Commands::ShowRun { runs_dir, run_id } => cmd_show_run(&runs_dir, &run_id),
    }
}

fn cmd_train(args: TrainArgs) -> TrainResult<()> {
    let config = args.into_config()?;
    let mut trainer = Trainer::new(config)?;

    let report = trainer.run(Some(&mut |event: &CheckpointEvent| {
        println!("{}", event.console_line());
    }))?;

    tracing::info!(
        iterations = report.iterations,
        final_loss = ?report.final_loss,
        run_id = report.run_id.as_deref().unwrap_or("-"),
        "training finished"
    );
    if let Some(run_id) = &report.run_id {
        println!("✓ Run saved: {}", run_id);
    }
    Ok(())
}

fn cmd_runs(runs_dir: &Path) -> TrainResult<()> {
    let runs = RunStore::open(runs_dir).list_runs()?;

    if runs.is_empty() {
        println!("No runs found in: {}", runs_dir.display());
    } else {
        println!("Runs in '{}':", runs_dir.display());
        for manifest in runs {
            let loss = manifest
                .final_loss
                .map(|l| format!("{:.6}", l))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {} ({})  {} {}  iters={}  loss={}",
                manifest.run_id,
                manifest.timestamp,
                manifest.equation,
                manifest.method,
                manifest.iterations,
                loss
            );
        }
    }
    Ok(())
}

fn cmd_show_run(runs_dir: &Path, run_id: &str) -> TrainResult<()> {
    let store = RunStore::open(runs_dir);
    let manifest = store.load_manifest(run_id)?;
    let records = store.load_checkpoints(run_id)?;

    println!("Run {}", manifest.run_id);
    println!("  Timestamp:  {}", manifest.timestamp);
    println!("  Equation:   {}", manifest.equation);
    println!("  Method:     {}", manifest.method);
    println!("  Iterations: {}", manifest.iterations);

    println!("\nCheckpoints:");
    for r in &records {
        println!(
            "  Iter {:04} | Total Loss {:.6} | avg {:.6} | {:.3}s/iter | {:?}",
            r.iteration, r.total_loss, r.loss_avg, r.time_avg_s, r.phase
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn train_args(argv: &[&str]) -> TrainArgs {
        let mut full = vec!["nodefit", "train"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Train(args) => args,
            _ => panic!("expected train"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_flags_gives_defaults() {
        let cfg = train_args(&[]).into_config().unwrap();
        assert_eq!(cfg, TrainConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let cfg = train_args(&[
            "--method", "adams", "--equation", "parabola", "--start-time", "-5", "--end-time",
            "5", "-ss", "--viz", "--adjoint", "--rtol", "1e-4", "-l", "0.01",
        ])
        .into_config()
        .unwrap();
        assert_eq!(cfg.method, Method::Adams);
        assert_eq!(cfg.equation, Equation::Parabola);
        assert_eq!(cfg.start_time, -5.0);
        assert_eq!(cfg.network_size, NetworkSize::Large);
        assert!(cfg.viz && cfg.adjoint && !cfg.vecfield);
        assert_eq!(cfg.solver.rtol, 1e-4);
        assert_eq!(cfg.learning_rate, 0.01);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = std::env::temp_dir().join("nf_cli_config");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("train.yaml");
        std::fs::write(&path, "niters: 10\nbatch_size: 5\nequation: ellipse\n").unwrap();

        let cfg = train_args(&["--config", path.to_str().unwrap(), "--niters", "3"])
            .into_config()
            .unwrap();
        assert_eq!(cfg.niters, 3);
        assert_eq!(cfg.batch_size, 5);
        assert_eq!(cfg.equation, Equation::Ellipse);
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        assert!(train_args(&["--batch-time", "2000"]).into_config().is_err());
        assert!(Cli::try_parse_from(["nodefit", "train", "--method", "bosh3"]).is_err());
    }
}
