//! End-to-end training scenarios on the CPU.

use std::path::PathBuf;

use candle_core::Device;
use nf_data::Equation;
use nf_results::{Phase, RunStore};
use nf_solver::Method;
use nf_train::{CheckpointEvent, TrainConfig, Trainer};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("nf_train_{name}"));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn small_config(name: &str) -> TrainConfig {
    TrainConfig {
        data_size: 50,
        batch_time: 5,
        batch_size: 10,
        niters: 1,
        test_freq: 1,
        seed: Some(7),
        out_dir: scratch(name).join("png"),
        ..TrainConfig::default()
    }
}

#[test]
fn zero_iterations_do_nothing() {
    let config = TrainConfig {
        equation: Equation::Ellipse,
        niters: 0,
        nfull: 0,
        viz: true,
        ..small_config("zero_iters")
    };
    let out_dir = config.out_dir.clone();

    let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();
    let mut lines = Vec::new();
    let report = trainer
        .run(Some(&mut |e: &CheckpointEvent| lines.push(e.console_line())))
        .unwrap();

    assert_eq!(report.iterations, 0);
    assert!(report.checkpoints.is_empty());
    assert!(report.final_loss.is_none());
    assert!(lines.is_empty());
    assert!(!out_dir.exists());
}

#[test]
fn single_iteration_prints_one_line_and_one_image() {
    let config = TrainConfig {
        viz: true,
        vecfield: true,
        ..small_config("single_iter")
    };
    let out_dir = config.out_dir.clone();

    let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();
    let mut lines = Vec::new();
    let report = trainer
        .run(Some(&mut |e: &CheckpointEvent| lines.push(e.console_line())))
        .unwrap();

    assert_eq!(report.iterations, 1);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("Iter 0001 | Total Loss "), "{}", lines[0]);
    assert_eq!(report.checkpoints.len(), 1);
    assert!(report.checkpoints[0].total_loss >= 0.0);

    let images: Vec<_> = std::fs::read_dir(&out_dir).unwrap().collect();
    assert_eq!(images.len(), 1);
    assert!(out_dir.join("000.png").exists());
}

#[test]
fn full_batch_phase_follows_minibatches() {
    let config = TrainConfig {
        method: Method::Rk4,
        niters: 2,
        nfull: 2,
        test_freq: 2,
        ..small_config("full_batch")
    };
    let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();
    let report = trainer.run(None).unwrap();

    assert_eq!(report.iterations, 4);
    let phases: Vec<_> = report.checkpoints.iter().map(|c| c.phase.clone()).collect();
    assert_eq!(phases, vec![Phase::Minibatch, Phase::FullBatch]);
    assert_eq!(report.checkpoints[1].iteration, 4);
}

#[test]
fn meters_track_every_step() {
    let config = TrainConfig {
        method: Method::Euler,
        niters: 3,
        test_freq: 10,
        ..small_config("meters")
    };
    let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();
    let first = trainer.train_step().unwrap();
    assert_eq!(trainer.loss_meter().avg(), first);

    let second = trainer.train_step().unwrap();
    let expected = first * 0.97 + second * 0.03;
    assert!((trainer.loss_meter().avg() - expected).abs() < 1e-12);
    assert_eq!(trainer.loss_meter().val(), Some(second));
    assert_eq!(trainer.iteration(), 2);
}

#[test]
fn adjoint_training_runs() {
    let config = TrainConfig {
        adjoint: true,
        method: Method::Adams,
        niters: 2,
        test_freq: 2,
        ..small_config("adjoint")
    };
    let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();
    let report = trainer.run(None).unwrap();
    assert_eq!(report.checkpoints.len(), 1);
    assert!(report.final_loss.unwrap().is_finite());
}

#[test]
fn runs_are_persisted_when_configured() {
    let runs = scratch("runs");
    let config = TrainConfig {
        method: Method::Rk4,
        niters: 2,
        test_freq: 1,
        runs_dir: Some(runs.clone()),
        ..small_config("persist")
    };
    let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();
    let report = trainer.run(None).unwrap();
    let run_id = report.run_id.unwrap();

    let store = RunStore::open(&runs);
    assert!(store.has_run(&run_id));
    let manifest = store.load_manifest(&run_id).unwrap();
    assert_eq!(manifest.iterations, 2);
    assert_eq!(manifest.method, "rk4");
    let (stored, reported) = (manifest.final_loss.unwrap(), report.final_loss.unwrap());
    assert!((stored - reported).abs() <= 1e-12 * reported.abs().max(1.0));
    assert_eq!(store.load_checkpoints(&run_id).unwrap().len(), 2);
    assert!(runs.join(&run_id).join("weights.safetensors").exists());
}
