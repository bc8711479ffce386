//! The training loop.

use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::Optimizer;
use nalgebra::Vector3;
use nf_core::RunningAverageMeter;
use nf_data::{BatchSampler, Trajectory};
use nf_model::VectorField;
use nf_results::{CheckpointRecord, Phase, ResultsError, RunManifest, RunStore};
use nf_solver::{Method, SolverOptions, TensorSystem, odeint};
use nf_viz::{FigureData, FigureRenderer, QuiverField};

use crate::adjoint::adjoint_backward;
use crate::config::TrainConfig;
use crate::error::TrainResult;
use crate::loss::mean_abs_error;
use crate::optim::{ParamsRmsProp, RmsProp};
use crate::progress::CheckpointEvent;

const METER_MOMENTUM: f64 = 0.97;
const QUIVER_GRID: usize = 21;

/// `cuda:<gpu>` when available, otherwise the CPU.
pub fn select_device(gpu: usize) -> TrainResult<Device> {
    let device = Device::cuda_if_available(gpu)?;
    if device.is_cpu() {
        tracing::info!(gpu, "CUDA device not available, using CPU");
    }
    Ok(device)
}

/// Integrate `field` from `y0` over `times`, keeping the autograd graph.
/// Returns the stacked states `(T, ...)`.
pub fn solve(
    field: &VectorField,
    y0: &Tensor,
    times: &[f64],
    method: Method,
    opts: &SolverOptions,
) -> TrainResult<Tensor> {
    let mut sys = TensorSystem::new(|t, y: &Tensor| field.forward(t, y));
    let states = odeint(&mut sys, y0, times, method, opts)?;
    Ok(Tensor::stack(&states, 0)?)
}

fn scalar(t: &Tensor) -> TrainResult<f64> {
    Ok(t.to_dtype(DType::F64)?.to_scalar::<f64>()?)
}

fn to_host(states: &Tensor) -> TrainResult<Vec<Vector3<f64>>> {
    let rows = states
        .flatten_to(states.rank().saturating_sub(2))?
        .to_dtype(DType::F32)?
        .to_vec2::<f32>()?;
    Ok(rows
        .iter()
        .map(|r| Vector3::new(r[0] as f64, r[1] as f64, r[2] as f64))
        .collect())
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub iterations: usize,
    pub checkpoints: Vec<CheckpointRecord>,
    pub final_loss: Option<f64>,
    /// Set when the run was persisted to a run store.
    pub run_id: Option<String>,
}

pub struct Trainer {
    config: TrainConfig,
    device: Device,
    trajectory: Trajectory,
    sampler: BatchSampler,
    field: VectorField,
    vars: Vec<Var>,
    optimizer: RmsProp,
    time_meter: RunningAverageMeter,
    loss_meter: RunningAverageMeter,
    renderer: Option<FigureRenderer>,
    iteration: usize,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> TrainResult<Self> {
        let device = select_device(config.gpu)?;
        Self::with_device(config, device)
    }

    pub fn with_device(config: TrainConfig, device: Device) -> TrainResult<Self> {
        config.validate()?;
        // the CPU backend cannot be reseeded; weights there stay unseeded
        if let Some(seed) = config.seed {
            if !device.is_cpu() {
                device.set_seed(seed)?;
            }
        }

        let trajectory = Trajectory::generate(&config.trajectory_spec(), &device)?;
        let sampler = BatchSampler::new(
            config.data_size,
            config.batch_time,
            config.batch_size,
            config.seed,
        )?;
        let field = VectorField::new(config.network_size, &device)?;
        let vars = field.vars()?;
        let optimizer = RmsProp::new(
            vars.clone(),
            ParamsRmsProp {
                lr: config.learning_rate,
                momentum: config.momentum,
                ..Default::default()
            },
        )?;
        let renderer = config
            .viz
            .then(|| FigureRenderer::new(config.out_dir.clone()));

        Ok(Self {
            config,
            device,
            trajectory,
            sampler,
            field,
            vars,
            optimizer,
            time_meter: RunningAverageMeter::new(METER_MOMENTUM),
            loss_meter: RunningAverageMeter::new(METER_MOMENTUM),
            renderer,
            iteration: 0,
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn field(&self) -> &VectorField {
        &self.field
    }

    /// Iterations completed so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn loss_meter(&self) -> &RunningAverageMeter {
        &self.loss_meter
    }

    pub fn time_meter(&self) -> &RunningAverageMeter {
        &self.time_meter
    }

    fn phase(&self, iteration: usize) -> Phase {
        if iteration <= self.config.niters {
            Phase::Minibatch
        } else {
            Phase::FullBatch
        }
    }

    /// One optimization step; returns the batch loss.
    pub fn train_step(&mut self) -> TrainResult<f64> {
        let itr = self.iteration + 1;
        let start = Instant::now();

        let batch = match self.phase(itr) {
            Phase::Minibatch => self.sampler.random_batch(&self.trajectory)?,
            Phase::FullBatch => self.sampler.full_batch(&self.trajectory)?,
        };
        let times = &self.trajectory.times()[..self.config.batch_time];
        let method = self.config.method;
        let opts = &self.config.solver;

        let loss = if self.config.adjoint {
            let grads = adjoint_backward(
                &self.field,
                &self.vars,
                &batch.y0,
                &batch.y,
                times,
                method,
                opts,
            )?;
            self.optimizer.backward_step(&grads.surrogate(&self.vars)?)?;
            grads.loss
        } else {
            let pred = solve(&self.field, &batch.y0, times, method, opts)?;
            let loss = mean_abs_error(&pred, &batch.y)?;
            self.optimizer.backward_step(&loss)?;
            loss
        };
        let loss = scalar(&loss)?;

        self.iteration = itr;
        self.time_meter.update(start.elapsed().as_secs_f64());
        self.loss_meter.update(loss);

        if !loss.is_finite() {
            tracing::warn!(iteration = itr, loss, "non-finite training loss");
        }
        tracing::debug!(
            iteration = itr,
            loss,
            loss_avg = self.loss_meter.avg(),
            time_avg_s = self.time_meter.avg(),
            "step"
        );
        Ok(loss)
    }

    /// Integrate the whole trajectory from the true initial state without
    /// tracking gradients. Returns the MAE and the `(N, 1, 3)` prediction.
    pub fn evaluate(&self) -> TrainResult<(f64, Tensor)> {
        let field = &self.field;
        let mut sys = TensorSystem::new(|t, y: &Tensor| Ok(field.forward(t, y)?.detach()));
        let states = odeint(
            &mut sys,
            self.trajectory.y0(),
            self.trajectory.times(),
            self.config.method,
            &self.config.solver,
        )?;
        let pred = Tensor::stack(&states, 0)?;
        let loss = scalar(&mean_abs_error(&pred, self.trajectory.y())?)?;
        Ok((loss, pred))
    }

    fn quiver_field(&self) -> TrainResult<QuiverField> {
        let z_range = (self.config.start_time, self.config.end_time);
        let points = QuiverField::grid(QUIVER_GRID, z_range);
        let flat: Vec<f32> = points
            .iter()
            .flat_map(|p| p.iter().map(|&v| v as f32))
            .collect();
        let ys = Tensor::from_vec(flat, (points.len(), 3), &self.device)?;
        let dydt = self.field.forward(0.0, &ys)?.detach();
        Ok(QuiverField {
            points,
            directions: to_host(&dydt)?,
        })
    }

    /// Evaluate, render when enabled, and build the checkpoint event.
    pub fn checkpoint(&mut self) -> TrainResult<CheckpointEvent> {
        let (total_loss, pred) = self.evaluate()?;
        if !total_loss.is_finite() {
            tracing::warn!(iteration = self.iteration, total_loss, "non-finite evaluation loss");
        }

        let image = if self.renderer.is_some() {
            let pred = to_host(&pred)?;
            let quiver = if self.config.vecfield {
                Some(self.quiver_field()?)
            } else {
                None
            };
            let data = FigureData {
                times: self.trajectory.times(),
                truth: self.trajectory.states(),
                pred: &pred,
                z_range: (self.config.start_time, self.config.end_time),
                quiver: quiver.as_ref(),
            };
            match self.renderer.as_mut() {
                Some(r) => Some(r.render(&data)?),
                None => None,
            }
        } else {
            None
        };

        Ok(CheckpointEvent {
            iteration: self.iteration,
            phase: self.phase(self.iteration),
            total_loss,
            loss_avg: self.loss_meter.avg(),
            time_avg_s: self.time_meter.avg(),
            image,
        })
    }

    /// Run every remaining iteration, evaluating every `test_freq` steps.
    pub fn run(
        &mut self,
        mut on_checkpoint: Option<&mut dyn FnMut(&CheckpointEvent)>,
    ) -> TrainResult<TrainReport> {
        let total = self.config.total_iters();
        tracing::info!(
            equation = %self.config.equation,
            method = %self.config.method,
            adjoint = self.config.adjoint,
            iterations = total,
            params = self.field.param_count()?,
            "training started"
        );

        let mut records = Vec::new();
        while self.iteration < total {
            self.train_step()?;
            if self.iteration % self.config.test_freq == 0 {
                let event = self.checkpoint()?;
                tracing::info!(
                    iteration = event.iteration,
                    total_loss = event.total_loss,
                    loss_avg = event.loss_avg,
                    "checkpoint"
                );
                if let Some(cb) = on_checkpoint.as_deref_mut() {
                    cb(&event);
                }
                records.push(CheckpointRecord::from(&event));
            }
        }

        let final_loss = records.last().map(|r| r.total_loss);
        let run_id = match self.config.runs_dir.clone() {
            Some(dir) => Some(self.persist(&dir, &records, final_loss)?),
            None => None,
        };

        tracing::info!(iterations = self.iteration, ?final_loss, "training finished");
        Ok(TrainReport {
            iterations: self.iteration,
            checkpoints: records,
            final_loss,
            run_id,
        })
    }

    fn persist(
        &self,
        dir: &Path,
        records: &[CheckpointRecord],
        final_loss: Option<f64>,
    ) -> TrainResult<String> {
        let store = RunStore::new(dir.to_path_buf())?;
        let config = serde_json::to_value(&self.config).map_err(ResultsError::from)?;
        let (run_id, timestamp) = RunStore::new_run_id(&config);

        self.field.save(store.weights_path(&run_id)?)?;
        let manifest = RunManifest {
            run_id: run_id.clone(),
            timestamp,
            equation: self.config.equation.to_string(),
            method: self.config.method.to_string(),
            iterations: self.iteration,
            config,
            final_loss,
        };
        store.save_run(&manifest, records)?;

        tracing::info!(run_id = %run_id, dir = %dir.display(), "saved run");
        Ok(run_id)
    }
}
