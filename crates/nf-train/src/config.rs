//! Training configuration.
//!
//! Sources in increasing precedence: [`TrainConfig::default`], a YAML file
//! ([`TrainConfig::from_yaml_file`]), then command-line flags applied by the
//! caller. Every field has a default, so a YAML file may set any subset.

use std::path::{Path, PathBuf};

use nf_core::{NfError, ensure_finite};
use nf_data::{Equation, TrajectorySpec};
use nf_model::NetworkSize;
use nf_solver::{Method, SolverOptions};
use serde::{Deserialize, Serialize};

use crate::error::{TrainError, TrainResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub method: Method,
    pub data_size: usize,
    pub batch_time: usize,
    pub batch_size: usize,
    /// Minibatch iterations
    pub niters: usize,
    /// Full-batch iterations run after `niters`
    pub nfull: usize,
    pub test_freq: usize,
    pub viz: bool,
    pub vecfield: bool,
    pub gpu: usize,
    pub adjoint: bool,
    pub equation: Equation,
    pub start_time: f64,
    pub end_time: f64,
    pub learning_rate: f64,
    pub momentum: f64,
    pub network_size: NetworkSize,
    pub seed: Option<u64>,
    /// Directory for checkpoint images
    pub out_dir: PathBuf,
    /// Run store root; `None` disables persistence
    pub runs_dir: Option<PathBuf>,
    pub solver: SolverOptions,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            method: Method::Dopri5,
            data_size: 1000,
            batch_time: 10,
            batch_size: 20,
            niters: 2000,
            nfull: 0,
            test_freq: 20,
            viz: false,
            vecfield: false,
            gpu: 0,
            adjoint: false,
            equation: Equation::Spiral,
            start_time: -10.0,
            end_time: 10.0,
            learning_rate: 1e-3,
            momentum: 0.0,
            network_size: NetworkSize::Small,
            seed: None,
            out_dir: PathBuf::from("png"),
            runs_dir: None,
            solver: SolverOptions::default(),
        }
    }
}

impl TrainConfig {
    pub fn from_yaml_file(path: &Path) -> TrainResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| TrainError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> TrainResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn trajectory_spec(&self) -> TrajectorySpec {
        TrajectorySpec {
            equation: self.equation,
            start_time: self.start_time,
            end_time: self.end_time,
            data_size: self.data_size,
        }
    }

    /// Total number of iterations, minibatch and full-batch.
    pub fn total_iters(&self) -> usize {
        self.niters + self.nfull
    }

    pub fn validate(&self) -> Result<(), NfError> {
        self.trajectory_spec().validate()?;

        if self.batch_time < 2 {
            return Err(NfError::config("batch_time must be at least 2"));
        }
        if self.batch_time >= self.data_size {
            return Err(NfError::config(format!(
                "batch_time ({}) must be smaller than data_size ({})",
                self.batch_time, self.data_size
            )));
        }
        let windows = self.data_size - self.batch_time;
        if self.batch_size == 0 || self.batch_size > windows {
            return Err(NfError::config(format!(
                "batch_size must be in 1..={windows}, got {}",
                self.batch_size
            )));
        }
        if self.test_freq == 0 {
            return Err(NfError::config("test_freq must be positive"));
        }
        if ensure_finite(self.learning_rate, "learning_rate")? <= 0.0 {
            return Err(NfError::config("learning_rate must be positive"));
        }
        if ensure_finite(self.momentum, "momentum")? < 0.0 {
            return Err(NfError::config("momentum must be non-negative"));
        }

        let s = &self.solver;
        if !(s.rtol.is_finite() && s.rtol > 0.0 && s.atol.is_finite() && s.atol > 0.0) {
            return Err(NfError::config("solver tolerances must be positive"));
        }
        if s.max_steps == 0 {
            return Err(NfError::config("solver max_steps must be positive"));
        }
        if let Some(h) = s.step_size {
            if !(h.is_finite() && h > 0.0) {
                return Err(NfError::config("solver step_size must be positive"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = TrainConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.total_iters(), 2000);
        assert_eq!(cfg.method, Method::Dopri5);
        assert_eq!(cfg.out_dir, PathBuf::from("png"));
    }

    #[test]
    fn yaml_overrides_only_given_fields() {
        let cfg = TrainConfig::from_yaml_str(
            "method: adams\nequation: expanding_spiral\nniters: 5\nsolver:\n  rtol: 1.0e-3\n",
        )
        .unwrap();
        assert_eq!(cfg.method, Method::Adams);
        assert_eq!(cfg.equation, Equation::ExpandingSpiral);
        assert_eq!(cfg.niters, 5);
        assert_eq!(cfg.solver.rtol, 1e-3);
        assert_eq!(cfg.solver.atol, SolverOptions::default().atol);
        assert_eq!(cfg.data_size, 1000);
    }

    #[test]
    fn unknown_equation_is_rejected() {
        assert!(TrainConfig::from_yaml_str("equation: lorenz\n").is_err());
    }

    #[test]
    fn bad_geometry_is_rejected() {
        let base = TrainConfig::default();

        let cfg = TrainConfig {
            batch_time: 1000,
            ..base.clone()
        };
        assert!(cfg.validate().is_err());

        let cfg = TrainConfig {
            data_size: 50,
            batch_time: 5,
            batch_size: 46,
            ..base.clone()
        };
        assert!(cfg.validate().is_err());

        let cfg = TrainConfig {
            end_time: -10.0,
            ..base.clone()
        };
        assert!(cfg.validate().is_err());

        // a one-sample window has nothing to fit
        let cfg = TrainConfig {
            batch_time: 1,
            ..base.clone()
        };
        assert!(cfg.validate().is_err());
        let cfg = TrainConfig {
            batch_time: 2,
            ..base.clone()
        };
        assert!(cfg.validate().is_ok());

        let cfg = TrainConfig {
            test_freq: 0,
            ..base.clone()
        };
        assert!(cfg.validate().is_err());

        let cfg = TrainConfig {
            learning_rate: f64::NAN,
            ..base
        };
        assert!(matches!(cfg.validate(), Err(NfError::NonFinite { .. })));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = TrainConfig::from_yaml_file(Path::new("/nonexistent/nodefit.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/nodefit.yaml"));
    }
}
