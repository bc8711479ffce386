//! Ground-truth trajectory generation.

use candle_core::{DType, Device, Tensor};
use nalgebra::Vector3;
use nf_core::{NfError, Real, linspace};
use serde::{Deserialize, Serialize};

use crate::equation::Equation;
use crate::error::DataResult;
use crate::STATE_DIM;

/// What to sample: curve, time span and number of points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySpec {
    pub equation: Equation,
    pub start_time: Real,
    pub end_time: Real,
    pub data_size: usize,
}

impl TrajectorySpec {
    pub fn validate(&self) -> Result<(), NfError> {
        if self.data_size < 2 {
            return Err(NfError::config("data_size must be at least 2"));
        }
        if !(self.start_time.is_finite() && self.end_time.is_finite()) {
            return Err(NfError::config("start_time and end_time must be finite"));
        }
        if self.end_time <= self.start_time {
            return Err(NfError::config("end_time must be greater than start_time"));
        }
        Ok(())
    }
}

/// Immutable sampled trajectory.
///
/// Host copies (`times`, `states`) feed rendering and tests; the device
/// tensors feed the solver: `t` is `(N,)`, `y` is `(N, 1, 3)` and `y0` is
/// `(1, 3)`.
#[derive(Clone, Debug)]
pub struct Trajectory {
    spec: TrajectorySpec,
    times: Vec<Real>,
    states: Vec<Vector3<Real>>,
    t: Tensor,
    y: Tensor,
    y0: Tensor,
}

impl Trajectory {
    pub fn generate(spec: &TrajectorySpec, device: &Device) -> DataResult<Self> {
        spec.validate()?;

        let times = linspace(spec.start_time, spec.end_time, spec.data_size);
        let states: Vec<Vector3<Real>> = times.iter().map(|&t| spec.equation.eval(t)).collect();
        let initial = spec.equation.eval(spec.start_time);

        let n = times.len();
        let t = Tensor::from_iter(times.iter().copied(), device)?.to_dtype(DType::F32)?;
        let flat: Vec<f32> = states
            .iter()
            .flat_map(|s| s.iter().map(|&v| v as f32))
            .collect();
        let y = Tensor::from_vec(flat, (n, 1, STATE_DIM), device)?;
        let y0 = Tensor::from_vec(
            initial.iter().map(|&v| v as f32).collect::<Vec<_>>(),
            (1, STATE_DIM),
            device,
        )?;

        tracing::debug!(
            equation = %spec.equation,
            points = n,
            "generated trajectory"
        );

        Ok(Self {
            spec: spec.clone(),
            times,
            states,
            t,
            y,
            y0,
        })
    }

    pub fn spec(&self) -> &TrajectorySpec {
        &self.spec
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[Real] {
        &self.times
    }

    pub fn states(&self) -> &[Vector3<Real>] {
        &self.states
    }

    /// Time grid, shape `(N,)`.
    pub fn t(&self) -> &Tensor {
        &self.t
    }

    /// States, shape `(N, 1, 3)`.
    pub fn y(&self) -> &Tensor {
        &self.y
    }

    /// True initial state, shape `(1, 3)`.
    pub fn y0(&self) -> &Tensor {
        &self.y0
    }

    pub fn device(&self) -> &Device {
        self.y.device()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(equation: Equation, data_size: usize) -> TrajectorySpec {
        TrajectorySpec {
            equation,
            start_time: -10.0,
            end_time: 10.0,
            data_size,
        }
    }

    #[test]
    fn shapes_match_data_size() {
        let traj = Trajectory::generate(&spec(Equation::Spiral, 64), &Device::Cpu).unwrap();
        assert_eq!(traj.len(), 64);
        assert_eq!(traj.t().dims(), &[64]);
        assert_eq!(traj.y().dims(), &[64, 1, 3]);
        assert_eq!(traj.y0().dims(), &[1, 3]);
    }

    #[test]
    fn initial_state_matches_first_sample() {
        let traj = Trajectory::generate(&spec(Equation::Parabola, 10), &Device::Cpu).unwrap();
        let y0: Vec<f32> = traj.y0().flatten_all().unwrap().to_vec1().unwrap();
        let first: Vec<f32> = traj
            .y()
            .get(0)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        assert_eq!(y0, first);
    }

    #[test]
    fn rejects_degenerate_specs() {
        let mut s = spec(Equation::Ellipse, 1);
        assert!(Trajectory::generate(&s, &Device::Cpu).is_err());
        s.data_size = 10;
        s.end_time = s.start_time;
        assert!(Trajectory::generate(&s, &Device::Cpu).is_err());
    }
}
