//! Fixed-step time integrators.

use crate::error::{SolverError, SolverResult};
use crate::system::OdeSystem;

/// Trait for single-step integrators.
pub trait Stepper {
    /// Advance state by one time step `dt` (may be negative).
    fn step<S: OdeSystem>(
        &self,
        sys: &mut S,
        t: f64,
        x: &S::State,
        dt: f64,
    ) -> SolverResult<S::State>;
}

/// Classical RK4 (Runge-Kutta 4th order) integrator.
#[derive(Clone, Debug)]
pub struct Rk4;

impl Stepper for Rk4 {
    fn step<S: OdeSystem>(
        &self,
        sys: &mut S,
        t: f64,
        x: &S::State,
        dt: f64,
    ) -> SolverResult<S::State> {
        let k1 = sys.rhs(t, x)?;
        let x2 = sys.combine(x, &[(0.5 * dt, &k1)])?;
        let k2 = sys.rhs(t + 0.5 * dt, &x2)?;
        let x3 = sys.combine(x, &[(0.5 * dt, &k2)])?;
        let k3 = sys.rhs(t + 0.5 * dt, &x3)?;
        let x4 = sys.combine(x, &[(dt, &k3)])?;
        let k4 = sys.rhs(t + dt, &x4)?;

        // x_new = x + (dt/6) * (k1 + 2*k2 + 2*k3 + k4)
        sys.combine(
            x,
            &[
                (dt / 6.0, &k1),
                (dt / 3.0, &k2),
                (dt / 3.0, &k3),
                (dt / 6.0, &k4),
            ],
        )
    }
}

/// Forward Euler (explicit, 1st order, fast for testing).
#[derive(Clone, Debug)]
pub struct Euler;

impl Stepper for Euler {
    fn step<S: OdeSystem>(
        &self,
        sys: &mut S,
        t: f64,
        x: &S::State,
        dt: f64,
    ) -> SolverResult<S::State> {
        let xdot = sys.rhs(t, x)?;
        sys.combine(x, &[(dt, &xdot)])
    }
}

/// Drives a [`Stepper`] across a grid of output times.
///
/// Each output interval is split into `ceil(|dt| / step_size)` equal
/// substeps; without a step size every interval is a single step.
#[derive(Clone, Debug)]
pub struct FixedGrid<T> {
    pub stepper: T,
    pub step_size: Option<f64>,
}

impl<T: Stepper> FixedGrid<T> {
    pub fn new(stepper: T, step_size: Option<f64>) -> Self {
        Self { stepper, step_size }
    }

    pub fn integrate<S: OdeSystem>(
        &self,
        sys: &mut S,
        y0: &S::State,
        times: &[f64],
    ) -> SolverResult<Vec<S::State>> {
        let mut out = Vec::with_capacity(times.len());
        let Some(&t0) = times.first() else {
            return Ok(out);
        };
        let mut y = y0.clone();
        let mut t = t0;
        out.push(y.clone());

        for &t_next in &times[1..] {
            let n = substeps(t_next - t, self.step_size)?;
            let h = (t_next - t) / n as f64;
            for i in 0..n {
                y = self.stepper.step(sys, t + i as f64 * h, &y, h)?;
            }
            t = t_next;
            out.push(y.clone());
        }
        Ok(out)
    }
}

pub(crate) fn substeps(span: f64, step_size: Option<f64>) -> SolverResult<usize> {
    match step_size {
        None => Ok(1),
        Some(h) if h > 0.0 && h.is_finite() => Ok(((span.abs() / h).ceil() as usize).max(1)),
        Some(_) => Err(SolverError::InvalidArg {
            what: "step_size must be positive and finite",
        }),
    }
}
