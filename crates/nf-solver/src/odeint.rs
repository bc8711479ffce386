//! Integration front end: method selection and output-grid validation.

use std::fmt;
use std::str::FromStr;

use nf_core::{NfError, Tolerances};
use serde::{Deserialize, Serialize};

use crate::adams::Adams;
use crate::dopri5::Dopri5;
use crate::error::{SolverError, SolverResult};
use crate::integrator::{Euler, FixedGrid, Rk4};
use crate::system::OdeSystem;

/// Integration method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Adaptive Dormand-Prince 5(4) (default).
    #[default]
    Dopri5,
    /// Adams-Bashforth-Moulton, 4th order, fixed step.
    Adams,
    /// Classical RK4, fixed step.
    Rk4,
    /// Forward Euler, fixed step.
    Euler,
}

impl Method {
    pub const ALL: [Method; 4] = [Method::Dopri5, Method::Adams, Method::Rk4, Method::Euler];

    pub fn name(self) -> &'static str {
        match self {
            Method::Dopri5 => "dopri5",
            Method::Adams => "adams",
            Method::Rk4 => "rk4",
            Method::Euler => "euler",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = NfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| NfError::config(format!("unknown solver method '{s}'")))
    }
}

/// Options shared by all methods; each method reads the fields it needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Relative tolerance (adaptive methods)
    pub rtol: f64,
    /// Absolute tolerance (adaptive methods)
    pub atol: f64,
    /// Maximum number of attempted steps per call (adaptive methods)
    pub max_steps: usize,
    /// Fixed step size; `None` takes one step per output interval
    pub step_size: Option<f64>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-5,
            atol: 1e-6,
            max_steps: 100_000,
            step_size: None,
        }
    }
}

impl SolverOptions {
    pub fn tolerances(&self) -> Tolerances {
        Tolerances {
            abs: self.atol,
            rel: self.rtol,
        }
    }
}

/// Integrate `sys` from `y0` at `times[0]` and return the state at every
/// entry of `times` (the first output is `y0`).
///
/// `times` must be strictly monotone; decreasing grids integrate backwards.
pub fn odeint<S: OdeSystem>(
    sys: &mut S,
    y0: &S::State,
    times: &[f64],
    method: Method,
    opts: &SolverOptions,
) -> SolverResult<Vec<S::State>> {
    validate_times(times)?;
    match method {
        Method::Dopri5 => {
            let solver = Dopri5 {
                tol: opts.tolerances(),
                max_steps: opts.max_steps,
                ..Dopri5::default()
            };
            solver.integrate(sys, y0, times)
        }
        Method::Adams => Adams::new(opts.step_size).integrate(sys, y0, times),
        Method::Rk4 => FixedGrid::new(Rk4, opts.step_size).integrate(sys, y0, times),
        Method::Euler => FixedGrid::new(Euler, opts.step_size).integrate(sys, y0, times),
    }
}

fn validate_times(times: &[f64]) -> SolverResult<()> {
    if times.is_empty() {
        return Err(SolverError::InvalidArg {
            what: "at least one output time is required",
        });
    }
    if times.iter().any(|t| !t.is_finite()) {
        return Err(SolverError::InvalidArg {
            what: "output times must be finite",
        });
    }
    if times.len() > 1 {
        let increasing = times.windows(2).all(|w| w[1] > w[0]);
        let decreasing = times.windows(2).all(|w| w[1] < w[0]);
        if !(increasing || decreasing) {
            return Err(SolverError::InvalidArg {
                what: "output times must be strictly monotone",
            });
        }
    }
    Ok(())
}
