//! Dormand-Prince 5(4) with adaptive step-size control.
//!
//! Every output time is hit exactly by truncating the step that would cross
//! it. Step decisions are made on detached scalars; the accepted stages are
//! ordinary state arithmetic, so gradients flow through them.

use nf_core::Tolerances;

use crate::error::{SolverError, SolverResult};
use crate::system::OdeSystem;

const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th order weights (also the 7th stage row, which makes FSAL work)
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// 5th minus embedded 4th order weights
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

/// Adaptive Dormand-Prince solver.
#[derive(Clone, Debug)]
pub struct Dopri5 {
    pub tol: Tolerances,
    pub max_steps: usize,
    pub min_step: f64,
    pub safety: f64,
    pub min_factor: f64,
    pub max_factor: f64,
}

impl Default for Dopri5 {
    fn default() -> Self {
        Self {
            tol: Tolerances {
                abs: 1e-6,
                rel: 1e-5,
            },
            max_steps: 100_000,
            min_step: 1e-10,
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 10.0,
        }
    }
}

struct Trial<S> {
    y: S,
    f: S,
    err: S,
}

impl Dopri5 {
    pub fn integrate<S: OdeSystem>(
        &self,
        sys: &mut S,
        y0: &S::State,
        times: &[f64],
    ) -> SolverResult<Vec<S::State>> {
        let mut out = Vec::with_capacity(times.len());
        let (Some(&t0), Some(&t_last)) = (times.first(), times.last()) else {
            return Ok(out);
        };
        out.push(y0.clone());
        if times.len() == 1 {
            return Ok(out);
        }

        let dir = if t_last >= t0 { 1.0 } else { -1.0 };
        let mut t = t0;
        let mut y = y0.clone();
        let mut f = sys.rhs(t, &y)?;
        let mut h = dir * self.initial_step(sys, t, &y, &f, dir)?;
        let mut steps = 0usize;

        for &target in &times[1..] {
            while (target - t) * dir > 0.0 {
                if steps >= self.max_steps {
                    return Err(SolverError::TooManySteps {
                        max_steps: self.max_steps,
                        t,
                    });
                }
                steps += 1;

                let remaining = target - t;
                let clipped = h.abs() >= remaining.abs();
                let h_try = if clipped { remaining } else { h };

                let trial = self.trial_step(sys, t, &y, &f, h_try)?;
                let ratio = sys.error_norm(&trial.err, &y, &trial.y, self.tol)?;

                // A non-finite estimate is accepted so divergence shows up in
                // the solution instead of as an endless cutback.
                let accepted = !ratio.is_finite() || ratio <= 1.0;
                let factor = self.step_factor(ratio, accepted);

                if accepted {
                    t = if clipped { target } else { t + h_try };
                    y = trial.y;
                    f = trial.f;
                    h = if clipped {
                        dir * h.abs().max(h_try.abs() * factor)
                    } else {
                        h_try * factor
                    };
                } else {
                    h = h_try * factor;
                    if h.abs() < self.min_step {
                        return Err(SolverError::StepUnderflow { t, h });
                    }
                }
            }
            out.push(y.clone());
        }

        tracing::trace!(steps, "dopri5 finished");
        Ok(out)
    }

    fn step_factor(&self, ratio: f64, accepted: bool) -> f64 {
        if !ratio.is_finite() {
            return 1.0;
        }
        let raw = if ratio == 0.0 {
            self.max_factor
        } else {
            self.safety * ratio.powf(-0.2)
        };
        let factor = raw.clamp(self.min_factor, self.max_factor);
        if accepted { factor } else { factor.min(1.0) }
    }

    /// Starting step from Hairer, Norsett & Wanner, "Solving ODEs I", II.4.
    fn initial_step<S: OdeSystem>(
        &self,
        sys: &mut S,
        t0: f64,
        y0: &S::State,
        f0: &S::State,
        dir: f64,
    ) -> SolverResult<f64> {
        let d0 = sys.error_norm(y0, y0, y0, self.tol)?;
        let d1 = sys.error_norm(f0, y0, y0, self.tol)?;
        let h0 = if d0 < 1e-5 || d1 < 1e-5 || !(d0.is_finite() && d1.is_finite()) {
            1e-6
        } else {
            0.01 * d0 / d1
        };

        let y1 = sys.combine(y0, &[(dir * h0, f0)])?;
        let f1 = sys.rhs(t0 + dir * h0, &y1)?;
        let df = sys.combine(&f1, &[(-1.0, f0)])?;
        let d2 = sys.error_norm(&df, y0, y0, self.tol)? / h0;

        let h1 = if !d2.is_finite() || (d1 <= 1e-15 && d2 <= 1e-15) {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(0.2)
        };
        Ok((100.0 * h0).min(h1))
    }

    fn trial_step<S: OdeSystem>(
        &self,
        sys: &mut S,
        t: f64,
        y: &S::State,
        k1: &S::State,
        h: f64,
    ) -> SolverResult<Trial<S::State>> {
        let y2 = sys.combine(y, &[(h * A21, k1)])?;
        let k2 = sys.rhs(t + C2 * h, &y2)?;

        let y3 = sys.combine(y, &[(h * A31, k1), (h * A32, &k2)])?;
        let k3 = sys.rhs(t + C3 * h, &y3)?;

        let y4 = sys.combine(y, &[(h * A41, k1), (h * A42, &k2), (h * A43, &k3)])?;
        let k4 = sys.rhs(t + C4 * h, &y4)?;

        let y5 = sys.combine(
            y,
            &[(h * A51, k1), (h * A52, &k2), (h * A53, &k3), (h * A54, &k4)],
        )?;
        let k5 = sys.rhs(t + C5 * h, &y5)?;

        let y6 = sys.combine(
            y,
            &[
                (h * A61, k1),
                (h * A62, &k2),
                (h * A63, &k3),
                (h * A64, &k4),
                (h * A65, &k5),
            ],
        )?;
        let k6 = sys.rhs(t + h, &y6)?;

        let y_new = sys.combine(
            y,
            &[
                (h * B1, k1),
                (h * B3, &k3),
                (h * B4, &k4),
                (h * B5, &k5),
                (h * B6, &k6),
            ],
        )?;
        let k7 = sys.rhs(t + h, &y_new)?;

        let err = sys.combine(
            &sys.scale(k1, h * E1)?,
            &[
                (h * E3, &k3),
                (h * E4, &k4),
                (h * E5, &k5),
                (h * E6, &k6),
                (h * E7, &k7),
            ],
        )?;

        Ok(Trial {
            y: y_new,
            f: k7,
            err,
        })
    }
}
