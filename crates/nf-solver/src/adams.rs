//! Fourth-order Adams-Bashforth-Moulton predictor-corrector.
//!
//! Runs in PECE mode on a fixed step. The first three steps after a start
//! or a step-size change are taken with RK4 to fill the derivative history.

use std::collections::VecDeque;

use crate::error::SolverResult;
use crate::integrator::{Rk4, Stepper, substeps};
use crate::system::OdeSystem;

const HISTORY: usize = 4;

#[derive(Clone, Debug, Default)]
pub struct Adams {
    pub step_size: Option<f64>,
}

impl Adams {
    pub fn new(step_size: Option<f64>) -> Self {
        Self { step_size }
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
        out.push(y0.clone());

        let mut t = t0;
        let mut y = y0.clone();
        // most recent derivative at the back
        let mut hist: VecDeque<S::State> = VecDeque::with_capacity(HISTORY);
        let mut h_hist: Option<f64> = None;

        for &t_next in &times[1..] {
            let n = substeps(t_next - t, self.step_size)?;
            let h = (t_next - t) / n as f64;

            let same_step = h_hist.is_some_and(|prev| (prev - h).abs() <= 1e-12 * h.abs().max(1.0));
            if !same_step {
                hist.clear();
                h_hist = Some(h);
            }
            if hist.is_empty() {
                hist.push_back(sys.rhs(t, &y)?);
            }

            for i in 0..n {
                let ti = t + i as f64 * h;
                let (y_new, f_new) = if hist.len() < HISTORY {
                    let y_new = Rk4.step(sys, ti, &y, h)?;
                    let f_new = sys.rhs(ti + h, &y_new)?;
                    (y_new, f_new)
                } else {
                    self.pece(sys, ti, &y, &hist, h)?
                };
                y = y_new;
                hist.push_back(f_new);
                while hist.len() > HISTORY {
                    hist.pop_front();
                }
            }
            t = t_next;
            out.push(y.clone());
        }
        Ok(out)
    }

    fn pece<S: OdeSystem>(
        &self,
        sys: &mut S,
        t: f64,
        y: &S::State,
        hist: &VecDeque<S::State>,
        h: f64,
    ) -> SolverResult<(S::State, S::State)> {
        let (f3, f2, f1, f0) = (&hist[0], &hist[1], &hist[2], &hist[3]);
        let c = h / 24.0;

        let y_pred = sys.combine(
            y,
            &[(55.0 * c, f0), (-59.0 * c, f1), (37.0 * c, f2), (-9.0 * c, f3)],
        )?;
        let f_pred = sys.rhs(t + h, &y_pred)?;

        let y_corr = sys.combine(
            y,
            &[(9.0 * c, &f_pred), (19.0 * c, f0), (-5.0 * c, f1), (c, f2)],
        )?;
        let f_corr = sys.rhs(t + h, &y_corr)?;
        Ok((y_corr, f_corr))
    }
}
