//! OdeSystem trait for pluggable dynamic systems.

use candle_core::{DType, Tensor};
use nf_core::Tolerances;

use crate::error::SolverResult;

/// A right-hand side `dx/dt = f(t, x)` together with the state algebra the
/// integrators need.
///
/// Arithmetic is fallible because tensor states can fail on shape or device
/// mismatches.
pub trait OdeSystem {
    /// State type (must be Clone).
    type State: Clone;

    /// Compute state derivative dxdt = f(t, x).
    ///
    /// Takes &mut self so systems can count evaluations or cache work.
    fn rhs(&mut self, t: f64, x: &Self::State) -> SolverResult<Self::State>;

    /// Add two states element-wise: result = a + b.
    fn add(&self, a: &Self::State, b: &Self::State) -> SolverResult<Self::State>;

    /// Scale a state by a scalar: result = scale * a.
    fn scale(&self, a: &Self::State, scale: f64) -> SolverResult<Self::State>;

    /// RMS of `err` weighted by `abs + rel * max(|y0|, |y1|)`.
    ///
    /// Used only for step-size control, so implementations should not keep
    /// the computation on any autograd graph.
    fn error_norm(
        &self,
        err: &Self::State,
        y0: &Self::State,
        y1: &Self::State,
        tol: Tolerances,
    ) -> SolverResult<f64>;

    /// `base + sum(c_i * x_i)`.
    fn combine(
        &self,
        base: &Self::State,
        terms: &[(f64, &Self::State)],
    ) -> SolverResult<Self::State> {
        let mut acc = base.clone();
        for (c, x) in terms {
            acc = self.add(&acc, &self.scale(x, *c)?)?;
        }
        Ok(acc)
    }
}

/// Tensor-valued system backed by a closure.
pub struct TensorSystem<F> {
    f: F,
    evals: usize,
}

impl<F> TensorSystem<F>
where
    F: FnMut(f64, &Tensor) -> candle_core::Result<Tensor>,
{
    pub fn new(f: F) -> Self {
        Self { f, evals: 0 }
    }

    /// Number of right-hand side evaluations so far.
    pub fn evals(&self) -> usize {
        self.evals
    }
}

impl<F> OdeSystem for TensorSystem<F>
where
    F: FnMut(f64, &Tensor) -> candle_core::Result<Tensor>,
{
    type State = Tensor;

    fn rhs(&mut self, t: f64, x: &Tensor) -> SolverResult<Tensor> {
        self.evals += 1;
        Ok((self.f)(t, x)?)
    }

    fn add(&self, a: &Tensor, b: &Tensor) -> SolverResult<Tensor> {
        Ok((a + b)?)
    }

    fn scale(&self, a: &Tensor, scale: f64) -> SolverResult<Tensor> {
        Ok((a * scale)?)
    }

    fn error_norm(
        &self,
        err: &Tensor,
        y0: &Tensor,
        y1: &Tensor,
        tol: Tolerances,
    ) -> SolverResult<f64> {
        let (sum, count) = weighted_sq_sum(err, y0, y1, tol)?;
        Ok((sum / count.max(1) as f64).sqrt())
    }
}

/// Sum of squared weighted errors and the element count, detached from any graph.
///
/// Split out so composite states can pool several tensors into one RMS.
pub fn weighted_sq_sum(
    err: &Tensor,
    y0: &Tensor,
    y1: &Tensor,
    tol: Tolerances,
) -> SolverResult<(f64, usize)> {
    let err = err.detach();
    let scale = ((y0.detach().abs()?.maximum(&y1.detach().abs()?)? * tol.rel)? + tol.abs)?;
    let sum = (err / scale)?
        .sqr()?
        .sum_all()?
        .to_dtype(DType::F64)?
        .to_scalar::<f64>()?;
    Ok((sum, y0.elem_count()))
}
