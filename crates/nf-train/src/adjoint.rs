//! Adjoint-method gradients for a Neural ODE fit.
//!
//! The forward solve runs without keeping a graph. Gradients come from a
//! backward solve of the augmented state `(y, a, a_θ)`:
//!
//! ```text
//! dy/dt   =  f(y)
//! da/dt   = -aᵀ ∂f/∂y
//! da_θ/dt = -aᵀ ∂f/∂θ
//! ```
//!
//! integrated from each output time to the previous one. At every output
//! time `y` is reset to the forward solution and `dL/dy(t_i)` is added into
//! `a`. After the last interval `a_θ` holds `dL/dθ`.

use candle_core::{Tensor, Var};
use nf_core::Tolerances;
use nf_model::VectorField;
use nf_solver::{
    Method, OdeSystem, SolverError, SolverOptions, SolverResult, TensorSystem, odeint,
    weighted_sq_sum,
};

use crate::error::TrainResult;
use crate::loss::mean_abs_error;

/// State of the backward solve.
#[derive(Clone, Debug)]
pub struct AugmentedState {
    pub y: Tensor,
    pub a: Tensor,
    /// One entry per trainable variable, same order as the system's vars.
    pub a_theta: Vec<Tensor>,
}

/// Augmented dynamics of a vector field; each evaluation is one
/// vector-Jacobian product.
pub struct AdjointSystem<'a> {
    field: &'a VectorField,
    vars: &'a [Var],
}

impl<'a> AdjointSystem<'a> {
    pub fn new(field: &'a VectorField, vars: &'a [Var]) -> Self {
        Self { field, vars }
    }
}

impl OdeSystem for AdjointSystem<'_> {
    type State = AugmentedState;

    fn rhs(&mut self, t: f64, s: &AugmentedState) -> SolverResult<AugmentedState> {
        let y = Var::from_tensor(&s.y.detach())?;
        let f = self.field.forward(t, y.as_tensor())?;
        let grads = (&f * s.a.detach())?.sum_all()?.backward()?;

        let vjp = |x: &Tensor| -> candle_core::Result<Tensor> {
            match grads.get(x) {
                Some(g) => g.neg(),
                None => x.zeros_like(),
            }
        };
        let a = vjp(y.as_tensor())?;
        let a_theta = self
            .vars
            .iter()
            .map(|v| vjp(v.as_tensor()))
            .collect::<candle_core::Result<Vec<_>>>()?;

        Ok(AugmentedState {
            y: f.detach(),
            a,
            a_theta,
        })
    }

    fn add(&self, l: &AugmentedState, r: &AugmentedState) -> SolverResult<AugmentedState> {
        let a_theta = l
            .a_theta
            .iter()
            .zip(&r.a_theta)
            .map(|(x, y)| x + y)
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(AugmentedState {
            y: (&l.y + &r.y)?,
            a: (&l.a + &r.a)?,
            a_theta,
        })
    }

    fn scale(&self, s: &AugmentedState, c: f64) -> SolverResult<AugmentedState> {
        let a_theta = s
            .a_theta
            .iter()
            .map(|x| x * c)
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(AugmentedState {
            y: (&s.y * c)?,
            a: (&s.a * c)?,
            a_theta,
        })
    }

    /// Step control looks at `y` and `a` only; `a_θ` never feeds back into
    /// the dynamics.
    fn error_norm(
        &self,
        err: &AugmentedState,
        y0: &AugmentedState,
        y1: &AugmentedState,
        tol: Tolerances,
    ) -> SolverResult<f64> {
        let (sy, ny) = weighted_sq_sum(&err.y, &y0.y, &y1.y, tol)?;
        let (sa, na) = weighted_sq_sum(&err.a, &y0.a, &y1.a, tol)?;
        Ok(((sy + sa) / (ny + na).max(1) as f64).sqrt())
    }
}

/// Result of one adjoint pass.
#[derive(Debug)]
pub struct AdjointGradients {
    /// Scalar loss, detached.
    pub loss: Tensor,
    /// Forward solution `(T, ...)`, detached.
    pub pred: Tensor,
    /// `dL/dθ`, aligned with the vars passed in.
    pub param_grads: Vec<Tensor>,
}

impl AdjointGradients {
    /// Scalar whose gradient with respect to `vars` is `param_grads`, so a
    /// regular `Optimizer::backward_step` applies them.
    pub fn surrogate(&self, vars: &[Var]) -> candle_core::Result<Tensor> {
        let mut total: Option<Tensor> = None;
        for (v, g) in vars.iter().zip(&self.param_grads) {
            let term = (v.as_tensor() * g.detach())?.sum_all()?;
            total = Some(match total {
                Some(acc) => (acc + term)?,
                None => term,
            });
        }
        match total {
            Some(t) => Ok(t),
            None => Tensor::new(0f32, self.loss.device()),
        }
    }
}

/// MAE loss of the field's solution against `target` at `times`, with
/// parameter gradients from the adjoint method.
pub fn adjoint_backward(
    field: &VectorField,
    vars: &[Var],
    y0: &Tensor,
    target: &Tensor,
    times: &[f64],
    method: Method,
    opts: &SolverOptions,
) -> TrainResult<AdjointGradients> {
    let mut forward = TensorSystem::new(|t, y: &Tensor| Ok(field.forward(t, y)?.detach()));
    let states = odeint(&mut forward, &y0.detach(), times, method, opts)?;
    let pred = Tensor::stack(&states, 0)?;

    let pred_var = Var::from_tensor(&pred)?;
    let loss = mean_abs_error(pred_var.as_tensor(), &target.detach())?;
    let grads = loss.backward()?;
    let dl_dy = match grads.get(pred_var.as_tensor()) {
        Some(g) => g.clone(),
        None => pred.zeros_like()?,
    };

    let last = states.len() - 1;
    let mut aug = AugmentedState {
        y: states[last].clone(),
        a: dl_dy.get(last)?,
        a_theta: vars
            .iter()
            .map(|v| v.as_tensor().zeros_like())
            .collect::<candle_core::Result<Vec<_>>>()?,
    };

    let mut system = AdjointSystem::new(field, vars);
    for i in (1..=last).rev() {
        let span = [times[i], times[i - 1]];
        let end = odeint(&mut system, &aug, &span, method, opts)?
            .pop()
            .ok_or(SolverError::InvalidArg {
                what: "backward solve returned no states",
            })?;
        aug = AugmentedState {
            y: states[i - 1].clone(),
            a: (end.a + dl_dy.get(i - 1)?)?,
            a_theta: end.a_theta,
        };
    }

    Ok(AdjointGradients {
        loss: loss.detach(),
        pred,
        param_grads: aug.a_theta,
    })
}
