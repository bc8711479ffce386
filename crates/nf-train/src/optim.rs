//! RMSprop with PyTorch semantics, as a [`candle_nn::Optimizer`].
//!
//! ```text
//! g  = grad + weight_decay * p
//! v  = alpha * v + (1 - alpha) * g^2
//! d  = sqrt(v) + eps                 (centered: sqrt(v - g_avg^2) + eps)
//! b  = momentum * b + g / d          (momentum > 0)
//! p -= lr * b                        (otherwise p -= lr * g / d)
//! ```

use candle_core::backprop::GradStore;
use candle_core::{Result, Tensor, Var};
use candle_nn::Optimizer;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamsRmsProp {
    pub lr: f64,
    pub alpha: f64,
    pub eps: f64,
    pub weight_decay: f64,
    pub momentum: f64,
    pub centered: bool,
}

impl Default for ParamsRmsProp {
    fn default() -> Self {
        Self {
            lr: 1e-2,
            alpha: 0.99,
            eps: 1e-8,
            weight_decay: 0.0,
            momentum: 0.0,
            centered: false,
        }
    }
}

#[derive(Debug)]
struct VarRmsProp {
    var: Var,
    square_avg: Tensor,
    grad_avg: Option<Tensor>,
    momentum_buf: Option<Tensor>,
}

#[derive(Debug)]
pub struct RmsProp {
    vars: Vec<VarRmsProp>,
    params: ParamsRmsProp,
}

impl RmsProp {
    pub fn params(&self) -> &ParamsRmsProp {
        &self.params
    }
}

impl Optimizer for RmsProp {
    type Config = ParamsRmsProp;

    fn new(vars: Vec<Var>, params: ParamsRmsProp) -> Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|var| var.dtype().is_float())
            .map(|var| {
                let square_avg = var.zeros_like()?;
                let grad_avg = if params.centered {
                    Some(var.zeros_like()?)
                } else {
                    None
                };
                Ok(VarRmsProp {
                    var,
                    square_avg,
                    grad_avg,
                    momentum_buf: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { vars, params })
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        let p = self.params;
        for slot in self.vars.iter_mut() {
            let theta = slot.var.as_tensor();
            let Some(grad) = grads.get(theta) else {
                continue;
            };
            let grad = if p.weight_decay != 0.0 {
                (grad + (theta * p.weight_decay)?)?
            } else {
                grad.clone()
            };

            let square_avg = ((&slot.square_avg * p.alpha)? + (grad.sqr()? * (1.0 - p.alpha))?)?;
            let denom = match &slot.grad_avg {
                Some(prev) => {
                    let grad_avg = ((prev * p.alpha)? + (&grad * (1.0 - p.alpha))?)?;
                    let d = ((&square_avg - grad_avg.sqr()?)?.sqrt()? + p.eps)?;
                    slot.grad_avg = Some(grad_avg);
                    d
                }
                None => (square_avg.sqrt()? + p.eps)?,
            };
            slot.square_avg = square_avg;

            let update = if p.momentum > 0.0 {
                let scaled = (&grad / &denom)?;
                let buf = match &slot.momentum_buf {
                    Some(buf) => ((buf * p.momentum)? + scaled)?,
                    None => scaled,
                };
                slot.momentum_buf = Some(buf.clone());
                buf
            } else {
                (&grad / &denom)?
            };

            slot.var.set(&(theta - (update * p.lr)?)?)?;
        }
        Ok(())
    }
}
