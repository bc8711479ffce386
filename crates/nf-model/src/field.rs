//! Autonomous MLP vector field `f(y)` with tanh activations.
//!
//! Architectures by tier:
//! - Small:  3 → 50 → 3
//! - Medium: 3 → 50 → 150 → 50 → 3
//! - Large:  3 → 50 → 150 → 150 → 50 → 3

use std::path::Path;

use candle_core::{Device, Module, Tensor, Var};
use candle_nn::{Init, Linear, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::DTYPE;

const WEIGHT_INIT: Init = Init::Randn {
    mean: 0.0,
    stdev: 0.1,
};

/// Network capacity tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkSize {
    #[default]
    Small,
    Medium,
    Large,
}

impl NetworkSize {
    /// Map a repeated `-s` flag count onto a tier.
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => NetworkSize::Small,
            1 => NetworkSize::Medium,
            _ => NetworkSize::Large,
        }
    }

    /// Layer widths from input to output.
    pub fn widths(self) -> &'static [usize] {
        match self {
            NetworkSize::Small => &[3, 50, 3],
            NetworkSize::Medium => &[3, 50, 150, 50, 3],
            NetworkSize::Large => &[3, 50, 150, 150, 50, 3],
        }
    }
}

/// Trainable vector field backed by a [`VarMap`].
pub struct VectorField {
    layers: Vec<Linear>,
    size: NetworkSize,
    var_map: VarMap,
    device: Device,
}

impl std::fmt::Debug for VectorField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VectorField({:?} {:?}, device={:?})",
            self.size,
            self.size.widths(),
            self.device
        )
    }
}

impl VectorField {
    /// Fresh field: weights ~ N(0, 0.1²), biases zero.
    pub fn new(size: NetworkSize, device: &Device) -> ModelResult<Self> {
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DTYPE, device);

        let layers = size
            .widths()
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let vb = vb.pp(format!("net.{i}"));
                let weight = vb.get_with_hints((w[1], w[0]), "weight", WEIGHT_INIT)?;
                let bias = vb.get_with_hints(w[1], "bias", Init::Const(0.0))?;
                Ok(Linear::new(weight, Some(bias)))
            })
            .collect::<candle_core::Result<Vec<_>>>()?;

        let field = Self {
            layers,
            size,
            var_map,
            device: device.clone(),
        };
        tracing::debug!(params = field.param_count()?, "built {:?}", field);
        Ok(field)
    }

    /// Instantaneous derivative at `y` (`(..., 3)`). `t` is accepted for the
    /// integrator interface and ignored.
    pub fn forward(&self, _t: f64, y: &Tensor) -> candle_core::Result<Tensor> {
        let last = self.layers.len() - 1;
        let mut x = y.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if i < last {
                x = x.tanh()?;
            }
        }
        Ok(x)
    }

    pub fn size(&self) -> NetworkSize {
        self.size
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn var_map(&self) -> &VarMap {
        &self.var_map
    }

    /// Trainable variables sorted by name, so every caller sees one order.
    pub fn vars(&self) -> ModelResult<Vec<Var>> {
        let data = self.var_map.data().lock().map_err(|_| ModelError::Poisoned)?;
        let mut named: Vec<(&String, &Var)> = data.iter().collect();
        named.sort_by(|a, b| a.0.cmp(b.0));
        Ok(named.into_iter().map(|(_, v)| v.clone()).collect())
    }

    pub fn param_count(&self) -> ModelResult<usize> {
        Ok(self.vars()?.iter().map(|v| v.elem_count()).sum())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ModelResult<()> {
        self.var_map.save(path)?;
        Ok(())
    }

    /// Overwrite the current weights with ones saved by [`VectorField::save`].
    pub fn load(&mut self, path: impl AsRef<Path>) -> ModelResult<()> {
        self.var_map.load(path)?;
        Ok(())
    }
}
