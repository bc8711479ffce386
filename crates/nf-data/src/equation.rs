//! Closed-form curves the model learns to reproduce.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use nalgebra::Vector3;
use nf_core::{NfError, Real};
use serde::{Deserialize, Serialize};

/// Trajectory shape selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Equation {
    /// Unit circle in x/y climbing linearly in z.
    #[default]
    Spiral,
    /// Spiral whose radius grows as |t| / 10.
    ExpandingSpiral,
    /// Ellipse with semi-axes 1 and 2 in the plane z = 3.
    Ellipse,
    /// Quadratic in x, linear in y and z.
    Parabola,
}

impl Equation {
    pub const ALL: [Equation; 4] = [
        Equation::Spiral,
        Equation::ExpandingSpiral,
        Equation::Ellipse,
        Equation::Parabola,
    ];

    /// Evaluate the curve at time `t`.
    pub fn eval(self, t: Real) -> Vector3<Real> {
        match self {
            Equation::Spiral => Vector3::new((PI * t).sin(), (PI * t).cos(), t),
            Equation::ExpandingSpiral => Vector3::new(
                t * (PI * t).sin() / 10.0,
                t * (PI * t).cos() / 10.0,
                t,
            ),
            Equation::Ellipse => Vector3::new((PI * t).cos(), 2.0 * (PI * t).sin(), 3.0),
            Equation::Parabola => Vector3::new(0.2 * t * t + t + 1.0, 0.3 * t, t),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Equation::Spiral => "spiral",
            Equation::ExpandingSpiral => "expanding_spiral",
            Equation::Ellipse => "ellipse",
            Equation::Parabola => "parabola",
        }
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Equation {
    type Err = NfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Equation::ALL
            .into_iter()
            .find(|eq| eq.name() == s)
            .ok_or_else(|| NfError::config(format!("unknown equation '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nf_core::{Tolerances, nearly_equal};

    #[test]
    fn parse_roundtrip_names() {
        for eq in Equation::ALL {
            assert_eq!(eq.name().parse::<Equation>().unwrap(), eq);
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        let err = "lorenz".parse::<Equation>().unwrap_err();
        assert!(matches!(err, NfError::InvalidConfiguration { .. }));
    }

    #[test]
    fn closed_forms_at_known_points() {
        let tol = Tolerances {
            abs: 1e-12,
            rel: 1e-12,
        };
        let s = Equation::Spiral.eval(0.5);
        assert!(nearly_equal(s.x, 1.0, tol));
        assert!(nearly_equal(s.y, 0.0, tol));
        assert_eq!(s.z, 0.5);

        let e = Equation::Ellipse.eval(0.0);
        assert_eq!(e, Vector3::new(1.0, 0.0, 3.0));

        let p = Equation::Parabola.eval(2.0);
        assert!(nearly_equal(p.x, 0.8 + 2.0 + 1.0, tol));
        assert!(nearly_equal(p.y, 0.6, tol));
        assert_eq!(p.z, 2.0);

        let x = Equation::ExpandingSpiral.eval(-10.0);
        assert!(nearly_equal(x.y, -1.0, tol));
    }
}
