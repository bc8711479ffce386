//! The adjoint pass must agree with autodiff through the solver.

use candle_core::{Device, Tensor};
use nf_model::{NetworkSize, VectorField};
use nf_solver::{Method, SolverOptions};
use nf_train::{adjoint_backward, mean_abs_error, trainer::solve};

fn setup() -> (VectorField, Tensor, Tensor, Vec<f64>) {
    let dev = Device::Cpu;
    let field = VectorField::new(NetworkSize::Small, &dev).unwrap();
    let y0 = Tensor::new(&[[0.5f32, -0.3, 0.2], [1.0, 0.4, -0.6]], &dev).unwrap();
    let times = nf_core::linspace(0.0, 0.5, 6);
    let target = (Tensor::ones((6, 2, 3), candle_core::DType::F32, &dev).unwrap() * 2.0).unwrap();
    (field, y0, target, times)
}

fn assert_close(adjoint: &[Tensor], direct: &[Tensor]) {
    assert_eq!(adjoint.len(), direct.len());
    for (a, d) in adjoint.iter().zip(direct) {
        let a: Vec<f32> = a.flatten_all().unwrap().to_vec1().unwrap();
        let d: Vec<f32> = d.flatten_all().unwrap().to_vec1().unwrap();
        let scale = d.iter().fold(0f32, |m, v| m.max(v.abs()));
        for (x, y) in a.iter().zip(&d) {
            assert!(
                (x - y).abs() <= 1e-3 * scale + 1e-6,
                "adjoint {x} vs direct {y} (scale {scale})"
            );
        }
    }
}

#[test]
fn adjoint_matches_direct_gradients() {
    let (field, y0, target, times) = setup();
    let vars = field.vars().unwrap();
    let opts = SolverOptions {
        step_size: Some(0.01),
        ..Default::default()
    };

    let pred = solve(&field, &y0, &times, Method::Rk4, &opts).unwrap();
    let loss = mean_abs_error(&pred, &target).unwrap();
    let store = loss.backward().unwrap();
    let direct: Vec<Tensor> = vars
        .iter()
        .map(|v| store.get(v.as_tensor()).unwrap().clone())
        .collect();

    let adjoint = adjoint_backward(&field, &vars, &y0, &target, &times, Method::Rk4, &opts).unwrap();

    let l_direct = loss.to_scalar::<f32>().unwrap();
    let l_adjoint = adjoint.loss.to_scalar::<f32>().unwrap();
    assert!((l_direct - l_adjoint).abs() < 1e-6);
    assert_eq!(adjoint.pred.dims(), &[6, 2, 3]);
    assert_close(&adjoint.param_grads, &direct);
}

#[test]
fn adaptive_adjoint_is_close_to_direct() {
    let (field, y0, target, times) = setup();
    let vars = field.vars().unwrap();
    let opts = SolverOptions {
        rtol: 1e-6,
        atol: 1e-7,
        ..Default::default()
    };

    let pred = solve(&field, &y0, &times, Method::Dopri5, &opts).unwrap();
    let store = mean_abs_error(&pred, &target).unwrap().backward().unwrap();
    let direct: Vec<Tensor> = vars
        .iter()
        .map(|v| store.get(v.as_tensor()).unwrap().clone())
        .collect();

    let adjoint =
        adjoint_backward(&field, &vars, &y0, &target, &times, Method::Dopri5, &opts).unwrap();
    assert_close(&adjoint.param_grads, &direct);
}

#[test]
fn surrogate_reproduces_parameter_gradients() {
    let (field, y0, target, times) = setup();
    let vars = field.vars().unwrap();
    let opts = SolverOptions::default();

    let adjoint = adjoint_backward(&field, &vars, &y0, &target, &times, Method::Rk4, &opts).unwrap();
    let store = adjoint.surrogate(&vars).unwrap().backward().unwrap();
    for (v, g) in vars.iter().zip(&adjoint.param_grads) {
        let via_surrogate: Vec<f32> = store
            .get(v.as_tensor())
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        let expected: Vec<f32> = g.flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(via_surrogate, expected);
    }
}
