//! Gradient checks for the scalar engine and the MLP.
//!
//! Analytic gradients from `backward` are compared with central finite differences.

use approx::assert_abs_diff_eq;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use scalargrad::{Error, Value, MLP};

/// Central-difference gradient of `f` at `x`.
///
/// grad_i ≈ (f(x + eps*e_i) - f(x - eps*e_i)) / (2*eps)
fn numerical_gradient<F>(f: F, x: &[f64], eps: f64) -> Vec<f64>
where
    F: Fn(&[Value]) -> Value,
{
    let eval = |point: &[f64]| {
        let leaves: Vec<Value> = point.iter().map(|&v| Value::from(v)).collect();
        f(&leaves).data()
    };

    let mut grad = vec![0.0; x.len()];
    let mut x_plus = x.to_vec();
    let mut x_minus = x.to_vec();

    for i in 0..x.len() {
        x_plus[i] = x[i] + eps;
        x_minus[i] = x[i] - eps;

        grad[i] = (eval(&x_plus) - eval(&x_minus)) / (2.0 * eps);

        x_plus[i] = x[i];
        x_minus[i] = x[i];
    }
    grad
}

fn analytic_gradient<F>(f: F, x: &[f64]) -> Vec<f64>
where
    F: Fn(&[Value]) -> Value,
{
    let leaves: Vec<Value> = x.iter().map(|&v| Value::from(v)).collect();
    f(&leaves).backward();
    leaves.iter().map(|v| v.grad()).collect()
}

fn check_gradient<F>(f: F, x: &[f64])
where
    F: Fn(&[Value]) -> Value + Copy,
{
    let numerical = numerical_gradient(f, x, 1e-6);
    let analytic = analytic_gradient(f, x);

    for (a, n) in analytic.iter().zip(numerical.iter()) {
        assert_abs_diff_eq!(a, n, epsilon = 1e-6);
    }
}

#[test]
fn test_numerical_gradient_polynomial() {
    check_gradient(
        |v| {
            let (a, b) = (&v[0], &v[1]);
            (a * b + b.powf(3.0)) / (a.powi(2) + 1.0) - 2.0 * a
        },
        &[0.7, -1.3],
    );
}

#[test]
fn test_numerical_gradient_activations() {
    check_gradient(
        |v| {
            let (a, b, c) = (&v[0], &v[1], &v[2]);
            (a * b).tanh() + (b - c).exp() * c.relu() + (a + c).relu()
        },
        &[0.4, -0.2, 1.1],
    );
}

#[test]
fn test_numerical_gradient_shared_subexpression() {
    check_gradient(
        |v| {
            let a = &v[0];
            let h = (a * 3.0).tanh();
            let g = &h * &h + &h;
            &g * &h - a / &g
        },
        &[0.25],
    );
}

#[test]
fn test_numerical_gradient_mlp_loss() {
    let mut rng = StdRng::seed_from_u64(11);
    let mlp = MLP::with_rng(3, &[4, 4, 1], &mut rng);
    let x = [0.5, -1.0, 2.0];
    let target = 0.3;

    let loss = |mlp: &MLP| (mlp.forward_scalar(&x).unwrap() - target).powi(2);

    loss(&mlp).backward();
    let eps = 1e-6;
    for p in mlp.parameters() {
        let original = p.data();
        p.set_data(original + eps);
        let plus = loss(&mlp).data();
        p.set_data(original - eps);
        let minus = loss(&mlp).data();
        p.set_data(original);

        assert_abs_diff_eq!(p.grad(), (plus - minus) / (2.0 * eps), epsilon = 1e-6);
    }
}

#[test]
fn test_sgd_step_reduces_loss() {
    let mut rng = StdRng::seed_from_u64(12);
    let mlp = MLP::with_rng(2, &[4, 4, 1], &mut rng);
    let xs = [[2.0, 3.0], [3.0, -1.0], [0.5, 1.0], [1.0, 1.0]];
    let ys = [1.0, -1.0, -1.0, 1.0];

    let loss = |mlp: &MLP| {
        xs.iter()
            .zip(ys.iter())
            .map(|(x, &y)| (mlp.forward_scalar(x).unwrap() - y).powi(2))
            .sum::<Value>()
    };

    let before = loss(&mlp);
    mlp.zero_grad();
    before.backward();
    for p in mlp.parameters() {
        p.decrement_data(0.01 * p.grad());
    }

    assert!(loss(&mlp).data() < before.data());
}

#[test]
fn test_zero_grad_then_backward_twice_doubles() {
    let mut rng = StdRng::seed_from_u64(13);
    let mlp = MLP::with_rng(3, &[4, 4, 1], &mut rng);
    let out = mlp.forward_scalar(&[1.0, -2.0, 0.5]).unwrap();

    mlp.zero_grad();
    out.backward();
    let once: Vec<f64> = mlp.parameters().iter().map(|p| p.grad()).collect();

    mlp.zero_grad();
    out.backward();
    out.backward();
    for (p, g) in mlp.parameters().iter().zip(once.iter()) {
        assert_abs_diff_eq!(p.grad(), 2.0 * g, epsilon = 1e-12);
    }
}

#[test]
fn test_deep_chain_backward_and_drop() {
    let x = Value::from(1.5);
    let mut y = x.clone();
    for _ in 0..100_000 {
        y = &y + 0.0;
    }

    y.backward();
    assert_eq!(x.grad(), 1.0);
    assert_eq!(y.data(), 1.5);
    drop(y);

    assert!(x.is_leaf());
    assert_eq!(x.data(), 1.5);
}

#[test]
fn test_long_sum_backward_and_drop() {
    let x = Value::from(2.0);
    let n = 100_000;

    let y: Value = std::iter::repeat(&x).take(n).sum();
    y.backward();
    assert_eq!(x.grad(), n as f64);
    drop(y);

    assert_eq!(x.grad(), n as f64);
}

#[test]
fn test_division_by_zero_node() {
    let a = Value::from(4.0);
    let b = Value::from(0.0);

    let err = a.checked_div(&b).unwrap_err();
    assert!(matches!(err, Error::Domain(_)));
    assert_eq!(err.to_string(), "Domain error: division by a zero-valued node");
}

proptest! {
    #[test]
    fn prop_forward_values_match_formulas(a in -10.0f64..10.0, b in -10.0f64..10.0) {
        let (va, vb) = (Value::from(a), Value::from(b));

        prop_assert_eq!((&va + &vb).data(), a + b);
        prop_assert_eq!((&va * &vb).data(), a * b);
        prop_assert_eq!((&va - &vb).data(), a + (-1.0 * b));
        prop_assert_eq!(va.relu().data(), a.max(0.0));
        prop_assert!((va.tanh().data() - a.tanh()).abs() < 1e-12);
        prop_assert!((va.exp().data() - a.exp()).abs() <= 1e-12 * a.exp().max(1.0));
    }

    #[test]
    fn prop_product_rule(a in -5.0f64..5.0, b in -5.0f64..5.0) {
        let (va, vb) = (Value::from(a), Value::from(b));
        let y = &va * &vb + &va;

        y.backward();
        prop_assert_eq!(va.grad(), b + 1.0);
        prop_assert_eq!(vb.grad(), a);
    }

    #[test]
    fn prop_reuse_counts_every_edge(a in -5.0f64..5.0, n in 1usize..8) {
        let va = Value::from(a);
        let y: Value = std::iter::repeat(&va).take(n).sum();

        y.backward();
        prop_assert_eq!(va.grad(), n as f64);
    }

    #[test]
    fn prop_producers_precede_consumers(a in -2.0f64..2.0, b in 0.5f64..2.0) {
        let (va, vb) = (Value::from(a), Value::from(b));
        let c = &va * &vb;
        let d = (&c + &va).tanh() / &vb;
        let e = &d * &c - d.exp();

        let topo = e.topological_order();
        let ids: Vec<usize> = topo.iter().map(|v| v.id()).collect();
        for (position, node) in topo.iter().enumerate() {
            for producer in node.producers() {
                let producer_position = ids.iter().position(|&id| id == producer.id());
                prop_assert!(producer_position.is_some());
                prop_assert!(producer_position.unwrap() < position);
            }
        }
    }
}
