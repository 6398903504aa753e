use std::fs;
use std::process::ExitCode;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scalargrad::cli::Cli;
use scalargrad::{create_graph, Result, Value, MLP};

fn generate_x_data(start: f64, end: f64, size: usize) -> Vec<Vec<Value>> {
    let step = if size > 1 { (end - start) / ((size - 1) as f64) } else { 0.0 };
    (0..size)
        .map(|i| vec![Value::from(start + (i as f64) * step)])
        .collect()
}

fn generate_y_value(x: &Value, rng: &mut StdRng, with_noise: bool) -> Value {
    let noise = if with_noise { rng.gen_range(-0.05..=0.05) } else { 0.0 };
    Value::from(0.5 * x.data() + 0.2 + noise)
}

fn mse(x_data: &[Vec<Value>], y_data: &[Value], model: &MLP) -> Result<Value> {
    let mut errors = Vec::with_capacity(x_data.len());
    for (x, y) in x_data.iter().zip(y_data.iter()) {
        errors.push((model.forward_scalar(x)? - y).powi(2));
    }

    errors
        .into_iter()
        .sum::<Value>()
        .checked_div(y_data.len() as f64)
}

fn run(cli: Cli) -> Result<()> {
    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    // Generating synthetic data
    let x_data = generate_x_data(-1.0, 1.0, cli.samples);
    let y_data: Vec<Value> = x_data
        .iter()
        .map(|x| generate_y_value(&x[0], &mut rng, true))
        .collect();

    for (x, y) in x_data.iter().zip(y_data.iter()) {
        println!("x: {:.2}, y: {:.2}", x[0].data(), y.data());
    }

    let model = MLP::with_rng(1, &cli.layer_widths(), &mut rng);
    println!("Model has {} parameters", model.parameters().len());

    let mut total_loss = mse(&x_data, &y_data, &model)?;
    for epoch in 0..cli.epochs {
        total_loss = mse(&x_data, &y_data, &model)?;

        model.zero_grad();
        total_loss.backward();

        for p in model.parameters() {
            p.decrement_data(cli.learning_rate * p.grad());
        }

        if cli.log_every > 0 && epoch % cli.log_every == 0 {
            println!("Epoch {} loss {:.6}", epoch, total_loss.data());
        }
    }

    let x_test = generate_x_data(-1.0, 1.0, 7);
    let mut y_test = Vec::with_capacity(x_test.len());
    for x in &x_test {
        let y_pred = model.forward_scalar(x)?;
        let y_true = generate_y_value(&x[0], &mut rng, false);
        println!("x: {:.2}, y: {:.3} vs {:.3}", x[0].data(), y_pred.data(), y_true.data());
        y_test.push(y_true);
    }
    println!("Test set mean squared error: {:.6}", mse(&x_test, &y_test, &model)?.data());

    if let Some(path) = &cli.dot {
        fs::write(path, create_graph(&total_loss)?.to_string())?;
        println!("Wrote loss graph to {}", path.display());
    }

    Ok(())
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
