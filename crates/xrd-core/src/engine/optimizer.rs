//! # Bounded Minimizer
//!
//! The refinement stages treat minimization as a service: an [`Objective`],
//! a starting vector and box [`Bounds`] go in, a refined vector comes out.
//! [`ProjectedBfgs`] is the supplied implementation, a quasi-Newton method
//! restricted to the box by projection with an active set of frozen
//! components.

use super::config::OptimizerSettings;
use nalgebra::{DMatrix, DVector};
use thiserror::Error;
use tracing::debug;

/// Central-difference step used by the default gradient.
pub const DEFAULT_GRADIENT_STEP: f64 = 1e-6;

const ARMIJO_C1: f64 = 1e-4;
const MAX_LINE_SEARCH_TRIALS: usize = 40;
const CURVATURE_THRESHOLD: f64 = 1e-10;
const BOUND_EPSILON: f64 = 1e-12;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OptimizerError {
    #[error("Dimension mismatch: {parameters} parameters, {lower} lower and {upper} upper bounds")]
    DimensionMismatch {
        parameters: usize,
        lower: usize,
        upper: usize,
    },
    #[error("Infeasible bounds for parameter {index}: lower {lower} exceeds upper {upper}")]
    InfeasibleBounds { index: usize, lower: f64, upper: f64 },
    #[error("Objective is not finite at the starting point (value {0})")]
    NonFiniteStart(f64),
}

/// Box constraints, one `[lower, upper]` interval per parameter. Infinite
/// limits leave a side unbounded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        Self { lower, upper }
    }

    pub fn unbounded(len: usize) -> Self {
        Self {
            lower: vec![f64::NEG_INFINITY; len],
            upper: vec![f64::INFINITY; len],
        }
    }

    pub fn push(&mut self, lower: f64, upper: f64) {
        self.lower.push(lower);
        self.upper.push(upper);
    }

    pub fn push_repeated(&mut self, count: usize, lower: f64, upper: f64) {
        for _ in 0..count {
            self.push(lower, upper);
        }
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn project(&self, x: &mut [f64]) {
        for ((value, &lo), &hi) in x.iter_mut().zip(&self.lower).zip(&self.upper) {
            *value = value.clamp(lo, hi);
        }
    }

    fn validate(&self, parameters: usize) -> Result<(), OptimizerError> {
        if self.lower.len() != parameters || self.upper.len() != parameters {
            return Err(OptimizerError::DimensionMismatch {
                parameters,
                lower: self.lower.len(),
                upper: self.upper.len(),
            });
        }
        for (index, (&lower, &upper)) in self.lower.iter().zip(&self.upper).enumerate() {
            if lower.is_nan() || upper.is_nan() || lower > upper {
                return Err(OptimizerError::InfeasibleBounds {
                    index,
                    lower,
                    upper,
                });
            }
        }
        Ok(())
    }
}

/// A scalar function to minimize.
pub trait Objective {
    fn value(&mut self, x: &[f64]) -> f64;

    fn gradient_step(&self) -> f64 {
        DEFAULT_GRADIENT_STEP
    }

    /// Central-difference gradient. Components within one step of a bound
    /// fall back to a one-sided difference that stays inside the box.
    fn gradient(&mut self, x: &[f64], bounds: &Bounds) -> Vec<f64> {
        let step = self.gradient_step();
        let mut centre: Option<f64> = None;
        let mut shifted = x.to_vec();
        let mut gradient = Vec::with_capacity(x.len());
        for i in 0..x.len() {
            let (lower, upper) = (bounds.lower[i], bounds.upper[i]);
            let room_above = x[i] + step <= upper;
            let room_below = x[i] - step >= lower;
            let derivative = if room_above && room_below {
                shifted[i] = x[i] + step;
                let forward = self.value(&shifted);
                shifted[i] = x[i] - step;
                let backward = self.value(&shifted);
                (forward - backward) / (2.0 * step)
            } else {
                let f0 = *centre.get_or_insert_with(|| self.value(x));
                if room_above || upper - x[i] >= x[i] - lower {
                    shifted[i] = x[i] + step;
                    (self.value(&shifted) - f0) / step
                } else {
                    shifted[i] = x[i] - step;
                    (f0 - self.value(&shifted)) / step
                }
            };
            shifted[i] = x[i];
            gradient.push(derivative);
        }
        gradient
    }
}

/// Adapts a closure into an [`Objective`] with the default gradient.
pub struct FnObjective<F>(pub F);

impl<F> Objective for FnObjective<F>
where
    F: FnMut(&[f64]) -> f64,
{
    fn value(&mut self, x: &[f64]) -> f64 {
        (self.0)(x)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

pub trait BoundedMinimizer {
    fn minimize(
        &self,
        objective: &mut dyn Objective,
        x0: &[f64],
        bounds: &Bounds,
    ) -> Result<Minimum, OptimizerError>;
}

/// Box-constrained BFGS with Armijo backtracking.
///
/// Each iteration freezes the components sitting on a bound whose gradient
/// points out of the box, steps along `−H·g` over the free components and
/// projects the trial point back into the box. Stops once an iteration lowers
/// the objective by less than the configured delta, or after
/// `iterations_per_parameter · n` iterations.
#[derive(Debug, Clone, Default)]
pub struct ProjectedBfgs {
    settings: OptimizerSettings,
}

impl ProjectedBfgs {
    pub fn new(settings: OptimizerSettings) -> Self {
        Self { settings }
    }
}

impl BoundedMinimizer for ProjectedBfgs {
    fn minimize(
        &self,
        objective: &mut dyn Objective,
        x0: &[f64],
        bounds: &Bounds,
    ) -> Result<Minimum, OptimizerError> {
        let n = x0.len();
        bounds.validate(n)?;

        let mut x = x0.to_vec();
        bounds.project(&mut x);
        let mut f = objective.value(&x);
        if !f.is_finite() {
            return Err(OptimizerError::NonFiniteStart(f));
        }
        if n == 0 {
            return Ok(Minimum {
                x,
                value: f,
                iterations: 0,
                converged: true,
            });
        }

        let max_iterations = self.settings.iterations_per_parameter * n;
        let mut inverse_hessian = DMatrix::<f64>::identity(n, n);
        let mut hessian_is_identity = true;
        let mut scaled = false;
        let mut g = DVector::from_vec(objective.gradient(&x, bounds));
        let mut iterations = 0;
        let mut converged = false;

        while iterations < max_iterations {
            iterations += 1;

            let free: Vec<bool> = (0..n)
                .map(|i| {
                    let at_lower = x[i] <= bounds.lower[i] + BOUND_EPSILON && g[i] > 0.0;
                    let at_upper = x[i] >= bounds.upper[i] - BOUND_EPSILON && g[i] < 0.0;
                    !(at_lower || at_upper)
                })
                .collect();
            let masked = DVector::from_fn(n, |i, _| if free[i] { g[i] } else { 0.0 });
            if masked.amax() == 0.0 {
                converged = true;
                break;
            }

            let mut direction = -(&inverse_hessian * &masked);
            mask(&mut direction, &free);
            if masked.dot(&direction) >= 0.0 {
                inverse_hessian.fill_with_identity();
                hessian_is_identity = true;
                direction = -masked.clone();
            }

            let mut alpha = if hessian_is_identity {
                (1.0 / direction.amax()).min(1.0)
            } else {
                1.0
            };
            let mut accepted = None;
            for _ in 0..MAX_LINE_SEARCH_TRIALS {
                let mut trial: Vec<f64> = x
                    .iter()
                    .zip(direction.iter())
                    .map(|(xi, di)| xi + alpha * di)
                    .collect();
                bounds.project(&mut trial);
                let slope: f64 = trial
                    .iter()
                    .zip(&x)
                    .zip(g.iter())
                    .map(|((t, xi), gi)| gi * (t - xi))
                    .sum();
                let value = objective.value(&trial);
                if value.is_finite() && value <= f + ARMIJO_C1 * slope.min(0.0) {
                    accepted = Some((trial, value));
                    break;
                }
                alpha *= 0.5;
            }
            let Some((next, next_value)) = accepted else {
                converged = true;
                break;
            };

            let next_gradient = DVector::from_vec(objective.gradient(&next, bounds));
            let s = DVector::from_fn(n, |i, _| next[i] - x[i]);
            let y = &next_gradient - &g;
            let sy = s.dot(&y);
            if sy > CURVATURE_THRESHOLD {
                if !scaled {
                    inverse_hessian = DMatrix::identity(n, n) * (sy / y.dot(&y));
                    scaled = true;
                }
                let rho = 1.0 / sy;
                let hy = &inverse_hessian * &y;
                let yhy = y.dot(&hy);
                inverse_hessian -= (&s * hy.transpose() + &hy * s.transpose()) * rho;
                inverse_hessian += (&s * s.transpose()) * (rho * rho * yhy + rho);
                hessian_is_identity = false;
            }

            let delta = f - next_value;
            x = next;
            f = next_value;
            g = next_gradient;
            if delta.abs() < self.settings.objective_delta {
                converged = true;
                break;
            }
        }

        debug!(
            parameters = n,
            iterations,
            converged,
            value = f,
            "Bounded minimization finished"
        );
        Ok(Minimum {
            x,
            value: f,
            iterations,
            converged,
        })
    }
}

fn mask(vector: &mut DVector<f64>, free: &[bool]) {
    for (value, &is_free) in vector.iter_mut().zip(free) {
        if !is_free {
            *value = 0.0;
        }
    }
}
