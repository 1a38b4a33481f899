//! Box-constrained quasi-Newton minimization.
//!
//! `LbfgsbOptimizer` is a projected limited-memory BFGS: the search direction comes from the
//! usual two-loop recursion restricted to the variables that are not pinned at a bound, steps
//! are projected back into the box, and a backtracking line search enforces sufficient
//! decrease along the projected path. Gradients are forward (or, at an upper bound, backward)
//! finite differences, so the objective only has to return a value.
//!
//! Non-finite objective values are treated as `+∞`, which lets objectives signal regions where
//! the model cannot be evaluated.

use crate::error::TsirError;
use log::{debug, trace, warn};
use std::collections::VecDeque;

const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 40;

/// A scalar function of a parameter vector.
pub trait ObjectiveFunction {
    fn evaluate(&self, x: &[f64]) -> f64;
}

impl<F> ObjectiveFunction for F
where
    F: Fn(&[f64]) -> f64,
{
    fn evaluate(&self, x: &[f64]) -> f64 {
        self(x)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OptimizerConfig {
    pub max_iterations: usize,
    pub max_evaluations: usize,
    /// Number of correction pairs kept for the inverse Hessian approximation.
    pub history: usize,
    /// Stop when the relative reduction of the objective falls below this.
    pub ftol: f64,
    /// Stop when the largest projected gradient component falls below this.
    pub pgtol: f64,
    /// Relative finite difference step.
    pub step: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            max_iterations: 15_000,
            max_evaluations: 15_000,
            history: 10,
            ftol: 2.220_446_049_250_313e-9,
            pgtol: 1e-5,
            step: 1e-8,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationResult {
    pub x: Vec<f64>,
    pub fun: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
    pub message: String,
}

#[derive(Clone, Debug, Default)]
pub struct LbfgsbOptimizer {
    config: OptimizerConfig,
}

struct Counted<'a, O: ObjectiveFunction + ?Sized> {
    objective: &'a O,
    evaluations: usize,
}

impl<O: ObjectiveFunction + ?Sized> Counted<'_, O> {
    fn value(&mut self, x: &[f64]) -> f64 {
        self.evaluations += 1;
        let value = self.objective.evaluate(x);
        if value.is_finite() {
            value
        } else {
            f64::INFINITY
        }
    }
}

fn project(x: &mut [f64], bounds: &[(f64, f64)]) {
    for (xi, (lower, upper)) in x.iter_mut().zip(bounds) {
        *xi = xi.clamp(*lower, *upper);
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(a, b)| a * b).sum()
}

fn finish(
    x: Vec<f64>,
    fun: f64,
    iterations: usize,
    evaluations: usize,
    converged: bool,
    message: &str,
) -> Result<OptimizationResult, TsirError> {
    if converged {
        debug!("converged after {iterations} iterations, objective {fun}: {message}");
    } else {
        warn!("optimization did not converge after {iterations} iterations: {message}");
    }
    Ok(OptimizationResult {
        x,
        fun,
        iterations,
        evaluations,
        converged,
        message: message.to_string(),
    })
}

/// Whether variable `i` sits on a bound that the gradient pushes against.
fn pinned(x: f64, g: f64, (lower, upper): (f64, f64)) -> bool {
    (x <= lower && g > 0.0) || (x >= upper && g < 0.0)
}

impl LbfgsbOptimizer {
    #[must_use]
    pub fn new(config: OptimizerConfig) -> Self {
        LbfgsbOptimizer { config }
    }

    #[must_use]
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    fn gradient<O: ObjectiveFunction + ?Sized>(
        &self,
        counted: &mut Counted<'_, O>,
        x: &[f64],
        fx: f64,
        bounds: &[(f64, f64)],
    ) -> Vec<f64> {
        let mut probe = x.to_vec();
        (0..x.len())
            .map(|i| {
                let h = self.config.step * x[i].abs().max(1.0);
                let forward = x[i] + h <= bounds[i].1;
                probe[i] = if forward { x[i] + h } else { x[i] - h };
                let fh = counted.value(&probe);
                probe[i] = x[i];
                let g = if forward { (fh - fx) / h } else { (fx - fh) / h };
                if g.is_finite() {
                    g
                } else {
                    // Stepping into an infeasible region: push away from it.
                    if forward {
                        f64::MAX.sqrt()
                    } else {
                        -f64::MAX.sqrt()
                    }
                }
            })
            .collect()
    }

    fn direction(
        g: &[f64],
        free: &[bool],
        history: &VecDeque<(Vec<f64>, Vec<f64>)>,
    ) -> Vec<f64> {
        let mut q: Vec<f64> = g
            .iter()
            .zip(free)
            .map(|(g, f)| if *f { *g } else { 0.0 })
            .collect();
        let mut alphas = Vec::with_capacity(history.len());
        for (s, y) in history.iter().rev() {
            let rho = 1.0 / dot(y, s);
            let alpha = rho * dot(s, &q);
            for (qi, yi) in q.iter_mut().zip(y) {
                *qi -= alpha * yi;
            }
            alphas.push((rho, alpha));
        }
        if let Some((s, y)) = history.back() {
            let gamma = dot(s, y) / dot(y, y);
            for qi in &mut q {
                *qi *= gamma;
            }
        }
        for ((s, y), (rho, alpha)) in history.iter().zip(alphas.iter().rev()) {
            let beta = rho * dot(y, &q);
            for (qi, si) in q.iter_mut().zip(s) {
                *qi += si * (alpha - beta);
            }
        }
        q.iter()
            .zip(free)
            .map(|(d, f)| if *f { -d } else { 0.0 })
            .collect()
    }

    /// Minimizes `objective` over the box `bounds`, starting from `x0` projected into it.
    ///
    /// Failing to converge is not an error; it is reported on the result.
    ///
    /// # Errors
    ///
    /// `InputShapeError` when `x0` and `bounds` have different lengths or a bound is
    /// inverted.
    pub fn minimize<O: ObjectiveFunction + ?Sized>(
        &self,
        objective: &O,
        x0: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult, TsirError> {
        if x0.len() != bounds.len() {
            return Err(TsirError::InputShapeError(format!(
                "{} starting values for {} bounds",
                x0.len(),
                bounds.len()
            )));
        }
        if let Some((lower, upper)) = bounds.iter().find(|(l, u)| !(l <= u)) {
            return Err(TsirError::InputShapeError(format!(
                "lower bound {lower} exceeds upper bound {upper}"
            )));
        }

        let mut counted = Counted {
            objective,
            evaluations: 0,
        };
        let mut x = x0.to_vec();
        project(&mut x, bounds);
        let mut fx = counted.value(&x);
        if x.is_empty() {
            return finish(x, fx, 0, counted.evaluations, true, "no free parameters");
        }
        if fx == f64::INFINITY {
            return finish(
                x,
                fx,
                0,
                counted.evaluations,
                false,
                "objective is not finite at the starting point",
            );
        }

        let mut g = self.gradient(&mut counted, &x, fx, bounds);
        let mut history: VecDeque<(Vec<f64>, Vec<f64>)> = VecDeque::new();

        for iteration in 0..self.config.max_iterations {
            let mut trial = x.iter().zip(&g).map(|(x, g)| x - g).collect::<Vec<f64>>();
            project(&mut trial, bounds);
            let projected_gradient = trial
                .iter()
                .zip(&x)
                .map(|(t, x)| (t - x).abs())
                .fold(0.0, f64::max);
            if projected_gradient <= self.config.pgtol {
                return finish(
                    x,
                    fx,
                    iteration,
                    counted.evaluations,
                    true,
                    "projected gradient below tolerance",
                );
            }
            if counted.evaluations >= self.config.max_evaluations {
                return finish(
                    x,
                    fx,
                    iteration,
                    counted.evaluations,
                    false,
                    "evaluation limit reached",
                );
            }

            let free: Vec<bool> = (0..x.len()).map(|i| !pinned(x[i], g[i], bounds[i])).collect();
            let mut d = Self::direction(&g, &free, &history);
            if dot(&d, &g) >= 0.0 {
                history.clear();
                d = Self::direction(&g, &free, &history);
            }

            let mut t = if history.is_empty() {
                let norm = dot(&d, &d).sqrt();
                if norm > 1.0 {
                    1.0 / norm
                } else {
                    1.0
                }
            } else {
                1.0
            };
            let mut accepted = None;
            for _ in 0..MAX_BACKTRACKS {
                let mut candidate: Vec<f64> =
                    x.iter().zip(&d).map(|(x, d)| x + t * d).collect();
                project(&mut candidate, bounds);
                let step: Vec<f64> = candidate.iter().zip(&x).map(|(c, x)| c - x).collect();
                let decrease = dot(&g, &step);
                if decrease >= 0.0 {
                    break;
                }
                let f_candidate = counted.value(&candidate);
                if f_candidate <= fx + ARMIJO * decrease {
                    accepted = Some((candidate, f_candidate, step));
                    break;
                }
                t *= 0.5;
            }

            let Some((x_new, f_new, s)) = accepted else {
                if history.is_empty() {
                    return finish(
                        x,
                        fx,
                        iteration,
                        counted.evaluations,
                        false,
                        "line search could not decrease the objective",
                    );
                }
                trace!("line search failed, restarting from steepest descent");
                history.clear();
                continue;
            };

            let reduction = (fx - f_new) / fx.abs().max(f_new.abs()).max(1.0);
            let g_new = self.gradient(&mut counted, &x_new, f_new, bounds);
            let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
            if dot(&s, &y) > 1e-10 * dot(&y, &y) {
                if history.len() == self.config.history {
                    history.pop_front();
                }
                history.push_back((s, y));
            }
            x = x_new;
            fx = f_new;
            g = g_new;
            trace!("iteration {iteration}: objective {fx}");

            if reduction <= self.config.ftol {
                return finish(
                    x,
                    fx,
                    iteration + 1,
                    counted.evaluations,
                    true,
                    "relative reduction of the objective below tolerance",
                );
            }
        }

        finish(
            x,
            fx,
            self.config.max_iterations,
            counted.evaluations,
            false,
            "iteration limit reached",
        )
    }
}
