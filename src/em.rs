//! The EM iterations: responsibilities and epistate posteriors (E-step),
//! proportions (M-step), and the loop driving them until convergence.
//! Shapes: `alpha` has length T, `mu[w]` has length C_w, and `z[w]` is T x C_w,
//! where C_w is the number of reads in the w-th window.
use crate::error::{Error, Result};
use crate::model::{Model, WindowModel};
use crate::{add_pseudocounts, logsumexp, logsumexp2, PSEUDOCOUNT};
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub const DEFAULT_NUM_ITERATIONS: usize = 50;
pub const DEFAULT_CONVERGENCE_CRITERIA: f64 = 0.001;
pub const DEFAULT_SEED: u64 = 32389;
// Relative tolerance before reporting a decrease of the log likelihood.
const LK_TOLERANCE: f64 = 0.000_001;

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Configurations
pub struct EmConfig {
    /// Maximum number of iterations.
    pub num_iterations: usize,
    /// Stop when the relative change of alpha gets below this value.
    pub convergence_criteria: f64,
    /// Initial proportions. If `None`, drawn at random.
    pub alpha: Option<Vec<f64>>,
    /// Seed for the random initial proportions.
    pub seed: u64,
}

impl std::default::Default for EmConfig {
    fn default() -> Self {
        Self {
            num_iterations: DEFAULT_NUM_ITERATIONS,
            convergence_criteria: DEFAULT_CONVERGENCE_CRITERIA,
            alpha: None,
            seed: DEFAULT_SEED,
        }
    }
}

impl EmConfig {
    pub fn new(num_iterations: usize, convergence_criteria: f64) -> Self {
        Self {
            num_iterations,
            convergence_criteria,
            ..Default::default()
        }
    }
    pub fn with_alpha(mut self, alpha: Vec<f64>) -> Self {
        self.alpha = Some(alpha);
        self
    }
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Where the EM loop is. A loop starts `Running` and ends either `Converged` or `Exhausted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Running,
    Converged,
    Exhausted,
}

/// The parameters updated in each iteration.
#[derive(Debug, Clone)]
pub struct EmState {
    pub alpha: Vec<f64>,
    pub mu: Vec<Vec<f64>>,
    pub z: Vec<Vec<Vec<f64>>>,
    pub iteration: usize,
    pub status: Status,
}

impl EmState {
    /// Initial state. `mu` comes from the proportions, as there is no responsibility yet.
    pub fn new(model: &Model, alpha: Vec<f64>) -> Self {
        let mu = init_mu_no_log(model, &alpha);
        Self {
            alpha,
            mu,
            z: vec![],
            iteration: 0,
            status: Status::Running,
        }
    }
    /// One EM iteration. Returns the log likelihood of the proportions *before* the update
    /// and the relative change of the proportions.
    pub fn step(&mut self, model: &Model) -> (f64, f64) {
        let lk = model.log_likelihood(&self.alpha);
        self.z = calc_z(model, &self.mu, &self.alpha);
        let new_alpha = maximization(model, &self.z);
        self.mu = calc_mu(model, &self.z);
        let change = relative_change(&self.alpha, &new_alpha);
        self.alpha = new_alpha;
        (lk, change)
    }
}

/// The result of a deconvolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deconvolution {
    /// Cell type proportions. Sum up to 1.
    pub alpha: Vec<f64>,
    /// Zero-based index of the iteration at which the loop stopped.
    pub iterations: usize,
    pub status: Status,
    /// Log likelihood at the start of each iteration.
    pub log_likelihoods: Vec<f64>,
    /// Responsibilities of the last iteration, one T x C matrix for each retained window.
    pub responsibilities: Vec<Vec<Vec<f64>>>,
}

impl Deconvolution {
    /// Assign each read to the cell type with the largest responsibility,
    /// if it is larger than `threshold`. Otherwise, the read is left unassigned.
    pub fn assign_reads(&self, threshold: f64) -> Vec<Vec<Option<usize>>> {
        self.responsibilities
            .iter()
            .map(|z| {
                let num_reads = z.first().map(|row| row.len()).unwrap_or(0);
                (0..num_reads)
                    .map(|c| {
                        let (argmax, max) = z.iter().map(|row| row[c]).enumerate().fold(
                            (0, std::f64::NEG_INFINITY),
                            |(i, max), (j, x)| if max < x { (j, x) } else { (i, max) },
                        );
                        match threshold < max {
                            true => Some(argmax),
                            false => None,
                        }
                    })
                    .collect()
            })
            .collect()
    }
    /// Pair each proportion with its cell type name.
    pub fn proportions_by_name<'a, S: std::borrow::Borrow<str>>(
        &self,
        names: &'a [S],
    ) -> Result<Vec<(&'a str, f64)>> {
        if names.len() != self.alpha.len() {
            return Err(Error::AlphaLength {
                expected: names.len(),
                found: self.alpha.len(),
            });
        }
        Ok(names
            .iter()
            .map(|name| name.borrow())
            .zip(self.alpha.iter().copied())
            .collect())
    }
}

/// Run EM. The initial proportions, if not supplied, are drawn from a RNG seeded by `config.seed`.
pub fn run(model: &Model, config: &EmConfig) -> Result<Deconvolution> {
    let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(config.seed);
    run_with_rng(model, config, &mut rng)
}

pub fn run_with_rng<R: Rng>(
    model: &Model,
    config: &EmConfig,
    rng: &mut R,
) -> Result<Deconvolution> {
    let alpha = match config.alpha.as_ref() {
        Some(alpha) => check_alpha(alpha, model.num_cell_types())?,
        None => init_alpha(model.num_cell_types(), rng),
    };
    debug!("EM\tInitial alpha\t{}", vec2str(&alpha));
    let mut state = EmState::new(model, alpha);
    let mut lks: Vec<f64> = Vec::with_capacity(config.num_iterations);
    for i in 0..config.num_iterations {
        state.iteration = i;
        let (lk, change) = state.step(model);
        trace!("EM\tIteration\t{}\t{:.5}\t{:.6}", i, lk, change);
        if let Some(&prev) = lks.last() {
            if lk < prev - LK_TOLERANCE * prev.abs() {
                warn!("EM\tLog-likelihood decreased at {}: {} -> {}", i, prev, lk);
            }
        }
        lks.push(lk);
        if 0 < i && change < config.convergence_criteria {
            state.status = Status::Converged;
            break;
        }
    }
    if state.status == Status::Running {
        state.status = Status::Exhausted;
    }
    debug!(
        "EM\t{:?}\t{}\t{}",
        state.status,
        state.iteration,
        vec2str(&state.alpha)
    );
    Ok(Deconvolution {
        alpha: state.alpha,
        iterations: state.iteration,
        status: state.status,
        log_likelihoods: lks,
        responsibilities: state.z,
    })
}

/// Random proportions, uniform on each cell type and then normalized.
pub fn init_alpha<R: Rng>(num_cell_types: usize, rng: &mut R) -> Vec<f64> {
    let alpha: Vec<f64> = (0..num_cell_types).map(|_| rng.gen::<f64>()).collect();
    let sum: f64 = alpha.iter().sum();
    match 0f64 < sum {
        true => alpha.iter().map(|a| a / sum).collect(),
        false => vec![1f64 / num_cell_types as f64; num_cell_types],
    }
}

// Check the user-supplied proportions, and move them off the boundary.
fn check_alpha(alpha: &[f64], num_cell_types: usize) -> Result<Vec<f64>> {
    if alpha.len() != num_cell_types {
        return Err(Error::AlphaLength {
            expected: num_cell_types,
            found: alpha.len(),
        });
    }
    let sum: f64 = alpha.iter().sum();
    if alpha.iter().any(|a| !a.is_finite() || *a < 0f64) || sum <= 0f64 {
        return Err(Error::InvalidAlpha(alpha.to_vec()));
    }
    let alpha: Vec<_> = alpha.iter().map(|a| a / sum).collect();
    let alpha = add_pseudocounts(&alpha);
    let sum: f64 = alpha.iter().sum();
    Ok(alpha.iter().map(|a| a / sum).collect())
}

fn clamp(mu: f64) -> f64 {
    mu.max(PSEUDOCOUNT).min(1f64 - PSEUDOCOUNT)
}

/// Initial epistate posterior, weighting each cell type by `alpha` instead of responsibilities.
pub fn init_mu_no_log(model: &Model, alpha: &[f64]) -> Vec<Vec<f64>> {
    model
        .windows()
        .par_iter()
        .map(|w| init_mu_window(w, alpha))
        .collect()
}

fn init_mu_window(w: &WindowModel, alpha: &[f64]) -> Vec<f64> {
    let num_cell_types = w.num_cell_types();
    (0..w.num_reads())
        .map(|c| {
            // Scale by the largest term so that long reads do not underflow.
            let max = (0..num_cell_types)
                .map(|t| w.log_x_given_high[t][c].max(w.log_x_given_low[t][c]))
                .fold(std::f64::NEG_INFINITY, f64::max);
            let (high, low) = (0..num_cell_types).fold((0f64, 0f64), |(high, low), t| {
                let h = (w.log_x_given_high[t][c] - max).exp() * alpha[t] * w.lambda[t];
                let l = (w.log_x_given_low[t][c] - max).exp() * alpha[t] * (1f64 - w.lambda[t]);
                (high + h, low + l)
            });
            clamp(high / (high + low))
        })
        .collect()
}

/// Responsibilities. `z[w][t][c]` is proportional to
/// `alpha[t] * (mu[w][c] * lambda[t] + (1 - mu[w][c]) * (1 - lambda[t]))`,
/// normalized so that each column sums up to 1.
pub fn calc_z(model: &Model, mu: &[Vec<f64>], alpha: &[f64]) -> Vec<Vec<Vec<f64>>> {
    model
        .windows()
        .par_iter()
        .zip(mu.par_iter())
        .map(|(w, mu)| calc_z_window(w, mu, alpha))
        .collect()
}

fn calc_z_window(w: &WindowModel, mu: &[f64], alpha: &[f64]) -> Vec<Vec<f64>> {
    let mut z: Vec<Vec<f64>> = alpha
        .iter()
        .zip(w.lambda.iter())
        .map(|(a, l)| {
            mu.iter()
                .map(|m| a * (m * l + (1f64 - m) * (1f64 - l)))
                .collect()
        })
        .collect();
    for c in 0..mu.len() {
        let sum: f64 = z.iter().map(|row| row[c]).sum();
        z.iter_mut().for_each(|row| row[c] /= sum);
    }
    z
}

/// Epistate posteriors given the responsibilities, computed in log space.
pub fn calc_mu(model: &Model, z: &[Vec<Vec<f64>>]) -> Vec<Vec<f64>> {
    model
        .windows()
        .par_iter()
        .zip(z.par_iter())
        .map(|(w, z)| calc_mu_window(w, z))
        .collect()
}

fn calc_mu_window(w: &WindowModel, z: &[Vec<f64>]) -> Vec<f64> {
    let num_cell_types = w.num_cell_types();
    let mut highs = vec![0f64; num_cell_types];
    let mut lows = vec![0f64; num_cell_types];
    (0..w.num_reads())
        .map(|c| {
            for t in 0..num_cell_types {
                let log_z = z[t][c].ln();
                highs[t] = w.log_lambda[t] + w.log_x_given_high[t][c] + log_z;
                lows[t] = w.log_one_minus_lambda[t] + w.log_x_given_low[t][c] + log_z;
            }
            let log_high = logsumexp(&highs);
            let log_low = logsumexp(&lows);
            clamp((log_high - logsumexp2(log_high, log_low)).exp())
        })
        .collect()
}

/// New proportions: the responsibilities summed over all the reads, divided by
/// the total number of reads, and normalized.
pub fn maximization(model: &Model, z: &[Vec<Vec<f64>>]) -> Vec<f64> {
    let mut alpha = vec![0f64; model.num_cell_types()];
    for z in z.iter() {
        alpha
            .iter_mut()
            .zip(z.iter())
            .for_each(|(a, row)| *a += row.iter().sum::<f64>());
    }
    let num_reads = model.num_reads() as f64;
    alpha.iter_mut().for_each(|a| *a /= num_reads);
    let sum: f64 = alpha.iter().sum();
    alpha.iter_mut().for_each(|a| *a /= sum);
    alpha
}

/// Mean absolute difference between `prev` and `next`, relative to the mean absolute value of `prev`.
pub fn relative_change(prev: &[f64], next: &[f64]) -> f64 {
    let len = prev.len() as f64;
    let diff = prev
        .iter()
        .zip(next.iter())
        .map(|(x, y)| (x - y).abs())
        .sum::<f64>()
        / len;
    let scale = prev.iter().map(|x| x.abs()).sum::<f64>() / len;
    diff / scale
}

fn vec2str(xs: &[f64]) -> String {
    let xs: Vec<_> = xs.iter().map(|x| format!("{:.3}", x)).collect();
    xs.join(",")
}
