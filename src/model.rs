//! Model setup and the likelihood of the observed calls.
//! Everything here is fixed once the model is built; only the cell type proportions
//! vary during the EM iterations, and they are passed in from outside.
use crate::error::{Error, Result};
use crate::window::{Call, Window};
use crate::{add_pseudocounts, logsumexp, logsumexp2};
use rayon::prelude::*;

/// A cleaned window with its constant log-domain terms.
/// Per-read arrays are T x C: `log_x_given_high[t][c]` is log Pr{read c | epistate H, cell type t}.
#[derive(Debug, Clone)]
pub struct WindowModel {
    pub lambda: Vec<f64>,
    pub log_lambda: Vec<f64>,
    pub log_one_minus_lambda: Vec<f64>,
    pub log_x_given_high: Vec<Vec<f64>>,
    pub log_x_given_low: Vec<Vec<f64>>,
    num_reads: usize,
    num_sites: usize,
}

impl WindowModel {
    fn new(window: &Window) -> Self {
        let lambda = add_pseudocounts(&window.lambda);
        let log_lambda: Vec<_> = lambda.iter().map(|l| l.ln()).collect();
        let log_one_minus_lambda: Vec<_> = lambda.iter().map(|l| (1f64 - l).ln()).collect();
        let log_x_given_high = calc_x_given_prob(&window.reads, &window.theta_high);
        let log_x_given_low = calc_x_given_prob(&window.reads, &window.theta_low);
        Self {
            lambda,
            log_lambda,
            log_one_minus_lambda,
            log_x_given_high,
            log_x_given_low,
            num_reads: window.num_reads(),
            num_sites: window.num_sites(),
        }
    }
    pub fn num_reads(&self) -> usize {
        self.num_reads
    }
    pub fn num_sites(&self) -> usize {
        self.num_sites
    }
    pub fn num_cell_types(&self) -> usize {
        self.lambda.len()
    }
    /// Log likelihood of the reads in this window. `log_alpha` is log of the proportions.
    pub fn log_likelihood(&self, log_alpha: &[f64]) -> f64 {
        let mut lks = vec![0f64; log_alpha.len()];
        (0..self.num_reads)
            .map(|c| {
                for (t, lk) in lks.iter_mut().enumerate() {
                    let high = self.log_lambda[t] + self.log_x_given_high[t][c];
                    let low = self.log_one_minus_lambda[t] + self.log_x_given_low[t][c];
                    *lk = log_alpha[t] + logsumexp2(high, low);
                }
                logsumexp(&lks)
            })
            .sum()
    }
}

/// log Pr{read | theta} for each cell type and read, as a T x C matrix.
/// `theta` is M x T. No-value calls do not contribute.
pub fn calc_x_given_prob(reads: &[Vec<Call>], theta: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let num_cell_types = theta.first().map(|row| row.len()).unwrap_or(0);
    let theta: Vec<_> = theta.iter().map(|row| add_pseudocounts(row)).collect();
    let log_prob: Vec<Vec<f64>> = theta
        .iter()
        .map(|row| row.iter().map(|p| p.ln()).collect())
        .collect();
    let log_one_minus_prob: Vec<Vec<f64>> = theta
        .iter()
        .map(|row| row.iter().map(|p| (1f64 - p).ln()).collect())
        .collect();
    (0..num_cell_types)
        .map(|t| {
            reads
                .iter()
                .map(|read| {
                    read.iter()
                        .enumerate()
                        .map(|(m, call)| match call {
                            Call::Methylated => log_prob[m][t],
                            Call::Unmethylated => log_one_minus_prob[m][t],
                            Call::NoValue => 0f64,
                        })
                        .sum::<f64>()
                })
                .collect()
        })
        .collect()
}

/// The deconvolution model: cleaned windows and aggregate counts.
#[derive(Debug, Clone)]
pub struct Model {
    windows: Vec<WindowModel>,
    num_cell_types: usize,
    num_reads: usize,
    num_sites: usize,
    dropped: Vec<usize>,
}

impl Model {
    /// Validate the windows and build the model. Windows without any informative read are dropped.
    /// The input is left untouched.
    pub fn new(windows: &[Window]) -> Result<Self> {
        let num_cell_types = match windows.first() {
            Some(w) if w.num_cell_types() == 0 => return Err(Error::NoCellTypes(0)),
            Some(w) => w.num_cell_types(),
            None => return Err(Error::NoInformativeWindow),
        };
        for (id, window) in windows.iter().enumerate() {
            window.validate(id, num_cell_types)?;
        }
        let (kept, dropped): (Vec<_>, Vec<_>) = windows
            .iter()
            .enumerate()
            .partition(|(_, w)| w.is_informative());
        let dropped: Vec<usize> = dropped.into_iter().map(|(id, _)| id).collect();
        if !dropped.is_empty() {
            debug!("SETUP\tDropped {} uninformative windows", dropped.len());
        }
        let windows: Vec<_> = kept
            .into_par_iter()
            .map(|(_, w)| WindowModel::new(w))
            .collect();
        if windows.is_empty() {
            return Err(Error::NoInformativeWindow);
        }
        let num_reads = windows.iter().map(|w| w.num_reads()).sum();
        let num_sites = windows.iter().map(|w| w.num_sites()).sum();
        debug!(
            "SETUP\tWindows:{}\tReads:{}\tSites:{}\tCellTypes:{}",
            windows.len(),
            num_reads,
            num_sites,
            num_cell_types
        );
        Ok(Self {
            windows,
            num_cell_types,
            num_reads,
            num_sites,
            dropped,
        })
    }
    pub fn windows(&self) -> &[WindowModel] {
        &self.windows
    }
    pub fn num_cell_types(&self) -> usize {
        self.num_cell_types
    }
    /// Total number of reads over the retained windows.
    pub fn num_reads(&self) -> usize {
        self.num_reads
    }
    /// Total number of CpG sites over the retained windows.
    pub fn num_sites(&self) -> usize {
        self.num_sites
    }
    /// Indices (in the input) of the dropped windows.
    pub fn dropped(&self) -> &[usize] {
        &self.dropped
    }
    /// Total log likelihood of all the reads given the proportions `alpha`.
    pub fn log_likelihood(&self, alpha: &[f64]) -> f64 {
        assert_eq!(alpha.len(), self.num_cell_types);
        let log_alpha: Vec<_> = alpha.iter().map(|a| a.ln()).collect();
        let lks: Vec<f64> = self
            .windows
            .par_iter()
            .map(|w| w.log_likelihood(&log_alpha))
            .collect();
        lks.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Call::*;
    fn theta(p: f64) -> Vec<Vec<f64>> {
        vec![vec![p, p]; 2]
    }
    fn window(reads: Vec<Vec<Call>>) -> Window {
        Window::new(reads, vec![0.9, 0.1], theta(0.95), theta(0.05))
    }
    #[test]
    fn x_given_prob() {
        let reads = vec![
            vec![Methylated, Methylated],
            vec![Methylated, Unmethylated],
            vec![NoValue, Unmethylated],
            vec![NoValue, NoValue],
        ];
        let theta = vec![vec![0.9, 0.5], vec![0.2, 0.5]];
        let lk = calc_x_given_prob(&reads, &theta);
        assert_eq!(lk.len(), 2);
        assert!(lk.iter().all(|row| row.len() == 4));
        let answer = [
            [0.9f64.ln() + 0.2f64.ln(), 0.5f64.ln() * 2f64],
            [0.9f64.ln() + 0.8f64.ln(), 0.5f64.ln() * 2f64],
            [0.8f64.ln(), 0.5f64.ln()],
            [0f64, 0f64],
        ];
        for (c, answer) in answer.iter().enumerate() {
            for (t, a) in answer.iter().enumerate() {
                assert!((lk[t][c] - a).abs() < 0.00001, "{},{}", t, c);
            }
        }
    }
    #[test]
    fn x_given_prob_finite() {
        let reads = vec![vec![Methylated, Unmethylated]];
        let theta = vec![vec![0f64, 1f64], vec![1f64, 0f64]];
        let lk = calc_x_given_prob(&reads, &theta);
        assert!(lk.iter().flatten().all(|x| x.is_finite()));
    }
    #[test]
    fn drop_uninformative() {
        let windows = vec![
            window(vec![vec![NoValue, NoValue]]),
            window(vec![vec![Methylated, NoValue], vec![NoValue, NoValue]]),
            window(vec![]),
            window(vec![vec![Unmethylated, Unmethylated]; 3]),
        ];
        let model = Model::new(&windows).unwrap();
        assert_eq!(model.windows().len(), 2);
        assert_eq!(model.dropped(), &[0, 2]);
        assert_eq!(model.num_reads(), 5);
        assert_eq!(model.num_sites(), 4);
        assert_eq!(model.num_cell_types(), 2);
        assert!(model.windows().iter().all(|w| w.num_reads() > 0));
    }
    #[test]
    fn no_informative_window() {
        let windows = vec![window(vec![vec![NoValue, NoValue]])];
        assert!(matches!(
            Model::new(&windows),
            Err(Error::NoInformativeWindow)
        ));
        assert!(matches!(Model::new(&[]), Err(Error::NoInformativeWindow)));
    }
    #[test]
    fn shape_mismatch() {
        let mut windows = vec![
            window(vec![vec![Methylated, Methylated]]),
            window(vec![vec![Methylated, Methylated]]),
        ];
        windows[1].lambda.push(0.5);
        assert!(matches!(
            Model::new(&windows),
            Err(Error::ShapeMismatch { window: 1, .. })
        ));
        let windows = vec![Window::new(vec![], vec![], vec![], vec![])];
        assert!(matches!(Model::new(&windows), Err(Error::NoCellTypes(0))));
    }
    #[test]
    fn lambda_pseudocount() {
        let mut windows = vec![window(vec![vec![Methylated, Methylated]])];
        windows[0].lambda = vec![1f64, 0f64];
        let model = Model::new(&windows).unwrap();
        assert_eq!(windows[0].lambda, vec![1f64, 0f64]);
        let w = &model.windows()[0];
        assert!(w.lambda.iter().all(|&l| 0f64 < l && l < 1f64));
        assert!(w.log_lambda.iter().all(|l| l.is_finite()));
        assert!(w.log_one_minus_lambda.iter().all(|l| l.is_finite()));
    }
    #[test]
    fn log_likelihood() {
        let reads = vec![vec![Methylated, Methylated], vec![Unmethylated, NoValue]];
        let windows = vec![window(reads.clone()), window(reads)];
        let model = Model::new(&windows).unwrap();
        let alpha = [0.3, 0.7];
        let lambda = [0.9, 0.1];
        let (high, low) = ([0.95f64 * 0.95, 0.05], [0.05f64 * 0.05, 0.95]);
        let answer: f64 = (0..2)
            .map(|c| {
                (0..2)
                    .map(|t| alpha[t] * (lambda[t] * high[c] + (1f64 - lambda[t]) * low[c]))
                    .sum::<f64>()
                    .ln()
            })
            .sum::<f64>()
            * 2f64;
        let lk = model.log_likelihood(&alpha);
        assert!((lk - answer).abs() < 0.00001, "{},{}", lk, answer);
    }
    #[test]
    fn log_likelihood_boundary_alpha() {
        let windows = vec![window(vec![vec![Methylated, Methylated]])];
        let model = Model::new(&windows).unwrap();
        assert!(model.log_likelihood(&[1f64, 0f64]).is_finite());
    }
}
