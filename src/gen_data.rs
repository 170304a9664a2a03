//! This module is to generate some random mixtures to assess the performance.
//! Usually, it would not be used in the real-applications.
use crate::error::{Error, Result};
use crate::window::{Call, Window};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// Parameters of a simulated mixture.
/// In each window, each cell type is either in the "high" regime, with Pr{H} = `lambda_high`,
/// or in the "low" regime, with Pr{H} = `lambda_low`, chosen with equal probability.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub num_windows: usize,
    pub num_reads: usize,
    pub num_sites: usize,
    /// True cell type proportions.
    pub proportions: Vec<f64>,
    pub lambda_high: f64,
    pub lambda_low: f64,
    pub theta_high: f64,
    pub theta_low: f64,
    /// Probability of a no-value call.
    pub missing_rate: f64,
}

impl SimConfig {
    pub fn new(proportions: Vec<f64>) -> Self {
        Self {
            num_windows: 100,
            num_reads: 20,
            num_sites: 8,
            proportions,
            lambda_high: 0.9,
            lambda_low: 0.1,
            theta_high: 0.9,
            theta_low: 0.1,
            missing_rate: 0.05,
        }
    }
    pub fn with_size(mut self, num_windows: usize, num_reads: usize, num_sites: usize) -> Self {
        self.num_windows = num_windows;
        self.num_reads = num_reads;
        self.num_sites = num_sites;
        self
    }
    pub fn with_missing_rate(mut self, missing_rate: f64) -> Self {
        self.missing_rate = missing_rate;
        self
    }
    pub fn num_cell_types(&self) -> usize {
        self.proportions.len()
    }
}

/// Simulated windows with the true cell type of each read.
#[derive(Debug, Clone)]
pub struct Sample {
    pub windows: Vec<Window>,
    pub cell_types: Vec<Vec<usize>>,
}

pub fn generate<R: Rng>(rng: &mut R, config: &SimConfig) -> Result<Sample> {
    let choices = WeightedIndex::new(&config.proportions)
        .map_err(|_| Error::InvalidAlpha(config.proportions.clone()))?;
    let (windows, cell_types) = (0..config.num_windows)
        .map(|_| generate_window(rng, config, &choices))
        .unzip();
    Ok(Sample {
        windows,
        cell_types,
    })
}

fn generate_window<R: Rng>(
    rng: &mut R,
    config: &SimConfig,
    choices: &WeightedIndex<f64>,
) -> (Window, Vec<usize>) {
    let num_cell_types = config.num_cell_types();
    let lambda: Vec<f64> = (0..num_cell_types)
        .map(|_| match rng.gen_bool(0.5) {
            true => config.lambda_high,
            false => config.lambda_low,
        })
        .collect();
    let theta_high = vec![vec![config.theta_high; num_cell_types]; config.num_sites];
    let theta_low = vec![vec![config.theta_low; num_cell_types]; config.num_sites];
    let cell_types: Vec<usize> = (0..config.num_reads)
        .map(|_| choices.sample(rng))
        .collect();
    let reads: Vec<Vec<Call>> = cell_types
        .iter()
        .map(|&t| {
            let theta = match rng.gen_bool(lambda[t]) {
                true => &theta_high,
                false => &theta_low,
            };
            theta
                .iter()
                .map(|row| match rng.gen_bool(config.missing_rate) {
                    true => Call::NoValue,
                    false => Call::from(Some(rng.gen_bool(row[t]))),
                })
                .collect()
        })
        .collect();
    let window = Window::new(reads, lambda, theta_high, theta_low);
    (window, cell_types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    #[test]
    fn generate_shapes() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(4382);
        let config = SimConfig::new(vec![0.2, 0.3, 0.5]).with_size(7, 11, 5);
        let sample = generate(&mut rng, &config).unwrap();
        assert_eq!(sample.windows.len(), 7);
        assert_eq!(sample.cell_types.len(), 7);
        for (id, (w, ts)) in sample.windows.iter().zip(sample.cell_types.iter()).enumerate() {
            assert!(w.validate(id, 3).is_ok());
            assert_eq!(w.num_reads(), 11);
            assert_eq!(w.num_sites(), 5);
            assert_eq!(ts.len(), 11);
            assert!(ts.iter().all(|&t| t < 3));
        }
    }
    #[test]
    fn generate_deterministic() {
        let config = SimConfig::new(vec![0.5, 0.5]).with_size(3, 4, 2);
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(1);
        let xs = generate(&mut rng, &config).unwrap();
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(1);
        let ys = generate(&mut rng, &config).unwrap();
        assert_eq!(xs.cell_types, ys.cell_types);
        for (x, y) in xs.windows.iter().zip(ys.windows.iter()) {
            assert_eq!(x.reads, y.reads);
            assert_eq!(x.lambda, y.lambda);
        }
    }
    #[test]
    fn all_missing() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(2);
        let config = SimConfig::new(vec![0.5, 0.5]).with_missing_rate(1f64);
        let sample = generate(&mut rng, &config).unwrap();
        assert!(sample.windows.iter().all(|w| !w.is_informative()));
    }
    #[test]
    fn invalid_proportions() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(3);
        let config = SimConfig::new(vec![0f64, 0f64]);
        assert!(matches!(
            generate(&mut rng, &config),
            Err(Error::InvalidAlpha(_))
        ));
    }
}
