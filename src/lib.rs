//! Read-based deconvolution of methylation sequencing data.
//! Estimates the cell type proportions of a mixed sample by an EM algorithm
//! with two latent variables per read: the cell type it came from,
//! and the epistate (H or L) it was generated by.
#[macro_use]
extern crate log;
pub mod em;
pub mod error;
pub mod gen_data;
pub mod model;
pub mod window;
pub use em::{Deconvolution, EmConfig, Status};
pub use error::{Error, Result};
pub use model::Model;
pub use window::{Call, Window};

/// Small value to keep probabilities away from 0 and 1.
pub const PSEUDOCOUNT: f64 = 1e-10;

/// Return a copy of `xs` where exact 0s and 1s are nudged into (0,1) by `PSEUDOCOUNT`.
pub fn add_pseudocounts(xs: &[f64]) -> Vec<f64> {
    xs.iter()
        .map(|&x| {
            if x == 1f64 {
                x - PSEUDOCOUNT
            } else if x == 0f64 {
                x + PSEUDOCOUNT
            } else {
                x
            }
        })
        .collect()
}

// LogSumExp(xs). If the slice is empty, or all the elements are -inf, it returns -inf.
pub fn logsumexp(xs: &[f64]) -> f64 {
    match xs.len() {
        0 => std::f64::NEG_INFINITY,
        1 => xs[0],
        2 => logsumexp2(xs[0], xs[1]),
        _ => {
            let max = xs.iter().fold(std::f64::NEG_INFINITY, |x, &y| x.max(y));
            if max == std::f64::NEG_INFINITY {
                return max;
            }
            max + xs.iter().map(|x| (x - max).exp()).sum::<f64>().ln()
        }
    }
}

// Log(exp(x) + exp(y)) = x + Log(1+exp(y-x)).
pub fn logsumexp2(x: f64, y: f64) -> f64 {
    let (x, y) = (x.max(y), x.min(y));
    if x == std::f64::NEG_INFINITY {
        x
    } else {
        x + (1f64 + (y - x).exp()).ln()
    }
}
