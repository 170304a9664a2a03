//! Errors raised while setting up or running a deconvolution.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No cell types: lambda of window {0} is empty")]
    NoCellTypes(usize),
    #[error("Shape mismatch in window {window}: {what} should be {expected}, found {found}")]
    ShapeMismatch {
        window: usize,
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Invalid probability in window {window}: {what} = {value}")]
    InvalidProbability {
        window: usize,
        what: &'static str,
        value: f64,
    },
    #[error("Length of alpha ({found}) != number of cell types ({expected})")]
    AlphaLength { expected: usize, found: usize },
    #[error("Invalid alpha: {0:?}. Entries should be finite, non-negative, and not all zero")]
    InvalidAlpha(Vec<f64>),
    #[error("No window has an informative read")]
    NoInformativeWindow,
}

pub type Result<T> = std::result::Result<T, Error>;
