//! Input data: methylation calls of reads in a genomic window, together with the
//! per-window priors of each cell type.
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A methylation call of a read at a CpG site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    Methylated,
    Unmethylated,
    NoValue,
}

impl Call {
    pub fn is_informative(self) -> bool {
        self != Call::NoValue
    }
}

impl std::convert::From<Option<bool>> for Call {
    fn from(call: Option<bool>) -> Call {
        match call {
            Some(true) => Call::Methylated,
            Some(false) => Call::Unmethylated,
            None => Call::NoValue,
        }
    }
}

/// An independently-analyzed genomic region.
/// Shapes: `reads` is C x M, `lambda` has length T, and
/// `theta_high`, `theta_low` are M x T (site-major).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Window {
    /// Methylation calls. `reads[c][m]` is the call of the c-th read at the m-th site.
    pub reads: Vec<Vec<Call>>,
    /// Pr{epistate H | cell type t}.
    pub lambda: Vec<f64>,
    /// Pr{methylated at site m | epistate H, cell type t}.
    pub theta_high: Vec<Vec<f64>>,
    /// Pr{methylated at site m | epistate L, cell type t}.
    pub theta_low: Vec<Vec<f64>>,
}

impl Window {
    pub fn new(
        reads: Vec<Vec<Call>>,
        lambda: Vec<f64>,
        theta_high: Vec<Vec<f64>>,
        theta_low: Vec<Vec<f64>>,
    ) -> Self {
        Self {
            reads,
            lambda,
            theta_high,
            theta_low,
        }
    }
    pub fn num_reads(&self) -> usize {
        self.reads.len()
    }
    /// Number of CpG sites. Taken from the theta matrices, as a window may have no reads.
    pub fn num_sites(&self) -> usize {
        self.theta_high.len()
    }
    pub fn num_cell_types(&self) -> usize {
        self.lambda.len()
    }
    /// True if at least one read has a methylated or unmethylated call.
    pub fn is_informative(&self) -> bool {
        self.reads
            .iter()
            .any(|read| read.iter().any(|call| call.is_informative()))
    }
    /// Check the shapes and value ranges of this window against `num_cell_types`.
    /// `id` is only used for reporting.
    pub fn validate(&self, id: usize, num_cell_types: usize) -> Result<()> {
        let shape = |what: &'static str, expected: usize, found: usize| match expected == found {
            true => Ok(()),
            false => Err(Error::ShapeMismatch {
                window: id,
                what,
                expected,
                found,
            }),
        };
        shape("length of lambda", num_cell_types, self.lambda.len())?;
        let num_sites = self.num_sites();
        shape("rows of theta_low", num_sites, self.theta_low.len())?;
        for row in self.theta_high.iter() {
            shape("columns of theta_high", num_cell_types, row.len())?;
        }
        for row in self.theta_low.iter() {
            shape("columns of theta_low", num_cell_types, row.len())?;
        }
        for read in self.reads.iter() {
            shape("sites of a read", num_sites, read.len())?;
        }
        let check = |what: &'static str, xs: &[f64]| match xs.iter().find(|x| !(0f64..=1f64).contains(*x)) {
            Some(&value) => Err(Error::InvalidProbability {
                window: id,
                what,
                value,
            }),
            None => Ok(()),
        };
        check("lambda", &self.lambda)?;
        self.theta_high
            .iter()
            .try_for_each(|row| check("theta_high", row.as_slice()))?;
        self.theta_low
            .iter()
            .try_for_each(|row| check("theta_low", row.as_slice()))?;
        Ok(())
    }
}
