//! Error taxonomy shared by every pipeline stage
//!
//! Each variant corresponds to one user-visible condition. Unexpected engine
//! failures stay distinguishable through the transparent `Polars` variant
//! instead of being folded into a generic format error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Wrong columns, sheets or encoding. The upload must be discarded
    /// without touching the current working set.
    #[error("could not read data, check the format: {0}")]
    Malformed(String),

    /// Valid format but zero usable rows, either before or after cleanup.
    #[error("no valid data in the upload")]
    EmptyAfterFilter,

    /// A required upstream table has not been loaded yet. The message names
    /// exactly which prerequisite is absent.
    #[error("missing prerequisite data: {0}")]
    MissingPrerequisite(String),

    /// The trainable subset is empty; softer than "no data at all".
    #[error("insufficient data to train a model")]
    NoTrainableRows,

    /// The regression could not be fitted (e.g. singular design matrix).
    /// Terminal for the run, never retried.
    #[error("model fit failed: {0}")]
    Fit(String),

    #[error(transparent)]
    Polars(#[from] polars::prelude::PolarsError),
}

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;
