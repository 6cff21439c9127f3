use quoteflow_data::DataError;
use quoteflow_integration::IntegrationError;
use thiserror::Error;

/// Aggregate error type for whatever orchestrates the `data` and `integration`
/// crates together (a binary's `main`, an embedding application).
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("data: {0}")]
    Data(#[from] DataError),

    #[error("integration: {0}")]
    Integration(#[from] IntegrationError),

    #[error("background task join failed: {0}")]
    Join(String),
}
