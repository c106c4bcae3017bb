use polars::error::PolarsError;
use sdmxprep::error::SdmxPrepError;

#[derive(thiserror::Error, Debug)]
pub enum SdmxPrepCliError {
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error(transparent)]
    SdmxPrepError(#[from] SdmxPrepError),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type SdmxPrepCliResult<T> = Result<T, SdmxPrepCliError>;
