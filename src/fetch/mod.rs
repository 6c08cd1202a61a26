//! Asset acquisition: bounded-concurrency downloads with retry and safe
//! destination naming.

mod engine;
mod error;
pub(crate) mod filename;
mod retry;

pub use engine::{AssetFetcher, AssetOutcome, AssetStatus, DEFAULT_DOWNLOAD_CONCURRENCY};
pub use error::FetchError;
pub use filename::{MAX_ASSET_NAME_LEN, asset_file_name};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
