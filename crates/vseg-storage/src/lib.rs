//! Signed object storage transfers.
//!
//! This crate provides:
//! - HMAC-SHA1 request signing shared with the media processing API
//! - Candidate endpoint domains with DNS + TCP reachability probing
//! - Uploads and downloads that walk domains with scheduled retries

pub mod config;
pub mod domains;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod signer;
pub mod transfer;

pub use config::StorageConfig;
pub use domains::{DomainCandidate, DomainKind, DomainSelector};
pub use error::{StorageError, StorageResult};
pub use retry::{retry_async, FailureTracker, RetryPolicy, RetryResult, Retryable};
pub use signer::{canonical_uri, Clock, Credential, FixedClock, KeyTime, RequestSigner, SignedRequest, SystemClock};
pub use transfer::{content_type_for, TransferDirection, TransferManager, TransferReceipt, TransferTask};
