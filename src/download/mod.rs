//! HTTP download side of the pipeline.
//!
//! This module provides the bounded-concurrency download queue and the
//! transfer workers that stream package archives to disk.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large archives)
//! - Fixed archive naming (`{id}.zip` under the download root)
//! - Monotonic, deduplicated progress events
//! - Cooperative cancellation at chunk boundaries
//! - Incremental SHA-256 verification against the catalogue checksum

mod checksum;
mod client;
mod error;
mod manager;
mod worker;

pub use client::{HttpClient, RequestSigner, Transport, TransferSource};
pub use error::DownloadError;
pub use manager::DownloadManager;
