//! Snagline - voice-capture punchlist core
//!
//! This crate provides the capture-to-record pipeline of a construction
//! punchlist tool: a field user speaks a sentence and takes a photo, and the
//! sentence becomes a structured defect record in a shared, live job list.
//! It features:
//!
//! - A continuous speech-recognition session with live transcript accumulation
//! - LLM-backed extraction of `room` / `description` / `category` fields
//! - A guarded draft state machine that tolerates extraction failure
//! - Live, subscription-based job/item stores over pluggable backends
//! - Report row assembly for the downstream document renderer
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use snagline::model::{ItemFields, PhotoBlob};
//! use snagline::store::{JobStore, MemoryDocumentStore, MemoryObjectStore};
//!
//! #[tokio::main]
//! async fn main() -> snagline::Result<()> {
//!     let store = JobStore::new(
//!         Arc::new(MemoryDocumentStore::new()),
//!         Arc::new(MemoryObjectStore::new()),
//!     );
//!
//!     let job = store.add_job("Riverside build-out", "user-1").await?;
//!
//!     let fields = ItemFields {
//!         room: "101".to_string(),
//!         description: "cracked tile floor".to_string(),
//!         category: "Division 09 - Finishes".to_string(),
//!     };
//!     let photo = PhotoBlob::new(vec![0xFF, 0xD8], "floor.jpg", "image/jpeg");
//!     store.add_item(job.id, fields, photo).await?;
//!
//!     // The subscription reflects the change without an explicit refresh.
//!     let jobs = store.jobs("user-1").await?;
//!     assert_eq!(jobs.borrow()[0].items.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod config;
pub mod draft;
pub mod extract;
pub mod model;
pub mod report;
pub mod store;
pub mod workflow;

// Re-export commonly used types for convenience
pub use capture::{CaptureReason, SpeechCapture, SpeechEvent, TranscriptAccumulator};
pub use config::AppConfig;
pub use draft::{Draft, DraftSnapshot, DraftState};
pub use extract::{ExtractedFields, ExtractionFailure, ExtractionService, FieldExtractor};
pub use model::{CategorySet, ItemFields, Job, PhotoBlob, PhotoRef, PunchlistItem};
pub use report::{Report, ReportRenderer, ReportRow};
pub use store::{DocumentStore, JobStore, MemoryDocumentStore, MemoryObjectStore, ObjectStore};
pub use workflow::CaptureWorkflow;

// Error types
use thiserror::Error;

/// Errors that can occur in the snagline pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// The platform offers no speech-recognition facility
    #[error("speech recognition is not available on this platform")]
    CapabilityUnavailable,

    /// A capture session ended abnormally
    #[error("speech capture failed: {0}")]
    Capture(CaptureReason),

    /// Extraction produced no usable fields
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionFailure),

    /// User input is incomplete; names every missing field
    #[error("missing required fields: {}", missing.join(", "))]
    Validation { missing: Vec<&'static str> },

    /// A referenced job or item no longer exists
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A store write failed; the optimistic local change is not committed
    #[error("store write failed: {message}")]
    Persistence {
        message: String,
        /// Durable photo reference already uploaded before the write failed
        orphaned_photo: Option<String>,
    },

    /// Best-effort photo cleanup failed
    #[error("photo cleanup failed: {0}")]
    StorageCleanup(String),

    /// The capture workflow's background task is no longer running
    #[error("capture workflow stopped")]
    Closed,
}

impl Error {
    pub(crate) fn persistence(message: impl Into<String>) -> Self {
        Error::Persistence {
            message: message.into(),
            orphaned_photo: None,
        }
    }
}

/// Result type alias for snagline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
