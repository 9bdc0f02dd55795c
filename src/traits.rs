//! Seams between the dedup engine and the CRM.
//!
//! The engine never talks HTTP itself. It pulls contacts from a
//! [`ContactSource`] and pushes pairwise merges to a [`MergeExecutor`];
//! [`HubSpotClient`](crate::hubspot::HubSpotClient) implements both against
//! the HubSpot REST API, and tests plug in in-memory versions.
//!
//! ```text
//!  ContactSource ──▶ group ──▶ plan ──▶ MergeExecutor
//!        │                                   │
//!        └────────────── RunReporter ◀───────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use contact_dedup::models::ContactId;
//! use contact_dedup::traits::{MergeError, MergeExecutor};
//!
//! /// Pretends every merge succeeds and keeps the survivor id.
//! struct AlwaysMerges;
//!
//! #[async_trait]
//! impl MergeExecutor for AlwaysMerges {
//!     async fn merge(
//!         &self,
//!         survivor: &ContactId,
//!         _absorbed: &ContactId,
//!     ) -> Result<ContactId, MergeError> {
//!         Ok(survivor.clone())
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Contact, ContactId};
use crate::window::DateWindow;

pub use crate::progress::RunReporter;

/// Supplies contact snapshots for a date window.
#[async_trait]
pub trait ContactSource: Send + Sync {
    /// Short label used in logs and progress output (e.g. `"hubspot"`).
    fn name(&self) -> &str {
        "custom"
    }

    /// Fetch every contact in `window`, in the source's pagination order.
    ///
    /// An error here aborts the run: nothing can be grouped without data.
    async fn fetch_contacts(&self, window: &DateWindow) -> Result<Vec<Contact>>;
}

/// Performs one pairwise merge.
#[async_trait]
pub trait MergeExecutor: Send + Sync {
    /// Merge `absorbed` into `survivor` and return the id of the record that
    /// remains. The CRM may issue a new id for the merged record, so callers
    /// chaining merges must use the returned value.
    async fn merge(&self, survivor: &ContactId, absorbed: &ContactId)
        -> Result<ContactId, MergeError>;
}

/// A failed pairwise merge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error("merge rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("merge rate limited after {attempts} attempt(s)")]
    RateLimited { attempts: u32 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid merge response: {0}")]
    InvalidResponse(String),
}
