//! Mutation requests against the hosted backend.
//!
//! Batched requests are atomic on the backend side (all-or-nothing). A
//! successful outcome only means the write committed; the change becomes
//! visible through a later feed snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ErrorCode;
use crate::model::{ItemDraft, ItemId, ItemPatch, OwnerId};

/// Handle for one submitted request. Never reused by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationRequest {
    AddItem {
        owner: OwnerId,
        draft: ItemDraft,
    },
    UpdateItem {
        owner: OwnerId,
        id: ItemId,
        patch: ItemPatch,
    },
    /// Hard, irreversible batch delete.
    DeleteItems { owner: OwnerId, ids: Vec<ItemId> },
    /// Visibility flag flip; never removes data.
    SetArchived {
        owner: OwnerId,
        ids: Vec<ItemId>,
        archived: bool,
    },
}

impl MutationRequest {
    #[must_use]
    pub fn owner(&self) -> &OwnerId {
        match self {
            Self::AddItem { owner, .. }
            | Self::UpdateItem { owner, .. }
            | Self::DeleteItems { owner, .. }
            | Self::SetArchived { owner, .. } => owner,
        }
    }

    /// Number of documents the request touches.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::AddItem { .. } | Self::UpdateItem { .. } => 1,
            Self::DeleteItems { ids, .. } | Self::SetArchived { ids, .. } => ids.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Backend write failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("batch aborted: {0}")]
    Aborted(String),
}

impl BackendError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::BackendUnavailable
    }
}

/// Accepts mutation requests. Completion is reported to the view-model by the
/// host through `InventoryViewModel::handle_mutation_outcome`.
pub trait Backend {
    /// Dispatch a request.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the request could not even be queued.
    fn submit(&mut self, request: MutationRequest) -> Result<RequestId, BackendError>;
}

impl<T: Backend + ?Sized> Backend for &mut T {
    fn submit(&mut self, request: MutationRequest) -> Result<RequestId, BackendError> {
        (**self).submit(request)
    }
}
