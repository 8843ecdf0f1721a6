//! Live feed abstraction.
//!
//! A feed delivers an initial snapshot and then a full replacement snapshot
//! every time matching data changes, until unsubscribed. The feed never
//! calls into the view-model: the host collects [`FeedEvent`]s and hands
//! them over with `InventoryViewModel::handle_feed_event`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ErrorCode;
use crate::model::OwnerId;

/// Parameters of a feed query: one owner, one partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub owner: OwnerId,
    pub archived: bool,
}

impl SubscriptionKey {
    #[must_use]
    pub fn new(owner: impl Into<OwnerId>, archived: bool) -> Self {
        Self {
            owner: owner.into(),
            archived,
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let partition = if self.archived { "archived" } else { "active" };
        write!(f, "{}/{}", self.owner, partition)
    }
}

/// Handle for one subscription. Never reused by a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Feed failures (network, permission, quota).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("feed unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl FeedError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::FeedUnavailable
    }
}

/// What a feed pushed for a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedPayload {
    /// Complete replacement set of loosely-typed records.
    Snapshot(Vec<serde_json::Value>),
    Error(FeedError),
}

/// A payload tagged with the subscription it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    pub subscription: SubscriptionId,
    pub payload: FeedPayload,
}

impl FeedEvent {
    #[must_use]
    pub fn snapshot(subscription: SubscriptionId, records: Vec<serde_json::Value>) -> Self {
        Self {
            subscription,
            payload: FeedPayload::Snapshot(records),
        }
    }

    #[must_use]
    pub fn error(subscription: SubscriptionId, error: FeedError) -> Self {
        Self {
            subscription,
            payload: FeedPayload::Error(error),
        }
    }
}

/// A push-based data source filtered by [`SubscriptionKey`].
///
/// Retry and backoff are the feed's own business.
pub trait LiveFeed {
    /// Open a subscription. The initial snapshot arrives later as a [`FeedEvent`].
    ///
    /// # Errors
    ///
    /// Returns a [`FeedError`] when the subscription cannot be opened at all.
    fn subscribe(&mut self, key: &SubscriptionKey) -> Result<SubscriptionId, FeedError>;

    /// Cancel interest in a subscription. Must be idempotent.
    fn unsubscribe(&mut self, id: SubscriptionId);
}

impl<T: LiveFeed + ?Sized> LiveFeed for &mut T {
    fn subscribe(&mut self, key: &SubscriptionKey) -> Result<SubscriptionId, FeedError> {
        (**self).subscribe(key)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        (**self).unsubscribe(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display_names_partition() {
        assert_eq!(SubscriptionKey::new("u1", false).to_string(), "u1/active");
        assert_eq!(SubscriptionKey::new("u1", true).to_string(), "u1/archived");
    }
}
