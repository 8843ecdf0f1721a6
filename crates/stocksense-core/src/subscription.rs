//! Single-slot subscription holder.
//!
//! At most one subscription is live at any time. Replacing the key always
//! tears the old subscription down before the new one is opened, so two
//! subscriptions never overlap.

use tracing::debug;

use crate::feed::{FeedError, LiveFeed, SubscriptionId, SubscriptionKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSubscription {
    pub id: SubscriptionId,
    pub key: SubscriptionKey,
    /// Whether the first snapshot for this subscription has been applied.
    pub primed: bool,
}

#[derive(Debug, Default)]
pub struct SubscriptionSlot {
    active: Option<ActiveSubscription>,
}

impl SubscriptionSlot {
    #[must_use]
    pub const fn new() -> Self {
        Self { active: None }
    }

    #[must_use]
    pub const fn active(&self) -> Option<&ActiveSubscription> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn key(&self) -> Option<&SubscriptionKey> {
        self.active.as_ref().map(|a| &a.key)
    }

    /// Whether `id` names the live subscription. Events for any other id are stale.
    #[must_use]
    pub fn is_current(&self, id: SubscriptionId) -> bool {
        self.active.as_ref().is_some_and(|a| a.id == id)
    }

    /// Mark the live subscription as having delivered its first snapshot.
    /// Returns `true` if this was the first one.
    pub fn mark_primed(&mut self) -> bool {
        match self.active.as_mut() {
            Some(active) if !active.primed => {
                active.primed = true;
                true
            }
            _ => false,
        }
    }

    /// Tear down any live subscription, then open one for `key`.
    ///
    /// # Errors
    ///
    /// Returns the feed's error if the new subscription cannot be opened; the
    /// slot is left empty in that case.
    pub fn replace<F: LiveFeed>(
        &mut self,
        feed: &mut F,
        key: SubscriptionKey,
    ) -> Result<SubscriptionId, FeedError> {
        self.teardown(feed);
        let id = feed.subscribe(&key)?;
        debug!(subscription = %id, key = %key, "subscribed");
        self.active = Some(ActiveSubscription {
            id,
            key,
            primed: false,
        });
        Ok(id)
    }

    /// Unsubscribe the live subscription, if any.
    pub fn teardown<F: LiveFeed>(&mut self, feed: &mut F) {
        if let Some(active) = self.active.take() {
            feed.unsubscribe(active.id);
            debug!(subscription = %active.id, key = %active.key, "unsubscribed");
        }
    }
}
