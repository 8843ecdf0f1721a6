//! Bulk mutation lifecycle: idle → in-flight → succeeded/failed → idle.
//!
//! Only one operation may be outstanding. Results never touch the canonical
//! list; they only drive the busy flag and the notice shown to the user.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::backend::RequestId;
use crate::error::ViewModelError;
use crate::model::OwnerId;

/// User-facing operations routed through the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkOperation {
    Add,
    Edit,
    Archive,
    Unarchive,
    Delete,
    Export,
}

impl BulkOperation {
    /// Whether success clears the selection.
    #[must_use]
    pub const fn consumes_selection(self) -> bool {
        matches!(
            self,
            Self::Archive | Self::Unarchive | Self::Delete | Self::Export
        )
    }

    const fn verb(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Edit => "update",
            Self::Archive => "archive",
            Self::Unarchive => "restore",
            Self::Delete => "delete",
            Self::Export => "export",
        }
    }

    const fn past_tense(self) -> &'static str {
        match self {
            Self::Add => "added",
            Self::Edit => "updated",
            Self::Archive => "archived",
            Self::Unarchive => "restored",
            Self::Delete => "deleted",
            Self::Export => "exported",
        }
    }

    fn success_message(self, count: usize) -> String {
        match (self, count) {
            (Self::Add | Self::Edit, _) => format!("Item {} successfully", self.past_tense()),
            (_, 1) => format!("1 item {} successfully", self.past_tense()),
            (_, n) => format!("{n} items {} successfully", self.past_tense()),
        }
    }

    fn failure_message(self, count: usize, error: &ViewModelError) -> String {
        let noun = if count == 1 { "item" } else { "items" };
        format!("Failed to {} {noun}: {error}", self.verb())
    }
}

impl fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Transient message for the notification area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub shown_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    pub request: RequestId,
    /// Identity the request was issued for.
    pub owner: OwnerId,
    pub operation: BulkOperation,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    InFlight(InFlight),
    Succeeded {
        operation: BulkOperation,
        notice: Notice,
    },
    Failed {
        operation: BulkOperation,
        error: ViewModelError,
        notice: Notice,
    },
}

/// What a resolved request means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Succeeded(BulkOperation),
    Failed(BulkOperation),
    /// Resolved after the issuing identity signed out or was replaced.
    /// Nothing is shown to the current identity.
    Superseded(BulkOperation),
}

#[derive(Debug, Clone)]
pub struct BulkOrchestrator {
    phase: Phase,
    success_display: Duration,
}

impl BulkOrchestrator {
    #[must_use]
    pub const fn new(success_display: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            success_display,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> &Phase {
        &self.phase
    }

    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self.phase, Phase::InFlight(_))
    }

    #[must_use]
    pub const fn in_flight(&self) -> Option<&InFlight> {
        match &self.phase {
            Phase::InFlight(flight) => Some(flight),
            _ => None,
        }
    }

    #[must_use]
    pub const fn notice(&self) -> Option<&Notice> {
        match &self.phase {
            Phase::Succeeded { notice, .. } | Phase::Failed { notice, .. } => Some(notice),
            Phase::Idle | Phase::InFlight(_) => None,
        }
    }

    /// A new user action dismisses a lingering failure.
    pub fn acknowledge(&mut self) {
        if matches!(self.phase, Phase::Failed { .. }) {
            self.phase = Phase::Idle;
        }
    }

    /// Dismiss whatever notice is showing. No effect while in flight.
    pub fn dismiss(&mut self) {
        if !self.is_busy() {
            self.phase = Phase::Idle;
        }
    }

    pub fn begin(
        &mut self,
        request: RequestId,
        owner: OwnerId,
        operation: BulkOperation,
        count: usize,
    ) {
        debug!(%request, %owner, %operation, count, "bulk operation in flight");
        self.phase = Phase::InFlight(InFlight {
            request,
            owner,
            operation,
            count,
        });
    }

    /// Record a success that needed no backend round trip.
    pub fn succeed_now(&mut self, operation: BulkOperation, count: usize, now: Instant) {
        info!(%operation, count, "bulk operation succeeded");
        self.phase = Phase::Succeeded {
            operation,
            notice: Notice {
                level: NoticeLevel::Success,
                message: operation.success_message(count),
                shown_at: now,
            },
        };
    }

    /// Record a failure, whether raised locally after dispatch or by the backend.
    pub fn fail_now(
        &mut self,
        operation: BulkOperation,
        count: usize,
        error: ViewModelError,
        now: Instant,
    ) {
        warn!(%operation, count, code = %error.code(), "bulk operation failed: {error}");
        let message = operation.failure_message(count, &error);
        self.phase = Phase::Failed {
            operation,
            error,
            notice: Notice {
                level: NoticeLevel::Error,
                message,
                shown_at: now,
            },
        };
    }

    /// Apply a backend outcome. Outcomes for requests other than the one in
    /// flight are ignored and yield `None`.
    ///
    /// `current` is the identity signed in when the outcome arrives. If it is
    /// not the identity that issued the request, the orchestrator goes back
    /// to `Idle` without a notice.
    pub fn resolve(
        &mut self,
        request: RequestId,
        outcome: Result<(), ViewModelError>,
        current: Option<&OwnerId>,
        now: Instant,
    ) -> Option<Resolution> {
        let flight = match &self.phase {
            Phase::InFlight(flight) if flight.request == request => flight.clone(),
            _ => {
                debug!(%request, "ignoring outcome for a request that is not in flight");
                return None;
            }
        };
        if current != Some(&flight.owner) {
            debug!(
                %request,
                owner = %flight.owner,
                operation = %flight.operation,
                ok = outcome.is_ok(),
                "outcome for a previous identity; not shown"
            );
            self.phase = Phase::Idle;
            return Some(Resolution::Superseded(flight.operation));
        }
        match outcome {
            Ok(()) => {
                self.succeed_now(flight.operation, flight.count, now);
                Some(Resolution::Succeeded(flight.operation))
            }
            Err(error) => {
                self.fail_now(flight.operation, flight.count, error, now);
                Some(Resolution::Failed(flight.operation))
            }
        }
    }

    /// Expire a success notice once its display duration has elapsed.
    pub fn tick(&mut self, now: Instant) {
        if let Phase::Succeeded { notice, .. } = &self.phase {
            if now.saturating_duration_since(notice.shown_at) >= self.success_display {
                self.phase = Phase::Idle;
            }
        }
    }
}
