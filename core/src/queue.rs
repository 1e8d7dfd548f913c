//! Waiting-room model: per-session configuration, queue entries and their lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//!              promote            order committed
//!   ┌─────────┐ ─────▶ ┌────────┐ ─────────────▶ ┌───────────┐
//!   │ waiting │        │ active │                │ completed │
//!   └────┬────┘        └───┬────┘                └───────────┘
//!        │ leave /         │ slot lapsed / leave
//!        │ sale closed     ▼
//!        └──────────▶ expired | cancelled
//! ```
//!
//! Terminal states have no outgoing transition. A user who re-joins after reaching a
//! terminal state starts a new lifecycle through [`QueueEntry::reopen`], which assigns a
//! fresh queue number and clears the previous timestamps.

use crate::ids::{SessionId, UserId};
use crate::membership::MembershipTier;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-session waiting-room settings.
///
/// Owned by the catalog administration and read-only here. A session without a
/// configuration (or with `is_enabled == false`) has no admission control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingRoomConfig {
    /// Maximum number of users holding a place (waiting or active) at once.
    pub max_capacity: u32,
    /// Maximum number of simultaneously active purchase slots.
    pub concurrent_purchase_limit: u32,
    /// Length of an active purchase slot in minutes.
    pub queue_timeout_minutes: u32,
    /// Whether the waiting room gates the session.
    pub is_enabled: bool,
}

impl WaitingRoomConfig {
    /// Duration of a purchase slot.
    #[must_use]
    pub fn slot_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.queue_timeout_minutes))
    }

    /// Estimated wait for a user at the given 1-based position.
    ///
    /// `position * timeout / limit`, rounded up so a waiting user never sees zero.
    #[must_use]
    pub fn estimated_wait_minutes(&self, position: u64) -> u64 {
        let limit = u64::from(self.concurrent_purchase_limit.max(1));
        (position.saturating_mul(u64::from(self.queue_timeout_minutes))).div_ceil(limit)
    }
}

/// Tie-break policy used when promoting waiting users.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionOrder {
    /// Strict arrival order. Priority scores are recorded but ignored.
    #[default]
    Fifo,
    /// Higher priority score first, arrival order within the same score.
    PriorityThenFifo,
}

impl PromotionOrder {
    /// Sort score for a queue member; lower scores are promoted first.
    ///
    /// Scores stay below 2^53 for any realistic queue number, so they are exact when a
    /// backend stores them as `f64`.
    #[must_use]
    pub fn score(self, queue_number: i64, priority_score: i32) -> u64 {
        let number = u64::try_from(queue_number).unwrap_or(0);
        match self {
            Self::Fifo => number,
            Self::PriorityThenFifo => {
                let clamped = priority_score.clamp(0, MembershipTier::MAX_PRIORITY_SCORE);
                let band = u64::try_from(MembershipTier::MAX_PRIORITY_SCORE - clamped).unwrap_or(0);
                (band << 32) + number
            }
        }
    }
}

impl FromStr for PromotionOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "priority" | "priority_then_fifo" => Ok(Self::PriorityThenFifo),
            other => Err(format!("unknown promotion order: {other}")),
        }
    }
}

/// Lifecycle status of a queue entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// In line, not yet allowed to purchase.
    Waiting,
    /// Holding a purchase slot.
    Active,
    /// Finished with an order.
    Completed,
    /// Slot or sale window lapsed.
    Expired,
    /// Left voluntarily.
    Cancelled,
}

impl QueueStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Waiting,
        Self::Active,
        Self::Completed,
        Self::Expired,
        Self::Cancelled,
    ];

    /// Returns `true` if the transition `self -> next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Active | Self::Cancelled | Self::Expired)
                | (Self::Active, Self::Completed | Self::Expired | Self::Cancelled)
        )
    }

    /// Terminal statuses have no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Expired | Self::Cancelled)
    }

    /// Waiting or active: the user holds a place in the session.
    #[must_use]
    pub const fn is_live(self) -> bool {
        !self.is_terminal()
    }

    /// Database/string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown queue status: {s}"))
    }
}

/// A rejected status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("illegal queue transition: {from} -> {to}")]
pub struct TransitionError {
    /// Status the entry was in.
    pub from: QueueStatus,
    /// Status that was requested.
    pub to: QueueStatus,
}

/// One user's place in one session's waiting room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Buyer.
    pub user_id: UserId,
    /// Sale session.
    pub session_id: SessionId,
    /// Monotonic per session; assigned on join and on reopen.
    pub queue_number: i64,
    /// Derived from the membership tier at join time.
    pub priority_score: i32,
    /// Lifecycle status.
    pub status: QueueStatus,
    /// When the current lifecycle started.
    pub entered_at: DateTime<Utc>,
    /// When the user was promoted.
    pub activated_at: Option<DateTime<Utc>>,
    /// Hard deadline of the purchase slot.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the entry reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last heartbeat while active.
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Creates a new `waiting` entry.
    #[must_use]
    pub const fn waiting(
        user_id: UserId,
        session_id: SessionId,
        queue_number: i64,
        tier: MembershipTier,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            session_id,
            queue_number,
            priority_score: tier.priority_score(),
            status: QueueStatus::Waiting,
            entered_at: now,
            activated_at: None,
            expires_at: None,
            completed_at: None,
            last_heartbeat: None,
        }
    }

    /// Validates and applies a status change, stamping the matching timestamp.
    ///
    /// Use [`activate`](Self::activate) for `waiting -> active` so the slot deadline is set.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the transition table does not allow it.
    pub fn transition(&mut self, to: QueueStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError { from: self.status, to });
        }
        self.status = to;
        if to.is_terminal() {
            self.completed_at = Some(now);
        } else if to == QueueStatus::Active {
            self.activated_at = Some(now);
        }
        Ok(())
    }

    /// Promotes a waiting entry, granting a slot that ends at `expires_at`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless the entry is `waiting`.
    pub fn activate(&mut self, now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(QueueStatus::Active, now)?;
        self.expires_at = Some(expires_at);
        Ok(())
    }

    /// Starts a new lifecycle for a user whose previous one ended.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the entry is still live.
    pub fn reopen(
        &mut self,
        queue_number: i64,
        priority_score: i32,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.is_terminal() {
            return Err(TransitionError {
                from: self.status,
                to: QueueStatus::Waiting,
            });
        }
        *self = Self {
            user_id: self.user_id,
            session_id: self.session_id,
            queue_number,
            priority_score,
            status: QueueStatus::Waiting,
            entered_at: now,
            activated_at: None,
            expires_at: None,
            completed_at: None,
            last_heartbeat: None,
        };
        Ok(())
    }

    /// Active with a deadline still in the future.
    #[must_use]
    pub fn holds_live_slot(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Active && self.expires_at.is_some_and(|at| at > now)
    }

    /// Active but past its deadline, waiting for the reaper.
    #[must_use]
    pub fn slot_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Active && self.expires_at.is_none_or(|at| at <= now)
    }

    /// Seconds spent waiting before promotion, if promoted.
    #[must_use]
    pub fn wait_seconds(&self) -> Option<i64> {
        self.activated_at.map(|at| (at - self.entered_at).num_seconds())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entry() -> QueueEntry {
        QueueEntry::waiting(UserId::new(), SessionId::new(), 1, MembershipTier::Basic, Utc::now())
    }

    #[test]
    fn transition_table_is_exact() {
        use QueueStatus::{Active, Cancelled, Completed, Expired, Waiting};

        let allowed = [
            (Waiting, Active),
            (Waiting, Cancelled),
            (Waiting, Expired),
            (Active, Completed),
            (Active, Expired),
            (Active, Cancelled),
        ];
        for from in QueueStatus::ALL {
            for to in QueueStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn waiting_cannot_complete() {
        let mut e = entry();
        let err = e.transition(QueueStatus::Completed, Utc::now()).unwrap_err();
        assert_eq!(err.from, QueueStatus::Waiting);
        assert_eq!(e.status, QueueStatus::Waiting);
    }

    #[test]
    fn activation_sets_deadline() {
        let mut e = entry();
        let now = Utc::now();
        e.activate(now, now + Duration::minutes(15)).unwrap();
        assert!(e.holds_live_slot(now));
        assert!(e.slot_lapsed(now + Duration::minutes(15)));
        assert_eq!(e.activated_at, Some(now));
    }

    #[test]
    fn reopen_only_after_terminal() {
        let mut e = entry();
        assert!(e.reopen(2, 100, Utc::now()).is_err());

        e.transition(QueueStatus::Cancelled, Utc::now()).unwrap();
        e.reopen(2, 100, Utc::now()).unwrap();
        assert_eq!(e.status, QueueStatus::Waiting);
        assert_eq!(e.queue_number, 2);
        assert_eq!(e.priority_score, 100);
        assert!(e.completed_at.is_none());
    }

    #[test]
    fn estimated_wait_rounds_up() {
        let config = WaitingRoomConfig {
            max_capacity: 100,
            concurrent_purchase_limit: 10,
            queue_timeout_minutes: 15,
            is_enabled: true,
        };
        assert_eq!(config.estimated_wait_minutes(1), 2);
        assert_eq!(config.estimated_wait_minutes(10), 15);
        assert_eq!(config.estimated_wait_minutes(11), 17);
    }

    #[test]
    fn priority_score_orders_tiers_before_arrival() {
        let policy = PromotionOrder::PriorityThenFifo;
        let early_basic = policy.score(1, 0);
        let late_premium = policy.score(500, 100);
        let later_premium = policy.score(501, 100);
        assert!(late_premium < early_basic);
        assert!(late_premium < later_premium);

        assert!(PromotionOrder::Fifo.score(1, 0) < PromotionOrder::Fifo.score(500, 100));
    }
}
