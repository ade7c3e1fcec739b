//! # Assignment Events
//!
//! Real-time notifications for assignment activity. Notification delivery is
//! someone else's job: rule side effects such as `notify` or `set_priority` are
//! published here as intents and a subscriber decides what to do with them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::model::{AgentId, AssignmentReason, LeadId, RuleId};
use crate::routing::RuleAction;

/// Event published by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssignmentEvent {
    LeadAssigned {
        event_id: Uuid,
        lead_id: LeadId,
        assigned_to: AgentId,
        reason: AssignmentReason,
        rule_id: Option<RuleId>,
        at: DateTime<Utc>,
    },
    LeadReassigned {
        event_id: Uuid,
        lead_id: LeadId,
        previous_assignee: Option<AgentId>,
        assigned_to: AgentId,
        reason: AssignmentReason,
        actor: AgentId,
        at: DateTime<Utc>,
    },
    /// A matched rule asked for a side effect the engine does not perform
    ActionRequested {
        event_id: Uuid,
        lead_id: LeadId,
        rule_id: RuleId,
        assigned_to: AgentId,
        action: RuleAction,
        at: DateTime<Utc>,
    },
    AssignmentFailed {
        event_id: Uuid,
        lead_id: LeadId,
        error: String,
        at: DateTime<Utc>,
    },
}

impl AssignmentEvent {
    pub fn lead_id(&self) -> &LeadId {
        match self {
            AssignmentEvent::LeadAssigned { lead_id, .. }
            | AssignmentEvent::LeadReassigned { lead_id, .. }
            | AssignmentEvent::ActionRequested { lead_id, .. }
            | AssignmentEvent::AssignmentFailed { lead_id, .. } => lead_id,
        }
    }
}

/// Broadcast hub for [`AssignmentEvent`]s
///
/// Publishing with no subscribers is fine; slow subscribers lag and drop the
/// oldest events rather than blocking assignment.
#[derive(Debug)]
pub struct AssignmentEvents {
    sender: broadcast::Sender<AssignmentEvent>,
    published: AtomicU64,
}

impl AssignmentEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AssignmentEvent> {
        debug!("📡 New assignment event subscription");
        self.sender.subscribe()
    }

    pub fn publish(&self, event: AssignmentEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        let delivered = self.sender.send(event).unwrap_or(0);
        debug!("📡 Assignment event delivered to {} subscriber(s)", delivered);
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AssignmentEvents {
    fn default() -> Self {
        Self::new(1024)
    }
}
