//! # Lead Assignment Orchestration Module
//!
//! The coordination layer that turns the pure routing, calendar and SLA
//! components into caller-facing operations over injected stores.
//!
//! ## Overview
//!
//! [`AssignmentCoordinator`] owns no data. For every call it loads the lead,
//! the active rules, the agent directory and the calendars it needs, runs the
//! rule engine and the workload balancer, and commits the result through a
//! guarded write. Read-side queries (SLA status, overdue leads, workloads,
//! statistics) are folds of the SLA clock over persisted assignments.
//!
//! ## Module Organization
//!
//! - **[`coordinator`]**: `AssignmentCoordinator` and its builder
//! - **[`gate`]**: per-agent async locks serializing load-read and write
//! - **[`clock`]**: injectable time source
//! - **[`types`]**: results, filters and sweep reports
//!
//! ## Key Features
//!
//! - **Rule first, balancer second**: a matched rule narrows the pool, the
//!   least-loaded agent in the pool wins, ties rotate per pool
//! - **Mutual exclusion**: a lead is only ever assigned once automatically;
//!   the second caller gets `AlreadyAssigned`
//! - **Best-effort side effects**: audit failures are logged, never returned
//! - **Events**: assignments, reassignments, rule intents and failures are
//!   broadcast to subscribers
//!
//! ## Examples
//!
//! ```rust
//! use leadflow_assignment_engine::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStore::new());
//! store.insert_calendar(WorkingHoursConfig::always_open("default"));
//! store.upsert_agent(Agent::new("rep-a", "Alice", AgentRole::SalesRep));
//! store.insert_lead(Lead::new("lead-1", LeadStatus::New, json!({"source": "web"}).as_object().cloned().unwrap_or_default()));
//!
//! let coordinator = AssignmentCoordinator::builder()
//!     .with_store(store)
//!     .build()?;
//!
//! let result = coordinator.assign_lead(&LeadId::from("lead-1")).await?;
//! println!("✅ {} -> {} ({})", result.lead_id, result.assigned_to, result.assignment_reason);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod coordinator;
pub mod gate;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{AssignmentCoordinator, AssignmentCoordinatorBuilder};
pub use gate::{PoolGate, PoolGuard};
pub use types::{AssignmentResult, OverdueFilter, ReassignmentResult, SweepFailure, SweepReport};
