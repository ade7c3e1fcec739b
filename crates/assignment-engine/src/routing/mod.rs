//! # Lead Routing Module
//!
//! Decides who owns a lead. Rules are tried first; when none applies the lead
//! goes to the least-loaded eligible agent.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Lead snapshot                          │
//! │  (attributes, status, territory)                            │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────────────┐
//! │                  Eligibility Policy                         │
//! │  - active, role may own leads                               │
//! │  - territory, capacity, on shift                            │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────────────┐
//! │                     Rule Engine                             │
//! │  - ascending priority, first match wins                     │
//! │  - constraints must leave a candidate                       │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │ match                        │ no match
//! ┌──────────────▼──────────────┐ ┌─────────────▼───────────────┐
//! │ Rule candidates             │ │ Whole eligible pool         │
//! │ reason "rule:<name>"        │ │ reason "round_robin"        │
//! └──────────────┬──────────────┘ └─────────────┬───────────────┘
//!                └──────────────┬───────────────┘
//!                ┌──────────────▼──────────────┐
//!                │      Workload Balancer      │
//!                │ least loaded, RR tie-break  │
//!                └─────────────────────────────┘
//! ```

pub mod balancer;
pub mod eligibility;
pub mod engine;
pub mod rules;

pub use balancer::{pool_key, select_least_loaded, WorkloadBalancer};
pub use eligibility::{AssignOptions, EligibilityPolicy};
pub use engine::{ConditionOutcome, EvaluationContext, RuleEngine, RuleMatch};
pub use rules::{AssignmentRule, Condition, ConditionOperator, RuleAction};
