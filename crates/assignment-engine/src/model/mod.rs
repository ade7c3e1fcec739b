//! Entity types shared by every component

pub mod agent;
pub mod ids;
pub mod lead;

pub use agent::{Agent, AgentRole, AgentSnapshot};
pub use ids::{AgentId, LeadId, RuleId};
pub use lead::{Assignment, AssignmentReason, Lead, LeadStatus};
