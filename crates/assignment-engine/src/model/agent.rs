//! Agent (sales user) types

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::AgentId;

/// Role of a user in the sales organisation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Admin,
    Manager,
    SeniorSalesRep,
    SalesRep,
    Viewer,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Admin => "admin",
            AgentRole::Manager => "manager",
            AgentRole::SeniorSalesRep => "senior_sales_rep",
            AgentRole::SalesRep => "sales_rep",
            AgentRole::Viewer => "viewer",
        }
    }

    /// Default ownership policy: everyone but read-only viewers
    pub fn can_own_leads(&self) -> bool {
        !matches!(self, AgentRole::Viewer)
    }

    pub fn default_owner_roles() -> Vec<AgentRole> {
        vec![
            AgentRole::Admin,
            AgentRole::Manager,
            AgentRole::SeniorSalesRep,
            AgentRole::SalesRep,
        ]
    }
}

impl std::str::FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "admin" => Ok(AgentRole::Admin),
            "manager" => Ok(AgentRole::Manager),
            "senior_sales_rep" | "senior" => Ok(AgentRole::SeniorSalesRep),
            "sales_rep" | "rep" => Ok(AgentRole::SalesRep),
            "viewer" => Ok(AgentRole::Viewer),
            _ => Err(format!("Unknown agent role: {}", s)),
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent profile as exposed by the user directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Unique agent identifier
    pub id: AgentId,

    /// Human-readable name
    pub name: String,

    /// Deactivated agents never receive leads
    #[serde(default = "default_active")]
    pub is_active: bool,

    pub role: AgentRole,

    /// Sales territory (optional)
    pub territory: Option<String>,

    /// Working-hours calendar id (optional, falls back to the default calendar)
    pub working_hours: Option<String>,

    /// Upper bound on open leads owned at once (optional)
    pub max_active_leads: Option<u32>,
}

fn default_active() -> bool {
    true
}

impl Agent {
    pub fn new(id: impl Into<AgentId>, name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_active: true,
            role,
            territory: None,
            working_hours: None,
            max_active_leads: None,
        }
    }

    pub fn with_territory(mut self, territory: impl Into<String>) -> Self {
        self.territory = Some(territory.into());
        self
    }

    pub fn with_working_hours(mut self, calendar_id: impl Into<String>) -> Self {
        self.working_hours = Some(calendar_id.into());
        self
    }

    pub fn with_max_active_leads(mut self, max: u32) -> Self {
        self.max_active_leads = Some(max);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Case-insensitive territory comparison
    pub fn serves_territory(&self, territory: &str) -> bool {
        self.territory
            .as_deref()
            .map(|t| t.eq_ignore_ascii_case(territory))
            .unwrap_or(false)
    }
}

/// Directory row: an agent plus its current open-lead count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    pub agent: Agent,
    pub active_lead_count: u32,
}

impl AgentSnapshot {
    pub fn at_capacity(&self) -> bool {
        self.agent
            .max_active_leads
            .map(|max| self.active_lead_count >= max)
            .unwrap_or(false)
    }
}
