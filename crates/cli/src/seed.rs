//! JSON fixture loader for demos and fresh installs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

use leadflow_assignment_engine::calendar::{Holiday, WorkingHoursConfig};
use leadflow_assignment_engine::model::{Agent, Lead};
use leadflow_assignment_engine::routing::AssignmentRule;
use leadflow_assignment_engine::store::{RuleStore, SqliteStore};

/// Everything the engine reads, in one document
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SeedData {
    pub calendars: Vec<WorkingHoursConfig>,
    pub holidays: Vec<Holiday>,
    pub agents: Vec<Agent>,
    pub rules: Vec<AssignmentRule>,
    pub leads: Vec<Lead>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedCounts {
    calendars: usize,
    holidays: usize,
    agents: usize,
    rules: usize,
    leads: usize,
}

impl fmt::Display for SeedCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} calendar(s), {} holiday(s), {} agent(s), {} rule(s), {} lead(s)",
            self.calendars, self.holidays, self.agents, self.rules, self.leads
        )
    }
}

impl SeedData {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid seed file {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Upsert everything; rules are validated before they are written
    pub async fn apply(&self, store: &SqliteStore) -> Result<SeedCounts> {
        for calendar in &self.calendars {
            store.insert_calendar(calendar).await?;
        }
        for holiday in &self.holidays {
            store.add_holiday(holiday).await?;
        }
        for agent in &self.agents {
            store.upsert_agent(agent).await?;
        }
        for rule in &self.rules {
            store
                .save_rule(rule)
                .await
                .with_context(|| format!("rule '{}' ({}) is invalid", rule.name, rule.id))?;
        }
        for lead in &self.leads {
            store.insert_lead(lead).await?;
        }

        Ok(SeedCounts {
            calendars: self.calendars.len(),
            holidays: self.holidays.len(),
            agents: self.agents.len(),
            rules: self.rules.len(),
            leads: self.leads.len(),
        })
    }
}
