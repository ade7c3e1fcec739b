//! # SQLite Store (sqlx)
//!
//! Durable implementation of the collaborator traits on a single SQLite
//! database. Several engine processes may share the file: a lead is still
//! assigned at most once, but the load read and the write are separate
//! statements, so least-loaded balancing is only exact within one process.
//!
//! ## Key Features
//!
//! - **WAL mode** with a busy timeout so readers never block the writer
//! - **Embedded migrations** from `migrations/`, applied on connect
//! - **Atomic assignment write**: one conditional `UPDATE ... RETURNING`; the
//!   ownership guard and the terminal-status check live in the `WHERE` clause
//! - **Shared round-robin cursors**: an `INSERT ... ON CONFLICT DO UPDATE`
//!   increment per pool key
//! - **Derived loads**: open-lead counts are aggregated from `leads`, so there
//!   is no counter to drift
//!
//! ## Quick Start
//!
//! ```rust
//! use leadflow_assignment_engine::store::{LeadStore, SqliteStore};
//! use leadflow_assignment_engine::model::{Lead, LeadId, LeadStatus};
//!
//! # async fn example() -> leadflow_assignment_engine::Result<()> {
//! let store = SqliteStore::new_in_memory().await?;
//! store.insert_lead(&Lead::new("lead-1", LeadStatus::New, Default::default())).await?;
//!
//! let lead = store.get_lead(&LeadId::from("lead-1")).await?;
//! assert!(lead.is_some());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::{AgentCriteria, AgentDirectory, CalendarStore, CursorStore, LeadFilter, LeadStore, RuleStore, WriteGuard};
use crate::calendar::{Holiday, HolidayType, WorkingHoursConfig};
use crate::config::DatabaseConfig;
use crate::error::{AssignmentError, Result};
use crate::model::{
    Agent, AgentId, AgentRole, AgentSnapshot, Assignment, AssignmentReason, Lead, LeadId, LeadStatus, RuleId,
};
use crate::routing::{AssignmentRule, Condition, RuleAction};

const OPEN_COUNTS_SQL: &str = "SELECT assigned_to, COUNT(*) AS open_leads FROM leads \
     WHERE assigned_to IS NOT NULL AND status NOT IN ('closed_won', 'closed_lost') \
     GROUP BY assigned_to";

/// sqlx-backed store over one SQLite database
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect with default pool settings and run migrations
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::from_config(&DatabaseConfig {
            url: database_url.to_string(),
            ..Default::default()
        })
        .await
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        info!("🗄️ Opening lead database: {}", config.url);

        let options = SqliteConnectOptions::from_str(&config.url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
            .create_if_missing(true);

        // Every connection to `:memory:` is its own database, so keep exactly one alive
        let in_memory = config.url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("✅ Lead database ready (WAL mode enabled)");
        Ok(Self { pool })
    }

    /// Private in-memory database, for tests and demos
    pub async fn new_in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a lead, assignment included
    pub async fn insert_lead(&self, lead: &Lead) -> Result<()> {
        sqlx::query(
            "INSERT INTO leads (id, status, attributes, assigned_to, assigned_at, assignment_reason, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                attributes = excluded.attributes,
                assigned_to = excluded.assigned_to,
                assigned_at = excluded.assigned_at,
                assignment_reason = excluded.assignment_reason,
                updated_at = excluded.updated_at",
        )
        .bind(lead.id.as_str())
        .bind(lead.status.as_str())
        .bind(Json(&lead.attributes))
        .bind(lead.assignment.assigned_to.as_ref().map(|a| a.as_str()))
        .bind(lead.assignment.assigned_at)
        .bind(reason_text(&lead.assignment))
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_lead_status(&self, id: &LeadId, status: LeadStatus) -> Result<()> {
        let result = sqlx::query("UPDATE leads SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AssignmentError::LeadNotFound(id.clone()));
        }
        Ok(())
    }

    pub async fn upsert_agent(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            "INSERT INTO agents (id, name, is_active, role, territory, working_hours, max_active_leads)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                is_active = excluded.is_active,
                role = excluded.role,
                territory = excluded.territory,
                working_hours = excluded.working_hours,
                max_active_leads = excluded.max_active_leads",
        )
        .bind(agent.id.as_str())
        .bind(&agent.name)
        .bind(agent.is_active)
        .bind(agent.role.as_str())
        .bind(&agent.territory)
        .bind(&agent.working_hours)
        .bind(agent.max_active_leads)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_calendar(&self, config: &WorkingHoursConfig) -> Result<()> {
        sqlx::query(
            "INSERT INTO calendars (id, config) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET config = excluded.config",
        )
        .bind(&config.id)
        .bind(Json(config))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_holiday(&self, holiday: &Holiday) -> Result<()> {
        sqlx::query(
            "INSERT INTO holidays (date, name, holiday_type, is_active, recurring) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(holiday.date)
        .bind(&holiday.name)
        .bind(holiday.holiday_type.as_str())
        .bind(holiday.is_active)
        .bind(holiday.recurring)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn open_counts(&self) -> Result<HashMap<AgentId, u32>> {
        let rows = sqlx::query(OPEN_COUNTS_SQL).fetch_all(&self.pool).await?;
        let mut counts = HashMap::with_capacity(rows.len());
        for row in rows {
            let agent: String = row.try_get("assigned_to")?;
            let open: i64 = row.try_get("open_leads")?;
            counts.insert(AgentId::from(agent), u32::try_from(open).unwrap_or(u32::MAX));
        }
        Ok(counts)
    }

    /// Explain why a guarded write matched no row
    async fn write_conflict(&self, id: &LeadId) -> AssignmentError {
        let row = sqlx::query("SELECT status, assigned_to FROM leads WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await;

        let row = match row {
            Ok(Some(row)) => row,
            Ok(None) => return AssignmentError::LeadNotFound(id.clone()),
            Err(e) => return e.into(),
        };

        let status = match row.try_get::<String, _>("status").map(|s| parse_column::<LeadStatus>(&s, "status")) {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return e,
            Err(e) => return e.into(),
        };
        if status.is_terminal() {
            return AssignmentError::LeadAlreadyClosed {
                lead_id: id.clone(),
                status,
            };
        }

        match row.try_get::<Option<String>, _>("assigned_to") {
            Ok(Some(owner)) => AssignmentError::AlreadyAssigned {
                lead_id: id.clone(),
                assigned_to: AgentId::from(owner),
            },
            Ok(None) => AssignmentError::internal(format!("assignment write for lead {} matched no row", id)),
            Err(e) => e.into(),
        }
    }
}

#[async_trait]
impl LeadStore for SqliteStore {
    async fn get_lead(&self, id: &LeadId) -> Result<Option<Lead>> {
        let row = sqlx::query("SELECT * FROM leads WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(lead_from_row).transpose()
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM leads WHERE 1 = 1");

        if let Some(statuses) = &filter.statuses {
            if statuses.is_empty() {
                return Ok(Vec::new());
            }
            query.push(" AND status IN (");
            let mut separated = query.separated(", ");
            for status in statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }
        if let Some(agent) = &filter.assigned_to {
            query.push(" AND assigned_to = ").push_bind(agent.as_str().to_string());
        }
        match filter.assigned {
            Some(true) => {
                query.push(" AND assigned_to IS NOT NULL");
            }
            Some(false) => {
                query.push(" AND assigned_to IS NULL");
            }
            None => {}
        }
        query.push(" ORDER BY created_at ASC, id ASC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        debug!("Loaded {} lead(s) for {:?}", rows.len(), filter);
        rows.iter().map(lead_from_row).collect()
    }

    async fn write_assignment(&self, id: &LeadId, assignment: &Assignment, guard: WriteGuard) -> Result<Assignment> {
        let row = sqlx::query(
            "UPDATE leads SET
                previous_assigned_to = assigned_to,
                previous_assigned_at = assigned_at,
                previous_assignment_reason = assignment_reason,
                assigned_to = ?,
                assigned_at = ?,
                assignment_reason = ?,
                updated_at = ?
             WHERE id = ?
               AND status NOT IN ('closed_won', 'closed_lost')
               AND (? = 0 OR assigned_to IS NULL)
             RETURNING previous_assigned_to, previous_assigned_at, previous_assignment_reason",
        )
        .bind(assignment.assigned_to.as_ref().map(|a| a.as_str()))
        .bind(assignment.assigned_at)
        .bind(reason_text(assignment))
        .bind(assignment.assigned_at.unwrap_or_else(Utc::now))
        .bind(id.as_str())
        .bind(guard == WriteGuard::Unassigned)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(self.write_conflict(id).await);
        };

        Ok(Assignment {
            assigned_to: row
                .try_get::<Option<String>, _>("previous_assigned_to")?
                .map(AgentId::from),
            assigned_at: row.try_get("previous_assigned_at")?,
            assignment_reason: row
                .try_get::<Option<String>, _>("previous_assignment_reason")?
                .map(AssignmentReason::from),
        })
    }
}

#[async_trait]
impl AgentDirectory for SqliteStore {
    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(agent_from_row).transpose()
    }

    async fn list_agents(&self, criteria: &AgentCriteria) -> Result<Vec<AgentSnapshot>> {
        let sql = format!(
            "SELECT a.*, COALESCE(c.open_leads, 0) AS active_lead_count
             FROM agents a LEFT JOIN ({}) c ON c.assigned_to = a.id
             {}
             ORDER BY a.id ASC",
            OPEN_COUNTS_SQL,
            if criteria.active_only { "WHERE a.is_active = 1" } else { "" }
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in &rows {
            let agent = agent_from_row(row)?;
            if !criteria.matches(&agent) {
                continue;
            }
            let count: i64 = row.try_get("active_lead_count")?;
            snapshots.push(AgentSnapshot {
                agent,
                active_lead_count: u32::try_from(count).unwrap_or(u32::MAX),
            });
        }
        Ok(snapshots)
    }

    async fn active_lead_counts(&self, ids: &[AgentId]) -> Result<HashMap<AgentId, u32>> {
        let counts = self.open_counts().await?;
        Ok(ids
            .iter()
            .map(|id| (id.clone(), counts.get(id).copied().unwrap_or(0)))
            .collect())
    }
}

#[async_trait]
impl RuleStore for SqliteStore {
    async fn list_active_rules_by_priority(&self) -> Result<Vec<AssignmentRule>> {
        let rows = sqlx::query(
            "SELECT * FROM assignment_rules WHERE is_active = 1 ORDER BY priority ASC, created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(rule_from_row).collect()
    }

    async fn get_rule(&self, id: &RuleId) -> Result<Option<AssignmentRule>> {
        let row = sqlx::query("SELECT * FROM assignment_rules WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(rule_from_row).transpose()
    }

    async fn save_rule(&self, rule: &AssignmentRule) -> Result<()> {
        rule.validate()?;
        sqlx::query(
            "INSERT INTO assignment_rules
                (id, name, description, priority, conditions, actions, is_active, working_hours, territories,
                 created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                priority = excluded.priority,
                conditions = excluded.conditions,
                actions = excluded.actions,
                is_active = excluded.is_active,
                working_hours = excluded.working_hours,
                territories = excluded.territories,
                updated_at = excluded.updated_at",
        )
        .bind(rule.id.as_str())
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.priority)
        .bind(Json(&rule.conditions))
        .bind(Json(&rule.actions))
        .bind(rule.is_active)
        .bind(&rule.working_hours)
        .bind(Json(&rule.territories))
        .bind(rule.created_by.as_ref().map(|a| a.as_str()))
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;

        info!("📐 Saved assignment rule '{}' (priority {})", rule.name, rule.priority);
        Ok(())
    }
}

#[async_trait]
impl CalendarStore for SqliteStore {
    async fn get_calendar(&self, id: &str) -> Result<Option<WorkingHoursConfig>> {
        let row = sqlx::query("SELECT config FROM calendars WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let Json(config): Json<WorkingHoursConfig> = row.try_get("config")?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    async fn list_holidays(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Holiday>> {
        let rows = sqlx::query(
            "SELECT * FROM holidays WHERE recurring = 1 OR (date >= ? AND date <= ?) ORDER BY date ASC",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let mut holidays = Vec::with_capacity(rows.len());
        for row in rows {
            let holiday_type: String = row.try_get("holiday_type")?;
            holidays.push(Holiday {
                date: row.try_get("date")?,
                name: row.try_get("name")?,
                holiday_type: parse_column::<HolidayType>(&holiday_type, "holiday_type")?,
                is_active: row.try_get("is_active")?,
                recurring: row.try_get("recurring")?,
            });
        }
        Ok(holidays)
    }
}

#[async_trait]
impl CursorStore for SqliteStore {
    async fn next_cursor(&self, pool_key: &str) -> Result<u64> {
        let position: i64 = sqlx::query_scalar(
            "INSERT INTO round_robin_cursors (pool_key, position) VALUES (?, 1)
             ON CONFLICT(pool_key) DO UPDATE SET position = position + 1
             RETURNING position",
        )
        .bind(pool_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(position - 1).unwrap_or(0))
    }
}

fn reason_text(assignment: &Assignment) -> Option<String> {
    assignment.assignment_reason.clone().map(String::from)
}

fn parse_column<T>(value: &str, column: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e| AssignmentError::database(format!("bad {} column: {}", column, e)))
}

fn lead_from_row(row: &SqliteRow) -> Result<Lead> {
    let status: String = row.try_get("status")?;
    let Json(attributes): Json<Map<String, Value>> = row.try_get("attributes")?;
    Ok(Lead {
        id: LeadId::from(row.try_get::<String, _>("id")?),
        status: parse_column(&status, "status")?,
        attributes,
        assignment: Assignment {
            assigned_to: row.try_get::<Option<String>, _>("assigned_to")?.map(AgentId::from),
            assigned_at: row.try_get::<Option<DateTime<Utc>>, _>("assigned_at")?,
            assignment_reason: row
                .try_get::<Option<String>, _>("assignment_reason")?
                .map(AssignmentReason::from),
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn agent_from_row(row: &SqliteRow) -> Result<Agent> {
    let role: String = row.try_get("role")?;
    Ok(Agent {
        id: AgentId::from(row.try_get::<String, _>("id")?),
        name: row.try_get("name")?,
        is_active: row.try_get("is_active")?,
        role: parse_column::<AgentRole>(&role, "role")?,
        territory: row.try_get("territory")?,
        working_hours: row.try_get("working_hours")?,
        max_active_leads: row.try_get("max_active_leads")?,
    })
}

fn rule_from_row(row: &SqliteRow) -> Result<AssignmentRule> {
    let Json(conditions): Json<Vec<Condition>> = row.try_get("conditions")?;
    let Json(actions): Json<Vec<RuleAction>> = row.try_get("actions")?;
    let Json(territories): Json<Vec<String>> = row.try_get("territories")?;
    Ok(AssignmentRule {
        id: RuleId::from(row.try_get::<String, _>("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        priority: row.try_get("priority")?,
        conditions,
        actions,
        is_active: row.try_get("is_active")?,
        working_hours: row.try_get("working_hours")?,
        territories,
        created_by: row.try_get::<Option<String>, _>("created_by")?.map(AgentId::from),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
