use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::calendar::HolidayType;
use crate::error::{AssignmentError, Result};
use crate::logging::LoggingConfig;
use crate::model::{AgentRole, Lead};
use crate::sla::{EscalationPolicy, MAX_SLA_HOURS};

/// Assignment engine configuration
///
/// # Configuration Sections
///
/// - [`assignment`]: eligibility rules for automatic assignment
/// - [`sla`]: response-time policy and escalation thresholds
/// - [`database`]: SQLite store settings
/// - [`logging`]: tracing subscriber settings
///
/// # Examples
///
/// ```
/// use leadflow_assignment_engine::config::EngineConfig;
///
/// let mut config = EngineConfig::default();
/// assert_eq!(config.sla.default_response_hours, 4.0);
///
/// config.sla.priority_hours.insert("urgent".to_string(), 1.0);
/// config.validate().expect("configuration should be valid");
/// ```
///
/// # Loading
///
/// [`EngineConfig::load`] layers an optional TOML file and `LEADFLOW__*`
/// environment variables (e.g. `LEADFLOW__SLA__DEFAULT_RESPONSE_HOURS=8`) over
/// the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub assignment: AssignmentConfig,
    pub sla: SlaConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Automatic assignment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Calendar used for agents and rules without their own
    pub default_calendar_id: String,

    /// Skip agents that are off shift (per-call override available)
    pub respect_working_hours: bool,

    /// Skip agents at their `max_active_leads`
    pub enforce_capacity: bool,

    /// Holiday types that block working time; `None` means all
    pub holiday_types: Option<Vec<HolidayType>>,

    /// Lead attribute holding the requested territory
    pub territory_field: String,

    /// Roles allowed to own leads
    pub owner_roles: Vec<AgentRole>,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            default_calendar_id: "default".to_string(),
            respect_working_hours: true,
            enforce_capacity: true,
            holiday_types: None,
            territory_field: "territory".to_string(),
            owner_roles: AgentRole::default_owner_roles(),
        }
    }
}

/// Response-time policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaConfig {
    /// Working hours allowed for first response
    pub default_response_hours: f64,

    /// Lead attribute holding the priority
    pub priority_field: String,

    /// Per-priority overrides of `default_response_hours`
    pub priority_hours: HashMap<String, f64>,

    /// SLA calendar; falls back to `assignment.default_calendar_id`
    pub calendar_id: Option<String>,

    pub escalation: EscalationPolicy,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            default_response_hours: 4.0,
            priority_field: "priority".to_string(),
            priority_hours: HashMap::new(),
            calendar_id: None,
            escalation: EscalationPolicy::default(),
        }
    }
}

impl SlaConfig {
    /// SLA hours for a lead, from its priority attribute when overridden
    pub fn hours_for(&self, lead: &Lead) -> f64 {
        lead.field(&self.priority_field)
            .and_then(|v| v.as_str().map(str::to_lowercase))
            .and_then(|priority| self.priority_hours.get(&priority).copied())
            .unwrap_or(self.default_response_hours)
    }
}

/// SQLite store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL
    pub url: String,

    pub max_connections: u32,

    /// Seconds to wait on a locked database
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:leadflow.db".to_string(),
            max_connections: 5,
            busy_timeout_secs: 5,
        }
    }
}

impl EngineConfig {
    /// Defaults, then `path` (if given), then `LEADFLOW__*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("LEADFLOW")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// SLA calendar id after applying the fallback
    pub fn sla_calendar_id(&self) -> &str {
        self.sla
            .calendar_id
            .as_deref()
            .unwrap_or(&self.assignment.default_calendar_id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.assignment.default_calendar_id.trim().is_empty() {
            return Err(AssignmentError::configuration("default_calendar_id cannot be empty"));
        }

        if self.assignment.territory_field.trim().is_empty() {
            return Err(AssignmentError::configuration("territory_field cannot be empty"));
        }

        if self.assignment.owner_roles.is_empty() {
            return Err(AssignmentError::configuration("owner_roles cannot be empty"));
        }

        if !valid_sla_hours(self.sla.default_response_hours) {
            return Err(AssignmentError::configuration(format!(
                "default_response_hours must be in (0, {}], got {}",
                MAX_SLA_HOURS, self.sla.default_response_hours
            )));
        }

        for (priority, hours) in &self.sla.priority_hours {
            if !valid_sla_hours(*hours) {
                return Err(AssignmentError::configuration(format!(
                    "SLA hours for priority '{}' must be in (0, {}], got {}",
                    priority, MAX_SLA_HOURS, hours
                )));
            }
        }

        if matches!(self.sla.calendar_id.as_deref(), Some(id) if id.trim().is_empty()) {
            return Err(AssignmentError::configuration("sla.calendar_id cannot be empty"));
        }

        self.sla
            .escalation
            .validate()
            .map_err(AssignmentError::configuration)?;

        if self.database.url.trim().is_empty() {
            return Err(AssignmentError::configuration("database url cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(AssignmentError::configuration("max_connections must be greater than 0"));
        }

        Ok(())
    }
}

fn valid_sla_hours(hours: f64) -> bool {
    hours > 0.0 && hours <= MAX_SLA_HOURS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LeadStatus;
    use serde_json::{json, Map, Value};
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sla_calendar_id(), "default");
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = EngineConfig::default();
        config.sla.default_response_hours = 0.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.sla.priority_hours.insert("urgent".to_string(), -1.0);
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.sla.priority_hours.insert("someday".to_string(), 1e16);
        assert!(matches!(config.validate(), Err(AssignmentError::Configuration(_))));

        let mut config = EngineConfig::default();
        config.sla.default_response_hours = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.sla.priority_hours.insert("quarterly".to_string(), MAX_SLA_HOURS);
        assert!(config.validate().is_ok());

        let mut config = EngineConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.assignment.owner_roles.clear();
        assert!(matches!(config.validate(), Err(AssignmentError::Configuration(_))));
    }

    #[test]
    fn test_priority_hours() {
        let mut sla = SlaConfig::default();
        sla.priority_hours.insert("urgent".to_string(), 1.0);

        let attributes = |v: Value| match v {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let urgent = Lead::new("l1", LeadStatus::New, attributes(json!({ "priority": "Urgent" })));
        let normal = Lead::new("l2", LeadStatus::New, attributes(json!({ "priority": "normal" })));
        let none = Lead::new("l3", LeadStatus::New, Map::new());

        assert_eq!(sla.hours_for(&urgent), 1.0);
        assert_eq!(sla.hours_for(&normal), 4.0);
        assert_eq!(sla.hours_for(&none), 4.0);
    }

    #[test]
    #[serial]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leadflow.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[assignment]
default_calendar_id = "emea"
respect_working_hours = false

[sla]
default_response_hours = 8.0

[sla.priority_hours]
urgent = 2.0

[database]
url = "sqlite::memory:"
"#
        )
        .unwrap();

        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.assignment.default_calendar_id, "emea");
        assert!(!config.assignment.respect_working_hours);
        assert_eq!(config.sla.default_response_hours, 8.0);
        assert_eq!(config.sla.priority_hours.get("urgent"), Some(&2.0));
        assert_eq!(config.sla.escalation, EscalationPolicy::default());
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        unsafe {
            std::env::set_var("LEADFLOW__SLA__DEFAULT_RESPONSE_HOURS", "6");
            std::env::set_var("LEADFLOW__ASSIGNMENT__ENFORCE_CAPACITY", "false");
        }

        let loaded = EngineConfig::load(None);

        unsafe {
            std::env::remove_var("LEADFLOW__SLA__DEFAULT_RESPONSE_HOURS");
            std::env::remove_var("LEADFLOW__ASSIGNMENT__ENFORCE_CAPACITY");
        }

        let config = loaded.unwrap();
        assert_eq!(config.sla.default_response_hours, 6.0);
        assert!(!config.assignment.enforce_capacity);
        assert!(config.assignment.respect_working_hours);
    }
}
