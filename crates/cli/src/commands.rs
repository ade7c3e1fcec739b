//! Subcommand handlers

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

use leadflow_assignment_engine::model::{AgentId, LeadId, RuleId};
use leadflow_assignment_engine::orchestrator::OverdueFilter;
use leadflow_assignment_engine::routing::AssignOptions;
use leadflow_assignment_engine::store::SqliteStore;
use leadflow_assignment_engine::{AssignmentCoordinator, EngineConfig};

use crate::output;
use crate::seed::SeedData;
use crate::{Command, RulesCommand};

pub async fn run(command: Command, config: EngineConfig, json: bool) -> Result<()> {
    let store = Arc::new(
        SqliteStore::from_config(&config.database)
            .await
            .with_context(|| format!("failed to open {}", config.database.url))?,
    );

    match command {
        Command::Migrate => {
            // Migrations already ran on connect
            println!("{} schema is up to date at {}", "✓".green(), config.database.url);
            Ok(())
        }
        Command::Seed { file } => seed(&store, &file).await,
        command => {
            let coordinator = AssignmentCoordinator::builder()
                .with_config(config)
                .with_store(store)
                .build()?;
            dispatch(&coordinator, command, json).await
        }
    }
}

async fn seed(store: &SqliteStore, file: &Path) -> Result<()> {
    let data = SeedData::from_file(file)?;
    let counts = data.apply(store).await?;
    println!("{} seeded {}", "✓".green(), counts);
    Ok(())
}

async fn dispatch(coordinator: &AssignmentCoordinator, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Assign {
            lead_id,
            ignore_working_hours,
        } => {
            let options = AssignOptions { ignore_working_hours };
            let result = coordinator.assign_lead_with(&LeadId::from(lead_id), options).await?;
            if json {
                return output::print_json(&result);
            }
            println!(
                "{} lead {} assigned to {} ({})",
                "✓".green(),
                result.lead_id,
                result.assigned_to.as_str().bold(),
                result.assignment_reason
            );
            if let Some(deadline) = result.sla_deadline {
                println!("  SLA deadline: {}", deadline.to_rfc3339());
            }
            for action in &result.actions {
                println!("  requested: {}", action.type_name());
            }
            Ok(())
        }
        Command::Reassign {
            lead_id,
            agent_id,
            reason,
            actor,
        } => {
            let result = coordinator
                .reassign_lead(
                    &LeadId::from(lead_id),
                    &AgentId::from(agent_id),
                    &reason,
                    &AgentId::from(actor),
                )
                .await?;
            if json {
                return output::print_json(&result);
            }
            println!(
                "{} lead {} reassigned from {} to {}",
                "✓".green(),
                result.lead_id,
                result.previous_assignee.as_ref().map_or("nobody", |a| a.as_str()),
                result.assigned_to.as_str().bold()
            );
            Ok(())
        }
        Command::Sla { lead_id } => {
            let lead_id = LeadId::from(lead_id);
            let status = coordinator.check_sla_compliance(&lead_id).await?;
            match (status, json) {
                (status, true) => output::print_json(&status),
                (Some(status), false) => {
                    output::print_sla(std::slice::from_ref(&status));
                    Ok(())
                }
                (None, false) => {
                    println!("lead {} is not assigned", lead_id);
                    Ok(())
                }
            }
        }
        Command::Overdue { agent, min_level } => {
            let filter = OverdueFilter {
                assigned_to: agent.map(AgentId::from),
                min_escalation_level: min_level,
            };
            let overdue = coordinator.get_overdue_leads(&filter).await?;
            if json {
                return output::print_json(&overdue);
            }
            if overdue.is_empty() {
                println!("{} no overdue leads", "✓".green());
            } else {
                output::print_sla(&overdue);
            }
            Ok(())
        }
        Command::Workloads => {
            let workloads = coordinator.get_all_user_workloads().await?;
            if json {
                return output::print_json(&workloads);
            }
            output::print_workloads(&workloads);
            Ok(())
        }
        Command::Stats => {
            let stats = coordinator.get_assignment_statistics().await?;
            if json {
                return output::print_json(&stats);
            }
            output::print_statistics(&stats);
            Ok(())
        }
        Command::Sweep { limit } => {
            let report = coordinator.assign_unassigned_leads(limit).await?;
            if json {
                return output::print_json(&report);
            }
            for result in &report.assigned {
                println!("{} {} -> {} ({})", "✓".green(), result.lead_id, result.assigned_to, result.assignment_reason);
            }
            for failure in &report.failed {
                println!("{} {}: {}", "✗".red(), failure.lead_id, failure.error);
            }
            println!("{} assigned, {} failed", report.assigned.len(), report.failed.len());
            Ok(())
        }
        Command::Rules {
            command: RulesCommand::Test { rule_id, lead_id },
        } => {
            let outcomes = coordinator
                .explain_rule(&LeadId::from(lead_id), &RuleId::from(rule_id))
                .await?;
            if json {
                return output::print_json(&outcomes);
            }
            output::print_outcomes(&outcomes);
            Ok(())
        }
        Command::Migrate | Command::Seed { .. } => Ok(()),
    }
}
