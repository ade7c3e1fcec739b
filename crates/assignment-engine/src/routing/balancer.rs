//! # Workload Balancer
//!
//! Least-loaded agent selection with a deterministic round-robin tie-break.
//!
//! The tie-break cursor is keyed by the sorted agent-id list of the pool, so two
//! calls with the same pool share one cursor no matter the order the agents were
//! listed in. The cursor lives behind a [`CursorStore`] so several processes can
//! share it.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::model::AgentId;
use crate::store::CursorStore;

/// Stable signature of an eligible pool
pub fn pool_key(eligible: &[AgentId]) -> String {
    let mut ids: Vec<&str> = eligible.iter().map(|id| id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.join(",")
}

/// Pure selection step: minimum load first, then `cursor` indexes the sorted ties
///
/// Agents missing from `loads` count as carrying no leads. Returns `None` for an
/// empty pool.
pub fn select_least_loaded(eligible: &[AgentId], loads: &HashMap<AgentId, u32>, cursor: u64) -> Option<AgentId> {
    let load_of = |id: &AgentId| loads.get(id).copied().unwrap_or(0);
    let min = eligible.iter().map(load_of).min()?;

    let mut tied: Vec<&AgentId> = eligible.iter().filter(|id| load_of(*id) == min).collect();
    tied.sort();
    tied.dedup();

    let index = (cursor % tied.len() as u64) as usize;
    Some(tied[index].clone())
}

/// Picks the least-loaded agent from an eligible pool
#[derive(Clone)]
pub struct WorkloadBalancer {
    cursors: Arc<dyn CursorStore>,
}

impl WorkloadBalancer {
    pub fn new(cursors: Arc<dyn CursorStore>) -> Self {
        Self { cursors }
    }

    /// Pick an agent and advance the pool's cursor by one
    ///
    /// `Ok(None)` signals an empty pool; the coordinator reports it as
    /// `NoEligibleAgent`.
    pub async fn pick(&self, eligible: &[AgentId], loads: &HashMap<AgentId, u32>) -> Result<Option<AgentId>> {
        if eligible.is_empty() {
            return Ok(None);
        }

        let key = pool_key(eligible);
        let cursor = self.cursors.next_cursor(&key).await?;
        let picked = select_least_loaded(eligible, loads, cursor);

        if let Some(agent) = &picked {
            debug!(
                "⚖️ Balancer picked {} (load {}) from pool [{}] at cursor {}",
                agent,
                loads.get(agent).copied().unwrap_or(0),
                key,
                cursor
            );
        }
        Ok(picked)
    }
}

impl std::fmt::Debug for WorkloadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadBalancer").finish_non_exhaustive()
    }
}
