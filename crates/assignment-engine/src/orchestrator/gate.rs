//! Per-agent serialization of the load-read, pick and write sequence

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::AgentId;

/// One async lock per agent, taken in sorted id order
///
/// Two assignments whose candidate pools share any agent run their
/// load-read-then-write steps one after the other; disjoint pools proceed in
/// parallel. Sorted acquisition keeps overlapping pools deadlock free.
#[derive(Debug, Default)]
pub struct PoolGate {
    locks: DashMap<AgentId, Arc<Mutex<()>>>,
}

/// Held locks; released on drop
#[derive(Debug)]
pub struct PoolGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl PoolGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, agents: &[AgentId]) -> PoolGuard {
        let mut ids: Vec<&AgentId> = agents.iter().collect();
        ids.sort();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            let mutex = self.locks.entry(id.clone()).or_default().clone();
            guards.push(mutex.lock_owned().await);
        }
        PoolGuard { _guards: guards }
    }
}
