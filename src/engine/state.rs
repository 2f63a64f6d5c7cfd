//! Run state store - data visible across node boundaries.
//!
//! One store is created per run and dropped with it. Keys are write-once:
//! the dispatcher writes the run state before anything is broadcast, and
//! downstream nodes only read.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{OrchestratorError, Result};
use crate::models::RunState;

/// Key under which the dispatcher stores [`RunState`].
pub const RUN_STATE_KEY: &str = "run_state";

/// Write-once key/value store scoped to a single run.
#[derive(Debug, Default)]
pub struct RunStateStore {
    values: RwLock<HashMap<String, serde_json::Value>>,
}

impl RunStateStore {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Store a value under `key`. Fails if the key was already written.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let mut values = self.values.write().await;

        if values.contains_key(key) {
            return Err(OrchestratorError::StateConflict(key.to_string()));
        }

        values.insert(key.to_string(), value);
        Ok(())
    }

    /// Read the value under `key`, if present.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let values = self.values.read().await;
        match values.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    #[allow(dead_code)] // Lookup helper alongside get
    pub async fn contains(&self, key: &str) -> bool {
        self.values.read().await.contains_key(key)
    }

    /// Write the run state. Only the dispatcher calls this.
    pub async fn put_run_state(&self, state: &RunState) -> Result<()> {
        self.put(RUN_STATE_KEY, state).await
    }

    /// Read the run state, failing if the dispatcher has not written it yet.
    pub async fn run_state(&self) -> Result<RunState> {
        self.get(RUN_STATE_KEY)
            .await?
            .ok_or_else(|| OrchestratorError::StateMissing(RUN_STATE_KEY.to_string()))
    }
}
