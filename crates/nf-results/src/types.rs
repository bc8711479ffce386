//! Result data types.

use serde::{Deserialize, Serialize};

pub type RunId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub timestamp: String,
    pub equation: String,
    pub method: String,
    pub iterations: usize,
    /// Full training configuration as it was used.
    pub config: serde_json::Value,
    #[serde(default)]
    pub final_loss: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Minibatch,
    FullBatch,
}

/// One evaluation checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub iteration: usize,
    pub phase: Phase,
    /// Full-trajectory MAE at this checkpoint
    pub total_loss: f64,
    /// Running average of the minibatch loss
    pub loss_avg: f64,
    /// Running average of the iteration wall time
    pub time_avg_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}
