// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Execution Evidence
//!
//! Inputs handed to the safety-case builder once an execution session has
//! finished: the executed plan, the trace spans recorded while running it, and
//! any formal (theorem) evidence produced alongside.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal (or current) status of a plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    /// Capability the step declared it needed.
    pub capability: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: String,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ExecutionPlan {
    /// Projection fingerprinted into `plan_hash`.
    pub fn fingerprint_projection(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "steps": self.steps,
            "metadata": self.metadata,
        })
    }
}

/// One recorded trace span. `tool_call_id` links it to the plan step it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvidence {
    pub id: String,
    pub tool_call_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

/// Formal evidence attached to a session (e.g. a checked invariant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TheoremEvidence {
    pub theorem_id: String,
    pub statement: String,
    pub proof_hash: String,
    pub verified: bool,
}
