//! Fixed pipeline stage graph rendered by the dashboard.
//!
//! The set of stages and edges is declared once here. Runtime code only
//! toggles statuses and edge flags; it never adds or removes nodes.

use serde::{Deserialize, Serialize};

use crate::errors::IngestError;

/// Declared stages, in display order: `(id, display name)`.
pub const STAGE_DEFINITIONS: &[(&str, &str)] = &[
    ("document_upload", "Document Upload"),
    ("text_chunking", "Text Chunking"),
    ("query_input", "Query Input"),
    ("embedding", "Embedding Generation"),
    ("vector_search", "Vector Search"),
    ("context_retrieval", "Context Retrieval"),
    ("llm_inference", "LLM Inference"),
    ("response_delivery", "Response Delivery"),
];

/// Declared directed edges: `(from, to)`.
pub const EDGE_DEFINITIONS: &[(&str, &str)] = &[
    ("document_upload", "text_chunking"),
    ("text_chunking", "embedding"),
    ("query_input", "embedding"),
    ("embedding", "vector_search"),
    ("vector_search", "context_retrieval"),
    ("context_retrieval", "llm_inference"),
    ("llm_inference", "response_delivery"),
];

/// Whether `id` names a declared stage.
pub fn is_declared_stage(id: &str) -> bool {
    STAGE_DEFINITIONS.iter().any(|(sid, _)| *sid == id)
}

/// Processing state of one stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Nothing in flight.
    #[default]
    Idle,
    /// Work in progress.
    Active,
    /// Last unit of work finished.
    Completed,
    /// Last unit of work failed.
    Error,
}

/// Per-stage counters shown next to each node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMetrics {
    /// Duration of the most recent unit of work, milliseconds.
    pub processing_time_ms: f64,
    /// Units processed since start.
    pub items_processed: u64,
    /// Failures since start.
    pub error_count: u64,
}

/// One node of the graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Stable id, one of [`STAGE_DEFINITIONS`].
    pub id: String,
    /// Display name.
    pub name: String,
    /// Current status.
    pub status: StageStatus,
    /// Counters.
    pub metrics: StageMetrics,
}

/// One directed edge of the graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEdge {
    /// Source stage id.
    pub from: String,
    /// Target stage id.
    pub to: String,
    /// Whether data is currently flowing along this edge.
    pub active: bool,
}

/// Stages plus edges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageGraph {
    /// Nodes in display order.
    pub stages: Vec<Stage>,
    /// Directed edges.
    pub edges: Vec<StageEdge>,
}

impl StageGraph {
    /// The declared graph with every stage idle and every edge inactive.
    pub fn baseline() -> Self {
        let stages = STAGE_DEFINITIONS
            .iter()
            .map(|(id, name)| Stage {
                id: (*id).to_owned(),
                name: (*name).to_owned(),
                status: StageStatus::Idle,
                metrics: StageMetrics::default(),
            })
            .collect();
        let edges = EDGE_DEFINITIONS
            .iter()
            .map(|(from, to)| StageEdge {
                from: (*from).to_owned(),
                to: (*to).to_owned(),
                active: false,
            })
            .collect();
        Self { stages, edges }
    }

    /// Check that the graph holds exactly the declared stage ids and that
    /// every edge joins two declared stages.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.stages.len() != STAGE_DEFINITIONS.len() {
            return Err(IngestError::InvalidGraph(format!(
                "expected {} stages, got {}",
                STAGE_DEFINITIONS.len(),
                self.stages.len()
            )));
        }
        for (id, _) in STAGE_DEFINITIONS {
            let count = self.stages.iter().filter(|s| s.id == *id).count();
            if count != 1 {
                return Err(IngestError::InvalidGraph(format!(
                    "stage '{id}' appears {count} times"
                )));
            }
        }
        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !is_declared_stage(end) {
                    return Err(IngestError::InvalidGraph(format!(
                        "edge {} -> {} references undeclared stage '{end}'",
                        edge.from, edge.to
                    )));
                }
            }
        }
        Ok(())
    }

    /// Set a stage status. Returns `false` for an unknown id.
    pub fn set_stage_status(&mut self, id: &str, status: StageStatus) -> bool {
        match self.stages.iter_mut().find(|s| s.id == id) {
            Some(stage) => {
                stage.status = status;
                true
            }
            None => false,
        }
    }

    /// Toggle an edge flag. Returns `false` if no such edge exists.
    pub fn set_edge_active(&mut self, from: &str, to: &str, active: bool) -> bool {
        match self.edges.iter_mut().find(|e| e.from == from && e.to == to) {
            Some(edge) => {
                edge.active = active;
                true
            }
            None => false,
        }
    }
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::baseline()
    }
}
