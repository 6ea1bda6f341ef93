//! The exploration document kept by a [`WorkspaceStore`](crate::WorkspaceStore).
//!
//! Every field is optional: a missing field means nothing has been recorded
//! yet. Unrecognized top-level fields are carried through untouched so
//! collaborators can stash their own state alongside ours.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a context was split into chunks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpec {
    /// Chunking strategy, e.g. `lines`, `chars`, `regex`.
    pub strategy: String,
    /// Strategy parameter (lines per chunk, characters per chunk, ...).
    pub size: usize,
}

/// One named way of chunking the context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkProjection {
    /// Number of chunks produced.
    pub count: usize,
    pub spec: ChunkSpec,
}

/// A typed note recorded during exploration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Note type, e.g. `hypothesis` or `finding`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

impl Note {
    pub fn new(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
        }
    }
}

/// Outcome of a subquery or a spawned child.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    #[serde(alias = "ok", alias = "success", alias = "done")]
    Completed,
    #[serde(alias = "error")]
    Failed,
    #[serde(alias = "running")]
    Pending,
    #[serde(other)]
    Unknown,
}

impl ResultStatus {
    pub fn is_success(self) -> bool {
        matches!(self, ResultStatus::Completed)
    }
}

/// Result of a subquery or spawned child exploration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: String,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub output: Value,
}

impl TaskResult {
    pub fn new(id: impl Into<String>, status: ResultStatus) -> Self {
        Self {
            id: id.into(),
            status,
            output: Value::Null,
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }
}

/// Structured progress record for one exploration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationDocument {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub chunk_projections: BTreeMap<String, ChunkProjection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_projection: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hits: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subquery_results: Vec<TaskResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub spawn_results: Vec<TaskResult>,
    /// Top-level fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExplorationDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode from JSON; `null` is the empty document.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Returns `true` when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.chunk_projections.is_empty()
            && self.active_projection.is_none()
            && self.hits.is_empty()
            && self.notes.is_empty()
            && self.subquery_results.is_empty()
            && self.spawn_results.is_empty()
            && self.extra.is_empty()
    }

    /// The projection the summary reports as indexed: the selected one if
    /// it exists, otherwise the only one.
    pub fn active(&self) -> Option<(&str, &ChunkProjection)> {
        if let Some(id) = &self.active_projection {
            if let Some(p) = self.chunk_projections.get(id) {
                return Some((id.as_str(), p));
            }
        }
        if self.chunk_projections.len() == 1 {
            return self
                .chunk_projections
                .iter()
                .next()
                .map(|(id, p)| (id.as_str(), p));
        }
        None
    }

    /// Bounded, deterministic progress briefing.
    ///
    /// One line per populated section (chunks, hits, notes, subquery
    /// results, spawn results), joined with newlines and cut to `max_chars`
    /// bytes with `...` appended when anything was dropped.
    pub fn summary(&self, max_chars: usize) -> String {
        let mut lines: Vec<String> = Vec::new();

        if let Some((_, p)) = self.active() {
            lines.push(format!(
                "Chunks: {} indexed ({}, size {})",
                p.count, p.spec.strategy, p.spec.size
            ));
        } else if !self.chunk_projections.is_empty() {
            lines.push(format!(
                "Chunks: {} projections available",
                self.chunk_projections.len()
            ));
        }

        if !self.hits.is_empty() {
            lines.push(format!("Hits: {} found", self.hits.len()));
        }

        if !self.notes.is_empty() {
            let mut groups: Vec<(&str, usize)> = Vec::new();
            for note in &self.notes {
                match groups.iter_mut().find(|(kind, _)| *kind == note.kind.as_str()) {
                    Some((_, n)) => *n += 1,
                    None => groups.push((note.kind.as_str(), 1)),
                }
            }
            let breakdown: Vec<String> = groups
                .iter()
                .map(|(kind, n)| format!("{n} {kind}"))
                .collect();
            lines.push(format!(
                "Notes: {} ({})",
                self.notes.len(),
                breakdown.join(", ")
            ));
        }

        if !self.subquery_results.is_empty() {
            let completed = count_completed(&self.subquery_results);
            lines.push(format!("Subquery results: {completed} completed"));
        }

        if !self.spawn_results.is_empty() {
            let completed = count_completed(&self.spawn_results);
            lines.push(format!("Spawn results: {completed} completed"));
        }

        truncate_with_ellipsis(lines.join("\n"), max_chars)
    }
}

fn count_completed(results: &[TaskResult]) -> usize {
    results.iter().filter(|r| r.status.is_success()).count()
}

/// Cut `text` to at most `max_bytes` bytes (on a char boundary) and append
/// `...` if anything was removed.
pub fn truncate_with_ellipsis(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str("...");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample() -> ExplorationDocument {
        let mut doc = ExplorationDocument::new();
        doc.hits = vec![json!({"line": 1}), json!({"line": 7}), json!({"line": 9})];
        doc.notes = vec![
            Note::new("hypothesis", "the bug is in the parser"),
            Note::new("finding", "parser drops trailing commas"),
        ];
        doc.subquery_results = (0..5)
            .map(|i| {
                let status = if i == 4 {
                    ResultStatus::Failed
                } else {
                    ResultStatus::Completed
                };
                TaskResult::new(format!("q{i}"), status)
            })
            .collect();
        doc
    }

    #[test]
    fn empty_document_summarizes_to_empty_string() {
        assert_eq!(ExplorationDocument::new().summary(1000), "");
    }

    #[test]
    fn summary_lists_populated_sections_in_order() {
        let summary = sample().summary(1000);
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Hits: 3 found",
                "Notes: 2 (1 hypothesis, 1 finding)",
                "Subquery results: 4 completed",
            ]
        );
    }

    #[test]
    fn notes_are_grouped_in_first_seen_order() {
        let mut doc = ExplorationDocument::new();
        doc.notes = vec![
            Note::new("finding", "a"),
            Note::new("hypothesis", "b"),
            Note::new("finding", "c"),
        ];
        assert_eq!(doc.summary(1000), "Notes: 3 (2 finding, 1 hypothesis)");
    }

    #[test]
    fn single_projection_reports_indexed() {
        let mut doc = ExplorationDocument::new();
        doc.chunk_projections.insert(
            "by-lines".into(),
            ChunkProjection {
                count: 42,
                spec: ChunkSpec {
                    strategy: "lines".into(),
                    size: 200,
                },
            },
        );
        assert_eq!(doc.summary(1000), "Chunks: 42 indexed (lines, size 200)");
    }

    #[test]
    fn multiple_projections_without_selection() {
        let mut doc = ExplorationDocument::new();
        for (id, count) in [("a", 3), ("b", 9)] {
            doc.chunk_projections.insert(
                id.into(),
                ChunkProjection {
                    count,
                    spec: ChunkSpec {
                        strategy: "chars".into(),
                        size: 4000,
                    },
                },
            );
        }
        assert_eq!(doc.summary(1000), "Chunks: 2 projections available");

        doc.active_projection = Some("b".into());
        assert_eq!(doc.summary(1000), "Chunks: 9 indexed (chars, size 4000)");
        assert_eq!(doc.active().map(|(id, _)| id), Some("b"));
    }

    #[test]
    fn spawn_results_count_only_completed() {
        let mut doc = ExplorationDocument::new();
        doc.spawn_results = vec![
            TaskResult::new("c1", ResultStatus::Completed),
            TaskResult::new("c2", ResultStatus::Pending),
        ];
        assert_eq!(doc.summary(1000), "Spawn results: 1 completed");
    }

    #[test]
    fn small_budget_truncates_with_ellipsis() {
        let summary = sample().summary(10);
        assert!(summary.ends_with("..."));
        assert_eq!(summary, "Hits: 3 fo...");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = truncate_with_ellipsis("héllo".to_string(), 2);
        assert_eq!(s, "h...");
    }

    #[test]
    fn decodes_loose_json() {
        let doc = ExplorationDocument::from_value(json!({
            "hits": [1, 2],
            "notes": [{"type": "finding", "text": "x"}],
            "subquery_results": [
                {"id": "a", "status": "ok"},
                {"id": "b", "status": "error"},
                {"id": "c", "status": "weird"}
            ],
            "scratch": {"custom": true}
        }))
        .unwrap();
        assert_eq!(doc.hits.len(), 2);
        assert_eq!(doc.subquery_results[0].status, ResultStatus::Completed);
        assert_eq!(doc.subquery_results[1].status, ResultStatus::Failed);
        assert_eq!(doc.subquery_results[2].status, ResultStatus::Unknown);
        assert_eq!(doc.extra["scratch"], json!({"custom": true}));
    }

    #[test]
    fn null_and_empty_object_are_empty_documents() {
        assert!(ExplorationDocument::from_value(Value::Null).unwrap().is_empty());
        assert!(ExplorationDocument::from_value(json!({})).unwrap().is_empty());
    }

    #[test]
    fn empty_document_serializes_to_empty_object() {
        assert_eq!(ExplorationDocument::new().to_value().unwrap(), json!({}));
    }

    proptest! {
        #[test]
        fn truncation_is_bounded(text in ".{0,200}", max in 0usize..64) {
            let out = truncate_with_ellipsis(text.clone(), max);
            if text.len() <= max {
                prop_assert_eq!(out, text);
            } else {
                prop_assert!(out.ends_with("..."));
                prop_assert!(out.len() <= max + 3);
                prop_assert!(text.starts_with(&out[..out.len() - 3]));
            }
        }
    }
}
