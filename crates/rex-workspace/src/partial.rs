//! Streaming partial-output collection.
//!
//! Sub-explorations stream text while they run. A [`PartialCollector`]
//! keeps the newest `max_chars_per_chunk` characters per chunk and flushes
//! the whole table into a [`Workspace`] under [`PARTIALS_KEY`] every
//! `flush_interval`, so a parent can watch children before they finish.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{WorkspaceError, WorkspaceResult};
use crate::workspace::Workspace;

/// Key under which partial output is flushed.
pub const PARTIALS_KEY: &str = "partials";

/// What a streamed fragment carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialKind {
    Content,
    Thinking,
    Done,
}

/// One streamed fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialEvent {
    pub chunk_id: String,
    pub kind: PartialKind,
    pub text: String,
    /// Milliseconds since the collector started; `None` is stamped on
    /// arrival.
    pub at_ms: Option<u64>,
}

impl PartialEvent {
    pub fn content(chunk_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            kind: PartialKind::Content,
            text: text.into(),
            at_ms: None,
        }
    }

    pub fn thinking(chunk_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: PartialKind::Thinking,
            ..Self::content(chunk_id, text)
        }
    }

    pub fn done(chunk_id: impl Into<String>) -> Self {
        Self {
            kind: PartialKind::Done,
            ..Self::content(chunk_id, "")
        }
    }

    pub fn at(mut self, at_ms: u64) -> Self {
        self.at_ms = Some(at_ms);
        self
    }
}

/// Accumulated state for one chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPartial {
    pub text: String,
    pub kind: Option<PartialKind>,
    pub updated_at_ms: u64,
    pub done: bool,
}

/// Shortest flush period a collector will run with.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// Collector tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectorConfig {
    pub max_chars_per_chunk: usize,
    pub flush_interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_chars_per_chunk: 4000,
            flush_interval: Duration::from_millis(250),
        }
    }
}

enum CollectorCommand {
    Emit(PartialEvent),
    Snapshot {
        reply: oneshot::Sender<BTreeMap<String, ChunkPartial>>,
    },
    Stop {
        reply: oneshot::Sender<WorkspaceResult<BTreeMap<String, ChunkPartial>>>,
    },
}

/// Handle to a running collector.
///
/// [`emit`](Self::emit) never waits: it pushes onto an unbounded queue, so a
/// fast stream of tiny fragments cannot stall the producer.
#[derive(Clone, Debug)]
pub struct PartialCollector {
    tx: mpsc::UnboundedSender<CollectorCommand>,
}

impl PartialCollector {
    /// Start collecting into `workspace`, keeping at most
    /// `max_chars_per_chunk` characters per chunk.
    pub fn start(workspace: Workspace, max_chars_per_chunk: usize) -> Self {
        Self::start_with_config(
            workspace,
            CollectorConfig {
                max_chars_per_chunk,
                ..CollectorConfig::default()
            },
        )
    }

    /// A `flush_interval` below [`MIN_FLUSH_INTERVAL`] is raised to it.
    pub fn start_with_config(workspace: Workspace, mut config: CollectorConfig) -> Self {
        config.flush_interval = config.flush_interval.max(MIN_FLUSH_INTERVAL);
        let (tx, rx) = mpsc::unbounded_channel();
        info!(
            workspace = %workspace.id(),
            max_chars = config.max_chars_per_chunk,
            "partial collector started"
        );
        tokio::spawn(run(workspace, config, rx));
        Self { tx }
    }

    /// Queue a fragment.
    pub fn emit(&self, event: PartialEvent) -> WorkspaceResult<()> {
        self.tx
            .send(CollectorCommand::Emit(event))
            .map_err(|_| WorkspaceError::CollectorStopped)
    }

    /// Current per-chunk state, after every fragment emitted so far.
    pub async fn snapshot(&self) -> WorkspaceResult<BTreeMap<String, ChunkPartial>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CollectorCommand::Snapshot { reply })
            .map_err(|_| WorkspaceError::CollectorStopped)?;
        rx.await.map_err(|_| WorkspaceError::CollectorStopped)
    }

    /// Flush the final state into the workspace and stop the collector.
    /// Returns what was flushed.
    pub async fn stop(&self) -> WorkspaceResult<BTreeMap<String, ChunkPartial>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CollectorCommand::Stop { reply })
            .map_err(|_| WorkspaceError::CollectorStopped)?;
        rx.await.map_err(|_| WorkspaceError::CollectorStopped)?
    }
}

struct CollectorState {
    chunks: BTreeMap<String, ChunkPartial>,
    max_chars: usize,
    started: Instant,
    dirty: bool,
}

impl CollectorState {
    fn apply(&mut self, event: PartialEvent) {
        let at_ms = event
            .at_ms
            .unwrap_or_else(|| self.started.elapsed().as_millis() as u64);
        let chunk = self.chunks.entry(event.chunk_id).or_default();
        match event.kind {
            PartialKind::Done => chunk.done = true,
            PartialKind::Content | PartialKind::Thinking => {
                chunk.text.push_str(&event.text);
                keep_tail(&mut chunk.text, self.max_chars);
            }
        }
        chunk.kind = Some(event.kind);
        chunk.updated_at_ms = at_ms;
        self.dirty = true;
    }

    async fn flush(&mut self, workspace: &Workspace) -> WorkspaceResult<()> {
        let value = serde_json::to_value(&self.chunks)
            .map_err(|e| WorkspaceError::Serialization(e.to_string()))?;
        workspace.put(PARTIALS_KEY, value).await?;
        self.dirty = false;
        debug!(workspace = %workspace.id(), chunks = self.chunks.len(), "partials flushed");
        Ok(())
    }
}

enum Wake {
    Command(Option<CollectorCommand>),
    Tick,
}

async fn run(
    workspace: Workspace,
    config: CollectorConfig,
    mut rx: mpsc::UnboundedReceiver<CollectorCommand>,
) {
    let mut state = CollectorState {
        chunks: BTreeMap::new(),
        max_chars: config.max_chars_per_chunk,
        started: Instant::now(),
        dirty: false,
    };
    let mut ticker = time::interval(config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let wake = tokio::select! {
            cmd = rx.recv() => Wake::Command(cmd),
            _ = ticker.tick() => Wake::Tick,
        };
        match wake {
            Wake::Command(Some(CollectorCommand::Emit(event))) => state.apply(event),
            Wake::Command(Some(CollectorCommand::Snapshot { reply })) => {
                let _ = reply.send(state.chunks.clone());
            }
            Wake::Command(Some(CollectorCommand::Stop { reply })) => {
                rx.close();
                let result = state.flush(&workspace).await.map(|()| state.chunks.clone());
                let _ = reply.send(result);
                break;
            }
            Wake::Command(None) => {
                // Every handle dropped without stop: flush what we have.
                if state.dirty {
                    if let Err(e) = state.flush(&workspace).await {
                        warn!(error = %e, "final partial flush failed");
                    }
                }
                break;
            }
            Wake::Tick => {
                if state.dirty {
                    if let Err(e) = state.flush(&workspace).await {
                        warn!(error = %e, "periodic partial flush failed");
                        // Retry once more output arrives.
                        state.dirty = false;
                    }
                }
            }
        }
    }

    info!(workspace = %workspace.id(), chunks = state.chunks.len(), "partial collector stopped");
}

/// Drop leading characters until at most `max_chars` remain.
fn keep_tail(buf: &mut String, max_chars: usize) {
    let count = buf.chars().count();
    if count <= max_chars {
        return;
    }
    let cut = buf
        .char_indices()
        .nth(count - max_chars)
        .map(|(i, _)| i)
        .unwrap_or(buf.len());
    buf.drain(..cut);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use proptest::prelude::*;
    use rex_types::OwnerId;

    fn workspace() -> Workspace {
        Workspace::init(OwnerId::from("req-partials"))
    }

    #[test]
    fn keep_tail_preserves_newest() {
        let mut s = String::from("abcdef");
        keep_tail(&mut s, 4);
        assert_eq!(s, "cdef");
    }

    #[test]
    fn keep_tail_counts_characters_not_bytes() {
        let mut s = String::from("ééééé");
        keep_tail(&mut s, 2);
        assert_eq!(s, "éé");
    }

    #[test]
    fn keep_tail_zero_empties() {
        let mut s = String::from("abc");
        keep_tail(&mut s, 0);
        assert_eq!(s, "");
    }

    #[tokio::test]
    async fn emits_accumulate_and_truncate() {
        let collector = PartialCollector::start(workspace(), 5);
        collector.emit(PartialEvent::content("c1", "hello ")).unwrap();
        collector.emit(PartialEvent::content("c1", "world")).unwrap();
        let snap = collector.snapshot().await.unwrap();
        assert_eq!(snap["c1"].text, "world");
        assert_eq!(snap["c1"].kind, Some(PartialKind::Content));
        assert!(!snap["c1"].done);
    }

    #[tokio::test]
    async fn done_keeps_text() {
        let collector = PartialCollector::start(workspace(), 100);
        collector.emit(PartialEvent::thinking("c1", "pondering").at(5)).unwrap();
        collector.emit(PartialEvent::done("c1").at(9)).unwrap();
        let snap = collector.snapshot().await.unwrap();
        assert_eq!(snap["c1"].text, "pondering");
        assert!(snap["c1"].done);
        assert_eq!(snap["c1"].kind, Some(PartialKind::Done));
        assert_eq!(snap["c1"].updated_at_ms, 9);
    }

    #[tokio::test]
    async fn stop_flushes_into_workspace() {
        let ws = workspace();
        let collector = PartialCollector::start(ws.clone(), 100);
        collector.emit(PartialEvent::content("a", "one")).unwrap();
        collector.emit(PartialEvent::content("b", "two")).unwrap();
        let flushed = collector.stop().await.unwrap();
        assert_eq!(flushed.len(), 2);

        let stored = ws.fetch(PARTIALS_KEY).await.unwrap().expect("flushed");
        let Entry::Json(value) = stored else {
            panic!("partials should be json");
        };
        assert_eq!(value["a"]["text"], "one");
        assert_eq!(value["b"]["text"], "two");

        assert_eq!(
            collector.emit(PartialEvent::content("a", "late")),
            Err(WorkspaceError::CollectorStopped)
        );
    }

    #[tokio::test]
    async fn periodic_flush_makes_progress_visible() {
        let ws = workspace();
        let collector = PartialCollector::start_with_config(
            ws.clone(),
            CollectorConfig {
                max_chars_per_chunk: 100,
                flush_interval: Duration::from_millis(10),
            },
        );
        collector.emit(PartialEvent::content("c1", "early")).unwrap();
        collector.snapshot().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let stored = ws.fetch(PARTIALS_KEY).await.unwrap().expect("flushed");
        assert_eq!(stored.as_json().unwrap()["c1"]["text"], "early");
        collector.stop().await.unwrap();
    }

    #[tokio::test]
    async fn zero_flush_interval_is_clamped() {
        let ws = workspace();
        let collector = PartialCollector::start_with_config(
            ws.clone(),
            CollectorConfig {
                max_chars_per_chunk: 100,
                flush_interval: Duration::ZERO,
            },
        );
        collector.emit(PartialEvent::content("z", "still here")).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        collector.emit(PartialEvent::done("z")).unwrap();
        let flushed = collector.stop().await.unwrap();
        assert!(flushed["z"].done);
        let stored = ws.fetch(PARTIALS_KEY).await.unwrap().expect("flushed");
        assert_eq!(stored.as_json().unwrap()["z"]["text"], "still here");
    }

    #[tokio::test]
    async fn high_rate_single_chunk() {
        let collector = PartialCollector::start(workspace(), 64);
        for i in 0..10_000 {
            collector
                .emit(PartialEvent::content("hot", (i % 10).to_string()))
                .unwrap();
        }
        let snap = collector.snapshot().await.unwrap();
        let text = &snap["hot"].text;
        assert_eq!(text.chars().count(), 64);
        // Newest fragment survives at the tail.
        assert!(text.ends_with('9'));
    }

    #[tokio::test]
    async fn stop_on_destroyed_workspace_reports_error() {
        let ws = workspace();
        let collector = PartialCollector::start(ws.clone(), 10);
        collector.emit(PartialEvent::content("c", "x")).unwrap();
        ws.destroy().await.unwrap();
        assert!(matches!(
            collector.stop().await,
            Err(WorkspaceError::Destroyed { .. })
        ));
    }

    proptest! {
        #[test]
        fn keep_tail_is_suffix_and_bounded(s in ".{0,80}", max in 0usize..40) {
            let mut buf = s.clone();
            keep_tail(&mut buf, max);
            prop_assert!(buf.chars().count() <= max);
            prop_assert!(s.ends_with(&buf));
        }
    }
}
