use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ReaperError, ReaperResult};
use crate::event::{ReapEvent, ReapOutcome};
use crate::resource::TrackedResource;

/// Capacity of the reap event stream. Slow subscribers lag rather than
/// stall the reaper.
const EVENT_CAPACITY: usize = 256;

enum Command {
    Track {
        resource: TrackedResource,
        ttl: Duration,
        reply: oneshot::Sender<()>,
    },
    Untrack {
        key: String,
        reply: oneshot::Sender<bool>,
    },
    Tracked {
        reply: oneshot::Sender<usize>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Sent by a timer task when its deadline passes.
struct Expired {
    key: String,
    generation: u64,
}

struct Timer {
    generation: u64,
    resource: TrackedResource,
    handle: JoinHandle<()>,
}

enum Wake {
    Command(Option<Command>),
    Expired(Expired),
}

/// Handle to a named reaper worker.
///
/// Clones share the worker. The worker runs until
/// [`shutdown`](Self::shutdown), even after every handle has been dropped,
/// so resources tracked by an abandoned caller are still reaped.
#[derive(Clone)]
pub struct Reaper {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ReapEvent>,
}

impl Reaper {
    /// Spawn a reaper. Must be called from within a tokio runtime.
    pub fn start(name: impl Into<String>) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        tokio::spawn(run(Arc::clone(&name), tx.clone(), rx, events.clone()));
        info!(reaper = %name, "reaper started");
        Self { name, tx, events }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delete `resource` once `ttl` elapses. Tracking a resource that
    /// already has a timer discards the old deadline.
    pub async fn track(
        &self,
        resource: impl Into<TrackedResource>,
        ttl: Duration,
    ) -> ReaperResult<()> {
        let resource = resource.into();
        self.request(|reply| Command::Track {
            resource,
            ttl,
            reply,
        })
        .await
    }

    /// Cancel the timer for `resource`. Returns whether one was pending.
    pub async fn untrack(&self, resource: &TrackedResource) -> ReaperResult<bool> {
        self.untrack_key(resource.key()).await
    }

    /// Cancel by [`TrackedResource::key`].
    pub async fn untrack_key(&self, key: impl Into<String>) -> ReaperResult<bool> {
        let key = key.into();
        self.request(|reply| Command::Untrack { key, reply }).await
    }

    /// Number of pending timers.
    pub async fn tracked(&self) -> ReaperResult<usize> {
        self.request(|reply| Command::Tracked { reply }).await
    }

    /// Stream of reap outcomes. Only events after the call are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<ReapEvent> {
        self.events.subscribe()
    }

    /// Stop the worker and cancel every pending timer.
    pub async fn shutdown(&self) -> ReaperResult<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> ReaperResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())
    }

    fn stopped(&self) -> ReaperError {
        ReaperError::Stopped {
            name: self.name.to_string(),
        }
    }
}

impl fmt::Debug for Reaper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaper")
            .field("name", &self.name)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

async fn run(
    name: Arc<str>,
    keepalive: mpsc::UnboundedSender<Command>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<ReapEvent>,
) {
    let (expired_tx, mut expired_rx) = mpsc::unbounded_channel::<Expired>();
    let mut timers: HashMap<String, Timer> = HashMap::new();
    let mut next_generation: u64 = 0;
    let mut shutdown_reply = None;

    loop {
        // The worker holds `keepalive` and `expired_tx`, so neither channel
        // yields `None`; only `Shutdown` ends the loop.
        let wake = tokio::select! {
            cmd = rx.recv() => Wake::Command(cmd),
            Some(expired) = expired_rx.recv() => Wake::Expired(expired),
        };

        match wake {
            Wake::Command(None) => break,
            Wake::Command(Some(Command::Shutdown { reply })) => {
                shutdown_reply = Some(reply);
                break;
            }
            Wake::Command(Some(Command::Track {
                resource,
                ttl,
                reply,
            })) => {
                next_generation += 1;
                let generation = next_generation;
                let key = resource.key();
                let handle = {
                    let tx = expired_tx.clone();
                    let key = key.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(ttl).await;
                        let _ = tx.send(Expired { key, generation });
                    })
                };
                debug!(reaper = %name, key = %key, ttl_ms = ttl.as_millis() as u64, "tracking");
                let timer = Timer {
                    generation,
                    resource,
                    handle,
                };
                if let Some(old) = timers.insert(key, timer) {
                    old.handle.abort();
                }
                let _ = reply.send(());
            }
            Wake::Command(Some(Command::Untrack { key, reply })) => {
                let existed = match timers.remove(&key) {
                    Some(timer) => {
                        timer.handle.abort();
                        true
                    }
                    None => false,
                };
                debug!(reaper = %name, key = %key, existed, "untracked");
                let _ = reply.send(existed);
            }
            Wake::Command(Some(Command::Tracked { reply })) => {
                let _ = reply.send(timers.len());
            }
            Wake::Expired(Expired { key, generation }) => {
                // A replaced or cancelled timer may have fired before it was
                // aborted; only the current generation counts.
                if timers.get(&key).map(|t| t.generation) != Some(generation) {
                    continue;
                }
                if let Some(timer) = timers.remove(&key) {
                    tokio::spawn(reap(Arc::clone(&name), key, timer.resource, events.clone()));
                }
            }
        }
    }

    rx.close();
    drop(keepalive);
    for (_, timer) in timers.drain() {
        timer.handle.abort();
    }
    info!(reaper = %name, "reaper stopped");
    if let Some(reply) = shutdown_reply {
        let _ = reply.send(());
    }
}

/// Runs outside the worker so a slow or panicking delete cannot take the
/// reaper down with it.
async fn reap(
    reaper: Arc<str>,
    key: String,
    resource: TrackedResource,
    events: broadcast::Sender<ReapEvent>,
) {
    let tag = resource.tag();
    let outcome = resource.reap().await;
    match &outcome {
        ReapOutcome::Reaped => info!(reaper = %reaper, key = %key, tag = %tag, "reaped"),
        ReapOutcome::AlreadyGone => {
            debug!(reaper = %reaper, key = %key, tag = %tag, "already gone")
        }
        ReapOutcome::Skipped => debug!(reaper = %reaper, key = %key, tag = %tag, "nothing to reap"),
        ReapOutcome::Failed(error) => {
            warn!(reaper = %reaper, key = %key, tag = %tag, error = %error, "reap failed")
        }
    }
    // No subscribers is fine.
    let _ = events.send(ReapEvent {
        reaper: reaper.to_string(),
        key,
        tag,
        outcome,
    });
}
