use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use rex_types::OwnerId;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

use crate::entry::Entry;
use crate::error::{WorkspaceError, WorkspaceResult};

type UpdateFn = Box<dyn FnOnce(Entry) -> WorkspaceResult<Entry> + Send>;

/// Messages processed one at a time by the owning worker.
enum Command {
    Put {
        key: String,
        value: Entry,
        reply: oneshot::Sender<()>,
    },
    Fetch {
        key: String,
        reply: oneshot::Sender<Option<Entry>>,
    },
    DeleteKey {
        key: String,
        reply: oneshot::Sender<bool>,
    },
    Update {
        key: String,
        default: Entry,
        apply: UpdateFn,
        reply: oneshot::Sender<WorkspaceResult<Entry>>,
    },
    Keys {
        reply: oneshot::Sender<Vec<String>>,
    },
    Destroy {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a worker-owned key/value table.
///
/// Cloning the handle is cheap and every clone talks to the same worker.
/// The table lives inside the worker task and is dropped when
/// [`destroy`](Self::destroy) is processed; from then on every call on any
/// clone returns [`WorkspaceError::Destroyed`].
#[derive(Clone)]
pub struct Workspace {
    id: Uuid,
    owner: OwnerId,
    tx: mpsc::UnboundedSender<Command>,
}

impl Workspace {
    /// Spawn a new workspace worker owned by `owner`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn init(owner: OwnerId) -> Self {
        let id = Uuid::now_v7();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(id, owner.clone(), rx));
        info!(workspace = %id, owner = %owner, "workspace started");
        Self { id, owner, tx }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Returns `true` once the worker has stopped.
    pub fn is_destroyed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub async fn put(&self, key: impl Into<String>, value: impl Into<Entry>) -> WorkspaceResult<()> {
        let key = key.into();
        let value = value.into();
        self.request(|reply| Command::Put { key, value, reply }).await
    }

    /// Read the value under `key`; `None` when absent.
    pub async fn fetch(&self, key: impl Into<String>) -> WorkspaceResult<Option<Entry>> {
        let key = key.into();
        self.request(|reply| Command::Fetch { key, reply }).await
    }

    /// Remove `key`. Returns whether it was present.
    pub async fn delete_key(&self, key: impl Into<String>) -> WorkspaceResult<bool> {
        let key = key.into();
        self.request(|reply| Command::DeleteKey { key, reply }).await
    }

    /// Atomically replace the value at `key` with `f(current-or-default)`.
    ///
    /// Returns the value that was stored.
    pub async fn update<F>(
        &self,
        key: impl Into<String>,
        default: impl Into<Entry>,
        f: F,
    ) -> WorkspaceResult<Entry>
    where
        F: FnOnce(Entry) -> Entry + Send + 'static,
    {
        self.try_update(key, default, move |entry| Ok(f(entry))).await
    }

    /// Like [`update`](Self::update), but `f` may reject the change. On
    /// error the stored value is left untouched and the error is returned.
    pub async fn try_update<F>(
        &self,
        key: impl Into<String>,
        default: impl Into<Entry>,
        f: F,
    ) -> WorkspaceResult<Entry>
    where
        F: FnOnce(Entry) -> WorkspaceResult<Entry> + Send + 'static,
    {
        let key = key.into();
        let default = default.into();
        let apply: UpdateFn = Box::new(f);
        self.request(|reply| Command::Update {
            key,
            default,
            apply,
            reply,
        })
        .await?
    }

    /// JSON convenience over [`try_update`](Self::try_update).
    pub async fn update_json<F>(
        &self,
        key: impl Into<String>,
        default: Value,
        f: F,
    ) -> WorkspaceResult<Value>
    where
        F: FnOnce(Value) -> Value + Send + 'static,
    {
        let key = key.into();
        let key_for_err = key.clone();
        let entry = self
            .try_update(key, default, move |entry| match entry {
                Entry::Json(v) => Ok(Entry::Json(f(v))),
                other => Err(WorkspaceError::UnexpectedEntry {
                    key: key_for_err,
                    expected: "json",
                    found: other.kind(),
                }),
            })
            .await?;
        Ok(entry.into_json().unwrap_or(Value::Null))
    }

    /// All keys currently stored, sorted.
    pub async fn keys(&self) -> WorkspaceResult<Vec<String>> {
        self.request(|reply| Command::Keys { reply }).await
    }

    /// Number of keys currently stored.
    pub async fn len(&self) -> WorkspaceResult<usize> {
        Ok(self.keys().await?.len())
    }

    pub async fn is_empty(&self) -> WorkspaceResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Stop the worker and free its table.
    ///
    /// The first call succeeds; later calls return
    /// [`WorkspaceError::Destroyed`] like every other operation.
    pub async fn destroy(&self) -> WorkspaceResult<()> {
        self.request(|reply| Command::Destroy { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> WorkspaceResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| self.destroyed())?;
        // A dropped reply sender means the worker stopped with our command
        // still queued.
        rx.await.map_err(|_| self.destroyed())
    }

    fn destroyed(&self) -> WorkspaceError {
        WorkspaceError::Destroyed { id: self.id }
    }
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl PartialEq for Workspace {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Workspace {}

async fn run(id: Uuid, owner: OwnerId, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut table: HashMap<String, Entry> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Put { key, value, reply } => {
                debug!(workspace = %id, key = %key, kind = value.kind(), "put");
                table.insert(key, value);
                let _ = reply.send(());
            }
            Command::Fetch { key, reply } => {
                let _ = reply.send(table.get(&key).cloned());
            }
            Command::DeleteKey { key, reply } => {
                let existed = table.remove(&key).is_some();
                debug!(workspace = %id, key = %key, existed, "delete key");
                let _ = reply.send(existed);
            }
            Command::Update {
                key,
                default,
                apply,
                reply,
            } => {
                let current = table.get(&key).cloned().unwrap_or(default);
                let result = match catch_unwind(AssertUnwindSafe(|| apply(current))) {
                    Ok(Ok(next)) => {
                        table.insert(key, next.clone());
                        Ok(next)
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(WorkspaceError::UpdatePanicked { key }),
                };
                let _ = reply.send(result);
            }
            Command::Keys { reply } => {
                let mut keys: Vec<String> = table.keys().cloned().collect();
                keys.sort();
                let _ = reply.send(keys);
            }
            Command::Destroy { reply } => {
                let _ = reply.send(());
                break;
            }
        }
    }

    // Refuse anything that raced in behind the destroy; queued commands are
    // dropped along with their reply senders.
    rx.close();
    info!(workspace = %id, owner = %owner, keys = table.len(), "workspace destroyed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;
    use std::sync::Arc;

    fn owner() -> OwnerId {
        OwnerId::from("test-owner")
    }

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn put_and_fetch() {
        let ws = Workspace::init(owner());
        ws.put("k", json!({"x": 1})).await.unwrap();
        let got = ws.fetch("k").await.unwrap().expect("should exist");
        assert_eq!(got, Entry::Json(json!({"x": 1})));
    }

    #[tokio::test]
    async fn fetch_missing_is_none() {
        let ws = Workspace::init(owner());
        assert!(ws.fetch("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites() {
        let ws = Workspace::init(owner());
        ws.put("k", json!(1)).await.unwrap();
        ws.put("k", Bytes::from_static(b"bytes")).await.unwrap();
        let got = ws.fetch("k").await.unwrap().unwrap();
        assert_eq!(got.as_blob().unwrap().as_ref(), b"bytes");
    }

    #[tokio::test]
    async fn delete_key_reports_presence() {
        let ws = Workspace::init(owner());
        ws.put("k", json!(true)).await.unwrap();
        assert!(ws.delete_key("k").await.unwrap());
        assert!(!ws.delete_key("k").await.unwrap());
        assert!(ws.fetch("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keys_are_sorted() {
        let ws = Workspace::init(owner());
        for k in ["b", "c", "a"] {
            ws.put(k, json!(null)).await.unwrap();
        }
        assert_eq!(ws.keys().await.unwrap(), vec!["a", "b", "c"]);
        assert_eq!(ws.len().await.unwrap(), 3);
        assert!(!ws.is_empty().await.unwrap());
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn update_uses_default_when_missing() {
        let ws = Workspace::init(owner());
        let v = ws
            .update_json("n", json!(10), |v| json!(v.as_i64().unwrap() + 5))
            .await
            .unwrap();
        assert_eq!(v, json!(15));
    }

    #[tokio::test]
    async fn concurrent_updates_are_not_lost() {
        let ws = Arc::new(Workspace::init(owner()));
        let mut handles = Vec::new();
        for _ in 0..100 {
            let ws = Arc::clone(&ws);
            handles.push(tokio::spawn(async move {
                ws.update_json("counter", json!(0), |v| json!(v.as_i64().unwrap_or(0) + 1))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let got = ws.fetch("counter").await.unwrap().unwrap();
        assert_eq!(got, Entry::Json(json!(100)));
    }

    #[tokio::test]
    async fn rejected_update_leaves_value() {
        let ws = Workspace::init(owner());
        ws.put("k", Bytes::from_static(b"blob")).await.unwrap();
        let err = ws
            .update_json("k", json!(0), |v| v)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::UnexpectedEntry { expected: "json", .. }));
        let got = ws.fetch("k").await.unwrap().unwrap();
        assert_eq!(got.as_blob().unwrap().as_ref(), b"blob");
    }

    #[tokio::test]
    async fn panicking_update_keeps_worker_alive() {
        let ws = Workspace::init(owner());
        ws.put("k", json!(1)).await.unwrap();
        let err = ws
            .update("k", json!(0), |_| panic!("boom"))
            .await
            .unwrap_err();
        assert_eq!(err, WorkspaceError::UpdatePanicked { key: "k".into() });
        assert_eq!(ws.fetch("k").await.unwrap(), Some(Entry::Json(json!(1))));
    }

    // -----------------------------------------------------------------------
    // Destroy
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn operations_fail_after_destroy() {
        let ws = Workspace::init(owner());
        ws.put("k", json!(1)).await.unwrap();
        ws.destroy().await.unwrap();

        let destroyed = WorkspaceError::Destroyed { id: ws.id() };
        assert_eq!(ws.fetch("k").await.unwrap_err(), destroyed);
        assert_eq!(ws.put("k", json!(2)).await.unwrap_err(), destroyed);
        assert_eq!(ws.delete_key("k").await.unwrap_err(), destroyed);
        assert_eq!(ws.keys().await.unwrap_err(), destroyed);
        assert_eq!(
            ws.update_json("k", json!(0), |v| v).await.unwrap_err(),
            destroyed
        );
        assert_eq!(ws.destroy().await.unwrap_err(), destroyed);
        assert!(ws.is_destroyed());
    }

    #[tokio::test]
    async fn clones_share_the_worker() {
        let ws = Workspace::init(owner());
        let other = ws.clone();
        other.put("shared", json!("yes")).await.unwrap();
        assert!(ws.fetch("shared").await.unwrap().is_some());
        ws.destroy().await.unwrap();
        assert!(other.fetch("shared").await.is_err());
        assert_eq!(ws, other);
    }

    #[tokio::test]
    async fn debug_format() {
        let ws = Workspace::init(owner());
        let debug = format!("{ws:?}");
        assert!(debug.contains("Workspace"));
        assert!(debug.contains("test-owner"));
    }
}
