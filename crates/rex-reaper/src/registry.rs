use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::error::{ReaperError, ReaperResult};
use crate::reaper::Reaper;
use crate::resource::TrackedResource;

/// Name-addressed set of reapers.
///
/// Cloning shares the registry.
#[derive(Clone, Debug, Default)]
pub struct ReaperRegistry {
    reapers: Arc<DashMap<String, Reaper>>,
}

impl ReaperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the running reaper called `name`, starting one if there is
    /// none or the previous one was stopped.
    pub fn start(&self, name: &str) -> Reaper {
        let mut entry = self
            .reapers
            .entry(name.to_string())
            .or_insert_with(|| Reaper::start(name));
        if entry.is_stopped() {
            *entry = Reaper::start(name);
        }
        entry.clone()
    }

    pub fn get(&self, name: &str) -> Option<Reaper> {
        self.reapers.get(name).map(|r| r.value().clone())
    }

    /// Track `resource` on the reaper called `name`.
    pub async fn track(
        &self,
        name: &str,
        resource: impl Into<TrackedResource>,
        ttl: Duration,
    ) -> ReaperResult<()> {
        self.lookup(name)?.track(resource, ttl).await
    }

    /// Cancel a timer on the reaper called `name`. An unknown name has no
    /// timers, so this returns `Ok(false)`.
    pub async fn untrack(&self, name: &str, resource: &TrackedResource) -> ReaperResult<bool> {
        match self.get(name) {
            Some(reaper) => reaper.untrack(resource).await,
            None => Ok(false),
        }
    }

    /// Stop and forget the reaper called `name`.
    pub async fn shutdown(&self, name: &str) -> ReaperResult<()> {
        let (_, reaper) = self
            .reapers
            .remove(name)
            .ok_or_else(|| unknown(name))?;
        reaper.shutdown().await
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.reapers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn lookup(&self, name: &str) -> ReaperResult<Reaper> {
        self.get(name).ok_or_else(|| unknown(name))
    }
}

fn unknown(name: &str) -> ReaperError {
    ReaperError::UnknownReaper {
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rex_types::OwnerId;
    use rex_workspace::WorkspaceStore;
    use tokio::time::sleep;

    async fn workspace() -> WorkspaceStore {
        WorkspaceStore::init_empty(OwnerId::from("req-registry"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn start_is_idempotent_per_name() {
        let registry = ReaperRegistry::new();
        let a = registry.start("alpha");
        let again = registry.start("alpha");
        let store = workspace().await;
        a.track(store, Duration::from_secs(60)).await.unwrap();
        assert_eq!(again.tracked().await.unwrap(), 1);
        assert_eq!(registry.names(), vec!["alpha"]);
    }

    #[tokio::test]
    async fn track_by_name() {
        let registry = ReaperRegistry::new();
        registry.start("alpha");
        registry.start("beta");
        let store = workspace().await;
        registry
            .track("alpha", store.clone(), Duration::from_millis(30))
            .await
            .unwrap();
        assert_eq!(registry.get("beta").unwrap().tracked().await.unwrap(), 0);

        sleep(Duration::from_millis(120)).await;
        assert!(store.get().await.is_err());
    }

    #[tokio::test]
    async fn untrack_by_name() {
        let registry = ReaperRegistry::new();
        registry.start("alpha");
        let store = workspace().await;
        let resource = TrackedResource::from(store.clone());
        registry
            .track("alpha", resource.clone(), Duration::from_millis(30))
            .await
            .unwrap();
        assert!(registry.untrack("alpha", &resource).await.unwrap());
        assert!(!registry.untrack("alpha", &resource).await.unwrap());

        sleep(Duration::from_millis(100)).await;
        assert!(store.get().await.is_ok());
    }

    #[tokio::test]
    async fn unknown_name_is_an_error() {
        let registry = ReaperRegistry::new();
        let store = workspace().await;
        let err = registry
            .track("missing", store, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ReaperError::UnknownReaper {
                name: "missing".into()
            }
        );
        assert!(registry.shutdown("missing").await.is_err());
    }

    #[tokio::test]
    async fn untrack_on_unknown_name_is_false() {
        let registry = ReaperRegistry::new();
        let resource = TrackedResource::from(workspace().await);
        assert!(!registry.untrack("missing", &resource).await.unwrap());
    }

    #[tokio::test]
    async fn shutdown_then_restart() {
        let registry = ReaperRegistry::new();
        let first = registry.start("alpha");
        registry.shutdown("alpha").await.unwrap();
        assert!(first.is_stopped());
        assert!(registry.get("alpha").is_none());

        let second = registry.start("alpha");
        assert!(!second.is_stopped());
    }
}
