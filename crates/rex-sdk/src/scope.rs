use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use rex_budget::{BudgetError, BudgetState, BudgetStore, Reservation};
use rex_reaper::{Reaper, TrackedResource};
use rex_store::{ContextRef, ContextStore, PutOptions};
use rex_types::OwnerId;
use rex_workspace::{ExplorationDocument, PartialCollector, WorkspaceError, WorkspaceStore};
use tracing::{debug, info, warn};

use crate::config::RexConfig;
use crate::error::{SdkError, SdkResult};

/// Caps for one request. `None` is unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeLimits {
    pub max_children: Option<u64>,
    pub token_budget: Option<u64>,
}

impl ScopeLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_children(mut self, max: u64) -> Self {
        self.max_children = Some(max);
        self
    }

    pub fn with_token_budget(mut self, budget: u64) -> Self {
        self.token_budget = Some(budget);
        self
    }
}

/// Everything one exploration request owns.
///
/// The workspace and every promoted payload are tracked with the reaper
/// under the configured TTL. [`close`](Self::close) releases them early;
/// if it is never called the reaper does.
pub struct RequestScope {
    owner: OwnerId,
    config: RexConfig,
    reaper: Reaper,
    workspace: WorkspaceStore,
    budget: BudgetStore,
    context: ContextStore,
    stashed: Arc<DashMap<String, ContextRef>>,
}

impl RequestScope {
    pub async fn open(
        owner: OwnerId,
        config: RexConfig,
        reaper: Reaper,
        limits: ScopeLimits,
    ) -> SdkResult<Self> {
        let context = ContextStore::new(config.context_store_config());
        Self::open_with_store(owner, config, reaper, limits, context).await
    }

    /// Like [`open`](Self::open), sharing an existing context store (and
    /// its table) instead of creating one.
    pub async fn open_with_store(
        owner: OwnerId,
        config: RexConfig,
        reaper: Reaper,
        limits: ScopeLimits,
        context: ContextStore,
    ) -> SdkResult<Self> {
        config.validate()?;
        let workspace = WorkspaceStore::init_empty(owner.clone()).await?;
        reaper.track(workspace.clone(), config.default_ttl()).await?;
        let budget = BudgetStore::new(owner.clone(), limits.max_children, limits.token_budget);
        info!(
            owner = %owner,
            workspace = %workspace.id(),
            reaper = reaper.name(),
            ttl_ms = config.default_ttl_ms,
            "request scope opened"
        );
        Ok(Self {
            owner,
            config,
            reaper,
            workspace,
            budget,
            context,
            stashed: Arc::new(DashMap::new()),
        })
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn config(&self) -> &RexConfig {
        &self.config
    }

    pub fn workspace(&self) -> &WorkspaceStore {
        &self.workspace
    }

    pub fn context_store(&self) -> &ContextStore {
        &self.context
    }

    pub fn budget_store(&self) -> &BudgetStore {
        &self.budget
    }

    /// Store content, choosing the tier by size. Promoted refs are tracked
    /// with the reaper.
    pub async fn stash(&self, payload: impl Into<Bytes>) -> SdkResult<ContextRef> {
        self.stash_with(payload, PutOptions::new()).await
    }

    /// Store content in the request workspace when it is too large to
    /// inline.
    pub async fn stash_in_workspace(&self, payload: impl Into<Bytes>) -> SdkResult<ContextRef> {
        let opts = PutOptions::new().with_workspace(self.workspace.workspace().clone());
        self.stash_with(payload, opts).await
    }

    async fn stash_with(&self, payload: impl Into<Bytes>, opts: PutOptions) -> SdkResult<ContextRef> {
        let reference = self.context.put(payload, &self.owner, opts).await?;
        if !reference.is_inline() {
            self.reaper
                .track(reference.clone(), self.config.default_ttl())
                .await?;
            self.stashed
                .insert(reference.resource_key(), reference.clone());
        }
        Ok(reference)
    }

    pub async fn fetch(&self, reference: &ContextRef) -> SdkResult<Bytes> {
        Ok(self.context.fetch(reference).await?)
    }

    /// Reserve child slots before fanning out.
    pub async fn spawn_children(&self, count: u64) -> SdkResult<Reservation> {
        let reservation = self.budget.reserve_children(count).await?;
        debug!(owner = %self.owner, requested = count, granted = reservation.granted, "children reserved");
        Ok(reservation)
    }

    /// Give back slots of children that have finished.
    pub async fn finish_children(&self, count: u64) -> SdkResult<u64> {
        Ok(self.budget.release_children(count).await?)
    }

    /// Commit token spend. Returns the running total.
    pub async fn charge_tokens(&self, amount: u64) -> SdkResult<u64> {
        Ok(self.budget.add_tokens(amount).await?)
    }

    pub fn budget(&self) -> SdkResult<BudgetState> {
        Ok(self.budget.status()?)
    }

    /// Apply `f` to the exploration document. Recording progress counts as
    /// activity, so the workspace TTL starts over.
    pub async fn record<F>(&self, f: F) -> SdkResult<ExplorationDocument>
    where
        F: FnOnce(ExplorationDocument) -> ExplorationDocument + Send + 'static,
    {
        let doc = self.workspace.update(f).await?;
        self.reaper
            .track(self.workspace.clone(), self.config.default_ttl())
            .await?;
        Ok(doc)
    }

    pub async fn document(&self) -> SdkResult<ExplorationDocument> {
        Ok(self.workspace.get().await?)
    }

    pub async fn summary(&self, max_chars: usize) -> SdkResult<String> {
        Ok(self.workspace.summary(max_chars).await?)
    }

    /// Collect streamed child output into the request workspace.
    pub fn start_partials(&self) -> PartialCollector {
        PartialCollector::start_with_config(
            self.workspace.workspace().clone(),
            self.config.collector_config(),
        )
    }

    /// Release everything this scope created. Resources the reaper or the
    /// caller already removed are skipped. Every resource is attempted; the
    /// first unexpected error is returned.
    pub async fn close(self) -> SdkResult<()> {
        let mut first_error: Option<SdkError> = None;
        let mut keep = |result: SdkResult<()>| {
            if let Err(e) = result {
                warn!(error = %e, "request scope cleanup failed");
                first_error.get_or_insert(e);
            }
        };

        let stashed: Vec<ContextRef> = self.stashed.iter().map(|e| e.value().clone()).collect();
        for reference in &stashed {
            keep(self.untrack(TrackedResource::from(reference.clone())).await);
            keep(match reference.delete().await {
                Err(e) if e.is_not_found() => Ok(()),
                other => other.map_err(SdkError::from),
            });
        }

        keep(self.untrack(TrackedResource::from(self.workspace.clone())).await);
        keep(match self.workspace.delete().await {
            Err(WorkspaceError::Destroyed { .. }) => Ok(()),
            other => other.map_err(SdkError::from),
        });

        keep(match self.budget.destroy().await {
            Err(BudgetError::Destroyed { .. }) => Ok(()),
            other => other.map_err(SdkError::from),
        });

        info!(owner = %self.owner, released = stashed.len(), "request scope closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn untrack(&self, resource: TrackedResource) -> SdkResult<()> {
        // A stopped reaper has no timer left to cancel.
        match self.reaper.untrack(&resource).await {
            Ok(_) | Err(rex_reaper::ReaperError::Stopped { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("owner", &self.owner)
            .field("workspace", &self.workspace.id())
            .field("reaper", &self.reaper.name())
            .field("stashed", &self.stashed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RexConfig {
        RexConfig {
            inline_threshold_bytes: 8,
            ..RexConfig::default()
        }
    }

    async fn scope(limits: ScopeLimits) -> RequestScope {
        RequestScope::open(OwnerId::from("req-scope"), config(), Reaper::start("scope-test"), limits)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn small_stash_is_inline_and_untracked() {
        let s = scope(ScopeLimits::unlimited()).await;
        let r = s.stash(b"tiny".to_vec()).await.unwrap();
        assert!(r.is_inline());
        // Only the workspace is tracked.
        assert_eq!(s.reaper.tracked().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn large_stash_is_tracked() {
        let s = scope(ScopeLimits::unlimited()).await;
        let r = s.stash(vec![7u8; 64]).await.unwrap();
        assert!(!r.is_inline());
        assert_eq!(s.reaper.tracked().await.unwrap(), 2);
        assert_eq!(s.fetch(&r).await.unwrap().len(), 64);
    }

    #[tokio::test]
    async fn workspace_stash_lands_in_request_workspace() {
        let s = scope(ScopeLimits::unlimited()).await;
        let r = s.stash_in_workspace(vec![1u8; 32]).await.unwrap();
        assert_eq!(r.backend(), rex_store::Backend::Workspace);
        assert!(s.context_store().table().is_empty());
    }

    #[tokio::test]
    async fn children_and_tokens_draw_from_budget() {
        let s = scope(ScopeLimits::unlimited().with_max_children(2).with_token_budget(10)).await;
        assert_eq!(s.spawn_children(3).await.unwrap().granted, 2);
        assert_eq!(s.finish_children(1).await.unwrap(), 1);
        assert_eq!(s.charge_tokens(7).await.unwrap(), 7);
        assert!(matches!(
            s.charge_tokens(4).await.unwrap_err(),
            SdkError::Budget(BudgetError::BudgetExceeded { .. })
        ));
        let b = s.budget().unwrap();
        assert_eq!(b.children_used, 1);
        assert_eq!(b.tokens_used, 7);
    }

    #[tokio::test]
    async fn close_releases_everything() {
        let s = scope(ScopeLimits::unlimited()).await;
        let r = s.stash(vec![0u8; 64]).await.unwrap();
        let ws = s.workspace().clone();
        let budget = s.budget_store().clone();
        let reaper = s.reaper.clone();
        s.close().await.unwrap();

        assert!(r.fetch().await.unwrap_err().is_not_found());
        assert!(ws.get().await.is_err());
        assert!(budget.status().is_err());
        assert_eq!(reaper.tracked().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let bad = RexConfig {
            default_ttl_ms: 0,
            ..RexConfig::default()
        };
        let err = RequestScope::open(OwnerId::from("x"), bad, Reaper::start("bad"), ScopeLimits::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }
}
