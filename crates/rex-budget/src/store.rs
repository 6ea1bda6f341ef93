use std::fmt;

use rex_types::OwnerId;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::{BudgetError, BudgetResult};
use crate::state::{BudgetState, Reservation};

enum Command {
    ReserveChildren {
        count: u64,
        reply: oneshot::Sender<Reservation>,
    },
    ReleaseChildren {
        count: u64,
        reply: oneshot::Sender<u64>,
    },
    AddTokens {
        amount: u64,
        reply: oneshot::Sender<BudgetResult<u64>>,
    },
    Destroy {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a budget worker.
///
/// Writes are serialized through the worker. Reads go through a snapshot
/// the worker republishes after every change, so [`status`](Self::status)
/// never waits behind queued reservations.
#[derive(Clone)]
pub struct BudgetStore {
    owner: OwnerId,
    tx: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<BudgetState>,
}

impl BudgetStore {
    /// Spawn a budget for `owner`. `None` caps are unlimited.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(owner: OwnerId, max_children: Option<u64>, token_budget: Option<u64>) -> Self {
        let initial = BudgetState::new(max_children, token_budget);
        let (tx, rx) = mpsc::unbounded_channel();
        let (publish, snapshot) = watch::channel(initial);
        tokio::spawn(run(owner.clone(), initial, rx, publish));
        info!(
            owner = %owner,
            max_children = ?max_children,
            token_budget = ?token_budget,
            "budget started"
        );
        Self {
            owner,
            tx,
            snapshot,
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Current usage and caps.
    pub fn status(&self) -> BudgetResult<BudgetState> {
        // The worker drops its publisher on destroy.
        if self.snapshot.has_changed().is_err() {
            return Err(self.destroyed());
        }
        Ok(*self.snapshot.borrow())
    }

    /// Reserve up to `count` child slots.
    pub async fn reserve_children(&self, count: u64) -> BudgetResult<Reservation> {
        self.request(|reply| Command::ReserveChildren { count, reply })
            .await
    }

    /// Return up to `count` previously reserved slots. Returns how many
    /// were actually released.
    pub async fn release_children(&self, count: u64) -> BudgetResult<u64> {
        self.request(|reply| Command::ReleaseChildren { count, reply })
            .await
    }

    /// Commit `amount` tokens, or reject the whole amount if it would
    /// exceed the cap. Returns the new total.
    pub async fn add_tokens(&self, amount: u64) -> BudgetResult<u64> {
        self.request(|reply| Command::AddTokens { amount, reply })
            .await?
    }

    /// Stop the worker. Later calls on any clone fail with
    /// [`BudgetError::Destroyed`].
    pub async fn destroy(&self) -> BudgetResult<()> {
        self.request(|reply| Command::Destroy { reply }).await
    }

    pub fn is_destroyed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> BudgetResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).map_err(|_| self.destroyed())?;
        rx.await.map_err(|_| self.destroyed())
    }

    fn destroyed(&self) -> BudgetError {
        BudgetError::Destroyed {
            owner: self.owner.to_string(),
        }
    }
}

impl fmt::Debug for BudgetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BudgetStore")
            .field("owner", &self.owner)
            .field("state", &*self.snapshot.borrow())
            .finish()
    }
}

async fn run(
    owner: OwnerId,
    mut state: BudgetState,
    mut rx: mpsc::UnboundedReceiver<Command>,
    publish: watch::Sender<BudgetState>,
) {
    let mut destroy_reply = None;

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::ReserveChildren { count, reply } => {
                let r = state.reserve_children(count);
                debug!(owner = %owner, requested = count, granted = r.granted, "children reserved");
                publish.send_replace(state);
                let _ = reply.send(r);
            }
            Command::ReleaseChildren { count, reply } => {
                let released = state.release_children(count);
                debug!(owner = %owner, released, "children released");
                publish.send_replace(state);
                let _ = reply.send(released);
            }
            Command::AddTokens { amount, reply } => {
                let result = state.add_tokens(amount);
                match &result {
                    Ok(total) => {
                        debug!(owner = %owner, amount, total, "tokens committed");
                        publish.send_replace(state);
                    }
                    Err(e) => warn!(owner = %owner, error = %e, "token commit rejected"),
                }
                let _ = reply.send(result);
            }
            Command::Destroy { reply } => {
                destroy_reply = Some(reply);
                break;
            }
        }
    }

    // Close both channels before acknowledging so the caller observes the
    // destroyed state as soon as `destroy` returns.
    rx.close();
    drop(publish);
    info!(
        owner = %owner,
        children_used = state.children_used,
        tokens_used = state.tokens_used,
        "budget destroyed"
    );
    if let Some(reply) = destroy_reply {
        let _ = reply.send(());
    }
}
