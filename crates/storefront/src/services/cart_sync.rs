//! Debounced cart sync to the backend.
//!
//! Handlers push a [`CartDelta`] after every cart change. A single background
//! task owns the pending deltas, one per user: deltas arriving inside the
//! debounce window are merged, and the merged delta is posted once the window
//! passes with no new change. Sync is best effort; failures are logged.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use myrmeco_core::UserId;
use secrecy::SecretString;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api::{ApiError, PlantApiClient};
use crate::models::{CartDelta, CurrentUser};

/// Where merged deltas are sent.
pub trait CartSink: Send + Sync + 'static {
    fn push(
        &self,
        user: UserId,
        token: Option<SecretString>,
        delta: CartDelta,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl CartSink for PlantApiClient {
    fn push(
        &self,
        _user: UserId,
        token: Option<SecretString>,
        delta: CartDelta,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        let client = self.clone();
        async move { client.sync_cart(token.as_ref(), &delta).await }
    }
}

struct SyncRequest {
    user: UserId,
    token: Option<SecretString>,
    delta: CartDelta,
}

struct Pending {
    token: Option<SecretString>,
    delta: CartDelta,
    deadline: Instant,
}

/// Handle for queueing cart deltas. Cheap to clone.
#[derive(Clone)]
pub struct CartSyncer {
    tx: mpsc::UnboundedSender<SyncRequest>,
}

impl CartSyncer {
    /// Start the background sync task.
    pub fn spawn<S: CartSink>(sink: S, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(Arc::new(sink), rx, debounce));
        Self { tx }
    }

    /// Queue a delta for a logged-in user. Empty deltas are ignored.
    pub fn push(&self, user: &CurrentUser, delta: CartDelta) {
        if delta.is_empty() {
            return;
        }
        let request = SyncRequest {
            user: user.id,
            token: user.token.clone(),
            delta,
        };
        if self.tx.send(request).is_err() {
            warn!("Cart sync task has stopped; dropping cart delta");
        }
    }
}

async fn run<S: CartSink>(
    sink: Arc<S>,
    mut rx: mpsc::UnboundedReceiver<SyncRequest>,
    debounce: Duration,
) {
    let mut pending: HashMap<UserId, Pending> = HashMap::new();

    loop {
        let next_deadline = pending.values().map(|p| p.deadline).min();

        tokio::select! {
            request = rx.recv() => {
                let Some(request) = request else {
                    break;
                };
                let deadline = Instant::now() + debounce;
                match pending.get_mut(&request.user) {
                    Some(entry) => {
                        entry.delta.merge(request.delta);
                        entry.token = request.token;
                        entry.deadline = deadline;
                    }
                    None => {
                        pending.insert(request.user, Pending {
                            token: request.token,
                            delta: request.delta,
                            deadline,
                        });
                    }
                }
            }
            () = wait_until(next_deadline) => {
                let now = Instant::now();
                let due: Vec<UserId> = pending
                    .iter()
                    .filter(|(_, p)| p.deadline <= now)
                    .map(|(user, _)| *user)
                    .collect();
                for user in due {
                    if let Some(entry) = pending.remove(&user) {
                        flush(&sink, user, entry);
                    }
                }
            }
        }
    }

    // Channel closed: send whatever is still waiting.
    for (user, entry) in pending {
        flush(&sink, user, entry);
    }
}

fn flush<S: CartSink>(sink: &Arc<S>, user: UserId, entry: Pending) {
    if entry.delta.is_empty() {
        return;
    }
    let sink = Arc::clone(sink);
    tokio::spawn(async move {
        debug!(
            user_id = %user,
            updated = entry.delta.added_or_updated.len(),
            deleted = entry.delta.deleted.len(),
            "Syncing cart"
        );
        if let Err(e) = sink.push(user, entry.token, entry.delta).await {
            warn!(user_id = %user, error = %e, "Cart sync failed");
        }
    });
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use myrmeco_core::{PlantId, Quantity};

    use super::*;
    use crate::models::{DeltaLine, LineKey};

    struct ChannelSink(mpsc::UnboundedSender<(UserId, CartDelta)>);

    impl CartSink for ChannelSink {
        fn push(
            &self,
            user: UserId,
            _token: Option<SecretString>,
            delta: CartDelta,
        ) -> impl Future<Output = Result<(), ApiError>> + Send {
            let _ = self.0.send((user, delta));
            async { Ok(()) }
        }
    }

    fn user(id: i64) -> CurrentUser {
        CurrentUser {
            id: UserId::new(id),
            username: format!("user{id}"),
            email: None,
            phone: None,
            token: None,
        }
    }

    fn set(id: i64, quantity: u32) -> CartDelta {
        CartDelta {
            added_or_updated: vec![DeltaLine {
                id: PlantId::new(id),
                size: "S".to_string(),
                quantity: Quantity::new(quantity),
            }],
            deleted: vec![],
        }
    }

    fn syncer() -> (CartSyncer, mpsc::UnboundedReceiver<(UserId, CartDelta)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (CartSyncer::spawn(ChannelSink(tx), Duration::from_millis(500)), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_deltas_in_window_are_merged() {
        let (syncer, mut rx) = syncer();
        let start = Instant::now();

        syncer.push(&user(1), set(10, 1));
        syncer.push(&user(1), set(10, 2));
        syncer.push(&user(1), set(11, 1));

        let (who, delta) = rx.recv().await.unwrap();
        assert_eq!(who, UserId::new(1));
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert_eq!(delta.added_or_updated.len(), 2);
        assert_eq!(delta.added_or_updated[0].quantity.get(), 2);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_delta_restarts_window() {
        let (syncer, mut rx) = syncer();
        let start = Instant::now();

        syncer.push(&user(1), set(10, 1));
        tokio::time::sleep(Duration::from_millis(300)).await;
        syncer.push(&user(1), set(10, 3));

        let (_, delta) = rx.recv().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(800));
        assert_eq!(delta.added_or_updated[0].quantity.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_are_synced_independently() {
        let (syncer, mut rx) = syncer();

        syncer.push(&user(1), set(10, 1));
        syncer.push(&user(2), set(20, 1));

        let mut users = vec![rx.recv().await.unwrap().0, rx.recv().await.unwrap().0];
        users.sort();
        assert_eq!(users, vec![UserId::new(1), UserId::new(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_after_update_sends_only_delete() {
        let (syncer, mut rx) = syncer();

        syncer.push(&user(1), set(10, 4));
        syncer.push(
            &user(1),
            CartDelta {
                added_or_updated: vec![],
                deleted: vec![LineKey::new(PlantId::new(10), "S")],
            },
        );

        let (_, delta) = rx.recv().await.unwrap();
        assert!(delta.added_or_updated.is_empty());
        assert_eq!(delta.deleted.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_delta_is_ignored() {
        let (syncer, mut rx) = syncer();
        syncer.push(&user(1), CartDelta::default());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
    }
}
