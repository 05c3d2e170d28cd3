//! Optimistic review mutations.
//!
//! Approving or rejecting an accrual request updates both cache partitions
//! before the server answers:
//!
//! 1. in-flight refetches of both partitions are cancelled,
//! 2. both partitions are snapshotted,
//! 3. every cached copy of the request is rewritten with the expected outcome,
//! 4. the `PATCH` is sent,
//! 5. on success both partitions are invalidated; on failure the patched
//!    request is restored from the snapshot and then both are invalidated.
//!
//! Steps 1-3 and 5 are [`OptimisticTransaction`]. When reviews overlap, the
//! invalidation waits for the last one to settle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use mileage_core::{AccrualRequest, AccrualStatus, EntityId, Page};

use crate::cache::{KeyFilter, Snapshot};
use crate::error::ApiError;
use crate::pagination::InfiniteData;
use crate::store::{AccrualStore, FLAT_SCOPE, INFINITE_SCOPE};

/// Reviewer shown on an optimistic write until the refetch brings the real one.
pub const OPTIMISTIC_REVIEWER: &str = "you";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            message: message.into(),
        }
    }
}

/// Toast sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("A rejection reason is required")]
    EmptyReason,
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl ReviewAction {
    const fn past_tense(self) -> &'static str {
        match self {
            Self::Approve => "approved",
            Self::Reject => "rejected",
        }
    }

    const fn verb(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

/// Lifecycle of the most recently started review mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MutationStatus {
    #[default]
    Idle,
    Pending(ReviewAction, EntityId),
    Succeeded(ReviewAction, EntityId),
    Failed(ReviewAction, EntityId),
}

impl MutationStatus {
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(..))
    }
}

/// Patch applied to every cached copy of one request.
pub type RequestPatch = Arc<dyn Fn(&mut AccrualRequest) + Send + Sync>;

#[derive(Default)]
struct OpenState {
    next: u64,
    open: Vec<(u64, Vec<(EntityId, RequestPatch)>)>,
}

/// Optimistic transactions that have begun and not yet settled, with the
/// patches each one has written.
///
/// Reconciliation is held back while any transaction is open: a refetch
/// started by one mutation would otherwise overwrite another mutation's
/// optimistic write with the server's pre-mutation state.
#[derive(Default)]
pub struct OpenTransactions {
    state: Mutex<OpenState>,
}

impl OpenTransactions {
    fn lock(&self) -> MutexGuard<'_, OpenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self) -> u64 {
        let mut state = self.lock();
        state.next += 1;
        let txn = state.next;
        state.open.push((txn, Vec::new()));
        txn
    }

    fn record(&self, txn: u64, id: EntityId, patch: RequestPatch) {
        if let Some((_, patches)) = self.lock().open.iter_mut().find(|(t, _)| *t == txn) {
            patches.push((id, patch));
        }
    }

    /// Remove a transaction. Returns the ids it patched and whether no other
    /// transaction is still open.
    fn close(&self, txn: u64) -> (Vec<EntityId>, bool) {
        let mut state = self.lock();
        let mut ids = Vec::new();
        if let Some(pos) = state.open.iter().position(|(t, _)| *t == txn) {
            let (_, patches) = state.open.remove(pos);
            for (id, _) in patches {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        (ids, state.open.is_empty())
    }

    /// Patches that still-open transactions hold for `id`, oldest first.
    fn patches_for(&self, id: &EntityId) -> Vec<RequestPatch> {
        self.lock()
            .open
            .iter()
            .flat_map(|(_, patches)| patches.iter())
            .filter(|(patched, _)| patched == id)
            .map(|(_, patch)| Arc::clone(patch))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Snapshot / patch / rollback over both accrual partitions.
///
/// While other transactions are open, settling only reverts this
/// transaction's own entries; the last transaction to settle reconciles
/// both partitions with the server.
pub struct OptimisticTransaction<'a> {
    store: &'a AccrualStore,
    txn: Option<u64>,
    flat: Snapshot<Page<AccrualRequest>>,
    infinite: Snapshot<InfiniteData<AccrualRequest>>,
}

impl<'a> OptimisticTransaction<'a> {
    /// Cancel in-flight refetches of both partitions, then snapshot them.
    pub async fn begin(store: &'a AccrualStore) -> Self {
        let flat_filter = KeyFilter::scope(FLAT_SCOPE);
        let infinite_filter = KeyFilter::scope(INFINITE_SCOPE);
        let txn = store.transactions().open();
        store.flat().cancel(&flat_filter).await;
        store.infinite().cancel(&infinite_filter).await;
        Self {
            store,
            txn: Some(txn),
            flat: store.flat().snapshot(&flat_filter).await,
            infinite: store.infinite().snapshot(&infinite_filter).await,
        }
    }

    /// Rewrite every cached copy of `id` in both partitions. Returns the number
    /// of copies patched.
    pub async fn apply<F>(&self, id: &EntityId, patch: F) -> usize
    where
        F: Fn(&mut AccrualRequest) + Send + Sync + 'static,
    {
        let patch: RequestPatch = Arc::new(patch);
        if let Some(txn) = self.txn {
            self.store
                .transactions()
                .record(txn, id.clone(), Arc::clone(&patch));
        }
        let mut patched = 0;
        self.store
            .flat()
            .update(&KeyFilter::scope(FLAT_SCOPE), |page| {
                for request in page.data.iter_mut().filter(|r| r.id == *id) {
                    patch(request);
                    patched += 1;
                }
            })
            .await;
        self.store
            .infinite()
            .update(&KeyFilter::scope(INFINITE_SCOPE), |data| {
                for request in data.items_mut().filter(|r| r.id == *id) {
                    patch(request);
                    patched += 1;
                }
            })
            .await;
        patched
    }

    pub const fn flat_snapshot(&self) -> &Snapshot<Page<AccrualRequest>> {
        &self.flat
    }

    pub const fn infinite_snapshot(&self) -> &Snapshot<InfiniteData<AccrualRequest>> {
        &self.infinite
    }

    /// Keep the optimistic data and reconcile with the server.
    pub async fn commit(mut self) {
        let Some(txn) = self.txn.take() else {
            return;
        };
        let (_, last) = self.store.transactions().close(txn);
        self.settle(last).await;
    }

    /// Put back the snapshotted copies of every request this transaction
    /// patched, then reconcile with the server.
    pub async fn rollback(mut self) {
        let Some(txn) = self.txn.take() else {
            return;
        };
        let (ids, last) = self.store.transactions().close(txn);
        for id in &ids {
            self.revert(id).await;
        }
        self.settle(last).await;
    }

    /// Restore the snapshotted copies of `id`, then replay the patches other
    /// open transactions hold for it.
    async fn revert(&self, id: &EntityId) {
        let others = self.store.transactions().patches_for(id);
        for (key, page) in self.flat.iter() {
            let Some(original) = page.data.iter().find(|r| r.id == *id) else {
                continue;
            };
            self.store
                .flat()
                .update(&KeyFilter::Exact(key.clone()), |page| {
                    for request in page.data.iter_mut().filter(|r| r.id == *id) {
                        *request = original.clone();
                        others.iter().for_each(|patch| patch(request));
                    }
                })
                .await;
        }
        for (key, data) in self.infinite.iter() {
            let Some(original) = data.items().find(|r| r.id == *id) else {
                continue;
            };
            self.store
                .infinite()
                .update(&KeyFilter::Exact(key.clone()), |data| {
                    for request in data.items_mut().filter(|r| r.id == *id) {
                        *request = original.clone();
                        others.iter().for_each(|patch| patch(request));
                    }
                })
                .await;
        }
    }

    async fn settle(&self, last: bool) {
        if last {
            self.store.invalidate().await;
        } else {
            debug!(
                open = self.store.transactions().len(),
                "Reconciliation deferred to the last open review"
            );
        }
    }
}

impl Drop for OptimisticTransaction<'_> {
    fn drop(&mut self) {
        let Some(txn) = self.txn.take() else {
            return;
        };
        let (_, last) = self.store.transactions().close(txn);
        warn!(txn, "Optimistic transaction dropped before settling");
        if last && let Ok(handle) = tokio::runtime::Handle::try_current() {
            let store = self.store.clone();
            handle.spawn(async move { store.invalidate().await });
        }
    }
}

/// Approve / reject with optimistic cache updates.
pub struct ReviewMutations {
    store: AccrualStore,
    notifier: Arc<dyn Notifier>,
    status: watch::Sender<MutationStatus>,
    latest: AtomicU64,
}

impl ReviewMutations {
    pub fn new(store: AccrualStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            status: watch::Sender::new(MutationStatus::Idle),
            latest: AtomicU64::new(0),
        }
    }

    pub const fn store(&self) -> &AccrualStore {
        &self.store
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> MutationStatus {
        self.status.borrow().clone()
    }

    pub async fn approve(&self, id: &EntityId) -> Result<(), ReviewError> {
        self.review(ReviewAction::Approve, id, None).await
    }

    /// Reject with a reason. A blank reason fails before anything is touched.
    pub async fn reject(&self, id: &EntityId, reason: &str) -> Result<(), ReviewError> {
        let reason = reason.trim();
        if reason.is_empty() {
            self.notifier.notify(Toast::error(ReviewError::EmptyReason.to_string()));
            return Err(ReviewError::EmptyReason);
        }
        self.review(ReviewAction::Reject, id, Some(reason)).await
    }

    async fn review(
        &self,
        action: ReviewAction,
        id: &EntityId,
        reason: Option<&str>,
    ) -> Result<(), ReviewError> {
        let seq = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish(seq, MutationStatus::Pending(action, id.clone()));

        let tx = OptimisticTransaction::begin(&self.store).await;
        let reviewed_at = Utc::now();
        let rejected_reason = reason.map(str::to_string);
        let patched = tx
            .apply(id, move |request| {
                request.status = match action {
                    ReviewAction::Approve => AccrualStatus::Approved,
                    ReviewAction::Reject => AccrualStatus::Rejected,
                };
                request.reviewed_by = Some(OPTIMISTIC_REVIEWER.to_string());
                request.reviewed_at = Some(reviewed_at);
                if let Some(reason) = &rejected_reason {
                    request.rejected_reason = Some(reason.clone());
                }
            })
            .await;

        let api = self.store.api();
        let result = match reason {
            Some(reason) => api.reject_accrual_request(id, reason).await,
            None => api.approve_accrual_request(id).await,
        };

        match result {
            Ok(()) => {
                info!(%id, action = action.verb(), patched, "Review mutation succeeded");
                self.notifier.notify(Toast::success(format!(
                    "Accrual request {id} {}",
                    action.past_tense()
                )));
                tx.commit().await;
                self.publish(seq, MutationStatus::Succeeded(action, id.clone()));
                Ok(())
            }
            Err(err) => {
                warn!(%id, action = action.verb(), code = %err.code, "Review mutation failed, rolling back");
                tx.rollback().await;
                self.notifier.notify(Toast::error(format!(
                    "Could not {} request {id}: {}",
                    action.verb(),
                    err.message
                )));
                self.publish(seq, MutationStatus::Failed(action, id.clone()));
                Err(ReviewError::Api(err))
            }
        }
    }

    /// Only the latest started mutation drives the observable status.
    fn publish(&self, seq: u64, status: MutationStatus) {
        if self.latest.load(Ordering::SeqCst) == seq {
            self.status.send_replace(status);
        }
    }
}
