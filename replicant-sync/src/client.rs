//! Client-side replicant mirrors.

use crate::error::{SyncError, SyncResult};
use crate::protocol::{
    AssignReplicant, ChangeReplicant, DeclareReplicant, ReadReplicant, RejectReason,
    ReplicantAssigned, ReplicantChanged, ReplicantDeclared, SyncMessage,
};
use crate::transport::ClientTransport;
use replicant_tracker::{rewind, OpResult, TrackedValue};
use replicant_types::{ReplicantId, Revision, SchemaSum};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// A committed change as seen by a mirror's listeners.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// The replicant that changed.
    pub id: ReplicantId,
    /// The value before the change.
    pub old_value: Value,
    /// The value after the change.
    pub new_value: Value,
    /// The revision the change committed at.
    pub revision: Revision,
}

/// Handle for detaching a change listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ChangeListener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Where a mirror stands relative to the authority.
///
/// An undeclared replicant simply has no mirror; the first state a mirror
/// can be observed in is `Synced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MirrorState {
    Synced,
    /// A revision gap or schema mismatch was detected and the fresh
    /// declaration failed; edits are refused until a later resync lands.
    Resyncing,
}

struct Mirror {
    state: MirrorState,
    tracked: TrackedValue,
    revision: Revision,
    schema_sum: Option<SchemaSum>,
    /// The original declaration, re-sent verbatim on resync.
    declare: DeclareReplicant,
    listeners: HashMap<ListenerId, ChangeListener>,
    next_listener: u64,
}

impl Mirror {
    fn listeners(&self) -> Vec<ChangeListener> {
        self.listeners.values().cloned().collect()
    }

    /// Installs a fresh authoritative snapshot, discarding local state.
    fn install(&mut self, declared: &ReplicantDeclared) {
        self.tracked.overwrite(declared.value.clone());
        self.revision = declared.revision;
        self.schema_sum = declared.schema_sum.clone();
        self.state = MirrorState::Synced;
    }
}

/// A set of replicant mirrors synchronized over one connection.
///
/// Local edits apply optimistically: the mirror mutates immediately, the
/// recorded batch goes to the authority, and the acknowledgement carries
/// the committed revision — the operations are never replayed a second
/// time on the editing mirror. Rejected changes roll back by running the
/// batch backwards.
///
/// [`run`](Self::run) must be driven (usually on its own task) for room
/// broadcasts to reach the mirrors.
pub struct ReplicantClient {
    transport: Arc<dyn ClientTransport>,
    mirrors: Arc<RwLock<HashMap<ReplicantId, Arc<Mutex<Mirror>>>>>,
}

impl ReplicantClient {
    /// Creates a client over an established connection.
    pub fn new(transport: Arc<dyn ClientTransport>) -> Self {
        Self {
            transport,
            mirrors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    // ── Declaration ──────────────────────────────────────────────

    /// Declares a replicant with the authority and mirrors it locally.
    ///
    /// Returns the authoritative initial value. Declaring an
    /// already-mirrored replicant returns its current value without going
    /// to the wire.
    pub async fn declare(&self, declare: DeclareReplicant) -> SyncResult<Value> {
        if let Some(mirror) = self.mirror(&declare.id).await {
            return Ok(mirror.lock().await.tracked.value().clone());
        }

        let response = self
            .transport
            .request(SyncMessage::DeclareReplicant(declare.clone()))
            .await?;
        let declared = expect_declared(&declare.id, response)?;

        let mirror = Mirror {
            state: MirrorState::Synced,
            tracked: TrackedValue::new(declared.value.clone()),
            revision: declared.revision,
            schema_sum: declared.schema_sum,
            declare,
            listeners: HashMap::new(),
            next_listener: 0,
        };

        let mut mirrors = self.mirrors.write().await;
        // A concurrent declare of the same replicant may have finished
        // first; both hold the same authoritative state, so first wins.
        mirrors
            .entry(declared.id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(mirror)));
        info!(
            "declared replicant {} at revision {}",
            declared.id, declared.revision
        );
        Ok(declared.value)
    }

    // ── Reads ────────────────────────────────────────────────────

    /// The mirrored value, if this replicant has been declared here.
    pub async fn value(&self, id: &ReplicantId) -> Option<Value> {
        let mirror = self.mirror(id).await?;
        let guard = mirror.lock().await;
        Some(guard.tracked.value().clone())
    }

    /// The mirrored revision, if this replicant has been declared here.
    pub async fn revision(&self, id: &ReplicantId) -> Option<Revision> {
        let mirror = self.mirror(id).await?;
        let guard = mirror.lock().await;
        Some(guard.revision)
    }

    /// One-shot authoritative read, without declaring or joining the
    /// replicant's room. `None` if the replicant was never declared with
    /// the authority.
    pub async fn read(&self, id: &ReplicantId) -> SyncResult<Option<Value>> {
        let response = self
            .transport
            .request(SyncMessage::ReadReplicant(ReadReplicant { id: id.clone() }))
            .await?;
        match response {
            SyncMessage::ReplicantRead(read) => Ok(read.value),
            SyncMessage::Error(e) => Err(SyncError::Server(e.message)),
            other => Err(SyncError::Protocol(format!(
                "expected replicantRead, got {other:?}"
            ))),
        }
    }

    // ── Mutation ─────────────────────────────────────────────────

    /// Overwrites the replicant's value wholesale.
    ///
    /// Applies optimistically, then confirms with the authority; a
    /// rejection restores the previous value.
    pub async fn assign(&self, id: &ReplicantId, value: Value) -> SyncResult<Revision> {
        let mirror = self.require(id).await?;
        let mut guard = mirror.lock().await;
        if guard.state == MirrorState::Resyncing {
            return Err(SyncError::Resyncing(id.clone()));
        }

        let old = guard.tracked.value().clone();
        guard.tracked.overwrite(value.clone());

        let response = self
            .transport
            .request(SyncMessage::AssignReplicant(AssignReplicant {
                id: id.clone(),
                value: value.clone(),
            }))
            .await;

        let ack = match response {
            Ok(SyncMessage::ReplicantAssigned(ack)) => ack,
            Ok(other) => {
                guard.tracked.overwrite(old);
                return Err(self.fail_and_unlock(id, guard, other).await);
            }
            Err(e) => {
                guard.tracked.overwrite(old);
                return Err(e);
            }
        };

        self.commit_ack(id, guard, old, value, ack.revision).await;
        Ok(ack.revision)
    }

    /// Edits the mirror through its tracked value and sends the recorded
    /// batch to the authority as one atomic change.
    ///
    /// The edit applies optimistically; the acknowledgement only advances
    /// the revision. A rejection runs the batch backwards, restoring the
    /// pre-edit value exactly (a schema mismatch additionally triggers a
    /// full resync).
    pub async fn mutate<F>(&self, id: &ReplicantId, edit: F) -> SyncResult<Revision>
    where
        F: FnOnce(&mut TrackedValue) -> OpResult<()>,
    {
        let mirror = self.require(id).await?;
        let mut guard = mirror.lock().await;
        if guard.state == MirrorState::Resyncing {
            return Err(SyncError::Resyncing(id.clone()));
        }

        let edit_result = edit(&mut guard.tracked);
        let operations = guard.tracked.take_batch();
        if let Err(e) = edit_result {
            // The closure may have recorded edits before failing; undo them.
            let restored = rewind(guard.tracked.value(), &operations)?;
            guard.tracked.overwrite(restored);
            return Err(e.into());
        }
        if operations.is_empty() {
            return Ok(guard.revision);
        }

        let old = rewind(guard.tracked.value(), &operations)?;
        let response = self
            .transport
            .request(SyncMessage::ChangeReplicant(ChangeReplicant {
                id: id.clone(),
                revision: guard.revision,
                schema_sum: guard.schema_sum.clone(),
                operations,
            }))
            .await;

        let ack = match response {
            Ok(SyncMessage::ReplicantChanged(ack)) => ack,
            Ok(other) => {
                guard.tracked.overwrite(old);
                return Err(self.fail_and_unlock(id, guard, other).await);
            }
            Err(e) => {
                guard.tracked.overwrite(old);
                return Err(e);
            }
        };

        let new_value = guard.tracked.value().clone();
        self.commit_ack(id, guard, old, new_value, ack.revision).await;
        Ok(ack.revision)
    }

    // ── Listeners ────────────────────────────────────────────────

    /// Attaches a listener called after every committed change to this
    /// mirror, local or remote.
    pub async fn on_change<F>(&self, id: &ReplicantId, listener: F) -> SyncResult<ListenerId>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let mirror = self.require(id).await?;
        let mut guard = mirror.lock().await;
        let listener_id = ListenerId(guard.next_listener);
        guard.next_listener += 1;
        guard.listeners.insert(listener_id, Arc::new(listener));
        Ok(listener_id)
    }

    /// Detaches a listener. Unknown IDs are ignored.
    pub async fn off_change(&self, id: &ReplicantId, listener_id: ListenerId) {
        if let Some(mirror) = self.mirror(id).await {
            mirror.lock().await.listeners.remove(&listener_id);
        }
    }

    // ── Broadcast pump ───────────────────────────────────────────

    /// Receives room broadcasts and applies them to the mirrors. Runs
    /// until the connection closes.
    pub async fn run(&self) {
        while let Some(message) = self.transport.recv_broadcast().await {
            match message {
                SyncMessage::ReplicantAssigned(ReplicantAssigned {
                    id,
                    value,
                    revision,
                }) => {
                    self.on_remote(&id, revision, move |mirror| {
                        mirror.tracked.overwrite(value);
                        Ok(())
                    })
                    .await;
                }
                SyncMessage::ReplicantChanged(ReplicantChanged {
                    id,
                    revision,
                    operations,
                }) => {
                    self.on_remote(&id, revision, move |mirror| {
                        mirror.tracked.apply_remote(&operations)
                    })
                    .await;
                }
                other => debug!("ignoring broadcast {other:?}"),
            }
        }
        info!("connection closed, broadcast pump stopping");
    }

    /// Applies one remote commit to its mirror, honoring revision order:
    /// duplicates and stale revisions are ignored, the direct successor is
    /// applied, anything further ahead is a gap and forces a resync.
    async fn on_remote<F>(&self, id: &ReplicantId, revision: Revision, apply: F)
    where
        F: FnOnce(&mut Mirror) -> OpResult<()>,
    {
        let Some(mirror) = self.mirror(id).await else {
            // Broadcast for a replicant this client never declared.
            return;
        };
        let mut guard = mirror.lock().await;

        if revision <= guard.revision {
            debug!(
                "ignoring stale broadcast for {id} (revision {revision}, mirror at {})",
                guard.revision
            );
            return;
        }
        if !revision.follows(guard.revision) {
            warn!(
                "revision gap on {id} (broadcast {revision}, mirror at {}), resyncing",
                guard.revision
            );
            let resynced = self.resync(id, &mut guard).await;
            let listeners = guard.listeners();
            drop(guard);
            fire(&listeners, resynced);
            return;
        }

        let old = guard.tracked.value().clone();
        if let Err(e) = apply(&mut guard) {
            warn!("mirror for {id} diverged ({e}), resyncing");
            let resynced = self.resync(id, &mut guard).await;
            let listeners = guard.listeners();
            drop(guard);
            fire(&listeners, resynced);
            return;
        }
        guard.revision = revision;
        // A cleanly applied successor means the mirror has caught up, even
        // if an earlier resync declaration failed.
        guard.state = MirrorState::Synced;
        let new_value = guard.tracked.value().clone();
        let listeners = guard.listeners();
        drop(guard);
        fire(
            &listeners,
            Some(ChangeEvent {
                id: id.clone(),
                old_value: old,
                new_value,
                revision,
            }),
        );
    }

    // ── Internals ────────────────────────────────────────────────

    /// Records an acknowledged commit and notifies listeners.
    ///
    /// If the committed revision is not the mirror's direct successor,
    /// other clients committed while this change was in flight and the
    /// optimistic value is missing their edits — resync instead of
    /// pretending the mirror is current.
    async fn commit_ack(
        &self,
        id: &ReplicantId,
        mut guard: tokio::sync::MutexGuard<'_, Mirror>,
        old_value: Value,
        new_value: Value,
        revision: Revision,
    ) {
        if !revision.follows(guard.revision) {
            debug!(
                "ack for {id} jumped from {} to {revision}, resyncing past concurrent commits",
                guard.revision
            );
            let resynced = self.resync(id, &mut guard).await;
            let listeners = guard.listeners();
            drop(guard);
            fire(&listeners, resynced);
            return;
        }

        guard.revision = revision;
        let listeners = guard.listeners();
        drop(guard);
        fire(
            &listeners,
            Some(ChangeEvent {
                id: id.clone(),
                old_value,
                new_value,
                revision,
            }),
        );
    }

    /// Re-declares the replicant and installs the fresh authoritative
    /// snapshot, abandoning whatever the mirror held. Returns the change
    /// to announce, for the caller to fire once the lock is released.
    async fn resync(&self, id: &ReplicantId, guard: &mut Mirror) -> Option<ChangeEvent> {
        guard.state = MirrorState::Resyncing;
        let declare = guard.declare.clone();
        let response = self
            .transport
            .request(SyncMessage::DeclareReplicant(declare))
            .await;
        let declared = match response.and_then(|msg| expect_declared(id, msg)) {
            Ok(declared) => declared,
            Err(e) => {
                // Stay in Resyncing; the next broadcast retries.
                warn!("resync of {id} failed: {e}");
                return None;
            }
        };

        let old = guard.tracked.value().clone();
        guard.install(&declared);
        info!("resynced {id} to revision {}", declared.revision);
        if old == declared.value {
            return None;
        }
        Some(ChangeEvent {
            id: id.clone(),
            old_value: old,
            new_value: declared.value,
            revision: declared.revision,
        })
    }

    /// Turns a non-ack response into the error to surface, resyncing
    /// first if the authority reported a schema mismatch. Consumes the
    /// guard so resync listeners fire unlocked.
    async fn fail_and_unlock(
        &self,
        id: &ReplicantId,
        mut guard: tokio::sync::MutexGuard<'_, Mirror>,
        response: SyncMessage,
    ) -> SyncError {
        match response {
            SyncMessage::ChangeRejected(rejected) => {
                if matches!(rejected.reason, RejectReason::SchemaMismatch { .. }) {
                    let resynced = self.resync(id, &mut guard).await;
                    let listeners = guard.listeners();
                    drop(guard);
                    fire(&listeners, resynced);
                }
                SyncError::Rejected {
                    id: id.clone(),
                    reason: rejected.reason,
                }
            }
            SyncMessage::Error(e) => SyncError::Server(e.message),
            other => SyncError::Protocol(format!("expected acknowledgement, got {other:?}")),
        }
    }

    async fn mirror(&self, id: &ReplicantId) -> Option<Arc<Mutex<Mirror>>> {
        self.mirrors.read().await.get(id).cloned()
    }

    async fn require(&self, id: &ReplicantId) -> SyncResult<Arc<Mutex<Mirror>>> {
        self.mirror(id)
            .await
            .ok_or_else(|| SyncError::NotDeclared(id.clone()))
    }
}

fn expect_declared(id: &ReplicantId, response: SyncMessage) -> SyncResult<ReplicantDeclared> {
    match response {
        SyncMessage::ReplicantDeclared(declared) => Ok(declared),
        SyncMessage::ChangeRejected(rejected) => Err(SyncError::Rejected {
            id: id.clone(),
            reason: rejected.reason,
        }),
        SyncMessage::Error(e) => Err(SyncError::Server(e.message)),
        other => Err(SyncError::Protocol(format!(
            "expected replicantDeclared, got {other:?}"
        ))),
    }
}

fn fire(listeners: &[ChangeListener], event: Option<ChangeEvent>) {
    let Some(event) = event else { return };
    for listener in listeners {
        listener(&event);
    }
}
