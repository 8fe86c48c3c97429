//! The authoritative store — owns every replicant in the process.

use crate::adapter::PersistenceAdapter;
use crate::error::{StoreError, StoreResult};
use crate::persist::Persistor;
use crate::replicant::{DeclareOptions, ReplicantEntry, ReplicantSnapshot};
use replicant_schema::{compile, describe_violations, CompiledSchema};
use replicant_tracker::apply_batch;
use replicant_types::{ClientId, Operation, ReplicantId, Revision, SchemaSum};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

/// A committed change, published on the store's local bus in commit order.
///
/// `origin` names the network client whose request caused the commit, if
/// any, so the sync layer can exclude it from the room broadcast (it gets
/// the committed revision in its acknowledgement instead). Same-process
/// subscribers receive every event regardless of origin.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A full overwrite was committed.
    Assigned {
        id: ReplicantId,
        value: Value,
        revision: Revision,
        origin: Option<ClientId>,
    },
    /// An operation batch was committed.
    Changed {
        id: ReplicantId,
        revision: Revision,
        operations: Vec<Operation>,
        origin: Option<ClientId>,
    },
}

impl StoreEvent {
    /// The replicant this event is about.
    #[must_use]
    pub fn id(&self) -> &ReplicantId {
        match self {
            StoreEvent::Assigned { id, .. } | StoreEvent::Changed { id, .. } => id,
        }
    }

    /// The revision this event committed.
    #[must_use]
    pub fn revision(&self) -> Revision {
        match self {
            StoreEvent::Assigned { revision, .. } | StoreEvent::Changed { revision, .. } => {
                *revision
            }
        }
    }
}

/// The authoritative map of replicants.
///
/// An explicit instance, injected into every consumer — multiple isolated
/// stores can coexist (one per test, for instance). Cloning is cheap and
/// clones share the same state.
#[derive(Clone)]
pub struct ReplicantStore {
    replicants: Arc<RwLock<HashMap<ReplicantId, Arc<Mutex<ReplicantEntry>>>>>,
    adapter: Arc<dyn PersistenceAdapter>,
    events: broadcast::Sender<StoreEvent>,
    persistor: Persistor,
}

impl ReplicantStore {
    /// Creates a store persisting through the given adapter.
    pub fn new(adapter: Arc<dyn PersistenceAdapter>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            replicants: Arc::new(RwLock::new(HashMap::new())),
            persistor: Persistor::new(adapter.clone()),
            adapter,
            events,
        }
    }

    /// Subscribes to committed changes, in commit order.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    // ── Declaration ──────────────────────────────────────────────

    /// Declares a replicant, creating it on first declaration.
    ///
    /// Idempotent: if the replicant already exists the options are ignored
    /// and the current snapshot is returned. On creation the value is, in
    /// order of preference: a persisted value that validates; the caller's
    /// `default_value` (an invalid one fails loudly); the schema-generated
    /// default; `null`. Invalid persisted values are discarded with a
    /// warning.
    pub async fn declare(
        &self,
        id: ReplicantId,
        opts: DeclareOptions,
    ) -> StoreResult<ReplicantSnapshot> {
        if let Some(existing) = self.entry(&id).await {
            debug!("replicant {id} already declared, ignoring options");
            return Ok(existing.lock().await.snapshot(&id));
        }

        let schema = match &opts.schema {
            Some(doc) => Some(compile(doc).map_err(|source| StoreError::SchemaCompile {
                id: id.clone(),
                source,
            })?),
            None => None,
        };
        let value = self.initial_value(&id, schema.as_ref(), &opts).await?;

        let fresh = ReplicantEntry {
            value,
            revision: Revision::ZERO,
            schema,
            persistent: opts.persistent,
            persistence_interval: opts.persistence_interval,
        };

        let mut map = self.replicants.write().await;
        // A concurrent declare may have created it first; first wins.
        let entry = map
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(fresh)))
            .clone();
        drop(map);

        let snapshot = entry.lock().await.snapshot(&id);
        info!("declared replicant {id} at revision {}", snapshot.revision);
        Ok(snapshot)
    }

    async fn initial_value(
        &self,
        id: &ReplicantId,
        schema: Option<&CompiledSchema>,
        opts: &DeclareOptions,
    ) -> StoreResult<Value> {
        if opts.persistent {
            match self.adapter.load(id).await {
                Ok(Some(persisted)) => match schema {
                    None => return Ok(persisted),
                    Some(schema) => match schema.validate(&persisted) {
                        Ok(()) => return Ok(persisted),
                        Err(violations) => warn!(
                            "discarding persisted value for {id}: {}",
                            describe_violations(&violations)
                        ),
                    },
                },
                Ok(None) => {}
                Err(e) => warn!("failed to load persisted value for {id}: {e}"),
            }
        }

        if let Some(default) = &opts.default_value {
            if let Some(schema) = schema {
                schema
                    .validate(default)
                    .map_err(|violations| StoreError::InvalidDefault {
                        id: id.clone(),
                        violations,
                    })?;
            }
            return Ok(default.clone());
        }

        Ok(schema
            .map(CompiledSchema::generate_default)
            .unwrap_or(Value::Null))
    }

    // ── Mutation ─────────────────────────────────────────────────

    /// Fully overwrites a replicant's value from local (non-network) code.
    pub async fn assign(&self, id: &ReplicantId, value: Value) -> StoreResult<Revision> {
        self.assign_by(id, value, None).await
    }

    /// Fully overwrites a replicant's value on behalf of a network client.
    ///
    /// Validates before committing; an invalid value rejects the call with
    /// every violated path and leaves value and revision untouched.
    pub async fn assign_by(
        &self,
        id: &ReplicantId,
        value: Value,
        origin: Option<ClientId>,
    ) -> StoreResult<Revision> {
        let entry = self
            .entry(id)
            .await
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut entry = entry.lock().await;

        if let Some(schema) = &entry.schema {
            schema
                .validate(&value)
                .map_err(|violations| StoreError::InvalidValue {
                    id: id.clone(),
                    violations,
                })?;
        }

        entry.value = value.clone();
        entry.revision = entry.revision.next();
        let revision = entry.revision;
        debug!("assigned replicant {id}, now at revision {revision}");

        self.publish(StoreEvent::Assigned {
            id: id.clone(),
            value,
            revision,
            origin,
        });
        self.schedule_persist(id, &entry).await;
        Ok(revision)
    }

    /// Applies an operation batch from local (non-network) code.
    pub async fn apply_operations(
        &self,
        id: &ReplicantId,
        schema_sum: Option<SchemaSum>,
        operations: Vec<Operation>,
    ) -> StoreResult<Revision> {
        self.apply_operations_by(id, schema_sum, operations, None)
            .await
    }

    /// Applies an operation batch on behalf of a network client.
    ///
    /// The batch is atomic: a stale `schema_sum` rejects it whole, the
    /// operations apply in order to a working copy, and the *result* is
    /// validated once. Any rejection leaves value and revision untouched.
    pub async fn apply_operations_by(
        &self,
        id: &ReplicantId,
        schema_sum: Option<SchemaSum>,
        operations: Vec<Operation>,
        origin: Option<ClientId>,
    ) -> StoreResult<Revision> {
        let entry = self
            .entry(id)
            .await
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut entry = entry.lock().await;

        let current = entry.schema_sum();
        if current != schema_sum {
            return Err(StoreError::SchemaMismatch {
                id: id.clone(),
                current,
                client: schema_sum,
            });
        }

        let mut working = entry.value.clone();
        apply_batch(&mut working, &operations).map_err(|source| StoreError::Operation {
            id: id.clone(),
            source,
        })?;

        if let Some(schema) = &entry.schema {
            schema
                .validate(&working)
                .map_err(|violations| StoreError::InvalidValue {
                    id: id.clone(),
                    violations,
                })?;
        }

        entry.value = working;
        entry.revision = entry.revision.next();
        let revision = entry.revision;
        debug!(
            "applied {} operation(s) to replicant {id}, now at revision {revision}",
            operations.len()
        );

        self.publish(StoreEvent::Changed {
            id: id.clone(),
            revision,
            operations,
            origin,
        });
        self.schedule_persist(id, &entry).await;
        Ok(revision)
    }

    // ── Queries ──────────────────────────────────────────────────

    /// The current value of a replicant, without creating a subscription.
    pub async fn read(&self, id: &ReplicantId) -> Option<Value> {
        let entry = self.entry(id).await?;
        let entry = entry.lock().await;
        Some(entry.value.clone())
    }

    /// The full current state of a replicant.
    pub async fn snapshot(&self, id: &ReplicantId) -> Option<ReplicantSnapshot> {
        let entry = self.entry(id).await?;
        let snapshot = entry.lock().await.snapshot(id);
        Some(snapshot)
    }

    /// Whether a replicant has been declared.
    pub async fn exists(&self, id: &ReplicantId) -> bool {
        self.replicants.read().await.contains_key(id)
    }

    /// Writes every pending persistence record immediately. Call on
    /// shutdown.
    pub async fn flush(&self) {
        self.persistor.flush().await;
    }

    // ── Internals ────────────────────────────────────────────────

    async fn entry(&self, id: &ReplicantId) -> Option<Arc<Mutex<ReplicantEntry>>> {
        self.replicants.read().await.get(id).cloned()
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn schedule_persist(&self, id: &ReplicantId, entry: &ReplicantEntry) {
        if entry.persistent {
            self.persistor
                .schedule(id.clone(), entry.value.clone(), entry.persistence_interval)
                .await;
        }
    }
}
