//! Lifecycle controller: create/get/delete for one resource kind.
//!
//! The controller sits between callers and a [`RecordStore`], invoking the
//! bound [`Provider`] for the physical side. A controller-wide lock covers
//! each whole operation, so duplicate-name checks cannot race with a
//! concurrent create of the same name.
//!
//! Lookups by name double as drift detection: when enabled, every record
//! found is checked against the provider and purged if the physical resource
//! is gone.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::audit::AuditLog;
use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::resources::{Resource, ResourceKind};
use crate::store::{Record, RecordStore, write_artifacts};

/// Resolves cross-resource references in a definition before it is
/// materialized, filling in whatever the referenced resources provide.
#[async_trait]
pub trait References<R: Resource>: Send + Sync {
    async fn resolve(&self, definition: R) -> Result<R>;
}

/// For kinds without references.
pub struct NoReferences;

#[async_trait]
impl<R: Resource> References<R> for NoReferences {
    async fn resolve(&self, definition: R) -> Result<R> {
        Ok(definition)
    }
}

pub struct LifecycleController<R: Resource> {
    store: RecordStore<R>,
    provider: Arc<dyn Provider<R>>,
    references: Arc<dyn References<R>>,
    audit: AuditLog,
    drift_detection: bool,
    lock: Mutex<()>,
}

impl<R: Resource> LifecycleController<R> {
    pub fn new(store: RecordStore<R>, provider: Arc<dyn Provider<R>>, audit: AuditLog) -> Self {
        Self {
            store,
            provider,
            references: Arc::new(NoReferences),
            audit,
            drift_detection: true,
            lock: Mutex::new(()),
        }
    }

    pub fn with_references(mut self, references: Arc<dyn References<R>>) -> Self {
        self.references = references;
        self
    }

    pub fn with_drift_detection(mut self, enabled: bool) -> Self {
        self.drift_detection = enabled;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        R::KIND
    }

    pub fn backend(&self) -> &'static str {
        self.provider.backend()
    }

    /// Validate, materialize and persist a new resource.
    ///
    /// If persisting fails after the provider succeeded, the physical
    /// resource is left without a record. Re-creating the same definition
    /// adopts it.
    pub async fn create(&self, definition: R) -> Result<Record<R>> {
        let _guard = self.lock.lock().await;
        self.create_locked(definition).await
    }

    /// Records named `name`, or every record when `name` is `None` or empty.
    /// An empty result is not an error.
    pub async fn get(&self, name: Option<&str>) -> Result<Vec<Record<R>>> {
        let _guard = self.lock.lock().await;
        match name {
            Some(name) if !name.is_empty() => self.lookup(name).await,
            _ => Ok(self.store.list().await),
        }
    }

    /// The record named `name`, or `NotFound`.
    pub async fn get_by_name(&self, name: &str) -> Result<Record<R>> {
        if name.is_empty() {
            return Err(Error::InvalidInput(format!("{} name is required", R::KIND)));
        }

        self.get(Some(name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("{} '{}'", R::KIND, name)))
    }

    /// Tear down the physical resource named `name`, then drop its record.
    ///
    /// A failed teardown keeps the record and surfaces the error.
    pub async fn delete(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidInput(format!("{} name is required", R::KIND)));
        }

        let _guard = self.lock.lock().await;
        let records = self.lookup(name).await?;
        if records.is_empty() {
            return Err(Error::NotFound(format!("{} '{}'", R::KIND, name)));
        }

        for record in records {
            self.remove(record).await?;
        }
        Ok(())
    }

    /// Delete-then-create under one lock hold. A missing predecessor is not
    /// an error.
    ///
    /// The replacement is validated and its references resolved before the
    /// predecessor is torn down, so a bad definition leaves it in place.
    pub async fn replace(&self, definition: R) -> Result<Record<R>> {
        definition.validate()?;

        let _guard = self.lock.lock().await;
        let resolved = self.references.resolve(definition).await?;
        for record in self.lookup(resolved.name()).await? {
            self.remove(record).await?;
        }
        self.persist_new(resolved).await
    }

    async fn create_locked(&self, definition: R) -> Result<Record<R>> {
        definition.validate()?;

        if !self.lookup(definition.name()).await?.is_empty() {
            return Err(Error::AlreadyExists(format!(
                "{} '{}'",
                R::KIND,
                definition.name()
            )));
        }

        let resolved = self.references.resolve(definition).await?;
        self.persist_new(resolved).await
    }

    /// Materialize a validated, resolved definition and record it.
    async fn persist_new(&self, resolved: R) -> Result<Record<R>> {
        let name = resolved.name().to_string();
        let realized = self.provider.materialize(&resolved).await?;

        let record = self.store.new_record(&name, realized).await?;
        write_artifacts(&record.config_path, &record.payload.artifacts(&record.id)).await?;
        self.store.add(&record.id, record.clone()).await?;

        info!(
            kind = %R::KIND,
            name = %record.name,
            id = %record.id,
            backend = self.backend(),
            "Resource created"
        );
        self.audit.created(&record.id, &record.name).await;

        Ok(record)
    }

    async fn remove(&self, record: Record<R>) -> Result<()> {
        self.provider.teardown(&record.payload).await?;
        self.store.delete(&record.id).await?;

        info!(kind = %R::KIND, name = %record.name, id = %record.id, "Resource deleted");
        self.audit.deleted(&record.id, &record.name).await;
        Ok(())
    }

    async fn lookup(&self, name: &str) -> Result<Vec<Record<R>>> {
        let found = self.store.list_filter_many("name", name).await?;
        self.repair(found).await
    }

    /// Drop records whose physical resource the provider reports gone.
    async fn repair(&self, records: Vec<Record<R>>) -> Result<Vec<Record<R>>> {
        if !self.drift_detection {
            return Ok(records);
        }

        let mut live = Vec::with_capacity(records.len());
        for record in records {
            match self.provider.exists(&record.payload).await {
                Ok(true) => live.push(record),
                Ok(false) => {
                    warn!(
                        kind = %R::KIND,
                        name = %record.name,
                        id = %record.id,
                        "Physical resource is gone, purging record"
                    );
                    match self.store.delete(&record.id).await {
                        Ok(()) | Err(Error::NotFound(_)) => {}
                        Err(e) => return Err(e),
                    }
                    self.audit.drift_purged(&record.id, &record.name).await;
                }
                Err(e) => {
                    warn!(
                        kind = %R::KIND,
                        name = %record.name,
                        error = %e,
                        "Existence check failed, keeping record"
                    );
                    live.push(record);
                }
            }
        }
        Ok(live)
    }
}
