//! Async entry point for the request layer
//!
//! `ParameterEngine` checks access, then submits the operation to the
//! worker pool as a single job. One job is one transaction.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::access::{AccessGate, Activity, Principal, MODULE};
use crate::config::Config;
use crate::db::models::{
    BindingValue, CatalogView, CreateValueInput, CreatedValue, PagedValues, PropertyTemplate,
    Status, ValueQuery,
};
use crate::db::ParamDb;
use crate::error::{ErrorBody, ParamError, Result};
use crate::services::{EventBus, Services, TakeOutcome};
use crate::translate::TranslationCache;
use crate::worker::{PoolConfig, WorkerPool};

pub struct ParameterEngine {
    services: Arc<Services>,
    pool: WorkerPool,
    gate: Arc<dyn AccessGate>,
    translations: TranslationCache,
}

impl ParameterEngine {
    /// Open the configured database and start the pool
    pub fn from_config(config: &Config, gate: Arc<dyn AccessGate>) -> Result<Self> {
        let db = Arc::new(ParamDb::from_config(config)?);
        Ok(Self::new(db, config, gate))
    }

    /// Must be called inside a tokio runtime
    pub fn new(db: Arc<ParamDb>, config: &Config, gate: Arc<dyn AccessGate>) -> Self {
        Self {
            services: Arc::new(Services::new(Arc::clone(&db))),
            pool: WorkerPool::new(PoolConfig::from(config)),
            gate,
            translations: TranslationCache::new(db, config.default_language.clone()),
        }
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.services.events)
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn translations(&self) -> &TranslationCache {
        &self.translations
    }

    /// Fail with `AccessDenied` unless the principal may perform `activity`
    pub async fn authorize(&self, principal: &Principal, activity: Activity) -> Result<()> {
        let allowed = self
            .gate
            .has_access(&principal.user_id, &principal.role_id, MODULE, activity)
            .await?;
        if !allowed {
            warn!(user = %principal.user_id, role = %principal.role_id, %activity, "Access denied");
            return Err(ParamError::AccessDenied(format!(
                "{} may not {} in {}",
                principal.user_id, activity, MODULE
            )));
        }
        debug!(user = %principal.user_id, %activity, "Access granted");
        Ok(())
    }

    /// Error body with its message localized
    pub fn error_body(&self, error: &ParamError, language: &str) -> ErrorBody {
        self.translations.localize(&error.to_body(), language)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_catalog(&self, principal: &Principal, hierarchy_id: i64) -> Result<CatalogView> {
        self.authorize(principal, Activity::Request).await?;
        let catalog = Arc::clone(&self.services.catalog);
        self.pool.run("get_catalog", move || catalog.get_catalog(hierarchy_id)).await
    }

    pub async fn get_template(
        &self,
        principal: &Principal,
        hierarchy_id: i64,
        parameter_id: i64,
    ) -> Result<Vec<PropertyTemplate>> {
        self.authorize(principal, Activity::Request).await?;
        let catalog = Arc::clone(&self.services.catalog);
        self.pool
            .run("get_template", move || catalog.get_template(hierarchy_id, parameter_id))
            .await
    }

    pub async fn list_values(&self, principal: &Principal, query: ValueQuery) -> Result<PagedValues> {
        self.authorize(principal, Activity::Request).await?;
        let catalog = Arc::clone(&self.services.catalog);
        self.pool.run("list_values", move || catalog.list_values(&query)).await
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub async fn create_value(&self, principal: &Principal, input: CreateValueInput) -> Result<CreatedValue> {
        self.authorize(principal, Activity::CreateProp).await?;
        let bindings = Arc::clone(&self.services.bindings);
        self.pool.run("create_value", move || bindings.create_value(input)).await
    }

    pub async fn update_value_status(
        &self,
        principal: &Principal,
        value_id: i64,
        status: Status,
    ) -> Result<BindingValue> {
        self.authorize(principal, Activity::DisableProp).await?;
        let bindings = Arc::clone(&self.services.bindings);
        self.pool
            .run("update_value_status", move || bindings.update_value_status(value_id, status))
            .await
    }

    pub async fn delete_value(&self, principal: &Principal, value_id: i64) -> Result<()> {
        self.authorize(principal, Activity::DeleteProp).await?;
        let bindings = Arc::clone(&self.services.bindings);
        self.pool.run("delete_value", move || bindings.delete_value(value_id)).await
    }

    pub async fn set_binding_status(
        &self,
        principal: &Principal,
        hierarchy_id: i64,
        parameter_id: i64,
        property_id: i64,
        status: Status,
    ) -> Result<CatalogView> {
        self.authorize(principal, Activity::Disable).await?;
        let bindings = Arc::clone(&self.services.bindings);
        self.pool
            .run("set_binding_status", move || {
                bindings.set_binding_status(hierarchy_id, parameter_id, property_id, status)
            })
            .await
    }

    pub async fn spread(&self, principal: &Principal, hierarchy_id: i64, parameter_id: Option<i64>) -> Result<i64> {
        self.authorize(principal, Activity::Propagate).await?;
        let propagation = Arc::clone(&self.services.propagation);
        self.pool
            .run("spread", move || propagation.spread(hierarchy_id, parameter_id))
            .await
    }

    pub async fn take(
        &self,
        principal: &Principal,
        hierarchy_id: i64,
        parameter_id: Option<i64>,
    ) -> Result<TakeOutcome> {
        self.authorize(principal, Activity::Propagate).await?;
        let propagation = Arc::clone(&self.services.propagation);
        self.pool
            .run("take", move || propagation.take(hierarchy_id, parameter_id))
            .await
    }
}
