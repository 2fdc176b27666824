//! Data Source Implementations
//!
//! Read-only fetches. Every read gets a fresh random id, as the API objects
//! listed here have no identity of their own.

pub mod instances;
pub mod model_software;
pub mod projects;
pub mod ready;
pub mod roles;
pub mod supported_models;

use std::sync::Arc;

use crate::context::ProviderContext;
use crate::diagnostics::Diagnostics;
use crate::resources::Result;
use crate::schema::Block;
use crate::state::{string_value, Value};

/// Trait for data source reads
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Block;

    /// Fetch the data source's state from its configuration
    async fn read(&self, ctx: &ProviderContext, config: &Value, diags: &mut Diagnostics) -> Result<Value>;
}

/// Every data source the provider serves
pub fn all() -> Vec<Arc<dyn DataSource>> {
    vec![
        Arc::new(ready::ReadyDataSource),
        Arc::new(instances::InstancesDataSource),
        Arc::new(projects::ProjectsDataSource),
        Arc::new(roles::RolesDataSource),
        Arc::new(supported_models::SupportedModelsDataSource),
        Arc::new(model_software::ModelSoftwareDataSource),
    ]
}

pub(crate) fn random_id() -> Value {
    string_value(uuid::Uuid::new_v4().to_string())
}
