//! Resource Implementations
//!
//! Implements the CRUD operations for each resource type.

pub mod image;
pub mod instance;
pub mod project;
pub mod snapshot;
pub mod team;
pub mod user;
pub mod webplayer;

use std::sync::Arc;

use crate::context::ProviderContext;
use crate::diagnostics::{Diagnostics, ResourceError};
use crate::schema::Block;
use crate::state::{make_state, string_value, Value};

pub type Result<T> = std::result::Result<T, ResourceError>;

/// Trait for resource operations
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    /// Resource type name
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Block;

    /// Checks that need only the configuration
    fn validate(&self, _config: &Value, _diags: &mut Diagnostics) {}

    /// Create a new resource from its planned state
    async fn create(&self, ctx: &ProviderContext, planned: &Value, diags: &mut Diagnostics) -> Result<Value>;

    /// Read an existing resource; `None` when it no longer exists
    async fn read(&self, ctx: &ProviderContext, state: &Value, diags: &mut Diagnostics) -> Result<Option<Value>>;

    /// Update an existing resource
    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: &Value,
        planned: &Value,
        diags: &mut Diagnostics,
    ) -> Result<Value>;

    /// Delete a resource
    async fn delete(&self, ctx: &ProviderContext, state: &Value, diags: &mut Diagnostics) -> Result<()>;

    /// State handed to `read` when importing by id
    fn import_state(&self, id: &str) -> Value {
        make_state(vec![("id", string_value(id))])
    }
}

/// Every resource the provider serves
pub fn all() -> Vec<Arc<dyn Resource>> {
    vec![
        Arc::new(project::ProjectResource),
        Arc::new(instance::InstanceResource),
        Arc::new(image::ImageResource),
        Arc::new(team::TeamResource),
        Arc::new(user::UserResource),
        Arc::new(snapshot::SnapshotResource),
        Arc::new(webplayer::WebPlayerResource),
    ]
}

/// Current time in the RFC 3339 form stored in state
pub(crate) fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
