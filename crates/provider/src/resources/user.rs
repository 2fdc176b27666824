//! User Resource handler for Terraform

use corellium_common::{User, UserRequest};
use tracing::info;

use super::{Resource, Result};
use crate::context::ProviderContext;
use crate::diagnostics::{ApiResultExt, Diagnostics, ResourceError};
use crate::schema::{Attribute, Block};
use crate::state::{get_bool_attr, get_optional_string_attr, get_string_attr, Value};

pub struct UserResource;

fn user_request(value: &Value) -> UserRequest {
    UserRequest {
        label: get_string_attr(value, "label"),
        name: get_string_attr(value, "name"),
        email: get_string_attr(value, "email"),
        password: get_optional_string_attr(value, "password"),
        administrator: get_bool_attr(value, "administrator", false),
    }
}

/// The password is write-only; it stays whatever the configuration says.
fn user_state(id: &str, user: &User, config: &Value) -> Value {
    let mut state = config.clone();
    state.set("id", Value::String(id.to_string()));
    state.set("name", Value::String(user.name.clone()));
    state.set("label", Value::String(user.label.clone()));
    state.set("email", Value::String(user.email.clone()));
    if let Some(admin) = user.administrator {
        state.set("administrator", Value::Bool(admin));
    }
    state
}

#[async_trait::async_trait]
impl Resource for UserResource {
    fn type_name(&self) -> &'static str {
        "corellium_v1user"
    }

    fn schema(&self) -> Block {
        Block::new(
            "A user account in the enterprise domain.",
            vec![
                Attribute::string("id").computed().use_state_for_unknown(),
                Attribute::string("name").required().describe("Login name."),
                Attribute::string("label").required().describe("Display name."),
                Attribute::string("email").required(),
                Attribute::string("password").optional().sensitive(),
                Attribute::bool("administrator").required(),
            ],
        )
    }

    async fn create(&self, ctx: &ProviderContext, planned: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let request = user_request(planned);
        let created = ctx
            .client
            .create_user(&request)
            .await
            .or_summary("Error creating user", "create a user")?;
        info!("Created user {} ({})", request.name, created.id);

        let user = User {
            id: created.id.clone(),
            label: request.label,
            name: request.name,
            email: request.email,
            administrator: Some(request.administrator),
        };
        Ok(user_state(&created.id, &user, planned))
    }

    async fn read(&self, ctx: &ProviderContext, state: &Value, _diags: &mut Diagnostics) -> Result<Option<Value>> {
        let id = get_string_attr(state, "id");
        let users = ctx
            .client
            .all_users()
            .await
            .or_summary("Error reading user", "list the users")?;

        Ok(users
            .iter()
            .find(|u| u.id == id)
            .map(|user| user_state(&id, user, state)))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: &Value,
        planned: &Value,
        _diags: &mut Diagnostics,
    ) -> Result<Value> {
        let id = get_string_attr(prior, "id");
        let request = user_request(planned);
        ctx.client
            .update_user(&id, &request)
            .await
            .or_summary("Error updating user", "update the user")?;

        let user = User {
            id: id.clone(),
            label: request.label,
            name: request.name,
            email: request.email,
            administrator: Some(request.administrator),
        };
        Ok(user_state(&id, &user, planned))
    }

    async fn delete(&self, ctx: &ProviderContext, state: &Value, _diags: &mut Diagnostics) -> Result<()> {
        let id = get_string_attr(state, "id");
        match ctx.client.delete_user(&id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(ResourceError::from_api("Error deleting user", "delete the user", &e)),
        }
    }
}
