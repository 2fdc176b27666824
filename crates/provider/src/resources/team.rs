//! Team Resource handler for Terraform

use corellium_common::{reconcile_by_key, Error as ApiError, Team};
use tracing::{info, warn};

use super::{Resource, Result};
use crate::context::ProviderContext;
use crate::diagnostics::{ApiResultExt, Diagnostics, ResourceError};
use crate::schema::{Attribute, Block};
use crate::state::{get_string_attr, make_state, string_value, Value};

pub struct TeamResource;

fn member_ids(value: &Value) -> Option<Vec<String>> {
    value.get("users")?.as_list().map(|users| {
        users
            .iter()
            .map(|u| get_string_attr(u, "id"))
            .collect()
    })
}

fn team_state(id: &str, label: &str, users: Option<Vec<String>>) -> Value {
    let users = match users {
        Some(ids) => Value::List(
            ids.into_iter()
                .map(|id| make_state(vec![("id", string_value(id))]))
                .collect(),
        ),
        None => Value::Null,
    };
    make_state(vec![
        ("id", string_value(id)),
        ("label", string_value(label)),
        ("users", users),
    ])
}

async fn sync_members(ctx: &ProviderContext, team: &str, current: &[String], desired: &[String]) -> Result<Vec<String>> {
    let client = &ctx.client;
    reconcile_by_key(
        current,
        desired,
        |id: &String| id.clone(),
        move |user| async move {
            client
                .remove_user_from_team(team, &user)
                .await
                .or_summary("Error removing user from team", "remove a user from the team")
        },
        move |user| async move {
            client
                .add_user_to_team(team, &user)
                .await
                .or_summary("Error adding user to team", "add a user to the team")?;
            Ok::<_, ResourceError>(user)
        },
    )
    .await
}

#[async_trait::async_trait]
impl Resource for TeamResource {
    fn type_name(&self) -> &'static str {
        "corellium_v1team"
    }

    fn schema(&self) -> Block {
        Block::new(
            "A team of users that can be granted project roles together.",
            vec![
                Attribute::string("id").computed().use_state_for_unknown(),
                Attribute::string("label").required(),
                Attribute::list_nested("users", vec![Attribute::string("id").required()]).optional(),
            ],
        )
    }

    async fn create(&self, ctx: &ProviderContext, planned: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let label = get_string_attr(planned, "label");

        let teams = ctx
            .client
            .list_teams()
            .await
            .or_summary("Error creating team", "list the teams")?;
        if teams.iter().any(|t| t.label == label) {
            return Err(ResourceError::from_api(
                "Error creating team",
                "create the team",
                &ApiError::already_exists("team", "label", &label),
            ));
        }

        let team = ctx
            .client
            .create_team(&label)
            .await
            .or_summary("Error creating team", "create a team")?;
        info!("Created team {} ({})", team.label, team.id);

        let desired = member_ids(planned);
        let users = match sync_members(ctx, &team.id, &[], desired.as_deref().unwrap_or(&[])).await {
            Ok(users) => users,
            Err(err) => {
                // Leave nothing half-created behind
                if let Err(cleanup) = ctx.client.delete_team(&team.id).await {
                    warn!("Failed to delete team {} after error: {}", team.id, cleanup);
                    return Err(err.with_partial_state(team_state(&team.id, &label, None)));
                }
                return Err(err);
            }
        };

        Ok(team_state(&team.id, &label, desired.map(|_| users)))
    }

    async fn read(&self, ctx: &ProviderContext, state: &Value, _diags: &mut Diagnostics) -> Result<Option<Value>> {
        let id = get_string_attr(state, "id");
        let team: Team = match ctx.client.find_team(&id).await {
            Ok(team) => team,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(ResourceError::from_api("Error reading team", "read the team", &e)),
        };

        // Recorded order first, then members added outside Terraform
        let users = member_ids(state).map(|recorded| {
            let mut users: Vec<String> = recorded
                .into_iter()
                .filter(|id| team.users.iter().any(|u| &u.id == id))
                .collect();
            for member in &team.users {
                if !users.contains(&member.id) {
                    users.push(member.id.clone());
                }
            }
            users
        });

        Ok(Some(team_state(&team.id, &team.label, users)))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: &Value,
        planned: &Value,
        _diags: &mut Diagnostics,
    ) -> Result<Value> {
        let id = get_string_attr(prior, "id");
        let label = get_string_attr(planned, "label");

        if get_string_attr(prior, "label") != label {
            ctx.client
                .update_team(&id, &label)
                .await
                .or_summary("Error updating team", "update the team")?;
        }

        let desired = member_ids(planned);
        let users = sync_members(
            ctx,
            &id,
            &member_ids(prior).unwrap_or_default(),
            desired.as_deref().unwrap_or(&[]),
        )
        .await?;

        Ok(team_state(&id, &label, desired.map(|_| users)))
    }

    async fn delete(&self, ctx: &ProviderContext, state: &Value, _diags: &mut Diagnostics) -> Result<()> {
        let id = get_string_attr(state, "id");
        match ctx.client.delete_team(&id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(ResourceError::from_api("Error deleting team", "delete the team", &e)),
        }
    }
}
