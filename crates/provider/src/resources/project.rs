//! Project Resource handler for Terraform
//!
//! A project owns quotas and settings plus three child collections managed
//! through separate endpoints: user roles, team roles and access keys.

use corellium_common::{
    diff_by_key, reconcile_by_key, Error as ApiError, Project, ProjectKeyRequest, ProjectQuota,
    ProjectRequest, ProjectSettings,
};
use tracing::info;

use super::{timestamp_now, Resource, Result};
use crate::context::ProviderContext;
use crate::diagnostics::{ApiResultExt, Diagnostics, ResourceError};
use crate::schema::{Attribute, Block};
use crate::state::{
    bool_value, float_value, get_bool_attr, get_float_attr, get_list_attr, get_optional_string_attr,
    get_string_attr, make_state, opt_float_value, opt_string_value, string_value, Value,
};

pub const KEY_KINDS: &[&str] = &["ssh", "adb"];

pub struct ProjectResource;

#[derive(Debug, Clone, PartialEq)]
struct ProjectUser {
    id: String,
    role: String,
    name: Option<String>,
    label: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct ProjectTeam {
    id: String,
    role: String,
    label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct AccessKey {
    id: Option<String>,
    label: String,
    kind: String,
    key: String,
    fingerprint: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

fn user_key(u: &ProjectUser) -> (String, String) {
    (u.id.clone(), u.role.clone())
}

fn team_key(t: &ProjectTeam) -> (String, String) {
    (t.id.clone(), t.role.clone())
}

fn key_identity(k: &AccessKey) -> (String, String, String) {
    (k.kind.clone(), k.key.clone(), k.label.clone())
}

#[async_trait::async_trait]
impl Resource for ProjectResource {
    fn type_name(&self) -> &'static str {
        "corellium_v1project"
    }

    fn schema(&self) -> Block {
        Block::new(
            "A Corellium project with its quotas, members and access keys.",
            vec![
                Attribute::string("id").computed().use_state_for_unknown(),
                Attribute::string("name").required(),
                Attribute::single_nested(
                    "settings",
                    vec![
                        Attribute::number("version").required(),
                        Attribute::bool("internet_access").required(),
                        Attribute::bool("dhcp").required(),
                    ],
                )
                .required(),
                Attribute::single_nested(
                    "quotas",
                    vec![
                        Attribute::number("cores").required(),
                        Attribute::number("instances").computed(),
                        Attribute::number("ram").computed(),
                    ],
                )
                .required(),
                Attribute::list_nested(
                    "users",
                    vec![
                        Attribute::string("id").required(),
                        Attribute::string("name").computed(),
                        Attribute::string("label").computed(),
                        Attribute::string("email").computed(),
                        Attribute::string("role").required(),
                    ],
                )
                .optional(),
                Attribute::list_nested(
                    "teams",
                    vec![
                        Attribute::string("id").required(),
                        Attribute::string("label").computed(),
                        Attribute::string("role").required(),
                    ],
                )
                .optional(),
                Attribute::list_nested(
                    "keys",
                    vec![
                        Attribute::string("id").computed(),
                        Attribute::string("label").required(),
                        Attribute::string("kind")
                            .required()
                            .describe("Key type, ssh or adb."),
                        Attribute::string("key").required(),
                        Attribute::string("fingerprint").computed(),
                        Attribute::string("created_at").computed(),
                        Attribute::string("updated_at").computed(),
                    ],
                )
                .optional(),
                Attribute::string("created_at").computed().use_state_for_unknown(),
                Attribute::string("updated_at").computed(),
            ],
        )
    }

    fn validate(&self, config: &Value, diags: &mut Diagnostics) {
        for key in get_list_attr(config, "keys") {
            if let Some(kind) = key.get("kind").and_then(|k| k.as_string()) {
                if !KEY_KINDS.contains(&kind) {
                    diags.attribute_error(
                        "keys",
                        "Invalid key kind",
                        &format!("Key kind must be one of {KEY_KINDS:?}, got {kind:?}"),
                    );
                }
            }
        }
    }

    async fn create(&self, ctx: &ProviderContext, planned: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let request = project_request(planned);

        let _guard = ctx.project_create_lock.lock().await;

        let existing = ctx
            .client
            .list_projects()
            .await
            .or_summary("Error creating project", "list the projects")?;
        if existing.iter().any(|p| p.name == request.name) {
            return Err(ResourceError::from_api(
                "Error creating project",
                "create the project",
                &ApiError::already_exists("project", "name", &request.name),
            ));
        }

        let created = ctx
            .client
            .create_project(&request)
            .await
            .or_summary("Error creating project", "create a project")?;
        info!("Created project {} ({})", created.name, created.id);

        // The project exists from here on, even if attaching members fails
        let mut partial = planned.clone();
        partial.set("id", string_value(&created.id));

        let populate = async {
            let project = ctx
                .client
                .get_project(&created.id)
                .await
                .or_summary("Error creating project", "read the new project")?;

            let users = match users_from(planned) {
                Some(desired) => Some(sync_users(ctx, &project.id, &[], &desired).await?),
                None => None,
            };
            let teams = match teams_from(planned) {
                Some(desired) => Some(sync_teams(ctx, &project.id, &[], &desired).await?),
                None => None,
            };
            let keys = match keys_from(planned) {
                Some(desired) => Some(sync_keys(ctx, &project.id, &[], &desired).await?),
                None => None,
            };

            let now = timestamp_now();
            Ok::<_, ResourceError>(project_to_state(&project, users, teams, keys, &now, &now))
        };

        populate.await.map_err(|e| e.with_partial_state(partial))
    }

    async fn read(&self, ctx: &ProviderContext, state: &Value, _diags: &mut Diagnostics) -> Result<Option<Value>> {
        let id = get_string_attr(state, "id");
        let project = match ctx.client.get_project(&id).await {
            Ok(project) => project,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(ResourceError::from_api("Error reading project", "read the project", &e)),
        };

        let users = match users_from(state) {
            Some(users) if !users.is_empty() => Some(refresh_users(ctx, &id, users).await?),
            other => other,
        };
        let teams = match teams_from(state) {
            Some(teams) if !teams.is_empty() => Some(refresh_teams(ctx, teams).await?),
            other => other,
        };
        let keys = match keys_from(state) {
            Some(keys) if !keys.is_empty() => Some(refresh_keys(ctx, &id, keys).await?),
            other => other,
        };

        let created_at = get_optional_string_attr(state, "created_at").unwrap_or_else(timestamp_now);
        let updated_at = get_optional_string_attr(state, "updated_at").unwrap_or_else(|| created_at.clone());
        Ok(Some(project_to_state(&project, users, teams, keys, &created_at, &updated_at)))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: &Value,
        planned: &Value,
        _diags: &mut Diagnostics,
    ) -> Result<Value> {
        let id = get_string_attr(prior, "id");
        let request = project_request(planned);

        ctx.client
            .update_project(&id, &request)
            .await
            .or_summary("Error updating project", "update the project")?;

        // A null list clears the collection and stays null in state
        let desired = users_from(planned);
        let users = sync_users(ctx, &id, &users_from(prior).unwrap_or_default(), desired.as_deref().unwrap_or(&[]))
            .await?;
        let users = desired.map(|_| users);

        let desired = teams_from(planned);
        let teams = sync_teams(ctx, &id, &teams_from(prior).unwrap_or_default(), desired.as_deref().unwrap_or(&[]))
            .await?;
        let teams = desired.map(|_| teams);

        let desired = keys_from(planned);
        let keys = sync_keys(ctx, &id, &keys_from(prior).unwrap_or_default(), desired.as_deref().unwrap_or(&[]))
            .await?;
        let keys = desired.map(|_| keys);

        let project = ctx
            .client
            .get_project(&id)
            .await
            .or_summary("Error updating project", "read the updated project")?;

        let created_at = get_optional_string_attr(prior, "created_at").unwrap_or_else(timestamp_now);
        Ok(project_to_state(&project, users, teams, keys, &created_at, &timestamp_now()))
    }

    async fn delete(&self, ctx: &ProviderContext, state: &Value, _diags: &mut Diagnostics) -> Result<()> {
        let id = get_string_attr(state, "id");
        match ctx.client.delete_project(&id).await {
            Ok(()) => {
                info!("Deleted project {}", id);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(ResourceError::from_api("Error deleting project", "delete the project", &e)),
        }
    }
}

async fn sync_users(
    ctx: &ProviderContext,
    project: &str,
    current: &[ProjectUser],
    desired: &[ProjectUser],
) -> Result<Vec<ProjectUser>> {
    let client = &ctx.client;
    let directory = if diff_by_key(current, desired, user_key).add.is_empty() {
        Vec::new()
    } else {
        client
            .all_users()
            .await
            .or_summary("Error adding users to project", "list the users")?
    };
    let directory = &directory;

    reconcile_by_key(
        current,
        desired,
        user_key,
        move |user| async move {
            client
                .remove_user_role(project, &user.id, &user.role)
                .await
                .or_summary("Error removing user from project", "remove a user from the project")
        },
        move |user| async move {
            let found = directory.iter().find(|u| u.id == user.id).ok_or_else(|| {
                ResourceError::new(
                    "Error adding user to project",
                    format!("User with id {} was not found", user.id),
                )
            })?;
            client
                .add_user_role(project, &user.id, &user.role)
                .await
                .or_summary("Error adding user to project", "add a user to the project")?;
            Ok::<_, ResourceError>(ProjectUser {
                name: Some(found.name.clone()),
                label: Some(found.label.clone()),
                email: Some(found.email.clone()),
                ..user
            })
        },
    )
    .await
}

async fn sync_teams(
    ctx: &ProviderContext,
    project: &str,
    current: &[ProjectTeam],
    desired: &[ProjectTeam],
) -> Result<Vec<ProjectTeam>> {
    let client = &ctx.client;
    let directory = if diff_by_key(current, desired, team_key).add.is_empty() {
        Vec::new()
    } else {
        client
            .list_teams()
            .await
            .or_summary("Error adding teams to project", "list the teams")?
    };
    let directory = &directory;

    reconcile_by_key(
        current,
        desired,
        team_key,
        move |team| async move {
            client
                .remove_team_role(project, &team.id, &team.role)
                .await
                .or_summary("Error removing team from project", "remove a team from the project")
        },
        move |team| async move {
            let found = directory.iter().find(|t| t.id == team.id).ok_or_else(|| {
                ResourceError::new(
                    "Error adding team to project",
                    format!("Team with id {} was not found", team.id),
                )
            })?;
            client
                .add_team_role(project, &team.id, &team.role)
                .await
                .or_summary("Error adding team to project", "add a team to the project")?;
            Ok::<_, ResourceError>(ProjectTeam {
                label: Some(found.label.clone()),
                ..team
            })
        },
    )
    .await
}

async fn sync_keys(
    ctx: &ProviderContext,
    project: &str,
    current: &[AccessKey],
    desired: &[AccessKey],
) -> Result<Vec<AccessKey>> {
    let client = &ctx.client;

    reconcile_by_key(
        current,
        desired,
        key_identity,
        move |key| async move {
            match key.id.as_deref() {
                Some(key_id) => client
                    .remove_project_key(project, key_id)
                    .await
                    .or_summary("Error removing key from project", "remove a key from the project"),
                None => Ok(()),
            }
        },
        move |key| async move {
            let request = ProjectKeyRequest {
                kind: key.kind.clone(),
                label: key.label.clone(),
                key: key.key.clone(),
            };
            let added = client
                .add_project_key(project, &request)
                .await
                .or_summary("Error adding key to project", "add a key to the project")?;
            Ok::<_, ResourceError>(AccessKey {
                id: added.identifier,
                fingerprint: added.fingerprint,
                created_at: added.created_at,
                updated_at: added.updated_at,
                ..key
            })
        },
    )
    .await
}

/// Keep users that still hold their role in the project.
async fn refresh_users(ctx: &ProviderContext, project: &str, users: Vec<ProjectUser>) -> Result<Vec<ProjectUser>> {
    let roles = ctx
        .client
        .list_roles()
        .await
        .or_summary("Error reading project", "list the roles")?;
    let directory = ctx
        .client
        .all_users()
        .await
        .or_summary("Error reading project", "list the users")?;

    Ok(users
        .into_iter()
        .filter(|u| {
            roles
                .iter()
                .any(|r| r.project == project && r.user.as_deref() == Some(u.id.as_str()) && r.role == u.role)
        })
        .map(|u| match directory.iter().find(|d| d.id == u.id) {
            Some(d) => ProjectUser {
                name: Some(d.name.clone()),
                label: Some(d.label.clone()),
                email: Some(d.email.clone()),
                ..u
            },
            None => u,
        })
        .collect())
}

/// Keep teams that still exist, with current labels.
async fn refresh_teams(ctx: &ProviderContext, teams: Vec<ProjectTeam>) -> Result<Vec<ProjectTeam>> {
    let directory = ctx
        .client
        .list_teams()
        .await
        .or_summary("Error reading project", "list the teams")?;

    Ok(teams
        .into_iter()
        .filter_map(|t| {
            directory.iter().find(|d| d.id == t.id).map(|d| ProjectTeam {
                label: Some(d.label.clone()),
                ..t
            })
        })
        .collect())
}

/// Keep keys that are still registered on the project.
async fn refresh_keys(ctx: &ProviderContext, project: &str, keys: Vec<AccessKey>) -> Result<Vec<AccessKey>> {
    let remote = ctx
        .client
        .list_project_keys(project)
        .await
        .or_summary("Error reading project", "list the project keys")?;

    Ok(keys
        .into_iter()
        .filter_map(|k| {
            let found = remote
                .iter()
                .find(|r| r.identifier.is_some() && r.identifier == k.id)?;
            Some(AccessKey {
                fingerprint: found.fingerprint.clone().or(k.fingerprint),
                created_at: found.created_at.clone().or(k.created_at),
                updated_at: found.updated_at.clone().or(k.updated_at),
                ..k
            })
        })
        .collect())
}

fn project_request(value: &Value) -> ProjectRequest {
    let settings = value.get("settings").cloned().unwrap_or_default();
    let quotas = value.get("quotas").cloned().unwrap_or_default();
    ProjectRequest {
        name: get_string_attr(value, "name"),
        settings: ProjectSettings {
            version: get_float_attr(&settings, "version", 1.0),
            internet_access: get_bool_attr(&settings, "internet_access", false),
            dhcp: get_bool_attr(&settings, "dhcp", false),
        },
        quotas: ProjectQuota {
            cores: get_float_attr(&quotas, "cores", 0.0),
            instances: None,
            ram: None,
        },
    }
}

fn known_string(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_string()).map(str::to_string)
}

fn list_from<T>(value: &Value, attr: &str, parse: impl Fn(&Value) -> T) -> Option<Vec<T>> {
    match value.get(attr) {
        Some(Value::List(items)) => Some(items.iter().map(parse).collect()),
        _ => None,
    }
}

fn users_from(value: &Value) -> Option<Vec<ProjectUser>> {
    list_from(value, "users", |u| ProjectUser {
        id: get_string_attr(u, "id"),
        role: get_string_attr(u, "role"),
        name: known_string(u, "name"),
        label: known_string(u, "label"),
        email: known_string(u, "email"),
    })
}

fn teams_from(value: &Value) -> Option<Vec<ProjectTeam>> {
    list_from(value, "teams", |t| ProjectTeam {
        id: get_string_attr(t, "id"),
        role: get_string_attr(t, "role"),
        label: known_string(t, "label"),
    })
}

fn keys_from(value: &Value) -> Option<Vec<AccessKey>> {
    list_from(value, "keys", |k| AccessKey {
        id: known_string(k, "id"),
        label: get_string_attr(k, "label"),
        kind: get_string_attr(k, "kind"),
        key: get_string_attr(k, "key"),
        fingerprint: known_string(k, "fingerprint"),
        created_at: known_string(k, "created_at"),
        updated_at: known_string(k, "updated_at"),
    })
}

fn project_to_state(
    project: &Project,
    users: Option<Vec<ProjectUser>>,
    teams: Option<Vec<ProjectTeam>>,
    keys: Option<Vec<AccessKey>>,
    created_at: &str,
    updated_at: &str,
) -> Value {
    let users = users.map(|users| {
        Value::List(
            users
                .into_iter()
                .map(|u| {
                    make_state(vec![
                        ("id", string_value(u.id)),
                        ("name", opt_string_value(u.name)),
                        ("label", opt_string_value(u.label)),
                        ("email", opt_string_value(u.email)),
                        ("role", string_value(u.role)),
                    ])
                })
                .collect(),
        )
    });
    let teams = teams.map(|teams| {
        Value::List(
            teams
                .into_iter()
                .map(|t| {
                    make_state(vec![
                        ("id", string_value(t.id)),
                        ("label", opt_string_value(t.label)),
                        ("role", string_value(t.role)),
                    ])
                })
                .collect(),
        )
    });
    let keys = keys.map(|keys| {
        Value::List(
            keys.into_iter()
                .map(|k| {
                    make_state(vec![
                        ("id", opt_string_value(k.id)),
                        ("label", string_value(k.label)),
                        ("kind", string_value(k.kind)),
                        ("key", string_value(k.key)),
                        ("fingerprint", opt_string_value(k.fingerprint)),
                        ("created_at", opt_string_value(k.created_at)),
                        ("updated_at", opt_string_value(k.updated_at)),
                    ])
                })
                .collect(),
        )
    });

    make_state(vec![
        ("id", string_value(&project.id)),
        ("name", string_value(&project.name)),
        (
            "settings",
            make_state(vec![
                ("version", float_value(project.settings.version)),
                ("internet_access", bool_value(project.settings.internet_access)),
                ("dhcp", bool_value(project.settings.dhcp)),
            ]),
        ),
        (
            "quotas",
            make_state(vec![
                ("cores", float_value(project.quotas.cores)),
                ("instances", opt_float_value(project.quotas.instances)),
                ("ram", opt_float_value(project.quotas.ram)),
            ]),
        ),
        ("users", users.unwrap_or_default()),
        ("teams", teams.unwrap_or_default()),
        ("keys", keys.unwrap_or_default()),
        ("created_at", string_value(created_at)),
        ("updated_at", string_value(updated_at)),
    ])
}

/// Project state for the `corellium_v1projects` data source
pub(crate) fn project_summary(project: &Project, keys: &[corellium_common::ProjectKey]) -> Value {
    let keys = keys
        .iter()
        .map(|k| AccessKey {
            id: k.identifier.clone(),
            label: k.label.clone().unwrap_or_default(),
            kind: k.kind.clone(),
            key: k.key.clone(),
            fingerprint: k.fingerprint.clone(),
            created_at: k.created_at.clone(),
            updated_at: k.updated_at.clone(),
        })
        .collect();
    let mut state = project_to_state(project, None, None, Some(keys), "", "");
    if let Value::Map(m) = &mut state {
        m.remove("users");
        m.remove("teams");
        m.remove("created_at");
        m.remove("updated_at");
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::context_for;
    use crate::state::int_value;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user_entry(id: &str, role: &str) -> Value {
        make_state(vec![
            ("id", string_value(id)),
            ("name", Value::Unknown),
            ("label", Value::Unknown),
            ("email", Value::Unknown),
            ("role", string_value(role)),
        ])
    }

    fn planned(users: Value) -> Value {
        make_state(vec![
            ("id", Value::Unknown),
            ("name", string_value("lab")),
            (
                "settings",
                make_state(vec![
                    ("version", int_value(1)),
                    ("internet_access", bool_value(false)),
                    ("dhcp", bool_value(false)),
                ]),
            ),
            (
                "quotas",
                make_state(vec![
                    ("cores", int_value(2)),
                    ("instances", Value::Unknown),
                    ("ram", Value::Unknown),
                ]),
            ),
            ("users", users),
            ("teams", Value::Null),
            ("keys", Value::Null),
            ("created_at", Value::Unknown),
            ("updated_at", Value::Unknown),
        ])
    }

    fn project_json() -> serde_json::Value {
        json!({
            "id": "p1",
            "name": "lab",
            "settings": {"version": 1, "internet-access": false, "dhcp": false},
            "quotas": {"cores": 2, "instances": 5, "ram": 12288}
        })
    }

    fn key_entry(id: Option<&str>, label: &str, kind: &str, key: &str) -> Value {
        make_state(vec![
            ("id", id.map(string_value).unwrap_or(Value::Unknown)),
            ("label", string_value(label)),
            ("kind", string_value(kind)),
            ("key", string_value(key)),
            ("fingerprint", Value::Unknown),
            ("created_at", Value::Unknown),
            ("updated_at", Value::Unknown),
        ])
    }

    fn existing(mut state: Value) -> Value {
        state.set("id", string_value("p1"));
        state.set("created_at", string_value("2024-01-01T00:00:00Z"));
        state
    }

    async fn mount_project(server: &MockServer) {
        Mock::given(method("PATCH"))
            .and(path("/api/v1/projects/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_json()))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_json()))
            .mount(server)
            .await;
    }

    async fn mount_users(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/v1/teams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "all-users", "label": "All Users", "users": [
                    {"id": "u1", "label": "Ada", "name": "ada", "email": "ada@example.com"},
                    {"id": "u2", "label": "Bob", "name": "bob", "email": "bob@example.com"}
                ]}
            ])))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([project_json()])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let ctx = context_for(&server);
        let err = ProjectResource
            .create(&ctx, &planned(Value::Null), &mut Diagnostics::new())
            .await
            .unwrap_err();
        assert_eq!(err.detail, "A project with the name lab already exists");
    }

    #[tokio::test]
    async fn test_create_attaches_users() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects"))
            .and(body_json(json!({
                "name": "lab",
                "settings": {"version": 1.0, "internet-access": false, "dhcp": false},
                "quotas": {"cores": 2.0}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_json()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_json()))
            .mount(&server)
            .await;
        mount_users(&server).await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/roles/projects/p1/users/u1/roles/admin"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context_for(&server);
        let state = ProjectResource
            .create(
                &ctx,
                &planned(Value::List(vec![user_entry("u1", "admin")])),
                &mut Diagnostics::new(),
            )
            .await
            .unwrap();

        assert_eq!(get_string_attr(&state, "id"), "p1");
        let quotas = state.get("quotas").unwrap();
        assert_eq!(get_float_attr(quotas, "instances", 0.0), 5.0);
        assert_eq!(get_float_attr(quotas, "ram", 0.0), 12288.0);
        let users = get_list_attr(&state, "users");
        assert_eq!(get_string_attr(&users[0], "email"), "ada@example.com");
        assert!(state.get("teams").unwrap().is_null());
        assert!(!get_string_attr(&state, "created_at").is_empty());
    }

    #[tokio::test]
    async fn test_update_swaps_users() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/projects/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_json()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_json()))
            .mount(&server)
            .await;
        mount_users(&server).await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/roles/projects/p1/users/u1/roles/admin"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/roles/projects/p1/users/u2/roles/user"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut prior = planned(Value::List(vec![make_state(vec![
            ("id", string_value("u1")),
            ("name", string_value("ada")),
            ("label", string_value("Ada")),
            ("email", string_value("ada@example.com")),
            ("role", string_value("admin")),
        ])]));
        prior.set("id", string_value("p1"));
        prior.set("created_at", string_value("2024-01-01T00:00:00Z"));
        let mut next = planned(Value::List(vec![user_entry("u2", "user")]));
        next.set("id", string_value("p1"));

        let ctx = context_for(&server);
        let state = ProjectResource
            .update(&ctx, &prior, &next, &mut Diagnostics::new())
            .await
            .unwrap();

        let users = get_list_attr(&state, "users");
        assert_eq!(users.len(), 1);
        assert_eq!(get_string_attr(&users[0], "id"), "u2");
        assert_eq!(get_string_attr(&users[0], "name"), "bob");
        assert_eq!(get_string_attr(&state, "created_at"), "2024-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_create_round_trips_settings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        let remote = json!({
            "id": "p2",
            "name": "lab",
            "settings": {"version": 2, "internet-access": true, "dhcp": true},
            "quotas": {"cores": 4, "instances": 10, "ram": 24576}
        });
        Mock::given(method("POST"))
            .and(path("/api/v1/projects"))
            .and(body_json(json!({
                "name": "lab",
                "settings": {"version": 2.0, "internet-access": true, "dhcp": true},
                "quotas": {"cores": 4.0}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote.clone()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects/p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote))
            .mount(&server)
            .await;

        let mut config = planned(Value::Null);
        config.set(
            "settings",
            make_state(vec![
                ("version", int_value(2)),
                ("internet_access", bool_value(true)),
                ("dhcp", bool_value(true)),
            ]),
        );
        config.set(
            "quotas",
            make_state(vec![("cores", int_value(4)), ("instances", Value::Unknown), ("ram", Value::Unknown)]),
        );

        let ctx = context_for(&server);
        let state = ProjectResource
            .create(&ctx, &config, &mut Diagnostics::new())
            .await
            .unwrap();

        let settings = state.get("settings").unwrap();
        assert_eq!(get_float_attr(settings, "version", 0.0), 2.0);
        assert!(get_bool_attr(settings, "internet_access", false));
        assert!(get_bool_attr(settings, "dhcp", false));
        let quotas = state.get("quotas").unwrap();
        assert_eq!(get_float_attr(quotas, "cores", 0.0), 4.0);
        assert_eq!(get_float_attr(quotas, "instances", 0.0), 10.0);
        assert_eq!(project_request(&state), project_request(&config));
    }

    #[tokio::test]
    async fn test_create_failure_after_post_keeps_project() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_json()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_json()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/p1/keys"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let mut config = planned(Value::Null);
        config.set("keys", Value::List(vec![key_entry(None, "laptop", "ssh", "not-a-key")]));

        let ctx = context_for(&server);
        let err = ProjectResource
            .create(&ctx, &config, &mut Diagnostics::new())
            .await
            .unwrap_err();

        assert_eq!(err.summary, "Error adding key to project");
        let partial = err.partial_state.unwrap();
        assert_eq!(get_string_attr(&partial, "id"), "p1");
    }

    #[tokio::test]
    async fn test_update_adds_and_removes_keys() {
        let server = MockServer::start().await;
        mount_project(&server).await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/projects/p1/keys/key-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/p1/keys"))
            .and(body_json(json!({"kind": "adb", "label": "ci", "key": "QAAAAM0"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "identifier": "key-2",
                "label": "ci",
                "kind": "adb",
                "key": "QAAAAM0",
                "fingerprint": "aa:bb",
                "createdAt": "2024-02-01T00:00:00Z",
                "updatedAt": "2024-02-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut prior = existing(planned(Value::Null));
        prior.set(
            "keys",
            Value::List(vec![
                key_entry(Some("key-1"), "laptop", "ssh", "ssh-ed25519 AAAA"),
                key_entry(Some("key-0"), "desk", "ssh", "ssh-ed25519 BBBB"),
            ]),
        );
        let mut next = existing(planned(Value::Null));
        next.set(
            "keys",
            Value::List(vec![
                key_entry(Some("key-0"), "desk", "ssh", "ssh-ed25519 BBBB"),
                key_entry(None, "ci", "adb", "QAAAAM0"),
            ]),
        );

        let ctx = context_for(&server);
        let state = ProjectResource
            .update(&ctx, &prior, &next, &mut Diagnostics::new())
            .await
            .unwrap();

        let keys = get_list_attr(&state, "keys");
        assert_eq!(keys.len(), 2);
        assert_eq!(get_string_attr(&keys[0], "id"), "key-0");
        assert_eq!(get_string_attr(&keys[1], "id"), "key-2");
        assert_eq!(get_string_attr(&keys[1], "fingerprint"), "aa:bb");
    }

    #[tokio::test]
    async fn test_update_relabel_replaces_key() {
        let server = MockServer::start().await;
        mount_project(&server).await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/projects/p1/keys/key-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/p1/keys"))
            .and(body_json(json!({"kind": "ssh", "label": "work", "key": "ssh-ed25519 AAAA"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "identifier": "key-3",
                "label": "work",
                "kind": "ssh",
                "key": "ssh-ed25519 AAAA"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut prior = existing(planned(Value::Null));
        prior.set(
            "keys",
            Value::List(vec![key_entry(Some("key-1"), "laptop", "ssh", "ssh-ed25519 AAAA")]),
        );
        let mut next = existing(planned(Value::Null));
        next.set(
            "keys",
            Value::List(vec![key_entry(Some("key-1"), "work", "ssh", "ssh-ed25519 AAAA")]),
        );

        let ctx = context_for(&server);
        let state = ProjectResource
            .update(&ctx, &prior, &next, &mut Diagnostics::new())
            .await
            .unwrap();

        let keys = get_list_attr(&state, "keys");
        assert_eq!(get_string_attr(&keys[0], "id"), "key-3");
        assert_eq!(get_string_attr(&keys[0], "label"), "work");

        let key_calls: Vec<_> = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.url.path().contains("/keys"))
            .map(|r| r.method.to_string())
            .collect();
        assert_eq!(key_calls, ["DELETE", "POST"]);
    }

    #[tokio::test]
    async fn test_update_swaps_team_role() {
        let server = MockServer::start().await;
        mount_project(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/teams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "t1", "label": "QA", "users": []}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/roles/projects/p1/teams/t1/roles/admin"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/roles/projects/p1/teams/t1/roles/user"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let team = |role: &str, label: Value| {
            make_state(vec![("id", string_value("t1")), ("label", label), ("role", string_value(role))])
        };
        let mut prior = existing(planned(Value::Null));
        prior.set("teams", Value::List(vec![team("admin", string_value("QA"))]));
        let mut next = existing(planned(Value::Null));
        next.set("teams", Value::List(vec![team("user", Value::Unknown)]));

        let ctx = context_for(&server);
        let state = ProjectResource
            .update(&ctx, &prior, &next, &mut Diagnostics::new())
            .await
            .unwrap();

        let teams = get_list_attr(&state, "teams");
        assert_eq!(teams.len(), 1);
        assert_eq!(get_string_attr(&teams[0], "role"), "user");
        assert_eq!(get_string_attr(&teams[0], "label"), "QA");
    }

    #[tokio::test]
    async fn test_read_drops_users_without_role() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_json()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/roles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"role": "admin", "project": "p1", "user": "u1"}
            ])))
            .mount(&server)
            .await;
        mount_users(&server).await;

        let mut state = planned(Value::List(vec![
            make_state(vec![("id", string_value("u1")), ("role", string_value("admin"))]),
            make_state(vec![("id", string_value("u2")), ("role", string_value("user"))]),
        ]));
        state.set("id", string_value("p1"));

        let ctx = context_for(&server);
        let refreshed = ProjectResource
            .read(&ctx, &state, &mut Diagnostics::new())
            .await
            .unwrap()
            .unwrap();

        let users = get_list_attr(&refreshed, "users");
        assert_eq!(users.len(), 1);
        assert_eq!(get_string_attr(&users[0], "label"), "Ada");
    }

    #[tokio::test]
    async fn test_read_missing_project_is_gone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects/p1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let ctx = context_for(&server);
        let state = ProjectResource.import_state("p1");
        let result = ProjectResource.read(&ctx, &state, &mut Diagnostics::new()).await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_validate_rejects_unknown_key_kind() {
        let config = make_state(vec![(
            "keys",
            Value::List(vec![make_state(vec![("kind", string_value("gpg"))])]),
        )]);
        let mut diags = Diagnostics::new();
        ProjectResource.validate(&config, &mut diags);
        assert!(diags.has_error());
    }
}
