//! `corellium_v1roles`: project role assignments

use tracing::warn;

use super::{random_id, DataSource};
use crate::context::ProviderContext;
use crate::diagnostics::{ApiResultExt, Diagnostics};
use crate::resources::Result;
use crate::schema::{Attribute, Block};
use crate::state::{get_optional_string_attr, make_state, opt_string_value, string_value, Value};

pub struct RolesDataSource;

#[async_trait::async_trait]
impl DataSource for RolesDataSource {
    fn type_name(&self) -> &'static str {
        "corellium_v1roles"
    }

    fn schema(&self) -> Block {
        Block::new(
            "Role assignments, optionally narrowed to one project.",
            vec![
                Attribute::string("id").computed(),
                Attribute::string("project").optional(),
                Attribute::list_nested(
                    "roles",
                    vec![
                        Attribute::string("role").computed(),
                        Attribute::string("project").computed(),
                        Attribute::string("user").computed(),
                    ],
                )
                .computed(),
            ],
        )
    }

    async fn read(&self, ctx: &ProviderContext, config: &Value, diags: &mut Diagnostics) -> Result<Value> {
        let mut roles = ctx
            .client
            .list_roles()
            .await
            .or_summary("Unable to Read Corellium Roles", "list the roles")?;

        let project = get_optional_string_attr(config, "project");
        if let Some(project) = &project {
            // An unmatched filter falls back to every role
            if roles.iter().any(|r| &r.project == project) {
                roles.retain(|r| &r.project == project);
            }
        }

        if roles.is_empty() {
            warn!("No roles found");
            diags.warning("No roles found", "The API returned no role assignments.");
        }

        let roles = roles
            .into_iter()
            .map(|r| {
                make_state(vec![
                    ("role", string_value(r.role)),
                    ("project", string_value(r.project)),
                    ("user", opt_string_value(r.user)),
                ])
            })
            .collect();

        Ok(make_state(vec![
            ("id", random_id()),
            ("project", config.get("project").cloned().unwrap_or_default()),
            ("roles", Value::List(roles)),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::context_for;
    use crate::state::{get_list_attr, get_string_attr};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with(roles: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/roles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(roles))
            .mount(&server)
            .await;
        server
    }

    fn config(project: &str) -> Value {
        make_state(vec![("project", string_value(project))])
    }

    #[tokio::test]
    async fn test_filters_by_project() {
        let server = server_with(json!([
            {"role": "admin", "project": "p1", "user": "u1"},
            {"role": "user", "project": "p2", "user": "u2"}
        ]))
        .await;

        let ctx = context_for(&server);
        let state = RolesDataSource
            .read(&ctx, &config("p2"), &mut Diagnostics::new())
            .await
            .unwrap();
        let roles = get_list_attr(&state, "roles");
        assert_eq!(roles.len(), 1);
        assert_eq!(get_string_attr(&roles[0], "user"), "u2");
    }

    #[tokio::test]
    async fn test_unmatched_filter_returns_everything() {
        let server = server_with(json!([
            {"role": "admin", "project": "p1", "user": "u1"},
            {"role": "user", "project": "p2", "user": "u2"}
        ]))
        .await;

        let ctx = context_for(&server);
        let state = RolesDataSource
            .read(&ctx, &config("p9"), &mut Diagnostics::new())
            .await
            .unwrap();
        assert_eq!(get_list_attr(&state, "roles").len(), 2);
    }

    #[tokio::test]
    async fn test_empty_result_warns() {
        let server = server_with(json!([])).await;

        let ctx = context_for(&server);
        let mut diags = Diagnostics::new();
        RolesDataSource.read(&ctx, &Value::Null, &mut diags).await.unwrap();
        assert!(!diags.is_empty());
        assert!(!diags.has_error());
    }
}
