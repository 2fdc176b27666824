//! `corellium_v1projects`: every project with its access keys

use super::{random_id, DataSource};
use crate::context::ProviderContext;
use crate::diagnostics::{ApiResultExt, Diagnostics};
use crate::resources::project::project_summary;
use crate::resources::Result;
use crate::schema::{Attribute, Block};
use crate::state::{make_state, Value};

pub struct ProjectsDataSource;

#[async_trait::async_trait]
impl DataSource for ProjectsDataSource {
    fn type_name(&self) -> &'static str {
        "corellium_v1projects"
    }

    fn schema(&self) -> Block {
        Block::new(
            "All projects visible to the API token.",
            vec![
                Attribute::string("id").computed(),
                Attribute::list_nested(
                    "projects",
                    vec![
                        Attribute::string("id").computed(),
                        Attribute::string("name").computed(),
                        Attribute::single_nested(
                            "settings",
                            vec![
                                Attribute::number("version").computed(),
                                Attribute::bool("internet_access").computed(),
                                Attribute::bool("dhcp").computed(),
                            ],
                        )
                        .computed(),
                        Attribute::single_nested(
                            "quotas",
                            vec![
                                Attribute::number("cores").computed(),
                                Attribute::number("instances").computed(),
                                Attribute::number("ram").computed(),
                            ],
                        )
                        .computed(),
                        Attribute::list_nested(
                            "keys",
                            vec![
                                Attribute::string("id").computed(),
                                Attribute::string("label").computed(),
                                Attribute::string("kind").computed(),
                                Attribute::string("key").computed(),
                                Attribute::string("fingerprint").computed(),
                                Attribute::string("created_at").computed(),
                                Attribute::string("updated_at").computed(),
                            ],
                        )
                        .computed(),
                    ],
                )
                .computed(),
            ],
        )
    }

    async fn read(&self, ctx: &ProviderContext, _config: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let summary = "Unable to Read Corellium Projects";
        let projects = ctx
            .client
            .list_projects()
            .await
            .or_summary(summary, "list the projects")?;

        let mut entries = Vec::with_capacity(projects.len());
        for project in &projects {
            let keys = ctx
                .client
                .list_project_keys(&project.id)
                .await
                .or_summary(summary, "list the project keys")?;
            entries.push(project_summary(project, &keys));
        }

        Ok(make_state(vec![("id", random_id()), ("projects", Value::List(entries))]))
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

    #[tokio::test]
    async fn test_projects_include_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "p1",
                "name": "lab",
                "settings": {"version": 1, "internet-access": true, "dhcp": false},
                "quotas": {"cores": 4}
            }])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects/p1/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "identifier": "k1",
                "label": "ci",
                "kind": "ssh",
                "key": "ssh-ed25519 AAAA",
                "fingerprint": "SHA256:abc"
            }])))
            .mount(&server)
            .await;

        let ctx = context_for(&server);
        let state = ProjectsDataSource
            .read(&ctx, &Value::Null, &mut Diagnostics::new())
            .await
            .unwrap();

        let projects = get_list_attr(&state, "projects");
        assert_eq!(projects.len(), 1);
        let keys = get_list_attr(&projects[0], "keys");
        assert_eq!(get_string_attr(&keys[0], "fingerprint"), "SHA256:abc");

        let normalized = ProjectsDataSource.schema().normalize(&state);
        assert_eq!(normalized, state);
    }
}
