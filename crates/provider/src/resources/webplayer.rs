//! Web Player Resource handler for Terraform
//!
//! A web-player session grants browser access to one instance with a chosen
//! set of UI features. Sessions cannot be modified; any change replaces them.

use chrono::{DateTime, SecondsFormat};
use corellium_common::{Features, WebPlayerSession, WebPlayerSessionRequest};
use tracing::info;

use super::{Resource, Result};
use crate::context::ProviderContext;
use crate::diagnostics::{ApiResultExt, Diagnostics, ResourceError};
use crate::schema::{Attribute, Block};
use crate::state::{
    get_float_attr, get_optional_bool_attr, get_string_attr, opt_string_value, string_value, Value,
};

pub struct WebPlayerResource;

/// Feature flag names as written in configuration
const FEATURES: &[&str] = &[
    "apps",
    "console",
    "coretrace",
    "devicecontrol",
    "devicedelete",
    "files",
    "frida",
    "images",
    "messaging",
    "netmon",
    "network",
    "portforwarding",
    "profile",
    "sensors",
    "settings",
    "snapshots",
    "strace",
    "system",
    "connect",
];

fn features_from(value: &Value) -> Features {
    let features = value.get("features").cloned().unwrap_or_default();
    let flag = |name: &str| get_optional_bool_attr(&features, name);
    Features {
        apps: flag("apps"),
        console: flag("console"),
        coretrace: flag("coretrace"),
        device_control: flag("devicecontrol"),
        device_delete: flag("devicedelete"),
        files: flag("files"),
        frida: flag("frida"),
        images: flag("images"),
        messaging: flag("messaging"),
        netmon: flag("netmon"),
        network: flag("network"),
        port_forwarding: flag("portforwarding"),
        profile: flag("profile"),
        sensors: flag("sensors"),
        settings: flag("settings"),
        snapshots: flag("snapshots"),
        strace: flag("strace"),
        system: flag("system"),
        connect: flag("connect"),
    }
}

/// The API reports expiry as epoch milliseconds on create and as a
/// timestamp string elsewhere.
fn expiration_string(session: &WebPlayerSession) -> Option<String> {
    match session.expiration.as_ref()? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            DateTime::from_timestamp_millis(millis).map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        }
        _ => None,
    }
}

/// Configured attributes come from `base`; the session supplies the rest.
fn session_state(session: &WebPlayerSession, base: &Value) -> Value {
    let mut state = base.clone();
    state.set("id", string_value(&session.identifier));
    state.set("identifier", string_value(&session.identifier));
    if let Some(token) = &session.token {
        state.set("token", string_value(token));
    }
    if let Some(expiration) = expiration_string(session) {
        state.set("expiration", string_value(expiration));
    } else if !base.get("expiration").is_some_and(Value::is_present) {
        state.set("expiration", Value::Null);
    }
    // Imported sessions have no configuration yet
    if !base.get("instanceid").is_some_and(Value::is_present) {
        state.set("instanceid", opt_string_value(session.instance_id.clone()));
    }
    if !base.get("project").is_some_and(Value::is_present) {
        state.set("project", opt_string_value(session.project_id.clone()));
    }
    state
}

#[async_trait::async_trait]
impl Resource for WebPlayerResource {
    fn type_name(&self) -> &'static str {
        "corellium_v1webplayer"
    }

    fn schema(&self) -> Block {
        let features = FEATURES
            .iter()
            .map(|&name| Attribute::bool(name).optional().requires_replace())
            .collect();
        Block::new(
            "A web-player session for an instance.",
            vec![
                Attribute::string("id").computed().use_state_for_unknown(),
                Attribute::string("identifier").computed().use_state_for_unknown(),
                Attribute::string("token").computed().sensitive().use_state_for_unknown(),
                Attribute::string("expiration").computed().use_state_for_unknown(),
                Attribute::string("instanceid").required().requires_replace(),
                Attribute::string("project").required().requires_replace(),
                Attribute::number("expiresinseconds").required().requires_replace(),
                Attribute::string("clientid").optional().requires_replace(),
                Attribute::single_nested("features", features)
                    .optional()
                    .requires_replace(),
            ],
        )
    }

    async fn create(&self, ctx: &ProviderContext, planned: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let instance_id = get_string_attr(planned, "instanceid");

        match ctx.client.get_instance(&instance_id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                return Err(ResourceError::new(
                    "Error creating web player session",
                    format!("Instance with instanceId={instance_id} not found"),
                ));
            }
            Err(e) => {
                return Err(ResourceError::from_api(
                    "Error creating web player session",
                    "read the instance",
                    &e,
                ))
            }
        }

        let request = WebPlayerSessionRequest {
            project_id: get_string_attr(planned, "project"),
            instance_id: instance_id.clone(),
            expires_in: get_float_attr(planned, "expiresinseconds", 0.0),
            features: features_from(planned),
        };
        let session = ctx
            .client
            .create_webplayer_session(&request)
            .await
            .or_summary("Error creating web player session", "create a web player session")?;
        info!("Created web player session {} for instance {}", session.identifier, instance_id);

        Ok(session_state(&session, planned))
    }

    async fn read(&self, ctx: &ProviderContext, state: &Value, _diags: &mut Diagnostics) -> Result<Option<Value>> {
        let id = get_string_attr(state, "id");
        match ctx.client.get_webplayer_session(&id).await {
            Ok(session) => Ok(Some(session_state(&session, state))),
            Err(e) if e.is_not_found() => {
                info!("Web player session {} has expired", id);
                Ok(None)
            }
            Err(e) => Err(ResourceError::from_api(
                "Error reading web player session",
                "read the web player session",
                &e,
            )),
        }
    }

    async fn update(
        &self,
        _ctx: &ProviderContext,
        prior: &Value,
        planned: &Value,
        _diags: &mut Diagnostics,
    ) -> Result<Value> {
        // Every configurable attribute forces replacement, so only computed
        // values can reach here
        let mut state = planned.clone();
        for attr in ["id", "identifier", "token", "expiration"] {
            state.set(attr, prior.get(attr).cloned().unwrap_or_default());
        }
        Ok(state)
    }

    async fn delete(&self, ctx: &ProviderContext, state: &Value, _diags: &mut Diagnostics) -> Result<()> {
        let id = get_string_attr(state, "id");
        match ctx.client.delete_webplayer_session(&id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(ResourceError::from_api(
                "Error deleting web player session",
                "delete the web player session",
                &e,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::context_for;
    use crate::state::{bool_value, int_value, make_state};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn planned() -> Value {
        WebPlayerResource.schema().normalize(&make_state(vec![
            ("id", Value::Unknown),
            ("identifier", Value::Unknown),
            ("token", Value::Unknown),
            ("expiration", Value::Unknown),
            ("instanceid", string_value("i1")),
            ("project", string_value("p1")),
            ("expiresinseconds", int_value(3600)),
            (
                "features",
                make_state(vec![
                    ("devicecontrol", bool_value(true)),
                    ("apps", bool_value(false)),
                ]),
            ),
        ]))
    }

    #[tokio::test]
    async fn test_create_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/instances/i1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "i1", "state": "on"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/webplayer"))
            .and(body_json(json!({
                "projectId": "p1",
                "instanceId": "i1",
                "expiresIn": 3600.0,
                "features": {"apps": false, "deviceControl": true}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "identifier": "w1",
                "token": "secret",
                "expiration": 1700000000000u64
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context_for(&server);
        let state = WebPlayerResource
            .create(&ctx, &planned(), &mut Diagnostics::new())
            .await
            .unwrap();

        assert_eq!(get_string_attr(&state, "id"), "w1");
        assert_eq!(get_string_attr(&state, "token"), "secret");
        assert_eq!(get_string_attr(&state, "expiration"), "2023-11-14T22:13:20Z");
        let features = state.get("features").unwrap();
        assert_eq!(get_optional_bool_attr(features, "devicecontrol"), Some(true));
    }

    #[tokio::test]
    async fn test_create_requires_instance() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/instances/i1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let ctx = context_for(&server);
        let err = WebPlayerResource
            .create(&ctx, &planned(), &mut Diagnostics::new())
            .await
            .unwrap_err();
        assert_eq!(err.detail, "Instance with instanceId=i1 not found");
    }

    #[tokio::test]
    async fn test_expired_session_leaves_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/webplayer/w1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let ctx = context_for(&server);
        let result = WebPlayerResource
            .read(&ctx, &WebPlayerResource.import_state("w1"), &mut Diagnostics::new())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_read_keeps_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/webplayer/w1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "identifier": "w1",
                "expiration": "2023-11-14T22:13:20Z",
                "projectId": "p1",
                "instanceId": "i1"
            }])))
            .mount(&server)
            .await;

        let mut state = planned();
        state.set("id", string_value("w1"));
        state.set("token", string_value("secret"));

        let ctx = context_for(&server);
        let refreshed = WebPlayerResource
            .read(&ctx, &state, &mut Diagnostics::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(get_string_attr(&refreshed, "token"), "secret");
        assert_eq!(get_string_attr(&refreshed, "instanceid"), "i1");
    }

    #[test]
    fn test_every_attribute_forces_replacement() {
        let schema = WebPlayerResource.schema();
        assert!(schema
            .attributes
            .iter()
            .filter(|a| !a.computed)
            .all(|a| a.requires_replace));
    }
}
