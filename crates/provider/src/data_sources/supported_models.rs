//! `corellium_v1supportedmodels`: device models the platform can virtualize

use corellium_common::Model;

use super::{random_id, DataSource};
use crate::context::ProviderContext;
use crate::diagnostics::{ApiResultExt, Diagnostics};
use crate::resources::Result;
use crate::schema::{Attribute, Block};
use crate::state::{make_state, opt_bool_value, opt_float_value, opt_string_value, Value};

pub struct SupportedModelsDataSource;

fn model_state(model: &Model) -> Value {
    make_state(vec![
        ("type", opt_string_value(model.kind.clone())),
        ("name", opt_string_value(model.name.clone())),
        ("model", opt_string_value(model.model.clone())),
        ("flavor", opt_string_value(model.flavor.clone())),
        ("description", opt_string_value(model.description.clone())),
        ("board_config", opt_string_value(model.board_config.clone())),
        ("platform", opt_string_value(model.platform.clone())),
        ("cp_id", opt_float_value(model.cp_id)),
        ("bd_id", opt_float_value(model.bd_id)),
        ("peripherals", opt_bool_value(model.peripherals)),
    ])
}

#[async_trait::async_trait]
impl DataSource for SupportedModelsDataSource {
    fn type_name(&self) -> &'static str {
        "corellium_v1supportedmodels"
    }

    fn schema(&self) -> Block {
        Block::new(
            "Device models supported by the platform.",
            vec![
                Attribute::string("id").computed(),
                Attribute::list_nested(
                    "supported_models",
                    vec![
                        Attribute::string("type").computed(),
                        Attribute::string("name").computed(),
                        Attribute::string("model").computed(),
                        Attribute::string("flavor").computed(),
                        Attribute::string("description").computed(),
                        Attribute::string("board_config").computed(),
                        Attribute::string("platform").computed(),
                        Attribute::number("cp_id").computed(),
                        Attribute::number("bd_id").computed(),
                        Attribute::bool("peripherals").computed(),
                    ],
                )
                .computed(),
            ],
        )
    }

    async fn read(&self, ctx: &ProviderContext, _config: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let models = ctx
            .client
            .list_models()
            .await
            .or_summary("Unable to Read Supported Models", "list the supported models")?;

        Ok(make_state(vec![
            ("id", random_id()),
            ("supported_models", Value::List(models.iter().map(model_state).collect())),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::context_for;
    use crate::state::{get_int_attr, get_list_attr, get_string_attr};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_maps_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "type": "iphone",
                "name": "iPhone 12",
                "model": "iphone12",
                "flavor": "iphone12",
                "boardConfig": "d53gap",
                "platform": "t8101",
                "cpId": 33025,
                "bdId": 10,
                "peripherals": true
            }])))
            .mount(&server)
            .await;

        let ctx = context_for(&server);
        let state = SupportedModelsDataSource
            .read(&ctx, &Value::Null, &mut Diagnostics::new())
            .await
            .unwrap();

        let models = get_list_attr(&state, "supported_models");
        assert_eq!(get_string_attr(&models[0], "board_config"), "d53gap");
        assert_eq!(get_int_attr(&models[0], "cp_id", 0), 33025);
    }
}
