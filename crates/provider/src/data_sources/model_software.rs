//! `corellium_v1modelsoftware`: firmware available for one model

use corellium_common::Firmware;

use super::{random_id, DataSource};
use crate::context::ProviderContext;
use crate::diagnostics::{Diagnostics, ResourceError};
use crate::resources::Result;
use crate::schema::{Attribute, Block};
use crate::state::{get_string_attr, make_state, opt_float_value, opt_string_value, Value};

pub struct ModelSoftwareDataSource;

fn firmware_state(firmware: &Firmware) -> Value {
    make_state(vec![
        ("api_version", opt_string_value(firmware.api_version.clone())),
        ("android_flavor", opt_string_value(firmware.android_flavor.clone())),
        ("build_id", opt_string_value(firmware.buildid.clone())),
        ("filename", opt_string_value(firmware.filename.clone())),
        ("md5_sum", opt_string_value(firmware.md5sum.clone())),
        ("orig_url", opt_string_value(firmware.orig_url.clone())),
        ("release_date", opt_string_value(firmware.releasedate.clone())),
        ("sha1_sum", opt_string_value(firmware.sha1sum.clone())),
        ("sha256_sum", opt_string_value(firmware.sha256sum.clone())),
        ("size", opt_float_value(firmware.size)),
        ("unique_id", opt_string_value(firmware.uniqueid.clone())),
        ("upload_date", opt_string_value(firmware.uploaddate.clone())),
        ("url", opt_string_value(firmware.url.clone())),
        ("version", opt_string_value(firmware.version.clone())),
    ])
}

#[async_trait::async_trait]
impl DataSource for ModelSoftwareDataSource {
    fn type_name(&self) -> &'static str {
        "corellium_v1modelsoftware"
    }

    fn schema(&self) -> Block {
        let firmware = [
            "api_version",
            "android_flavor",
            "build_id",
            "filename",
            "md5_sum",
            "orig_url",
            "release_date",
            "sha1_sum",
            "sha256_sum",
            "unique_id",
            "upload_date",
            "url",
            "version",
        ]
        .into_iter()
        .map(|name| Attribute::string(name).computed())
        .chain(std::iter::once(Attribute::number("size").computed()))
        .collect();

        Block::new(
            "Firmware releases available for a device model.",
            vec![
                Attribute::string("id").computed(),
                Attribute::string("model").required().describe("Model identifier, e.g. iphone12."),
                Attribute::list_nested("model_software", firmware).computed(),
            ],
        )
    }

    async fn read(&self, ctx: &ProviderContext, config: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let model = get_string_attr(config, "model");
        let software = match ctx.client.list_model_software(&model).await {
            Ok(software) => software,
            Err(e) if e.is_forbidden() => {
                return Err(ResourceError::new(
                    "Unable to Read Model Software",
                    "access token is invalid",
                ));
            }
            Err(e) => {
                return Err(ResourceError::from_api(
                    "Unable to Read Model Software",
                    "list the model software",
                    &e,
                ))
            }
        };

        Ok(make_state(vec![
            ("id", random_id()),
            ("model", config.get("model").cloned().unwrap_or_default()),
            ("model_software", Value::List(software.iter().map(firmware_state).collect())),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::context_for;
    use crate::state::{get_list_attr, string_value};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> Value {
        make_state(vec![("model", string_value("iphone12"))])
    }

    #[tokio::test]
    async fn test_maps_firmware() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/models/iphone12/software"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "buildid": "20A362",
                "version": "16.0",
                "sha256sum": "abc",
                "uniqueid": "fw-1",
                "size": 6000000000u64
            }])))
            .mount(&server)
            .await;

        let ctx = context_for(&server);
        let state = ModelSoftwareDataSource
            .read(&ctx, &config(), &mut Diagnostics::new())
            .await
            .unwrap();

        let software = get_list_attr(&state, "model_software");
        assert_eq!(get_string_attr(&software[0], "build_id"), "20A362");
        assert_eq!(get_string_attr(&software[0], "unique_id"), "fw-1");
        assert_eq!(get_string_attr(&state, "model"), "iphone12");
    }

    #[tokio::test]
    async fn test_forbidden_means_invalid_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/models/iphone12/software"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let ctx = context_for(&server);
        let err = ModelSoftwareDataSource
            .read(&ctx, &config(), &mut Diagnostics::new())
            .await
            .unwrap_err();
        assert_eq!(err.detail, "access token is invalid");
    }
}
