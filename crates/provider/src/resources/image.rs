//! Image Resource handler for Terraform
//!
//! Images are uploaded once from a local file and never modified; every
//! configured attribute forces a new image.

use std::path::Path;

use corellium_common::{Image, ImageUpload, IMAGE_TYPES};
use tracing::info;

use super::{Resource, Result};
use crate::context::ProviderContext;
use crate::diagnostics::{ApiResultExt, Diagnostics, ResourceError};
use crate::schema::{Attribute, Block};
use crate::state::{get_bool_attr, get_string_attr, opt_float_value, opt_string_value, string_value, Value};

pub struct ImageResource;

fn image_state(image: &Image, config: &Value) -> Value {
    let mut state = config.clone();
    state.set("id", string_value(&image.id));
    state.set("status", opt_string_value(image.status.clone()));
    state.set("unique_id", opt_string_value(image.uniqueid.clone()));
    state.set("size", opt_float_value(image.size));
    state.set("created_at", opt_string_value(image.created_at.clone()));

    // Imported images have no configuration yet
    for (attr, remote) in [
        ("name", &image.name),
        ("type", &image.kind),
        ("project", &image.project),
    ] {
        if !config.get(attr).is_some_and(Value::is_present) {
            state.set(attr, opt_string_value(remote.clone()));
        }
    }
    state
}

#[async_trait::async_trait]
impl Resource for ImageResource {
    fn type_name(&self) -> &'static str {
        "corellium_v1image"
    }

    fn schema(&self) -> Block {
        Block::new(
            "A firmware or disk image uploaded to a project.",
            vec![
                Attribute::string("id").computed().use_state_for_unknown(),
                Attribute::string("name").required().requires_replace(),
                Attribute::string("type").required().requires_replace(),
                Attribute::string("filename")
                    .required()
                    .requires_replace()
                    .describe("Path of the local file to upload."),
                Attribute::bool("encapsulated").required().requires_replace(),
                Attribute::string("project").required().requires_replace(),
                Attribute::string("status").computed(),
                Attribute::string("unique_id").computed().use_state_for_unknown(),
                Attribute::number("size").computed().use_state_for_unknown(),
                Attribute::string("created_at").computed().use_state_for_unknown(),
            ],
        )
    }

    fn validate(&self, config: &Value, diags: &mut Diagnostics) {
        if let Some(kind) = config.get("type").and_then(|t| t.as_string()) {
            if !IMAGE_TYPES.contains(&kind) {
                diags.attribute_error(
                    "type",
                    "Invalid image type",
                    &format!("Image type must be one of {}, got {kind:?}", IMAGE_TYPES.join(", ")),
                );
            }
        }
    }

    async fn create(&self, ctx: &ProviderContext, planned: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let upload = ImageUpload {
            name: get_string_attr(planned, "name"),
            kind: get_string_attr(planned, "type"),
            encapsulated: get_bool_attr(planned, "encapsulated", false),
            project: get_string_attr(planned, "project"),
        };
        let filename = get_string_attr(planned, "filename");

        let image = ctx
            .client
            .create_image(&upload, Path::new(&filename))
            .await
            .or_summary("Error creating image", "upload the image")?;
        info!("Uploaded image {} ({}) from {}", upload.name, image.id, filename);

        Ok(image_state(&image, planned))
    }

    async fn read(&self, ctx: &ProviderContext, state: &Value, _diags: &mut Diagnostics) -> Result<Option<Value>> {
        let id = get_string_attr(state, "id");
        match ctx.client.get_image(&id).await {
            Ok(image) => Ok(Some(image_state(&image, state))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(ResourceError::from_api("Error reading image", "read the image", &e)),
        }
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: &Value,
        planned: &Value,
        _diags: &mut Diagnostics,
    ) -> Result<Value> {
        let image = ctx
            .client
            .get_image(&get_string_attr(prior, "id"))
            .await
            .or_summary("Error updating image", "read the image")?;
        Ok(image_state(&image, planned))
    }

    async fn delete(&self, ctx: &ProviderContext, state: &Value, _diags: &mut Diagnostics) -> Result<()> {
        let id = get_string_attr(state, "id");
        match ctx.client.delete_image(&id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(ResourceError::from_api("Error deleting image", "delete the image", &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::context_for;
    use crate::state::{bool_value, make_state};
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_uploads_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/images"))
            .and(body_string_contains("kernel-image-bytes"))
            .and(body_string_contains("plain"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "img1",
                "status": "committed",
                "name": "kernel",
                "type": "kernel",
                "uniqueid": "u-1",
                "size": 18,
                "project": "p1",
                "createdAt": "2024-01-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"kernel-image-bytes").unwrap();

        let planned = make_state(vec![
            ("id", Value::Unknown),
            ("name", string_value("kernel")),
            ("type", string_value("kernel")),
            ("filename", string_value(file.path().to_string_lossy())),
            ("encapsulated", bool_value(false)),
            ("project", string_value("p1")),
            ("status", Value::Unknown),
            ("unique_id", Value::Unknown),
            ("size", Value::Unknown),
            ("created_at", Value::Unknown),
        ]);

        let ctx = context_for(&server);
        let state = ImageResource
            .create(&ctx, &planned, &mut Diagnostics::new())
            .await
            .unwrap();

        assert_eq!(get_string_attr(&state, "id"), "img1");
        assert_eq!(get_string_attr(&state, "unique_id"), "u-1");
        assert_eq!(state.get("size").and_then(Value::as_i64), Some(18));
        assert_eq!(
            get_string_attr(&state, "filename"),
            file.path().to_string_lossy().to_string()
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_reported() {
        let server = MockServer::start().await;
        let planned = make_state(vec![
            ("name", string_value("kernel")),
            ("type", string_value("kernel")),
            ("filename", string_value("/nonexistent/kernel.bin")),
            ("project", string_value("p1")),
        ]);

        let ctx = context_for(&server);
        let err = ImageResource
            .create(&ctx, &planned, &mut Diagnostics::new())
            .await
            .unwrap_err();
        assert_eq!(err.summary, "Error creating image");
    }

    #[tokio::test]
    async fn test_read_fills_imported_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/images/img1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "img1", "name": "kernel", "type": "kernel", "project": "p1"
            })))
            .mount(&server)
            .await;

        let ctx = context_for(&server);
        let state = ImageResource
            .read(&ctx, &ImageResource.import_state("img1"), &mut Diagnostics::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(get_string_attr(&state, "type"), "kernel");
        assert_eq!(get_string_attr(&state, "project"), "p1");
    }

    #[test]
    fn test_validate_rejects_unknown_type() {
        let mut diags = Diagnostics::new();
        ImageResource.validate(&make_state(vec![("type", string_value("iso"))]), &mut diags);
        assert!(diags.has_error());
    }
}
