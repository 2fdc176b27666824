//! Provider gRPC Service
//!
//! Implements the Terraform Plugin Protocol v6 `Provider` service, routing
//! each RPC to the resource or data source named by its type.

use std::collections::HashMap;
use std::sync::Arc;

use corellium_common::ClientConfig;
use tokio::sync::{Notify, RwLock};
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::context::ProviderContext;
use crate::data_sources::{self, DataSource};
use crate::diagnostics::{top_level_path, Diagnostics, ResourceError};
use crate::plan::plan_resource;
use crate::resources::{self, Resource};
use crate::schema::provider_schema;
use crate::state::{
    decode_dynamic_value, decode_json_state, encode_dynamic_value, get_optional_string_attr, resolve_unknowns,
    Value,
};
use crate::tfplugin6::{
    apply_resource_change, configure_provider, get_metadata, get_provider_schema,
    import_resource_state, plan_resource_change, provider_server::Provider, read_data_source,
    read_resource, stop_provider, upgrade_resource_state, validate_data_resource_config,
    validate_provider_config, validate_resource_config, DynamicValue, ServerCapabilities,
};

/// Corellium Terraform Provider
pub struct CorelliumProvider {
    context: RwLock<Option<Arc<ProviderContext>>>,
    resources: HashMap<&'static str, Arc<dyn Resource>>,
    data_sources: HashMap<&'static str, Arc<dyn DataSource>>,
    shutdown: Arc<Notify>,
}

impl CorelliumProvider {
    pub fn new(shutdown: Arc<Notify>) -> Self {
        Self {
            context: RwLock::new(None),
            resources: resources::all().into_iter().map(|r| (r.type_name(), r)).collect(),
            data_sources: data_sources::all().into_iter().map(|d| (d.type_name(), d)).collect(),
            shutdown,
        }
    }

    /// Provider that skips `ConfigureProvider`
    pub fn with_context(context: ProviderContext) -> Self {
        let provider = Self::new(Arc::new(Notify::new()));
        Self {
            context: RwLock::new(Some(Arc::new(context))),
            ..provider
        }
    }

    fn resource(&self, type_name: &str) -> Result<Arc<dyn Resource>, Status> {
        self.resources
            .get(type_name)
            .cloned()
            .ok_or_else(|| Status::not_found(format!("Unknown resource type: {type_name}")))
    }

    fn data_source(&self, type_name: &str) -> Result<Arc<dyn DataSource>, Status> {
        self.data_sources
            .get(type_name)
            .cloned()
            .ok_or_else(|| Status::not_found(format!("Unknown data source type: {type_name}")))
    }

    async fn context(&self, diags: &mut Diagnostics) -> Option<Arc<ProviderContext>> {
        let context = self.context.read().await.clone();
        if context.is_none() {
            diags.error(
                "Provider not configured",
                "The provider must be configured before resources or data sources can be used.",
            );
        }
        context
    }
}

fn decode(value: Option<&DynamicValue>) -> Result<Value, Status> {
    let Some(value) = value else {
        return Ok(Value::Null);
    };
    let decoded = if !value.msgpack.is_empty() {
        decode_dynamic_value(&value.msgpack)
    } else {
        decode_json_state(&value.json)
    };
    decoded.map_err(|e| Status::invalid_argument(format!("Failed to decode value: {e}")))
}

fn encode(value: &Value) -> Result<Option<DynamicValue>, Status> {
    let msgpack = encode_dynamic_value(value).map_err(|e| Status::internal(format!("Failed to encode value: {e}")))?;
    Ok(Some(DynamicValue {
        msgpack,
        json: vec![],
    }))
}

#[tonic::async_trait]
impl Provider for CorelliumProvider {
    async fn get_metadata(
        &self,
        _request: Request<get_metadata::Request>,
    ) -> Result<Response<get_metadata::Response>, Status> {
        info!("GetMetadata called");

        let mut resources: Vec<_> = self
            .resources
            .keys()
            .map(|name| get_metadata::ResourceMetadata {
                type_name: name.to_string(),
            })
            .collect();
        resources.sort_by(|a, b| a.type_name.cmp(&b.type_name));

        let mut data_sources: Vec<_> = self
            .data_sources
            .keys()
            .map(|name| get_metadata::DataSourceMetadata {
                type_name: name.to_string(),
            })
            .collect();
        data_sources.sort_by(|a, b| a.type_name.cmp(&b.type_name));

        Ok(Response::new(get_metadata::Response {
            server_capabilities: Some(capabilities()),
            diagnostics: vec![],
            data_sources,
            resources,
        }))
    }

    async fn get_provider_schema(
        &self,
        _request: Request<get_provider_schema::Request>,
    ) -> Result<Response<get_provider_schema::Response>, Status> {
        info!("GetProviderSchema called");

        let resource_schemas = self
            .resources
            .iter()
            .map(|(name, r)| (name.to_string(), r.schema().to_proto()))
            .collect();
        let data_source_schemas = self
            .data_sources
            .iter()
            .map(|(name, d)| (name.to_string(), d.schema().to_proto()))
            .collect();

        Ok(Response::new(get_provider_schema::Response {
            provider: Some(provider_schema().to_proto()),
            resource_schemas,
            data_source_schemas,
            diagnostics: vec![],
            provider_meta: None,
            server_capabilities: Some(capabilities()),
        }))
    }

    async fn validate_provider_config(
        &self,
        request: Request<validate_provider_config::Request>,
    ) -> Result<Response<validate_provider_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode(req.config.as_ref())?;

        let mut diags = Diagnostics::new();
        if let Some(host) = config.get("host").and_then(Value::as_string) {
            if host.trim().is_empty() {
                diags.attribute_error("host", "Invalid Corellium Host", "The host must not be empty.");
            }
        }

        Ok(Response::new(validate_provider_config::Response {
            diagnostics: diags.into_proto(),
        }))
    }

    async fn validate_resource_config(
        &self,
        request: Request<validate_resource_config::Request>,
    ) -> Result<Response<validate_resource_config::Response>, Status> {
        let req = request.into_inner();
        info!("ValidateResourceConfig: {}", req.type_name);

        let resource = self.resource(&req.type_name)?;
        let config = decode(req.config.as_ref())?;

        let mut diags = Diagnostics::new();
        resource.validate(&config, &mut diags);

        Ok(Response::new(validate_resource_config::Response {
            diagnostics: diags.into_proto(),
        }))
    }

    async fn validate_data_resource_config(
        &self,
        request: Request<validate_data_resource_config::Request>,
    ) -> Result<Response<validate_data_resource_config::Response>, Status> {
        let req = request.into_inner();
        info!("ValidateDataResourceConfig: {}", req.type_name);

        self.data_source(&req.type_name)?;
        decode(req.config.as_ref())?;

        Ok(Response::new(validate_data_resource_config::Response { diagnostics: vec![] }))
    }

    async fn upgrade_resource_state(
        &self,
        request: Request<upgrade_resource_state::Request>,
    ) -> Result<Response<upgrade_resource_state::Response>, Status> {
        let req = request.into_inner();
        info!("UpgradeResourceState: {} v{}", req.type_name, req.version);

        let resource = self.resource(&req.type_name)?;
        let raw = req.raw_state.map(|r| r.json).unwrap_or_default();
        let state = decode_json_state(&raw)
            .map_err(|e| Status::invalid_argument(format!("Failed to decode prior state: {e}")))?;
        let upgraded = resource.schema().normalize(&state);

        Ok(Response::new(upgrade_resource_state::Response {
            upgraded_state: encode(&upgraded)?,
            diagnostics: vec![],
        }))
    }

    async fn configure_provider(
        &self,
        request: Request<configure_provider::Request>,
    ) -> Result<Response<configure_provider::Response>, Status> {
        let req = request.into_inner();
        info!("Configuring provider (Terraform {})", req.terraform_version);

        let config = decode(req.config.as_ref())?;
        let mut diags = Diagnostics::new();

        for (attr, label) in [("token", "Token"), ("host", "Host")] {
            if config.get(attr).is_some_and(Value::is_unknown) {
                diags.attribute_error(
                    attr,
                    &format!("Unknown Corellium {label}"),
                    &format!(
                        "The provider cannot create the Corellium API client as there is an unknown \
                         configuration value for the Corellium API {attr}."
                    ),
                );
            }
        }
        if diags.has_error() {
            return Ok(Response::new(configure_provider::Response {
                diagnostics: diags.into_proto(),
            }));
        }

        let client_config = match ClientConfig::resolve(
            get_optional_string_attr(&config, "token"),
            get_optional_string_attr(&config, "host"),
        ) {
            Ok(c) => c,
            Err(e) => {
                diags.attribute_error("token", "Missing Corellium API Token", &e.to_string());
                return Ok(Response::new(configure_provider::Response {
                    diagnostics: diags.into_proto(),
                }));
            }
        };

        let ctx = match ProviderContext::new(&client_config) {
            Ok(ctx) => ctx,
            Err(e) => {
                diags.error("Unable to Create Corellium API Client", &e.to_string());
                return Ok(Response::new(configure_provider::Response {
                    diagnostics: diags.into_proto(),
                }));
            }
        };

        match ctx.client.ready().await {
            Ok(_) => {
                info!("Provider configured for {}", client_config.base_url());
                *self.context.write().await = Some(Arc::new(ctx));
            }
            Err(e) => {
                warn!("Corellium API check failed: {}", e);
                diags.error(
                    "Unable to Create Corellium API Client",
                    &format!("An unexpected error occurred when creating the Corellium API client: {e}"),
                );
            }
        }

        Ok(Response::new(configure_provider::Response {
            diagnostics: diags.into_proto(),
        }))
    }

    async fn read_resource(
        &self,
        request: Request<read_resource::Request>,
    ) -> Result<Response<read_resource::Response>, Status> {
        let req = request.into_inner();
        info!("ReadResource: {}", req.type_name);

        let resource = self.resource(&req.type_name)?;
        let current = decode(req.current_state.as_ref())?;

        let mut diags = Diagnostics::new();
        let new_state = match self.context(&mut diags).await {
            Some(ctx) => match resource.read(&ctx, &current, &mut diags).await {
                Ok(Some(state)) => resource.schema().normalize(&state),
                Ok(None) => {
                    info!("{} no longer exists, removing from state", req.type_name);
                    Value::Null
                }
                Err(e) => {
                    diags.push_error(&e);
                    current
                }
            },
            None => current,
        };

        Ok(Response::new(read_resource::Response {
            new_state: encode(&new_state)?,
            diagnostics: diags.into_proto(),
            private: req.private,
        }))
    }

    async fn plan_resource_change(
        &self,
        request: Request<plan_resource_change::Request>,
    ) -> Result<Response<plan_resource_change::Response>, Status> {
        let req = request.into_inner();
        info!("PlanResourceChange: {}", req.type_name);

        let resource = self.resource(&req.type_name)?;
        let prior = decode(req.prior_state.as_ref())?;
        let proposed = decode(req.proposed_new_state.as_ref())?;
        let config = decode(req.config.as_ref())?;

        let change = plan_resource(&resource.schema(), &prior, &proposed, &config);

        Ok(Response::new(plan_resource_change::Response {
            planned_state: encode(&change.planned_state)?,
            requires_replace: change.requires_replace.iter().map(|a| top_level_path(a)).collect(),
            planned_private: req.prior_private,
            diagnostics: vec![],
            legacy_type_system: false,
        }))
    }

    async fn apply_resource_change(
        &self,
        request: Request<apply_resource_change::Request>,
    ) -> Result<Response<apply_resource_change::Response>, Status> {
        let req = request.into_inner();

        let resource = self.resource(&req.type_name)?;
        let prior = decode(req.prior_state.as_ref())?;
        let planned = decode(req.planned_state.as_ref())?;

        let mut diags = Diagnostics::new();
        let Some(ctx) = self.context(&mut diags).await else {
            return Ok(Response::new(apply_resource_change::Response {
                new_state: encode(&prior)?,
                private: vec![],
                diagnostics: diags.into_proto(),
                legacy_type_system: false,
            }));
        };

        let result: Result<Value, ResourceError> = if planned.is_null() {
            info!("Deleting {}", req.type_name);
            resource.delete(&ctx, &prior, &mut diags).await.map(|()| Value::Null)
        } else if prior.is_null() {
            info!("Creating {}", req.type_name);
            resource.create(&ctx, &planned, &mut diags).await
        } else {
            info!("Updating {}", req.type_name);
            resource.update(&ctx, &prior, &planned, &mut diags).await
        };

        let new_state = match result {
            Ok(state) if state.is_null() => Value::Null,
            Ok(state) => resolve_unknowns(resource.schema().normalize(&state)),
            Err(e) => {
                warn!("{} failed: {}", req.type_name, e);
                diags.push_error(&e);
                match e.partial_state {
                    // The object exists remotely; track it so it can be destroyed
                    Some(partial) => resolve_unknowns(resource.schema().normalize(&partial)),
                    // Otherwise keep what Terraform already tracks, null on create
                    None => prior,
                }
            }
        };

        Ok(Response::new(apply_resource_change::Response {
            new_state: encode(&new_state)?,
            private: req.planned_private,
            diagnostics: diags.into_proto(),
            legacy_type_system: false,
        }))
    }

    async fn import_resource_state(
        &self,
        request: Request<import_resource_state::Request>,
    ) -> Result<Response<import_resource_state::Response>, Status> {
        let req = request.into_inner();
        info!("Importing {} {}", req.type_name, req.id);

        let resource = self.resource(&req.type_name)?;
        let mut diags = Diagnostics::new();
        let mut imported_resources = vec![];

        if let Some(ctx) = self.context(&mut diags).await {
            match resource.read(&ctx, &resource.import_state(&req.id), &mut diags).await {
                Ok(Some(state)) => imported_resources.push(import_resource_state::ImportedResource {
                    type_name: req.type_name.clone(),
                    state: encode(&resource.schema().normalize(&state))?,
                    private: vec![],
                }),
                Ok(None) => diags.error(
                    "Cannot import non-existent remote object",
                    &format!("No {} with id {} exists.", req.type_name, req.id),
                ),
                Err(e) => diags.push_error(&e),
            }
        }

        Ok(Response::new(import_resource_state::Response {
            imported_resources,
            diagnostics: diags.into_proto(),
        }))
    }

    async fn read_data_source(
        &self,
        request: Request<read_data_source::Request>,
    ) -> Result<Response<read_data_source::Response>, Status> {
        let req = request.into_inner();
        info!("ReadDataSource: {}", req.type_name);

        let data_source = self.data_source(&req.type_name)?;
        let config = decode(req.config.as_ref())?;

        let mut diags = Diagnostics::new();
        let state = match self.context(&mut diags).await {
            Some(ctx) => match data_source.read(&ctx, &config, &mut diags).await {
                Ok(state) => data_source.schema().normalize(&state),
                Err(e) => {
                    diags.push_error(&e);
                    config
                }
            },
            None => config,
        };

        Ok(Response::new(read_data_source::Response {
            state: encode(&state)?,
            diagnostics: diags.into_proto(),
        }))
    }

    async fn stop_provider(
        &self,
        _request: Request<stop_provider::Request>,
    ) -> Result<Response<stop_provider::Response>, Status> {
        info!("StopProvider called");
        self.shutdown.notify_one();
        Ok(Response::new(stop_provider::Response { error: String::new() }))
    }
}

fn capabilities() -> ServerCapabilities {
    ServerCapabilities {
        plan_destroy: true,
        get_provider_schema_optional: false,
        move_resource_state: false,
    }
}
