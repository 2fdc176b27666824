//! Instance Resource handler for Terraform

use std::time::Duration;

use corellium_common::{
    Error as ApiError, Instance, InstanceAction, InstanceCreateOptions, InstanceUpdate, StateWaiter,
};
use tracing::{info, warn};

use super::{Resource, Result};
use crate::context::ProviderContext;
use crate::diagnostics::{ApiResultExt, Diagnostics, ResourceError};
use crate::schema::{Attribute, Block};
use crate::state::{
    get_bool_attr, get_int_attr, get_optional_string_attr, get_string_attr, make_state, opt_bool_value,
    opt_string_value, string_list_value, string_value, Value,
};

pub const DEFAULT_READY_TIMEOUT_SECS: i64 = 300;
const DELETE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const READY_PENDING: &[&str] = &["creating", "booting", "deleting"];
const READY_TARGET: &[&str] = &["on", "off", "paused"];
/// The status may still show the old power state right after the DELETE.
const DELETE_PENDING: &[&str] = &["deleting", "on", "off", "paused", "creating", "booting"];
const DELETE_TARGET: &[&str] = &["deleted"];
const TRANSITION_PENDING: &[&str] = &["on", "off", "paused", "booting", "creating", "rebooting"];

const IMMUTABLE: &[&str] = &["flavor", "project", "os"];

pub struct InstanceResource;

/// Attributes reported by the API that are never configured.
pub(crate) fn remote_attributes() -> Vec<Attribute> {
    vec![
        Attribute::string("state_changed").computed(),
        Attribute::string("started_at").computed(),
        Attribute::string("user_task").computed(),
        Attribute::string("task_state").computed(),
        Attribute::string("error").computed(),
        Attribute::single_nested(
            "boot_options",
            vec![
                Attribute::string("boot_args").computed(),
                Attribute::string("restore_boot_args").computed(),
                Attribute::string("udid").computed(),
                Attribute::string("ecid").computed(),
                Attribute::string("random_seed").computed(),
                Attribute::bool("pac").computed(),
                Attribute::bool("aprr").computed(),
                Attribute::string_list("additional_tags").computed(),
            ],
        )
        .computed(),
        Attribute::string("service_ip").computed(),
        Attribute::string("wifi_ip").computed(),
        Attribute::string("secondary_ip").computed(),
        Attribute::bool("panicked").computed(),
        Attribute::string("created").computed(),
        Attribute::string("model").computed(),
        Attribute::string("fwpackage").computed(),
        Attribute::single_nested(
            "agent",
            vec![Attribute::string("hash").computed(), Attribute::string("info").computed()],
        )
        .computed(),
        Attribute::single_nested(
            "netmon",
            vec![
                Attribute::string("hash").computed(),
                Attribute::string("info").computed(),
                Attribute::bool("enabled").computed(),
            ],
        )
        .computed(),
        Attribute::string("expose_port").computed(),
        Attribute::bool("fault").computed(),
        Attribute::string_list("patches").computed(),
        Attribute::single_nested(
            "created_by",
            vec![
                Attribute::string("id").computed(),
                Attribute::string("username").computed(),
                Attribute::string("label").computed(),
                Attribute::bool("deleted").computed(),
            ],
        )
        .computed(),
    ]
}

/// Map an API instance to its state object. Config-only attributes are
/// left for the caller to fill in.
pub(crate) fn instance_to_state(instance: &Instance) -> Value {
    let boot_options = match &instance.boot_options {
        Some(boot) => make_state(vec![
            ("boot_args", opt_string_value(boot.boot_args.clone())),
            ("restore_boot_args", opt_string_value(boot.restore_boot_args.clone())),
            ("udid", opt_string_value(boot.udid.clone())),
            ("ecid", opt_string_value(boot.ecid.clone())),
            ("random_seed", opt_string_value(boot.random_seed.clone())),
            ("pac", opt_bool_value(boot.pac)),
            ("aprr", opt_bool_value(boot.aprr)),
            ("additional_tags", string_list_value(&boot.additional_tags)),
        ]),
        None => Value::Null,
    };
    let agent = match &instance.agent {
        Some(agent) => make_state(vec![
            ("hash", opt_string_value(agent.hash.clone())),
            ("info", opt_string_value(agent.info.clone())),
        ]),
        None => Value::Null,
    };
    let netmon = match &instance.netmon {
        Some(netmon) => make_state(vec![
            ("hash", opt_string_value(netmon.hash.clone())),
            ("info", opt_string_value(netmon.info.clone())),
            ("enabled", opt_bool_value(netmon.enabled)),
        ]),
        None => Value::Null,
    };
    let created_by = match &instance.created_by {
        Some(by) => make_state(vec![
            ("id", opt_string_value(by.id.clone())),
            ("username", opt_string_value(by.username.clone())),
            ("label", opt_string_value(by.label.clone())),
            ("deleted", opt_bool_value(by.deleted)),
        ]),
        None => Value::Null,
    };

    make_state(vec![
        ("id", string_value(&instance.id)),
        ("name", opt_string_value(instance.name.clone())),
        ("key", opt_string_value(instance.key.clone())),
        ("flavor", opt_string_value(instance.flavor.clone())),
        ("type", opt_string_value(instance.kind.clone())),
        ("project", opt_string_value(instance.project.clone())),
        ("state", opt_string_value(instance.state.clone())),
        ("state_changed", opt_string_value(instance.state_changed.clone())),
        ("started_at", opt_string_value(instance.started.clone())),
        ("user_task", opt_string_value(instance.user_task.clone())),
        ("task_state", opt_string_value(instance.task_state.clone())),
        ("error", opt_string_value(instance.error.clone())),
        ("boot_options", boot_options),
        ("service_ip", opt_string_value(instance.service_ip.clone())),
        ("wifi_ip", opt_string_value(instance.wifi_ip.clone())),
        ("secondary_ip", opt_string_value(instance.secondary_ip.clone())),
        ("panicked", opt_bool_value(instance.panicked)),
        ("created", opt_string_value(instance.created.clone())),
        ("model", opt_string_value(instance.model.clone())),
        ("fwpackage", opt_string_value(instance.fwpackage.clone())),
        ("os", opt_string_value(instance.os.clone())),
        ("agent", agent),
        ("netmon", netmon),
        ("expose_port", opt_string_value(instance.expose_port.clone())),
        ("fault", opt_bool_value(instance.fault)),
        ("patches", string_list_value(&instance.patches)),
        ("created_by", created_by),
    ])
}

/// Instance state plus the attributes only the configuration knows.
fn resource_state(instance: &Instance, config: &Value) -> Value {
    let mut state = instance_to_state(instance);
    for attr in ["wait_for_ready", "wait_for_ready_timeout"] {
        state.set(attr, config.get(attr).cloned().unwrap_or_default());
    }
    // The API may report these in another spelling, or not at all
    for attr in IMMUTABLE {
        if let Some(configured) = config.get(attr).filter(|v| v.is_present()) {
            state.set(attr, configured.clone());
        }
    }
    state
}

fn ready_timeout(config: &Value) -> Duration {
    let secs = get_int_attr(config, "wait_for_ready_timeout", DEFAULT_READY_TIMEOUT_SECS);
    Duration::from_secs(secs.max(0) as u64)
}

async fn wait_for_ready(ctx: &ProviderContext, id: &str, timeout: Duration) -> corellium_common::Result<Instance> {
    let client = &ctx.client;
    StateWaiter::new("instance ready", READY_PENDING, READY_TARGET, timeout)
        .with_interval(ctx.poll_interval)
        .wait(|| async move {
            let instance = client.get_instance(id).await?;
            let state = instance.state.clone().unwrap_or_default();
            Ok((instance, state))
        })
        .await
}

/// Move an instance to `desired`, waiting for each step to land.
async fn apply_power_state(
    ctx: &ProviderContext,
    instance: Instance,
    desired: &str,
    timeout: Duration,
) -> Result<Instance> {
    let current = instance.state.clone().unwrap_or_default();
    let steps = InstanceAction::steps(&current, desired).ok_or_else(|| {
        ResourceError::new(
            "Error updating instance",
            format!("Cannot move an instance from {current:?} to {desired:?}"),
        )
    })?;

    let client = &ctx.client;
    let id = instance.id.clone();
    let mut instance = instance;
    for (action, reached) in steps {
        info!("Instance {}: {} -> {} ({})", id, current, reached, action.path());

        client
            .instance_action(&id, action)
            .await
            .or_summary("Error updating instance", &format!("{} the instance", action.path()))?;

        let id = id.as_str();
        let target = [reached];
        instance = StateWaiter::new(format!("instance {}", action.path()), TRANSITION_PENDING, &target, timeout)
            .with_interval(ctx.poll_interval)
            .wait(|| async move {
                let instance = client.get_instance(id).await?;
                let state = instance.state.clone().unwrap_or_default();
                Ok((instance, state))
            })
            .await
            .or_summary("Error updating instance", "change the instance state")?;
    }
    Ok(instance)
}

#[async_trait::async_trait]
impl Resource for InstanceResource {
    fn type_name(&self) -> &'static str {
        "corellium_v1instance"
    }

    fn schema(&self) -> Block {
        let mut attributes = vec![
            Attribute::string("id").computed().use_state_for_unknown(),
            Attribute::string("name").optional().computed(),
            Attribute::string("key").computed().use_state_for_unknown(),
            Attribute::string("flavor").required().describe("Device flavor, e.g. iphone12 or ranchu."),
            Attribute::string("type").computed().use_state_for_unknown(),
            Attribute::string("project").required(),
            Attribute::string("os").required().describe("Firmware version to boot."),
            Attribute::string("state")
                .optional()
                .computed()
                .describe("Power state: on, off or paused."),
        ];
        attributes.extend(remote_attributes());
        attributes.push(
            Attribute::bool("wait_for_ready")
                .optional()
                .describe("Block create until the instance leaves its creating states."),
        );
        attributes.push(
            Attribute::number("wait_for_ready_timeout")
                .optional()
                .describe("Seconds to wait for the instance, default 300."),
        );
        Block::new("A virtual device instance.", attributes)
    }

    fn validate(&self, config: &Value, diags: &mut Diagnostics) {
        if let Some(state) = config.get("state").and_then(|s| s.as_string()) {
            if !READY_TARGET.contains(&state) {
                diags.attribute_error(
                    "state",
                    "Invalid instance state",
                    &format!("State must be one of {READY_TARGET:?}, got {state:?}"),
                );
            }
        }
        if config.get("wait_for_ready_timeout").and_then(|t| t.as_i64()).is_some_and(|t| t < 0) {
            diags.attribute_error(
                "wait_for_ready_timeout",
                "Invalid timeout",
                "wait_for_ready_timeout must not be negative",
            );
        }
    }

    async fn create(&self, ctx: &ProviderContext, planned: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let options = InstanceCreateOptions {
            flavor: get_string_attr(planned, "flavor"),
            project: get_string_attr(planned, "project"),
            os: get_string_attr(planned, "os"),
            name: get_optional_string_attr(planned, "name"),
        };

        let created = ctx
            .client
            .create_instance(&options)
            .await
            .or_summary("Error creating instance", "create an instance")?;
        info!("Created instance {} ({})", created.id, options.flavor);

        // From here on the instance exists even if a later step fails
        let mut partial = planned.clone();
        partial.set("id", string_value(&created.id));

        let desired_state = get_optional_string_attr(planned, "state");
        let timeout = ready_timeout(planned);

        let settle = async {
            let instance = if get_bool_attr(planned, "wait_for_ready", false) || desired_state.is_some() {
                wait_for_ready(ctx, &created.id, timeout)
                    .await
                    .or_summary("Error creating instance", "wait for the instance to be ready")?
            } else {
                ctx.client
                    .get_instance(&created.id)
                    .await
                    .or_summary("Error creating instance", "read the new instance")?
            };

            match desired_state {
                Some(desired) => apply_power_state(ctx, instance, &desired, timeout).await,
                None => Ok::<_, ResourceError>(instance),
            }
        };

        match settle.await {
            Ok(instance) => Ok(resource_state(&instance, planned)),
            Err(e) => {
                warn!("Instance {} was created but did not settle: {}", created.id, e);
                Err(e.with_partial_state(partial))
            }
        }
    }

    async fn read(&self, ctx: &ProviderContext, state: &Value, _diags: &mut Diagnostics) -> Result<Option<Value>> {
        let id = get_string_attr(state, "id");
        match ctx.client.get_instance(&id).await {
            Ok(instance) => Ok(Some(resource_state(&instance, state))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(ResourceError::from_api("Error reading instance", "read the instance", &e)),
        }
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: &Value,
        planned: &Value,
        diags: &mut Diagnostics,
    ) -> Result<Value> {
        for attr in IMMUTABLE {
            if prior.get(attr) != planned.get(attr) {
                return Err(ResourceError::new(
                    "Error updating instance",
                    format!("It is not possible to update the instance's {attr}"),
                ));
            }
        }

        let id = get_string_attr(prior, "id");
        let instance = ctx
            .client
            .get_instance(&id)
            .await
            .or_summary("Error updating instance", "read the instance")?;

        match instance.state.as_deref() {
            Some("creating") => {
                warn!("Instance {} is still being created", id);
                diags.warning(
                    "Instance is being created",
                    "The instance is still being created; changes may not apply until it is ready.",
                );
            }
            Some("deleting") => {
                return Err(ResourceError::new(
                    "Error updating instance",
                    "The instance is being deleted and can no longer be updated",
                ));
            }
            _ => {}
        }

        if let Some(name) = get_optional_string_attr(planned, "name") {
            if instance.name.as_deref() != Some(name.as_str()) {
                ctx.client
                    .update_instance(&id, &InstanceUpdate { name })
                    .await
                    .or_summary("Error updating instance", "rename the instance")?;
            }
        }

        let instance = match get_optional_string_attr(planned, "state") {
            Some(desired) => apply_power_state(ctx, instance, &desired, ready_timeout(planned)).await?,
            None => instance,
        };

        let instance = ctx
            .client
            .get_instance(&instance.id)
            .await
            .or_summary("Error updating instance", "read the updated instance")?;
        Ok(resource_state(&instance, planned))
    }

    async fn delete(&self, ctx: &ProviderContext, state: &Value, _diags: &mut Diagnostics) -> Result<()> {
        let id = get_string_attr(state, "id");
        match ctx.client.delete_instance(&id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(ResourceError::from_api("Error deleting instance", "delete the instance", &e)),
        }

        let client = &ctx.client;
        let id_ref = id.as_str();
        StateWaiter::new("instance deletion", DELETE_PENDING, DELETE_TARGET, DELETE_TIMEOUT)
            .with_interval(ctx.poll_interval)
            .wait(|| async move {
                match client.get_instance(id_ref).await {
                    Ok(instance) => Ok(((), instance.state.unwrap_or_default())),
                    Err(ApiError::NotFound { .. }) => Ok(((), "deleted".to_string())),
                    Err(e) => Err(e),
                }
            })
            .await
            .or_summary("Error deleting instance", "wait for the instance to be deleted")?;

        info!("Deleted instance {}", id);
        Ok(())
    }
}
