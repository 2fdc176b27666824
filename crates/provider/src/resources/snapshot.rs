//! Snapshot Resource Implementation

use corellium_common::Snapshot;
use tracing::info;

use super::{Resource, Result};
use crate::context::ProviderContext;
use crate::diagnostics::{ApiResultExt, Diagnostics, ResourceError};
use crate::schema::{Attribute, Block};
use crate::state::{
    get_string_attr, make_state, opt_bool_value, opt_float_value, opt_string_value, string_value, Value,
};

pub struct SnapshotResource;

fn snapshot_state(snapshot: &Snapshot) -> Value {
    let status = match &snapshot.status {
        Some(status) => make_state(vec![
            ("task", opt_string_value(status.task.clone())),
            ("created", opt_bool_value(status.created)),
        ]),
        None => Value::Null,
    };

    make_state(vec![
        ("id", string_value(&snapshot.id)),
        ("name", string_value(&snapshot.name)),
        ("instance", string_value(&snapshot.instance)),
        ("status", status),
        ("date", opt_float_value(snapshot.date)),
        ("fresh", opt_bool_value(snapshot.fresh)),
        ("live", opt_bool_value(snapshot.live)),
        ("local", opt_bool_value(snapshot.local)),
    ])
}

#[async_trait::async_trait]
impl Resource for SnapshotResource {
    fn type_name(&self) -> &'static str {
        "corellium_v1snapshot"
    }

    fn schema(&self) -> Block {
        Block::new(
            "A point-in-time snapshot of an instance.",
            vec![
                Attribute::string("id").computed().use_state_for_unknown(),
                Attribute::string("name").required(),
                Attribute::string("instance").required(),
                Attribute::single_nested(
                    "status",
                    vec![
                        Attribute::string("task").computed(),
                        Attribute::bool("created").computed(),
                    ],
                )
                .computed(),
                Attribute::number("date").computed().use_state_for_unknown(),
                Attribute::bool("fresh").computed(),
                Attribute::bool("live").computed(),
                Attribute::bool("local").computed(),
            ],
        )
    }

    async fn create(&self, ctx: &ProviderContext, planned: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let instance = get_string_attr(planned, "instance");
        let name = get_string_attr(planned, "name");

        let snapshot = ctx
            .client
            .create_snapshot(&instance, &name)
            .await
            .or_summary("Error creating snapshot", "create a snapshot")?;
        info!("Created snapshot {} of instance {}", snapshot.id, instance);

        let mut state = snapshot_state(&snapshot);
        // Creation responses may omit the owning instance
        state.set("instance", string_value(instance));
        Ok(state)
    }

    async fn read(&self, ctx: &ProviderContext, state: &Value, _diags: &mut Diagnostics) -> Result<Option<Value>> {
        let id = get_string_attr(state, "id");
        match ctx.client.get_snapshot(&id).await {
            Ok(snapshot) => {
                let mut refreshed = snapshot_state(&snapshot);
                if snapshot.instance.is_empty() {
                    refreshed.set("instance", state.get("instance").cloned().unwrap_or_default());
                }
                Ok(Some(refreshed))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(ResourceError::from_api("Error reading snapshot", "read the snapshot", &e)),
        }
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: &Value,
        planned: &Value,
        _diags: &mut Diagnostics,
    ) -> Result<Value> {
        if prior.get("instance") != planned.get("instance") {
            return Err(ResourceError::new(
                "Error updating snapshot",
                "It is not possible to update the snapshot's instance",
            ));
        }

        let id = get_string_attr(prior, "id");
        let name = get_string_attr(planned, "name");
        let snapshot = ctx
            .client
            .rename_snapshot(&id, &name)
            .await
            .or_summary("Error updating snapshot", "rename the snapshot")?;

        let mut state = snapshot_state(&snapshot);
        state.set("instance", planned.get("instance").cloned().unwrap_or_default());
        Ok(state)
    }

    async fn delete(&self, ctx: &ProviderContext, state: &Value, _diags: &mut Diagnostics) -> Result<()> {
        let id = get_string_attr(state, "id");
        match ctx.client.delete_snapshot(&id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(ResourceError::from_api("Error deleting snapshot", "delete the snapshot", &e)),
        }
    }
}
