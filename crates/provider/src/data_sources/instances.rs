//! `corellium_v1instances`: every instance visible to the token

use super::{random_id, DataSource};
use crate::context::ProviderContext;
use crate::diagnostics::{ApiResultExt, Diagnostics};
use crate::resources::instance::{instance_to_state, remote_attributes};
use crate::resources::Result;
use crate::schema::{Attribute, Block};
use crate::state::{make_state, Value};

pub struct InstancesDataSource;

#[async_trait::async_trait]
impl DataSource for InstancesDataSource {
    fn type_name(&self) -> &'static str {
        "corellium_v1instances"
    }

    fn schema(&self) -> Block {
        let mut instance = ["id", "name", "key", "flavor", "type", "project", "state", "os"]
            .into_iter()
            .map(|name| Attribute::string(name).computed())
            .collect::<Vec<_>>();
        instance.extend(remote_attributes());

        Block::new(
            "All instances visible to the API token.",
            vec![
                Attribute::string("id").computed(),
                Attribute::list_nested("instances", instance).computed(),
            ],
        )
    }

    async fn read(&self, ctx: &ProviderContext, _config: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let instances = ctx
            .client
            .list_instances()
            .await
            .or_summary("Unable to Read Corellium Instances", "list the instances")?;

        Ok(make_state(vec![
            ("id", random_id()),
            ("instances", Value::List(instances.iter().map(instance_to_state).collect())),
        ]))
    }
}
