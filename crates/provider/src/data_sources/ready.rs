//! `corellium_v1ready`: API availability

use super::{random_id, DataSource};
use crate::context::ProviderContext;
use crate::diagnostics::{ApiResultExt, Diagnostics};
use crate::resources::Result;
use crate::schema::{Attribute, Block};
use crate::state::{make_state, string_value, Value};

pub struct ReadyDataSource;

#[async_trait::async_trait]
impl DataSource for ReadyDataSource {
    fn type_name(&self) -> &'static str {
        "corellium_v1ready"
    }

    fn schema(&self) -> Block {
        Block::new(
            "Status of the Corellium API.",
            vec![
                Attribute::string("id").computed(),
                Attribute::string("status").computed(),
            ],
        )
    }

    async fn read(&self, ctx: &ProviderContext, _config: &Value, _diags: &mut Diagnostics) -> Result<Value> {
        let ready = ctx
            .client
            .ready()
            .await
            .or_summary("Unable to Read Corellium API Status", "read the API status")?;

        Ok(make_state(vec![("id", random_id()), ("status", string_value(ready.status))]))
    }
}
