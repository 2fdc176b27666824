//! Plan computation
//!
//! Terraform proposes a new state by merging configuration over the prior
//! state. The provider then marks computed attributes it cannot predict as
//! unknown and reports attributes whose change forces replacement.

use std::collections::BTreeMap;

use crate::schema::{Attribute, AttributeKind, Block, Nesting};
use crate::state::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedChange {
    pub planned_state: Value,
    /// Top-level attributes whose change forces a new resource
    pub requires_replace: Vec<String>,
}

/// Compute the planned state for a resource.
///
/// `prior` is null on create; `proposed` is null on destroy.
pub fn plan_resource(block: &Block, prior: &Value, proposed: &Value, config: &Value) -> PlannedChange {
    if proposed.is_null() {
        return PlannedChange {
            planned_state: Value::Null,
            requires_replace: vec![],
        };
    }

    let prior = (!prior.is_null()).then_some(prior);
    let planned_state = plan_object(&block.attributes, proposed, config, prior);

    let requires_replace = match prior {
        Some(prior) => block
            .attributes
            .iter()
            .filter(|a| a.requires_replace)
            .filter(|a| prior.get(a.name) != proposed.get(a.name))
            .map(|a| a.name.to_string())
            .collect(),
        None => vec![],
    };

    PlannedChange {
        planned_state,
        requires_replace,
    }
}

fn plan_object(attributes: &[Attribute], proposed: &Value, config: &Value, prior: Option<&Value>) -> Value {
    if !proposed.is_present() {
        return proposed.clone();
    }
    // An object equal to its prior self keeps every computed value
    if prior == Some(proposed) {
        return proposed.clone();
    }

    let mut out = BTreeMap::new();
    for attr in attributes {
        let p = proposed.get(attr.name).cloned().unwrap_or_default();
        let c = config.get(attr.name).cloned().unwrap_or_default();
        let prior_attr = prior.and_then(|v| v.get(attr.name));

        let planned = if attr.computed && c.is_null() {
            match prior_attr {
                Some(previous) if attr.use_state_for_unknown && previous.is_present() => previous.clone(),
                _ => Value::Unknown,
            }
        } else {
            plan_nested(attr, &p, &c, prior_attr)
        };
        out.insert(attr.name.to_string(), planned);
    }
    Value::Map(out)
}

fn plan_nested(attr: &Attribute, proposed: &Value, config: &Value, prior: Option<&Value>) -> Value {
    match &attr.kind {
        AttributeKind::Nested {
            nesting: Nesting::Single,
            attributes,
        } => plan_object(attributes, proposed, config, prior),
        AttributeKind::Nested {
            nesting: Nesting::List,
            attributes,
        } => match proposed {
            Value::List(items) => {
                let config_items = config.as_list().unwrap_or(&[]);
                let prior_items = prior.and_then(|p| p.as_list()).unwrap_or(&[]);
                Value::List(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| {
                            let c = config_items.get(i).cloned().unwrap_or_default();
                            plan_object(attributes, item, &c, prior_items.get(i))
                        })
                        .collect(),
                )
            }
            other => other.clone(),
        },
        AttributeKind::Primitive(_) => proposed.clone(),
    }
}
