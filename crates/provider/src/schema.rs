//! Schema Definitions
//!
//! A small schema model shared by planning, state normalization and the
//! `GetProviderSchema` response.

use std::collections::BTreeMap;

use serde_json::json;

use crate::state::Value;
use crate::tfplugin6;

/// Primitive and collection attribute types
#[derive(Debug, Clone, PartialEq)]
pub enum AttrType {
    String,
    Number,
    Bool,
    List(Box<AttrType>),
}

impl AttrType {
    /// Terraform's JSON type expression, e.g. `["list","string"]`
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttrType::String => json!("string"),
            AttrType::Number => json!("number"),
            AttrType::Bool => json!("bool"),
            AttrType::List(inner) => json!(["list", inner.to_json()]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Nesting {
    Single,
    List,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    Primitive(AttrType),
    Nested {
        nesting: Nesting,
        attributes: Vec<Attribute>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: &'static str,
    pub kind: AttributeKind,
    pub description: &'static str,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    /// Changing the value forces a new resource
    pub requires_replace: bool,
    /// Keep the prior value while planning an update
    pub use_state_for_unknown: bool,
}

impl Attribute {
    fn new(name: &'static str, kind: AttributeKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            requires_replace: false,
            use_state_for_unknown: false,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, AttributeKind::Primitive(AttrType::String))
    }

    pub fn number(name: &'static str) -> Self {
        Self::new(name, AttributeKind::Primitive(AttrType::Number))
    }

    pub fn bool(name: &'static str) -> Self {
        Self::new(name, AttributeKind::Primitive(AttrType::Bool))
    }

    pub fn string_list(name: &'static str) -> Self {
        Self::new(
            name,
            AttributeKind::Primitive(AttrType::List(Box::new(AttrType::String))),
        )
    }

    pub fn single_nested(name: &'static str, attributes: Vec<Attribute>) -> Self {
        Self::new(
            name,
            AttributeKind::Nested {
                nesting: Nesting::Single,
                attributes,
            },
        )
    }

    pub fn list_nested(name: &'static str, attributes: Vec<Attribute>) -> Self {
        Self::new(
            name,
            AttributeKind::Nested {
                nesting: Nesting::List,
                attributes,
            },
        )
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn requires_replace(mut self) -> Self {
        self.requires_replace = true;
        self
    }

    pub fn use_state_for_unknown(mut self) -> Self {
        self.use_state_for_unknown = true;
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn to_proto(&self) -> tfplugin6::schema::Attribute {
        let (r#type, nested_type) = match &self.kind {
            AttributeKind::Primitive(ty) => (ty.to_json().to_string().into_bytes(), None),
            AttributeKind::Nested {
                nesting,
                attributes,
            } => {
                let nesting = match nesting {
                    Nesting::Single => tfplugin6::schema::object::NestingMode::Single,
                    Nesting::List => tfplugin6::schema::object::NestingMode::List,
                };
                let object = tfplugin6::schema::Object {
                    attributes: attributes.iter().map(Attribute::to_proto).collect(),
                    nesting: nesting as i32,
                };
                (Vec::new(), Some(object))
            }
        };

        tfplugin6::schema::Attribute {
            name: self.name.to_string(),
            r#type,
            nested_type,
            description: self.description.to_string(),
            required: self.required,
            optional: self.optional,
            computed: self.computed,
            sensitive: self.sensitive,
            description_kind: tfplugin6::StringKind::Plain as i32,
            deprecated: false,
        }
    }
}

/// Top-level block of a provider, resource or data source schema
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub version: i64,
    pub description: &'static str,
    pub attributes: Vec<Attribute>,
}

impl Block {
    pub fn new(description: &'static str, attributes: Vec<Attribute>) -> Self {
        Self {
            version: 0,
            description,
            attributes,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn to_proto(&self) -> tfplugin6::Schema {
        tfplugin6::Schema {
            version: self.version,
            block: Some(tfplugin6::schema::Block {
                version: self.version,
                attributes: self.attributes.iter().map(Attribute::to_proto).collect(),
                block_types: vec![],
                description: self.description.to_string(),
                description_kind: tfplugin6::StringKind::Plain as i32,
                deprecated: false,
            }),
        }
    }

    /// Shape `value` to exactly this block's attributes: unknown keys are
    /// dropped and missing ones become null.
    pub fn normalize(&self, value: &Value) -> Value {
        normalize_object(&self.attributes, value)
    }
}

fn normalize_object(attributes: &[Attribute], value: &Value) -> Value {
    match value {
        Value::Null | Value::Unknown => value.clone(),
        _ => {
            let mut out = BTreeMap::new();
            for attr in attributes {
                let v = value.get(attr.name).cloned().unwrap_or_default();
                out.insert(attr.name.to_string(), normalize_attribute(attr, &v));
            }
            Value::Map(out)
        }
    }
}

fn normalize_attribute(attr: &Attribute, value: &Value) -> Value {
    match (&attr.kind, value) {
        (
            AttributeKind::Nested {
                nesting: Nesting::Single,
                attributes,
            },
            _,
        ) => normalize_object(attributes, value),
        (
            AttributeKind::Nested {
                nesting: Nesting::List,
                attributes,
            },
            Value::List(items),
        ) => Value::List(items.iter().map(|i| normalize_object(attributes, i)).collect()),
        _ => value.clone(),
    }
}

/// Provider configuration schema
pub fn provider_schema() -> Block {
    Block::new(
        "Interact with the Corellium virtual device platform.",
        vec![
            Attribute::string("token")
                .optional()
                .sensitive()
                .describe("API token. Falls back to CORELLIUM_API_TOKEN."),
            Attribute::string("host")
                .optional()
                .describe("API host, e.g. app.corellium.com. Falls back to CORELLIUM_API_HOST."),
        ],
    )
}
