//! Declarative argument signatures.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::SignatureError;

/// Keyword arguments of a plugin invocation.
pub type Args = serde_json::Map<String, Value>;

/// JSON type of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Boolean,
    Integer,
    Number,
    Array,
    Object,
}

impl JsonType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    fn of(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Array => "array",
            Self::Object => "object",
        })
    }
}

/// A single declared argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Argument {
    #[serde(rename = "type")]
    pub json_type: JsonType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
}

impl Argument {
    pub fn new(json_type: JsonType, description: impl Into<String>) -> Self {
        Self {
            json_type,
            required: false,
            default: None,
            description: description.into(),
            example: None,
            allowed: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }

    pub fn with_allowed(mut self, allowed: Vec<Value>) -> Self {
        self.allowed = Some(allowed);
        self
    }
}

/// Immutable set of accepted arguments for one plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PluginSignature {
    properties: BTreeMap<String, Argument>,
}

impl PluginSignature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, argument: Argument) -> Self {
        self.properties.insert(name.into(), argument);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.properties.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Check `args` and return a copy completed with defaults.
    ///
    /// Unknown names, wrong types, values outside an enum and missing
    /// required arguments are rejected.
    pub fn validate(&self, args: &Args) -> Result<Args, SignatureError> {
        for (name, value) in args {
            let argument = self
                .properties
                .get(name)
                .ok_or_else(|| SignatureError::UnknownArgument { name: name.clone() })?;
            if !argument.json_type.matches(value) {
                return Err(SignatureError::BadType {
                    name: name.clone(),
                    expected: argument.json_type.to_string(),
                    found: JsonType::of(value).to_string(),
                });
            }
            if let Some(allowed) = &argument.allowed {
                if !allowed.contains(value) {
                    return Err(SignatureError::NotAllowed {
                        name: name.clone(),
                        value: value.to_string(),
                        allowed: allowed
                            .iter()
                            .map(Value::to_string)
                            .collect::<Vec<_>>()
                            .join(", "),
                    });
                }
            }
        }

        let mut hydrated = args.clone();
        for (name, argument) in &self.properties {
            if hydrated.contains_key(name) {
                continue;
            }
            match (&argument.default, argument.required) {
                (Some(default), _) => {
                    hydrated.insert(name.clone(), default.clone());
                }
                (None, true) => {
                    return Err(SignatureError::MissingArgument { name: name.clone() });
                }
                (None, false) => {}
            }
        }
        Ok(hydrated)
    }
}
