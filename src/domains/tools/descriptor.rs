//! Tool descriptors and their declarative input schemas.
//!
//! A descriptor is pure data: the name clients call, a description, and the
//! parameters the tool accepts. The schema is both advertised to clients (as
//! JSON Schema) and enforced before a tool body ever runs.

use std::sync::Arc;

use rmcp::model::Tool;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use super::error::ToolError;

/// JSON object passed as tool arguments.
pub type JsonObject = Map<String, Value>;

// ============================================================================
// Parameter types
// ============================================================================

/// JSON type accepted by a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// JSON Schema type keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Parameter specification
// ============================================================================

/// One entry of a tool's input schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    name: String,
    kind: ParamType,
    description: String,
    required: bool,
    default: Option<Value>,
    choices: Vec<String>,
    items: Option<ParamType>,
}

impl ParamSpec {
    /// Create an optional parameter of the given type.
    pub fn new(name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
            default: None,
            choices: Vec::new(),
            items: None,
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::String, description)
    }

    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Integer, description)
    }

    pub fn number(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Number, description)
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Boolean, description)
    }

    pub fn object(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Object, description)
    }

    /// An array whose items are strings.
    pub fn string_list(name: impl Into<String>, description: impl Into<String>) -> Self {
        let mut spec = Self::new(name, ParamType::Array, description);
        spec.items = Some(ParamType::String);
        spec
    }

    /// Mark the parameter as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value substituted when the parameter is absent.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Restrict a string parameter to a fixed set of values.
    pub fn one_of(mut self, choices: &[&str]) -> Self {
        self.choices = choices.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParamType {
        self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    fn check(&self, value: &Value) -> Result<(), String> {
        if !self.kind.matches(value) {
            return Err(format!(
                "parameter '{}' must be of type {}, got {}",
                self.name,
                self.kind.as_str(),
                value_type_name(value)
            ));
        }

        if let (Some(items), Some(array)) = (self.items, value.as_array()) {
            if let Some(pos) = array.iter().position(|item| !items.matches(item)) {
                return Err(format!(
                    "parameter '{}' must contain only {} items (index {} is {})",
                    self.name,
                    items.as_str(),
                    pos,
                    value_type_name(&array[pos])
                ));
            }
        }

        if !self.choices.is_empty() {
            let accepted = value
                .as_str()
                .is_some_and(|s| self.choices.iter().any(|c| c == s));
            if !accepted {
                return Err(format!(
                    "parameter '{}' must be one of: {}",
                    self.name,
                    self.choices.join(", ")
                ));
            }
        }

        Ok(())
    }

    fn to_property(&self) -> Value {
        let mut property = Map::new();
        property.insert("type".into(), json!(self.kind.as_str()));
        if !self.description.is_empty() {
            property.insert("description".into(), json!(self.description));
        }
        if let Some(items) = self.items {
            property.insert("items".into(), json!({ "type": items.as_str() }));
        }
        if !self.choices.is_empty() {
            property.insert("enum".into(), json!(self.choices));
        }
        if let Some(default) = &self.default {
            property.insert("default".into(), default.clone());
        }
        Value::Object(property)
    }
}

// ============================================================================
// Input schema
// ============================================================================

/// Ordered parameter list of a tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSchema {
    params: Vec<ParamSpec>,
}

impl InputSchema {
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Validate an argument mapping and fill in defaults.
    ///
    /// Rejects unknown parameters, missing required parameters, mistyped
    /// values and values outside an enum. `null` counts as absent.
    pub fn validate(&self, mut args: JsonObject) -> Result<JsonObject, ToolError> {
        if let Some(unknown) = args
            .keys()
            .find(|key| !self.params.iter().any(|p| p.name == **key))
        {
            return Err(ToolError::invalid_arguments(format!(
                "unexpected parameter '{}'",
                unknown
            )));
        }

        for param in &self.params {
            match args.get(&param.name) {
                None | Some(Value::Null) => {
                    args.remove(&param.name);
                    if let Some(default) = &param.default {
                        args.insert(param.name.clone(), default.clone());
                    } else if param.required {
                        return Err(ToolError::invalid_arguments(format!(
                            "missing required parameter '{}'",
                            param.name
                        )));
                    }
                }
                Some(value) => param.check(value).map_err(ToolError::invalid_arguments)?,
            }
        }

        Ok(args)
    }

    /// Render as a JSON Schema object.
    pub fn to_json_schema(&self) -> JsonObject {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.to_property()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        let mut schema = Map::new();
        schema.insert("type".into(), json!("object"));
        schema.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".into(), json!(required));
        }
        schema
    }
}

// ============================================================================
// Tool descriptor
// ============================================================================

/// Immutable description of one invocable tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    schema: InputSchema,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: InputSchema::default(),
        }
    }

    /// Append a parameter to the input schema.
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.schema.params.push(spec);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &InputSchema {
        &self.schema
    }

    /// Create the rmcp Tool model advertised to clients.
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: self.name.clone().into(),
            description: Some(self.description.clone().into()),
            input_schema: Arc::new(self.schema.to_json_schema()),
            annotations: None,
            output_schema: None,
            icons: None,
            meta: None,
            title: None,
        }
    }
}

// ============================================================================
// Validated arguments
// ============================================================================

/// Arguments that passed schema validation, handed to a tool body.
#[derive(Debug, Clone, Default)]
pub struct ToolArgs(JsonObject);

impl ToolArgs {
    pub fn new(args: JsonObject) -> Self {
        Self(args)
    }

    /// Deserialize into the tool's parameter struct.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, ToolError> {
        serde_json::from_value(Value::Object(self.0))
            .map_err(|e| ToolError::invalid_arguments(e.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_inner(self) -> JsonObject {
        self.0
    }
}
