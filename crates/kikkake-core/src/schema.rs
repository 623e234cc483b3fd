//! Input schemas and the validator that checks payloads against them.
//!
//! Two representations are supported:
//!
//! - [`Schema::typed`]: a Rust type. Validation parses the payload into the
//!   type; its JSON Schema (from `schemars`) is only used for metadata.
//! - [`Schema::json`]: a declarative JSON Schema, checked with the
//!   `jsonschema` crate. Every keyword of the schema's draft is enforced.

use crate::error::StepError;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use jsonschema::paths::{LazyLocation, Location};
use jsonschema::{Keyword, ValidationError, Validator};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use tracing::error;

type ParseFn = fn(&Value) -> Result<(), String>;

/// A schema derived from a Rust type.
#[derive(Clone)]
pub struct TypedSchema {
    type_name: &'static str,
    json_schema: Value,
    parse: ParseFn,
}

impl TypedSchema {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn json_schema(&self) -> &Value {
        &self.json_schema
    }
}

impl fmt::Debug for TypedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedSchema")
            .field("type_name", &self.type_name)
            .finish()
    }
}

fn parse_as<T: DeserializeOwned>(value: &Value) -> Result<(), String> {
    T::deserialize(value).map(|_| ()).map_err(|e| e.to_string())
}

/// A declared input, body or response schema.
#[derive(Debug, Clone)]
pub enum Schema {
    Typed(TypedSchema),
    Json(Value),
}

impl Schema {
    /// A schema backed by the Rust type `T`.
    ///
    /// # Examples
    ///
    /// ```
    /// use kikkake_core::schema::{validate_input, Schema};
    /// use schemars::JsonSchema;
    /// use serde::Deserialize;
    /// use serde_json::json;
    ///
    /// #[derive(Deserialize, JsonSchema)]
    /// struct Order {
    ///     id: String,
    ///     amount: u64,
    /// }
    ///
    /// let schema = Schema::typed::<Order>();
    /// assert!(validate_input(&schema, json!({"id": "1", "amount": 5}), "queue:Pay").is_ok());
    /// assert!(validate_input(&schema, json!({"id": "1"}), "queue:Pay").is_err());
    /// ```
    pub fn typed<T>() -> Self
    where
        T: JsonSchema + DeserializeOwned,
    {
        // A schemars root schema always serializes; `true` is the accept-all schema.
        let json_schema =
            serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Bool(true));
        Schema::Typed(TypedSchema {
            type_name: std::any::type_name::<T>(),
            json_schema,
            parse: parse_as::<T>,
        })
    }

    /// A declarative JSON Schema.
    pub fn json(schema: Value) -> Self {
        Schema::Json(schema)
    }

    /// The JSON Schema rendering used in registration metadata.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Schema::Typed(typed) => typed.json_schema.clone(),
            Schema::Json(value) => value.clone(),
        }
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Schema::Typed(typed) => typed.json_schema.serialize(serializer),
            Schema::Json(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Schema::Json)
    }
}

/// Validates `value` against `schema`, returning it unchanged on success.
///
/// Violations are logged at error level with the schema and `label`, then
/// returned as [`StepError::Validation`]. A declarative schema that does not
/// compile is a [`StepError::Configuration`]; the payload is never let
/// through unchecked.
pub fn validate_input(schema: &Schema, value: Value, label: &str) -> Result<Value, StepError> {
    let details = match schema {
        Schema::Typed(typed) => match (typed.parse)(&value) {
            Ok(()) => return Ok(value),
            Err(details) => {
                error!(
                    label,
                    schema = typed.type_name,
                    error = %details,
                    "Typed input validation failed"
                );
                details
            }
        },
        Schema::Json(json_schema) => {
            let validator = compile(json_schema).map_err(|e| {
                error!(label, schema = %json_schema, error = %e, "JSON Schema does not compile");
                StepError::Configuration(format!("invalid schema for {label}: {e}"))
            })?;
            let violations: Vec<String> = validator
                .iter_errors(&value)
                .map(|e| format!("{}: {}", pointer(&e.instance_path), e))
                .collect();
            if violations.is_empty() {
                return Ok(value);
            }
            let details = violations.join("; ");
            error!(
                label,
                schema = %json_schema,
                error = %details,
                "JSON Schema validation failed"
            );
            details
        }
    };
    Err(StepError::Validation {
        label: label.to_string(),
        details,
    })
}

fn compile(schema: &Value) -> Result<Validator, String> {
    jsonschema::options()
        .with_keyword("multipleOf", multiple_of_keyword)
        .build(schema)
        .map_err(|e| e.to_string())
}

/// `$` for the document root, otherwise the JSON pointer of the value.
fn pointer(location: &Location) -> String {
    match location.as_str() {
        "" => "$".to_string(),
        path => path.to_string(),
    }
}

/// `multipleOf` with a relative tolerance, so decimal steps such as `0.1`
/// accept values like `0.3` that binary floats cannot divide exactly.
struct MultipleOf {
    divisor: f64,
    location: Location,
}

const MULTIPLE_OF_TOLERANCE: f64 = 1e-9;

fn is_multiple_of(n: f64, divisor: f64) -> bool {
    let quotient = n / divisor;
    (quotient - quotient.round()).abs() <= MULTIPLE_OF_TOLERANCE * quotient.abs().max(1.0)
}

impl Keyword for MultipleOf {
    fn validate<'i>(&self, instance: &'i Value, location: &LazyLocation) -> Result<(), ValidationError<'i>> {
        if self.is_valid(instance) {
            return Ok(());
        }
        Err(ValidationError::custom(
            self.location.clone(),
            location.into(),
            instance,
            format!("{instance} is not a multiple of {}", self.divisor),
        ))
    }

    fn is_valid(&self, instance: &Value) -> bool {
        instance.as_f64().map_or(true, |n| is_multiple_of(n, self.divisor))
    }
}

fn multiple_of_keyword<'a>(
    _parent: &'a Map<String, Value>,
    value: &'a Value,
    location: Location,
) -> Result<Box<dyn Keyword>, ValidationError<'a>> {
    match value.as_f64() {
        Some(divisor) if divisor > 0.0 => Ok(Box::new(MultipleOf { divisor, location })),
        _ => Err(ValidationError::custom(
            Location::new(),
            location,
            value,
            "multipleOf must be a positive number",
        )),
    }
}

const TYPE_NAMES: &[&str] = &["null", "boolean", "object", "array", "number", "integer", "string"];

/// Checks that `schema` is a structurally sound JSON Schema.
///
/// Returns every problem found; an empty list means the schema is usable.
pub fn validate_schema(schema: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    collect_schema_errors(schema, "schema", &mut errors);
    errors
}

fn collect_schema_errors(schema: &Value, at: &str, errors: &mut Vec<String>) {
    let keywords = match schema {
        Value::Bool(_) => return,
        Value::Object(keywords) => keywords,
        _ => {
            errors.push(format!("{at}: schema must be an object"));
            return;
        }
    };

    let has_shape = ["type", "$ref", "anyOf", "oneOf", "allOf", "enum", "const"]
        .iter()
        .any(|k| keywords.contains_key(*k));
    if !has_shape {
        errors.push(format!("{at}: schema should have a 'type', '$ref', 'anyOf' or 'oneOf' property"));
    }

    if let Some(ty) = keywords.get("type") {
        let names: Vec<&Value> = match ty {
            Value::Array(names) => names.iter().collect(),
            other => vec![other],
        };
        for name in names {
            match name.as_str() {
                Some(n) if TYPE_NAMES.contains(&n) => {}
                _ => errors.push(format!("{at}: unknown type {name}")),
            }
        }
    }

    match keywords.get("properties") {
        Some(Value::Object(properties)) => {
            for (name, sub) in properties {
                collect_schema_errors(sub, &format!("{at}.properties.{name}"), errors);
            }
        }
        Some(_) => errors.push(format!("{at}: 'properties' must be an object")),
        None => {}
    }

    if let Some(required) = keywords.get("required") {
        let all_strings = required
            .as_array()
            .is_some_and(|names| names.iter().all(Value::is_string));
        if !all_strings {
            errors.push(format!("{at}: 'required' must be a list of property names"));
        }
    }

    match keywords.get("items") {
        Some(Value::Array(positional)) => {
            for (i, sub) in positional.iter().enumerate() {
                collect_schema_errors(sub, &format!("{at}.items[{i}]"), errors);
            }
        }
        Some(sub) => collect_schema_errors(sub, &format!("{at}.items"), errors),
        None => {}
    }

    for combinator in ["anyOf", "oneOf", "allOf"] {
        match keywords.get(combinator) {
            Some(Value::Array(branches)) if !branches.is_empty() => {
                for (i, sub) in branches.iter().enumerate() {
                    collect_schema_errors(sub, &format!("{at}.{combinator}[{i}]"), errors);
                }
            }
            Some(_) => errors.push(format!("{at}: '{combinator}' must be a non-empty list")),
            None => {}
        }
    }

    if keywords.get("enum").is_some_and(|e| !e.is_array()) {
        errors.push(format!("{at}: 'enum' must be a list"));
    }

    for limit in ["minItems", "maxItems", "minLength", "maxLength"] {
        if keywords.get(limit).is_some_and(|v| v.as_u64().is_none()) {
            errors.push(format!("{at}: '{limit}' must be a non-negative integer"));
        }
    }
}

/// Reports mismatches between two schemas published on the same topic.
pub fn check_schema_compatibility(first: &Value, second: &Value) -> Vec<String> {
    let mut issues = Vec::new();

    let first_type = first.get("type");
    let second_type = second.get("type");
    if first_type != second_type {
        issues.push(format!(
            "Type mismatch: {} vs {}",
            first_type.unwrap_or(&Value::Null),
            second_type.unwrap_or(&Value::Null)
        ));
    }

    let is_object = |v: Option<&Value>| v.and_then(Value::as_str) == Some("object");
    if is_object(first_type) && is_object(second_type) {
        let property_names = |schema: &Value| -> BTreeSet<String> {
            schema
                .get("properties")
                .and_then(Value::as_object)
                .map(|p| p.keys().cloned().collect())
                .unwrap_or_default()
        };
        let required_names = |schema: &Value| -> BTreeSet<String> {
            schema
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default()
        };

        let missing_in_second: Vec<String> = required_names(first)
            .difference(&property_names(second))
            .cloned()
            .collect();
        let missing_in_first: Vec<String> = required_names(second)
            .difference(&property_names(first))
            .cloned()
            .collect();

        if !missing_in_second.is_empty() {
            issues.push(format!(
                "Required fields missing in second schema: {}",
                missing_in_second.join(", ")
            ));
        }
        if !missing_in_first.is_empty() {
            issues.push(format!(
                "Required fields missing in first schema: {}",
                missing_in_first.join(", ")
            ));
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_schema() -> Schema {
        Schema::json(json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "minLength": 1},
                "amount": {"type": "number", "minimum": 0},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["id", "amount"],
            "additionalProperties": false
        }))
    }

    #[test]
    fn test_json_schema_accepts_valid_payload() {
        let value = json!({"id": "o-1", "amount": 12.5, "tags": ["a"]});
        assert_eq!(
            validate_input(&order_schema(), value.clone(), "queue:Pay").unwrap(),
            value
        );
    }

    #[test]
    fn test_json_schema_reports_every_violation() {
        let error = validate_input(
            &order_schema(),
            json!({"amount": "12", "tags": [1], "extra": true}),
            "http:CreateOrder",
        )
        .unwrap_err();
        assert!(error.is_validation());
        let message = error.to_string();
        assert!(message.starts_with("Validation failed for http:CreateOrder: "));
        assert!(message.contains(r#"$: "id" is a required property"#));
        assert!(message.contains(r#"/amount: "12" is not of type "number""#));
        assert!(message.contains(r#"/tags/0: 1 is not of type "string""#));
        assert!(message.contains("'extra'"));
    }

    #[test]
    fn test_string_and_object_keywords_are_enforced() {
        let schema = Schema::json(json!({
            "type": "object",
            "properties": {"email": {"type": "string", "pattern": "^[^@]+@[^@]+$"}},
            "minProperties": 1,
            "propertyNames": {"maxLength": 8}
        }));
        assert!(validate_input(&schema, json!({"email": "a@b.io"}), "http:Signup").is_ok());

        let error = validate_input(&schema, json!({"email": "not-an-email"}), "http:Signup").unwrap_err();
        assert!(error.is_validation());
        assert!(error.to_string().contains("/email"));

        assert!(validate_input(&schema, json!({}), "http:Signup").is_err());
        assert!(validate_input(&schema, json!({"much_too_long": 1}), "http:Signup").is_err());
    }

    #[test]
    fn test_conditional_keywords_are_enforced() {
        let schema = Schema::json(json!({
            "type": "object",
            "if": {"properties": {"kind": {"const": "card"}}},
            "then": {"required": ["last4"]},
            "dependentRequired": {"refund": ["reason"]}
        }));
        assert!(validate_input(&schema, json!({"kind": "cash"}), "queue:Pay").is_ok());
        assert!(validate_input(&schema, json!({"kind": "card"}), "queue:Pay").is_err());
        assert!(validate_input(&schema, json!({"refund": true}), "queue:Pay").is_err());
    }

    #[test]
    fn test_multiple_of_accepts_decimal_steps() {
        let schema = Schema::json(json!({"type": "number", "multipleOf": 0.1}));
        assert_eq!(validate_input(&schema, json!(0.3), "queue:Pay").unwrap(), json!(0.3));
        assert!(validate_input(&schema, json!(19.9), "queue:Pay").is_ok());
        assert!(validate_input(&schema, json!(0.35), "queue:Pay").is_err());

        let schema = Schema::json(json!({"multipleOf": 5}));
        assert!(validate_input(&schema, json!(15), "queue:Pay").is_ok());
        assert!(validate_input(&schema, json!(12), "queue:Pay").is_err());
    }

    #[test]
    fn test_uncompilable_schema_is_a_configuration_error() {
        let schema = Schema::json(json!({"type": "number", "multipleOf": -1}));
        let error = validate_input(&schema, json!(1), "queue:Pay").unwrap_err();
        assert!(matches!(error, StepError::Configuration(_)));
    }

    #[test]
    fn test_combinators_and_refs() {
        let schema = Schema::json(json!({
            "definitions": {"id": {"type": "string"}},
            "anyOf": [{"$ref": "#/definitions/id"}, {"type": "integer"}]
        }));
        assert!(validate_input(&schema, json!("x"), "l").is_ok());
        assert!(validate_input(&schema, json!(3), "l").is_ok());
        assert!(validate_input(&schema, json!(true), "l").is_err());

        let schema = Schema::json(json!({"oneOf": [{"type": "number"}, {"type": "integer"}]}));
        assert!(validate_input(&schema, json!(1.5), "l").is_ok());
        assert!(validate_input(&schema, json!(2), "l").is_err());
    }

    #[test]
    fn test_typed_schema_renders_json_schema() {
        #[derive(Deserialize, JsonSchema)]
        #[allow(dead_code)]
        struct Ping {
            message: String,
        }

        let schema = Schema::typed::<Ping>();
        let rendered = schema.to_json_schema();
        assert!(rendered.is_object());
        assert_eq!(rendered["type"], json!("object"));
        assert!(rendered["properties"]["message"].is_object());
        assert_eq!(serde_json::to_value(&schema).unwrap(), rendered);
    }

    #[test]
    fn test_validate_schema_finds_structural_problems() {
        assert!(validate_schema(&json!({"type": "object", "properties": {}})).is_empty());

        let errors = validate_schema(&json!({
            "type": "objekt",
            "properties": [],
            "required": "id"
        }));
        assert_eq!(errors.len(), 3);

        let errors = validate_schema(&json!({"description": "nothing"}));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_schema_compatibility() {
        let issues = check_schema_compatibility(&json!({"type": "string"}), &json!({"type": "number"}));
        assert_eq!(issues, vec![r#"Type mismatch: "string" vs "number""#.to_string()]);

        let issues = check_schema_compatibility(
            &json!({"type": "object", "properties": {"id": {}}, "required": ["id"]}),
            &json!({"type": "object", "properties": {"name": {}}, "required": ["name"]}),
        );
        assert_eq!(
            issues,
            vec![
                "Required fields missing in second schema: id".to_string(),
                "Required fields missing in first schema: name".to_string(),
            ]
        );
    }
}
