//! Parameter schemas for tools and structured responses.
//!
//! Schemas are derived at compile time through [`schemars::JsonSchema`] and normalised
//! into the self-contained object schemas chat-completion APIs accept. Validation of
//! model-produced arguments happens through a compiled [`jsonschema::Validator`].
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde_json::{Map, Value};

use crate::errors::{AgentError, AgentResult};

/// The normalised schema of one Rust type.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSchema {
    /// Name of the type as reported by `schemars`
    pub name: String,
    /// The type's doc comment, if it had one
    pub description: Option<String>,
    /// Object schema with titles and meta-schema removed
    pub schema: Value,
}

/// Derive the object schema of `T`.
///
/// Every call for the same type yields an identical value. Types that do not map to a
/// JSON object (primitives, tuples, enums) are rejected, since tool arguments and
/// structured responses are always objects.
pub fn derive<T: JsonSchema>() -> AgentResult<DerivedSchema> {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let root = settings.into_generator().into_root_schema_for::<T>();
    let name = T::schema_name();

    let mut schema = serde_json::to_value(root).map_err(|e| AgentError::InvalidSchema {
        name: name.clone(),
        message: e.to_string(),
    })?;
    ensure_object(&name, &schema)?;
    let description = normalize(&mut schema);

    Ok(DerivedSchema {
        name,
        description,
        schema,
    })
}

fn ensure_object(name: &str, schema: &Value) -> AgentResult<()> {
    match schema.get("type").and_then(Value::as_str) {
        Some("object") => Ok(()),
        other => Err(AgentError::InvalidSchema {
            name: name.to_string(),
            message: format!(
                "expected a struct with named fields, found schema type {}",
                other.unwrap_or("<none>")
            ),
        }),
    }
}

/// Strip generator metadata and lift the top-level description out of the schema.
fn normalize(schema: &mut Value) -> Option<String> {
    let Some(object) = schema.as_object_mut() else {
        return None;
    };
    object.remove("$schema");
    let description = match object.remove("description") {
        Some(Value::String(text)) => Some(text.trim().to_string()),
        _ => None,
    };
    object
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    strip_titles(schema);
    description.filter(|text| !text.is_empty())
}

fn strip_titles(schema: &mut Value) {
    let Some(object) = schema.as_object_mut() else {
        return;
    };
    object.remove("title");

    for key in ["properties", "definitions"] {
        if let Some(Value::Object(children)) = object.get_mut(key) {
            children.values_mut().for_each(strip_titles);
        }
    }
    for key in ["anyOf", "allOf", "oneOf"] {
        if let Some(Value::Array(children)) = object.get_mut(key) {
            children.iter_mut().for_each(strip_titles);
        }
    }
    for key in ["items", "additionalProperties"] {
        if let Some(child) = object.get_mut(key) {
            strip_titles(child);
        }
    }
}

/// Forbid properties the schema does not list, on the root object only.
pub fn forbid_additional_properties(schema: &mut Value) {
    if let Some(object) = schema.as_object_mut() {
        object.insert("additionalProperties".to_string(), Value::Bool(false));
    }
}

/// Compile a schema into a reusable validator.
///
/// Schemas carry no `$schema` after normalisation, so the draft they were generated in
/// is pinned here rather than left to the validator's default.
pub fn compile(name: &str, schema: &Value) -> AgentResult<jsonschema::Validator> {
    jsonschema::options()
        .with_draft(jsonschema::Draft::Draft7)
        .build(schema)
        .map_err(|e| AgentError::InvalidSchema {
            name: name.to_string(),
            message: e.to_string(),
        })
}

/// Validate `instance`, joining every violation into one readable message.
pub fn validate(validator: &jsonschema::Validator, instance: &Value) -> Result<(), String> {
    if validator.is_valid(instance) {
        return Ok(());
    }
    let messages: Vec<String> = validator
        .iter_errors(instance)
        .map(|err| {
            let path = err.instance_path.to_string();
            if path.is_empty() {
                err.to_string()
            } else {
                format!("{} at {}", err, path)
            }
        })
        .collect();
    Err(messages.join("; "))
}

/// Turn whole floats such as `3.0` into integers wherever the schema expects an integer.
///
/// Models often emit integral values with a fractional part; the validator accepts
/// them for `integer` but serde does not.
pub fn coerce_integers(schema: &Value, value: &mut Value) {
    let Some(object) = schema.as_object() else {
        return;
    };

    for key in ["anyOf", "allOf", "oneOf"] {
        if let Some(Value::Array(branches)) = object.get(key) {
            for branch in branches {
                coerce_integers(branch, value);
            }
        }
    }

    if value.is_f64() && expects_integer(schema) {
        if let Some(integer) = value.as_f64().and_then(whole_number) {
            *value = integer;
        }
        return;
    }

    match value {
        Value::Object(fields) => {
            if let Some(Value::Object(properties)) = object.get("properties") {
                for (name, field) in fields.iter_mut() {
                    if let Some(field_schema) = properties.get(name) {
                        coerce_integers(field_schema, field);
                    }
                }
            }
        }
        Value::Array(elements) => match object.get("items") {
            Some(Value::Array(positions)) => {
                for (position, element) in positions.iter().zip(elements.iter_mut()) {
                    coerce_integers(position, element);
                }
            }
            Some(items) => {
                for element in elements.iter_mut() {
                    coerce_integers(items, element);
                }
            }
            None => {}
        },
        _ => {}
    }
}

fn expects_integer(schema: &Value) -> bool {
    match schema.get("type") {
        Some(Value::String(kind)) => kind == "integer",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind == "integer"),
        _ => false,
    }
}

fn whole_number(float: f64) -> Option<Value> {
    if !float.is_finite() || float.fract() != 0.0 {
        return None;
    }
    if float >= 0.0 && float <= u64::MAX as f64 {
        Some(Value::from(float as u64))
    } else if float >= i64::MIN as f64 {
        Some(Value::from(float as i64))
    } else {
        None
    }
}
