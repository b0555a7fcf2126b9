//! Serialization plan compiled from a JSON Schema.

use super::{SchemaError, SerializeError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::Write;

/// Keywords whose semantics the plan does not model. Values under them are
/// encoded generically.
const GENERIC_KEYWORDS: [&str; 4] = ["$ref", "anyOf", "oneOf", "allOf"];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Any,
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array(Box<Node>),
    Object(ObjectPlan),
    Nullable(Box<Node>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ObjectPlan {
    properties: Vec<Property>,
    /// Property name to its index in `properties`.
    declared: HashMap<String, usize>,
    additional: Additional,
}

#[derive(Debug, Clone, PartialEq)]
struct Property {
    name: String,
    /// Pre-encoded `"name":` fragment.
    key: Vec<u8>,
    node: Node,
    required: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Additional {
    Any,
    Drop,
    Typed(Box<Node>),
}

fn malformed(path: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::Malformed {
        path: path.to_string(),
        reason: reason.into(),
    }
}

impl Node {
    pub(crate) fn compile(schema: &Value, path: &str) -> Result<Node, SchemaError> {
        let map = match schema {
            Value::Bool(_) => return Ok(Node::Any),
            Value::Object(map) => map,
            _ => return Err(malformed(path, "schema must be an object or a boolean")),
        };

        if GENERIC_KEYWORDS.iter().any(|k| map.contains_key(*k)) {
            return Ok(Node::Any);
        }

        match map.get("type") {
            None if map.contains_key("properties") => Self::compile_named("object", map, path),
            None if map.contains_key("items") => Self::compile_named("array", map, path),
            None => Ok(Node::Any),
            Some(Value::String(name)) => Self::compile_named(name, map, path),
            Some(Value::Array(names)) => {
                let names = names
                    .iter()
                    .map(|n| n.as_str().ok_or_else(|| malformed(path, "`type` entries must be strings")))
                    .collect::<Result<Vec<_>, _>>()?;

                match names.as_slice() {
                    [single] => Self::compile_named(single, map, path),
                    [a, b] if *a == "null" || *b == "null" => {
                        let other = if *a == "null" { b } else { a };
                        Ok(Node::Nullable(Box::new(Self::compile_named(other, map, path)?)))
                    }
                    _ => Ok(Node::Any),
                }
            }
            Some(_) => Err(malformed(path, "`type` must be a string or an array of strings")),
        }
    }

    fn compile_named(name: &str, map: &Map<String, Value>, path: &str) -> Result<Node, SchemaError> {
        match name {
            "null" => Ok(Node::Null),
            "boolean" => Ok(Node::Boolean),
            "integer" => Ok(Node::Integer),
            "number" => Ok(Node::Number),
            "string" => Ok(Node::String),
            "array" => {
                let items = match map.get("items") {
                    None => Node::Any,
                    Some(items) => Node::compile(items, &format!("{}[]", path))?,
                };
                Ok(Node::Array(Box::new(items)))
            }
            "object" => Ok(Node::Object(ObjectPlan::compile(map, path)?)),
            other => Err(SchemaError::UnknownType {
                path: path.to_string(),
                name: other.to_string(),
            }),
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Node::Any => "any",
            Node::Null => "null",
            Node::Boolean => "boolean",
            Node::Integer => "integer",
            Node::Number => "number",
            Node::String => "string",
            Node::Array(_) => "array",
            Node::Object(_) => "object",
            Node::Nullable(inner) => inner.type_name(),
        }
    }

    fn mismatch(&self) -> SerializeError {
        SerializeError::TypeMismatch {
            path: String::new(),
            expected: self.type_name(),
        }
    }

    /// Append the JSON encoding of `value` to `out`.
    pub(crate) fn write(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), SerializeError> {
        match (self, value) {
            (Node::Any, _) => serde_json::to_writer(&mut *out, value)?,
            (Node::Null | Node::Nullable(_), Value::Null) => out.extend_from_slice(b"null"),
            (Node::Nullable(inner), _) => inner.write(value, out)?,
            (Node::Boolean, Value::Bool(true)) => out.extend_from_slice(b"true"),
            (Node::Boolean, Value::Bool(false)) => out.extend_from_slice(b"false"),
            (Node::Integer, Value::Number(n)) => {
                let integral = n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0);
                if !integral {
                    return Err(self.mismatch());
                }
                write!(out, "{}", n).map_err(serde_json::Error::io)?;
            }
            (Node::Number, Value::Number(n)) => write!(out, "{}", n).map_err(serde_json::Error::io)?,
            (Node::String, Value::String(_)) => serde_json::to_writer(&mut *out, value)?,
            (Node::Array(item), Value::Array(values)) => {
                out.push(b'[');
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    item.write(v, out).map_err(|e| e.nested(&format!("[{}]", i)))?;
                }
                out.push(b']');
            }
            (Node::Object(plan), Value::Object(map)) => plan.write(map, out)?,
            _ => return Err(self.mismatch()),
        }
        Ok(())
    }
}

impl ObjectPlan {
    fn compile(map: &Map<String, Value>, path: &str) -> Result<ObjectPlan, SchemaError> {
        let required: Vec<&str> = match map.get("required") {
            None => Vec::new(),
            Some(Value::Array(names)) => names
                .iter()
                .map(|n| n.as_str().ok_or_else(|| malformed(path, "`required` entries must be strings")))
                .collect::<Result<_, _>>()?,
            Some(_) => return Err(malformed(path, "`required` must be an array")),
        };

        let mut properties = Vec::new();
        match map.get("properties") {
            None => {}
            Some(Value::Object(props)) => {
                for (name, schema) in props {
                    let node = Node::compile(schema, &format!("{}.{}", path, name))?;
                    properties.push(Property {
                        key: format!("{}:", Value::String(name.clone())).into_bytes(),
                        name: name.clone(),
                        node,
                        required: required.contains(&name.as_str()),
                    });
                }
            }
            Some(_) => return Err(malformed(path, "`properties` must be an object")),
        }

        let additional = match map.get("additionalProperties") {
            None | Some(Value::Bool(true)) => Additional::Any,
            Some(Value::Bool(false)) => Additional::Drop,
            Some(schema @ Value::Object(_)) => {
                Additional::Typed(Box::new(Node::compile(schema, &format!("{}.*", path))?))
            }
            Some(_) => return Err(malformed(path, "`additionalProperties` must be a boolean or a schema")),
        };

        let declared = properties
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();
        Ok(ObjectPlan {
            properties,
            declared,
            additional,
        })
    }

    /// Keys are written in the data's own order, the same order generic
    /// encoding uses, so both paths produce identical bytes.
    fn write(&self, map: &Map<String, Value>, out: &mut Vec<u8>) -> Result<(), SerializeError> {
        if let Some(missing) = self
            .properties
            .iter()
            .find(|prop| prop.required && !map.contains_key(&prop.name))
        {
            return Err(SerializeError::MissingRequired {
                path: missing.name.clone(),
            });
        }

        out.push(b'{');
        let mut first = true;

        for (name, value) in map {
            let declared = self.declared.get(name).map(|&i| &self.properties[i]);
            if declared.is_none() && self.additional == Additional::Drop {
                continue;
            }

            if !first {
                out.push(b',');
            }
            first = false;

            match (declared, &self.additional) {
                (Some(prop), _) => {
                    out.extend_from_slice(&prop.key);
                    prop.node.write(value, out).map_err(|e| e.nested(name))?;
                }
                (None, Additional::Typed(node)) => {
                    serde_json::to_writer(&mut *out, name)?;
                    out.push(b':');
                    node.write(value, out).map_err(|e| e.nested(name))?;
                }
                (None, _) => {
                    serde_json::to_writer(&mut *out, name)?;
                    out.push(b':');
                    serde_json::to_writer(&mut *out, value)?;
                }
            }
        }

        out.push(b'}');
        Ok(())
    }
}
