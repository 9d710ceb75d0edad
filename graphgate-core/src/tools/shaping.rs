//! Building blocks for tool argument shaping and result extraction.
//!
//! Shaping functions read flat tool arguments through [`Args`] and assemble
//! GraphQL variables with [`ObjectBuilder`], which never emits `null` for an
//! absent optional and drops nested objects that end up empty.

use serde_json::{Map, Value};

/// Largest page size a list tool accepts.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Tool arguments that cannot be turned into GraphQL variables.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("missing required argument '{0}'")]
    Missing(&'static str),

    #[error("argument '{name}' must be {expected}")]
    WrongType {
        name: &'static str,
        expected: &'static str,
    },

    #[error("argument '{name}' {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("{0}")]
    NothingToUpdate(&'static str),
}

/// Typed read access to a tool's `arguments` object.
///
/// An explicit JSON `null` is treated the same as an absent key.
#[derive(Clone, Copy)]
pub struct Args<'a>(&'a Map<String, Value>);

impl<'a> Args<'a> {
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Self(map)
    }

    fn present(&self, name: &str) -> Option<&'a Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn required_str(&self, name: &'static str) -> Result<&'a str, ShapeError> {
        let value = self.optional_str(name)?.ok_or(ShapeError::Missing(name))?;
        if value.trim().is_empty() {
            return Err(ShapeError::Invalid {
                name,
                reason: "must not be empty".to_string(),
            });
        }
        Ok(value)
    }

    pub fn optional_str(&self, name: &'static str) -> Result<Option<&'a str>, ShapeError> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(ShapeError::WrongType {
                name,
                expected: "a string",
            }),
        }
    }

    pub fn optional_int(&self, name: &'static str) -> Result<Option<i64>, ShapeError> {
        match self.present(name) {
            None => Ok(None),
            Some(v) => v.as_i64().map(Some).ok_or(ShapeError::WrongType {
                name,
                expected: "an integer",
            }),
        }
    }

    /// An optional string restricted to `allowed`. Matching is
    /// case-insensitive; the canonical spelling from `allowed` is returned.
    pub fn optional_enum(
        &self,
        name: &'static str,
        allowed: &'static [&'static str],
    ) -> Result<Option<&'static str>, ShapeError> {
        let Some(raw) = self.optional_str(name)? else {
            return Ok(None);
        };
        allowed
            .iter()
            .find(|candidate| candidate.eq_ignore_ascii_case(raw))
            .copied()
            .map(Some)
            .ok_or_else(|| ShapeError::Invalid {
                name,
                reason: format!("must be one of {}", allowed.join(", ")),
            })
    }

    pub fn required_enum(
        &self,
        name: &'static str,
        allowed: &'static [&'static str],
    ) -> Result<&'static str, ShapeError> {
        self.optional_enum(name, allowed)?
            .ok_or(ShapeError::Missing(name))
    }
}

/// Accumulates a JSON object, skipping absent optionals.
#[derive(Debug, Default, Clone)]
pub struct ObjectBuilder(Map<String, Value>);

impl ObjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn optional<V: Into<Value>>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.0.insert(key.to_string(), v.into());
        }
        self
    }

    /// Insert a nested object unless it is empty.
    pub fn nested(mut self, key: &str, child: ObjectBuilder) -> Self {
        if !child.is_empty() {
            self.0.insert(key.to_string(), Value::Object(child.0));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn build(self) -> Value {
        Value::Object(self.0)
    }
}

/// Add `first` / `after` pagination arguments.
pub fn with_pagination(args: Args<'_>, vars: ObjectBuilder) -> Result<ObjectBuilder, ShapeError> {
    let first = args.optional_int("first")?;
    if let Some(n) = first {
        if !(1..=MAX_PAGE_SIZE).contains(&n) {
            return Err(ShapeError::Invalid {
                name: "first",
                reason: format!("must be between 1 and {MAX_PAGE_SIZE}"),
            });
        }
    }
    Ok(vars
        .optional("first", first)
        .optional("after", args.optional_str("after")?))
}

/// Walk a dot-separated path through nested objects.
///
/// A missing segment (or a non-object along the way) yields `null`. An empty
/// path returns the whole value.
pub fn extract_path(data: &Value, path: &str) -> Value {
    if path.is_empty() {
        return data.clone();
    }
    path.split('.')
        .try_fold(data, |node, segment| node.get(segment))
        .cloned()
        .unwrap_or(Value::Null)
}

/// JSON Schema for a tool's input object.
pub fn object_schema(properties: Value, required: &[&str]) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Schema properties for a list tool: pagination plus `filters`.
pub fn list_properties(filters: Value) -> Value {
    let mut props = pagination_properties();
    if let Value::Object(extra) = filters {
        props.extend(extra);
    }
    Value::Object(props)
}

fn pagination_properties() -> Map<String, Value> {
    let mut props = Map::new();
    props.insert(
        "first".to_string(),
        serde_json::json!({
            "type": "integer",
            "minimum": 1,
            "maximum": MAX_PAGE_SIZE,
            "description": "Page size. Defaults to the upstream's page size."
        }),
    );
    props.insert(
        "after".to_string(),
        serde_json::json!({
            "type": "string",
            "description": "Cursor from a previous page's pageInfo.endCursor."
        }),
    );
    props
}
