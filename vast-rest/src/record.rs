//! Backend records decoded from JSON responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A dynamically keyed object returned by the management API.
///
/// Field order follows the response body. Accessors fail with an error naming
/// the field instead of returning `None`, so call sites can use `?`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Raw field value.
    pub fn get(&self, field: &str) -> Result<&Value> {
        self.0
            .get(field)
            .ok_or_else(|| Error::MissingField(field.to_string()))
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn str(&self, field: &str) -> Result<&str> {
        self.get(field)?.as_str().ok_or_else(|| Error::FieldType {
            field: field.to_string(),
            expected: "a string",
        })
    }

    pub fn u64(&self, field: &str) -> Result<u64> {
        self.get(field)?.as_u64().ok_or_else(|| Error::FieldType {
            field: field.to_string(),
            expected: "an unsigned integer",
        })
    }

    pub fn f64(&self, field: &str) -> Result<f64> {
        self.get(field)?.as_f64().ok_or_else(|| Error::FieldType {
            field: field.to_string(),
            expected: "a number",
        })
    }

    pub fn array(&self, field: &str) -> Result<&Vec<Value>> {
        self.get(field)?.as_array().ok_or_else(|| Error::FieldType {
            field: field.to_string(),
            expected: "an array",
        })
    }

    /// Resource identifier, rendered as a string.
    ///
    /// The API hands out numeric ids for most collections but the client does
    /// not depend on that; string ids are passed through unchanged.
    pub fn id(&self) -> Result<String> {
        match self.get("id")? {
            Value::Number(n) => Ok(n.to_string()),
            Value::String(s) => Ok(s.clone()),
            _ => Err(Error::FieldType {
                field: "id".to_string(),
                expected: "a number or string",
            }),
        }
    }

    /// The record's `name` field.
    pub fn name(&self) -> Result<&str> {
        self.str("name")
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Decoded body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    One(Record),
    Many(Vec<Record>),
}

impl Payload {
    /// Convert a JSON document into records.
    ///
    /// Objects become a single record, arrays become a sequence; anything
    /// else is not something the management API returns.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Payload::One(Record(map))),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(Record(map)),
                    other => Err(Error::Api(format!(
                        "expected an array of objects, found element {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Payload::Many),
            other => Err(Error::Api(format!(
                "expected a JSON object or array, found {}",
                other
            ))),
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Payload::One(record) => vec![record],
            Payload::Many(records) => records,
        }
    }

    /// The single record of a mutation response. Arrays yield their first
    /// element.
    pub fn into_record(self) -> Option<Record> {
        match self {
            Payload::One(record) => Some(record),
            Payload::Many(records) => records.into_iter().next(),
        }
    }
}
