//! Metric record reported by input plugins
//!
//! A [`Metric`] is immutable once built: it always has a non-empty name and
//! at least one field, and no field key is empty. Fields and tags are kept in sorted maps so every
//! rendering of the same metric is byte-identical.

use crate::error::MetricError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Timestamp type for consistent time handling across the crate
pub type Timestamp = DateTime<Utc>;

/// Field mapping of a metric
pub type Fields = BTreeMap<String, FieldValue>;

/// Tag mapping of a metric
pub type Tags = BTreeMap<String, String>;

/// Typed scalar value of a metric field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    UInteger(u64),
    String(String),
    Boolean(bool),
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        FieldValue::Float(f64::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::UInteger(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::UInteger(u64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

/// A single measurement ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    name: String,
    fields: Fields,
    tags: Tags,
    timestamp: Timestamp,
}

impl Metric {
    /// Build a metric, rejecting an empty name, an empty field set or an
    /// empty field key
    ///
    /// # Example
    ///
    /// ```
    /// use execd_shim::metric::{FieldValue, Fields, Metric, Tags};
    /// use chrono::DateTime;
    ///
    /// let mut fields = Fields::new();
    /// fields.insert("field".to_string(), FieldValue::Integer(1));
    /// let ts = DateTime::from_timestamp(1234, 5678).unwrap();
    /// let metric = Metric::new("measurement", fields, Tags::new(), ts).unwrap();
    /// assert_eq!(metric.name(), "measurement");
    /// ```
    pub fn new(
        name: impl Into<String>,
        fields: Fields,
        tags: Tags,
        timestamp: Timestamp,
    ) -> Result<Self, MetricError> {
        let name = name.into();
        if name.is_empty() {
            return Err(MetricError::EmptyName);
        }
        if fields.is_empty() {
            return Err(MetricError::NoFields(name));
        }
        if fields.contains_key("") {
            return Err(MetricError::EmptyFieldKey(name));
        }

        Ok(Self {
            name,
            fields,
            tags,
            timestamp,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}
