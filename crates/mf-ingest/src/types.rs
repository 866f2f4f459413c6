//! Core types for the ingestion pipeline.
//!
//! - [`FieldValue`]: a scalar metric value (text, integer, float or boolean)
//! - [`Payload`]: the open set of fields persisted for one sample
//! - [`MetricSample`]: one observation with its routing identifiers
//! - [`RecordId`]: identifier assigned by the backend to a stored record

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{IngestError, Result};

/// Keys accepted for the workflow identifier in bulk records.
pub const WORKFLOW_KEYS: [&str; 2] = ["WorkflowID", "workflowID"];

/// Keys accepted for the experiment identifier in bulk records.
pub const EXPERIMENT_KEYS: [&str; 2] = ["ExperimentID", "experimentID"];

/// Keys accepted for the task identifier in bulk records.
pub const TASK_KEYS: [&str; 2] = ["TaskID", "taskID"];

/// A scalar value of a metric field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Whole number.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Boolean flag.
    Bool(bool),
    /// Free text, including timestamps and numbers sent as strings.
    Text(String),
}

impl FieldValue {
    /// Returns the text content if this is a [`FieldValue::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Converts a JSON value, rejecting nulls, arrays and objects.
    ///
    /// # Errors
    ///
    /// Returns the JSON type name when the value is not a scalar.
    pub fn from_json(value: Value) -> std::result::Result<Self, &'static str> {
        match value {
            Value::String(s) => Ok(Self::Text(s)),
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float))
                .ok_or("number"),
            Value::Null => Err("null"),
            Value::Array(_) => Err("array"),
            Value::Object(_) => Err("object"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Fields persisted for one sample, keyed by field name.
pub type Payload = BTreeMap<String, FieldValue>;

/// Identifier assigned by the backend to a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps a backend identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One metric observation submitted by a monitoring agent.
///
/// The routing identifiers are kept apart from [`MetricSample::fields`]; they
/// end up in the partition name and sub-type, never in the stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Workflow the sample belongs to.
    pub workflow_id: String,
    /// Task within the workflow, if any.
    pub task_id: Option<String>,
    /// Experiment the sample belongs to; used as the backend sub-type.
    pub experiment_id: String,
    /// Metric fields and timestamps.
    pub fields: Payload,
}

impl MetricSample {
    /// Creates a sample with no fields.
    #[must_use]
    pub fn new(workflow_id: impl Into<String>, experiment_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            task_id: None,
            experiment_id: experiment_id.into(),
            fields: Payload::new(),
        }
    }

    /// Sets the task identifier. Empty strings mean "no task".
    #[must_use]
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        self.task_id = (!task_id.is_empty()).then_some(task_id);
        self
    }

    /// Adds a field and returns self for chaining.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Builds a sample from a single-write request whose identifiers came
    /// from the URL.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidSample`] if the body is not a JSON object
    /// or holds non-scalar values.
    pub fn from_body(
        workflow_id: &str,
        task_id: Option<&str>,
        experiment_id: &str,
        body: Value,
    ) -> Result<Self> {
        let Value::Object(map) = body else {
            return Err(IngestError::invalid(None, "body must be a JSON object"));
        };
        if workflow_id.is_empty() || experiment_id.is_empty() {
            return Err(IngestError::invalid(
                None,
                "workflow and experiment identifiers must not be empty",
            ));
        }

        let mut sample = Self::new(workflow_id, experiment_id);
        if let Some(task) = task_id {
            sample = sample.with_task(task);
        }
        sample.fields = collect_fields(None, map)?;
        Ok(sample)
    }

    /// Builds a sample from one element of a bulk request, which carries its
    /// identifiers inline.
    ///
    /// `TaskID` stays in the stored fields; `WorkflowID` and `ExperimentID`
    /// are removed.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidSample`] if the record is not an object,
    /// misses an identifier, or holds non-scalar values.
    pub fn from_record(index: usize, record: Value) -> Result<Self> {
        let Value::Object(map) = record else {
            return Err(IngestError::invalid(Some(index), "record must be a JSON object"));
        };

        let workflow_id = identifier(index, &map, &WORKFLOW_KEYS)?
            .ok_or_else(|| IngestError::invalid(Some(index), "missing WorkflowID"))?;
        let experiment_id = identifier(index, &map, &EXPERIMENT_KEYS)?
            .ok_or_else(|| IngestError::invalid(Some(index), "missing ExperimentID"))?;
        let task_id = identifier(index, &map, &TASK_KEYS)?;

        let mut sample = Self::new(workflow_id, experiment_id);
        if let Some(task) = task_id {
            sample = sample.with_task(task);
        }
        sample.fields = collect_fields(Some(index), map)?;
        Ok(sample)
    }
}

fn identifier(
    index: usize,
    map: &serde_json::Map<String, Value>,
    keys: &[&str],
) -> Result<Option<String>> {
    for key in keys {
        match map.get(*key) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if s.is_empty() => {}
            Some(Value::String(s)) => return Ok(Some(s.clone())),
            Some(_) => {
                return Err(IngestError::invalid(
                    Some(index),
                    format!("{key} must be a string"),
                ));
            }
        }
    }
    Ok(None)
}

fn collect_fields(index: Option<usize>, map: serde_json::Map<String, Value>) -> Result<Payload> {
    let mut fields = Payload::new();
    for (key, value) in map {
        if value.is_null()
            || WORKFLOW_KEYS.contains(&key.as_str())
            || EXPERIMENT_KEYS.contains(&key.as_str())
        {
            continue;
        }
        let value = FieldValue::from_json(value).map_err(|kind| {
            IngestError::invalid(index, format!("field {key:?} holds an unsupported {kind}"))
        })?;
        fields.insert(key, value);
    }
    Ok(fields)
}
