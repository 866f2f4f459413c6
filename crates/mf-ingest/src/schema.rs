//! Mapping template applied to every partition at creation.

use serde::Serialize;
use serde_json::{json, Value};

/// Length above which string values are not indexed in their `raw` sub-field.
pub const RAW_IGNORE_ABOVE: u32 = 256;

/// Date format of the `@timestamp` field (millisecond precision).
pub const TIMESTAMP_DATE_FORMAT: &str = "date_hour_minute_second_millis";

/// A mapping template for a partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PartitionSchema(Value);

impl PartitionSchema {
    /// The template used for metric partitions.
    ///
    /// Unmapped string fields are indexed as full text with a non-analyzed
    /// `raw` sub-field. `@timestamp` is a stored date, `host` and `name` are
    /// strings with a `raw` sub-field, `value` is an integer with a `raw`
    /// sub-field.
    #[must_use]
    pub fn metrics() -> Self {
        let raw_string = json!({
            "type": "string",
            "index": "not_analyzed",
            "ignore_above": RAW_IGNORE_ABOVE
        });

        Self(json!({
            "dynamic_templates": [{
                "string_fields": {
                    "match": "*",
                    "match_mapping_type": "string",
                    "mapping": {
                        "type": "string",
                        "index": "analyzed",
                        "omit_norms": true,
                        "fields": { "raw": raw_string }
                    }
                }
            }],
            "_all": { "enabled": true },
            "properties": {
                "@timestamp": {
                    "type": "date",
                    "format": TIMESTAMP_DATE_FORMAT,
                    "store": true
                },
                "host": {
                    "type": "string",
                    "norms": { "enabled": false },
                    "fields": { "raw": raw_string }
                },
                "name": {
                    "type": "string",
                    "norms": { "enabled": false },
                    "fields": { "raw": raw_string }
                },
                "value": {
                    "type": "long",
                    "norms": { "enabled": false },
                    "fields": {
                        "raw": {
                            "type": "long",
                            "index": "not_analyzed",
                            "ignore_above": RAW_IGNORE_ABOVE
                        }
                    }
                }
            }
        }))
    }

    /// Wraps an arbitrary mapping.
    #[must_use]
    pub const fn from_value(mapping: Value) -> Self {
        Self(mapping)
    }

    /// The mapping as JSON.
    #[must_use]
    pub const fn mapping(&self) -> &Value {
        &self.0
    }

    /// Explicitly mapped field names.
    pub fn explicit_fields(&self) -> impl Iterator<Item = &str> {
        self.0
            .get("properties")
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|props| props.keys().map(String::as_str))
    }
}

impl Default for PartitionSchema {
    fn default() -> Self {
        Self::metrics()
    }
}
