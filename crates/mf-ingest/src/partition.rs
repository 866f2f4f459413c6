//! Partition key resolution.
//!
//! Every `(workflow, task)` pair maps onto one backend partition named
//! `{workflow}_{task}` in lower case, or `{workflow}_all` when the sample has
//! no task. The experiment identifier becomes the sub-type inside it.

use std::fmt;

use crate::types::MetricSample;

/// Task segment used when a sample has no task.
pub const NO_TASK: &str = "all";

/// Resolves the partition name for a workflow and optional task.
///
/// Empty task identifiers count as absent.
#[must_use]
pub fn resolve(workflow_id: &str, task_id: Option<&str>) -> String {
    let task = task_id
        .filter(|t| !t.is_empty())
        .map_or_else(|| NO_TASK.to_string(), str::to_lowercase);
    format!("{}_{task}", workflow_id.to_lowercase())
}

/// Where a sample is stored: partition plus sub-type, together with the
/// lower-cased identifiers the partition was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    partition: String,
    sub_type: String,
    workflow: String,
    task: Option<String>,
}

impl PartitionKey {
    /// Builds the key for the given identifiers.
    #[must_use]
    pub fn new(workflow_id: &str, task_id: Option<&str>, experiment_id: &str) -> Self {
        Self {
            partition: resolve(workflow_id, task_id),
            sub_type: experiment_id.to_string(),
            workflow: workflow_id.to_lowercase(),
            task: task_id.filter(|t| !t.is_empty()).map(str::to_lowercase),
        }
    }

    /// Builds the key for a sample.
    #[must_use]
    pub fn for_sample(sample: &MetricSample) -> Self {
        Self::new(
            &sample.workflow_id,
            sample.task_id.as_deref(),
            &sample.experiment_id,
        )
    }

    /// Partition name.
    #[must_use]
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Sub-type within the partition (the experiment identifier).
    #[must_use]
    pub fn sub_type(&self) -> &str {
        &self.sub_type
    }

    /// Lower-cased workflow identifier.
    #[must_use]
    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    /// Lower-cased task identifier, if the sample had one.
    #[must_use]
    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, self.sub_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case("WF", Some("T1"), "wf_t1" ; "upper case")]
    #[test_case("wf", Some("t1"), "wf_t1" ; "lower case")]
    #[test_case("WF", None, "wf_all" ; "no task")]
    #[test_case("ms2", Some(""), "ms2_all" ; "empty task")]
    #[test_case("hpcfapix", Some("vector_scal01"), "hpcfapix_vector_scal01" ; "underscore in task")]
    fn resolve_cases(workflow: &str, task: Option<&str>, expected: &str) {
        assert_eq!(resolve(workflow, task), expected);
    }

    #[test]
    fn key_keeps_experiment_case() {
        let key = PartitionKey::new("MS2", Some("T2.1"), "AVUWnydqGMPeuCn4l-cj");
        assert_eq!(key.partition(), "ms2_t2.1");
        assert_eq!(key.sub_type(), "AVUWnydqGMPeuCn4l-cj");
        assert_eq!(key.workflow(), "ms2");
        assert_eq!(key.task(), Some("t2.1"));
        assert_eq!(key.to_string(), "ms2_t2.1/AVUWnydqGMPeuCn4l-cj");
    }

    #[test]
    fn key_for_sample_without_task() {
        let sample = MetricSample::new("Wf", "e1");
        let key = PartitionKey::for_sample(&sample);
        assert_eq!(key.partition(), "wf_all");
        assert!(key.task().is_none());
    }

    proptest! {
        #[test]
        fn resolve_is_case_insensitive(
            workflow in "[A-Za-z0-9.-]{1,16}",
            task in proptest::option::of("[A-Za-z0-9.-]{1,16}"),
        ) {
            let upper = resolve(&workflow.to_uppercase(), task.as_deref().map(str::to_uppercase).as_deref());
            let lower = resolve(&workflow.to_lowercase(), task.as_deref().map(str::to_lowercase).as_deref());
            prop_assert_eq!(&upper, &lower);
            prop_assert_eq!(upper, resolve(&workflow, task.as_deref()));
        }
    }
}
