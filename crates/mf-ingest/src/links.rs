//! Reference links returned to callers as acknowledgment of stored records.

use std::fmt;

use serde::Serialize;

use crate::partition::{PartitionKey, NO_TASK};

/// URL pointing at the profile a stored record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReferenceLink(String);

impl ReferenceLink {
    /// Returns the URL as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the link and returns the URL.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ReferenceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds reference links under a public base URL such as
/// `http://mf.example.org:3040/v1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkBuilder {
    base: String,
}

impl LinkBuilder {
    /// Creates a builder for the given base URL. Trailing slashes are dropped.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Base URL the links are built under.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Link for a single write: the task segment is omitted when there is
    /// no task.
    #[must_use]
    pub fn single(&self, key: &PartitionKey) -> ReferenceLink {
        let mut url = format!("{}/mf/profiles/{}", self.base, key.workflow());
        if let Some(task) = key.task() {
            url.push('/');
            url.push_str(task);
        }
        url.push('/');
        url.push_str(key.sub_type());
        ReferenceLink(url)
    }

    /// Link for one item of a bulk write: a missing task renders as `all`.
    #[must_use]
    pub fn bulk(&self, key: &PartitionKey) -> ReferenceLink {
        ReferenceLink(format!(
            "{}/mf/profiles/{}/{}/{}",
            self.base,
            key.workflow(),
            key.task().unwrap_or(NO_TASK),
            key.sub_type()
        ))
    }
}
