//! Request parameters for list, watch and delete

use crate::error::Error;
use crate::selector::{FieldSelector, LabelSelector};
use serde::Serialize;

/// Query parameters shared by list and watch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Sent as `labelSelector`; omitted when empty
    pub label_selector: Option<String>,
    /// Sent as `fieldSelector`; omitted when empty
    pub field_selector: Option<String>,
    /// Sent as `resourceVersion`
    pub resource_version: Option<String>,
    /// Page size
    pub limit: Option<u32>,
    /// Sent as `continue`
    pub continue_token: Option<String>,
    /// Server-side timeout for the call
    pub timeout_seconds: Option<u32>,
    /// Builder error carried over from a selector
    invalid_selector: Option<String>,
}

impl ListOptions {
    /// Filter by labels
    ///
    /// A selector holding builder errors is refused by [`ListOptions::validate`].
    #[must_use]
    pub fn labels(mut self, selector: &LabelSelector) -> Self {
        self.label_selector = Some(selector.to_string());
        self.keep_first_error(selector.validate());
        self
    }

    /// Filter by fields
    #[must_use]
    pub fn fields(mut self, selector: &FieldSelector) -> Self {
        self.field_selector = Some(selector.to_string());
        self.keep_first_error(selector.validate());
        self
    }

    fn keep_first_error(&mut self, result: Result<(), Error>) {
        if let Err(err) = result {
            self.invalid_selector.get_or_insert_with(|| err.to_string());
        }
    }

    /// Check the selectors before they are sent
    ///
    /// Fails with [`Error::InvalidArgument`] when a selector builder rejected
    /// a clause or a selector string does not parse.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(reason) = &self.invalid_selector {
            return Err(Error::InvalidArgument(reason.clone()));
        }
        if let Some(labels) = &self.label_selector {
            labels.parse::<LabelSelector>()?;
        }
        if let Some(fields) = &self.field_selector {
            fields.parse::<FieldSelector>()?;
        }
        Ok(())
    }

    /// Only return objects newer than this version (watch) or at least this fresh (list)
    #[must_use]
    pub fn resource_version(mut self, version: impl Into<String>) -> Self {
        self.resource_version = Some(version.into());
        self
    }

    /// Page size
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resume a paged list
    #[must_use]
    pub fn continue_token(mut self, token: impl Into<String>) -> Self {
        self.continue_token = Some(token.into());
        self
    }

    /// Ask the server to end the call after `seconds`
    #[must_use]
    pub fn timeout_seconds(mut self, seconds: u32) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Query pairs in a stable order; empty values are dropped
    pub fn query_pairs(&self, watch: bool) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if watch {
            pairs.push(("watch", "true".to_string()));
        }
        let optional = [
            ("labelSelector", self.label_selector.clone()),
            ("fieldSelector", self.field_selector.clone()),
            ("resourceVersion", self.resource_version.clone()),
            ("limit", self.limit.map(|l| l.to_string())),
            ("continue", self.continue_token.clone()),
            ("timeoutSeconds", self.timeout_seconds.map(|t| t.to_string())),
        ];
        for (key, value) in optional {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                pairs.push((key, value));
            }
        }
        pairs
    }

    /// URL-encoded query string without the leading `?`
    pub fn to_query_string(&self, watch: bool) -> String {
        build_query_string(&self.query_pairs(watch))
    }
}

/// Build an `a=b&c=d` query string, percent-encoding each value
pub fn build_query_string(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// How dependents are handled when an owner is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PropagationPolicy {
    /// Leave dependents in place
    Orphan,
    /// Delete the owner now, dependents in the background
    Background,
    /// Delete dependents before the owner
    Foreground,
}

/// Delete preconditions checked by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preconditions {
    /// Required current resource version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    /// Required current uid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// Body of a DELETE request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOptions {
    /// Seconds before the object is removed; zero deletes immediately
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_seconds: Option<u32>,

    /// Garbage collection mode for dependents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagation_policy: Option<PropagationPolicy>,

    /// Checks the server runs before deleting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preconditions: Option<Preconditions>,
}

impl DeleteOptions {
    /// Seconds to wait before deleting
    #[must_use]
    pub fn grace_period(mut self, seconds: u32) -> Self {
        self.grace_period_seconds = Some(seconds);
        self
    }

    /// How dependents are handled
    #[must_use]
    pub fn propagation(mut self, policy: PropagationPolicy) -> Self {
        self.propagation_policy = Some(policy);
        self
    }

    /// Only delete if the stored object still has this resource version
    #[must_use]
    pub fn if_resource_version(mut self, version: impl Into<String>) -> Self {
        self.preconditions.get_or_insert_with(Preconditions::default).resource_version =
            Some(version.into());
        self
    }

    /// Whether a request body is needed at all
    pub fn is_empty(&self) -> bool {
        self == &DeleteOptions::default()
    }

    /// JSON body including the `DeleteOptions` type header
    pub(crate) fn to_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "apiVersion": "v1",
            "kind": "DeleteOptions",
        });
        if let (Some(map), Ok(serde_json::Value::Object(fields))) =
            (body.as_object_mut(), serde_json::to_value(self))
        {
            map.extend(fields);
        }
        body
    }
}
