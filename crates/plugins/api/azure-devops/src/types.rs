//! Azure DevOps request bodies and query criteria.
//!
//! Responses stay as opaque `serde_json::Value`. Only the bodies this crate
//! builds, and the ref lookup branch creation reads, are typed here.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Work item field reference names.
pub mod fields {
    pub const TITLE: &str = "System.Title";
    pub const DESCRIPTION: &str = "System.Description";
    pub const ASSIGNED_TO: &str = "System.AssignedTo";
    pub const AREA_PATH: &str = "System.AreaPath";
    pub const ITERATION_PATH: &str = "System.IterationPath";
    pub const STATE: &str = "System.State";
    pub const PRIORITY: &str = "Microsoft.VSTS.Common.Priority";
}

// =============================================================================
// Work items
// =============================================================================

/// One JSON-patch operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    pub value: Value,
}

impl PatchOperation {
    /// `add` operation on a work item field.
    pub fn add(field: &str, value: impl Into<Value>) -> Self {
        Self {
            op: "add".to_string(),
            path: format!("/fields/{}", field),
            value: value.into(),
        }
    }
}

/// JSON-patch document sent with `application/json-patch+json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct JsonPatchDocument(Vec<PatchOperation>);

impl JsonPatchDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an `add` for `field` when `value` is present and non-empty.
    pub fn add_opt_str(mut self, field: &str, value: Option<&str>) -> Self {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.0.push(PatchOperation::add(field, value));
        }
        self
    }

    /// Append an `add` for `field` unconditionally.
    pub fn add(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.push(PatchOperation::add(field, value));
        self
    }

    /// Append a priority `add` when set and non-zero.
    pub fn add_priority(mut self, priority: Option<u32>) -> Self {
        if let Some(priority) = priority.filter(|p| *p != 0) {
            self.0.push(PatchOperation::add(fields::PRIORITY, priority));
        }
        self
    }

    pub fn operations(&self) -> &[PatchOperation] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Body of `POST .../wit/workitemsbatch`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkItemBatchRequest {
    pub ids: Vec<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(rename = "$expand", skip_serializing_if = "Option::is_none")]
    pub expand: Option<String>,
}

// =============================================================================
// Git refs, commits
// =============================================================================

/// Git ref as returned by `GET .../refs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRef {
    pub name: String,
    #[serde(default)]
    pub object_id: Option<String>,
}

/// Ref list envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitRefList {
    #[serde(default)]
    pub value: Vec<GitRef>,
}

/// One entry of `POST .../refs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefUpdate {
    pub name: String,
    pub old_object_id: String,
    pub new_object_id: String,
}

/// Filters for `GET .../commits`.
#[derive(Debug, Clone, Default)]
pub struct CommitCriteria {
    pub branch: Option<String>,
    pub top: Option<u32>,
    pub skip: Option<u32>,
    pub author: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

// =============================================================================
// Pull requests
// =============================================================================

/// Filters for `GET .../pullrequests`.
#[derive(Debug, Clone, Default)]
pub struct PullRequestCriteria {
    /// `Active`, `Abandoned`, `Completed`, `All`
    pub status: Option<String>,
    pub top: Option<u32>,
    pub skip: Option<u32>,
    pub creator_id: Option<String>,
    pub reviewer_id: Option<String>,
    pub source_ref_name: Option<String>,
    pub target_ref_name: Option<String>,
}

/// Body of `POST .../pullrequests`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePullRequest {
    pub source_ref_name: String,
    pub target_ref_name: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_draft: bool,
}

/// Body of `PATCH .../pullrequests/{id}`. Only set fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `active`, `abandoned`, `completed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_draft: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_ref_name: Option<String>,
}

impl PullRequestUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.is_draft.is_none()
            && self.target_ref_name.is_none()
    }
}

/// A new comment thread, optionally anchored to a file line.
#[derive(Debug, Clone)]
pub struct NewThread {
    pub content: String,
    pub status: String,
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
}

/// Comment payload; `commentType` 1 is a plain text comment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadComment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<u64>,
    pub content: String,
    pub comment_type: u8,
}

impl ThreadComment {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            parent_comment_id: None,
            content: content.into(),
            comment_type: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadBody {
    pub comments: Vec<ThreadComment>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_context: Option<ThreadContext>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadContext {
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_file_start: Option<FilePosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_file_end: Option<FilePosition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FilePosition {
    pub line: u32,
    pub offset: u32,
}

impl From<&NewThread> for ThreadBody {
    fn from(thread: &NewThread) -> Self {
        let thread_context = thread
            .file_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|file_path| {
                let position = thread
                    .line_number
                    .filter(|l| *l != 0)
                    .map(|line| FilePosition { line, offset: 1 });
                ThreadContext {
                    file_path: file_path.to_string(),
                    right_file_start: position,
                    right_file_end: position,
                }
            });

        Self {
            comments: vec![ThreadComment {
                parent_comment_id: Some(0),
                ..ThreadComment::text(thread.content.clone())
            }],
            status: thread.status.clone(),
            thread_context,
        }
    }
}

// =============================================================================
// Builds, pipelines
// =============================================================================

/// Filters for `GET .../build/builds`.
#[derive(Debug, Clone, Default)]
pub struct BuildFilter {
    pub definitions: Vec<u64>,
    pub branch_name: Option<String>,
    /// `all`, `completed`, `inProgress`, `notStarted`
    pub status: Option<String>,
    /// `canceled`, `failed`, `succeeded`
    pub result: Option<String>,
    pub top: Option<u32>,
    pub requested_for: Option<String>,
}

/// Body of `POST .../build/builds`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueBuildRequest {
    pub definition: DefinitionReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_branch: Option<String>,
    /// Queue-time parameters, JSON-encoded as a string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DefinitionReference {
    pub id: u64,
}

/// Body of `POST .../pipelines/{id}/runs`.
pub fn pipeline_run_body(branch: Option<&str>, variables: &HashMap<String, String>) -> Value {
    let mut body = serde_json::Map::new();

    if let Some(branch) = branch.filter(|b| !b.is_empty()) {
        body.insert(
            "resources".to_string(),
            json!({ "repositories": { "self": { "refName": format!("refs/heads/{}", branch) } } }),
        );
    }

    if !variables.is_empty() {
        let variables: serde_json::Map<String, Value> = variables
            .iter()
            .map(|(k, v)| (k.clone(), json!({ "value": v })))
            .collect();
        body.insert("variables".to_string(), Value::Object(variables));
    }

    Value::Object(body)
}

// =============================================================================
// Test plans
// =============================================================================

/// Body of `POST .../testplan/plans`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTestPlan {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

// =============================================================================
// Search
// =============================================================================

/// Code search query.
#[derive(Debug, Clone, Default)]
pub struct CodeSearch {
    pub search_text: String,
    pub project: Option<String>,
    pub repository: Option<String>,
    pub path: Option<String>,
    pub branch: Option<String>,
    pub top: u32,
    pub skip: u32,
}

/// Body of `POST .../search/codesearchresults`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSearchRequest {
    pub search_text: String,
    #[serde(rename = "$top")]
    pub top: u32,
    #[serde(rename = "$skip")]
    pub skip: u32,
    pub filters: BTreeMap<&'static str, Vec<String>>,
}

impl From<&CodeSearch> for CodeSearchRequest {
    fn from(search: &CodeSearch) -> Self {
        let mut filters = BTreeMap::new();
        for (name, value) in [
            ("Project", &search.project),
            ("Repository", &search.repository),
            ("Path", &search.path),
            ("Branch", &search.branch),
        ] {
            if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
                filters.insert(name, vec![value.clone()]);
            }
        }

        Self {
            search_text: search.search_text.clone(),
            top: search.top,
            skip: search.skip,
            filters,
        }
    }
}
