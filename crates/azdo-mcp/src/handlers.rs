//! Tool handlers for the MCP server.
//!
//! Each tool deserializes a typed argument struct, builds a fresh
//! [`AzureDevOpsClient`] from freshly resolved credentials, runs one client
//! operation and returns the upstream JSON pretty-printed.

use std::collections::HashMap;
use std::sync::Arc;

use azdo_api::{
    AuthManager, AzureDevOpsClient, BuildFilter, CodeSearch, CommitCriteria, CreatePullRequest,
    JsonPatchDocument, NewTestPlan, NewThread, PullRequestCriteria, PullRequestUpdate,
    ServiceUrls, TokenCache,
};
use azdo_api::fields;
use azdo_core::credentials::names;
use azdo_core::{CredentialResolver, Error};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::{ToolCallResult, ToolDefinition};

// =============================================================================
// Catalog
// =============================================================================

struct ToolSpec {
    name: &'static str,
    /// Verb phrase used in `Failed to <action>: ...`
    action: &'static str,
    /// Argument whose value names the target in failure messages
    target: Option<&'static str>,
    description: &'static str,
    schema: fn() -> Value,
}

impl ToolSpec {
    fn failure_action(&self, arguments: &Value) -> String {
        match self.target.and_then(|key| arguments.get(key)) {
            Some(Value::Number(id)) => format!("{} {}", self.action, id),
            Some(Value::String(id)) => format!("{} {}", self.action, id),
            _ => self.action.to_string(),
        }
    }
}

fn schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
}

macro_rules! tool {
    ($name:literal, $args:ty, $action:literal, $description:literal) => {
        ToolSpec {
            name: $name,
            action: $action,
            target: None,
            description: $description,
            schema: schema::<$args>,
        }
    };
    ($name:literal, $args:ty, $action:literal, target = $target:literal, $description:literal) => {
        ToolSpec {
            name: $name,
            action: $action,
            target: Some($target),
            description: $description,
            schema: schema::<$args>,
        }
    };
}

const TOOLS: &[ToolSpec] = &[
    // Core
    tool!("list_projects", ListProjectsArgs, "list projects",
        "List projects in the Azure DevOps organization."),
    tool!("get_project", ProjectArgs, "get project",
        "Get details of a specific project."),
    tool!("list_teams", ListTeamsArgs, "list teams",
        "List teams in a project."),
    tool!("search_identities", SearchIdentitiesArgs, "search identities",
        "Search for identities (users/groups) in Azure DevOps."),
    // Work items
    tool!("get_work_item", GetWorkItemArgs, "get work item",
        "Get a work item by ID."),
    tool!("get_work_items_batch", GetWorkItemsBatchArgs, "get work items",
        "Get multiple work items by ID in one request."),
    tool!("create_work_item", CreateWorkItemArgs, "create work item",
        "Create a new work item (Bug, Task, User Story, ...)."),
    tool!("update_work_item", UpdateWorkItemArgs, "update work item", target = "work_item_id",
        "Update fields of an existing work item."),
    tool!("run_work_item_query", RunWorkItemQueryArgs, "run query",
        "Run a WIQL query and return matching work item references."),
    tool!("my_work_items", MyWorkItemsArgs, "get my work items",
        "Get work items assigned to the current user."),
    tool!("get_query", GetQueryArgs, "get query",
        "Get a saved work item query or query folder."),
    tool!("list_work_item_comments", ListWorkItemCommentsArgs, "list comments",
        "List comments on a work item."),
    tool!("add_work_item_comment", AddWorkItemCommentArgs, "add comment",
        "Add a comment to a work item."),
    tool!("list_backlogs", TeamArgs, "list backlogs",
        "List backlog levels for a team."),
    tool!("get_backlog_work_items", GetBacklogWorkItemsArgs, "get backlog work items",
        "Get work items in a team backlog level."),
    // Repositories
    tool!("list_repositories", ProjectArgs, "list repositories",
        "List all Git repositories in a project."),
    tool!("get_repository", RepositoryArgs, "get repository",
        "Get details of a Git repository."),
    tool!("list_branches", ListBranchesArgs, "list branches",
        "List branches in a repository."),
    tool!("create_branch", CreateBranchArgs, "create branch",
        "Create a branch from the tip of an existing branch."),
    tool!("list_commits", ListCommitsArgs, "list commits",
        "List commits in a repository."),
    tool!("get_commit", GetCommitArgs, "get commit",
        "Get a commit by ID."),
    // Pull requests
    tool!("list_pull_requests", ListPullRequestsArgs, "list pull requests",
        "List pull requests in a repository."),
    tool!("get_pull_request", PullRequestArgs, "get pull request",
        "Get a pull request by ID."),
    tool!("create_pull_request", CreatePullRequestArgs, "create pull request",
        "Create a new pull request."),
    tool!("update_pull_request", UpdatePullRequestArgs, "update pull request", target = "pull_request_id",
        "Update a pull request: title, description, status, draft flag or target branch."),
    tool!("list_pull_request_threads", PullRequestArgs, "list pull request threads",
        "List comment threads on a pull request."),
    tool!("create_pull_request_thread", CreatePullRequestThreadArgs, "create pull request thread",
        "Start a comment thread on a pull request, optionally anchored to a file line."),
    tool!("reply_to_pull_request_thread", ReplyToThreadArgs, "reply to thread",
        "Reply to an existing pull request comment thread."),
    // Builds and pipelines
    tool!("list_build_definitions", ListBuildDefinitionsArgs, "list build definitions",
        "List build/pipeline definitions in a project."),
    tool!("get_build_definition", GetBuildDefinitionArgs, "get build definition",
        "Get a build definition by ID."),
    tool!("list_builds", ListBuildsArgs, "list builds",
        "List builds in a project."),
    tool!("get_build", BuildArgs, "get build",
        "Get a build by ID."),
    tool!("queue_build", QueueBuildArgs, "queue build",
        "Queue a new build of a definition."),
    tool!("get_build_logs", BuildArgs, "get build logs",
        "List the logs of a build."),
    tool!("get_build_log", GetBuildLogArgs, "get build log",
        "Get the text of one build log, optionally a line range."),
    tool!("list_pipeline_runs", PipelineArgs, "list pipeline runs",
        "List runs of a pipeline."),
    tool!("run_pipeline", RunPipelineArgs, "run pipeline",
        "Start a new pipeline run."),
    // Wiki
    tool!("list_wikis", ListWikisArgs, "list wikis",
        "List wikis in a project or in the whole organization."),
    tool!("get_wiki", WikiArgs, "get wiki",
        "Get a wiki by name or ID."),
    tool!("list_wiki_pages", ListWikiPagesArgs, "list wiki pages",
        "List pages of a wiki below a path."),
    tool!("get_wiki_page", GetWikiPageArgs, "get wiki page",
        "Get a specific wiki page."),
    tool!("create_or_update_wiki_page", WikiPageUpsertArgs, "save wiki page",
        "Create a wiki page, or update it when the page version (ETag) is given."),
    // Test plans
    tool!("list_test_plans", ListTestPlansArgs, "list test plans",
        "List test plans in a project."),
    tool!("get_test_plan", TestPlanArgs, "get test plan",
        "Get a test plan by ID."),
    tool!("create_test_plan", CreateTestPlanArgs, "create test plan",
        "Create a new test plan."),
    tool!("list_test_suites", TestPlanArgs, "list test suites",
        "List test suites in a test plan."),
    tool!("create_test_suite", CreateTestSuiteArgs, "create test suite",
        "Create a static test suite under a parent suite."),
    tool!("list_test_cases", TestSuiteArgs, "list test cases",
        "List test cases in a test suite."),
    tool!("add_test_cases_to_suite", AddTestCasesArgs, "add test cases",
        "Add existing test case work items to a test suite."),
    tool!("get_test_results", GetTestResultsArgs, "get test results",
        "Get results of a test run."),
    // Search, iterations
    tool!("search_code", SearchCodeArgs, "search code",
        "Search for code across repositories."),
    tool!("list_iterations", ListIterationsArgs, "list iterations",
        "List iterations (sprints) for a team."),
    tool!("get_iteration", GetIterationArgs, "get iteration",
        "Get a team iteration by ID."),
];

fn find_tool(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|t| t.name == name)
}

// =============================================================================
// Arguments
// =============================================================================

fn default_state_filter() -> String {
    "wellFormed".to_string()
}

fn default_pr_status() -> String {
    "Active".to_string()
}

fn default_top() -> u32 {
    50
}

fn default_search_top() -> u32 {
    25
}

fn default_recursion_level() -> String {
    "oneLevel".to_string()
}

fn default_thread_status() -> String {
    "active".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListProjectsArgs {
    /// Filter projects by state: wellFormed, createPending, deleted, all
    #[serde(default = "default_state_filter")]
    pub state_filter: String,
    /// Maximum number of projects to return
    pub top: Option<u32>,
    /// Number of projects to skip for pagination
    pub skip: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProjectArgs {
    /// Project name or ID
    pub project: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListTeamsArgs {
    /// Project name or ID
    pub project: String,
    /// Maximum number of teams to return
    pub top: Option<u32>,
    /// Number of teams to skip for pagination
    pub skip: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchIdentitiesArgs {
    /// Filter type: General, AccountName, DisplayName, MailAddress
    pub search_filter: String,
    /// Value to search for
    pub filter_value: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetWorkItemArgs {
    /// Project name or ID
    pub project: String,
    /// Work item ID
    pub work_item_id: u64,
    /// Expand options: None, Relations, Fields, Links, All
    pub expand: Option<String>,
    /// Field reference names to return (e.g. System.Title)
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetWorkItemsBatchArgs {
    /// Project name or ID
    pub project: String,
    /// Work item IDs (at most 200)
    pub work_item_ids: Vec<u64>,
    /// Field reference names to return
    #[serde(default)]
    pub fields: Vec<String>,
    /// Expand options: None, Relations, Fields, Links, All
    pub expand: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateWorkItemArgs {
    /// Project name or ID
    pub project: String,
    /// Work item type, e.g. Bug, Task, User Story
    pub work_item_type: String,
    /// Title of the work item
    pub title: String,
    /// Description/details of the work item
    pub description: Option<String>,
    /// User to assign the work item to
    pub assigned_to: Option<String>,
    /// Area path for the work item
    pub area_path: Option<String>,
    /// Iteration path for the work item
    pub iteration_path: Option<String>,
    /// Initial state of the work item
    pub state: Option<String>,
    /// Priority (1-4, where 1 is highest)
    pub priority: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateWorkItemArgs {
    /// Project name or ID
    pub project: String,
    /// Work item ID
    pub work_item_id: u64,
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New assignee
    pub assigned_to: Option<String>,
    /// New state
    pub state: Option<String>,
    /// New priority
    pub priority: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunWorkItemQueryArgs {
    /// Project name or ID
    pub project: String,
    /// WIQL query text
    pub query: String,
    /// Maximum number of results
    pub top: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MyWorkItemsArgs {
    /// Project name or ID
    pub project: String,
    /// Include completed work items
    #[serde(default)]
    pub include_completed: bool,
    /// Maximum number of work items to return
    #[serde(default = "default_top")]
    pub top: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetQueryArgs {
    /// Project name or ID
    pub project: String,
    /// Query ID or path (e.g. "Shared Queries/Active Bugs")
    pub query_id: String,
    /// Depth of child queries to return for folders
    #[serde(default)]
    pub depth: u32,
    /// Expand options: none, wiql, clauses, all
    pub expand: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListWorkItemCommentsArgs {
    /// Project name or ID
    pub project: String,
    /// Work item ID
    pub work_item_id: u64,
    /// Maximum number of comments to return
    pub top: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddWorkItemCommentArgs {
    /// Project name or ID
    pub project: String,
    /// Work item ID
    pub work_item_id: u64,
    /// Comment text (supports HTML)
    pub text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TeamArgs {
    /// Project name or ID
    pub project: String,
    /// Team name or ID
    pub team: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetBacklogWorkItemsArgs {
    /// Project name or ID
    pub project: String,
    /// Team name or ID
    pub team: String,
    /// Backlog level ID, e.g. Microsoft.RequirementCategory
    pub backlog_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RepositoryArgs {
    /// Project name or ID
    pub project: String,
    /// Repository name or ID
    pub repository_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListBranchesArgs {
    /// Project name or ID
    pub project: String,
    /// Repository name or ID
    pub repository_id: String,
    /// Ref filter, e.g. heads/feature
    pub filter_contains: Option<String>,
    /// Maximum number of branches to return
    pub top: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateBranchArgs {
    /// Project name or ID
    pub project: String,
    /// Repository name or ID
    pub repository_id: String,
    /// New branch name, without refs/heads/
    pub branch_name: String,
    /// Existing branch to branch from, without refs/heads/
    pub source_branch: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListCommitsArgs {
    /// Project name or ID
    pub project: String,
    /// Repository name or ID
    pub repository_id: String,
    /// Branch to list commits from
    pub branch: Option<String>,
    /// Filter by author
    pub author: Option<String>,
    /// Only commits after this date (ISO 8601)
    pub from_date: Option<String>,
    /// Only commits before this date (ISO 8601)
    pub to_date: Option<String>,
    /// Maximum number of commits to return
    pub top: Option<u32>,
    /// Number of commits to skip
    pub skip: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetCommitArgs {
    /// Project name or ID
    pub project: String,
    /// Repository name or ID
    pub repository_id: String,
    /// Commit SHA
    pub commit_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListPullRequestsArgs {
    /// Project name or ID
    pub project: String,
    /// Repository name or ID
    pub repository_id: String,
    /// Filter by status: Active, Abandoned, Completed, All
    #[serde(default = "default_pr_status")]
    pub status: String,
    /// Maximum number of PRs to return
    #[serde(default = "default_top")]
    pub top: u32,
    /// Number of PRs to skip
    pub skip: Option<u32>,
    /// Filter by creator ID
    pub creator_id: Option<String>,
    /// Filter by reviewer ID
    pub reviewer_id: Option<String>,
    /// Filter by source branch (refs/heads/...)
    pub source_ref_name: Option<String>,
    /// Filter by target branch (refs/heads/...)
    pub target_ref_name: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PullRequestArgs {
    /// Project name or ID
    pub project: String,
    /// Repository name or ID
    pub repository_id: String,
    /// Pull request ID
    pub pull_request_id: u64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreatePullRequestArgs {
    /// Project name or ID
    pub project: String,
    /// Repository name or ID
    pub repository_id: String,
    /// Source branch (e.g., 'refs/heads/feature')
    pub source_ref_name: String,
    /// Target branch (e.g., 'refs/heads/main')
    pub target_ref_name: String,
    /// Pull request title
    pub title: String,
    /// Pull request description
    pub description: Option<String>,
    /// Create as draft PR
    #[serde(default)]
    pub is_draft: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdatePullRequestArgs {
    /// Project name or ID
    pub project: String,
    /// Repository name or ID
    pub repository_id: String,
    /// Pull request ID
    pub pull_request_id: u64,
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New status: active, abandoned, completed
    pub status: Option<String>,
    /// Draft flag
    pub is_draft: Option<bool>,
    /// New target branch (refs/heads/...)
    pub target_ref_name: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreatePullRequestThreadArgs {
    /// Project name or ID
    pub project: String,
    /// Repository name or ID
    pub repository_id: String,
    /// Pull request ID
    pub pull_request_id: u64,
    /// Comment text
    pub content: String,
    /// Thread status: active, fixed, wontFix, closed, pending
    #[serde(default = "default_thread_status")]
    pub status: String,
    /// File to anchor the thread to
    pub file_path: Option<String>,
    /// Line in the right-hand file to anchor to
    pub line_number: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReplyToThreadArgs {
    /// Project name or ID
    pub project: String,
    /// Repository name or ID
    pub repository_id: String,
    /// Pull request ID
    pub pull_request_id: u64,
    /// Thread ID
    pub thread_id: u64,
    /// Reply text
    pub content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListBuildDefinitionsArgs {
    /// Project name or ID
    pub project: String,
    /// Filter by definition name
    pub name: Option<String>,
    /// Filter by folder path
    pub path: Option<String>,
    /// Maximum number of definitions to return
    #[serde(default = "default_top")]
    pub top: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetBuildDefinitionArgs {
    /// Project name or ID
    pub project: String,
    /// Build definition ID
    pub definition_id: u64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListBuildsArgs {
    /// Project name or ID
    pub project: String,
    /// Only builds of these definitions
    #[serde(default)]
    pub definition_ids: Vec<u64>,
    /// Filter by branch (refs/heads/...)
    pub branch_name: Option<String>,
    /// Filter by status: all, completed, inProgress, notStarted
    pub status: Option<String>,
    /// Filter by result: canceled, failed, succeeded
    pub result: Option<String>,
    /// Maximum number of builds to return
    #[serde(default = "default_top")]
    pub top: u32,
    /// Filter by the user the build was requested for
    pub requested_for: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BuildArgs {
    /// Project name or ID
    pub project: String,
    /// Build ID
    pub build_id: u64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueueBuildArgs {
    /// Project name or ID
    pub project: String,
    /// Build definition ID to queue
    pub definition_id: u64,
    /// Branch to build (e.g., 'refs/heads/main')
    pub source_branch: Option<String>,
    /// Queue-time parameters
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetBuildLogArgs {
    /// Project name or ID
    pub project: String,
    /// Build ID
    pub build_id: u64,
    /// Log ID
    pub log_id: u64,
    /// First line to return
    pub start_line: Option<u32>,
    /// Last line to return
    pub end_line: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PipelineArgs {
    /// Project name or ID
    pub project: String,
    /// Pipeline ID
    pub pipeline_id: u64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunPipelineArgs {
    /// Project name or ID
    pub project: String,
    /// Pipeline ID
    pub pipeline_id: u64,
    /// Branch to run on (e.g., 'main')
    pub branch: Option<String>,
    /// Pipeline variables
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListWikisArgs {
    /// Project name or ID (optional)
    pub project: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WikiArgs {
    /// Project name or ID
    pub project: String,
    /// Wiki name or ID
    pub wiki_identifier: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListWikiPagesArgs {
    /// Project name or ID
    pub project: String,
    /// Wiki name or ID
    pub wiki_identifier: String,
    /// Page path to start from
    pub path: Option<String>,
    /// none, oneLevel, oneLevelPlusNestedEmptyFolders, full
    #[serde(default = "default_recursion_level")]
    pub recursion_level: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetWikiPageArgs {
    /// Project name or ID
    pub project: String,
    /// Wiki name or ID
    pub wiki_identifier: String,
    /// Page path (e.g., '/Home')
    pub path: String,
    /// Include page content in response
    #[serde(default = "default_true")]
    pub include_content: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WikiPageUpsertArgs {
    /// Project name or ID
    pub project: String,
    /// Wiki name or ID
    pub wiki_identifier: String,
    /// Page path (e.g., '/Home')
    pub path: String,
    /// Markdown content
    pub content: String,
    /// Current page version (ETag); required to update an existing page
    pub version: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListTestPlansArgs {
    /// Project name or ID
    pub project: String,
    /// Only active plans
    #[serde(default = "default_true")]
    pub filter_active: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TestPlanArgs {
    /// Project name or ID
    pub project: String,
    /// Test plan ID
    pub plan_id: u64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTestPlanArgs {
    /// Project name or ID
    pub project: String,
    /// Test plan name
    pub name: String,
    /// Area path
    pub area_path: Option<String>,
    /// Iteration path
    pub iteration: Option<String>,
    /// Start date (ISO 8601)
    pub start_date: Option<String>,
    /// End date (ISO 8601)
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTestSuiteArgs {
    /// Project name or ID
    pub project: String,
    /// Test plan ID
    pub plan_id: u64,
    /// Suite name
    pub name: String,
    /// Parent suite ID (the plan's root suite for a top-level suite)
    pub parent_suite_id: u64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TestSuiteArgs {
    /// Project name or ID
    pub project: String,
    /// Test plan ID
    pub plan_id: u64,
    /// Test suite ID
    pub suite_id: u64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddTestCasesArgs {
    /// Project name or ID
    pub project: String,
    /// Test plan ID
    pub plan_id: u64,
    /// Test suite ID
    pub suite_id: u64,
    /// Test case work item IDs
    pub test_case_ids: Vec<u64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTestResultsArgs {
    /// Project name or ID
    pub project: String,
    /// Test run ID
    pub run_id: u64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchCodeArgs {
    /// Text to search for in code
    pub search_text: String,
    /// Filter by project name
    pub project: Option<String>,
    /// Filter by repository name
    pub repository: Option<String>,
    /// Filter by path
    pub path: Option<String>,
    /// Filter by branch
    pub branch: Option<String>,
    /// Maximum number of results to return
    #[serde(default = "default_search_top")]
    pub top: u32,
    /// Number of results to skip
    #[serde(default)]
    pub skip: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListIterationsArgs {
    /// Project name or ID
    pub project: String,
    /// Team name or ID
    pub team: String,
    /// Only `current` is supported by the service
    pub timeframe: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetIterationArgs {
    /// Project name or ID
    pub project: String,
    /// Team name or ID
    pub team: String,
    /// Iteration ID
    pub iteration_id: String,
}

// =============================================================================
// Handler
// =============================================================================

/// WIQL behind `my_work_items`.
pub fn my_work_items_query(include_completed: bool) -> String {
    let state_filter = if include_completed {
        ""
    } else {
        " AND [System.State] <> 'Closed' AND [System.State] <> 'Done' AND [System.State] <> 'Removed'"
    };
    format!(
        "SELECT [System.Id], [System.Title], [System.State], [System.WorkItemType] \
         FROM WorkItems WHERE [System.AssignedTo] = @Me{} \
         ORDER BY [System.ChangedDate] DESC",
        state_filter
    )
}

enum ToolError {
    InvalidArguments(String),
    Failed(Error),
}

impl From<Error> for ToolError {
    fn from(e: Error) -> Self {
        ToolError::Failed(e)
    }
}

enum Output {
    Json(Value),
    Text(String),
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Output::Json(value)
    }
}

impl From<String> for Output {
    fn from(text: String) -> Self {
        Output::Text(text)
    }
}

fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn non_empty<T>(field: &str, values: &[T]) -> Result<(), ToolError> {
    if values.is_empty() {
        Err(ToolError::InvalidArguments(format!(
            "{} must not be empty",
            field
        )))
    } else {
        Ok(())
    }
}

/// Executes tools against Azure DevOps.
pub struct ToolHandler {
    resolver: CredentialResolver,
    cache: Arc<TokenCache>,
    urls: Option<ServiceUrls>,
    authority_url: Option<String>,
}

impl ToolHandler {
    /// Create a handler resolving credentials through `resolver` on every call.
    pub fn new(resolver: CredentialResolver) -> Self {
        Self {
            resolver,
            cache: Arc::new(TokenCache::new()),
            urls: None,
            authority_url: None,
        }
    }

    /// Handler over the process environment only.
    pub fn from_env() -> Self {
        Self::new(CredentialResolver::from_env())
    }

    /// Send every request to fixed base URLs instead of the organization's.
    pub fn with_service_urls(mut self, urls: ServiceUrls) -> Self {
        self.urls = Some(urls);
        self
    }

    /// Azure AD authority for the client-credentials exchange.
    pub fn with_authority(mut self, authority_url: impl Into<String>) -> Self {
        self.authority_url = Some(authority_url.into());
        self
    }

    /// Token cache shared by every call of this handler.
    pub fn token_cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// Get available tool definitions.
    pub fn available_tools(&self) -> Vec<ToolDefinition> {
        TOOLS
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name.to_string(),
                description: tool.description.to_string(),
                input_schema: (tool.schema)(),
                required_secrets: names::REQUIRED.iter().map(|s| s.to_string()).collect(),
            })
            .collect()
    }

    /// Execute a tool by name with arguments.
    pub async fn execute(&self, name: &str, arguments: Option<Value>) -> ToolCallResult {
        let Some(tool) = find_tool(name) else {
            return ToolCallResult::error(format!("Unknown tool: {}", name));
        };

        let arguments = match arguments {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(arguments) => arguments,
        };

        debug!(tool = name, "Executing tool");
        let action = tool.failure_action(&arguments);

        match self.dispatch(name, arguments).await {
            Ok(Output::Json(value)) => match serde_json::to_string_pretty(&value) {
                Ok(text) => ToolCallResult::text(text),
                Err(e) => ToolCallResult::error(format!("Failed to {}: {}", action, e)),
            },
            Ok(Output::Text(text)) => ToolCallResult::text(text),
            Err(ToolError::InvalidArguments(message)) => {
                ToolCallResult::error(format!("Invalid arguments for '{}': {}", name, message))
            }
            Err(ToolError::Failed(e)) => {
                warn!(tool = name, error = %e, "Tool call failed");
                ToolCallResult::error(format!("Failed to {}: {}", action, e))
            }
        }
    }

    /// Fresh client over freshly resolved credentials.
    fn client(&self) -> azdo_core::Result<AzureDevOpsClient> {
        let config = self.resolver.resolve()?;
        let mut auth = AuthManager::new(config, self.cache.clone())?;
        if let Some(authority_url) = &self.authority_url {
            auth = auth.with_authority(authority_url.clone());
        }

        match &self.urls {
            Some(urls) => AzureDevOpsClient::with_urls(auth, urls.clone()),
            None => AzureDevOpsClient::new(auth),
        }
    }

    async fn dispatch(&self, name: &str, arguments: Value) -> Result<Output, ToolError> {
        match name {
            // Core
            "list_projects" => {
                let a: ListProjectsArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client.list_projects(&a.state_filter, a.top, a.skip).await?.into())
            }
            "get_project" => {
                let a: ProjectArgs = parse(arguments)?;
                Ok(self.client()?.get_project(&a.project).await?.into())
            }
            "list_teams" => {
                let a: ListTeamsArgs = parse(arguments)?;
                Ok(self.client()?.list_teams(&a.project, a.top, a.skip).await?.into())
            }
            "search_identities" => {
                let a: SearchIdentitiesArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client.get_identities(&a.search_filter, &a.filter_value).await?.into())
            }

            // Work items
            "get_work_item" => {
                let a: GetWorkItemArgs = parse(arguments)?;
                let client = self.client()?;
                let item = client
                    .get_work_item(&a.project, a.work_item_id, a.expand.as_deref(), &a.fields)
                    .await?;
                Ok(item.into())
            }
            "get_work_items_batch" => {
                let a: GetWorkItemsBatchArgs = parse(arguments)?;
                non_empty("work_item_ids", &a.work_item_ids)?;
                let client = self.client()?;
                let items = client
                    .get_work_items_batch(&a.project, &a.work_item_ids, &a.fields, a.expand.as_deref())
                    .await?;
                Ok(items.into())
            }
            "create_work_item" => {
                let a: CreateWorkItemArgs = parse(arguments)?;
                let document = JsonPatchDocument::new()
                    .add(fields::TITLE, a.title.as_str())
                    .add_opt_str(fields::DESCRIPTION, a.description.as_deref())
                    .add_opt_str(fields::ASSIGNED_TO, a.assigned_to.as_deref())
                    .add_opt_str(fields::AREA_PATH, a.area_path.as_deref())
                    .add_opt_str(fields::ITERATION_PATH, a.iteration_path.as_deref())
                    .add_opt_str(fields::STATE, a.state.as_deref())
                    .add_priority(a.priority);
                let client = self.client()?;
                Ok(client
                    .create_work_item(&a.project, &a.work_item_type, &document)
                    .await?
                    .into())
            }
            "update_work_item" => {
                let a: UpdateWorkItemArgs = parse(arguments)?;
                let document = JsonPatchDocument::new()
                    .add_opt_str(fields::TITLE, a.title.as_deref())
                    .add_opt_str(fields::DESCRIPTION, a.description.as_deref())
                    .add_opt_str(fields::ASSIGNED_TO, a.assigned_to.as_deref())
                    .add_opt_str(fields::STATE, a.state.as_deref())
                    .add_priority(a.priority);
                if document.is_empty() {
                    return Err(Error::Validation("No fields provided to update".into()).into());
                }
                let client = self.client()?;
                Ok(client
                    .update_work_item(&a.project, a.work_item_id, &document)
                    .await?
                    .into())
            }
            "run_work_item_query" => {
                let a: RunWorkItemQueryArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client.run_wiql_query(&a.project, &a.query, a.top).await?.into())
            }
            "my_work_items" => {
                let a: MyWorkItemsArgs = parse(arguments)?;
                let query = my_work_items_query(a.include_completed);
                let client = self.client()?;
                Ok(client.run_wiql_query(&a.project, &query, Some(a.top)).await?.into())
            }
            "get_query" => {
                let a: GetQueryArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .get_query(&a.project, &a.query_id, a.depth, a.expand.as_deref())
                    .await?
                    .into())
            }
            "list_work_item_comments" => {
                let a: ListWorkItemCommentsArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .list_work_item_comments(&a.project, a.work_item_id, a.top)
                    .await?
                    .into())
            }
            "add_work_item_comment" => {
                let a: AddWorkItemCommentArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .add_work_item_comment(&a.project, a.work_item_id, &a.text)
                    .await?
                    .into())
            }
            "list_backlogs" => {
                let a: TeamArgs = parse(arguments)?;
                Ok(self.client()?.list_backlogs(&a.project, &a.team).await?.into())
            }
            "get_backlog_work_items" => {
                let a: GetBacklogWorkItemsArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .get_backlog_work_items(&a.project, &a.team, &a.backlog_id)
                    .await?
                    .into())
            }

            // Repositories
            "list_repositories" => {
                let a: ProjectArgs = parse(arguments)?;
                Ok(self.client()?.list_repositories(&a.project).await?.into())
            }
            "get_repository" => {
                let a: RepositoryArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client.get_repository(&a.project, &a.repository_id).await?.into())
            }
            "list_branches" => {
                let a: ListBranchesArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .list_branches(&a.project, &a.repository_id, a.filter_contains.as_deref(), a.top)
                    .await?
                    .into())
            }
            "create_branch" => {
                let a: CreateBranchArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .create_branch(&a.project, &a.repository_id, &a.branch_name, &a.source_branch)
                    .await?
                    .into())
            }
            "list_commits" => {
                let a: ListCommitsArgs = parse(arguments)?;
                let criteria = CommitCriteria {
                    branch: a.branch,
                    top: a.top,
                    skip: a.skip,
                    author: a.author,
                    from_date: a.from_date,
                    to_date: a.to_date,
                };
                let client = self.client()?;
                Ok(client
                    .list_commits(&a.project, &a.repository_id, &criteria)
                    .await?
                    .into())
            }
            "get_commit" => {
                let a: GetCommitArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .get_commit(&a.project, &a.repository_id, &a.commit_id)
                    .await?
                    .into())
            }

            // Pull requests
            "list_pull_requests" => {
                let a: ListPullRequestsArgs = parse(arguments)?;
                let criteria = PullRequestCriteria {
                    status: Some(a.status),
                    top: Some(a.top),
                    skip: a.skip,
                    creator_id: a.creator_id,
                    reviewer_id: a.reviewer_id,
                    source_ref_name: a.source_ref_name,
                    target_ref_name: a.target_ref_name,
                };
                let client = self.client()?;
                Ok(client
                    .list_pull_requests(&a.project, &a.repository_id, &criteria)
                    .await?
                    .into())
            }
            "get_pull_request" => {
                let a: PullRequestArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .get_pull_request(&a.project, &a.repository_id, a.pull_request_id)
                    .await?
                    .into())
            }
            "create_pull_request" => {
                let a: CreatePullRequestArgs = parse(arguments)?;
                let input = CreatePullRequest {
                    source_ref_name: a.source_ref_name,
                    target_ref_name: a.target_ref_name,
                    title: a.title,
                    description: a.description,
                    is_draft: a.is_draft,
                };
                let client = self.client()?;
                Ok(client
                    .create_pull_request(&a.project, &a.repository_id, &input)
                    .await?
                    .into())
            }
            "update_pull_request" => {
                let a: UpdatePullRequestArgs = parse(arguments)?;
                let updates = PullRequestUpdate {
                    title: a.title,
                    description: a.description,
                    status: a.status,
                    is_draft: a.is_draft,
                    target_ref_name: a.target_ref_name,
                };
                if updates.is_empty() {
                    return Err(Error::Validation("No fields provided to update".into()).into());
                }
                let client = self.client()?;
                Ok(client
                    .update_pull_request(&a.project, &a.repository_id, a.pull_request_id, &updates)
                    .await?
                    .into())
            }
            "list_pull_request_threads" => {
                let a: PullRequestArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .list_pull_request_threads(&a.project, &a.repository_id, a.pull_request_id)
                    .await?
                    .into())
            }
            "create_pull_request_thread" => {
                let a: CreatePullRequestThreadArgs = parse(arguments)?;
                let thread = NewThread {
                    content: a.content,
                    status: a.status,
                    file_path: a.file_path,
                    line_number: a.line_number,
                };
                let client = self.client()?;
                Ok(client
                    .create_pull_request_thread(&a.project, &a.repository_id, a.pull_request_id, &thread)
                    .await?
                    .into())
            }
            "reply_to_pull_request_thread" => {
                let a: ReplyToThreadArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .reply_to_thread(
                        &a.project,
                        &a.repository_id,
                        a.pull_request_id,
                        a.thread_id,
                        &a.content,
                    )
                    .await?
                    .into())
            }

            // Builds and pipelines
            "list_build_definitions" => {
                let a: ListBuildDefinitionsArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .list_build_definitions(
                        &a.project,
                        a.name.as_deref(),
                        a.path.as_deref(),
                        Some(a.top),
                    )
                    .await?
                    .into())
            }
            "get_build_definition" => {
                let a: GetBuildDefinitionArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client.get_build_definition(&a.project, a.definition_id).await?.into())
            }
            "list_builds" => {
                let a: ListBuildsArgs = parse(arguments)?;
                let filter = BuildFilter {
                    definitions: a.definition_ids,
                    branch_name: a.branch_name,
                    status: a.status,
                    result: a.result,
                    top: Some(a.top),
                    requested_for: a.requested_for,
                };
                Ok(self.client()?.list_builds(&a.project, &filter).await?.into())
            }
            "get_build" => {
                let a: BuildArgs = parse(arguments)?;
                Ok(self.client()?.get_build(&a.project, a.build_id).await?.into())
            }
            "queue_build" => {
                let a: QueueBuildArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .queue_build(
                        &a.project,
                        a.definition_id,
                        a.source_branch.as_deref(),
                        &a.parameters,
                    )
                    .await?
                    .into())
            }
            "get_build_logs" => {
                let a: BuildArgs = parse(arguments)?;
                Ok(self.client()?.get_build_logs(&a.project, a.build_id).await?.into())
            }
            "get_build_log" => {
                let a: GetBuildLogArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .get_build_log(&a.project, a.build_id, a.log_id, a.start_line, a.end_line)
                    .await?
                    .into())
            }
            "list_pipeline_runs" => {
                let a: PipelineArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client.list_pipeline_runs(&a.project, a.pipeline_id).await?.into())
            }
            "run_pipeline" => {
                let a: RunPipelineArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .run_pipeline(&a.project, a.pipeline_id, a.branch.as_deref(), &a.variables)
                    .await?
                    .into())
            }

            // Wiki
            "list_wikis" => {
                let a: ListWikisArgs = parse(arguments)?;
                Ok(self.client()?.list_wikis(a.project.as_deref()).await?.into())
            }
            "get_wiki" => {
                let a: WikiArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client.get_wiki(&a.project, &a.wiki_identifier).await?.into())
            }
            "list_wiki_pages" => {
                let a: ListWikiPagesArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .list_wiki_pages(
                        &a.project,
                        &a.wiki_identifier,
                        a.path.as_deref(),
                        &a.recursion_level,
                    )
                    .await?
                    .into())
            }
            "get_wiki_page" => {
                let a: GetWikiPageArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .get_wiki_page(&a.project, &a.wiki_identifier, &a.path, a.include_content)
                    .await?
                    .into())
            }
            "create_or_update_wiki_page" => {
                let a: WikiPageUpsertArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .create_or_update_wiki_page(
                        &a.project,
                        &a.wiki_identifier,
                        &a.path,
                        &a.content,
                        a.version.as_deref(),
                    )
                    .await?
                    .into())
            }

            // Test plans
            "list_test_plans" => {
                let a: ListTestPlansArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client.list_test_plans(&a.project, a.filter_active).await?.into())
            }
            "get_test_plan" => {
                let a: TestPlanArgs = parse(arguments)?;
                Ok(self.client()?.get_test_plan(&a.project, a.plan_id).await?.into())
            }
            "create_test_plan" => {
                let a: CreateTestPlanArgs = parse(arguments)?;
                let input = NewTestPlan {
                    name: a.name,
                    area_path: a.area_path,
                    iteration: a.iteration,
                    start_date: a.start_date,
                    end_date: a.end_date,
                };
                Ok(self.client()?.create_test_plan(&a.project, &input).await?.into())
            }
            "list_test_suites" => {
                let a: TestPlanArgs = parse(arguments)?;
                Ok(self.client()?.list_test_suites(&a.project, a.plan_id).await?.into())
            }
            "create_test_suite" => {
                let a: CreateTestSuiteArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .create_test_suite(&a.project, a.plan_id, &a.name, a.parent_suite_id)
                    .await?
                    .into())
            }
            "list_test_cases" => {
                let a: TestSuiteArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .list_test_cases(&a.project, a.plan_id, a.suite_id)
                    .await?
                    .into())
            }
            "add_test_cases_to_suite" => {
                let a: AddTestCasesArgs = parse(arguments)?;
                non_empty("test_case_ids", &a.test_case_ids)?;
                let client = self.client()?;
                Ok(client
                    .add_test_cases_to_suite(&a.project, a.plan_id, a.suite_id, &a.test_case_ids)
                    .await?
                    .into())
            }
            "get_test_results" => {
                let a: GetTestResultsArgs = parse(arguments)?;
                Ok(self.client()?.get_test_results(&a.project, a.run_id).await?.into())
            }

            // Search, iterations
            "search_code" => {
                let a: SearchCodeArgs = parse(arguments)?;
                let search = CodeSearch {
                    search_text: a.search_text,
                    project: a.project,
                    repository: a.repository,
                    path: a.path,
                    branch: a.branch,
                    top: a.top,
                    skip: a.skip,
                };
                Ok(self.client()?.search_code(&search).await?.into())
            }
            "list_iterations" => {
                let a: ListIterationsArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .list_iterations(&a.project, &a.team, a.timeframe.as_deref())
                    .await?
                    .into())
            }
            "get_iteration" => {
                let a: GetIterationArgs = parse(arguments)?;
                let client = self.client()?;
                Ok(client
                    .get_iteration(&a.project, &a.team, &a.iteration_id)
                    .await?
                    .into())
            }

            other => Err(ToolError::InvalidArguments(format!(
                "no handler for tool '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn handler_with(vars: &[(&str, &str)]) -> ToolHandler {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ToolHandler::new(CredentialResolver::new(Arc::new(env)))
    }

    fn tool<'a>(tools: &'a [ToolDefinition], name: &str) -> &'a ToolDefinition {
        tools.iter().find(|t| t.name == name).unwrap()
    }

    #[test]
    fn test_catalog_is_complete_and_unique() {
        let tools = handler_with(&[]).available_tools();
        assert_eq!(tools.len(), 53);

        let names: HashSet<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), tools.len());
    }

    #[test]
    fn test_every_tool_declares_secrets_and_object_schema() {
        for tool in handler_with(&[]).available_tools() {
            assert_eq!(
                tool.required_secrets,
                vec!["AZURE_DEVOPS_ORG", "AZURE_DEVOPS_PAT"],
                "{}",
                tool.name
            );
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
            assert!(!tool.description.is_empty());
        }
    }

    #[test]
    fn test_schema_required_fields_and_defaults() {
        let tools = handler_with(&[]).available_tools();

        let list_projects = &tool(&tools, "list_projects").input_schema;
        assert!(list_projects.get("required").is_none());
        assert_eq!(
            list_projects["properties"]["state_filter"]["default"],
            "wellFormed"
        );

        let get_project = &tool(&tools, "get_project").input_schema;
        assert_eq!(get_project["required"], serde_json::json!(["project"]));

        let search = &tool(&tools, "search_code").input_schema;
        assert_eq!(search["properties"]["top"]["default"], 25);
    }

    #[tokio::test]
    async fn test_every_tool_has_a_dispatch_arm() {
        let handler = handler_with(&[]);
        for tool in handler.available_tools() {
            // A string never deserializes into an argument struct.
            let result = handler
                .execute(&tool.name, Some(Value::String("bogus".into())))
                .await;
            let text = result.first_text().unwrap_or_default();
            assert!(
                text.starts_with(&format!("Invalid arguments for '{}'", tool.name)),
                "{}: {}",
                tool.name,
                text
            );
            assert!(!text.contains("no handler"), "{}", tool.name);
        }
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let result = handler_with(&[]).execute("delete_everything", None).await;
        assert!(result.is_error());
        assert_eq!(result.first_text(), Some("Unknown tool: delete_everything"));
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let result = handler_with(&[])
            .execute("get_project", Some(serde_json::json!({})))
            .await;
        assert!(result.is_error());
        let text = result.first_text().unwrap();
        assert!(text.starts_with("Invalid arguments for 'get_project':"));
        assert!(text.contains("project"));
    }

    #[tokio::test]
    async fn test_missing_organization_is_reported() {
        let result = handler_with(&[("AZURE_DEVOPS_PAT", "abc123")])
            .execute("list_projects", None)
            .await;
        assert!(result.is_error());
        let text = result.first_text().unwrap();
        assert!(text.starts_with("Failed to list projects: Configuration error"));
        assert!(text.contains("AZURE_DEVOPS_ORG"));
    }

    #[tokio::test]
    async fn test_update_with_nothing_to_change_is_rejected() {
        let handler = handler_with(&[("AZURE_DEVOPS_ORG", "contoso"), ("AZURE_DEVOPS_PAT", "x")]);

        let result = handler
            .execute(
                "update_work_item",
                Some(serde_json::json!({"project": "Contoso", "work_item_id": 1, "title": ""})),
            )
            .await;
        assert_eq!(
            result.first_text(),
            Some("Failed to update work item 1: Validation error: No fields provided to update")
        );

        let result = handler
            .execute(
                "update_pull_request",
                Some(serde_json::json!({
                    "project": "Contoso", "repository_id": "web", "pull_request_id": 3
                })),
            )
            .await;
        assert_eq!(
            result.first_text(),
            Some("Failed to update pull request 3: Validation error: No fields provided to update")
        );
    }

    #[tokio::test]
    async fn test_update_failure_names_the_target() {
        // No organization configured, so the call fails at credential resolution.
        let handler = handler_with(&[]);

        let result = handler
            .execute(
                "update_work_item",
                Some(serde_json::json!({"project": "Contoso", "work_item_id": 42, "state": "Done"})),
            )
            .await;
        assert!(result
            .first_text()
            .unwrap()
            .starts_with("Failed to update work item 42: Configuration error"));

        let result = handler
            .execute(
                "update_pull_request",
                Some(serde_json::json!({
                    "project": "Contoso", "repository_id": "web", "pull_request_id": 7, "title": "T"
                })),
            )
            .await;
        assert!(result
            .first_text()
            .unwrap()
            .starts_with("Failed to update pull request 7: Configuration error"));
    }

    #[test]
    fn test_failure_action_without_target() {
        let tool = find_tool("get_project").unwrap();
        assert_eq!(tool.failure_action(&serde_json::json!({"project": "x"})), "get project");
    }

    #[tokio::test]
    async fn test_empty_id_lists_are_rejected() {
        let handler = handler_with(&[]);
        let result = handler
            .execute(
                "get_work_items_batch",
                Some(serde_json::json!({"project": "Contoso", "work_item_ids": []})),
            )
            .await;
        assert_eq!(
            result.first_text(),
            Some("Invalid arguments for 'get_work_items_batch': work_item_ids must not be empty")
        );
    }

    #[test]
    fn test_my_work_items_query() {
        let open_only = my_work_items_query(false);
        assert!(open_only.starts_with("SELECT [System.Id], [System.Title], [System.State], [System.WorkItemType] FROM WorkItems"));
        assert!(open_only.contains("[System.AssignedTo] = @Me AND [System.State] <> 'Closed'"));
        assert!(open_only.contains("[System.State] <> 'Done'"));
        assert!(open_only.contains("[System.State] <> 'Removed'"));
        assert!(open_only.ends_with("ORDER BY [System.ChangedDate] DESC"));

        let all = my_work_items_query(true);
        assert!(!all.contains("<>"));
        assert!(all.contains("[System.AssignedTo] = @Me ORDER BY"));
    }

    #[test]
    fn test_token_cache_is_shared_across_calls() {
        let handler = handler_with(&[]);
        let cache = handler.token_cache().clone();
        assert!(Arc::ptr_eq(&cache, handler.token_cache()));
    }
}
