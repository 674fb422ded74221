//! Azure DevOps REST API client.
//!
//! Every operation is one request (branch creation is two) against an
//! organization-scoped base URL, with `api-version=7.1` and the signer's
//! `Authorization` header. Responses are returned as raw JSON.

use std::collections::HashMap;
use std::time::Duration;

use azdo_core::{Error, Result};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::AuthManager;
use crate::types::{
    pipeline_run_body, BuildFilter, CodeSearch, CodeSearchRequest, CommitCriteria,
    CreatePullRequest, DefinitionReference, GitRefList, JsonPatchDocument, NewTestPlan,
    NewThread, PullRequestCriteria, PullRequestUpdate, QueueBuildRequest, RefUpdate,
    ThreadBody, ThreadComment, WorkItemBatchRequest,
};

/// REST API version sent with every request.
pub const API_VERSION: &str = "7.1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("azure-devops-mcp/", env!("CARGO_PKG_VERSION"));

const ZERO_OBJECT_ID: &str = "0000000000000000000000000000000000000000";

const JSON: &str = "application/json";
const JSON_PATCH: &str = "application/json-patch+json";

/// HTTP client with the fixed timeout and user agent.
pub(crate) fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::Http(format!("Failed to create HTTP client: {}", e)))
}

// =============================================================================
// Service URLs
// =============================================================================

/// Organization-scoped base URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrls {
    /// `https://dev.azure.com/{org}`
    pub core: String,
    /// `https://vssps.dev.azure.com/{org}`
    pub identities: String,
    /// `https://almsearch.dev.azure.com/{org}`
    pub search: String,
}

impl ServiceUrls {
    pub fn for_organization(organization: &str) -> Self {
        Self {
            core: format!("https://dev.azure.com/{}", organization),
            identities: format!("https://vssps.dev.azure.com/{}", organization),
            search: format!("https://almsearch.dev.azure.com/{}", organization),
        }
    }

    /// Route every service to one base (tests, on-prem servers).
    pub fn uniform(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self {
            core: base.clone(),
            identities: base.clone(),
            search: base,
        }
    }
}

// =============================================================================
// Request plumbing
// =============================================================================

/// Query parameters in insertion order.
#[derive(Debug, Default)]
struct Query(Vec<(&'static str, String)>);

impl Query {
    fn new() -> Self {
        Self::default()
    }

    fn set(mut self, key: &'static str, value: impl ToString) -> Self {
        self.0.push((key, value.to_string()));
        self
    }

    /// Only when present and non-empty.
    fn opt(self, key: &'static str, value: Option<&str>) -> Self {
        match value.filter(|v| !v.is_empty()) {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    /// Only when present and non-zero.
    fn num(self, key: &'static str, value: Option<u32>) -> Self {
        match value.filter(|v| *v != 0) {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    fn has(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| *k == key)
    }
}

enum Body {
    Empty,
    Json(Value),
    JsonPatch(Value),
}

impl Body {
    fn json(value: impl Serialize) -> Result<Self> {
        Ok(Body::Json(serde_json::to_value(value)?))
    }
}

/// Azure DevOps REST API client.
pub struct AzureDevOpsClient {
    urls: ServiceUrls,
    auth: AuthManager,
    http: reqwest::Client,
}

impl AzureDevOpsClient {
    /// Create a client for the signer's organization on Azure DevOps Services.
    pub fn new(auth: AuthManager) -> Result<Self> {
        let urls = ServiceUrls::for_organization(auth.organization());
        Self::with_urls(auth, urls)
    }

    /// Create a client with explicit base URLs (for testing with httpmock).
    pub fn with_urls(auth: AuthManager, urls: ServiceUrls) -> Result<Self> {
        Ok(Self {
            urls,
            auth,
            http: build_http_client()?,
        })
    }

    pub fn urls(&self) -> &ServiceUrls {
        &self.urls
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    /// `base` plus percent-encoded path segments.
    fn url(&self, base: &str, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(base)
            .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Base URL '{}' cannot carry a path", base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn core(&self, segments: &[&str]) -> Result<Url> {
        self.url(&self.urls.core, segments)
    }

    /// Core URL under `/{project}/_apis/...`.
    fn project(&self, project: &str, segments: &[&str]) -> Result<Url> {
        let mut all = vec![project, "_apis"];
        all.extend_from_slice(segments);
        self.core(&all)
    }

    /// Core URL under `/{project}/{team}/_apis/...`.
    fn team(&self, project: &str, team: &str, segments: &[&str]) -> Result<Url> {
        let mut all = vec![project, team, "_apis"];
        all.extend_from_slice(segments);
        self.core(&all)
    }

    /// Core URL under `/{project}/_apis/git/repositories/{repo}/...`.
    fn repo(&self, project: &str, repository: &str, segments: &[&str]) -> Result<Url> {
        let mut all = vec![project, "_apis", "git", "repositories", repository];
        all.extend_from_slice(segments);
        self.core(&all)
    }

    /// Send one signed request and check its status.
    async fn execute(
        &self,
        method: Method,
        mut url: Url,
        query: Query,
        body: Body,
        extra_headers: &[(&'static str, String)],
        accept: &'static str,
    ) -> Result<reqwest::Response> {
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &query.0 {
                pairs.append_pair(key, value);
            }
            if !query.has("api-version") {
                pairs.append_pair("api-version", API_VERSION);
            }
        }

        let authorization = self.auth.authorization_async().await?;
        let mut auth_header = HeaderValue::from_str(authorization.expose_secret())
            .map_err(|e| Error::Auth(format!("Invalid authorization header: {}", e)))?;
        auth_header.set_sensitive(true);

        debug!(method = %method, url = %url, "Azure DevOps request");

        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, auth_header)
            .header(ACCEPT, accept);

        request = match body {
            Body::Empty => request,
            Body::Json(value) => request.header(CONTENT_TYPE, JSON).body(value.to_string()),
            Body::JsonPatch(value) => request
                .header(CONTENT_TYPE, JSON_PATCH)
                .body(value.to_string()),
        };

        for (name, value) in extra_headers {
            request = request.header(*name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let message = response.text().await.unwrap_or_default();
            warn!(
                status = status_code,
                body = %message,
                "Azure DevOps API error response"
            );
            return Err(Error::from_response(status_code, &message));
        }

        Ok(response)
    }

    /// Send and parse a JSON response; `204` and empty bodies become `Null`.
    async fn send(
        &self,
        method: Method,
        url: Url,
        query: Query,
        body: Body,
        extra_headers: &[(&'static str, String)],
    ) -> Result<Value> {
        let response = self
            .execute(method, url, query, body, extra_headers, JSON)
            .await?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let text = response
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::InvalidData(format!("Failed to parse response: {}", e)))
    }

    async fn get(&self, url: Url, query: Query) -> Result<Value> {
        self.send(Method::GET, url, query, Body::Empty, &[]).await
    }

    async fn post(&self, url: Url, query: Query, body: Body) -> Result<Value> {
        self.send(Method::POST, url, query, body, &[]).await
    }

    async fn patch(&self, url: Url, body: Body) -> Result<Value> {
        self.send(Method::PATCH, url, Query::new(), body, &[]).await
    }

    // =========================================================================
    // Core
    // =========================================================================

    pub async fn list_projects(
        &self,
        state_filter: &str,
        top: Option<u32>,
        skip: Option<u32>,
    ) -> Result<Value> {
        let query = Query::new()
            .set("stateFilter", state_filter)
            .num("$top", top)
            .num("$skip", skip);
        self.get(self.core(&["_apis", "projects"])?, query).await
    }

    pub async fn get_project(&self, project: &str) -> Result<Value> {
        self.get(self.core(&["_apis", "projects", project])?, Query::new())
            .await
    }

    pub async fn list_teams(
        &self,
        project: &str,
        top: Option<u32>,
        skip: Option<u32>,
    ) -> Result<Value> {
        let query = Query::new().num("$top", top).num("$skip", skip);
        self.get(self.core(&["_apis", "projects", project, "teams"])?, query)
            .await
    }

    pub async fn get_identities(&self, search_filter: &str, filter_value: &str) -> Result<Value> {
        let url = self.url(&self.urls.identities, &["_apis", "identities"])?;
        let query = Query::new()
            .set("searchFilter", search_filter)
            .set("filterValue", filter_value);
        self.get(url, query).await
    }

    // =========================================================================
    // Work items
    // =========================================================================

    pub async fn get_work_item(
        &self,
        project: &str,
        id: u64,
        expand: Option<&str>,
        fields: &[String],
    ) -> Result<Value> {
        let query = Query::new().opt("$expand", expand);
        let query = if fields.is_empty() {
            query
        } else {
            query.set("fields", fields.join(","))
        };
        let url = self.project(project, &["wit", "workitems", &id.to_string()])?;
        self.get(url, query).await
    }

    pub async fn get_work_items_batch(
        &self,
        project: &str,
        ids: &[u64],
        fields: &[String],
        expand: Option<&str>,
    ) -> Result<Value> {
        let body = WorkItemBatchRequest {
            ids: ids.to_vec(),
            fields: fields.to_vec(),
            expand: expand.filter(|e| !e.is_empty()).map(String::from),
        };
        let url = self.project(project, &["wit", "workitemsbatch"])?;
        self.post(url, Query::new(), Body::json(&body)?).await
    }

    pub async fn create_work_item(
        &self,
        project: &str,
        work_item_type: &str,
        document: &JsonPatchDocument,
    ) -> Result<Value> {
        let type_segment = format!("${}", work_item_type);
        let url = self.project(project, &["wit", "workitems", &type_segment])?;
        let body = Body::JsonPatch(serde_json::to_value(document)?);
        self.post(url, Query::new(), body).await
    }

    pub async fn update_work_item(
        &self,
        project: &str,
        id: u64,
        document: &JsonPatchDocument,
    ) -> Result<Value> {
        if document.is_empty() {
            return Err(Error::Validation("No fields provided to update".to_string()));
        }
        let url = self.project(project, &["wit", "workitems", &id.to_string()])?;
        let body = Body::JsonPatch(serde_json::to_value(document)?);
        self.patch(url, body).await
    }

    pub async fn list_work_item_comments(
        &self,
        project: &str,
        id: u64,
        top: Option<u32>,
    ) -> Result<Value> {
        let url = self.project(project, &["wit", "workitems", &id.to_string(), "comments"])?;
        self.get(url, Query::new().num("$top", top)).await
    }

    pub async fn add_work_item_comment(&self, project: &str, id: u64, text: &str) -> Result<Value> {
        let url = self.project(project, &["wit", "workitems", &id.to_string(), "comments"])?;
        self.post(url, Query::new(), Body::Json(serde_json::json!({ "text": text })))
            .await
    }

    pub async fn run_wiql_query(
        &self,
        project: &str,
        query: &str,
        top: Option<u32>,
    ) -> Result<Value> {
        let url = self.project(project, &["wit", "wiql"])?;
        self.post(
            url,
            Query::new().num("$top", top),
            Body::Json(serde_json::json!({ "query": query })),
        )
        .await
    }

    pub async fn get_query(
        &self,
        project: &str,
        query_id: &str,
        depth: u32,
        expand: Option<&str>,
    ) -> Result<Value> {
        let url = self.project(project, &["wit", "queries", query_id])?;
        let query = Query::new().set("$depth", depth).opt("$expand", expand);
        self.get(url, query).await
    }

    pub async fn list_backlogs(&self, project: &str, team: &str) -> Result<Value> {
        let url = self.team(project, team, &["work", "backlogs"])?;
        self.get(url, Query::new()).await
    }

    pub async fn get_backlog_work_items(
        &self,
        project: &str,
        team: &str,
        backlog_id: &str,
    ) -> Result<Value> {
        let url = self.team(project, team, &["work", "backlogs", backlog_id, "workItems"])?;
        self.get(url, Query::new()).await
    }

    // =========================================================================
    // Repositories, branches, commits
    // =========================================================================

    pub async fn list_repositories(&self, project: &str) -> Result<Value> {
        let url = self.project(project, &["git", "repositories"])?;
        self.get(url, Query::new()).await
    }

    pub async fn get_repository(&self, project: &str, repository: &str) -> Result<Value> {
        self.get(self.repo(project, repository, &[])?, Query::new())
            .await
    }

    pub async fn list_branches(
        &self,
        project: &str,
        repository: &str,
        filter: Option<&str>,
        top: Option<u32>,
    ) -> Result<Value> {
        let query = Query::new().opt("filter", filter).num("$top", top);
        self.get(self.repo(project, repository, &["refs"])?, query)
            .await
    }

    /// Create `refs/heads/{name}` pointing at the tip of `source`.
    ///
    /// Fails with [`Error::NotFound`] and writes nothing when `source` does not exist.
    pub async fn create_branch(
        &self,
        project: &str,
        repository: &str,
        name: &str,
        source: &str,
    ) -> Result<Value> {
        let refs_url = self.repo(project, repository, &["refs"])?;

        let lookup = self
            .get(
                refs_url.clone(),
                Query::new().set("filter", format!("heads/{}", source)),
            )
            .await?;
        let refs: GitRefList = serde_json::from_value(lookup).unwrap_or_default();

        // The filter is a prefix match; `heads/dev` also returns `heads/develop`.
        let source_ref = format!("refs/heads/{}", source);
        let Some(source_object_id) = refs
            .value
            .into_iter()
            .find(|r| r.name == source_ref)
            .and_then(|r| r.object_id)
        else {
            return Err(Error::NotFound(format!(
                "Source branch '{}' not found",
                source
            )));
        };

        debug!(
            name = name,
            source = source,
            object_id = %source_object_id,
            "Creating branch"
        );

        let body = vec![RefUpdate {
            name: format!("refs/heads/{}", name),
            old_object_id: ZERO_OBJECT_ID.to_string(),
            new_object_id: source_object_id,
        }];
        self.post(refs_url, Query::new(), Body::json(&body)?).await
    }

    pub async fn list_commits(
        &self,
        project: &str,
        repository: &str,
        criteria: &CommitCriteria,
    ) -> Result<Value> {
        let query = Query::new()
            .opt(
                "searchCriteria.itemVersion.version",
                criteria.branch.as_deref(),
            )
            .num("$top", criteria.top)
            .num("$skip", criteria.skip)
            .opt("searchCriteria.author", criteria.author.as_deref())
            .opt("searchCriteria.fromDate", criteria.from_date.as_deref())
            .opt("searchCriteria.toDate", criteria.to_date.as_deref());
        self.get(self.repo(project, repository, &["commits"])?, query)
            .await
    }

    pub async fn get_commit(&self, project: &str, repository: &str, commit_id: &str) -> Result<Value> {
        let url = self.repo(project, repository, &["commits", commit_id])?;
        self.get(url, Query::new()).await
    }

    // =========================================================================
    // Pull requests
    // =========================================================================

    pub async fn list_pull_requests(
        &self,
        project: &str,
        repository: &str,
        criteria: &PullRequestCriteria,
    ) -> Result<Value> {
        let query = Query::new()
            .set(
                "searchCriteria.status",
                criteria.status.as_deref().unwrap_or("Active"),
            )
            .num("$top", criteria.top)
            .num("$skip", criteria.skip)
            .opt("searchCriteria.creatorId", criteria.creator_id.as_deref())
            .opt("searchCriteria.reviewerId", criteria.reviewer_id.as_deref())
            .opt(
                "searchCriteria.sourceRefName",
                criteria.source_ref_name.as_deref(),
            )
            .opt(
                "searchCriteria.targetRefName",
                criteria.target_ref_name.as_deref(),
            );
        self.get(self.repo(project, repository, &["pullrequests"])?, query)
            .await
    }

    pub async fn get_pull_request(&self, project: &str, repository: &str, id: u64) -> Result<Value> {
        let url = self.repo(project, repository, &["pullrequests", &id.to_string()])?;
        self.get(url, Query::new()).await
    }

    pub async fn create_pull_request(
        &self,
        project: &str,
        repository: &str,
        input: &CreatePullRequest,
    ) -> Result<Value> {
        let url = self.repo(project, repository, &["pullrequests"])?;
        self.post(url, Query::new(), Body::json(input)?).await
    }

    pub async fn update_pull_request(
        &self,
        project: &str,
        repository: &str,
        id: u64,
        updates: &PullRequestUpdate,
    ) -> Result<Value> {
        if updates.is_empty() {
            return Err(Error::Validation("No fields provided to update".to_string()));
        }
        let url = self.repo(project, repository, &["pullrequests", &id.to_string()])?;
        self.patch(url, Body::json(updates)?).await
    }

    pub async fn list_pull_request_threads(
        &self,
        project: &str,
        repository: &str,
        id: u64,
    ) -> Result<Value> {
        let url = self.repo(
            project,
            repository,
            &["pullrequests", &id.to_string(), "threads"],
        )?;
        self.get(url, Query::new()).await
    }

    pub async fn create_pull_request_thread(
        &self,
        project: &str,
        repository: &str,
        id: u64,
        thread: &NewThread,
    ) -> Result<Value> {
        let url = self.repo(
            project,
            repository,
            &["pullrequests", &id.to_string(), "threads"],
        )?;
        self.post(url, Query::new(), Body::json(ThreadBody::from(thread))?)
            .await
    }

    pub async fn reply_to_thread(
        &self,
        project: &str,
        repository: &str,
        id: u64,
        thread_id: u64,
        content: &str,
    ) -> Result<Value> {
        let url = self.repo(
            project,
            repository,
            &[
                "pullrequests",
                &id.to_string(),
                "threads",
                &thread_id.to_string(),
                "comments",
            ],
        )?;
        self.post(url, Query::new(), Body::json(ThreadComment::text(content))?)
            .await
    }

    // =========================================================================
    // Builds, pipelines
    // =========================================================================

    pub async fn list_build_definitions(
        &self,
        project: &str,
        name: Option<&str>,
        path: Option<&str>,
        top: Option<u32>,
    ) -> Result<Value> {
        let query = Query::new()
            .opt("name", name)
            .opt("path", path)
            .num("$top", top);
        self.get(self.project(project, &["build", "definitions"])?, query)
            .await
    }

    pub async fn get_build_definition(&self, project: &str, definition_id: u64) -> Result<Value> {
        let url = self.project(
            project,
            &["build", "definitions", &definition_id.to_string()],
        )?;
        self.get(url, Query::new()).await
    }

    pub async fn list_builds(&self, project: &str, filter: &BuildFilter) -> Result<Value> {
        let definitions = filter
            .definitions
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let query = Query::new()
            .opt("definitions", Some(definitions.as_str()))
            .opt("branchName", filter.branch_name.as_deref())
            .opt("statusFilter", filter.status.as_deref())
            .opt("resultFilter", filter.result.as_deref())
            .num("$top", filter.top)
            .opt("requestedFor", filter.requested_for.as_deref());
        self.get(self.project(project, &["build", "builds"])?, query)
            .await
    }

    pub async fn get_build(&self, project: &str, build_id: u64) -> Result<Value> {
        let url = self.project(project, &["build", "builds", &build_id.to_string()])?;
        self.get(url, Query::new()).await
    }

    pub async fn queue_build(
        &self,
        project: &str,
        definition_id: u64,
        source_branch: Option<&str>,
        parameters: &HashMap<String, String>,
    ) -> Result<Value> {
        let parameters = if parameters.is_empty() {
            None
        } else {
            Some(serde_json::to_string(parameters)?)
        };
        let body = QueueBuildRequest {
            definition: DefinitionReference { id: definition_id },
            source_branch: source_branch.filter(|b| !b.is_empty()).map(String::from),
            parameters,
        };
        let url = self.project(project, &["build", "builds"])?;
        self.post(url, Query::new(), Body::json(&body)?).await
    }

    pub async fn get_build_logs(&self, project: &str, build_id: u64) -> Result<Value> {
        let url = self.project(
            project,
            &["build", "builds", &build_id.to_string(), "logs"],
        )?;
        self.get(url, Query::new()).await
    }

    /// Raw text of one build log.
    pub async fn get_build_log(
        &self,
        project: &str,
        build_id: u64,
        log_id: u64,
        start_line: Option<u32>,
        end_line: Option<u32>,
    ) -> Result<String> {
        let url = self.project(
            project,
            &[
                "build",
                "builds",
                &build_id.to_string(),
                "logs",
                &log_id.to_string(),
            ],
        )?;
        let query = Query::new()
            .num("startLine", start_line)
            .num("endLine", end_line);

        let response = self
            .execute(Method::GET, url, query, Body::Empty, &[], "text/plain")
            .await?;
        response.text().await.map_err(|e| Error::Http(e.to_string()))
    }

    pub async fn list_pipeline_runs(&self, project: &str, pipeline_id: u64) -> Result<Value> {
        let url = self.project(project, &["pipelines", &pipeline_id.to_string(), "runs"])?;
        self.get(url, Query::new()).await
    }

    pub async fn run_pipeline(
        &self,
        project: &str,
        pipeline_id: u64,
        branch: Option<&str>,
        variables: &HashMap<String, String>,
    ) -> Result<Value> {
        let url = self.project(project, &["pipelines", &pipeline_id.to_string(), "runs"])?;
        let body = Body::Json(pipeline_run_body(branch, variables));
        self.post(url, Query::new(), body).await
    }

    // =========================================================================
    // Wiki
    // =========================================================================

    /// Wikis in `project`, or in the whole organization.
    pub async fn list_wikis(&self, project: Option<&str>) -> Result<Value> {
        let url = match project.filter(|p| !p.is_empty()) {
            Some(project) => self.project(project, &["wiki", "wikis"])?,
            None => self.core(&["_apis", "wiki", "wikis"])?,
        };
        self.get(url, Query::new()).await
    }

    pub async fn get_wiki(&self, project: &str, wiki: &str) -> Result<Value> {
        self.get(self.project(project, &["wiki", "wikis", wiki])?, Query::new())
            .await
    }

    pub async fn list_wiki_pages(
        &self,
        project: &str,
        wiki: &str,
        path: Option<&str>,
        recursion_level: &str,
    ) -> Result<Value> {
        let query = Query::new()
            .set("recursionLevel", recursion_level)
            .opt("path", path);
        let url = self.project(project, &["wiki", "wikis", wiki, "pages"])?;
        self.get(url, query).await
    }

    pub async fn get_wiki_page(
        &self,
        project: &str,
        wiki: &str,
        path: &str,
        include_content: bool,
    ) -> Result<Value> {
        let query = Query::new()
            .set("path", path)
            .set("includeContent", include_content);
        let url = self.project(project, &["wiki", "wikis", wiki, "pages"])?;
        self.get(url, query).await
    }

    /// Create a page, or update it when `version` (the page ETag) is given.
    pub async fn create_or_update_wiki_page(
        &self,
        project: &str,
        wiki: &str,
        path: &str,
        content: &str,
        version: Option<&str>,
    ) -> Result<Value> {
        let url = self.project(project, &["wiki", "wikis", wiki, "pages"])?;
        let headers: Vec<(&'static str, String)> = version
            .filter(|v| !v.is_empty())
            .map(|v| ("If-Match", v.to_string()))
            .into_iter()
            .collect();

        self.send(
            Method::PUT,
            url,
            Query::new().set("path", path),
            Body::Json(serde_json::json!({ "content": content })),
            &headers,
        )
        .await
    }

    // =========================================================================
    // Test plans
    // =========================================================================

    pub async fn list_test_plans(&self, project: &str, filter_active: bool) -> Result<Value> {
        let query = if filter_active {
            Query::new().set("filterActivePlans", "true")
        } else {
            Query::new()
        };
        self.get(self.project(project, &["testplan", "plans"])?, query)
            .await
    }

    pub async fn get_test_plan(&self, project: &str, plan_id: u64) -> Result<Value> {
        let url = self.project(project, &["testplan", "plans", &plan_id.to_string()])?;
        self.get(url, Query::new()).await
    }

    pub async fn create_test_plan(&self, project: &str, input: &NewTestPlan) -> Result<Value> {
        let url = self.project(project, &["testplan", "plans"])?;
        self.post(url, Query::new(), Body::json(input)?).await
    }

    pub async fn list_test_suites(&self, project: &str, plan_id: u64) -> Result<Value> {
        let url = self.project(
            project,
            &["testplan", "Plans", &plan_id.to_string(), "suites"],
        )?;
        self.get(url, Query::new()).await
    }

    pub async fn create_test_suite(
        &self,
        project: &str,
        plan_id: u64,
        name: &str,
        parent_suite_id: u64,
    ) -> Result<Value> {
        let url = self.project(
            project,
            &["testplan", "Plans", &plan_id.to_string(), "suites"],
        )?;
        let body = serde_json::json!({ "name": name, "parentSuite": { "id": parent_suite_id } });
        self.post(url, Query::new(), Body::Json(body)).await
    }

    pub async fn list_test_cases(&self, project: &str, plan_id: u64, suite_id: u64) -> Result<Value> {
        let url = self.project(
            project,
            &[
                "testplan",
                "Plans",
                &plan_id.to_string(),
                "Suites",
                &suite_id.to_string(),
                "TestCase",
            ],
        )?;
        self.get(url, Query::new()).await
    }

    pub async fn add_test_cases_to_suite(
        &self,
        project: &str,
        plan_id: u64,
        suite_id: u64,
        test_case_ids: &[u64],
    ) -> Result<Value> {
        let url = self.project(
            project,
            &[
                "testplan",
                "Plans",
                &plan_id.to_string(),
                "Suites",
                &suite_id.to_string(),
                "TestCase",
            ],
        )?;
        let body: Vec<Value> = test_case_ids
            .iter()
            .map(|id| serde_json::json!({ "workItem": { "id": id } }))
            .collect();
        self.post(url, Query::new(), Body::Json(Value::Array(body)))
            .await
    }

    pub async fn get_test_results(&self, project: &str, run_id: u64) -> Result<Value> {
        let url = self.project(project, &["test", "Runs", &run_id.to_string(), "results"])?;
        self.get(url, Query::new()).await
    }

    // =========================================================================
    // Search, iterations
    // =========================================================================

    pub async fn search_code(&self, search: &CodeSearch) -> Result<Value> {
        let url = self.url(&self.urls.search, &["_apis", "search", "codesearchresults"])?;
        self.post(url, Query::new(), Body::json(CodeSearchRequest::from(search))?)
            .await
    }

    pub async fn list_iterations(
        &self,
        project: &str,
        team: &str,
        timeframe: Option<&str>,
    ) -> Result<Value> {
        let url = self.team(project, team, &["work", "teamsettings", "iterations"])?;
        self.get(url, Query::new().opt("$timeframe", timeframe))
            .await
    }

    pub async fn get_iteration(&self, project: &str, team: &str, iteration_id: &str) -> Result<Value> {
        let url = self.team(
            project,
            team,
            &["work", "teamsettings", "iterations", iteration_id],
        )?;
        self.get(url, Query::new()).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::TokenCache;
    use azdo_core::CredentialConfig;
    use std::sync::Arc;

    fn pat_client(urls: ServiceUrls) -> AzureDevOpsClient {
        let auth = AuthManager::new(
            CredentialConfig::with_pat("contoso", "abc123"),
            Arc::new(TokenCache::new()),
        )
        .unwrap();
        AzureDevOpsClient::with_urls(auth, urls).unwrap()
    }

    #[test]
    fn test_service_urls_for_organization() {
        let urls = ServiceUrls::for_organization("contoso");
        assert_eq!(urls.core, "https://dev.azure.com/contoso");
        assert_eq!(urls.identities, "https://vssps.dev.azure.com/contoso");
        assert_eq!(urls.search, "https://almsearch.dev.azure.com/contoso");
    }

    #[test]
    fn test_service_urls_uniform() {
        let urls = ServiceUrls::uniform("http://localhost:8080/tfs/");
        assert_eq!(urls.core, "http://localhost:8080/tfs");
        assert_eq!(urls.core, urls.identities);
        assert_eq!(urls.core, urls.search);
    }

    #[test]
    fn test_new_uses_signer_organization() {
        let auth = AuthManager::new(
            CredentialConfig::with_pat("fabrikam", "x"),
            Arc::new(TokenCache::new()),
        )
        .unwrap();
        let client = AzureDevOpsClient::new(auth).unwrap();
        assert_eq!(client.urls().core, "https://dev.azure.com/fabrikam");
        assert_eq!(client.auth().organization(), "fabrikam");
    }

    #[test]
    fn test_path_segments_are_encoded() {
        let client = pat_client(ServiceUrls::for_organization("contoso"));

        let url = client
            .repo("My Project", "web/app", &["refs"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://dev.azure.com/contoso/My%20Project/_apis/git/repositories/web%2Fapp/refs"
        );

        let url = client
            .project("Contoso", &["wit", "workitems", "$User Story"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://dev.azure.com/contoso/Contoso/_apis/wit/workitems/$User%20Story"
        );
    }

    #[test]
    fn test_team_scoped_url() {
        let client = pat_client(ServiceUrls::uniform("http://127.0.0.1:9999"));
        let url = client
            .team("Contoso", "Contoso Team", &["work", "backlogs"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9999/Contoso/Contoso%20Team/_apis/work/backlogs"
        );
    }

    #[test]
    fn test_query_skips_empty_and_zero() {
        let query = Query::new()
            .set("stateFilter", "wellFormed")
            .num("$top", Some(0))
            .num("$skip", None)
            .opt("filter", Some(""))
            .opt("name", Some("ci"));
        assert_eq!(
            query.0,
            vec![
                ("stateFilter", "wellFormed".to_string()),
                ("name", "ci".to_string())
            ]
        );
        assert!(!query.has("api-version"));
    }

    #[test]
    fn test_user_agent() {
        assert!(USER_AGENT.starts_with("azure-devops-mcp/"));
    }

    mod integration {
        use super::*;
        use httpmock::prelude::*;
        use serde_json::json;

        fn create_client(server: &MockServer) -> AzureDevOpsClient {
            pat_client(ServiceUrls::uniform(server.base_url()))
        }

        #[tokio::test]
        async fn test_list_projects_request_shape() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/_apis/projects")
                    .query_param("stateFilter", "wellFormed")
                    .query_param("api-version", "7.1")
                    .header("Authorization", "Basic OmFiYzEyMw==")
                    .header("Accept", "application/json");
                then.status(200)
                    .json_body(json!({"count": 1, "value": [{"id": "p1", "name": "Contoso"}]}));
            });

            let client = create_client(&server);
            let result = client.list_projects("wellFormed", None, None).await.unwrap();

            mock.assert();
            assert_eq!(result["count"], 1);
            assert_eq!(result["value"][0]["name"], "Contoso");
        }

        #[tokio::test]
        async fn test_paging_params_sent_when_set() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/_apis/projects/Contoso/teams")
                    .query_param("$top", "10")
                    .query_param("$skip", "20");
                then.status(200).json_body(json!({"value": []}));
            });

            create_client(&server)
                .list_teams("Contoso", Some(10), Some(20))
                .await
                .unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_api_error_uses_message_field() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(GET).path("/_apis/projects/Missing");
                then.status(404).json_body(json!({
                    "message": "TF200016: The following project does not exist: Missing."
                }));
            });

            let err = create_client(&server)
                .get_project("Missing")
                .await
                .unwrap_err();
            assert_eq!(err.status(), Some(404));
            assert_eq!(
                err.to_string(),
                "Azure DevOps API error: 404 - TF200016: The following project does not exist: Missing."
            );
        }

        #[tokio::test]
        async fn test_api_error_falls_back_to_text() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(GET).path("/Contoso/_apis/git/repositories");
                then.status(401).body("Unauthorized");
            });

            let err = create_client(&server)
                .list_repositories("Contoso")
                .await
                .unwrap_err();
            match err {
                Error::Api { status, message } => {
                    assert_eq!(status, 401);
                    assert_eq!(message, "Unauthorized");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_no_content_is_null() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(GET).path("/Contoso/Team/_apis/work/backlogs");
                then.status(204);
            });

            let result = create_client(&server)
                .list_backlogs("Contoso", "Team")
                .await
                .unwrap();
            assert_eq!(result, Value::Null);
        }

        #[tokio::test]
        async fn test_invalid_json_is_invalid_data() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(GET).path("/Contoso/_apis/git/repositories/web");
                then.status(200).body("<html>sign in</html>");
            });

            let err = create_client(&server)
                .get_repository("Contoso", "web")
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidData(_)));
        }

        #[tokio::test]
        async fn test_network_error_is_http() {
            let client = pat_client(ServiceUrls::uniform("http://127.0.0.1:1"));
            let err = client.get_project("Contoso").await.unwrap_err();
            assert!(matches!(err, Error::Http(_)));
            assert_eq!(err.status(), None);
        }

        #[tokio::test]
        async fn test_missing_credentials_fail_before_request() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET).path("/_apis/projects");
                then.status(200).json_body(json!({}));
            });

            let auth = AuthManager::new(
                CredentialConfig {
                    organization: "contoso".into(),
                    pat: None,
                    oauth: None,
                },
                Arc::new(TokenCache::new()),
            )
            .unwrap();
            let client =
                AzureDevOpsClient::with_urls(auth, ServiceUrls::uniform(server.base_url()))
                    .unwrap();

            let err = client.list_projects("wellFormed", None, None).await.unwrap_err();
            assert!(matches!(err, Error::Auth(_)));
            mock.assert_hits(0);
        }

        #[tokio::test]
        async fn test_identities_use_identity_base() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/_apis/identities")
                    .query_param("searchFilter", "General")
                    .query_param("filterValue", "jdoe");
                then.status(200).json_body(json!({"value": []}));
            });

            create_client(&server)
                .get_identities("General", "jdoe")
                .await
                .unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_get_work_item_fields_and_expand() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/Contoso/_apis/wit/workitems/42")
                    .query_param("$expand", "Relations")
                    .query_param("fields", "System.Title,System.State");
                then.status(200).json_body(json!({"id": 42}));
            });

            let result = create_client(&server)
                .get_work_item(
                    "Contoso",
                    42,
                    Some("Relations"),
                    &["System.Title".to_string(), "System.State".to_string()],
                )
                .await
                .unwrap();
            mock.assert();
            assert_eq!(result["id"], 42);
        }

        #[tokio::test]
        async fn test_work_items_batch_body() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/Contoso/_apis/wit/workitemsbatch")
                    .json_body(json!({"ids": [1, 2, 3], "fields": ["System.Title"]}));
                then.status(200).json_body(json!({"count": 3, "value": []}));
            });

            create_client(&server)
                .get_work_items_batch("Contoso", &[1, 2, 3], &["System.Title".to_string()], None)
                .await
                .unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_create_work_item_uses_json_patch() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/Contoso/_apis/wit/workitems/$Bug")
                    .header("Content-Type", "application/json-patch+json")
                    .json_body(json!([
                        {"op": "add", "path": "/fields/System.Title", "value": "Crash on save"}
                    ]));
                then.status(200).json_body(json!({"id": 7, "rev": 1}));
            });

            let doc = JsonPatchDocument::new().add(crate::fields::TITLE, "Crash on save");
            let result = create_client(&server)
                .create_work_item("Contoso", "Bug", &doc)
                .await
                .unwrap();
            mock.assert();
            assert_eq!(result["id"], 7);
        }

        #[tokio::test]
        async fn test_update_work_item_empty_document_sends_nothing() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(PATCH).path("/Contoso/_apis/wit/workitems/7");
                then.status(200).json_body(json!({}));
            });

            let err = create_client(&server)
                .update_work_item("Contoso", 7, &JsonPatchDocument::new())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
            mock.assert_hits(0);
        }

        #[tokio::test]
        async fn test_update_work_item_patches() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(PATCH)
                    .path("/Contoso/_apis/wit/workitems/7")
                    .header("Content-Type", "application/json-patch+json")
                    .body_includes("System.State");
                then.status(200).json_body(json!({"id": 7, "rev": 2}));
            });

            let doc = JsonPatchDocument::new().add(crate::fields::STATE, "Resolved");
            create_client(&server)
                .update_work_item("Contoso", 7, &doc)
                .await
                .unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_wiql_query() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/Contoso/_apis/wit/wiql")
                    .query_param("$top", "5")
                    .json_body(json!({"query": "SELECT [System.Id] FROM WorkItems"}));
                then.status(200).json_body(json!({"workItems": []}));
            });

            create_client(&server)
                .run_wiql_query("Contoso", "SELECT [System.Id] FROM WorkItems", Some(5))
                .await
                .unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_get_query_sends_depth() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/Contoso/_apis/wit/queries/8a8c8212-15ca-41ed-97aa-1d6fbfbcd581")
                    .query_param("$depth", "0");
                then.status(200).json_body(json!({"name": "Active Bugs"}));
            });

            create_client(&server)
                .get_query("Contoso", "8a8c8212-15ca-41ed-97aa-1d6fbfbcd581", 0, None)
                .await
                .unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_create_branch_resolves_source_then_posts() {
            let server = MockServer::start();
            let lookup = server.mock(|when, then| {
                when.method(GET)
                    .path("/Contoso/_apis/git/repositories/web/refs")
                    .query_param("filter", "heads/main");
                then.status(200).json_body(json!({
                    "count": 1,
                    "value": [{"name": "refs/heads/main", "objectId": "a1b2c3"}]
                }));
            });
            let create = server.mock(|when, then| {
                when.method(POST)
                    .path("/Contoso/_apis/git/repositories/web/refs")
                    .json_body(json!([{
                        "name": "refs/heads/feature/login",
                        "oldObjectId": "0000000000000000000000000000000000000000",
                        "newObjectId": "a1b2c3"
                    }]));
                then.status(200)
                    .json_body(json!({"value": [{"success": true}]}));
            });

            let result = create_client(&server)
                .create_branch("Contoso", "web", "feature/login", "main")
                .await
                .unwrap();

            lookup.assert();
            create.assert();
            assert_eq!(result["value"][0]["success"], true);
        }

        #[tokio::test]
        async fn test_create_branch_picks_exact_source_ref() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(GET)
                    .path("/Contoso/_apis/git/repositories/web/refs")
                    .query_param("filter", "heads/dev");
                then.status(200).json_body(json!({
                    "count": 2,
                    "value": [
                        {"name": "refs/heads/develop", "objectId": "d3v3l0p"},
                        {"name": "refs/heads/dev", "objectId": "d3v"}
                    ]
                }));
            });
            let create = server.mock(|when, then| {
                when.method(POST)
                    .path("/Contoso/_apis/git/repositories/web/refs")
                    .json_body(json!([{
                        "name": "refs/heads/feature/y",
                        "oldObjectId": "0000000000000000000000000000000000000000",
                        "newObjectId": "d3v"
                    }]));
                then.status(200).json_body(json!({"value": [{"success": true}]}));
            });

            create_client(&server)
                .create_branch("Contoso", "web", "feature/y", "dev")
                .await
                .unwrap();

            create.assert();
        }

        #[tokio::test]
        async fn test_create_branch_prefix_only_match_is_not_found() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(GET)
                    .path("/Contoso/_apis/git/repositories/web/refs");
                then.status(200).json_body(json!({
                    "count": 1,
                    "value": [{"name": "refs/heads/develop", "objectId": "d3v3l0p"}]
                }));
            });
            let create = server.mock(|when, then| {
                when.method(POST)
                    .path("/Contoso/_apis/git/repositories/web/refs");
                then.status(200).json_body(json!({}));
            });

            let err = create_client(&server)
                .create_branch("Contoso", "web", "feature/y", "dev")
                .await
                .unwrap_err();

            assert_eq!(err.to_string(), "Source branch 'dev' not found");
            create.assert_hits(0);
        }

        #[tokio::test]
        async fn test_create_branch_missing_source_writes_nothing() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(GET)
                    .path("/Contoso/_apis/git/repositories/web/refs");
                then.status(200).json_body(json!({"count": 0, "value": []}));
            });
            let create = server.mock(|when, then| {
                when.method(POST)
                    .path("/Contoso/_apis/git/repositories/web/refs");
                then.status(200).json_body(json!({}));
            });

            let err = create_client(&server)
                .create_branch("Contoso", "web", "feature/x", "develop")
                .await
                .unwrap_err();

            match &err {
                Error::NotFound(message) => {
                    assert_eq!(message, "Source branch 'develop' not found")
                }
                other => panic!("unexpected error: {other:?}"),
            }
            create.assert_hits(0);
        }

        #[tokio::test]
        async fn test_list_commits_criteria() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/Contoso/_apis/git/repositories/web/commits")
                    .query_param("searchCriteria.itemVersion.version", "main")
                    .query_param("searchCriteria.author", "jdoe")
                    .query_param("$top", "10");
                then.status(200).json_body(json!({"count": 0, "value": []}));
            });

            let criteria = CommitCriteria {
                branch: Some("main".into()),
                author: Some("jdoe".into()),
                top: Some(10),
                ..Default::default()
            };
            create_client(&server)
                .list_commits("Contoso", "web", &criteria)
                .await
                .unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_list_pull_requests_default_status() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/Contoso/_apis/git/repositories/web/pullrequests")
                    .query_param("searchCriteria.status", "Active")
                    .query_param("$top", "50");
                then.status(200).json_body(json!({"count": 0, "value": []}));
            });

            let criteria = PullRequestCriteria {
                top: Some(50),
                ..Default::default()
            };
            create_client(&server)
                .list_pull_requests("Contoso", "web", &criteria)
                .await
                .unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_create_pull_request_body() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/Contoso/_apis/git/repositories/web/pullrequests")
                    .json_body(json!({
                        "sourceRefName": "refs/heads/feature",
                        "targetRefName": "refs/heads/main",
                        "title": "Add login",
                        "isDraft": true
                    }));
                then.status(201).json_body(json!({"pullRequestId": 12}));
            });

            let input = CreatePullRequest {
                source_ref_name: "refs/heads/feature".into(),
                target_ref_name: "refs/heads/main".into(),
                title: "Add login".into(),
                description: None,
                is_draft: true,
            };
            let result = create_client(&server)
                .create_pull_request("Contoso", "web", &input)
                .await
                .unwrap();
            mock.assert();
            assert_eq!(result["pullRequestId"], 12);
        }

        #[tokio::test]
        async fn test_reply_to_thread() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/Contoso/_apis/git/repositories/web/pullrequests/12/threads/3/comments")
                    .json_body(json!({"content": "Fixed", "commentType": 1}));
                then.status(200).json_body(json!({"id": 2}));
            });

            create_client(&server)
                .reply_to_thread("Contoso", "web", 12, 3, "Fixed")
                .await
                .unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_list_builds_filters() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/Contoso/_apis/build/builds")
                    .query_param("definitions", "1,2")
                    .query_param("statusFilter", "completed")
                    .query_param("resultFilter", "failed")
                    .query_param("$top", "50");
                then.status(200).json_body(json!({"count": 0, "value": []}));
            });

            let filter = BuildFilter {
                definitions: vec![1, 2],
                status: Some("completed".into()),
                result: Some("failed".into()),
                top: Some(50),
                ..Default::default()
            };
            create_client(&server)
                .list_builds("Contoso", &filter)
                .await
                .unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_queue_build_parameters_are_a_json_string() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/Contoso/_apis/build/builds")
                    .json_body(json!({
                        "definition": {"id": 5},
                        "sourceBranch": "refs/heads/main",
                        "parameters": "{\"env\":\"qa\"}"
                    }));
                then.status(200).json_body(json!({"id": 100}));
            });

            let mut parameters = HashMap::new();
            parameters.insert("env".to_string(), "qa".to_string());
            create_client(&server)
                .queue_build("Contoso", 5, Some("refs/heads/main"), &parameters)
                .await
                .unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_get_build_log_returns_text() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/Contoso/_apis/build/builds/100/logs/4")
                    .query_param("startLine", "10")
                    .query_param("api-version", "7.1");
                then.status(200).body("2024-01-01T00:00:00Z Starting job\n");
            });

            let log = create_client(&server)
                .get_build_log("Contoso", 100, 4, Some(10), None)
                .await
                .unwrap();
            mock.assert();
            assert_eq!(log, "2024-01-01T00:00:00Z Starting job\n");
        }

        #[tokio::test]
        async fn test_run_pipeline_branch() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/Contoso/_apis/pipelines/9/runs")
                    .json_body(json!({
                        "resources": {"repositories": {"self": {"refName": "refs/heads/main"}}}
                    }));
                then.status(200).json_body(json!({"id": 77, "state": "inProgress"}));
            });

            create_client(&server)
                .run_pipeline("Contoso", 9, Some("main"), &HashMap::new())
                .await
                .unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_list_wikis_org_and_project_scope() {
            let server = MockServer::start();
            let org = server.mock(|when, then| {
                when.method(GET).path("/_apis/wiki/wikis");
                then.status(200).json_body(json!({"value": []}));
            });
            let project = server.mock(|when, then| {
                when.method(GET).path("/Contoso/_apis/wiki/wikis");
                then.status(200).json_body(json!({"value": []}));
            });

            let client = create_client(&server);
            client.list_wikis(None).await.unwrap();
            client.list_wikis(Some("Contoso")).await.unwrap();

            org.assert();
            project.assert();
        }

        #[tokio::test]
        async fn test_get_wiki_page_params() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/Contoso/_apis/wiki/wikis/Contoso.wiki/pages")
                    .query_param("path", "/Home")
                    .query_param("includeContent", "true");
                then.status(200).json_body(json!({"path": "/Home", "content": "# Hi"}));
            });

            let page = create_client(&server)
                .get_wiki_page("Contoso", "Contoso.wiki", "/Home", true)
                .await
                .unwrap();
            mock.assert();
            assert_eq!(page["content"], "# Hi");
        }

        #[tokio::test]
        async fn test_update_wiki_page_sends_if_match() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(PUT)
                    .path("/Contoso/_apis/wiki/wikis/Contoso.wiki/pages")
                    .query_param("path", "/Home")
                    .header("If-Match", "\"etag-1\"")
                    .json_body(json!({"content": "updated"}));
                then.status(200).json_body(json!({"path": "/Home"}));
            });

            create_client(&server)
                .create_or_update_wiki_page(
                    "Contoso",
                    "Contoso.wiki",
                    "/Home",
                    "updated",
                    Some("\"etag-1\""),
                )
                .await
                .unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_list_test_plans_active_filter() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/Contoso/_apis/testplan/plans")
                    .query_param("filterActivePlans", "true");
                then.status(200).json_body(json!({"value": []}));
            });

            create_client(&server)
                .list_test_plans("Contoso", true)
                .await
                .unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_add_test_cases_body() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/Contoso/_apis/testplan/Plans/1/Suites/2/TestCase")
                    .json_body(json!([{"workItem": {"id": 10}}, {"workItem": {"id": 11}}]));
                then.status(200).json_body(json!({"value": []}));
            });

            create_client(&server)
                .add_test_cases_to_suite("Contoso", 1, 2, &[10, 11])
                .await
                .unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_search_code_uses_search_base() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/_apis/search/codesearchresults")
                    .json_body(json!({
                        "searchText": "AuthManager",
                        "$top": 25,
                        "$skip": 0,
                        "filters": {"Project": ["Contoso"]}
                    }));
                then.status(200).json_body(json!({"count": 0, "results": []}));
            });

            let search = CodeSearch {
                search_text: "AuthManager".into(),
                project: Some("Contoso".into()),
                top: 25,
                ..Default::default()
            };
            create_client(&server).search_code(&search).await.unwrap();
            mock.assert();
        }

        #[tokio::test]
        async fn test_list_iterations_timeframe() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/Contoso/Web/_apis/work/teamsettings/iterations")
                    .query_param("$timeframe", "current");
                then.status(200).json_body(json!({"value": []}));
            });

            create_client(&server)
                .list_iterations("Contoso", "Web", Some("current"))
                .await
                .unwrap();
            mock.assert();
        }
    }
}
