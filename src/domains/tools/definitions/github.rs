//! GitHub tools over the REST API.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};

use super::common::{http_client, json_response};
use crate::core::config::Config;
use crate::domains::tools::{
    CapabilityModule, IntegrationError, IntegrationGuard, ParamSpec, ToolArgs, ToolDescriptor,
    ToolError, ToolOutput, ToolResult,
};

pub const INTEGRATION: &str = "GitHub";
pub const PREFIX: &str = "github_";
pub const HINT: &str = "Set GITHUB_TOKEN to enable the GitHub tools.";

const API_VERSION: &str = "2022-11-28";
const MAX_PER_PAGE: u32 = 100;

/// Build the GitHub guard from the configured token.
pub fn guard(config: &Config) -> IntegrationGuard {
    IntegrationGuard::new(INTEGRATION, PREFIX, HINT, || {
        let token = config
            .credentials
            .github_token
            .as_deref()
            .ok_or(IntegrationError::missing_credential("GITHUB_TOKEN"))?;
        let client = GitHubClient::new(
            token,
            &config.integrations.github_api_url,
            config.settings.request_timeout(),
        )?;
        Ok(GitHubTools::module(client))
    })
}

// ============================================================================
// API types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    pub description: Option<String>,
    pub html_url: String,
    pub default_branch: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: u64,
    pub sha: String,
    #[serde(default, skip_serializing)]
    pub content: Option<String>,
    #[serde(default, skip_serializing)]
    pub encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Contents {
    Directory(Vec<ContentEntry>),
    File(ContentEntry),
}

#[derive(Debug, Deserialize)]
struct CommitItem {
    sha: String,
    commit: CommitDetail,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    name: String,
    date: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    total_count: u64,
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    content: Option<ContentLink>,
    commit: CommitLink,
}

#[derive(Debug, Deserialize)]
struct ContentLink {
    sha: String,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitLink {
    sha: String,
}

// ============================================================================
// Client
// ============================================================================

/// Authenticated GitHub REST client.
pub struct GitHubClient {
    client: Client,
    base_url: Url,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl GitHubClient {
    pub fn new(token: &str, base_url: &str, timeout: Duration) -> Result<Self, IntegrationError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));

        let base_url = Url::parse(base_url)
            .map_err(|e| IntegrationError::client(format!("invalid GitHub API URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(IntegrationError::client("GitHub API URL cannot be a base"));
        }

        Ok(Self {
            client: http_client(timeout, headers)?,
            base_url,
        })
    }

    /// Build an endpoint URL; every segment is percent-encoded.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(segments.into_iter().filter(|s| !s.is_empty()));
        }
        url
    }

    fn contents_url(&self, repo: &RepoName, path: &str) -> Url {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str(), "contents"];
        segments.extend(path.split('/'));
        self.endpoint(segments)
    }

    pub async fn list_repos(
        &self,
        visibility: &str,
        sort: &str,
        per_page: u32,
    ) -> Result<Vec<Repository>, ToolError> {
        let response = self
            .client
            .get(self.endpoint(["user", "repos"]))
            .query(&[
                ("visibility", visibility),
                ("sort", sort),
                ("per_page", per_page.to_string().as_str()),
            ])
            .send()
            .await?;
        json_response("GitHub", response).await
    }

    pub async fn repo(&self, repo: &RepoName) -> Result<Repository, ToolError> {
        let response = self
            .client
            .get(self.endpoint(["repos", repo.owner.as_str(), repo.name.as_str()]))
            .send()
            .await?;
        json_response("GitHub", response).await
    }

    /// Create a repository for the authenticated user, or in `org`.
    pub async fn create_repo(&self, org: Option<&str>, body: &Value) -> Result<Repository, ToolError> {
        let url = match org {
            Some(org) => self.endpoint(["orgs", org, "repos"]),
            None => self.endpoint(["user", "repos"]),
        };
        json_response("GitHub", self.client.post(url).json(body).send().await?).await
    }

    pub async fn update_repo(&self, repo: &RepoName, body: &Value) -> Result<Repository, ToolError> {
        let response = self
            .client
            .patch(self.endpoint(["repos", repo.owner.as_str(), repo.name.as_str()]))
            .json(body)
            .send()
            .await?;
        json_response("GitHub", response).await
    }

    async fn contents(
        &self,
        repo: &RepoName,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Contents, ToolError> {
        let mut request = self.client.get(self.contents_url(repo, path));
        if let Some(git_ref) = git_ref {
            request = request.query(&[("ref", git_ref)]);
        }
        json_response("GitHub", request.send().await?).await
    }

    /// Blob sha of an existing file, `None` if it does not exist yet.
    async fn existing_sha(
        &self,
        repo: &RepoName,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Option<String>, ToolError> {
        let mut request = self.client.get(self.contents_url(repo, path));
        if let Some(branch) = branch {
            request = request.query(&[("ref", branch)]);
        }
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        match json_response("GitHub", response).await? {
            Contents::File(entry) => Ok(Some(entry.sha)),
            Contents::Directory(_) => Err(ToolError::invalid_arguments(format!(
                "'{}' is a directory",
                path
            ))),
        }
    }

    async fn put_file(
        &self,
        repo: &RepoName,
        path: &str,
        body: &Value,
    ) -> Result<WriteResponse, ToolError> {
        let response = self
            .client
            .put(self.contents_url(repo, path))
            .json(body)
            .send()
            .await?;
        json_response("GitHub", response).await
    }

    async fn commits(
        &self,
        repo: &RepoName,
        path: Option<&str>,
        sha: Option<&str>,
        per_page: u32,
    ) -> Result<Vec<CommitItem>, ToolError> {
        let mut query = vec![("per_page", per_page.to_string())];
        if let Some(path) = path {
            query.push(("path", path.to_string()));
        }
        if let Some(sha) = sha {
            query.push(("sha", sha.to_string()));
        }
        let response = self
            .client
            .get(self.endpoint(["repos", repo.owner.as_str(), repo.name.as_str(), "commits"]))
            .query(&query)
            .send()
            .await?;
        json_response("GitHub", response).await
    }

    async fn search(&self, kind: &str, query: &str, per_page: u32) -> Result<SearchResponse, ToolError> {
        let response = self
            .client
            .get(self.endpoint(["search", kind]))
            .query(&[("q", query), ("per_page", per_page.to_string().as_str())])
            .send()
            .await?;
        json_response("GitHub", response).await
    }
}

/// `owner/name` repository reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoName {
    pub owner: String,
    pub name: String,
}

impl std::str::FromStr for RepoName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(ToolError::invalid_arguments(format!(
                "repository must be 'owner/name', got '{}'",
                s
            ))),
        }
    }
}

impl std::fmt::Display for RepoName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

fn decode_content(entry: &ContentEntry) -> Result<String, ToolError> {
    let raw = entry
        .content
        .as_deref()
        .ok_or_else(|| ToolError::upstream(format!("GitHub returned no content for {}", entry.path)))?;
    if entry.encoding.as_deref().is_some_and(|e| e != "base64") {
        return Err(ToolError::upstream(format!(
            "Unsupported content encoding for {}",
            entry.path
        )));
    }
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact)
        .map_err(|e| ToolError::upstream(format!("Invalid base64 content: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|_| ToolError::upstream(format!("{} is not a UTF-8 text file", entry.path)))
}

// ============================================================================
// Tools
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListReposParams {
    visibility: String,
    sort: String,
    per_page: u32,
}

#[derive(Debug, Deserialize)]
struct RepoParams {
    repo: String,
}

#[derive(Debug, Deserialize)]
struct BrowseParams {
    repo: String,
    path: String,
    #[serde(rename = "ref")]
    git_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadParams {
    repo: String,
    path: String,
    #[serde(rename = "ref")]
    git_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateParams {
    repo: String,
    path: String,
    content: String,
    message: String,
    branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManageParams {
    action: String,
    repo: String,
    description: Option<String>,
    homepage: Option<String>,
    private: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CommitsParams {
    repo: String,
    path: Option<String>,
    sha: Option<String>,
    per_page: u32,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    search_type: String,
    per_page: u32,
}

pub struct GitHubTools {
    client: GitHubClient,
}

impl GitHubTools {
    pub const NAMESPACE: &'static str = "github";

    pub fn module(client: GitHubClient) -> CapabilityModule {
        let repo = || ParamSpec::string("repo", "Repository as owner/name").required();

        CapabilityModule::builder(Self::NAMESPACE, Arc::new(Self { client }))
            .tool(
                ToolDescriptor::new("github_list_repos", "List repositories of the authenticated user.")
                    .param(
                        ParamSpec::string("visibility", "Which repositories")
                            .default_value(json!("all"))
                            .one_of(&["all", "public", "private"]),
                    )
                    .param(
                        ParamSpec::string("sort", "Sort order")
                            .default_value(json!("updated"))
                            .one_of(&["updated", "created", "pushed", "full_name"]),
                    )
                    .param(ParamSpec::integer("per_page", "Results (max 100)").default_value(json!(30))),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.list_repos(args.parse()?).await
                },
            )
            .tool(
                ToolDescriptor::new("github_browse_repo", "List the contents of a repository folder.")
                    .param(repo())
                    .param(ParamSpec::string("path", "Folder path").default_value(json!("")))
                    .param(ParamSpec::string("ref", "Branch, tag or commit")),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.browse(args.parse()?).await },
            )
            .tool(
                ToolDescriptor::new("github_read_file", "Read a text file from a repository.")
                    .param(repo())
                    .param(ParamSpec::string("path", "File path").required())
                    .param(ParamSpec::string("ref", "Branch, tag or commit")),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.read(args.parse()?).await },
            )
            .tool(
                ToolDescriptor::new(
                    "github_create_file",
                    "Create a file in a repository, or update it if it exists.",
                )
                .param(repo())
                .param(ParamSpec::string("path", "File path").required())
                .param(ParamSpec::string("content", "File content").required())
                .param(ParamSpec::string("message", "Commit message").required())
                .param(ParamSpec::string("branch", "Target branch")),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.create(args.parse()?).await },
            )
            .tool(
                ToolDescriptor::new(
                    "github_manage_repo",
                    "Create a repository, update its settings or archive it.",
                )
                .param(
                    ParamSpec::string("action", "What to do")
                        .required()
                        .one_of(&["create", "update", "archive"]),
                )
                .param(
                    ParamSpec::string(
                        "repo",
                        "owner/name; for create, a bare name or organization/name",
                    )
                    .required(),
                )
                .param(ParamSpec::string("description", "Repository description"))
                .param(ParamSpec::string("homepage", "Project homepage URL"))
                .param(ParamSpec::boolean("private", "Repository visibility")),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.manage(args.parse()?).await },
            )
            .tool(
                ToolDescriptor::new("github_repo_info", "Show repository details.").param(repo()),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.info(args.parse()?).await },
            )
            .tool(
                ToolDescriptor::new("github_list_commits", "List recent commits.")
                    .param(repo())
                    .param(ParamSpec::string("path", "Only commits touching this path"))
                    .param(ParamSpec::string("sha", "Branch or commit to start from"))
                    .param(ParamSpec::integer("per_page", "Results (max 100)").default_value(json!(10))),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.list_commits(args.parse()?).await
                },
            )
            .tool(
                ToolDescriptor::new("github_search", "Search GitHub code, repositories or issues.")
                    .param(ParamSpec::string("query", "GitHub search query").required())
                    .param(
                        ParamSpec::string("search_type", "What to search")
                            .default_value(json!("repositories"))
                            .one_of(&["code", "repositories", "issues"]),
                    )
                    .param(ParamSpec::integer("per_page", "Results (max 100)").default_value(json!(10))),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.search(args.parse()?).await },
            )
            .build()
    }

    async fn list_repos(&self, params: ListReposParams) -> ToolResult {
        let repos = self
            .client
            .list_repos(&params.visibility, &params.sort, clamp_page(params.per_page))
            .await?;
        Ok(ToolOutput::data(json!({
            "repositories": repos,
            "total": repos.len(),
        })))
    }

    async fn browse(&self, params: BrowseParams) -> ToolResult {
        let repo: RepoName = params.repo.parse()?;
        let entries = match self
            .client
            .contents(&repo, &params.path, params.git_ref.as_deref())
            .await?
        {
            Contents::Directory(entries) => entries,
            Contents::File(entry) => vec![entry],
        };
        Ok(ToolOutput::data(json!({
            "repo": repo.to_string(),
            "path": params.path,
            "entries": entries,
            "total": entries.len(),
        })))
    }

    async fn read(&self, params: ReadParams) -> ToolResult {
        let repo: RepoName = params.repo.parse()?;
        let entry = match self
            .client
            .contents(&repo, &params.path, params.git_ref.as_deref())
            .await?
        {
            Contents::File(entry) if entry.kind == "file" => entry,
            _ => {
                return Err(ToolError::invalid_arguments(format!(
                    "'{}' is not a file",
                    params.path
                )));
            }
        };
        let content = decode_content(&entry)?;
        Ok(ToolOutput::data(json!({
            "repo": repo.to_string(),
            "path": entry.path,
            "sha": entry.sha,
            "size": entry.size,
            "content": content,
        })))
    }

    #[instrument(skip_all, fields(repo = %params.repo, path = %params.path))]
    async fn create(&self, params: CreateParams) -> ToolResult {
        let repo: RepoName = params.repo.parse()?;
        let path = params.path.trim_matches('/');
        if path.is_empty() {
            return Err(ToolError::invalid_arguments("path must name a file"));
        }

        let existing = self
            .client
            .existing_sha(&repo, path, params.branch.as_deref())
            .await?;
        let mut body = json!({
            "message": params.message,
            "content": BASE64.encode(params.content.as_bytes()),
        });
        if let Some(sha) = &existing {
            body["sha"] = json!(sha);
        }
        if let Some(branch) = &params.branch {
            body["branch"] = json!(branch);
        }

        let written = self.client.put_file(&repo, path, &body).await?;
        let action = if existing.is_some() { "Updated" } else { "Created" };
        info!("{} {} in {}", action, path, repo);

        Ok(ToolOutput::with_message(
            json!({
                "repo": repo.to_string(),
                "path": path,
                "created": existing.is_none(),
                "sha": written.content.as_ref().map(|c| c.sha.clone()),
                "html_url": written.content.and_then(|c| c.html_url),
                "commit": written.commit.sha,
            }),
            format!("{} {}", action, path),
        ))
    }

    #[instrument(skip_all, fields(action = %params.action, repo = %params.repo))]
    async fn manage(&self, params: ManageParams) -> ToolResult {
        let mut settings = serde_json::Map::new();
        if let Some(description) = params.description {
            settings.insert("description".to_string(), json!(description));
        }
        if let Some(homepage) = params.homepage {
            settings.insert("homepage".to_string(), json!(homepage));
        }
        if let Some(private) = params.private {
            settings.insert("private".to_string(), json!(private));
        }

        let (repository, verb) = match params.action.as_str() {
            "create" => {
                let (org, name) = match params.repo.trim().split_once('/') {
                    Some((org, name)) => (Some(org), name),
                    None => (None, params.repo.trim()),
                };
                if name.is_empty() || name.contains('/') || org.is_some_and(str::is_empty) {
                    return Err(ToolError::invalid_arguments(format!(
                        "cannot create repository '{}'",
                        params.repo
                    )));
                }
                settings.insert("name".to_string(), json!(name));
                settings.insert("auto_init".to_string(), json!(true));
                let body = Value::Object(settings);
                (self.client.create_repo(org, &body).await?, "Created")
            }
            "update" => {
                let repo: RepoName = params.repo.parse()?;
                if settings.is_empty() {
                    return Err(ToolError::invalid_arguments(
                        "update needs at least one of description, homepage or private",
                    ));
                }
                let body = Value::Object(settings);
                (self.client.update_repo(&repo, &body).await?, "Updated")
            }
            "archive" => {
                let repo: RepoName = params.repo.parse()?;
                settings.insert("archived".to_string(), json!(true));
                let body = Value::Object(settings);
                (self.client.update_repo(&repo, &body).await?, "Archived")
            }
            other => {
                return Err(ToolError::invalid_arguments(format!(
                    "unknown action '{}'",
                    other
                )));
            }
        };

        info!("{} {}", verb, repository.full_name);
        let message = format!("{} {}", verb, repository.full_name);
        Ok(ToolOutput::with_message(json!(repository), message))
    }

    async fn info(&self, params: RepoParams) -> ToolResult {
        let repo: RepoName = params.repo.parse()?;
        let info = self.client.repo(&repo).await?;
        Ok(ToolOutput::data(json!(info)))
    }

    async fn list_commits(&self, params: CommitsParams) -> ToolResult {
        let repo: RepoName = params.repo.parse()?;
        let commits = self
            .client
            .commits(
                &repo,
                params.path.as_deref(),
                params.sha.as_deref(),
                clamp_page(params.per_page),
            )
            .await?;

        let commits: Vec<Value> = commits
            .into_iter()
            .map(|c| {
                json!({
                    "sha": c.sha,
                    "message": c.commit.message.lines().next().unwrap_or_default(),
                    "author": c.commit.author.as_ref().map(|a| a.name.clone()),
                    "date": c.commit.author.as_ref().map(|a| a.date.clone()),
                    "html_url": c.html_url,
                })
            })
            .collect();
        Ok(ToolOutput::data(json!({
            "repo": repo.to_string(),
            "commits": commits,
            "total": commits.len(),
        })))
    }

    async fn search(&self, params: SearchParams) -> ToolResult {
        let result = self
            .client
            .search(&params.search_type, &params.query, clamp_page(params.per_page))
            .await?;
        let items: Vec<Value> = result.items.iter().map(search_summary).collect();
        Ok(ToolOutput::data(json!({
            "query": params.query,
            "search_type": params.search_type,
            "total_count": result.total_count,
            "items": items,
        })))
    }
}

fn clamp_page(per_page: u32) -> u32 {
    per_page.clamp(1, MAX_PER_PAGE)
}

/// Keep the fields worth showing from a search hit of any type.
fn search_summary(item: &Value) -> Value {
    const FIELDS: &[&str] = &[
        "name",
        "full_name",
        "path",
        "title",
        "state",
        "number",
        "description",
        "html_url",
        "stargazers_count",
    ];
    let mut summary = serde_json::Map::new();
    for field in FIELDS {
        if let Some(value) = item.get(*field).filter(|v| !v.is_null()) {
            summary.insert(field.to_string(), value.clone());
        }
    }
    if let Some(repo) = item.pointer("/repository/full_name") {
        summary.insert("repository".to_string(), repo.clone());
    }
    Value::Object(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::JsonObject;
    use axum::extract::{Path, State};
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::{get, patch, post};
    use axum::{Json, Router};
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct FakeGitHub {
        puts: Mutex<Vec<Value>>,
        repo_writes: Mutex<Vec<(String, Value)>>,
    }

    fn repo_json(full_name: &str, body: &Value) -> Value {
        let name = full_name.rsplit('/').next().unwrap_or_default();
        json!({
            "name": name,
            "full_name": full_name,
            "private": body["private"].as_bool().unwrap_or(false),
            "description": body["description"],
            "html_url": format!("https://github.com/{}", full_name),
            "default_branch": "main"
        })
    }

    async fn serve() -> (String, Arc<FakeGitHub>) {
        let state = Arc::new(FakeGitHub::default());
        let router = Router::new()
            .route(
                "/user/repos",
                get(|| async {
                    Json(json!([{
                        "name": "notes",
                        "full_name": "ada/notes",
                        "private": true,
                        "description": null,
                        "html_url": "https://github.com/ada/notes",
                        "default_branch": "main",
                        "language": "Rust",
                        "stargazers_count": 3,
                        "updated_at": "2026-01-01T00:00:00Z"
                    }]))
                })
                .post(
                    |State(state): State<Arc<FakeGitHub>>, Json(body): Json<Value>| async move {
                        let full_name = format!("ada/{}", body["name"].as_str().unwrap_or_default());
                        let repo = repo_json(&full_name, &body);
                        state.repo_writes.lock().unwrap().push(("POST /user/repos".to_string(), body));
                        (HttpStatus::CREATED, Json(repo))
                    },
                ),
            )
            .route(
                "/orgs/{org}/repos",
                post(
                    |State(state): State<Arc<FakeGitHub>>,
                     Path(org): Path<String>,
                     Json(body): Json<Value>| async move {
                        let full_name = format!("{}/{}", org, body["name"].as_str().unwrap_or_default());
                        let repo = repo_json(&full_name, &body);
                        state
                            .repo_writes
                            .lock()
                            .unwrap()
                            .push((format!("POST /orgs/{}/repos", org), body));
                        (HttpStatus::CREATED, Json(repo))
                    },
                ),
            )
            .route(
                "/repos/{owner}/{repo}",
                patch(
                    |State(state): State<Arc<FakeGitHub>>,
                     Path((owner, repo)): Path<(String, String)>,
                     Json(body): Json<Value>| async move {
                        let full_name = format!("{}/{}", owner, repo);
                        let json = repo_json(&full_name, &body);
                        state
                            .repo_writes
                            .lock()
                            .unwrap()
                            .push((format!("PATCH /repos/{}", full_name), body));
                        Json(json)
                    },
                ),
            )
            .route(
                "/repos/{owner}/{repo}/contents/{*path}",
                get(
                    |Path((_, _, path)): Path<(String, String, String)>| async move {
                        match path.as_str() {
                            "docs/intro.md" => (
                                HttpStatus::OK,
                                Json(json!({
                                    "name": "intro.md",
                                    "path": "docs/intro.md",
                                    "type": "file",
                                    "size": 11,
                                    "sha": "abc123",
                                    "encoding": "base64",
                                    "content": "aGVsbG8g\nd29ybGQ=\n"
                                })),
                            ),
                            "docs" => (
                                HttpStatus::OK,
                                Json(json!([
                                    {"name": "intro.md", "path": "docs/intro.md", "type": "file", "size": 11, "sha": "abc123"},
                                    {"name": "img", "path": "docs/img", "type": "dir", "size": 0, "sha": "def456"}
                                ])),
                            ),
                            _ => (
                                HttpStatus::NOT_FOUND,
                                Json(json!({"message": "Not Found"})),
                            ),
                        }
                    },
                )
                .put(
                    |State(state): State<Arc<FakeGitHub>>, Json(body): Json<Value>| async move {
                        state.puts.lock().unwrap().push(body);
                        (
                            HttpStatus::CREATED,
                            Json(json!({
                                "content": {"sha": "new-sha", "html_url": "https://github.com/ada/notes/blob/main/x"},
                                "commit": {"sha": "commit-sha"}
                            })),
                        )
                    },
                ),
            )
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}", addr), state)
    }

    async fn module() -> (CapabilityModule, Arc<FakeGitHub>) {
        let (base, state) = serve().await;
        let client = GitHubClient::new("ghp_test", &base, Duration::from_secs(5)).unwrap();
        (GitHubTools::module(client), state)
    }

    fn args(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    async fn data(module: &CapabilityModule, name: &str, value: Value) -> Value {
        module
            .invoke(name, args(value))
            .await
            .unwrap()
            .into_envelope()
            .to_value()["data"]
            .clone()
    }

    #[test]
    fn test_repo_name_parsing() {
        let repo: RepoName = "ada/notes".parse().unwrap();
        assert_eq!(repo.owner, "ada");
        assert_eq!(repo.to_string(), "ada/notes");
        assert!("notes".parse::<RepoName>().is_err());
        assert!("ada/notes/extra".parse::<RepoName>().is_err());
        assert!("/notes".parse::<RepoName>().is_err());
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client =
            GitHubClient::new("t", "https://example.com/api/v3/", Duration::from_secs(1)).unwrap();
        let repo: RepoName = "ada/notes".parse().unwrap();
        assert_eq!(
            client.contents_url(&repo, "My Notes/a b.md").as_str(),
            "https://example.com/api/v3/repos/ada/notes/contents/My%20Notes/a%20b.md"
        );
    }

    #[tokio::test]
    async fn test_list_repos() {
        let (module, _) = module().await;
        let data = data(&module, "github_list_repos", json!({})).await;
        assert_eq!(data["total"], json!(1));
        assert_eq!(data["repositories"][0]["full_name"], json!("ada/notes"));
    }

    #[tokio::test]
    async fn test_read_file_decodes_base64() {
        let (module, _) = module().await;
        let data = data(
            &module,
            "github_read_file",
            json!({"repo": "ada/notes", "path": "docs/intro.md"}),
        )
        .await;
        assert_eq!(data["content"], json!("hello world"));
        assert_eq!(data["sha"], json!("abc123"));
    }

    #[tokio::test]
    async fn test_browse_directory() {
        let (module, _) = module().await;
        let data = data(
            &module,
            "github_browse_repo",
            json!({"repo": "ada/notes", "path": "docs"}),
        )
        .await;
        assert_eq!(data["total"], json!(2));
        assert_eq!(data["entries"][1]["type"], json!("dir"));
        assert!(data["entries"][0].get("content").is_none());
    }

    #[tokio::test]
    async fn test_create_file_new_and_update() {
        let (module, state) = module().await;

        let created = data(
            &module,
            "github_create_file",
            json!({"repo": "ada/notes", "path": "new.md", "content": "hi", "message": "add"}),
        )
        .await;
        assert_eq!(created["created"], json!(true));
        assert_eq!(created["commit"], json!("commit-sha"));

        let updated = data(
            &module,
            "github_create_file",
            json!({"repo": "ada/notes", "path": "docs/intro.md", "content": "hi", "message": "edit"}),
        )
        .await;
        assert_eq!(updated["created"], json!(false));

        let puts = state.puts.lock().unwrap();
        assert_eq!(puts[0]["content"], json!("aGk="));
        assert!(puts[0].get("sha").is_none());
        assert_eq!(puts[1]["sha"], json!("abc123"));
    }

    #[tokio::test]
    async fn test_manage_repo_create_update_archive() {
        let (module, state) = module().await;

        let created = module
            .invoke(
                "github_manage_repo",
                args(json!({"action": "create", "repo": "lemmas", "private": true})),
            )
            .await
            .unwrap()
            .into_envelope()
            .to_value();
        assert_eq!(created["message"], json!("Created ada/lemmas"));
        assert_eq!(created["data"]["private"], json!(true));

        let in_org = data(
            &module,
            "github_manage_repo",
            json!({"action": "create", "repo": "mathlab/seminar"}),
        )
        .await;
        assert_eq!(in_org["full_name"], json!("mathlab/seminar"));

        data(
            &module,
            "github_manage_repo",
            json!({"action": "update", "repo": "ada/notes", "description": "Lecture notes"}),
        )
        .await;
        data(
            &module,
            "github_manage_repo",
            json!({"action": "archive", "repo": "ada/notes"}),
        )
        .await;

        let writes = state.repo_writes.lock().unwrap();
        let routes: Vec<&str> = writes.iter().map(|(route, _)| route.as_str()).collect();
        assert_eq!(
            routes,
            vec![
                "POST /user/repos",
                "POST /orgs/mathlab/repos",
                "PATCH /repos/ada/notes",
                "PATCH /repos/ada/notes"
            ]
        );
        assert_eq!(writes[0].1["name"], json!("lemmas"));
        assert_eq!(writes[0].1["auto_init"], json!(true));
        assert_eq!(writes[2].1, json!({"description": "Lecture notes"}));
        assert_eq!(writes[3].1, json!({"archived": true}));
    }

    #[tokio::test]
    async fn test_manage_repo_update_needs_settings() {
        let (module, _) = module().await;
        let err = module
            .invoke(
                "github_manage_repo",
                args(json!({"action": "update", "repo": "ada/notes"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = module
            .invoke(
                "github_manage_repo",
                args(json!({"action": "create", "repo": "a/b/c"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_upstream_failure() {
        let (module, _) = module().await;
        let err = module
            .invoke(
                "github_read_file",
                args(json!({"repo": "ada/notes", "path": "nope.md"})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "GitHub API error 404 Not Found: Not Found");
    }

    #[test]
    fn test_guard_lists_prefixed_tools() {
        let mut config = Config::with_base_path("/tmp/unused");
        config.credentials.github_token = Some("ghp_test".to_string());
        let guard = guard(&config);
        assert!(guard.is_available());
        assert_eq!(guard.descriptors().len(), 8);
        assert!(guard.descriptors().iter().all(|d| d.name().starts_with(PREFIX)));
    }
}
