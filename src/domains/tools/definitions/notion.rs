//! Notion tools.
//!
//! Page content is sent as Notion blocks converted from markdown. The API
//! accepts at most 100 blocks per request and 2000 characters per rich text
//! item, so longer content is split on both axes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::fs;
use tracing::{debug, info, instrument};

use super::common::{http_client, json_response};
use super::knowledge::FrontMatter;
use crate::core::config::Config;
use crate::core::security::resolve_existing;
use crate::domains::tools::{
    CapabilityModule, IntegrationError, IntegrationGuard, JsonObject, ParamSpec, ToolArgs,
    ToolDescriptor, ToolError, ToolOutput, ToolResult,
};

pub const INTEGRATION: &str = "Notion";
pub const PREFIX: &str = "notion_";
pub const HINT: &str = "Set NOTION_TOKEN to enable the Notion tools.";

const NOTION_VERSION: &str = "2022-06-28";

/// Most blocks a single create/append request may carry.
pub const MAX_BLOCKS_PER_REQUEST: usize = 100;

/// Longest content of one rich text item.
pub const MAX_TEXT_LENGTH: usize = 2000;

/// Build the Notion guard from the configured token.
pub fn guard(config: &Config) -> IntegrationGuard {
    IntegrationGuard::new(INTEGRATION, PREFIX, HINT, || {
        let token = config
            .credentials
            .notion_token
            .as_deref()
            .ok_or(IntegrationError::missing_credential("NOTION_TOKEN"))?;
        let client = NotionClient::new(
            token,
            &config.integrations.notion_api_url,
            config.settings.request_timeout(),
        )?;
        Ok(NotionTools::module(
            client,
            config.paths.vault.clone(),
            config.security.allow_symlinks,
        ))
    })
}

// ============================================================================
// Markdown conversion
// ============================================================================

/// Rich text array for `text`, split into items of at most
/// [`MAX_TEXT_LENGTH`] characters.
pub fn rich_text(text: &str) -> Vec<Value> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(MAX_TEXT_LENGTH)
        .map(|chunk| {
            let content: String = chunk.iter().collect();
            json!({ "type": "text", "text": { "content": content } })
        })
        .collect()
}

fn text_block(kind: &str, text: &str) -> Value {
    json!({
        "object": "block",
        "type": kind,
        kind: { "rich_text": rich_text(text) }
    })
}

fn code_language(tag: &str) -> &'static str {
    match tag.trim().to_lowercase().as_str() {
        "rust" | "rs" => "rust",
        "python" | "py" => "python",
        "javascript" | "js" => "javascript",
        "typescript" | "ts" => "typescript",
        "bash" | "sh" | "shell" => "shell",
        "latex" | "tex" => "latex",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "c" => "c",
        "c++" | "cpp" => "c++",
        "java" => "java",
        "go" => "go",
        "haskell" | "hs" => "haskell",
        "sql" => "sql",
        "markdown" | "md" => "markdown",
        "mermaid" => "mermaid",
        _ => "plain text",
    }
}

/// Convert markdown into Notion blocks.
///
/// Handles headings, bulleted/numbered/to-do lists, quotes, dividers, fenced
/// code and paragraphs. Inline formatting is kept as literal text.
pub fn markdown_to_blocks(markdown: &str) -> Vec<Value> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut code: Option<(&'static str, Vec<&str>)> = None;

    fn flush(paragraph: &mut Vec<&str>, blocks: &mut Vec<Value>) {
        if !paragraph.is_empty() {
            blocks.push(text_block("paragraph", &paragraph.join("\n")));
            paragraph.clear();
        }
    }

    for line in markdown.lines() {
        if let Some((language, lines)) = code.as_mut() {
            if line.trim_start().starts_with("```") {
                blocks.push(json!({
                    "object": "block",
                    "type": "code",
                    "code": { "rich_text": rich_text(&lines.join("\n")), "language": *language }
                }));
                code = None;
            } else {
                lines.push(line);
            }
            continue;
        }

        let trimmed = line.trim();
        if let Some(tag) = trimmed.strip_prefix("```") {
            flush(&mut paragraph, &mut blocks);
            code = Some((code_language(tag), Vec::new()));
            continue;
        }
        if trimmed.is_empty() {
            flush(&mut paragraph, &mut blocks);
            continue;
        }

        let block = if let Some(text) = trimmed.strip_prefix("### ") {
            Some(text_block("heading_3", text))
        } else if let Some(text) = trimmed.strip_prefix("## ") {
            Some(text_block("heading_2", text))
        } else if let Some(text) = trimmed.strip_prefix("# ") {
            Some(text_block("heading_1", text))
        } else if trimmed == "---" || trimmed == "***" {
            Some(json!({ "object": "block", "type": "divider", "divider": {} }))
        } else if let Some(rest) = trimmed
            .strip_prefix("- [")
            .or_else(|| trimmed.strip_prefix("* ["))
            .filter(|r| r.get(1..).is_some_and(|s| s.starts_with("] ")))
        {
            let checked = rest.starts_with('x') || rest.starts_with('X');
            Some(json!({
                "object": "block",
                "type": "to_do",
                "to_do": { "rich_text": rich_text(&rest[3..]), "checked": checked }
            }))
        } else if let Some(text) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            Some(text_block("bulleted_list_item", text))
        } else if let Some(text) = numbered_item(trimmed) {
            Some(text_block("numbered_list_item", text))
        } else if let Some(text) = trimmed.strip_prefix("> ") {
            Some(text_block("quote", text))
        } else {
            None
        };

        match block {
            Some(block) => {
                flush(&mut paragraph, &mut blocks);
                blocks.push(block);
            }
            None => paragraph.push(trimmed),
        }
    }

    // An unterminated fence still keeps its content.
    if let Some((language, lines)) = code {
        blocks.push(json!({
            "object": "block",
            "type": "code",
            "code": { "rich_text": rich_text(&lines.join("\n")), "language": language }
        }));
    }
    flush(&mut paragraph, &mut blocks);
    blocks
}

fn numbered_item(line: &str) -> Option<&str> {
    let (number, rest) = line.split_once(". ")?;
    (!number.is_empty() && number.chars().all(|c| c.is_ascii_digit())).then_some(rest)
}

/// Plain text of a page or database title.
fn title_of(object: &Value) -> String {
    let title = object.get("title").and_then(|t| t.as_array()).or_else(|| {
        object
            .get("properties")
            .and_then(|p| p.as_object())
            .and_then(|props| {
                props
                    .values()
                    .find(|prop| prop["type"] == "title")
                    .and_then(|prop| prop["title"].as_array())
            })
    });
    title
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["plain_text"].as_str().or_else(|| p["text"]["content"].as_str()))
                .collect()
        })
        .unwrap_or_default()
}

/// Convert a plain value into the property payload its schema type expects.
fn property_value(kind: &str, name: &str, value: &Value) -> Result<Value, ToolError> {
    let text = || match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let invalid = |expected: &str| {
        ToolError::invalid_arguments(format!("property '{}' expects {}", name, expected))
    };

    Ok(match kind {
        "title" => json!({ "title": rich_text(&text()) }),
        "rich_text" => json!({ "rich_text": rich_text(&text()) }),
        "number" => json!({ "number": value.as_f64().ok_or_else(|| invalid("a number"))? }),
        "checkbox" => json!({ "checkbox": value.as_bool().ok_or_else(|| invalid("a boolean"))? }),
        "select" => json!({ "select": { "name": text() } }),
        "status" => json!({ "status": { "name": text() } }),
        "multi_select" => {
            let names: Vec<Value> = match value {
                Value::Array(items) => items
                    .iter()
                    .map(|v| json!({ "name": v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()) }))
                    .collect(),
                _ => text()
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| json!({ "name": s }))
                    .collect(),
            };
            json!({ "multi_select": names })
        }
        "date" => json!({ "date": { "start": text() } }),
        "url" => json!({ "url": text() }),
        "email" => json!({ "email": text() }),
        "phone_number" => json!({ "phone_number": text() }),
        other => {
            return Err(ToolError::invalid_arguments(format!(
                "property '{}' has unsupported type '{}'",
                name, other
            )));
        }
    })
}

// ============================================================================
// Client
// ============================================================================

/// Authenticated Notion API client.
pub struct NotionClient {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for NotionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl NotionClient {
    pub fn new(token: &str, base_url: &str, timeout: Duration) -> Result<Self, IntegrationError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert("Notion-Version", HeaderValue::from_static(NOTION_VERSION));

        Ok(Self {
            client: http_client(timeout, headers)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, ToolError> {
        let mut request = self
            .client
            .request(method, format!("{}/{}", self.base_url, path));
        if let Some(body) = body {
            request = request.json(body);
        }
        json_response("Notion", request.send().await?).await
    }

    pub async fn search(
        &self,
        query: &str,
        object: Option<&str>,
        page_size: u32,
    ) -> Result<Vec<Value>, ToolError> {
        let mut body = json!({ "query": query, "page_size": page_size.clamp(1, 100) });
        if let Some(object) = object {
            body["filter"] = json!({ "property": "object", "value": object });
        }
        let response = self.request(Method::POST, "search", Some(&body)).await?;
        Ok(response["results"].as_array().cloned().unwrap_or_default())
    }

    /// Create a page; blocks beyond the first request's limit are appended.
    pub async fn create_page(
        &self,
        parent: Value,
        properties: Value,
        blocks: Vec<Value>,
    ) -> Result<Value, ToolError> {
        let mut chunks = blocks.chunks(MAX_BLOCKS_PER_REQUEST);
        let first = chunks.next().map(<[Value]>::to_vec).unwrap_or_default();
        let body = json!({
            "parent": parent,
            "properties": properties,
            "children": first,
        });
        let page = self.request(Method::POST, "pages", Some(&body)).await?;

        let page_id = page["id"]
            .as_str()
            .ok_or_else(|| ToolError::upstream("Notion returned a page without id"))?;
        for chunk in chunks {
            self.append_chunk(page_id, chunk).await?;
        }
        Ok(page)
    }

    pub async fn append_blocks(&self, block_id: &str, blocks: &[Value]) -> Result<usize, ToolError> {
        for chunk in blocks.chunks(MAX_BLOCKS_PER_REQUEST) {
            self.append_chunk(block_id, chunk).await?;
        }
        Ok(blocks.len())
    }

    async fn append_chunk(&self, block_id: &str, chunk: &[Value]) -> Result<(), ToolError> {
        debug!("Appending {} blocks to {}", chunk.len(), block_id);
        let body = json!({ "children": chunk });
        self.request(
            Method::PATCH,
            &format!("blocks/{}/children", block_id),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    /// Archive every child block of `block_id`.
    pub async fn clear_children(&self, block_id: &str) -> Result<usize, ToolError> {
        let mut removed = 0;
        loop {
            let listing = self
                .request(
                    Method::GET,
                    &format!("blocks/{}/children?page_size=100", block_id),
                    None,
                )
                .await?;
            let ids: Vec<String> = listing["results"]
                .as_array()
                .map(|children| {
                    children
                        .iter()
                        .filter_map(|c| c["id"].as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            if ids.is_empty() {
                return Ok(removed);
            }
            for id in &ids {
                self.request(Method::DELETE, &format!("blocks/{}", id), None)
                    .await?;
                removed += 1;
            }
            if listing["has_more"] != json!(true) {
                return Ok(removed);
            }
        }
    }

    pub async fn update_page(&self, page_id: &str, properties: Value) -> Result<Value, ToolError> {
        let body = json!({ "properties": properties });
        self.request(Method::PATCH, &format!("pages/{}", page_id), Some(&body))
            .await
    }

    pub async fn database(&self, database_id: &str) -> Result<Value, ToolError> {
        self.request(Method::GET, &format!("databases/{}", database_id), None)
            .await
    }
}

// ============================================================================
// Tools
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    filter_type: Option<String>,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
struct CreatePageParams {
    parent_id: String,
    title: String,
    content: String,
    parent_type: String,
}

#[derive(Debug, Deserialize)]
struct UpdatePageParams {
    page_id: String,
    title: Option<String>,
    content: Option<String>,
    append: bool,
}

#[derive(Debug, Deserialize)]
struct AddToDatabaseParams {
    database_id: String,
    properties: JsonObject,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListDatabasesParams {
    page_size: u32,
}

#[derive(Debug, Deserialize)]
struct SyncParams {
    note_path: String,
    parent_id: String,
    parent_type: String,
}

pub struct NotionTools {
    client: NotionClient,
    vault: PathBuf,
    allow_symlinks: bool,
}

impl NotionTools {
    pub const NAMESPACE: &'static str = "notion";

    pub fn module(client: NotionClient, vault: PathBuf, allow_symlinks: bool) -> CapabilityModule {
        let parent_type = || {
            ParamSpec::string("parent_type", "Whether parent_id is a page or a database")
                .default_value(json!("page"))
                .one_of(&["page", "database"])
        };

        CapabilityModule::builder(
            Self::NAMESPACE,
            Arc::new(Self {
                client,
                vault,
                allow_symlinks,
            }),
        )
        .tool(
            ToolDescriptor::new("notion_search", "Search Notion pages and databases.")
                .param(ParamSpec::string("query", "Search text").default_value(json!("")))
                .param(ParamSpec::string("filter_type", "Restrict to one kind").one_of(&["page", "database"]))
                .param(ParamSpec::integer("page_size", "Results (max 100)").default_value(json!(10))),
            |tools: Arc<Self>, args: ToolArgs| async move { tools.search(args.parse()?).await },
        )
        .tool(
            ToolDescriptor::new("notion_create_page", "Create a Notion page from markdown.")
                .param(ParamSpec::string("parent_id", "Parent page or database id").required())
                .param(ParamSpec::string("title", "Page title").required())
                .param(ParamSpec::string("content", "Markdown content").default_value(json!("")))
                .param(parent_type()),
            |tools: Arc<Self>, args: ToolArgs| async move {
                tools.create_page(args.parse()?).await
            },
        )
        .tool(
            ToolDescriptor::new(
                "notion_update_page",
                "Rename a page and append or replace its content.",
            )
            .param(ParamSpec::string("page_id", "Page id").required())
            .param(ParamSpec::string("title", "New title"))
            .param(ParamSpec::string("content", "Markdown content"))
            .param(
                ParamSpec::boolean("append", "Append content instead of replacing it")
                    .default_value(json!(true)),
            ),
            |tools: Arc<Self>, args: ToolArgs| async move {
                tools.update_page(args.parse()?).await
            },
        )
        .tool(
            ToolDescriptor::new(
                "notion_add_to_database",
                "Add an entry to a database; property values are converted using the database schema.",
            )
            .param(ParamSpec::string("database_id", "Database id").required())
            .param(ParamSpec::object("properties", "Property name to plain value").required())
            .param(ParamSpec::string("content", "Markdown body of the entry")),
            |tools: Arc<Self>, args: ToolArgs| async move {
                tools.add_to_database(args.parse()?).await
            },
        )
        .tool(
            ToolDescriptor::new("notion_list_databases", "List databases shared with the integration.")
                .param(ParamSpec::integer("page_size", "Results (max 100)").default_value(json!(20))),
            |tools: Arc<Self>, args: ToolArgs| async move {
                tools.list_databases(args.parse()?).await
            },
        )
        .tool(
            ToolDescriptor::new(
                "notion_sync_obsidian",
                "Publish an Obsidian vault note as a Notion page.",
            )
            .param(ParamSpec::string("note_path", "Note path inside the vault").required())
            .param(ParamSpec::string("parent_id", "Parent page or database id").required())
            .param(parent_type()),
            |tools: Arc<Self>, args: ToolArgs| async move { tools.sync(args.parse()?).await },
        )
        .build()
    }

    async fn search(&self, params: SearchParams) -> ToolResult {
        let results = self
            .client
            .search(&params.query, params.filter_type.as_deref(), params.page_size)
            .await?;
        let results: Vec<Value> = results.iter().map(summarize).collect();
        Ok(ToolOutput::data(json!({
            "query": params.query,
            "results": results,
            "total": results.len(),
        })))
    }

    /// Parent and title property for a new page under `parent_id`.
    async fn page_shell(
        &self,
        parent_id: &str,
        parent_type: &str,
        title: &str,
    ) -> Result<(Value, Value), ToolError> {
        if parent_type == "database" {
            let schema = self.client.database(parent_id).await?;
            let title_property = title_property(&schema)?;
            Ok((
                json!({ "database_id": parent_id }),
                json!({ title_property: { "title": rich_text(title) } }),
            ))
        } else {
            Ok((
                json!({ "page_id": parent_id }),
                json!({ "title": { "title": rich_text(title) } }),
            ))
        }
    }

    #[instrument(skip_all, fields(title = %params.title))]
    async fn create_page(&self, params: CreatePageParams) -> ToolResult {
        let (parent, properties) = self
            .page_shell(&params.parent_id, &params.parent_type, &params.title)
            .await?;
        let blocks = markdown_to_blocks(&params.content);
        let block_count = blocks.len();
        let page = self.client.create_page(parent, properties, blocks).await?;

        info!("Created Notion page '{}' with {} blocks", params.title, block_count);
        Ok(ToolOutput::with_message(
            json!({
                "id": page["id"],
                "url": page["url"],
                "title": params.title,
                "blocks": block_count,
            }),
            format!("Created page '{}'", params.title),
        ))
    }

    async fn update_page(&self, params: UpdatePageParams) -> ToolResult {
        if params.title.is_none() && params.content.is_none() {
            return Err(ToolError::invalid_arguments(
                "nothing to update: give a title, content or both",
            ));
        }

        if let Some(title) = &params.title {
            self.client
                .update_page(
                    &params.page_id,
                    json!({ "title": { "title": rich_text(title) } }),
                )
                .await?;
        }

        let mut removed = 0;
        let mut added = 0;
        if let Some(content) = &params.content {
            if !params.append {
                removed = self.client.clear_children(&params.page_id).await?;
            }
            added = self
                .client
                .append_blocks(&params.page_id, &markdown_to_blocks(content))
                .await?;
        }

        Ok(ToolOutput::with_message(
            json!({
                "page_id": params.page_id,
                "title_updated": params.title.is_some(),
                "blocks_removed": removed,
                "blocks_added": added,
            }),
            "Page updated",
        ))
    }

    async fn add_to_database(&self, params: AddToDatabaseParams) -> ToolResult {
        let schema = self.client.database(&params.database_id).await?;
        let columns = schema["properties"]
            .as_object()
            .ok_or_else(|| ToolError::upstream("Notion database has no properties"))?;

        let mut properties = Map::new();
        for (name, value) in &params.properties {
            let kind = columns
                .get(name)
                .and_then(|c| c["type"].as_str())
                .ok_or_else(|| {
                    ToolError::invalid_arguments(format!(
                        "database has no property '{}' (available: {})",
                        name,
                        columns.keys().cloned().collect::<Vec<_>>().join(", ")
                    ))
                })?;
            properties.insert(name.clone(), property_value(kind, name, value)?);
        }

        let blocks = params
            .content
            .as_deref()
            .map(markdown_to_blocks)
            .unwrap_or_default();
        let page = self
            .client
            .create_page(
                json!({ "database_id": params.database_id }),
                Value::Object(properties),
                blocks,
            )
            .await?;

        Ok(ToolOutput::with_message(
            json!({ "id": page["id"], "url": page["url"] }),
            "Entry added to database",
        ))
    }

    async fn list_databases(&self, params: ListDatabasesParams) -> ToolResult {
        let results = self
            .client
            .search("", Some("database"), params.page_size)
            .await?;
        let databases: Vec<Value> = results.iter().map(summarize).collect();
        Ok(ToolOutput::data(json!({
            "databases": databases,
            "total": databases.len(),
        })))
    }

    async fn sync(&self, params: SyncParams) -> ToolResult {
        let path = resolve_existing(&self.vault, &params.note_path, self.allow_symlinks)?;
        let text = fs::read_to_string(&path).await?;
        let (front, body) = FrontMatter::parse(&text);

        let title = front
            .as_ref()
            .map(|f| f.title.clone())
            .filter(|t| !t.is_empty())
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()))
            .unwrap_or_else(|| "Untitled".to_string());

        // The note's own top-level heading duplicates the page title.
        let body = body
            .strip_prefix(&format!("# {}", title))
            .map(|rest| rest.trim_start_matches('\n'))
            .unwrap_or(body);

        let (parent, properties) = self
            .page_shell(&params.parent_id, &params.parent_type, &title)
            .await?;
        let blocks = markdown_to_blocks(body);
        let block_count = blocks.len();
        let page = self.client.create_page(parent, properties, blocks).await?;

        info!("Synced note {} to Notion", params.note_path);
        Ok(ToolOutput::with_message(
            json!({
                "note_path": params.note_path,
                "id": page["id"],
                "url": page["url"],
                "title": title,
                "blocks": block_count,
                "tags": front.map(|f| f.tags).unwrap_or_default(),
            }),
            format!("Synced '{}' to Notion", title),
        ))
    }
}

fn title_property(schema: &Value) -> Result<String, ToolError> {
    schema["properties"]
        .as_object()
        .and_then(|props| {
            props
                .iter()
                .find(|(_, p)| p["type"] == "title")
                .map(|(name, _)| name.clone())
        })
        .ok_or_else(|| ToolError::upstream("Notion database has no title property"))
}

fn summarize(object: &Value) -> Value {
    json!({
        "id": object["id"],
        "object": object["object"],
        "title": title_of(object),
        "url": object["url"],
        "last_edited_time": object["last_edited_time"],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::routing::{get, patch, post};
    use axum::{Json, Router};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct FakeNotion {
        created: Mutex<Vec<Value>>,
        appended: Mutex<Vec<(String, usize)>>,
    }

    async fn serve() -> (String, Arc<FakeNotion>) {
        let state = Arc::new(FakeNotion::default());
        let router = Router::new()
            .route(
                "/search",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["filter"]["value"], json!("database"));
                    Json(json!({
                        "results": [{
                            "object": "database",
                            "id": "db1",
                            "url": "https://notion.so/db1",
                            "title": [{"plain_text": "Reading list"}]
                        }]
                    }))
                }),
            )
            .route(
                "/databases/{id}",
                get(|| async {
                    Json(json!({
                        "id": "db1",
                        "properties": {
                            "Name": {"type": "title"},
                            "Pages": {"type": "number"},
                            "Topics": {"type": "multi_select"},
                            "Read": {"type": "checkbox"}
                        }
                    }))
                }),
            )
            .route(
                "/pages",
                post(
                    |State(state): State<Arc<FakeNotion>>, Json(body): Json<Value>| async move {
                        state.created.lock().unwrap().push(body);
                        Json(json!({"id": "page1", "url": "https://notion.so/page1"}))
                    },
                ),
            )
            .route(
                "/blocks/{id}/children",
                patch(
                    |State(state): State<Arc<FakeNotion>>,
                     Path(id): Path<String>,
                     Json(body): Json<Value>| async move {
                        let count = body["children"].as_array().map(Vec::len).unwrap_or(0);
                        state.appended.lock().unwrap().push((id, count));
                        Json(json!({"results": []}))
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

    async fn setup() -> (TempDir, CapabilityModule, Arc<FakeNotion>) {
        let (base, state) = serve().await;
        let vault = TempDir::new().unwrap();
        let client = NotionClient::new("secret", &base, Duration::from_secs(5)).unwrap();
        let module = NotionTools::module(client, vault.path().to_path_buf(), false);
        (vault, module, state)
    }

    fn args(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_markdown_to_blocks() {
        let markdown = "# Title\n\nFirst line\nsecond line\n\n- item\n1. step\n- [x] done\n> quoted\n---\n```rust\nfn main() {}\n```";
        let blocks = markdown_to_blocks(markdown);
        let kinds: Vec<&str> = blocks.iter().map(|b| b["type"].as_str().unwrap()).collect();
        assert_eq!(
            kinds,
            vec![
                "heading_1",
                "paragraph",
                "bulleted_list_item",
                "numbered_list_item",
                "to_do",
                "quote",
                "divider",
                "code"
            ]
        );
        assert_eq!(
            blocks[1]["paragraph"]["rich_text"][0]["text"]["content"],
            json!("First line\nsecond line")
        );
        assert_eq!(blocks[4]["to_do"]["checked"], json!(true));
        assert_eq!(blocks[4]["to_do"]["rich_text"][0]["text"]["content"], json!("done"));
        assert_eq!(blocks[7]["code"]["language"], json!("rust"));
    }

    #[test]
    fn test_rich_text_chunks_long_text() {
        let text = "a".repeat(MAX_TEXT_LENGTH * 2 + 5);
        let parts = rich_text(&text);
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts[2]["text"]["content"].as_str().unwrap().len(),
            5
        );
    }

    #[test]
    fn test_property_values() {
        assert_eq!(
            property_value("number", "Pages", &json!(12)).unwrap(),
            json!({"number": 12.0})
        );
        assert_eq!(
            property_value("multi_select", "Topics", &json!("algebra, topology")).unwrap(),
            json!({"multi_select": [{"name": "algebra"}, {"name": "topology"}]})
        );
        assert!(property_value("checkbox", "Read", &json!("yes")).is_err());
        assert!(property_value("relation", "Links", &json!("x")).is_err());
    }

    #[tokio::test]
    async fn test_create_page_splits_blocks() {
        let (_vault, module, state) = setup().await;
        let content: String = (0..250).map(|i| format!("- item {}\n", i)).collect();
        let output = module
            .invoke(
                "notion_create_page",
                args(json!({"parent_id": "parent", "title": "Big", "content": content})),
            )
            .await
            .unwrap();

        let value = output.into_envelope().to_value();
        assert_eq!(value["data"]["blocks"], json!(250));
        let created = state.created.lock().unwrap();
        assert_eq!(created[0]["children"].as_array().unwrap().len(), 100);
        assert_eq!(created[0]["parent"], json!({"page_id": "parent"}));
        assert_eq!(
            *state.appended.lock().unwrap(),
            vec![("page1".to_string(), 100), ("page1".to_string(), 50)]
        );
    }

    #[tokio::test]
    async fn test_add_to_database_uses_schema() {
        let (_vault, module, state) = setup().await;
        module
            .invoke(
                "notion_add_to_database",
                args(json!({
                    "database_id": "db1",
                    "properties": {"Name": "SICP", "Pages": 657, "Read": false}
                })),
            )
            .await
            .unwrap();

        let created = state.created.lock().unwrap();
        let properties = &created[0]["properties"];
        assert_eq!(properties["Name"]["title"][0]["text"]["content"], json!("SICP"));
        assert_eq!(properties["Pages"], json!({"number": 657.0}));
        assert_eq!(properties["Read"], json!({"checkbox": false}));
    }

    #[tokio::test]
    async fn test_add_to_database_rejects_unknown_property() {
        let (_vault, module, _) = setup().await;
        let err = module
            .invoke(
                "notion_add_to_database",
                args(json!({"database_id": "db1", "properties": {"Author": "x"}})),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no property 'Author'"));
    }

    #[tokio::test]
    async fn test_list_databases() {
        let (_vault, module, _) = setup().await;
        let output = module
            .invoke("notion_list_databases", JsonObject::new())
            .await
            .unwrap();
        let value = output.into_envelope().to_value();
        assert_eq!(value["data"]["databases"][0]["title"], json!("Reading list"));
    }

    #[tokio::test]
    async fn test_sync_obsidian_note_into_database() {
        let (vault, module, state) = setup().await;
        std::fs::write(
            vault.path().join("Sheaves.md"),
            "---\ntitle: Sheaves\ntags:\n- geometry\n---\n\n# Sheaves\n\nLocal data glue.\n",
        )
        .unwrap();

        let output = module
            .invoke(
                "notion_sync_obsidian",
                args(json!({"note_path": "Sheaves.md", "parent_id": "db1", "parent_type": "database"})),
            )
            .await
            .unwrap();
        let value = output.into_envelope().to_value();
        assert_eq!(value["data"]["tags"], json!(["geometry"]));
        assert_eq!(value["data"]["blocks"], json!(1));

        let created = state.created.lock().unwrap();
        assert_eq!(
            created[0]["properties"]["Name"]["title"][0]["text"]["content"],
            json!("Sheaves")
        );
        assert_eq!(created[0]["parent"], json!({"database_id": "db1"}));
    }
}
