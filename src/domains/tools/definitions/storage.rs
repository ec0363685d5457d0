//! Storage tools.
//!
//! File operations on the locally synced storage folder. Every path a caller
//! passes is relative to the storage root and confined to it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::core::config::Config;
use crate::core::security::{display_relative, is_confined, resolve_existing, resolve_in_root};
use crate::domains::tools::{
    CapabilityModule, ParamSpec, ToolArgs, ToolDescriptor, ToolError, ToolOutput, ToolResult,
};

/// Hard cap on search results regardless of what the caller asks for.
const MAX_SEARCH_RESULTS: usize = 500;

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    path: String,
    file_type: Option<String>,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct PathParams {
    path: String,
}

#[derive(Debug, Deserialize)]
struct SaveParams {
    path: String,
    content: String,
    overwrite: bool,
}

#[derive(Debug, Deserialize)]
struct TransferParams {
    source: String,
    destination: String,
    overwrite: bool,
}

#[derive(Debug, Deserialize)]
struct DeleteParams {
    path: String,
    recursive: bool,
}

// ============================================================================
// Structured output
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

// ============================================================================
// Tool Definition
// ============================================================================

/// Shared state of the storage tools.
#[derive(Debug, Clone)]
pub struct StorageTools {
    root: PathBuf,
    max_file_size: u64,
    allow_symlinks: bool,
}

impl StorageTools {
    pub const NAMESPACE: &'static str = "storage";

    pub fn new(config: &Config) -> Self {
        Self {
            root: config.paths.storage_base.clone(),
            max_file_size: config.settings.max_file_size,
            allow_symlinks: config.security.allow_symlinks,
        }
    }

    /// Build the capability module.
    pub fn module(config: &Config) -> CapabilityModule {
        CapabilityModule::builder(Self::NAMESPACE, Arc::new(Self::new(config)))
            .tool(
                ToolDescriptor::new(
                    "search_dropbox",
                    "Search the storage folder for files whose name contains the query.",
                )
                .param(ParamSpec::string("query", "Text to look for in file names").required())
                .param(
                    ParamSpec::string("path", "Folder to search in, relative to the storage root")
                        .default_value(json!("")),
                )
                .param(ParamSpec::string(
                    "file_type",
                    "Only return files with this extension (e.g. 'pdf')",
                ))
                .param(
                    ParamSpec::integer("max_results", "Maximum number of results")
                        .default_value(json!(20)),
                ),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.search(args.parse()?).await },
            )
            .tool(
                ToolDescriptor::new(
                    "list_dropbox_folder",
                    "List the files and folders in a storage folder.",
                )
                .param(
                    ParamSpec::string("path", "Folder path, relative to the storage root")
                        .default_value(json!("")),
                ),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.list(args.parse()?).await },
            )
            .tool(
                ToolDescriptor::new("read_dropbox_file", "Read a text file from storage.")
                    .param(ParamSpec::string("path", "File path").required()),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.read(args.parse()?).await },
            )
            .tool(
                ToolDescriptor::new("save_to_dropbox", "Save text content to a file in storage.")
                    .param(ParamSpec::string("path", "Destination file path").required())
                    .param(ParamSpec::string("content", "File content").required())
                    .param(
                        ParamSpec::boolean("overwrite", "Replace an existing file")
                            .default_value(json!(false)),
                    ),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.save(args.parse()?).await },
            )
            .tool(
                transfer_descriptor("copy_file", "Copy a file within storage."),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.transfer(args.parse()?, Transfer::Copy).await
                },
            )
            .tool(
                transfer_descriptor("move_file", "Move or rename a file or folder within storage."),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.transfer(args.parse()?, Transfer::Move).await
                },
            )
            .tool(
                ToolDescriptor::new("delete_file", "Delete a file or folder from storage.")
                    .param(ParamSpec::string("path", "Path to delete").required())
                    .param(
                        ParamSpec::boolean("recursive", "Delete non-empty folders")
                            .default_value(json!(false)),
                    ),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.delete(args.parse()?).await },
            )
            .tool(
                ToolDescriptor::new("create_folder", "Create a folder (and parents) in storage.")
                    .param(ParamSpec::string("path", "Folder path").required()),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.create_folder(args.parse()?).await
                },
            )
            .build()
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        Ok(resolve_in_root(&self.root, path, self.allow_symlinks)?)
    }

    fn resolve_existing(&self, path: &str) -> Result<PathBuf, ToolError> {
        Ok(resolve_existing(&self.root, path, self.allow_symlinks)?)
    }

    fn relative(&self, path: &Path) -> String {
        display_relative(&self.root, path)
    }

    #[instrument(skip_all, fields(query = %params.query))]
    async fn search(&self, params: SearchParams) -> ToolResult {
        let base = self.resolve_existing(&params.path)?;
        let pattern = format!(
            "{}/**/*",
            glob::Pattern::escape(&base.to_string_lossy())
        );
        let query = params.query.to_lowercase();
        let extension = params
            .file_type
            .map(|ext| ext.trim_start_matches('.').to_lowercase());
        let limit = params.max_results.clamp(1, MAX_SEARCH_RESULTS);
        // The walk follows symlinked folders; hits that land outside the root
        // are dropped unless symlinks are allowed.
        let confine_to = (!self.allow_symlinks)
            .then(|| self.root.canonicalize())
            .transpose()?;

        let matches = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>, ToolError> {
            let paths = glob::glob(&pattern)
                .map_err(|e| ToolError::upstream(format!("Invalid search pattern: {}", e)))?;

            Ok(paths
                .filter_map(|entry| entry.ok())
                .filter(|path| path.is_file())
                .filter(|path| match &confine_to {
                    Some(root) => path.canonicalize().is_ok_and(|p| p.starts_with(root)),
                    None => true,
                })
                .filter(|path| {
                    path.file_name()
                        .map(|name| name.to_string_lossy().to_lowercase().contains(&query))
                        .unwrap_or(false)
                })
                .filter(|path| match &extension {
                    Some(ext) => path
                        .extension()
                        .map(|e| e.to_string_lossy().to_lowercase() == *ext)
                        .unwrap_or(false),
                    None => true,
                })
                .take(limit)
                .collect())
        })
        .await
        .map_err(|e| ToolError::upstream(format!("Search task failed: {}", e)))??;

        let mut results = Vec::with_capacity(matches.len());
        for path in matches {
            if let Some(info) = self.entry_info(&path).await {
                results.push(info);
            }
        }

        info!("Search matched {} files", results.len());
        Ok(ToolOutput::data(json!({
            "query": params.query,
            "results": results,
            "total": results.len(),
        })))
    }

    async fn list(&self, params: PathParams) -> ToolResult {
        let dir = self.resolve_existing(&params.path)?;
        if !dir.is_dir() {
            return Err(ToolError::invalid_arguments(format!(
                "Path is not a folder: {}",
                params.path
            )));
        }

        let mut reader = fs::read_dir(&dir).await?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            if let Some(info) = self.entry_info(&entry.path()).await {
                entries.push(info);
            }
        }
        entries.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));

        Ok(ToolOutput::data(json!({
            "path": self.relative(&dir),
            "entries": entries,
            "total": entries.len(),
        })))
    }

    async fn read(&self, params: PathParams) -> ToolResult {
        let path = self.resolve_existing(&params.path)?;
        let metadata = fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(ToolError::invalid_arguments(format!(
                "Path is not a file: {}",
                params.path
            )));
        }
        if metadata.len() > self.max_file_size {
            return Err(ToolError::upstream(format!(
                "File is {} bytes, larger than the {} byte limit",
                metadata.len(),
                self.max_file_size
            )));
        }

        let bytes = fs::read(&path).await?;
        let content = String::from_utf8(bytes).map_err(|_| {
            ToolError::upstream(format!("File is not valid UTF-8 text: {}", params.path))
        })?;

        Ok(ToolOutput::data(json!({
            "path": self.relative(&path),
            "size": metadata.len(),
            "content": content,
        })))
    }

    async fn save(&self, params: SaveParams) -> ToolResult {
        let path = self.resolve(&params.path)?;
        if path == self.root || params.path.ends_with('/') {
            return Err(ToolError::invalid_arguments("A file name is required"));
        }
        if fs::try_exists(&path).await? && !params.overwrite {
            return Err(ToolError::invalid_arguments(format!(
                "File already exists: {} (set overwrite to replace it)",
                params.path
            )));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, params.content.as_bytes()).await?;

        let relative = self.relative(&path);
        info!("Saved {} bytes to {}", params.content.len(), relative);
        Ok(ToolOutput::with_message(
            json!({ "path": &relative, "size": params.content.len() }),
            format!("Saved {}", relative),
        ))
    }

    async fn transfer(&self, params: TransferParams, mode: Transfer) -> ToolResult {
        let source = self.resolve_existing(&params.source)?;
        let destination = self.resolve(&params.destination)?;

        if source == self.root || destination == self.root {
            return Err(ToolError::invalid_arguments(
                "The storage root itself cannot be copied, moved or replaced",
            ));
        }
        if mode == Transfer::Copy && !source.is_file() {
            return Err(ToolError::invalid_arguments(format!(
                "Only files can be copied: {}",
                params.source
            )));
        }
        if fs::try_exists(&destination).await? && !params.overwrite {
            return Err(ToolError::invalid_arguments(format!(
                "Destination already exists: {} (set overwrite to replace it)",
                params.destination
            )));
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        match mode {
            Transfer::Copy => {
                fs::copy(&source, &destination).await?;
            }
            Transfer::Move => fs::rename(&source, &destination).await?,
        }

        let (from, to) = (self.relative(&source), self.relative(&destination));
        info!("{} {} -> {}", mode.verb(), from, to);
        Ok(ToolOutput::with_message(
            json!({ "source": &from, "destination": &to }),
            format!("{} {} to {}", mode.verb(), from, to),
        ))
    }

    async fn delete(&self, params: DeleteParams) -> ToolResult {
        let path = self.resolve_existing(&params.path)?;
        if path == self.root {
            return Err(ToolError::invalid_arguments("The storage root cannot be deleted"));
        }

        let metadata = fs::symlink_metadata(&path).await?;
        if metadata.is_dir() {
            if params.recursive {
                fs::remove_dir_all(&path).await?;
            } else {
                fs::remove_dir(&path).await.map_err(|e| {
                    ToolError::upstream(format!(
                        "Cannot delete folder {}: {} (set recursive to delete its contents)",
                        params.path, e
                    ))
                })?;
            }
        } else {
            fs::remove_file(&path).await?;
        }

        let relative = self.relative(&path);
        info!("Deleted {}", relative);
        Ok(ToolOutput::with_message(
            json!({ "path": &relative, "deleted": true }),
            format!("Deleted {}", relative),
        ))
    }

    async fn create_folder(&self, params: PathParams) -> ToolResult {
        let path = self.resolve(&params.path)?;
        let existed = fs::try_exists(&path).await?;
        if existed && !path.is_dir() {
            return Err(ToolError::invalid_arguments(format!(
                "A file already exists at {}",
                params.path
            )));
        }
        fs::create_dir_all(&path).await?;

        Ok(ToolOutput::data(json!({
            "path": self.relative(&path),
            "created": !existed,
        })))
    }

    /// Describe one entry, or `None` when it is not shown: dangling links,
    /// unreadable entries and links that leave the root while symlinks are
    /// disallowed.
    async fn entry_info(&self, path: &Path) -> Option<EntryInfo> {
        let link = match fs::symlink_metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                return None;
            }
        };
        let metadata = if link.file_type().is_symlink() {
            if !self.allow_symlinks && !is_confined(&self.root, path) {
                debug!("Skipping symlink {} (target outside root)", path.display());
                return None;
            }
            match fs::metadata(path).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping dangling symlink {}: {}", path.display(), e);
                    return None;
                }
            }
        } else {
            link
        };

        Some(EntryInfo {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            path: self.relative(path),
            kind: if metadata.is_dir() { "folder" } else { "file" },
            size: if metadata.is_file() { metadata.len() } else { 0 },
            modified: metadata.modified().ok().map(format_time),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Copy,
    Move,
}

impl Transfer {
    fn verb(&self) -> &'static str {
        match self {
            Self::Copy => "Copied",
            Self::Move => "Moved",
        }
    }
}

fn transfer_descriptor(name: &str, description: &str) -> ToolDescriptor {
    ToolDescriptor::new(name, description)
        .param(ParamSpec::string("source", "Source path").required())
        .param(ParamSpec::string("destination", "Destination path").required())
        .param(
            ParamSpec::boolean("overwrite", "Replace an existing destination")
                .default_value(json!(false)),
        )
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::{JsonObject, ResponseEnvelope};
    use serde_json::Value;
    use std::fs as std_fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, CapabilityModule) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std_fs::create_dir_all(root.join("Inbox/papers")).unwrap();
        std_fs::write(root.join("Inbox/a.txt"), "alpha").unwrap();
        std_fs::write(root.join("Inbox/b.txt"), "beta").unwrap();
        std_fs::write(root.join("Inbox/papers/Fourier notes.pdf"), "%PDF").unwrap();
        std_fs::write(root.join("Inbox/papers/fourier.md"), "# Fourier").unwrap();

        let config = Config::with_base_path(root);
        (temp_dir, StorageTools::module(&config))
    }

    fn args(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    async fn call(module: &CapabilityModule, name: &str, value: Value) -> ResponseEnvelope {
        match module.invoke(name, args(value)).await {
            Ok(output) => output.into_envelope(),
            Err(e) => ResponseEnvelope::failure(name, e.to_string()),
        }
    }

    fn data(envelope: ResponseEnvelope) -> Value {
        match envelope {
            ResponseEnvelope::Success { data, .. } => data,
            ResponseEnvelope::Error { error, .. } => panic!("unexpected error: {}", error),
        }
    }

    #[test]
    fn test_module_tools() {
        let (_dir, module) = setup();
        assert_eq!(
            module.tool_names(),
            vec![
                "search_dropbox",
                "list_dropbox_folder",
                "read_dropbox_file",
                "save_to_dropbox",
                "copy_file",
                "move_file",
                "delete_file",
                "create_folder"
            ]
        );
    }

    #[tokio::test]
    async fn test_list_folder() {
        let (_dir, module) = setup();
        let listing = data(call(&module, "list_dropbox_folder", json!({"path": "/Inbox"})).await);
        let names: Vec<_> = listing["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "papers"]);
        assert_eq!(listing["entries"][2]["type"], json!("folder"));
        assert_eq!(listing["path"], json!("Inbox"));
    }

    #[tokio::test]
    async fn test_search_by_name_and_type() {
        let (_dir, module) = setup();
        let found = data(call(&module, "search_dropbox", json!({"query": "FOURIER"})).await);
        assert_eq!(found["total"], json!(2));

        let found = data(
            call(
                &module,
                "search_dropbox",
                json!({"query": "fourier", "file_type": ".pdf"}),
            )
            .await,
        );
        assert_eq!(found["total"], json!(1));
        assert_eq!(
            found["results"][0]["path"],
            json!("Inbox/papers/Fourier notes.pdf")
        );
    }

    #[tokio::test]
    async fn test_read_and_size_limit() {
        let (dir, _) = setup();
        let mut config = Config::with_base_path(dir.path());
        config.settings.max_file_size = 4;
        let module = StorageTools::module(&config);

        let envelope = call(&module, "read_dropbox_file", json!({"path": "Inbox/b.txt"})).await;
        assert_eq!(data(envelope)["content"], json!("beta"));

        let envelope = call(&module, "read_dropbox_file", json!({"path": "Inbox/a.txt"})).await;
        assert!(envelope.error_message().unwrap().contains("byte limit"));
    }

    #[tokio::test]
    async fn test_save_respects_overwrite() {
        let (dir, module) = setup();
        let envelope = call(
            &module,
            "save_to_dropbox",
            json!({"path": "Drafts/new.md", "content": "hello"}),
        )
        .await;
        assert!(envelope.is_success());
        assert_eq!(
            std_fs::read_to_string(dir.path().join("Drafts/new.md")).unwrap(),
            "hello"
        );

        let envelope = call(
            &module,
            "save_to_dropbox",
            json!({"path": "Drafts/new.md", "content": "again"}),
        )
        .await;
        assert!(envelope.error_message().unwrap().contains("already exists"));

        let envelope = call(
            &module,
            "save_to_dropbox",
            json!({"path": "Drafts/new.md", "content": "again", "overwrite": true}),
        )
        .await;
        assert!(envelope.is_success());
    }

    #[tokio::test]
    async fn test_copy_move_delete() {
        let (dir, module) = setup();
        let root = dir.path();

        let envelope = call(
            &module,
            "copy_file",
            json!({"source": "Inbox/a.txt", "destination": "Archive/a.txt"}),
        )
        .await;
        assert!(envelope.is_success());
        assert!(root.join("Inbox/a.txt").exists());
        assert!(root.join("Archive/a.txt").exists());

        let envelope = call(
            &module,
            "move_file",
            json!({"source": "Inbox/b.txt", "destination": "Archive/b.txt"}),
        )
        .await;
        assert!(envelope.is_success());
        assert!(!root.join("Inbox/b.txt").exists());

        let envelope = call(&module, "delete_file", json!({"path": "Archive"})).await;
        assert!(envelope.error_message().unwrap().contains("recursive"));

        let envelope = call(
            &module,
            "delete_file",
            json!({"path": "Archive", "recursive": true}),
        )
        .await;
        assert!(envelope.is_success());
        assert!(!root.join("Archive").exists());
    }

    #[tokio::test]
    async fn test_create_folder_is_idempotent() {
        let (_dir, module) = setup();
        let first = data(call(&module, "create_folder", json!({"path": "Projects/New"})).await);
        assert_eq!(first["created"], json!(true));
        let second = data(call(&module, "create_folder", json!({"path": "Projects/New"})).await);
        assert_eq!(second["created"], json!(false));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_search_skips_files_behind_outward_symlink() {
        use std::os::unix::fs::symlink;

        let (dir, module) = setup();
        let outside = TempDir::new().unwrap();
        std_fs::write(outside.path().join("secret_payroll.txt"), "$").unwrap();
        std_fs::write(dir.path().join("Inbox/secret_plan.txt"), "plan").unwrap();
        symlink(outside.path(), dir.path().join("out")).unwrap();

        let found = data(call(&module, "search_dropbox", json!({"query": "secret"})).await);
        assert_eq!(found["total"], json!(1));
        assert_eq!(found["results"][0]["path"], json!("Inbox/secret_plan.txt"));

        let listing = data(call(&module, "list_dropbox_folder", json!({})).await);
        assert!(
            listing["entries"]
                .as_array()
                .unwrap()
                .iter()
                .all(|e| e["name"] != json!("out"))
        );

        // Opting in to symlinks makes the linked folder searchable.
        let mut config = Config::with_base_path(dir.path());
        config.security.allow_symlinks = true;
        let module = StorageTools::module(&config);
        let found = data(call(&module, "search_dropbox", json!({"query": "secret"})).await);
        assert_eq!(found["total"], json!(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_skips_dangling_symlink() {
        use std::os::unix::fs::symlink;

        let (dir, module) = setup();
        symlink("/nonexistent/target", dir.path().join("Inbox/broken")).unwrap();
        symlink(
            dir.path().join("Inbox/a.txt"),
            dir.path().join("Inbox/alias.txt"),
        )
        .unwrap();

        let listing = data(call(&module, "list_dropbox_folder", json!({"path": "Inbox"})).await);
        let names: Vec<_> = listing["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "alias.txt", "b.txt", "papers"]);
        assert_eq!(listing["entries"][1]["size"], json!(5));
    }

    #[tokio::test]
    async fn test_paths_cannot_escape_root() {
        let (_dir, module) = setup();
        let envelope = call(
            &module,
            "read_dropbox_file",
            json!({"path": "../../etc/passwd"}),
        )
        .await;
        assert!(envelope.error_message().unwrap().contains("outside allowed root"));

        let envelope = call(&module, "delete_file", json!({"path": "/"})).await;
        assert!(envelope.error_message().unwrap().contains("cannot be deleted"));
    }
}
