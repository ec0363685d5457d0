//! Knowledge tools over the Obsidian vault.
//!
//! Notes are markdown files with YAML front matter. The index tool reads the
//! front matter back to group notes by tag.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::fs;
use tracing::{debug, info};

use super::common::{now_rfc3339, safe_filename};
use crate::core::config::Config;
use crate::core::security::{display_relative, resolve_existing, resolve_in_root};
use crate::domains::tools::{
    CapabilityModule, ParamSpec, ToolArgs, ToolDescriptor, ToolError, ToolOutput, ToolResult,
};

/// YAML front matter written at the top of every ingested note.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrontMatter {
    pub title: String,
    #[serde(default)]
    pub created: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl FrontMatter {
    /// Split a note into its front matter and body.
    ///
    /// Notes without (or with unparseable) front matter yield `None` and the
    /// full text as body.
    pub fn parse(note: &str) -> (Option<Self>, &str) {
        let Some(rest) = note.strip_prefix("---\n") else {
            return (None, note);
        };
        let Some(end) = rest.find("\n---") else {
            return (None, note);
        };
        let body = rest[end + 4..].trim_start_matches('\n');
        match serde_yaml::from_str::<Self>(&rest[..end]) {
            Ok(front) => (Some(front), body),
            Err(e) => {
                debug!("Ignoring unparseable front matter: {}", e);
                (None, note)
            }
        }
    }

    fn render(&self) -> Result<String, ToolError> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| ToolError::upstream(format!("Failed to encode front matter: {}", e)))?;
        Ok(format!("---\n{}---\n", yaml))
    }
}

#[derive(Debug, Deserialize)]
struct IngestParams {
    title: String,
    content: String,
    folder: String,
    tags: Option<Vec<String>>,
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SyncParams {
    note_path: String,
    destination: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexParams {
    folder: Option<String>,
    index_name: String,
}

#[derive(Debug, Clone)]
pub struct KnowledgeTools {
    vault: PathBuf,
    storage_root: PathBuf,
    knowledge_dir: PathBuf,
    allow_symlinks: bool,
}

impl KnowledgeTools {
    pub const NAMESPACE: &'static str = "knowledge";

    pub fn new(config: &Config) -> Self {
        Self {
            vault: config.paths.vault.clone(),
            storage_root: config.paths.storage_base.clone(),
            knowledge_dir: config.paths.knowledge.clone(),
            allow_symlinks: config.security.allow_symlinks,
        }
    }

    pub fn module(config: &Config) -> CapabilityModule {
        CapabilityModule::builder(Self::NAMESPACE, Arc::new(Self::new(config)))
            .tool(
                ToolDescriptor::new(
                    "ingest_to_obsidian",
                    "Create a note in the Obsidian vault with YAML front matter.",
                )
                .param(ParamSpec::string("title", "Note title").required())
                .param(ParamSpec::string("content", "Markdown content").required())
                .param(
                    ParamSpec::string("folder", "Vault folder").default_value(json!("Inbox")),
                )
                .param(ParamSpec::string_list("tags", "Tags for the note"))
                .param(ParamSpec::string("source", "Where the content came from")),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.ingest(args.parse()?).await },
            )
            .tool(
                ToolDescriptor::new(
                    "sync_to_dropbox",
                    "Copy a vault note into the storage folder.",
                )
                .param(ParamSpec::string("note_path", "Note path inside the vault").required())
                .param(ParamSpec::string(
                    "destination",
                    "Storage folder to copy into (the knowledge folder if omitted)",
                )),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.sync(args.parse()?).await },
            )
            .tool(
                ToolDescriptor::new(
                    "create_smart_index",
                    "Write an index note linking every note of a vault folder, grouped by folder and tag.",
                )
                .param(ParamSpec::string("folder", "Vault folder to index (whole vault if omitted)"))
                .param(
                    ParamSpec::string("index_name", "Name of the index note")
                        .default_value(json!("Index")),
                ),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.index(args.parse()?).await },
            )
            .build()
    }

    fn in_vault(&self, path: &str) -> Result<PathBuf, ToolError> {
        Ok(resolve_in_root(&self.vault, path, self.allow_symlinks)?)
    }

    async fn ingest(&self, params: IngestParams) -> ToolResult {
        if params.title.trim().is_empty() {
            return Err(ToolError::invalid_arguments("title must not be empty"));
        }

        let folder = self.in_vault(&params.folder)?;
        fs::create_dir_all(&folder).await?;
        let path = unused_note_path(&folder, &safe_filename(&params.title)).await?;

        let front = FrontMatter {
            title: params.title.clone(),
            created: now_rfc3339(),
            tags: params.tags.unwrap_or_default(),
            source: params.source,
        };
        let note = format!(
            "{}\n# {}\n\n{}\n",
            front.render()?,
            params.title,
            params.content.trim_end()
        );
        fs::write(&path, note).await?;

        let relative = display_relative(&self.vault, &path);
        info!("Ingested note {}", relative);
        Ok(ToolOutput::with_message(
            json!({ "path": relative, "title": params.title, "tags": front.tags }),
            format!("Note '{}' added to the vault", params.title),
        ))
    }

    async fn sync(&self, params: SyncParams) -> ToolResult {
        let note = resolve_existing(&self.vault, &params.note_path, self.allow_symlinks)?;
        if !note.is_file() {
            return Err(ToolError::invalid_arguments(format!(
                "Not a note file: {}",
                params.note_path
            )));
        }
        let file_name = note
            .file_name()
            .ok_or_else(|| ToolError::invalid_arguments("Note path has no file name"))?;

        let target_dir = match &params.destination {
            Some(destination) => {
                resolve_in_root(&self.storage_root, destination, self.allow_symlinks)?
            }
            None => self.knowledge_dir.clone(),
        };
        fs::create_dir_all(&target_dir).await?;
        let target = target_dir.join(file_name);
        let bytes = fs::copy(&note, &target).await?;

        let destination = display_relative(&self.storage_root, &target);
        info!("Synced {} to {}", params.note_path, destination);
        Ok(ToolOutput::with_message(
            json!({
                "note_path": display_relative(&self.vault, &note),
                "destination": destination,
                "size": bytes,
            }),
            format!("Synced to {}", destination),
        ))
    }

    async fn index(&self, params: IndexParams) -> ToolResult {
        let folder = match &params.folder {
            Some(folder) => resolve_existing(&self.vault, folder, self.allow_symlinks)?,
            None => self.vault.clone(),
        };
        if !folder.is_dir() {
            return Err(ToolError::invalid_arguments("folder must be a vault folder"));
        }
        let index_file = format!("{}.md", safe_filename(&params.index_name));
        let index_path = folder.join(&index_file);

        let pattern = format!("{}/**/*.md", glob::Pattern::escape(&folder.to_string_lossy()));
        let notes: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| ToolError::upstream(format!("Invalid index pattern: {}", e)))?
            .filter_map(|entry| entry.ok())
            .filter(|path| path != &index_path)
            .collect();

        let mut by_folder: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut by_tag: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for note in &notes {
            let relative = display_relative(&self.vault, note);
            let link = relative.trim_end_matches(".md").to_string();
            let group = Path::new(&relative)
                .parent()
                .map(|p| p.to_string_lossy().to_string())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| "(root)".to_string());
            by_folder.entry(group).or_default().push(link.clone());

            let text = fs::read_to_string(note).await.unwrap_or_default();
            if let (Some(front), _) = FrontMatter::parse(&text) {
                for tag in front.tags {
                    by_tag.entry(tag).or_default().push(link.clone());
                }
            }
        }

        let mut index = FrontMatter {
            title: params.index_name.clone(),
            created: now_rfc3339(),
            tags: vec!["index".to_string()],
            source: None,
        }
        .render()?;
        index.push_str(&format!("\n# {}\n\n{} notes\n", params.index_name, notes.len()));
        for (group, links) in &by_folder {
            index.push_str(&format!("\n## {}\n\n", group));
            for link in links {
                index.push_str(&format!("- [[{}]]\n", link));
            }
        }
        if !by_tag.is_empty() {
            index.push_str("\n## Tags\n");
            for (tag, links) in &by_tag {
                index.push_str(&format!("\n### #{}\n\n", tag));
                for link in links {
                    index.push_str(&format!("- [[{}]]\n", link));
                }
            }
        }
        fs::write(&index_path, index).await?;

        let relative = display_relative(&self.vault, &index_path);
        info!("Indexed {} notes into {}", notes.len(), relative);
        Ok(ToolOutput::with_message(
            json!({
                "index_path": relative,
                "notes": notes.len(),
                "folders": by_folder.len(),
                "tags": by_tag.keys().collect::<Vec<_>>(),
            }),
            format!("Indexed {} notes", notes.len()),
        ))
    }
}

/// `<name>.md`, or `<name> (2).md` and so on if that note already exists.
async fn unused_note_path(folder: &Path, name: &str) -> Result<PathBuf, ToolError> {
    let mut candidate = folder.join(format!("{}.md", name));
    let mut n = 2;
    while fs::try_exists(&candidate).await? {
        candidate = folder.join(format!("{} ({}).md", name, n));
        n += 1;
    }
    Ok(candidate)
}
