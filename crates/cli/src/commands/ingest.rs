//! Ingest and delete command handlers.

use clap::Args;
use docent_core::{config::AppConfig, AppError, AppResult};
use docent_knowledge::{ContentType, Document, IngestReport, KnowledgeBase};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Add or replace documents in the index
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Document id (single file only; default: path relative to the workspace)
    #[arg(long)]
    pub id: Option<String>,

    /// Content type, as a MIME type or extension (default: from the file extension)
    #[arg(long)]
    pub content_type: Option<String>,

    /// Document title
    #[arg(long)]
    pub title: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command");
        tracing::debug!("Ingest options: {:?}", self);

        let files = collect_files(&self.paths, self.content_type.is_some())?;
        if self.id.is_some() && files.len() != 1 {
            return Err(AppError::Config(format!(
                "--id needs exactly one file, found {}",
                files.len()
            )));
        }
        if files.is_empty() {
            tracing::warn!("No supported files found");
        }

        let knowledge = KnowledgeBase::open(config).await?;

        let mut reports: Vec<IngestReport> = Vec::new();
        let mut failed: Vec<(PathBuf, AppError)> = Vec::new();

        for path in files {
            let id = match self.id {
                Some(ref id) => id.clone(),
                None => document_id_for(&path, &config.workspace),
            };

            match self.ingest_file(&knowledge, &path, id).await {
                Ok(report) => {
                    if !self.json {
                        println!(
                            "Indexed {}: {} chunk(s){}",
                            report.document_id,
                            report.chunks_indexed,
                            if report.chunks_replaced > 0 {
                                format!(", replaced {}", report.chunks_replaced)
                            } else {
                                String::new()
                            }
                        );
                    }
                    reports.push(report);
                }
                Err(e) if is_systemic(&e) => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    failed.push((path, e));
                }
            }
        }

        if self.json {
            let output = serde_json::json!({
                "indexed": reports,
                "failed": failed
                    .iter()
                    .map(|(path, e)| serde_json::json!({
                        "path": path.display().to_string(),
                        "kind": e.kind(),
                        "error": e.to_string(),
                    }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else if !failed.is_empty() {
            println!("Skipped {} file(s):", failed.len());
            for (path, e) in &failed {
                println!("- {}: {}", path.display(), e);
            }
        }

        Ok(())
    }

    async fn ingest_file(
        &self,
        knowledge: &KnowledgeBase,
        path: &Path,
        id: String,
    ) -> AppResult<IngestReport> {
        let content_type = match self.content_type {
            Some(ref ct) => ct.clone(),
            None => ContentType::from_path(path)
                .map(|ct| ct.as_str().to_string())
                .ok_or_else(|| {
                    AppError::InvalidDocument(format!(
                        "Cannot infer content type of {}",
                        path.display()
                    ))
                })?,
        };

        let bytes = tokio::fs::read(path).await?;
        let document = Document::extract(id, bytes, content_type, self.title.clone()).await?;
        knowledge.ingestor.ingest(&document).await
    }
}

/// Remove a document from the index
#[derive(Args, Debug)]
pub struct DeleteCommand {
    /// Document id to remove
    pub document_id: String,
}

impl DeleteCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing delete command for '{}'", self.document_id);

        let knowledge = KnowledgeBase::open(config).await?;
        let removed = knowledge.ingestor.remove(&self.document_id).await?;

        if removed == 0 {
            println!("No document '{}' in the index", self.document_id);
        } else {
            println!("Removed {} ({} chunk(s))", self.document_id, removed);
        }

        Ok(())
    }
}

/// Expand `paths` into files, walking directories.
///
/// Explicit files are always kept. Inside directories, hidden entries are
/// skipped, as are files without a recognized extension unless the content
/// type was given on the command line.
fn collect_files(paths: &[PathBuf], content_type_given: bool) -> AppResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            return Err(AppError::Config(format!(
                "Path does not exist: {}",
                path.display()
            )));
        }

        let walker = WalkDir::new(path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if !content_type_given && ContentType::from_path(entry.path()).is_none() {
                tracing::debug!("Skipping unsupported file {}", entry.path().display());
                continue;
            }
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

/// Default document id: the path relative to the workspace, `/`-separated.
fn document_id_for(path: &Path, workspace: &Path) -> String {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let workspace = std::fs::canonicalize(workspace).unwrap_or_else(|_| workspace.to_path_buf());
    let relative = absolute.strip_prefix(&workspace).unwrap_or(path);

    relative.to_string_lossy().replace('\\', "/")
}

/// Failures that concern the whole run rather than one file.
fn is_systemic(error: &AppError) -> bool {
    !matches!(error, AppError::InvalidDocument(_) | AppError::Io(_))
}
