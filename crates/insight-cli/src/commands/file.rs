//! File commands - Upload, List, Download and Delete
//!
//! `upload` walks each path with the tree synchronizer. Re-running an upload
//! is cheap: entries that already exist remotely are skipped.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use insight_core::config::FailurePolicy;
use insight_core::domain::{Inode, InodeId};
use insight_core::ports::IInodeDirectory;
use insight_sync::{SyncOptions, SyncReport, TreeDownloader, TreeSynchronizer};
use tracing::info;

use super::CliContext;
use crate::output::OutputFormatter;

#[derive(Debug, Subcommand)]
pub enum FileCommand {
    /// Upload files and directories
    Upload {
        /// Local files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Make uploaded inodes public
        #[arg(long)]
        public: bool,
        /// Log failed entries and continue with the rest
        #[arg(long)]
        keep_going: bool,
        /// Upload again files whose earlier upload never completed
        #[arg(long)]
        resume_pending: bool,
        /// Parent folder ID (default: root)
        #[arg(long)]
        parent: Option<String>,
    },
    /// List the children of a folder
    List {
        /// Folder ID (default: root)
        #[arg(long)]
        parent: Option<String>,
    },
    /// Download a file or folder
    Download {
        /// Inode ID
        id: String,
        /// Destination directory
        #[arg(long, default_value = ".")]
        dest: PathBuf,
    },
    /// Delete an inode
    Delete {
        /// Inode ID
        id: String,
    },
}

impl FileCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            FileCommand::Upload {
                paths,
                public,
                keep_going,
                resume_pending,
                parent,
            } => {
                let flags = UploadFlags {
                    public: *public,
                    keep_going: *keep_going,
                    resume_pending: *resume_pending,
                };
                execute_upload(ctx, paths, flags, parent.as_deref()).await
            }
            FileCommand::List { parent } => execute_list(ctx, parent.as_deref()).await,
            FileCommand::Download { id, dest } => execute_download(ctx, id, dest).await,
            FileCommand::Delete { id } => execute_delete(ctx, id).await,
        }
    }
}

fn parse_id(id: &str) -> Result<InodeId> {
    InodeId::new(id).with_context(|| format!("Invalid inode ID '{id}'"))
}

#[derive(Debug, Clone, Copy)]
struct UploadFlags {
    public: bool,
    keep_going: bool,
    resume_pending: bool,
}

/// Command-line flags override the configured sync behavior
fn upload_options(base: SyncOptions, flags: UploadFlags) -> SyncOptions {
    SyncOptions {
        failure_policy: if flags.keep_going {
            FailurePolicy::Continue
        } else {
            base.failure_policy
        },
        resume_pending_uploads: flags.resume_pending || base.resume_pending_uploads,
        ..base.public(flags.public)
    }
}

fn print_report(fmt: &dyn OutputFormatter, report: &SyncReport) {
    fmt.field(
        "Folders",
        &format!("{} created, {} existing", report.folders_created, report.folders_reused),
    );
    fmt.field(
        "Files",
        &format!(
            "{} uploaded, {} resumed, {} already present",
            report.files_uploaded, report.files_resumed, report.files_skipped
        ),
    );
    fmt.field("Bytes", &report.bytes_uploaded.to_string());
    for failure in &report.failures {
        fmt.warn(&format!("{}: {}", failure.path.display(), failure.error));
    }
}

async fn execute_upload(
    ctx: &CliContext,
    paths: &[PathBuf],
    flags: UploadFlags,
    parent: Option<&str>,
) -> Result<()> {
    let fmt = ctx.formatter();
    let config = ctx.config()?;
    let services = super::Services::from_config(&config)?;
    let parent = parent.map(parse_id).transpose()?;

    let options = upload_options(SyncOptions::from_config(&config.sync), flags);
    let synchronizer =
        TreeSynchronizer::new(services.directory.clone(), services.storage.clone(), options);

    let mut total = SyncReport::default();
    for path in paths {
        info!(path = %path.display(), "Uploading");
        let report = match synchronizer.sync(path, parent.as_ref()).await {
            Ok(report) => report,
            Err(e) if options.failure_policy == FailurePolicy::Continue => {
                fmt.warn(&format!("{}: {e}", path.display()));
                total.failures.push(insight_sync::SyncFailure {
                    path: path.clone(),
                    error: e.to_string(),
                });
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Upload of {} failed", path.display()))
            }
        };
        total.merge(report);
    }

    if ctx.format.is_json() {
        fmt.print_json(&serde_json::to_value(&total).context("Failed to serialize report")?);
    } else {
        fmt.success(&format!("Uploaded {} path(s)", paths.len()));
        print_report(&*fmt, &total);
    }

    if total.is_clean() {
        Ok(())
    } else {
        anyhow::bail!("{} entries failed to upload", total.failures.len())
    }
}

fn inode_json(inode: &Inode) -> serde_json::Value {
    serde_json::to_value(inode).unwrap_or(serde_json::Value::Null)
}

async fn execute_list(ctx: &CliContext, parent: Option<&str>) -> Result<()> {
    let fmt = ctx.formatter();
    let services = ctx.connect()?;
    let parent = parent.map(parse_id).transpose()?;

    let children = services
        .directory
        .list(parent.as_ref())
        .await
        .context("Failed to list inodes")?;

    if ctx.format.is_json() {
        fmt.print_json(&serde_json::json!(children.iter().map(inode_json).collect::<Vec<_>>()));
        return Ok(());
    }

    if children.is_empty() {
        fmt.info("No entries");
        return Ok(());
    }
    for inode in &children {
        let marker = match (inode.is_folder(), inode.is_pending_upload()) {
            (true, _) => "dir ",
            (false, true) => "pend",
            (false, false) => "file",
        };
        let visibility = if inode.is_public { " (public)" } else { "" };
        fmt.info(&format!("{marker}  {:<12} {}{visibility}", inode.id.as_str(), inode.path));
    }
    Ok(())
}

async fn execute_download(ctx: &CliContext, id: &str, dest: &Path) -> Result<()> {
    let fmt = ctx.formatter();
    let services = ctx.connect()?;
    let id = parse_id(id)?;

    let downloader = TreeDownloader::new(services.directory.clone(), services.storage.clone());
    let report = downloader
        .download_id(&id, dest)
        .await
        .with_context(|| format!("Download of {id} failed"))?;

    if ctx.format.is_json() {
        fmt.print_json(&serde_json::to_value(&report).context("Failed to serialize report")?);
    } else {
        fmt.success(&format!("Downloaded {} file(s) into {}", report.files_downloaded, dest.display()));
        fmt.field("Bytes", &report.bytes_downloaded.to_string());
        if report.files_pending > 0 {
            fmt.warn(&format!("{} file(s) were never uploaded and were skipped", report.files_pending));
        }
    }
    Ok(())
}

async fn execute_delete(ctx: &CliContext, id: &str) -> Result<()> {
    let fmt = ctx.formatter();
    let services = ctx.connect()?;
    let id = parse_id(id)?;

    let inode = services
        .directory
        .get(&id)
        .await
        .with_context(|| format!("Failed to look up {id}"))?;
    services
        .directory
        .delete(&id)
        .await
        .with_context(|| format!("Failed to delete {}", inode.path))?;

    if ctx.format.is_json() {
        fmt.print_json(&serde_json::json!({ "success": true, "deleted": inode_json(&inode) }));
    } else {
        fmt.success(&format!("Deleted {}", inode.path));
    }
    Ok(())
}
