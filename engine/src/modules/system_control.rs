//! System control module
//!
//! Directory scanning, file information, archiving of old files and
//! organization by file type. Every path goes through [`RootGuard`] before
//! any I/O, independently of the policy gate's own root check.

use async_trait::async_trait;
use badi_sdk::{
    CapabilityInput, CapabilityModule, CapabilityOutput, CapabilitySpec, EngineError, ParamSpec,
    ParamType,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::fs_guard::RootGuard;

/// Extension categories used by `organize_by_type`; anything else is "Other"
const TYPE_CATEGORIES: &[(&str, &[&str])] = &[
    ("Documents", &["pdf", "doc", "docx", "txt", "rtf", "odt", "md"]),
    ("Images", &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp"]),
    ("Videos", &["mp4", "avi", "mkv", "mov", "wmv", "flv"]),
    ("Audio", &["mp3", "wav", "flac", "aac", "ogg", "m4a"]),
    ("Archives", &["zip", "rar", "7z", "tar", "gz"]),
    ("Code", &["py", "js", "html", "css", "java", "cpp", "c", "rs"]),
    ("Spreadsheets", &["xlsx", "xls", "csv"]),
    ("Presentations", &["pptx", "ppt", "key"]),
];

pub struct SystemControlModule {
    guard: RootGuard,
    specs: Vec<CapabilitySpec>,
}

impl SystemControlModule {
    pub fn new(guard: RootGuard) -> Self {
        let specs = vec![
            CapabilitySpec::new("scan_directory", "List files in a directory with size and age")
                .param(ParamSpec::required("path", ParamType::Path, "Directory to scan"))
                .param(ParamSpec::with_default(
                    "recursive",
                    ParamType::Bool,
                    json!(false),
                    "Include subdirectories",
                ))
                .param(ParamSpec::with_default(
                    "file_types",
                    ParamType::List,
                    json!([]),
                    "Only these extensions, e.g. [\".pdf\"]",
                ))
                .read_only(),
            CapabilitySpec::new("get_file_info", "Size, timestamps and type of one file")
                .param(ParamSpec::required("file_path", ParamType::Path, "File to inspect"))
                .read_only(),
            CapabilitySpec::new(
                "move_old_files",
                "Move files older than `days` days into an archive folder",
            )
            .param(ParamSpec::required("source_path", ParamType::Path, "Directory to clean"))
            .param(ParamSpec::required("days", ParamType::Integer, "Minimum age in days"))
            .param(ParamSpec::optional(
                "archive_path",
                ParamType::Path,
                "Destination (default: <source_path>/archive)",
            ))
            .requires_confirmation(),
            CapabilitySpec::new("organize_by_type", "Sort files into folders by file type")
                .param(ParamSpec::required("source_path", ParamType::Path, "Directory to organize"))
                .param(ParamSpec::with_default(
                    "create_folders",
                    ParamType::Bool,
                    json!(true),
                    "Create category folders and move files; false only reports",
                ))
                .requires_confirmation(),
        ];

        Self { guard, specs }
    }

    async fn scan_directory(&self, input: &CapabilityInput) -> Result<Value, EngineError> {
        let dir = self.existing_dir(&input.param_str("path")?).await?;
        let recursive = input.param_bool("recursive")?;
        let filter: Vec<String> = input
            .param_str_list("file_types")
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();

        let mut files = Vec::new();
        let mut pending = vec![dir.clone()];
        while let Some(current) = pending.pop() {
            let mut entries = fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    if recursive {
                        pending.push(path);
                    }
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                let extension = extension_of(&path);
                if !filter.is_empty() && !filter.contains(&extension) {
                    continue;
                }
                let meta = entry.metadata().await?;
                files.push(json!({
                    "name": entry.file_name().to_string_lossy(),
                    "path": path.display().to_string(),
                    "size": meta.len(),
                    "modified": timestamp(meta.modified().ok()),
                    "extension": extension,
                }));
            }
        }

        // Newest first
        files.sort_by(|a, b| b["modified"].as_str().cmp(&a["modified"].as_str()));
        let total: u64 = files.iter().filter_map(|f| f["size"].as_u64()).sum();

        debug!("Scanned {} ({} files)", dir.display(), files.len());
        Ok(json!({
            "directory": dir.display().to_string(),
            "file_count": files.len(),
            "total_size": total,
            "files": files,
        }))
    }

    async fn get_file_info(&self, input: &CapabilityInput) -> Result<Value, EngineError> {
        let raw = input.param_str("file_path")?;
        let path = self.guard.validate_path(Path::new(&raw))?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| EngineError::Capability(format!("file not found: {} ({})", raw, e)))?;
        if !meta.is_file() {
            return Err(EngineError::Capability(format!("not a file: {}", raw)));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(json!({
            "name": name,
            "path": path.display().to_string(),
            "size": meta.len(),
            "created": timestamp(meta.created().ok()),
            "modified": timestamp(meta.modified().ok()),
            "accessed": timestamp(meta.accessed().ok()),
            "extension": extension_of(&path),
            "category": category_of(&path),
            "is_hidden": name.starts_with('.'),
        }))
    }

    async fn move_old_files(&self, input: &CapabilityInput) -> Result<Value, EngineError> {
        let source = self.existing_dir(&input.param_str("source_path")?).await?;
        let days = input.param_i64("days")?;
        if days < 0 {
            return Err(EngineError::Parameter("days must not be negative".into()));
        }
        let archive = match input.param_str_opt("archive_path") {
            Some(raw) => self.guard.validate_path(Path::new(&raw))?,
            None => source.join("archive"),
        };
        fs::create_dir_all(&archive).await?;

        let cutoff = age_cutoff(SystemTime::now(), days as u64);

        let mut moved = Vec::new();
        let mut errors = Vec::new();
        let mut entries = fs::read_dir(&source).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    errors.push(json!({"file": path.display().to_string(), "error": e.to_string()}));
                    continue;
                }
            };
            if modified >= cutoff {
                continue;
            }

            let dest = unique_destination(&archive, &path).await;
            match fs::rename(&path, &dest).await {
                Ok(()) => moved.push(json!({
                    "original_path": path.display().to_string(),
                    "new_path": dest.display().to_string(),
                })),
                Err(e) => {
                    warn!("Failed to move {}: {}", path.display(), e);
                    errors.push(json!({"file": path.display().to_string(), "error": e.to_string()}));
                }
            }
        }

        info!("Archived {} files from {}", moved.len(), source.display());
        Ok(json!({
            "moved_count": moved.len(),
            "archive_path": archive.display().to_string(),
            "moved_files": moved,
            "errors": errors,
        }))
    }

    async fn organize_by_type(&self, input: &CapabilityInput) -> Result<Value, EngineError> {
        let source = self.existing_dir(&input.param_str("source_path")?).await?;
        let create_folders = input.param_bool("create_folders")?;

        let mut organized: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        let mut errors = Vec::new();
        let mut entries = fs::read_dir(&source).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            let category = category_of(&path);
            let name = entry.file_name().to_string_lossy().to_string();

            if create_folders {
                let folder = source.join(category);
                fs::create_dir_all(&folder).await?;
                let dest = unique_destination(&folder, &path).await;
                if let Err(e) = fs::rename(&path, &dest).await {
                    errors.push(json!({"file": name, "error": e.to_string()}));
                    continue;
                }
            }
            organized.entry(category).or_default().push(name);
        }

        let count: usize = organized.values().map(Vec::len).sum();
        info!("Organized {} files in {}", count, source.display());
        Ok(json!({
            "organized_count": count,
            "moved": create_folders,
            "categories": organized,
            "errors": errors,
        }))
    }

    async fn existing_dir(&self, raw: &str) -> Result<PathBuf, EngineError> {
        let path = self.guard.validate_path(Path::new(raw))?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(path),
            Ok(_) => Err(EngineError::Capability(format!("not a directory: {}", raw))),
            Err(_) => Err(EngineError::Capability(format!("directory not found: {}", raw))),
        }
    }
}

#[async_trait]
impl CapabilityModule for SystemControlModule {
    fn name(&self) -> &str {
        "system_control"
    }

    fn description(&self) -> &str {
        "File system inspection and organization"
    }

    fn capabilities(&self) -> &[CapabilitySpec] {
        &self.specs
    }

    async fn invoke(
        &self,
        capability: &str,
        input: CapabilityInput,
    ) -> Result<CapabilityOutput, EngineError> {
        let data = match capability {
            "scan_directory" => self.scan_directory(&input).await?,
            "get_file_info" => self.get_file_info(&input).await?,
            "move_old_files" => self.move_old_files(&input).await?,
            "organize_by_type" => self.organize_by_type(&input).await?,
            other => return Err(EngineError::UnknownCapability(format!("system_control.{}", other))),
        };
        Ok(CapabilityOutput::json(data))
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn category_of(path: &Path) -> &'static str {
    let ext = extension_of(path);
    TYPE_CATEGORIES
        .iter()
        .find(|(_, exts)| exts.contains(&ext.as_str()))
        .map(|(name, _)| *name)
        .unwrap_or("Other")
}

/// Files modified before this are older than `days`; clamps to the epoch
fn age_cutoff(now: SystemTime, days: u64) -> SystemTime {
    days.checked_mul(86_400)
        .and_then(|secs| now.checked_sub(Duration::from_secs(secs)))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn timestamp(time: Option<SystemTime>) -> Option<String> {
    time.map(|t| DateTime::<Utc>::from(t).to_rfc3339())
}

/// `dir/name.ext`, or `dir/name_1.ext`, `dir/name_2.ext`, ... if taken
async fn unique_destination(dir: &Path, file: &Path) -> PathBuf {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let suffix = file
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut dest = dir.join(format!("{}{}", stem, suffix));
    let mut counter = 1;
    while fs::try_exists(&dest).await.unwrap_or(false) {
        dest = dir.join(format!("{}_{}{}", stem, counter, suffix));
        counter += 1;
    }
    dest
}
