use crate::{ReconError, Result};
use log::debug;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Text helpers shared by the merge and enrichment stages
pub mod text {
    /// A field counts as empty when it is absent or holds an empty string.
    pub fn is_blank(value: &Option<String>) -> bool {
        value.as_deref().map_or(true, str::is_empty)
    }

    /// Merge-if-absent for a single optional string field.
    pub fn fill_if_blank(slot: &mut Option<String>, value: Option<&str>) -> bool {
        match value {
            Some(v) if !v.is_empty() && is_blank(slot) => {
                *slot = Some(v.to_string());
                true
            }
            _ => false,
        }
    }

    /// Keep at most `max_chars` characters (not bytes).
    pub fn truncate_chars(value: &str, max_chars: usize) -> String {
        match value.char_indices().nth(max_chars) {
            Some((idx, _)) => value[..idx].to_string(),
            None => value.to_string(),
        }
    }
}

/// File helpers for the JSON stage documents
pub mod files {
    use super::*;
    use crate::types::NormalizedDocument;
    use serde::de::DeserializeOwned;
    use serde::Serialize;

    /// Fail with a missing-input error when `path` does not exist.
    pub fn require_file(what: &str, path: &Path) -> Result<()> {
        if path.exists() {
            Ok(())
        } else {
            Err(ReconError::missing(what, path))
        }
    }

    pub async fn read_json<T: DeserializeOwned>(what: &str, path: &Path) -> Result<T> {
        require_file(what, path)?;
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json).await?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    pub async fn read_document(path: &Path) -> Result<NormalizedDocument> {
        read_json("normalized JSON", path).await
    }

    pub async fn write_document(path: &Path, doc: &NormalizedDocument) -> Result<()> {
        write_json(path, doc).await
    }

    /// `dir/name.json` + `_suffix` -> `dir/name_suffix.json`
    pub fn derive_output_path(input: &Path, suffix: &str) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = format!("{}_{}.json", stem, suffix);
        match input.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Make a target identifier safe to embed in a file name.
    pub fn sanitize_component(value: &str) -> String {
        value
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' => '_',
                c => c,
            })
            .collect()
    }
}

/// Time and formatting utilities
pub mod time {
    use chrono::{DateTime, Utc};
    use std::time::Duration;

    pub fn now_utc() -> DateTime<Utc> {
        Utc::now()
    }

    /// Format duration as human readable string
    pub fn format_duration(duration: Duration) -> String {
        let secs = duration.as_secs();
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else if secs > 0 {
            format!("{}s", seconds)
        } else {
            format!("{}ms", duration.as_millis())
        }
    }
}
