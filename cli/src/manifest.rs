//! Script manifests: one JSON file per script to export.
//!
//! ```json
//! { "filename": "A0123456X",
//!   "pages": [{ "page_id": "…", "page_no": 1, "image_url": "p1.png", "layers": [] }] }
//! ```
//!
//! Relative image paths resolve against the manifest's directory.

#[cfg(test)]
#[path = "manifest_test.rs"]
mod manifest_test;

use std::path::{Path, PathBuf};

use canvas::PageSupply;
use serde::Deserialize;

use crate::CliError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Manifest {
    pub filename: String,
    pub pages: Vec<PageSupply>,
}

impl Manifest {
    pub async fn load(path: &Path) -> Result<Self, CliError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CliError::Read { path: path.to_path_buf(), source })?;
        let mut manifest: Self = serde_json::from_str(&raw)
            .map_err(|source| CliError::Manifest { path: path.to_path_buf(), source })?;
        if let Some(dir) = path.parent() {
            manifest.resolve_relative(dir);
        }
        Ok(manifest)
    }

    /// Rebase relative filesystem image paths onto `dir`.
    pub fn resolve_relative(&mut self, dir: &Path) {
        for page in &mut self.pages {
            let url = page.image_url.as_str();
            if url.contains("://") || Path::new(url).is_absolute() {
                continue;
            }
            page.image_url = dir.join(url).to_string_lossy().into_owned();
        }
    }

    /// Output path for this script's PDF inside `out_dir`.
    #[must_use]
    pub fn pdf_path(&self, out_dir: &Path) -> PathBuf {
        out_dir.join(format!("{}.pdf", sanitize(&self.filename)))
    }

    /// The page with the given number, if present.
    #[must_use]
    pub fn page(&self, page_no: u32) -> Option<&PageSupply> {
        self.pages.iter().find(|p| p.page_no == page_no)
    }
}

fn sanitize(filename: &str) -> String {
    let cleaned: String = filename
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_owned();
    if cleaned.is_empty() { "script".to_owned() } else { cleaned }
}
