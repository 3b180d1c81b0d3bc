use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Separator `pdftotext` writes between pages.
pub const PAGE_BREAK: char = '\u{000C}';

/// A document split into pages, ready for `add_document`.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub source: String,
    pub path: PathBuf,
    pub pages: Vec<String>,
}

#[derive(Default)]
pub struct PageReader;

impl PageReader {
    pub fn new() -> Self { Self }

    /// Read one text file; its file name becomes the source name.
    pub fn read_file(&self, path: &Path) -> Result<SourceDocument> {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::InvalidInput(format!("{} has no file name", path.display())))?;
        let content = self.read_file_content(path)?;
        Ok(SourceDocument { source, path: path.to_path_buf(), pages: split_pages(&content) })
    }

    /// Every `.txt` file under `root`, in path order.
    pub fn read_directory(&self, root: &Path) -> Result<Vec<SourceDocument>> {
        self.list_txt_files(root).iter().map(|p| self.read_file(p)).collect()
    }

    fn read_file_content(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).map_err(|e| Error::InvalidInput(format!("cannot read {}: {}", path.display(), e)))?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).to_string(),
        })
    }

    fn list_txt_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut txt_files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("txt") { txt_files.push(path.to_path_buf()); }
        }
        txt_files.sort();
        txt_files
    }
}

/// Split on form feeds. A trailing empty page (final separator) is dropped;
/// other empty pages are kept so numbering follows the original document.
pub fn split_pages(content: &str) -> Vec<String> {
    let mut pages: Vec<String> = content.split(PAGE_BREAK).map(str::to_string).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    if pages.len() == 1 && pages[0].trim().is_empty() {
        pages.clear();
    }
    pages
}
