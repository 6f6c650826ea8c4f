//! Filesystem discovery of transcript documents.
//!
//! Walks the ingest root with include/exclude globs matched against the
//! `/`-separated path relative to the root. That relative path becomes the
//! document's key, which feeds its chunk identities. A single file may be
//! passed instead of a directory; its key is then the bare filename.
//! Word lock files (`~$...`) are always skipped.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::IngestConfig;

/// A discovered file and its stable key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPath {
    pub path: PathBuf,
    pub key: String,
}

pub fn scan_documents(config: &IngestConfig, root: &Path) -> Result<Vec<DocumentPath>> {
    if !root.exists() {
        bail!("Ingest root does not exist: {}", root.display());
    }

    if root.is_file() {
        let key = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .with_context(|| format!("Not a file path: {}", root.display()))?;
        return Ok(vec![DocumentPath {
            path: root.to_path_buf(),
            key,
        }]);
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/.DS_Store".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut documents = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with("~$") {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let key = relative_key(relative);

        if exclude_set.is_match(&key) || !include_set.is_match(&key) {
            continue;
        }

        documents.push(DocumentPath {
            path: path.to_path_buf(),
            key,
        });
    }

    // Sort for deterministic ordering
    documents.sort_by(|a, b| a.key.cmp(&b.key));

    Ok(documents)
}

fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn scans_docx_with_relative_keys() {
        let tmp = tempfile::TempDir::new().unwrap();
        touch(tmp.path(), "podcast/Episode 2.docx");
        touch(tmp.path(), "Episode 1.docx");
        touch(tmp.path(), "notes.txt");
        touch(tmp.path(), "podcast/~$isode 2.docx");

        let docs = scan_documents(&IngestConfig::default(), tmp.path()).unwrap();
        let keys: Vec<&str> = docs.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["Episode 1.docx", "podcast/Episode 2.docx"]);
    }

    #[test]
    fn exclude_globs_apply() {
        let tmp = tempfile::TempDir::new().unwrap();
        touch(tmp.path(), "keep/a.docx");
        touch(tmp.path(), "drafts/b.docx");
        let config = IngestConfig {
            exclude_globs: vec!["drafts/**".to_string()],
            ..IngestConfig::default()
        };
        let docs = scan_documents(&config, tmp.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].key, "keep/a.docx");
    }

    #[test]
    fn single_file_key_is_filename() {
        let tmp = tempfile::TempDir::new().unwrap();
        touch(tmp.path(), "sub/Episode 9.docx");
        let docs = scan_documents(&IngestConfig::default(), &tmp.path().join("sub/Episode 9.docx")).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].key, "Episode 9.docx");
    }

    #[test]
    fn missing_root_is_error() {
        assert!(scan_documents(&IngestConfig::default(), Path::new("/no/such/root")).is_err());
    }
}
