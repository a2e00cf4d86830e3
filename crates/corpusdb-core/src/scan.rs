//! Corpus discovery: walk the configured roots and read candidate files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::metadata::detect_file_kind;
use crate::types::SourceDocument;

/// Directory names never descended into.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git", ".hg", ".svn", "node_modules", "target", "vendor", ".venv", "venv", "__pycache__",
    ".cache", "dist", "build", ".idea", ".vscode", ".tantivy", ".lancedb",
];

/// A file found under a corpus root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub root: PathBuf,
}

impl ScannedFile {
    pub fn path_key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct CorpusScanner {
    roots: Vec<PathBuf>,
    exclude: HashSet<String>,
    data_dir: Option<PathBuf>,
}

impl CorpusScanner {
    pub fn new<I, S>(roots: Vec<PathBuf>, extra_excludes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut exclude: HashSet<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        exclude.extend(extra_excludes.into_iter().map(Into::into));
        Self { roots, exclude, data_dir: None }
    }

    /// Skip the engine's own storage directory wherever it sits.
    pub fn with_data_dir(mut self, data_dir: &Path) -> Self {
        self.data_dir = Some(absolute(data_dir));
        self
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return false;
        }
        if self.exclude.contains(entry.file_name().to_string_lossy().as_ref()) {
            return true;
        }
        self.data_dir.as_deref().is_some_and(|d| absolute(entry.path()) == d)
    }

    /// Every regular file under the roots, sorted, with walk errors returned
    /// alongside instead of aborting the scan.
    pub fn scan(&self) -> (Vec<ScannedFile>, Vec<Error>) {
        let mut files = Vec::new();
        let mut errors = Vec::new();
        for root in &self.roots {
            let root_abs = absolute(root);
            if !root_abs.exists() {
                warn!(root = %root_abs.display(), "corpus root does not exist");
                errors.push(Error::CorpusScan { path: root_abs, message: "corpus root does not exist".into() });
                continue;
            }
            let walker = WalkDir::new(&root_abs).follow_links(false).into_iter().filter_entry(|e| !self.is_excluded(e));
            for entry in walker {
                match entry {
                    Ok(e) if e.file_type().is_file() => {
                        files.push(ScannedFile { path: e.into_path(), root: root_abs.clone() });
                    }
                    Ok(_) => {}
                    Err(err) => {
                        let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root_abs.clone());
                        errors.push(Error::CorpusScan { path, message: err.to_string() });
                    }
                }
            }
        }
        files.sort();
        files.dedup_by(|a, b| a.path == b.path);
        debug!(files = files.len(), errors = errors.len(), "scan complete");
        (files, errors)
    }
}

/// Lowercase hex blake3 digest of file content.
pub fn checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Read, fingerprint and decode a scanned file. Non-UTF-8 content is a
/// `CorpusScan` error.
pub fn read_document(file: &ScannedFile) -> Result<SourceDocument> {
    let bytes = fs::read(&file.path).map_err(|e| Error::CorpusScan { path: file.path.clone(), message: e.to_string() })?;
    let checksum = checksum(&bytes);
    let text = String::from_utf8(bytes)
        .map_err(|e| Error::CorpusScan { path: file.path.clone(), message: format!("not valid UTF-8: {e}") })?;
    let kind = detect_file_kind(&file.path, &text);
    Ok(SourceDocument { path: file.path.clone(), root: file.root.clone(), text, kind, checksum })
}

fn absolute(p: &Path) -> PathBuf {
    p.canonicalize().unwrap_or_else(|_| {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            std::env::current_dir().map(|d| d.join(p)).unwrap_or_else(|_| p.to_path_buf())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileKind;

    #[test]
    fn skips_excluded_and_data_directories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        for dir in ["docs", ".git", "node_modules/pkg", ".corpusdb", "skipme"] {
            fs::create_dir_all(root.join(dir)).expect("mkdir");
        }
        fs::write(root.join("docs/a.md"), "alpha").expect("write");
        fs::write(root.join(".git/HEAD"), "ref").expect("write");
        fs::write(root.join("node_modules/pkg/index.js"), "x;").expect("write");
        fs::write(root.join(".corpusdb/checksums.json"), "{}").expect("write");
        fs::write(root.join("skipme/b.md"), "beta").expect("write");
        fs::write(root.join("top.txt"), "gamma").expect("write");

        let scanner = CorpusScanner::new(vec![root.to_path_buf()], ["skipme"]).with_data_dir(&root.join(".corpusdb"));
        let (files, errors) = scanner.scan();
        assert!(errors.is_empty());
        let names: Vec<String> = files
            .iter()
            .map(|f| f.path.strip_prefix(&f.root).expect("under root").to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["docs/a.md".to_string(), "top.txt".to_string()]);
    }

    #[test]
    fn missing_root_is_reported_not_fatal() {
        let scanner = CorpusScanner::new(vec![PathBuf::from("/definitely/not/here")], Vec::<String>::new());
        let (files, errors) = scanner.scan();
        assert!(files.is_empty());
        assert!(matches!(errors.as_slice(), [Error::CorpusScan { .. }]));
    }

    #[test]
    fn read_document_checksums_and_classifies() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("main.rs");
        fs::write(&path, "fn main() {}\n").expect("write");
        let doc = read_document(&ScannedFile { path: path.clone(), root: tmp.path().to_path_buf() }).expect("read");
        assert_eq!(doc.kind, FileKind::SourceCode);
        assert_eq!(doc.checksum, checksum(b"fn main() {}\n"));

        let bin = tmp.path().join("blob.bin");
        fs::write(&bin, [0xff, 0xfe, 0x00]).expect("write");
        let err = read_document(&ScannedFile { path: bin, root: tmp.path().to_path_buf() }).unwrap_err();
        assert!(matches!(err, Error::CorpusScan { .. }));
    }
}
