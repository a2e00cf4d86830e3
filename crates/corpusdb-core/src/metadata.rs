//! Path and content heuristics that tag a document.
//!
//! Path segments win; front-matter `key: value` lines and the first heading
//! are the fallback. Nothing here fails: undetermined fields stay `Unknown`.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path};

use crate::config::DEFAULT_TECHNOLOGIES;
use crate::types::{ChunkMetadata, FileKind, Tag};

const PROSE_EXT: &[&str] = &["md", "markdown", "txt", "rst", "adoc"];
const MARKUP_EXT: &[&str] = &["html", "htm", "xml", "yaml", "yml", "json", "toml", "ini", "cfg", "csv"];
const SOURCE_EXT: &[&str] = &[
    "rs", "py", "go", "java", "kt", "scala", "js", "jsx", "ts", "tsx", "c", "h", "cc", "cpp", "hpp",
    "cs", "rb", "php", "swift", "sh", "bash", "zsh", "sql", "lua", "pl", "r", "ex", "exs", "erl",
    "hs", "ml", "clj", "dart", "vue", "svelte", "tf", "proto", "gradle", "cmake", "mk",
];
const GENERIC_STEMS: &[&str] = &["readme", "index", "mod", "lib", "main", "__init__"];

/// How much of a document the content heuristics look at.
pub const SNIPPET_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    technologies: HashSet<String>,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_TECHNOLOGIES.iter().copied())
    }
}

impl MetadataExtractor {
    pub fn new<I, S>(technologies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self { technologies: technologies.into_iter().map(|t| t.as_ref().to_lowercase()).collect() }
    }

    /// Derive the metadata bag for `path`, found under corpus `root`.
    pub fn extract(&self, path: &Path, root: &Path, content: &str) -> ChunkMetadata {
        let snippet = head(content, SNIPPET_BYTES);
        let front = front_matter(snippet);
        let heading = first_heading(snippet);
        let dirs = relative_dirs(path, root);

        let tech_pos = dirs.iter().position(|d| self.technologies.contains(&d.to_lowercase()));
        let technology = tech_pos
            .map(|i| Tag::new(&dirs[i]))
            .unwrap_or_default()
            .or_else(|| field(&front, &["technology", "tech"]))
            .or_else(|| {
                heading
                    .and_then(|h| h.split_whitespace().map(clean_word).find(|w| self.technologies.contains(w)))
                    .map(Tag::new)
                    .unwrap_or_default()
            });

        let component = tech_pos
            .and_then(|i| dirs.get(i + 1))
            .map(Tag::new)
            .unwrap_or_default()
            .or_else(|| field(&front, &["component"]));

        let version = dirs
            .iter()
            .find(|d| looks_like_version(d))
            .map(Tag::new)
            .unwrap_or_default()
            .or_else(|| field(&front, &["version"]))
            .or_else(|| version_phrase(snippet).map(Tag::new).unwrap_or_default());

        let topic = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .filter(|s| !GENERIC_STEMS.contains(&s.as_str()))
            .map(|s| Tag::new(humanize(&s)))
            .unwrap_or_default()
            .or_else(|| field(&front, &["title", "topic"]))
            .or_else(|| heading.map(Tag::new).unwrap_or_default());

        ChunkMetadata {
            technology,
            component,
            topic,
            version,
            file_kind: detect_file_kind(path, snippet),
            source_path: path.to_string_lossy().into_owned(),
        }
    }
}

/// Classify by extension; unknown extensions are sniffed from content.
pub fn detect_file_kind(path: &Path, content: &str) -> FileKind {
    let ext = path.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default();
    if PROSE_EXT.contains(&ext.as_str()) {
        FileKind::Prose
    } else if MARKUP_EXT.contains(&ext.as_str()) {
        FileKind::StructuredMarkup
    } else if SOURCE_EXT.contains(&ext.as_str()) {
        FileKind::SourceCode
    } else {
        sniff(head(content, SNIPPET_BYTES))
    }
}

fn sniff(snippet: &str) -> FileKind {
    let lines: Vec<&str> = snippet.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return FileKind::Prose;
    }
    let code_like = lines.iter().filter(|l| is_code_like(l)).count();
    if code_like * 2 > lines.len() { FileKind::SourceCode } else { FileKind::Prose }
}

fn is_code_like(line: &str) -> bool {
    let t = line.trim_end();
    t.ends_with(';')
        || t.ends_with('{')
        || t.ends_with('}')
        || t.ends_with(')')
        || t.starts_with("#!")
        || t.starts_with("//")
        || t.trim_start().starts_with("def ")
        || t.trim_start().starts_with("fn ")
        || t.trim_start().starts_with("import ")
        || t.trim_start().starts_with("return ")
}

/// Directory segments of `path` relative to `root` (the file name excluded).
fn relative_dirs(path: &Path, root: &Path) -> Vec<String> {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut dirs: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    dirs.pop();
    dirs
}

fn head(content: &str, max: usize) -> &str {
    if content.len() <= max {
        return content;
    }
    let mut end = max;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

/// `key: value` lines, either inside a leading `---` block or at the very
/// top of the document before the first blank line.
fn front_matter(snippet: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let mut lines = snippet.lines().peekable();
    let fenced = lines.peek().is_some_and(|l| l.trim() == "---");
    if fenced {
        lines.next();
    }
    for line in lines {
        let t = line.trim();
        if fenced && t == "---" {
            break;
        }
        if !fenced && t.is_empty() {
            break;
        }
        let Some((k, v)) = t.split_once(':') else {
            if fenced {
                continue;
            }
            break;
        };
        let key = k.trim().to_lowercase();
        if key.is_empty() || key.contains(char::is_whitespace) {
            if fenced {
                continue;
            }
            break;
        }
        let value = v.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
        if !value.is_empty() {
            out.entry(key).or_insert(value);
        }
    }
    out
}

fn field(front: &HashMap<String, String>, keys: &[&str]) -> Tag {
    keys.iter().find_map(|k| front.get(*k)).map(Tag::new).unwrap_or_default()
}

fn first_heading(snippet: &str) -> Option<&str> {
    snippet.lines().find_map(|l| {
        let t = l.trim_start();
        if t.starts_with('#') && !t.starts_with("#!") {
            let h = t.trim_start_matches('#').trim();
            (!h.is_empty()).then_some(h)
        } else {
            None
        }
    })
}

fn clean_word(w: &str) -> String {
    w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()
}

fn looks_like_version(seg: &str) -> bool {
    let s = seg.strip_prefix(['v', 'V']).unwrap_or(seg);
    let mut parts = s.split('.');
    let all_numeric = parts.all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    // bare integers only count with the `v` prefix
    all_numeric && (s.contains('.') || s.len() != seg.len())
}

fn version_phrase(snippet: &str) -> Option<String> {
    let words: Vec<&str> = snippet.split_whitespace().collect();
    words.windows(2).find_map(|w| {
        if !w[0].eq_ignore_ascii_case("version") {
            return None;
        }
        let candidate = w[1].trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
        (candidate.contains('.') && looks_like_version(candidate)).then(|| candidate.to_string())
    })
}

fn humanize(stem: &str) -> String {
    stem.split(['-', '_', '.', ' ']).filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ")
}
