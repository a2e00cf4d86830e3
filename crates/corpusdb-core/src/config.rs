//! Layered configuration.
//!
//! Figment merges `Settings::default()`, `config.toml`, `config.<env>.toml`
//! (selected by `RUST_ENV`) and `APP_*` environment variables, in that order.
//! Nested keys use `__` in the environment: `APP_FUSION__KEYWORD_WEIGHT=0.3`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same layering as [`Config::load`], reading the TOML files from `dir`.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Ok(Self { figment: Self::layered(&env_name, dir) })
    }

    fn layered(env_name: &str, dir: &Path) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment.merge(Env::prefixed("APP_").split("__"))
    }

    /// Extract and validate the full typed settings.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub corpus: CorpusSettings,
    pub storage: StorageSettings,
    pub chunking: ChunkingSettings,
    pub fusion: FusionSettings,
    pub batching: BatchingSettings,
    pub resilience: ResilienceSettings,
    pub embedding: EmbeddingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    pub roots: Vec<String>,
    /// Directory names skipped in addition to the built-in exclusion set.
    pub exclude: Vec<String>,
    /// Identifiers recognised as technology path segments.
    pub technologies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub target_tokens: usize,
    pub overlap_tokens: usize,
    pub min_lines: usize,
    pub max_lines: usize,
    pub overlap_lines: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    pub keyword_weight: f32,
    pub semantic_weight: f32,
    /// Each side fetches `top_k * overfetch` candidates.
    pub overfetch: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingSettings {
    pub embed: usize,
    pub keyword: usize,
    pub vector: usize,
    /// Persist the checksum store after this many processed files.
    pub checksum_flush_every: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    pub embed_timeout_ms: u64,
    pub index_timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: Option<String>,
    pub fake: bool,
    pub dim: usize,
    pub max_len: usize,
}

impl Default for CorpusSettings {
    fn default() -> Self {
        Self {
            roots: vec![".".into()],
            exclude: Vec::new(),
            technologies: DEFAULT_TECHNOLOGIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { data_dir: ".corpusdb".into() }
    }
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { target_tokens: 300, overlap_tokens: 50, min_lines: 20, max_lines: 80, overlap_lines: 10 }
    }
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self { keyword_weight: 0.3, semantic_weight: 0.7, overfetch: 3 }
    }
}

impl Default for BatchingSettings {
    fn default() -> Self {
        Self { embed: 32, keyword: 500, vector: 256, checksum_flush_every: 50 }
    }
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self { embed_timeout_ms: 60_000, index_timeout_ms: 30_000, max_retries: 3, backoff_ms: 200 }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { model_dir: None, fake: false, dim: 1024, max_len: 512 }
    }
}

pub const DEFAULT_TECHNOLOGIES: &[&str] = &[
    "rust", "python", "go", "java", "javascript", "typescript", "node", "react", "vue", "angular",
    "django", "flask", "fastapi", "rails", "spring", "dotnet", "kubernetes", "k8s", "docker",
    "terraform", "ansible", "helm", "aws", "gcp", "azure", "postgres", "postgresql", "mysql",
    "sqlite", "redis", "kafka", "elasticsearch", "nginx", "linux", "git", "graphql", "grpc",
    "tokio", "tantivy",
];

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: &str| Err(Error::Configuration(msg.to_string()));
        let f = &self.fusion;
        if !f.keyword_weight.is_finite() || !f.semantic_weight.is_finite() {
            return bad("fusion weights must be finite");
        }
        if f.keyword_weight < 0.0 || f.semantic_weight < 0.0 {
            return bad("fusion weights must not be negative");
        }
        if f.keyword_weight == 0.0 && f.semantic_weight == 0.0 {
            return bad("at least one fusion weight must be positive");
        }
        if f.overfetch == 0 {
            return bad("fusion.overfetch must be at least 1");
        }
        let c = &self.chunking;
        if c.target_tokens == 0 {
            return bad("chunking.target_tokens must be positive");
        }
        if c.overlap_tokens >= c.target_tokens {
            return bad("chunking.overlap_tokens must be smaller than target_tokens");
        }
        if c.max_lines == 0 {
            return bad("chunking.max_lines must be positive");
        }
        if c.min_lines > c.max_lines {
            return bad("chunking.min_lines must not exceed max_lines");
        }
        if c.overlap_lines >= c.max_lines {
            return bad("chunking.overlap_lines must be smaller than max_lines");
        }
        let b = &self.batching;
        if b.embed == 0 || b.keyword == 0 || b.vector == 0 {
            return bad("batch sizes must be positive");
        }
        if b.checksum_flush_every == 0 {
            return bad("batching.checksum_flush_every must be positive");
        }
        if self.embedding.dim == 0 {
            return bad("embedding.dim must be positive");
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.storage.data_dir)
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        self.corpus.roots.iter().map(expand_path).collect()
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().expect("defaults validate");
    }

    #[test]
    fn layers_toml_env_file_and_env_vars() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [fusion]
                keyword_weight = 0.5
                semantic_weight = 0.5

                [batching]
                embed = 8
                "#,
            )?;
            jail.create_file("config.test.toml", "[batching]\nembed = 4\n")?;
            jail.set_env("RUST_ENV", "test");
            jail.set_env("APP_FUSION__OVERFETCH", "5");

            let settings = Config::load().expect("load").settings().expect("settings");
            assert_eq!(settings.fusion.keyword_weight, 0.5);
            assert_eq!(settings.batching.embed, 4);
            assert_eq!(settings.fusion.overfetch, 5);
            assert_eq!(settings.batching.vector, BatchingSettings::default().vector);
            Ok(())
        });
    }

    #[test]
    fn rejects_invalid_weights_and_sizes() {
        let mut s = Settings::default();
        s.fusion.keyword_weight = 0.0;
        s.fusion.semantic_weight = 0.0;
        assert!(matches!(s.validate(), Err(Error::Configuration(_))));

        let mut s = Settings::default();
        s.fusion.semantic_weight = -0.1;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.chunking.overlap_tokens = s.chunking.target_tokens;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.chunking.min_lines = 100;
        s.chunking.max_lines = 10;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.batching.vector = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn invalid_env_override_is_a_configuration_error() {
        Jail::expect_with(|jail| {
            jail.set_env("APP_FUSION__KEYWORD_WEIGHT", "-1.0");
            let err = Config::load().expect("load").settings().unwrap_err();
            assert!(matches!(err, Error::Configuration(_)));
            Ok(())
        });
    }

    #[test]
    fn loads_from_a_config_directory_and_expands_paths() {
        Jail::expect_with(|jail| {
            std::fs::create_dir_all(jail.directory().join("conf")).expect("mkdir conf");
            jail.create_file("conf/config.toml", "[corpus]\nroots = [\"${CORPUS_HOME}/docs\"]\n")?;
            jail.set_env("CORPUS_HOME", "/srv/corpus");

            let settings = Config::load_from(Path::new("conf")).expect("load").settings().expect("settings");
            assert_eq!(settings.roots(), vec![PathBuf::from("/srv/corpus/docs")]);
            assert_eq!(expand_path("/abs"), PathBuf::from("/abs"));
            Ok(())
        });
    }
}
