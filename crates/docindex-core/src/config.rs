//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`APP_INDEX__ROOT` sets `index.root`). Provides a helper to expand `~` and
//! `${VAR}` in configured paths.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self::from_figment(figment);
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    /// Typed view of the `[index]` and `[embedder]` sections; missing keys take defaults.
    pub fn settings(&self) -> Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub index: IndexSettings,
    pub embedder: EmbedderSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.index.root.trim().is_empty() {
            return Err(Error::InvalidConfig("index.root must not be empty".to_string()));
        }
        if self.index.embed_concurrency == 0 {
            return Err(Error::InvalidConfig("index.embed_concurrency must be at least 1".to_string()));
        }
        if self.index.embed_timeout_secs == 0 {
            return Err(Error::InvalidConfig("index.embed_timeout_secs must be at least 1".to_string()));
        }
        // Checked for every kind: APP_USE_FAKE_EMBEDDINGS swaps in the hash embedder.
        if self.embedder.dim == 0 {
            return Err(Error::InvalidConfig("embedder.dim must be at least 1".to_string()));
        }
        if self.embedder.kind == EmbedderKind::MiniLm && self.embedder.model_dir.is_none() {
            return Err(Error::InvalidConfig("embedder.model_dir is required for the minilm embedder".to_string()));
        }
        Ok(())
    }
}

/// `[index]`: where the index lives and how rebuilds embed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub root: String,
    pub embed_concurrency: usize,
    pub embed_timeout_secs: u64,
    pub progress: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { root: "./data/docindex".to_string(), embed_concurrency: 4, embed_timeout_secs: 30, progress: false }
    }
}

impl IndexSettings {
    pub fn root_path(&self) -> PathBuf { expand_path(&self.root) }

    pub fn embed_timeout(&self) -> Duration { Duration::from_secs(self.embed_timeout_secs) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    Hash,
    MiniLm,
}

/// `[embedder]`: which embedding capability to construct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderSettings {
    pub kind: EmbedderKind,
    pub model_dir: Option<String>,
    /// Output width of the hash embedder; the MiniLM width comes from its config.
    pub dim: usize,
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self { kind: EmbedderKind::Hash, model_dir: None, dim: 384 }
    }
}

impl EmbedderSettings {
    pub fn model_path(&self) -> Option<PathBuf> { self.model_dir.as_deref().map(expand_path) }
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
