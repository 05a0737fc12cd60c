use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration from config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub default_profile: Option<String>,
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
    /// Passed through to the presentation layer untouched
    #[serde(default)]
    pub theme: Option<String>,
}

/// A named vault + query pairing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub vault: String,
    /// Query file path (absolute or vault-relative) or inline query text
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub editor: Option<EditorMode>,
}

/// How edits are collected from the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorMode {
    Inline,
    External,
}

impl EditorMode {
    /// Resolve an optional configured mode: unset means inline unless
    /// `$EDITOR` names something.
    pub fn resolve(configured: Option<EditorMode>, editor_env: Option<&str>) -> EditorMode {
        match configured {
            Some(mode) => mode,
            None => match editor_env {
                Some(e) if !e.trim().is_empty() => EditorMode::External,
                _ => EditorMode::Inline,
            },
        }
    }
}

/// Where the queries for a session come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    /// No query configured: show every task
    All,
    /// A markdown file holding one or more ```tasks blocks
    File(PathBuf),
    /// Query text given directly
    Inline(String),
}

/// A profile after path expansion and validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    /// Empty when settings came from flags only
    pub name: String,
    /// Absolute and symlink-resolved
    pub vault: PathBuf,
    pub query: QuerySource,
    pub editor: EditorMode,
    pub theme: Option<String>,
}
