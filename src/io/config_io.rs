use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::config::{Config, EditorMode, Profile, QuerySource, ResolvedProfile};

const CONFIG_DIR: &str = "vaultask";
const CONFIG_FILE: &str = "config.toml";

/// Error type for configuration loading and profile resolution
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("{}", profile_message(.profile, .field, .reason))]
    ProfileError {
        profile: String,
        field: &'static str,
        reason: String,
    },
    #[error("no vault given: pass --vault or set one in a profile")]
    NoVault,
    #[error("cannot expand '{0}': no home directory")]
    NoHome(String),
}

fn profile_message(profile: &str, field: &str, reason: &str) -> String {
    match (profile.is_empty(), field.is_empty()) {
        (true, _) => format!("config: {field}: {reason}"),
        (false, true) => format!("profile '{profile}': {reason}"),
        (false, false) => format!("profile '{profile}': {field}: {reason}"),
    }
}

fn profile_error(profile: &str, field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::ProfileError {
        profile: profile.to_string(),
        field,
        reason: reason.into(),
    }
}

/// `$XDG_CONFIG_HOME/vaultask/config.toml`, or `~/.config/vaultask/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    let base = match env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()?.join(".config"),
    };
    Some(base.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Read and validate a config file. A missing file is an empty config.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };
    let config: Config = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if let Some(default) = &config.default_profile
        && !config.profiles.contains_key(default)
    {
        return Err(profile_error(
            "",
            "default_profile",
            format!("profile '{default}' not found"),
        ));
    }
    Ok(())
}

/// The profile named by `flag`, else the default profile, else none.
pub fn select_profile<'a>(
    flag: Option<&str>,
    config: &'a Config,
) -> Result<Option<(&'a str, &'a Profile)>, ConfigError> {
    if let Some(name) = flag {
        if config.profiles.is_empty() {
            return Err(profile_error(name, "", "no profiles defined in config"));
        }
        return match config.profiles.get_key_value(name) {
            Some((k, p)) => Ok(Some((k.as_str(), p))),
            None => Err(profile_error(name, "", "profile not found")),
        };
    }
    match &config.default_profile {
        Some(name) => match config.profiles.get_key_value(name) {
            Some((k, p)) => Ok(Some((k.as_str(), p))),
            None => Err(profile_error(
                "",
                "default_profile",
                format!("profile '{name}' not found"),
            )),
        },
        None => Ok(None),
    }
}

/// Expand `$VAR`, `${VAR}` and a leading `~` using the given home and
/// variable lookup. Unset variables expand to nothing.
pub fn expand_path_with(
    value: &str,
    home: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<PathBuf, ConfigError> {
    let value = value.trim();
    let expanded = expand_vars(value, &lookup);

    let rest = if expanded == "~" {
        Some("")
    } else {
        expanded
            .strip_prefix("~/")
            .or_else(|| expanded.strip_prefix("~\\"))
    };
    match rest {
        Some(rest) => {
            let home = home.ok_or_else(|| ConfigError::NoHome(value.to_string()))?;
            Ok(if rest.is_empty() {
                home.to_path_buf()
            } else {
                home.join(rest)
            })
        }
        None => Ok(PathBuf::from(expanded)),
    }
}

fn expand_vars(value: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        let after = &rest[dollar + 1..];
        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let len = after
                .bytes()
                .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
                .count();
            (&after[..len], len)
        };
        if consumed == 0 {
            out.push('$');
            rest = after;
            continue;
        }
        out.push_str(&lookup(name).unwrap_or_default());
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

/// [`expand_path_with`] against the real environment.
pub fn expand_path(value: &str) -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir();
    expand_path_with(value, home.as_deref(), |name| env::var(name).ok())
}

/// Expand a profile's vault; relative paths are taken from the home directory.
pub fn resolve_vault_path(value: &str, home: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let expanded = expand_path_with(value, home, |name| env::var(name).ok())?;
    if expanded.as_os_str().is_empty() || expanded.is_absolute() {
        return Ok(expanded);
    }
    let home = home.ok_or_else(|| ConfigError::NoHome(value.to_string()))?;
    Ok(home.join(expanded))
}

fn canonical_vault(profile: &str, path: &Path) -> Result<PathBuf, ConfigError> {
    let resolved = fs::canonicalize(path)
        .map_err(|e| profile_error(profile, "vault", format!("{}: {e}", path.display())))?;
    if !resolved.is_dir() {
        return Err(profile_error(
            profile,
            "vault",
            format!("path is not a directory: {}", resolved.display()),
        ));
    }
    Ok(resolved)
}

/// A query setting is a file if one exists at that path (absolute, or
/// relative to `base`), otherwise inline query text.
fn query_source(value: &str, base: &Path) -> Result<QuerySource, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(QuerySource::All);
    }
    let expanded = expand_path(value)?;
    let candidate = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };
    if candidate.is_file() {
        Ok(QuerySource::File(candidate))
    } else {
        Ok(QuerySource::Inline(value.to_string()))
    }
}

/// Resolve a named profile into absolute paths.
pub fn resolve_profile(
    name: &str,
    profile: &Profile,
    theme: Option<String>,
) -> Result<ResolvedProfile, ConfigError> {
    if profile.vault.trim().is_empty() {
        return Err(profile_error(name, "vault", "path is empty"));
    }
    let home = dirs::home_dir();
    let vault_path = resolve_vault_path(&profile.vault, home.as_deref())?;
    let vault = canonical_vault(name, &vault_path)?;
    let query = match &profile.query {
        Some(q) => query_source(q, &vault)?,
        None => QuerySource::All,
    };
    let editor_env = env::var("EDITOR").ok();
    Ok(ResolvedProfile {
        name: name.to_string(),
        vault,
        query,
        editor: EditorMode::resolve(profile.editor, editor_env.as_deref()),
        theme,
    })
}

/// Combine command-line settings with the config.
///
/// `--vault` overrides the profile's vault and is taken relative to the
/// current directory. A query argument overrides the profile's query; it
/// names a file if one exists (as given or inside the vault).
pub fn resolve_settings(
    config: &Config,
    vault_flag: Option<&str>,
    profile_flag: Option<&str>,
    query_arg: Option<&str>,
) -> Result<ResolvedProfile, ConfigError> {
    let selected = select_profile(profile_flag, config)?;

    let mut resolved = match (vault_flag, selected) {
        (Some(vault), selected) => {
            let name = selected.map(|(n, _)| n).unwrap_or_default();
            let vault = canonical_vault(name, &expand_path(vault)?)?;
            let query = match selected.and_then(|(_, p)| p.query.as_deref()) {
                Some(q) => query_source(q, &vault)?,
                None => QuerySource::All,
            };
            let editor_env = env::var("EDITOR").ok();
            ResolvedProfile {
                name: name.to_string(),
                vault,
                query,
                editor: EditorMode::resolve(
                    selected.and_then(|(_, p)| p.editor),
                    editor_env.as_deref(),
                ),
                theme: config.theme.clone(),
            }
        }
        (None, Some((name, profile))) => resolve_profile(name, profile, config.theme.clone())?,
        (None, None) => return Err(ConfigError::NoVault),
    };

    if let Some(arg) = query_arg {
        let direct = expand_path(arg)?;
        resolved.query = if direct.is_file() {
            QuerySource::File(direct)
        } else {
            query_source(arg, &resolved.vault)?
        };
    }

    Ok(resolved)
}
