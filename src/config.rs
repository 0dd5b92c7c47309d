use color_eyre::{eyre::eyre, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::generation::GenerationNames;

/// Environment variable that overrides the configured origin
const ORIGIN_ENV: &str = "SHELLCACHE_ORIGIN";
const DEFAULT_ORIGIN: &str = "http://localhost:8080/";
const DEFAULT_STATIC_CACHE: &str = "rc-static-v2-20250928";
const DEFAULT_DYNAMIC_CACHE: &str = "rc-dyn-v2-20250928";
const DEFAULT_API_PATTERN: &str = r"^https?://api\.exchangerate\.host/";
const DEFAULT_CDN_PATTERN: &str = r"cdn\.jsdelivr\.net$|unpkg\.com$";
const DEFAULT_PRECACHE: &[&str] = &[
  "./",
  "./manifest.webmanifest",
  "./manifest-hi.webmanifest",
  "./icons/icon-maskable.svg",
  "https://cdn.jsdelivr.net/npm/html2canvas@1.4.1/dist/html2canvas.min.js",
  "https://cdn.jsdelivr.net/npm/jspdf@2.5.1/dist/jspdf.umd.min.js",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Scope URL the interceptor serves; relative URLs resolve against it
  pub origin: String,
  pub generations: GenerationsConfig,
  /// Fetched into the static generation on install, in order
  pub precache: Vec<String>,
  pub routes: RoutesConfig,
  /// Offline fallback page for navigations
  pub app_shell: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationsConfig {
  #[serde(rename = "static")]
  pub static_name: String,
  #[serde(rename = "dynamic")]
  pub dynamic_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
  /// Matched against the full request URL
  pub api: String,
  /// Matched against the request host (with port, if explicit)
  pub cdn: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: DEFAULT_ORIGIN.to_string(),
      generations: GenerationsConfig::default(),
      precache: DEFAULT_PRECACHE.iter().map(|s| s.to_string()).collect(),
      routes: RoutesConfig::default(),
      app_shell: "./".to_string(),
    }
  }
}

impl Default for GenerationsConfig {
  fn default() -> Self {
    Self {
      static_name: DEFAULT_STATIC_CACHE.to_string(),
      dynamic_name: DEFAULT_DYNAMIC_CACHE.to_string(),
    }
  }
}

impl Default for RoutesConfig {
  fn default() -> Self {
    Self {
      api: DEFAULT_API_PATTERN.to_string(),
      cdn: DEFAULT_CDN_PATTERN.to_string(),
    }
  }
}

/// Validated configuration, ready to build a dispatcher from.
#[derive(Debug, Clone)]
pub struct Settings {
  pub origin: Url,
  pub names: GenerationNames,
  pub precache: Vec<Url>,
  pub api_pattern: Regex,
  pub cdn_pattern: Regex,
  pub app_shell: Url,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shellcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shellcache/config.yaml
  ///
  /// Falls back to the built-in deployment defaults when no file exists.
  /// `SHELLCACHE_ORIGIN` overrides the origin in either case.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        tracing::debug!("No configuration file found, using defaults");
        Self::default()
      }
    };

    config.apply_origin_override(std::env::var(ORIGIN_ENV).ok());

    Ok(config)
  }

  /// Replace the origin when an override is given. Applied once for the
  /// environment and again for the command line, so the last one wins.
  pub fn apply_origin_override(&mut self, origin: Option<String>) {
    if let Some(origin) = origin {
      self.origin = origin;
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shellcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shellcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Resolve URLs and compile route patterns.
  pub fn settings(&self) -> Result<Settings> {
    let origin = Url::parse(&self.origin)
      .map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))?;

    let resolve = |raw: &str| {
      origin
        .join(raw)
        .map_err(|e| eyre!("Invalid URL '{}': {}", raw, e))
    };

    let precache = self
      .precache
      .iter()
      .map(|raw| resolve(raw))
      .collect::<Result<Vec<_>>>()?;
    let app_shell = resolve(&self.app_shell)?;

    let api_pattern = Regex::new(&self.routes.api)
      .map_err(|e| eyre!("Invalid API pattern '{}': {}", self.routes.api, e))?;
    let cdn_pattern = Regex::new(&self.routes.cdn)
      .map_err(|e| eyre!("Invalid CDN pattern '{}': {}", self.routes.cdn, e))?;

    if self.generations.static_name == self.generations.dynamic_name {
      return Err(eyre!(
        "Static and dynamic generations must differ (both '{}')",
        self.generations.static_name
      ));
    }

    Ok(Settings {
      origin,
      names: GenerationNames::new(
        &self.generations.static_name,
        &self.generations.dynamic_name,
      ),
      precache,
      api_pattern,
      cdn_pattern,
      app_shell,
    })
  }
}

/// Directory holding the cache database and logs.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("shellcache"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_resolve_against_origin() {
    let config = Config {
      origin: "https://budget.example/app/".to_string(),
      ..Config::default()
    };
    let settings = config.settings().unwrap();

    assert_eq!(settings.precache.len(), 6);
    assert_eq!(settings.precache[0].as_str(), "https://budget.example/app/");
    assert_eq!(
      settings.precache[1].as_str(),
      "https://budget.example/app/manifest.webmanifest"
    );
    assert_eq!(
      settings.precache[4].as_str(),
      "https://cdn.jsdelivr.net/npm/html2canvas@1.4.1/dist/html2canvas.min.js"
    );
    assert_eq!(settings.app_shell.as_str(), "https://budget.example/app/");
    assert_eq!(settings.names.static_name(), "rc-static-v2-20250928");
    assert_eq!(settings.names.dynamic_name(), "rc-dyn-v2-20250928");
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::from_yaml(
      r#"
origin: https://rc.example/
generations:
  static: rc-static-v3
precache:
  - ./
"#,
    )
    .unwrap();

    assert_eq!(config.origin, "https://rc.example/");
    assert_eq!(config.generations.static_name, "rc-static-v3");
    assert_eq!(config.generations.dynamic_name, "rc-dyn-v2-20250928");
    assert_eq!(config.precache, vec!["./".to_string()]);
    assert_eq!(config.routes.api, DEFAULT_API_PATTERN);
  }

  #[test]
  fn test_invalid_pattern_is_rejected() {
    let mut config = Config::default();
    config.routes.cdn = "(unclosed".to_string();
    assert!(config.settings().is_err());
  }

  #[test]
  fn test_identical_generation_names_rejected() {
    let mut config = Config::default();
    config.generations.dynamic_name = config.generations.static_name.clone();
    assert!(config.settings().is_err());
  }

  #[test]
  fn test_origin_override_precedence() {
    let mut config = Config::from_yaml("origin: https://file.example/\n").unwrap();

    config.apply_origin_override(None);
    assert_eq!(config.origin, "https://file.example/");

    // environment over file
    config.apply_origin_override(Some("https://env.example/".to_string()));
    assert_eq!(config.origin, "https://env.example/");

    // command line over environment
    config.apply_origin_override(Some("https://cli.example/".to_string()));
    assert_eq!(config.origin, "https://cli.example/");

    config.apply_origin_override(None);
    assert_eq!(config.origin, "https://cli.example/");
  }

  #[test]
  fn test_load_explicit_path() {
    let path = std::env::temp_dir().join(format!("shellcache-{}.yaml", std::process::id()));
    std::fs::write(
      &path,
      "generations:\n  static: rc-static-v9\n  dynamic: rc-dyn-v9\nprecache:\n  - ./\n",
    )
    .unwrap();

    let loaded = Config::load(Some(&path));
    std::fs::remove_file(&path).unwrap();
    let config = loaded.unwrap();

    assert_eq!(config.generations.static_name, "rc-static-v9");
    assert_eq!(config.generations.dynamic_name, "rc-dyn-v9");
    assert_eq!(config.precache, vec!["./".to_string()]);
    match std::env::var(ORIGIN_ENV) {
      Ok(origin) => assert_eq!(config.origin, origin),
      Err(_) => assert_eq!(config.origin, DEFAULT_ORIGIN),
    }
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let result = Config::load(Some(Path::new("/nonexistent/shellcache.yaml")));
    assert!(result.is_err());
  }
}
