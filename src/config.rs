use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Base URL of the journal server.
  pub url: String,
  /// Path prefix of the reflections API (routed network-first).
  #[serde(default = "default_api_prefix")]
  pub api_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Cache version tag. Bumping it installs a fresh generation and purges
  /// the old one on activation.
  #[serde(default = "default_version")]
  pub version: String,
  /// App shell paths pre-cached at install.
  #[serde(default = "default_shell")]
  pub shell: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: default_version(),
      shell: default_shell(),
    }
  }
}

fn default_api_prefix() -> String {
  "/api/reflections".to_string()
}

fn default_version() -> String {
  "v1".to_string()
}

fn default_shell() -> Vec<String> {
  [
    "/",
    "/journal",
    "/about",
    "/projects",
    "/static/css/style.css",
    "/static/js/script.js",
    "/static/manifest.json",
  ]
  .into_iter()
  .map(String::from)
  .collect()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./refls.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/refls/config.yaml
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/refls/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("refls.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("refls").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Parsed server base URL.
  pub fn base_url(&self) -> Result<Url> {
    Url::parse(&self.server.url)
      .map_err(|e| eyre!("Invalid server url '{}': {}", self.server.url, e))
  }

  /// Name of the cache generation this configuration describes.
  pub fn generation(&self) -> String {
    format!("refls-cache-{}", self.cache.version)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_a_full_config() {
    let yaml = r#"
server:
  url: "http://localhost:5000"
  api_prefix: "/api/reflections"
cache:
  version: "v2"
  shell:
    - "/"
    - "/journal"
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(config.server.url, "http://localhost:5000");
    assert_eq!(config.generation(), "refls-cache-v2");
    assert_eq!(config.cache.shell, vec!["/", "/journal"]);
    assert_eq!(config.base_url().unwrap().as_str(), "http://localhost:5000/");
  }

  #[test]
  fn missing_sections_fall_back_to_defaults() {
    let yaml = r#"
server:
  url: "http://localhost:5000"
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(config.server.api_prefix, "/api/reflections");
    assert_eq!(config.generation(), "refls-cache-v1");
    assert!(config.cache.shell.contains(&"/journal".to_string()));
  }

  #[test]
  fn rejects_a_bad_base_url() {
    let yaml = r#"
server:
  url: "not a url"
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert!(config.base_url().is_err());
  }
}
