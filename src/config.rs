//! CLI configuration
//!
//! A YAML file mapping API names to their spec location, base URL, auth,
//! cache TTL, and default headers. The config is loaded once at startup and
//! threaded through tree-build and invocation; nothing reads it through
//! globals.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Top-level configuration: named APIs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub apis: BTreeMap<String, ApiConfig>,
}

/// Configuration for a single API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Path or URL of the OpenAPI spec.
    #[serde(rename = "apispec")]
    pub spec: String,
    /// Base URL requests resolve against.
    #[serde(default)]
    pub url: String,
    /// Default auth string: "user:password", "Bearer token", or a bare API key.
    #[serde(default)]
    pub auth: String,
    /// Time-to-live for the cached spec, e.g. "24h", "30m".
    #[serde(default = "default_ttl", with = "ttl_string")]
    pub cache_ttl: Duration,
    /// Default output format for this API.
    #[serde(default = "default_output", rename = "output")]
    pub default_output: String,
    /// Headers sent with every request to this API.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Header used when the auth string is a bare API key.
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            spec: String::new(),
            url: String::new(),
            auth: String::new(),
            cache_ttl: DEFAULT_CACHE_TTL,
            default_output: default_output(),
            headers: BTreeMap::new(),
            api_key_header: default_api_key_header(),
        }
    }
}

fn default_ttl() -> Duration {
    DEFAULT_CACHE_TTL
}

fn default_output() -> String {
    "json".to_string()
}

fn default_api_key_header() -> String {
    DEFAULT_API_KEY_HEADER.to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, Error> {
        let raw = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| Error::ConfigParse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| Error::ConfigWrite {
                path: path.display().to_string(),
                source,
            })?;
        }
        let raw = serde_yaml::to_string(self).map_err(Error::ConfigSerialize)?;
        fs::write(path, raw).map_err(|source| Error::ConfigWrite {
            path: path.display().to_string(),
            source,
        })?;
        info!("config saved to {}", path.display());
        Ok(())
    }
}

/// Resolve the config path: `$APITAP_CONFIG`, then
/// `$HOME/.config/apitap/config.yaml`, then the working directory.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("APITAP_CONFIG") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            return Path::new(&home)
                .join(".config")
                .join("apitap")
                .join(DEFAULT_CONFIG_FILE);
        }
    }
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

/// Write a commented starter config for `init`.
pub fn write_starter_config(path: &Path, force: bool) -> Result<(), Error> {
    if path.exists() && !force {
        return Err(Error::ConfigExists(path.display().to_string()));
    }
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| Error::ConfigWrite {
            path: path.display().to_string(),
            source,
        })?;
    }
    fs::write(path, STARTER_CONFIG).map_err(|source| Error::ConfigWrite {
        path: path.display().to_string(),
        source,
    })?;
    info!("created config at {}", path.display());
    Ok(())
}

const STARTER_CONFIG: &str = "\
apis:
  petstore:
    apispec: https://petstore3.swagger.io/api/v3/openapi.json
    url: https://petstore3.swagger.io/api/v3
    # auth: \"Bearer <token>\"      # or \"user:password\", or a bare API key
    # api_key_header: X-API-Key    # header used for bare API keys
    cache_ttl: 24h
    output: json
    # headers:
    #   X-Client: apitap
";

/// Parse duration strings like "24h", "30m", "90s", "7d". A bare integer is
/// taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, Error> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidDuration(s.to_string()));
    }
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::InvalidDuration(s.to_string()))?;
    let secs = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 60 * 60,
        "d" => value * 60 * 60 * 24,
        _ => return Err(Error::InvalidDuration(s.to_string())),
    };
    Ok(Duration::from_secs(secs))
}

/// Render a duration in the largest unit that divides it evenly.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs > 0 && secs % (60 * 60 * 24) == 0 {
        format!("{}d", secs / (60 * 60 * 24))
    } else if secs > 0 && secs % (60 * 60) == 0 {
        format!("{}h", secs / (60 * 60))
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

mod ttl_string {
    use super::{format_duration, parse_duration};
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "apitap-config-test-{}-{}",
            std::process::id(),
            name
        ));
        fs::create_dir_all(&dir).unwrap();
        dir.join(DEFAULT_CONFIG_FILE)
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(604800));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("h24").is_err());
        assert!(parse_duration("10w").is_err());
    }

    #[test]
    fn format_duration_picks_largest_even_unit() {
        assert_eq!(format_duration(Duration::from_secs(86400)), "1d");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
    }

    #[test]
    fn config_parses_yaml_with_defaults() {
        let yaml = "\
apis:
  petstore:
    apispec: ./petstore.json
    url: https://example.com/v3
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let api = &config.apis["petstore"];
        assert_eq!(api.spec, "./petstore.json");
        assert_eq!(api.url, "https://example.com/v3");
        assert_eq!(api.cache_ttl, DEFAULT_CACHE_TTL);
        assert_eq!(api.default_output, "json");
        assert_eq!(api.api_key_header, DEFAULT_API_KEY_HEADER);
        assert!(api.headers.is_empty());
    }

    #[test]
    fn config_parses_explicit_fields() {
        let yaml = "\
apis:
  internal:
    apispec: https://internal/openapi.yaml
    url: https://internal/api
    auth: \"user:pass\"
    cache_ttl: 30m
    output: yaml
    api_key_header: X-Internal-Key
    headers:
      X-Team: platform
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let api = &config.apis["internal"];
        assert_eq!(api.auth, "user:pass");
        assert_eq!(api.cache_ttl, Duration::from_secs(1800));
        assert_eq!(api.default_output, "yaml");
        assert_eq!(api.api_key_header, "X-Internal-Key");
        assert_eq!(api.headers["X-Team"], "platform");
    }

    #[test]
    fn config_save_and_load_roundtrip() {
        let path = temp_path("roundtrip");
        let mut config = Config::default();
        config.apis.insert(
            "demo".to_string(),
            ApiConfig {
                spec: "./demo.json".to_string(),
                url: "https://demo".to_string(),
                cache_ttl: Duration::from_secs(3600),
                ..ApiConfig::default()
            },
        );
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.apis["demo"].spec, "./demo.json");
        assert_eq!(loaded.apis["demo"].cache_ttl, Duration::from_secs(3600));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn config_load_missing_file_is_an_error() {
        let err = Config::load(Path::new("/nonexistent/apitap/config.yaml")).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }

    #[test]
    fn starter_config_refuses_overwrite_without_force() {
        let path = temp_path("starter");
        write_starter_config(&path, true).unwrap();
        assert!(write_starter_config(&path, false).is_err());
        assert!(write_starter_config(&path, true).is_ok());

        // The starter template is itself a loadable config.
        let config = Config::load(&path).unwrap();
        assert!(config.apis.contains_key("petstore"));
        fs::remove_file(&path).ok();
    }
}
