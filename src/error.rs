//! Error types for the apitap crate.

use thiserror::Error;

/// Errors that can occur while building the command tree or invoking a command.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid OpenAPI document: {0}")]
    InvalidDocument(String),

    #[error("unsupported OpenAPI version: {0}")]
    UnsupportedVersion(String),

    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("path not found: no {segment:?} at this step of {path:?}")]
    PathNotFound { path: String, segment: String },

    #[error("invalid --header format: {0} (expected key:value)")]
    InvalidHeader(String),

    #[error("invalid --query format: {0} (expected key=value)")]
    InvalidQuery(String),

    #[error("invalid --form format: {0} (expected key=value or key=@file)")]
    InvalidForm(String),

    #[error("invalid JSON in --data argument")]
    InvalidBody(#[source] serde_json::Error),

    #[error("failed to read data file: {path}")]
    DataFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load config: {path}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to write config: {path}")]
    ConfigWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config file already exists: {0} (use --force to overwrite)")]
    ConfigExists(String),

    #[error("failed to serialize config")]
    ConfigSerialize(#[source] serde_yaml::Error),

    #[error("invalid duration: {0} (expected forms like 24h, 30m, 90s, 7d)")]
    InvalidDuration(String),

    #[error("cache I/O failure")]
    Cache(#[source] std::io::Error),

    #[error("failed to read spec from {location}")]
    SpecRead {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch spec from {location}")]
    SpecFetch {
        location: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to parse spec from {0} (not valid JSON or YAML)")]
    SpecParse(String),

    #[error("HTTP request failed")]
    RequestFailed(#[source] reqwest::Error),

    #[error("failed to read response body")]
    ResponseRead(#[source] reqwest::Error),

    #[error("failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("failed to attach form file: {path}")]
    FormFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize output")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write output: {path}")]
    OutputWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
