//! Turn OpenAPI 3.x specs into a runnable CLI.
//!
//! Loads the specs named in a YAML config (through a TTL file cache),
//! extracts operations into a flat endpoint list, compiles a clap `Command`
//! tree grouped by tag, and dispatches HTTP requests with a small response
//! pipeline (decode, extract, filter, format).
//!
//! # Usage
//!
//! ```no_run
//! use apitap::{build_api_command, extract_endpoints};
//!
//! let spec_json = r#"{"openapi":"3.0.0","paths":{}}"#;
//! let doc: serde_json::Value = serde_json::from_str(spec_json).unwrap();
//! let endpoints = extract_endpoints(&doc).unwrap();
//!
//! let cmd = build_api_command("myapi", "https://api.example.com", &endpoints);
//! ```

pub mod cache;
pub mod cli;
pub mod client;
pub mod compile;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod extract;
pub mod output;
pub mod provider;
pub mod request;
pub mod schema;

pub use cache::{cache_key, CacheEntry, CacheStore};
pub use cli::run;
pub use client::{HttpClient, HttpResponse, DEFAULT_TIMEOUT};
pub use compile::{
    build_api_command, build_endpoint_command, command_name, find_endpoint, flag_plan,
    DefaultValue, FlagKind, FlagSpec, RESERVED_FLAGS,
};
pub use config::{ApiConfig, Config};
pub use endpoint::{Endpoint, Location, Method, Parameter};
pub use error::Error;
pub use extract::extract_endpoints;
pub use output::{decode_body, extract_fields, filter_value, format_value, Format};
pub use provider::{load_spec, SpecProvider, SpecVersion};
pub use request::{build_request, Auth, BodyData, RequestSpec};
pub use schema::{translate_schema, Schema};

// Re-export dependencies for downstream crates
pub use clap;
pub use reqwest;
