//! Parsed matches + endpoint → request descriptor
//!
//! Everything about an outbound call is resolved here, before any network
//! code runs: path placeholders, merged query parameters, merged headers,
//! body mode, and authentication. The result is a plain `RequestSpec` the
//! HTTP client can send (or, on dry-run, only log).

use std::fs;

use clap::parser::ValueSource;
use clap::ArgMatches;
use log::warn;
use serde_json::Value;

use crate::compile::{flag_plan, path_params, FlagKind};
use crate::config::ApiConfig;
use crate::endpoint::{Endpoint, Location, Method};
use crate::error::Error;

/// Resolved authentication for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Auth {
    Basic { username: String, password: String },
    /// Used verbatim as the Authorization header value ("Bearer ..." /
    /// "Basic ...").
    Verbatim(String),
    /// Bare token sent in a configurable header.
    ApiKey { header: String, key: String },
}

impl Auth {
    /// Interpret an auth string. A string containing `:` is
    /// username:password; a `Bearer ` or `Basic ` prefix is used verbatim;
    /// anything else is an API key for `api_key_header`.
    pub fn parse(auth: &str, api_key_header: &str) -> Option<Auth> {
        if auth.is_empty() {
            return None;
        }
        if let Some((username, password)) = auth.split_once(':') {
            return Some(Auth::Basic {
                username: username.to_string(),
                password: password.to_string(),
            });
        }
        if auth.starts_with("Bearer ") || auth.starts_with("Basic ") {
            return Some(Auth::Verbatim(auth.to_string()));
        }
        Some(Auth::ApiKey {
            header: api_key_header.to_string(),
            key: auth.to_string(),
        })
    }
}

/// Request body mode. JSON and form data are mutually exclusive; when both
/// flags are supplied, form data wins.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyData {
    None,
    Json(Value),
    Form {
        fields: Vec<(String, String)>,
        files: Vec<(String, String)>,
    },
}

/// A fully-resolved outbound request.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: BodyData,
    pub auth: Option<Auth>,
    pub dry_run: bool,
}

/// Build the request descriptor for one invocation.
pub fn build_request(
    endpoint: &Endpoint,
    config: &ApiConfig,
    matches: &ArgMatches,
    dry_run: bool,
) -> Result<RequestSpec, Error> {
    let path = resolve_path(endpoint, matches);
    let url = format!("{}{}", config.url.trim_end_matches('/'), path);

    let (mut query, declared_headers, cookies) = declared_values(endpoint, matches);

    // Free-form --query overrides layer on top, additively.
    if let Some(overrides) = matches.get_many::<String>("query") {
        for raw in overrides {
            let (key, value) = raw
                .split_once('=')
                .ok_or_else(|| Error::InvalidQuery(raw.clone()))?;
            query.push((key.to_string(), value.to_string()));
        }
    }

    // Header precedence: api-config defaults < declared header params <
    // --header flags < explicit --content-type.
    let mut headers: Vec<(String, String)> = Vec::new();
    for (key, value) in &config.headers {
        set_header(&mut headers, key, value);
    }
    for (key, value) in &declared_headers {
        set_header(&mut headers, key, value);
    }
    if !cookies.is_empty() {
        let joined = cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        set_header(&mut headers, "Cookie", &joined);
    }
    if let Some(raw_headers) = matches.get_many::<String>("header") {
        for raw in raw_headers {
            let (key, value) = raw
                .split_once(':')
                .ok_or_else(|| Error::InvalidHeader(raw.clone()))?;
            set_header(&mut headers, key.trim(), value.trim());
        }
    }
    if let Some(content_type) = matches.get_one::<String>("content-type") {
        if !content_type.is_empty() {
            set_header(&mut headers, "Content-Type", content_type);
        }
    }

    let body = build_body(matches)?;

    let auth_str = matches
        .get_one::<String>("auth")
        .filter(|s| !s.is_empty())
        .cloned()
        .unwrap_or_else(|| config.auth.clone());
    let auth = Auth::parse(&auth_str, &config.api_key_header);

    Ok(RequestSpec {
        method: endpoint.method,
        url,
        query,
        headers,
        body,
        auth,
        dry_run,
    })
}

/// Substitute `{name}` placeholders by name, URL-encoding the bound values.
/// Placeholder-name substitution is the sole binding mechanism; the i-th
/// positional argument is the i-th declared path parameter only because
/// clap registered it that way.
fn resolve_path(endpoint: &Endpoint, matches: &ArgMatches) -> String {
    let mut path = endpoint.path.clone();
    for param in path_params(endpoint) {
        if crate::compile::RESERVED_FLAGS.contains(&param.name.as_str()) {
            continue;
        }
        let Some(value) = matches.get_one::<String>(&param.name) else {
            continue;
        };
        let placeholder = format!("{{{}}}", param.name);
        path = path.replace(&placeholder, &urlencoding::encode(value));
    }
    if path.contains('{') {
        warn!(
            "path {} still contains placeholders after binding: {}",
            endpoint.path, path
        );
    }
    path
}

/// Collect declared parameter values from their generated flags, split by
/// destination. A parameter is included when the user supplied its flag or
/// when the schema carried a default; presence (boolean) flags are included
/// only when set.
#[allow(clippy::type_complexity)]
fn declared_values(
    endpoint: &Endpoint,
    matches: &ArgMatches,
) -> (
    Vec<(String, String)>,
    Vec<(String, String)>,
    Vec<(String, String)>,
) {
    let mut query = Vec::new();
    let mut headers = Vec::new();
    let mut cookies = Vec::new();

    for spec in flag_plan(endpoint) {
        let supplied =
            matches.value_source(&spec.name) == Some(ValueSource::CommandLine);
        let include = supplied || spec.default.is_some();

        let mut values: Vec<String> = Vec::new();
        match spec.kind {
            FlagKind::Bool => {
                if matches.get_flag(&spec.name) {
                    values.push("true".to_string());
                }
            }
            FlagKind::Int => {
                if include {
                    if let Some(v) = matches.get_one::<i64>(&spec.name) {
                        values.push(v.to_string());
                    }
                }
            }
            FlagKind::Str => {
                if include {
                    if let Some(v) = matches.get_one::<String>(&spec.name) {
                        values.push(v.clone());
                    }
                }
            }
            FlagKind::List => {
                if include {
                    if let Some(many) = matches.get_many::<String>(&spec.name) {
                        values.extend(many.cloned());
                    }
                }
            }
        }

        let dest = match spec.location {
            Location::Query => &mut query,
            Location::Header => &mut headers,
            Location::Cookie => &mut cookies,
            Location::Path => continue,
        };
        for value in values {
            dest.push((spec.name.clone(), value));
        }
    }

    (query, headers, cookies)
}

/// Insert or replace a header, case-insensitively, so later merge layers win.
fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    if let Some(existing) = headers
        .iter_mut()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
    {
        existing.1 = value.to_string();
    } else {
        headers.push((name.to_string(), value.to_string()));
    }
}

/// Resolve the body from `--form` / `--data`. Form data wins when both are
/// present.
fn build_body(matches: &ArgMatches) -> Result<BodyData, Error> {
    let form_values: Vec<String> = matches
        .get_many::<String>("form")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();

    if !form_values.is_empty() {
        if matches.get_one::<String>("data").is_some() {
            warn!("both --data and --form supplied; using form data");
        }
        let mut fields = Vec::new();
        let mut files = Vec::new();
        for raw in &form_values {
            let (key, value) = raw
                .split_once('=')
                .ok_or_else(|| Error::InvalidForm(raw.clone()))?;
            match value.strip_prefix('@') {
                Some(path) => files.push((key.to_string(), path.to_string())),
                None => fields.push((key.to_string(), value.to_string())),
            }
        }
        return Ok(BodyData::Form { fields, files });
    }

    let Some(data) = matches.get_one::<String>("data") else {
        return Ok(BodyData::None);
    };
    let raw = match data.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).map_err(|source| Error::DataFileRead {
            path: path.to_string(),
            source,
        })?,
        None => data.clone(),
    };
    let value: Value = serde_json::from_str(&raw).map_err(Error::InvalidBody)?;
    Ok(BodyData::Json(value))
}
