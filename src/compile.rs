//! Endpoint list → clap command tree
//!
//! The compiler owns the whole user-visible command surface: grouping by
//! tag, deterministic command naming, positional path arguments, typed
//! parameter flags with schema defaults, and the fixed request-shaping
//! flags every leaf carries. Registration failures skip the offending flag
//! or command and never abort sibling commands.

use clap::{Arg, ArgAction, Command};
use log::warn;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::endpoint::{Endpoint, Location, Parameter};
use crate::schema::Schema;

/// Flag names owned by the CLI layer. A description parameter that collides
/// with one of these is skipped at plan time.
pub const RESERVED_FLAGS: &[&str] = &[
    "data",
    "header",
    "query",
    "form",
    "auth",
    "content-type",
    "config",
    "output",
    "log-level",
    "save",
    "extract",
    "filter",
    "verbose",
    "dry-run",
    "help",
    "version",
];

/// Derive the command token for an endpoint.
///
/// The operationId is used verbatim when present. Otherwise the name is
/// synthesized as `lower(method) + "-" + path` with slashes turned into
/// hyphens and the leading hyphen stripped: `GET /pets/{id}` becomes
/// `get-pets-{id}`. Existing configs depend on this exact synthesis.
pub fn command_name(endpoint: &Endpoint) -> String {
    if !endpoint.operation_id.is_empty() {
        return endpoint.operation_id.clone();
    }
    let path = endpoint.path.replace('/', "-");
    let path = path.trim_start_matches('-');
    format!("{}-{}", endpoint.method.as_str().to_lowercase(), path)
}

/// Path-location parameters in declaration order. These become the leaf's
/// positional arguments and bind to `{name}` placeholders by name.
pub fn path_params(endpoint: &Endpoint) -> Vec<&Parameter> {
    endpoint
        .parameters
        .iter()
        .filter(|p| p.location == Location::Path)
        .collect()
}

/// The flag kind a parameter schema maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    Str,
    Int,
    Bool,
    List,
}

fn flag_kind(schema: Option<&Schema>) -> FlagKind {
    match schema.map(|s| s.schema_type.as_str()) {
        Some("integer") | Some("number") => FlagKind::Int,
        Some("boolean") => FlagKind::Bool,
        Some("array") => FlagKind::List,
        _ => FlagKind::Str,
    }
}

/// A schema default, resolved into a tagged value once at plan time so
/// nothing downstream re-inspects dynamic JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    StrList(Vec<String>),
}

impl DefaultValue {
    pub fn from_json(value: &Value) -> Option<DefaultValue> {
        match value {
            Value::String(s) => Some(DefaultValue::Str(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(DefaultValue::Int(i))
                } else {
                    n.as_f64().map(DefaultValue::Float)
                }
            }
            Value::Bool(b) => Some(DefaultValue::Bool(*b)),
            Value::Array(items) => Some(DefaultValue::StrList(
                items
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            )),
            _ => None,
        }
    }
}

/// Plan for one generated flag.
#[derive(Debug, Clone)]
pub struct FlagSpec {
    pub name: String,
    pub location: Location,
    pub kind: FlagKind,
    pub default: Option<DefaultValue>,
    pub required: bool,
    pub help: String,
}

impl FlagSpec {
    /// The default value as it will be registered with clap, rendered for
    /// this flag's kind. Float defaults truncate for integer flags; boolean
    /// flags are presence-only and cannot carry one.
    pub fn rendered_default(&self) -> Option<String> {
        let default = self.default.as_ref()?;
        match (self.kind, default) {
            (FlagKind::Int, DefaultValue::Int(i)) => Some(i.to_string()),
            (FlagKind::Int, DefaultValue::Float(f)) => Some((*f as i64).to_string()),
            (FlagKind::Str, DefaultValue::Str(s)) => Some(s.clone()),
            (FlagKind::Str, DefaultValue::Int(i)) => Some(i.to_string()),
            (FlagKind::Str, DefaultValue::Float(f)) => Some(f.to_string()),
            (FlagKind::Str, DefaultValue::Bool(b)) => Some(b.to_string()),
            _ => None,
        }
    }

    fn list_defaults(&self) -> Option<&[String]> {
        match (self.kind, self.default.as_ref()?) {
            (FlagKind::List, DefaultValue::StrList(items)) => Some(items),
            _ => None,
        }
    }
}

/// Derive the flag set for an endpoint's non-path parameters.
///
/// Shared by registration and request building so both sides agree on
/// exactly which flags exist. Collisions resolve first-seen wins: a later
/// parameter whose name matches a reserved flag, a path parameter, or an
/// earlier flag is skipped with a log.
pub fn flag_plan(endpoint: &Endpoint) -> Vec<FlagSpec> {
    let mut taken: Vec<&str> = RESERVED_FLAGS.to_vec();
    for p in path_params(endpoint) {
        taken.push(p.name.as_str());
    }

    let mut plan: Vec<FlagSpec> = Vec::new();
    for param in &endpoint.parameters {
        if param.location == Location::Path {
            continue;
        }
        if taken.iter().any(|t| *t == param.name) {
            warn!(
                "skipping flag {} on {} {}: name already taken",
                param.name, endpoint.method, endpoint.path
            );
            continue;
        }
        if plan.iter().any(|f| f.name == param.name) {
            warn!(
                "skipping duplicate flag {} on {} {}",
                param.name, endpoint.method, endpoint.path
            );
            continue;
        }

        let kind = flag_kind(param.schema.as_ref());
        let default = param
            .schema
            .as_ref()
            .and_then(|s| s.default.as_ref())
            .and_then(DefaultValue::from_json);
        if kind == FlagKind::Bool && matches!(default, Some(DefaultValue::Bool(true))) {
            warn!(
                "boolean parameter {} on {} {} defaults to true; presence flags cannot express that",
                param.name, endpoint.method, endpoint.path
            );
        }

        plan.push(FlagSpec {
            name: param.name.clone(),
            location: param.location,
            kind,
            default,
            required: param.required,
            help: param.description.clone(),
        });
    }

    plan
}

/// Partition non-deprecated endpoints by their first tag ("default" when
/// untagged). Deprecated endpoints are absent from the result entirely.
pub fn group_endpoints(endpoints: &[Endpoint]) -> BTreeMap<String, Vec<&Endpoint>> {
    let mut groups: BTreeMap<String, Vec<&Endpoint>> = BTreeMap::new();
    for endpoint in endpoints {
        if endpoint.deprecated {
            continue;
        }
        groups
            .entry(endpoint.group().to_string())
            .or_default()
            .push(endpoint);
    }
    groups
}

/// Build the command subtree for one API: API node → tag nodes → leaves.
pub fn build_api_command(api_name: &str, base_url: &str, endpoints: &[Endpoint]) -> Command {
    let mut api_cmd = Command::new(api_name.to_string())
        .about(format!("Commands for the {api_name} API"))
        .long_about(format!("Commands for the {api_name} API at {base_url}"))
        .subcommand_required(true)
        .arg_required_else_help(true);

    for (tag, group) in group_endpoints(endpoints) {
        let mut tag_cmd = Command::new(tag.clone())
            .about(format!("Commands for {tag}"))
            .subcommand_required(true)
            .arg_required_else_help(true);
        let mut seen: Vec<String> = Vec::new();
        for endpoint in group {
            let name = command_name(endpoint);
            if seen.contains(&name) {
                warn!(
                    "skipping {} {}: command name {name} already taken under tag {tag}",
                    endpoint.method, endpoint.path
                );
                continue;
            }
            seen.push(name);
            tag_cmd = tag_cmd.subcommand(build_endpoint_command(endpoint));
        }
        api_cmd = api_cmd.subcommand(tag_cmd);
    }

    api_cmd
}

/// Build one leaf command: positional path args, the fixed request flags,
/// then the schema-derived parameter flags.
pub fn build_endpoint_command(endpoint: &Endpoint) -> Command {
    let mut cmd = Command::new(command_name(endpoint));
    if !endpoint.summary.is_empty() {
        cmd = cmd.about(endpoint.summary.clone());
    }
    if !endpoint.description.is_empty() {
        cmd = cmd.long_about(endpoint.description.clone());
    }

    for param in path_params(endpoint) {
        if RESERVED_FLAGS.contains(&param.name.as_str()) {
            warn!(
                "skipping path argument {} on {} {}: name is reserved",
                param.name, endpoint.method, endpoint.path
            );
            continue;
        }
        cmd = cmd.arg(
            Arg::new(param.name.clone())
                .help(param.description.clone())
                .required(true),
        );
    }

    cmd = add_request_flags(cmd);

    for spec in flag_plan(endpoint) {
        cmd = register_flag(cmd, &spec);
    }

    cmd
}

/// The fixed request-shaping flags every leaf carries, independent of the
/// description.
pub fn add_request_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("data")
            .long("data")
            .short('d')
            .value_name("JSON")
            .help("Request body data (JSON string or @file)"),
    )
    .arg(
        Arg::new("header")
            .long("header")
            .short('H')
            .value_name("KEY:VALUE")
            .action(ArgAction::Append)
            .help("Request header (repeatable)"),
    )
    .arg(
        Arg::new("query")
            .long("query")
            .short('q')
            .value_name("KEY=VALUE")
            .action(ArgAction::Append)
            .help("Query parameter (repeatable)"),
    )
    .arg(
        Arg::new("form")
            .long("form")
            .short('F')
            .value_name("KEY=VALUE")
            .action(ArgAction::Append)
            .help("Form field (key=value or key=@file, repeatable)"),
    )
    .arg(
        Arg::new("auth")
            .long("auth")
            .short('a')
            .value_name("AUTH")
            .help("Authentication (username:password, Bearer token, or API key)"),
    )
    .arg(
        Arg::new("content-type")
            .long("content-type")
            .short('t')
            .value_name("TYPE")
            .help("Content type"),
    )
}

fn register_flag(cmd: Command, spec: &FlagSpec) -> Command {
    let mut arg = Arg::new(spec.name.clone())
        .long(spec.name.clone())
        .help(spec.help.clone());

    match spec.kind {
        FlagKind::Bool => {
            arg = arg.action(ArgAction::SetTrue);
        }
        FlagKind::Int => {
            arg = arg
                .action(ArgAction::Set)
                .value_name("INT")
                .value_parser(clap::value_parser!(i64));
        }
        FlagKind::List => {
            arg = arg.action(ArgAction::Append).value_name("VALUE");
        }
        FlagKind::Str => {
            arg = arg.action(ArgAction::Set).value_name("VALUE");
        }
    }

    let mut has_default = false;
    if let Some(default) = spec.rendered_default() {
        arg = arg.default_value(default);
        has_default = true;
    } else if let Some(items) = spec.list_defaults() {
        arg = arg.default_values(items.to_vec());
        has_default = true;
    }

    if spec.required && !has_default && spec.kind != FlagKind::Bool {
        arg = arg.required(true);
    }

    cmd.arg(arg)
}

/// Resolve a dispatched (tag, command) pair back to its endpoint.
pub fn find_endpoint<'a>(
    endpoints: &'a [Endpoint],
    tag: &str,
    name: &str,
) -> Option<&'a Endpoint> {
    endpoints
        .iter()
        .find(|e| !e.deprecated && e.group() == tag && command_name(e) == name)
}
