//! Root command assembly and dispatch
//!
//! Builds the full command tree at startup (static `init`/`refresh`
//! commands plus one dynamic subtree per configured API), then routes the
//! parsed invocation to the request pipeline. This is the invocation
//! boundary: the only place user-facing errors surface and exit codes are
//! chosen.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{error, info, warn};

use crate::cache;
use crate::client::{HttpClient, DEFAULT_TIMEOUT};
use crate::compile::{build_api_command, find_endpoint};
use crate::config::{self, ApiConfig, Config};
use crate::endpoint::Endpoint;
use crate::extract::extract_endpoints;
use crate::output::{decode_body, extract_fields, filter_value, format_value, write_output, Format};
use crate::provider::SpecProvider;
use crate::request::build_request;

/// Subcommand names owned by the CLI itself; an API cannot shadow them.
const STATIC_COMMANDS: &[&str] = &["init", "refresh", "help"];

/// Everything an invocation needs, threaded explicitly instead of living in
/// globals.
pub struct AppContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub provider: SpecProvider,
}

/// One API whose spec loaded successfully at startup.
pub struct LoadedApi {
    pub name: String,
    pub config: ApiConfig,
    pub endpoints: Vec<Endpoint>,
}

/// Entry point: build the tree, parse, dispatch.
pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let log_level =
        preparse_flag(&args, "--log-level", Some("-l")).unwrap_or_else(|| "info".to_string());
    init_logging(&log_level);

    let config_path = preparse_flag(&args, "--config", Some("-c"))
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path);

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            info!("no configuration loaded ({err}); run 'apitap init' to create one");
            Config::default()
        }
    };

    let provider = SpecProvider::new(cache::default_cache_dir()).context("create spec cache")?;
    provider.clear_cache_if_requested();

    let ctx = AppContext {
        config,
        config_path,
        provider,
    };

    let apis = load_apis(&ctx);
    let matches = build_root(&apis).get_matches_from(args);
    dispatch(&ctx, &apis, &matches)
}

/// Load every configured API's spec, serially, in name order. A spec that
/// fails to load or extract skips that API and never aborts its siblings.
pub fn load_apis(ctx: &AppContext) -> Vec<LoadedApi> {
    let mut apis = Vec::new();
    for (name, api_config) in &ctx.config.apis {
        let spec = match ctx.provider.get_spec(&api_config.spec, api_config.cache_ttl) {
            Ok(spec) => spec,
            Err(err) => {
                error!("skipping API {name}: {err}");
                continue;
            }
        };
        let endpoints = match extract_endpoints(&spec) {
            Ok(endpoints) => endpoints,
            Err(err) => {
                error!("skipping API {name}: {err}");
                continue;
            }
        };
        info!("loaded {} endpoints for API {name}", endpoints.len());
        apis.push(LoadedApi {
            name: name.clone(),
            config: api_config.clone(),
            endpoints,
        });
    }
    apis
}

/// Assemble the root command: global flags, static commands, and one
/// subtree per loaded API.
pub fn build_root(apis: &[LoadedApi]) -> Command {
    let mut root = Command::new("apitap")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Generate a CLI from OpenAPI specs and call the API directly")
        .long_about(
            "apitap turns the OpenAPI specs in your config into a command tree:\n\
             \n\
             \x20 apitap <api> <tag> <command> [args] [--flags]\n\
             \n\
             Run 'apitap init' to create a starter config.",
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_name("PATH")
                .help("Config file (default is $HOME/.config/apitap/config.yaml)"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .global(true)
                .default_value("json")
                .value_name("FORMAT")
                .help("Output format (json, yaml, csv, text, table)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .short('l')
                .global(true)
                .default_value("info")
                .value_name("LEVEL")
                .help("Log level (debug, info, warn, error)"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Verbose output"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Build the request but don't send it"),
        )
        .arg(
            Arg::new("save")
                .long("save")
                .global(true)
                .value_name("PATH")
                .help("Save response to file"),
        )
        .arg(
            Arg::new("extract")
                .long("extract")
                .global(true)
                .value_name("FIELDS")
                .help("Extract fields from the response (comma-separated dot paths)"),
        )
        .arg(
            Arg::new("filter")
                .long("filter")
                .global(true)
                .value_name("PATH")
                .help("Filter the response through one dot path"),
        )
        .subcommand(
            Command::new("init")
                .about("Write a starter configuration file")
                .arg(
                    Arg::new("force")
                        .long("force")
                        .short('f')
                        .action(ArgAction::SetTrue)
                        .help("Overwrite an existing config file"),
                ),
        )
        .subcommand(
            Command::new("refresh")
                .about("Refresh cached OpenAPI specs for one or all APIs")
                .arg(Arg::new("api").value_name("API").help("API name (all when omitted)")),
        );

    for api in apis {
        if STATIC_COMMANDS.contains(&api.name.as_str()) {
            error!("skipping API {}: name shadows a built-in command", api.name);
            continue;
        }
        root = root.subcommand(build_api_command(&api.name, &api.config.url, &api.endpoints));
    }

    root
}

fn dispatch(ctx: &AppContext, apis: &[LoadedApi], matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("init", sub)) => cmd_init(ctx, sub),
        Some(("refresh", sub)) => cmd_refresh(ctx, sub),
        Some((api_name, api_matches)) => {
            let api = apis
                .iter()
                .find(|a| a.name == api_name)
                .ok_or_else(|| anyhow!("unknown API: {api_name}"))?;
            let (tag, tag_matches) = api_matches
                .subcommand()
                .ok_or_else(|| anyhow!("tag required"))?;
            let (name, leaf_matches) = tag_matches
                .subcommand()
                .ok_or_else(|| anyhow!("command required"))?;
            let endpoint = find_endpoint(&api.endpoints, tag, name)
                .ok_or_else(|| anyhow!("unknown command: {api_name} {tag} {name}"))?;
            invoke(api, endpoint, leaf_matches)
        }
        None => Err(anyhow!("a command is required")),
    }
}

/// Execute one leaf command: build the request, send (or dry-run), run the
/// response pipeline, and render the result.
fn invoke(api: &LoadedApi, endpoint: &Endpoint, matches: &ArgMatches) -> Result<()> {
    let verbose = matches.get_flag("verbose");
    let dry_run = matches.get_flag("dry-run");

    let request = build_request(endpoint, &api.config, matches, dry_run)?;
    let client = HttpClient::new(DEFAULT_TIMEOUT, verbose)?;
    let response = client.execute(&request)?;

    if dry_run {
        println!("Dry run completed. No request was sent.");
        return Ok(());
    }

    if !response.is_success() {
        warn!(
            "{} {} returned HTTP {}",
            endpoint.method, request.url, response.status
        );
    }

    let mut data = decode_body(&response.body);

    if let Some(extract) = nonempty(matches, "extract") {
        let fields: Vec<String> = extract
            .split(',')
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        data = extract_fields(&data, &fields);
    }

    if let Some(filter) = nonempty(matches, "filter") {
        match filter_value(&data, &filter) {
            Ok(filtered) => data = filtered,
            Err(err) => warn!("filter not applied: {err}"),
        }
    }

    let format = Format::parse(&output_format(matches, &api.config))?;
    let bytes = format_value(&data, format)?;
    let save = nonempty(matches, "save").filter(|s| s != "-").map(PathBuf::from);
    write_output(&bytes, save.as_deref())?;
    Ok(())
}

/// The output format: an explicit `--output` wins, then the API's
/// configured default, then the flag's own default.
fn output_format(matches: &ArgMatches, api_config: &ApiConfig) -> String {
    if matches.value_source("output") == Some(ValueSource::CommandLine) {
        if let Some(format) = matches.get_one::<String>("output") {
            return format.clone();
        }
    }
    if !api_config.default_output.is_empty() {
        return api_config.default_output.clone();
    }
    matches
        .get_one::<String>("output")
        .cloned()
        .unwrap_or_else(|| "json".to_string())
}

fn nonempty(matches: &ArgMatches, name: &str) -> Option<String> {
    matches
        .get_one::<String>(name)
        .filter(|s| !s.is_empty())
        .cloned()
}

fn cmd_init(ctx: &AppContext, matches: &ArgMatches) -> Result<()> {
    let force = matches.get_flag("force");
    config::write_starter_config(&ctx.config_path, force)?;
    println!(
        "Created {}. Edit it to add your API specs.",
        ctx.config_path.display()
    );
    Ok(())
}

fn cmd_refresh(ctx: &AppContext, matches: &ArgMatches) -> Result<()> {
    if let Some(name) = matches.get_one::<String>("api") {
        let api_config = ctx
            .config
            .apis
            .get(name)
            .ok_or_else(|| anyhow!("unknown API: {name}"))?;
        ctx.provider
            .refresh_spec(&api_config.spec, api_config.cache_ttl)
            .with_context(|| format!("failed to refresh {name}"))?;
        println!("Refreshed spec for {name}.");
        return Ok(());
    }

    for (name, api_config) in &ctx.config.apis {
        match ctx
            .provider
            .refresh_spec(&api_config.spec, api_config.cache_ttl)
        {
            Ok(_) => println!("Refreshed spec for {name}."),
            Err(err) => error!("failed to refresh {name}: {err}"),
        }
    }
    Ok(())
}

/// Pull one flag value out of raw args before clap runs, so logging and
/// config can come up ahead of tree-build.
fn preparse_flag(args: &[String], long: &str, short: Option<&str>) -> Option<String> {
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix(&format!("{long}=")) {
            return Some(value.to_string());
        }
        let is_short = short.is_some_and(|s| arg == s);
        if arg == long || is_short {
            if let Some(value) = iter.peek() {
                if !value.starts_with('-') {
                    return Some((*value).clone());
                }
            }
        }
    }
    None
}

fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Location, Method, Parameter};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn make_api(name: &str, url: &str) -> LoadedApi {
        let endpoint = Endpoint {
            path: "/pets/{id}".to_string(),
            method: Method::Get,
            operation_id: "getPet".to_string(),
            summary: "Get a pet".to_string(),
            description: String::new(),
            parameters: vec![
                Parameter {
                    name: "id".to_string(),
                    location: Location::Path,
                    description: String::new(),
                    required: true,
                    deprecated: false,
                    schema: None,
                },
                Parameter {
                    name: "limit".to_string(),
                    location: Location::Query,
                    description: String::new(),
                    required: false,
                    deprecated: false,
                    schema: Some(crate::schema::translate_schema(&serde_json::json!({
                        "type": "integer", "default": 10
                    }))),
                },
            ],
            request_body: None,
            responses: BTreeMap::new(),
            tags: vec!["pets".to_string()],
            security: Vec::new(),
            deprecated: false,
        };
        LoadedApi {
            name: name.to_string(),
            config: ApiConfig {
                url: url.to_string(),
                ..ApiConfig::default()
            },
            endpoints: vec![endpoint],
        }
    }

    fn temp_ctx(name: &str) -> AppContext {
        let dir = std::env::temp_dir().join(format!(
            "apitap-cli-test-{}-{}",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        AppContext {
            config: Config::default(),
            config_path: dir.join("config.yaml"),
            provider: SpecProvider::new(dir.join("cache")).unwrap(),
        }
    }

    // -- preparse_flag --

    #[test]
    fn preparse_flag_space_and_equals_forms() {
        let a = args(&["apitap", "--config", "/tmp/c.yaml", "petstore"]);
        assert_eq!(
            preparse_flag(&a, "--config", Some("-c")),
            Some("/tmp/c.yaml".to_string())
        );

        let a = args(&["apitap", "--config=/tmp/c.yaml"]);
        assert_eq!(
            preparse_flag(&a, "--config", Some("-c")),
            Some("/tmp/c.yaml".to_string())
        );

        let a = args(&["apitap", "-c", "/tmp/c.yaml"]);
        assert_eq!(
            preparse_flag(&a, "--config", Some("-c")),
            Some("/tmp/c.yaml".to_string())
        );
    }

    #[test]
    fn preparse_flag_absent_returns_none() {
        let a = args(&["apitap", "petstore", "pets", "getPet"]);
        assert_eq!(preparse_flag(&a, "--config", Some("-c")), None);
    }

    #[test]
    fn preparse_flag_skips_flag_valued_successor() {
        let a = args(&["apitap", "--config", "--verbose"]);
        assert_eq!(preparse_flag(&a, "--config", Some("-c")), None);
    }

    // -- build_root --

    #[test]
    fn build_root_contains_static_and_api_commands() {
        let apis = vec![make_api("petstore", "https://example.com")];
        let root = build_root(&apis);
        let names: Vec<&str> = root.get_subcommands().map(|c| c.get_name()).collect();
        assert!(names.contains(&"init"));
        assert!(names.contains(&"refresh"));
        assert!(names.contains(&"petstore"));
    }

    #[test]
    fn build_root_skips_api_shadowing_builtin() {
        let apis = vec![make_api("refresh", "https://example.com")];
        let root = build_root(&apis);
        let refresh = root
            .get_subcommands()
            .find(|c| c.get_name() == "refresh")
            .unwrap();
        // The built-in refresh survives, not the API subtree.
        assert!(refresh.get_subcommands().next().is_none());
    }

    #[test]
    fn global_flags_reach_leaf_matches() {
        let apis = vec![make_api("petstore", "https://example.com")];
        let matches = build_root(&apis)
            .try_get_matches_from([
                "apitap", "petstore", "pets", "getPet", "42", "--dry-run", "--output", "yaml",
            ])
            .unwrap();

        let (_, api_matches) = matches.subcommand().unwrap();
        let (_, tag_matches) = api_matches.subcommand().unwrap();
        let (leaf, leaf_matches) = tag_matches.subcommand().unwrap();
        assert_eq!(leaf, "getPet");
        assert!(leaf_matches.get_flag("dry-run"));
        assert_eq!(leaf_matches.get_one::<String>("id").unwrap(), "42");
        assert_eq!(leaf_matches.get_one::<String>("output").unwrap(), "yaml");
    }

    // -- output_format --

    #[test]
    fn output_format_precedence() {
        let apis = vec![make_api("petstore", "https://example.com")];
        let leaf = |argv: &[&str]| {
            let matches = build_root(&apis).try_get_matches_from(argv.to_vec()).unwrap();
            let (_, api_matches) = matches.subcommand().unwrap();
            let (_, tag_matches) = api_matches.subcommand().unwrap();
            let (_, leaf_matches) = tag_matches.subcommand().unwrap();
            leaf_matches.clone()
        };

        let mut api_config = ApiConfig::default();

        // Flag default with no per-API preference.
        api_config.default_output = String::new();
        let matches = leaf(&["apitap", "petstore", "pets", "getPet", "42"]);
        assert_eq!(output_format(&matches, &api_config), "json");

        // Per-API default beats the flag default.
        api_config.default_output = "yaml".to_string();
        assert_eq!(output_format(&matches, &api_config), "yaml");

        // Explicit flag beats the per-API default.
        let matches = leaf(&[
            "apitap", "petstore", "pets", "getPet", "42", "--output", "csv",
        ]);
        assert_eq!(output_format(&matches, &api_config), "csv");
    }

    // -- dispatch --

    #[test]
    fn dispatch_invokes_endpoint_against_server() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/pets/42")
            .match_query(mockito::Matcher::UrlEncoded("limit".into(), "10".into()))
            .with_status(200)
            .with_body(r#"{"id":"42"}"#)
            .create();

        let ctx = temp_ctx("dispatch");
        let apis = vec![make_api("petstore", &server.url())];
        let matches = build_root(&apis)
            .try_get_matches_from(["apitap", "petstore", "pets", "getPet", "42"])
            .unwrap();

        dispatch(&ctx, &apis, &matches).unwrap();
        mock.assert();
    }

    #[test]
    fn dispatch_dry_run_never_touches_the_server() {
        let mut server = mockito::Server::new();
        let mock = server.mock("GET", "/pets/42").expect(0).create();

        let ctx = temp_ctx("dry-run");
        let apis = vec![make_api("petstore", &server.url())];
        let matches = build_root(&apis)
            .try_get_matches_from(["apitap", "petstore", "pets", "getPet", "42", "--dry-run"])
            .unwrap();

        dispatch(&ctx, &apis, &matches).unwrap();
        mock.assert();
    }

    #[test]
    fn dispatch_unknown_leaf_is_an_error() {
        let ctx = temp_ctx("unknown");
        let apis = vec![make_api("petstore", "https://example.com")];
        // Bypass clap validation by navigating matches for a known leaf but
        // querying an endpoint list that lacks it.
        let matches = build_root(&apis)
            .try_get_matches_from(["apitap", "petstore", "pets", "getPet", "42"])
            .unwrap();
        let mut stripped = apis;
        stripped[0].endpoints.clear();
        assert!(dispatch(&ctx, &stripped, &matches).is_err());
    }

    #[test]
    fn cmd_init_writes_starter_config() {
        let ctx = temp_ctx("init");
        let apis: Vec<LoadedApi> = Vec::new();
        let matches = build_root(&apis)
            .try_get_matches_from(["apitap", "init"])
            .unwrap();
        dispatch(&ctx, &apis, &matches).unwrap();
        assert!(ctx.config_path.exists());

        // Without --force a second init refuses.
        assert!(dispatch(&ctx, &apis, &matches).is_err());
    }

    #[test]
    fn cmd_refresh_unknown_api_is_an_error() {
        let ctx = temp_ctx("refresh");
        let apis: Vec<LoadedApi> = Vec::new();
        let matches = build_root(&apis)
            .try_get_matches_from(["apitap", "refresh", "ghost"])
            .unwrap();
        assert!(dispatch(&ctx, &apis, &matches).is_err());
    }

    #[test]
    fn load_apis_skips_unloadable_spec_keeps_siblings() {
        let mut ctx = temp_ctx("load");
        let dir = ctx.config_path.parent().unwrap().to_path_buf();
        let good = dir.join("good.json");
        std::fs::write(
            &good,
            r#"{"openapi":"3.0.0","paths":{"/pets":{"get":{"operationId":"listPets"}}}}"#,
        )
        .unwrap();

        ctx.config.apis.insert(
            "broken".to_string(),
            ApiConfig {
                spec: dir.join("missing.json").display().to_string(),
                cache_ttl: Duration::from_secs(60),
                ..ApiConfig::default()
            },
        );
        ctx.config.apis.insert(
            "good".to_string(),
            ApiConfig {
                spec: good.display().to_string(),
                cache_ttl: Duration::from_secs(60),
                ..ApiConfig::default()
            },
        );

        let apis = load_apis(&ctx);
        assert_eq!(apis.len(), 1);
        assert_eq!(apis[0].name, "good");
        assert_eq!(apis[0].endpoints.len(), 1);
    }
}
