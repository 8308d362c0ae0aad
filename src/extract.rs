//! Parsed OpenAPI document → flat endpoint list
//!
//! Walks the `paths` map of an already-parsed (and reference-resolved)
//! document and produces one `Endpoint` per declared method. Extraction is
//! total: a malformed operation is skipped with a logged reason, never
//! silently dropped, and never fails the whole document.

use std::collections::BTreeMap;

use log::warn;
use serde_json::Value;

use crate::endpoint::{Endpoint, Location, Method, Parameter, RequestBody, ResponseSpec};
use crate::error::Error;
use crate::schema::translate_schema;

/// Extract all endpoints from a parsed OpenAPI document.
///
/// A null or non-object document is an `InvalidDocument` error; a document
/// without a `paths` map yields an empty list.
pub fn extract_endpoints(doc: &Value) -> Result<Vec<Endpoint>, Error> {
    let Some(root) = doc.as_object() else {
        return Err(Error::InvalidDocument(
            "document is not a JSON object".to_string(),
        ));
    };

    let paths = match root.get("paths").and_then(Value::as_object) {
        Some(p) => p,
        None => {
            warn!("document has no paths map; no commands will be generated");
            return Ok(Vec::new());
        }
    };

    let mut endpoints = Vec::new();
    for (path, item) in paths {
        let Some(item_obj) = item.as_object() else {
            warn!("skipping path {path}: path item is not an object");
            continue;
        };

        let path_level_params = item_obj.get("parameters");
        for method in Method::ALL {
            let Some(operation) = item_obj.get(method.key()) else {
                continue;
            };

            match extract_operation(path, method, operation, path_level_params) {
                Ok(endpoint) => endpoints.push(endpoint),
                Err(err) => {
                    warn!("skipping operation {method} {path}: {err}");
                }
            }
        }
    }

    Ok(endpoints)
}

fn extract_operation(
    path: &str,
    method: Method,
    operation: &Value,
    path_level_params: Option<&Value>,
) -> Result<Endpoint, Error> {
    let Some(op) = operation.as_object() else {
        return Err(Error::InvalidDocument(
            "operation is not an object".to_string(),
        ));
    };

    let str_of = |key: &str| op.get(key).and_then(Value::as_str).unwrap_or("").to_string();

    let tags = op
        .get("tags")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let deprecated = op
        .get("deprecated")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(Endpoint {
        path: path.to_string(),
        method,
        operation_id: str_of("operationId"),
        summary: str_of("summary"),
        description: str_of("description"),
        parameters: collect_parameters(path_level_params, op.get("parameters")),
        request_body: op.get("requestBody").and_then(extract_request_body),
        responses: extract_responses(op.get("responses")),
        tags,
        security: extract_security(op.get("security")),
        deprecated,
    })
}

/// Merge path-level and operation-level parameters, preserving declaration
/// order (path-level first). An operation-level parameter overrides a
/// path-level one with the same (name, location), in place, per OpenAPI.
fn collect_parameters(path_level: Option<&Value>, operation_level: Option<&Value>) -> Vec<Parameter> {
    let mut params: Vec<Parameter> = Vec::new();

    for source in [path_level, operation_level].into_iter().flatten() {
        let Some(list) = source.as_array() else {
            continue;
        };
        for raw in list {
            let Some(param) = parse_parameter(raw) else {
                warn!("skipping malformed parameter: {raw}");
                continue;
            };
            match params
                .iter_mut()
                .find(|p| p.name == param.name && p.location == param.location)
            {
                Some(existing) => *existing = param,
                None => params.push(param),
            }
        }
    }

    params
}

fn parse_parameter(raw: &Value) -> Option<Parameter> {
    let name = raw.get("name")?.as_str()?.to_string();
    let location = Location::parse(raw.get("in")?.as_str()?)?;
    Some(Parameter {
        name,
        location,
        description: raw
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        required: raw.get("required").and_then(Value::as_bool).unwrap_or(false),
        deprecated: raw
            .get("deprecated")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        schema: raw.get("schema").map(translate_schema),
    })
}

fn extract_request_body(raw: &Value) -> Option<RequestBody> {
    let obj = raw.as_object()?;
    let mut body = RequestBody {
        description: obj
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        required: obj
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        content: BTreeMap::new(),
    };
    if let Some(content) = obj.get("content").and_then(Value::as_object) {
        for (media_type, media) in content {
            let schema = media.get("schema").map(translate_schema);
            body.content.insert(media_type.clone(), schema);
        }
    }
    Some(body)
}

fn extract_responses(raw: Option<&Value>) -> BTreeMap<String, ResponseSpec> {
    let mut responses = BTreeMap::new();
    let Some(map) = raw.and_then(Value::as_object) else {
        return responses;
    };
    for (code, response) in map {
        responses.insert(
            code.clone(),
            ResponseSpec {
                description: response
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
            },
        );
    }
    responses
}

fn extract_security(raw: Option<&Value>) -> Vec<BTreeMap<String, Vec<String>>> {
    let mut security = Vec::new();
    let Some(list) = raw.and_then(Value::as_array) else {
        return security;
    };
    for requirement in list {
        let Some(obj) = requirement.as_object() else {
            continue;
        };
        let mut schemes = BTreeMap::new();
        for (scheme, scopes) in obj {
            let scopes = scopes
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            schemes.insert(scheme.clone(), scopes);
        }
        security.push(schemes);
    }
    security
}
