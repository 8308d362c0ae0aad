//! HTTP execution
//!
//! Sends one `RequestSpec` over blocking reqwest with a bounded timeout.
//! Exactly one request per invocation; no retries, no pooling beyond what
//! reqwest provides. Dry-run short-circuits after the request is fully
//! built and logged.

use std::time::{Duration, Instant};

use log::info;
use reqwest::blocking::multipart;
use reqwest::blocking::Client;

use crate::endpoint::Method;
use crate::error::Error;
use crate::request::{Auth, BodyData, RequestSpec};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("apitap/", env!("CARGO_PKG_VERSION"));

/// Outcome of one executed (or dry-run) request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code; 0 for a dry run that never went out.
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub duration: Duration,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct HttpClient {
    client: Client,
    verbose: bool,
}

impl HttpClient {
    pub fn new(timeout: Duration, verbose: bool) -> Result<HttpClient, Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(Error::ClientBuild)?;
        Ok(HttpClient { client, verbose })
    }

    pub fn execute(&self, spec: &RequestSpec) -> Result<HttpResponse, Error> {
        let start = Instant::now();

        if self.verbose || spec.dry_run {
            log_request(spec);
        }

        if spec.dry_run {
            return Ok(HttpResponse {
                status: 0,
                headers: Vec::new(),
                body: Vec::new(),
                duration: start.elapsed(),
            });
        }

        let mut req = self.client.request(to_reqwest_method(spec.method), &spec.url);
        if !spec.query.is_empty() {
            req = req.query(&spec.query);
        }
        for (name, value) in &spec.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        req = match &spec.auth {
            Some(Auth::Basic { username, password }) => {
                req.basic_auth(username, Some(password))
            }
            Some(Auth::Verbatim(value)) => req.header("Authorization", value.as_str()),
            Some(Auth::ApiKey { header, key }) => req.header(header.as_str(), key.as_str()),
            None => req,
        };
        req = match &spec.body {
            BodyData::None => req,
            BodyData::Json(value) => req.json(value),
            BodyData::Form { fields, files } => {
                let mut form = multipart::Form::new();
                for (key, value) in fields {
                    form = form.text(key.clone(), value.clone());
                }
                for (key, path) in files {
                    form = form
                        .file(key.clone(), path)
                        .map_err(|source| Error::FormFile {
                            path: path.clone(),
                            source,
                        })?;
                }
                req.multipart(form)
            }
        };

        let resp = req.send().map_err(Error::RequestFailed)?;
        let status = resp.status().as_u16();
        let headers: Vec<(String, String)> = resp
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = resp.bytes().map_err(Error::ResponseRead)?.to_vec();
        let duration = start.elapsed();

        if self.verbose {
            log_response(status, &headers, &body, duration);
        }

        Ok(HttpResponse {
            status,
            headers,
            body,
            duration,
        })
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
        Method::Trace => reqwest::Method::TRACE,
    }
}

fn log_request(spec: &RequestSpec) {
    info!("request: {} {}", spec.method, spec.url);
    if !spec.query.is_empty() {
        info!("query: {:?}", spec.query);
    }
    if !spec.headers.is_empty() {
        info!("headers: {:?}", spec.headers);
    }
    match &spec.body {
        BodyData::Json(value) => {
            let pretty = serde_json::to_string_pretty(value).unwrap_or_default();
            info!("body:\n{pretty}");
        }
        BodyData::Form { fields, files } => {
            info!("form fields: {fields:?}, files: {files:?}");
        }
        BodyData::None => {}
    }
}

fn log_response(status: u16, headers: &[(String, String)], body: &[u8], duration: Duration) {
    info!("response: {status} in {duration:?}");
    info!("response headers: {headers:?}");
    if !body.is_empty() {
        match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(value) => {
                let pretty = serde_json::to_string_pretty(&value).unwrap_or_default();
                info!("response body:\n{pretty}");
            }
            Err(_) => info!("response body: {}", String::from_utf8_lossy(body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(method: Method, url: String) -> RequestSpec {
        RequestSpec {
            method,
            url,
            query: Vec::new(),
            headers: Vec::new(),
            body: BodyData::None,
            auth: None,
            dry_run: false,
        }
    }

    #[test]
    fn execute_sends_query_headers_and_auth() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/pets/123")
            .match_query(mockito::Matcher::UrlEncoded("limit".into(), "10".into()))
            .match_header("x-team", "platform")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"123"}"#)
            .create();

        let mut req = spec(Method::Get, format!("{}/pets/123", server.url()));
        req.query.push(("limit".to_string(), "10".to_string()));
        req.headers
            .push(("X-Team".to_string(), "platform".to_string()));
        req.auth = Some(Auth::Verbatim("Bearer test-token".to_string()));

        let client = HttpClient::new(DEFAULT_TIMEOUT, false).unwrap();
        let resp = client.execute(&req).unwrap();
        assert_eq!(resp.status, 200);
        assert!(resp.is_success());
        assert_eq!(resp.body, br#"{"id":"123"}"#);
        mock.assert();
    }

    #[test]
    fn execute_sends_json_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/pets")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(json!({"name": "rex"})))
            .with_status(201)
            .with_body(r#"{"id":"new"}"#)
            .create();

        let mut req = spec(Method::Post, format!("{}/pets", server.url()));
        req.body = BodyData::Json(json!({"name": "rex"}));

        let client = HttpClient::new(DEFAULT_TIMEOUT, false).unwrap();
        let resp = client.execute(&req).unwrap();
        assert_eq!(resp.status, 201);
        mock.assert();
    }

    #[test]
    fn execute_basic_auth() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/secure")
            // "user:pass" base64-encoded
            .match_header("authorization", "Basic dXNlcjpwYXNz")
            .with_status(200)
            .create();

        let mut req = spec(Method::Get, format!("{}/secure", server.url()));
        req.auth = Some(Auth::Basic {
            username: "user".to_string(),
            password: "pass".to_string(),
        });

        let client = HttpClient::new(DEFAULT_TIMEOUT, false).unwrap();
        assert_eq!(client.execute(&req).unwrap().status, 200);
        mock.assert();
    }

    #[test]
    fn execute_api_key_in_custom_header() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/secure")
            .match_header("x-custom-key", "raw-key")
            .with_status(200)
            .create();

        let mut req = spec(Method::Get, format!("{}/secure", server.url()));
        req.auth = Some(Auth::ApiKey {
            header: "X-Custom-Key".to_string(),
            key: "raw-key".to_string(),
        });

        let client = HttpClient::new(DEFAULT_TIMEOUT, false).unwrap();
        assert_eq!(client.execute(&req).unwrap().status, 200);
        mock.assert();
    }

    #[test]
    fn execute_multipart_form_fields() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/upload")
            .match_header(
                "content-type",
                mockito::Matcher::Regex("multipart/form-data.*".to_string()),
            )
            .with_status(200)
            .create();

        let mut req = spec(Method::Post, format!("{}/upload", server.url()));
        req.body = BodyData::Form {
            fields: vec![("name".to_string(), "rex".to_string())],
            files: Vec::new(),
        };

        let client = HttpClient::new(DEFAULT_TIMEOUT, false).unwrap();
        assert_eq!(client.execute(&req).unwrap().status, 200);
        mock.assert();
    }

    #[test]
    fn execute_dry_run_never_sends() {
        let mut server = mockito::Server::new();
        let mock = server.mock("GET", "/pets").expect(0).create();

        let mut req = spec(Method::Get, format!("{}/pets", server.url()));
        req.dry_run = true;

        let client = HttpClient::new(DEFAULT_TIMEOUT, false).unwrap();
        let resp = client.execute(&req).unwrap();
        assert_eq!(resp.status, 0);
        assert!(resp.body.is_empty());
        mock.assert();
    }

    #[test]
    fn execute_missing_form_file_is_an_error() {
        let mut req = spec(Method::Post, "http://localhost:1/upload".to_string());
        req.body = BodyData::Form {
            fields: Vec::new(),
            files: vec![("photo".to_string(), "/nonexistent/rex.png".to_string())],
        };

        let client = HttpClient::new(DEFAULT_TIMEOUT, false).unwrap();
        let err = client.execute(&req).unwrap_err();
        assert!(matches!(err, Error::FormFile { .. }));
    }

    #[test]
    fn execute_connection_failure_surfaces_immediately() {
        // Port 1 is never listening; no retries are attempted.
        let req = spec(Method::Get, "http://127.0.0.1:1/".to_string());
        let client = HttpClient::new(Duration::from_secs(2), false).unwrap();
        assert!(matches!(
            client.execute(&req).unwrap_err(),
            Error::RequestFailed(_)
        ));
    }
}
