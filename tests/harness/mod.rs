//! Test harness for driving the CLI against a mock AdSense API.
//!
//! Provides an in-process HTTP server with canned responses and helpers for
//! spawning the real binary with its environment pointed at the mock.

// Shared between multiple test crates; not every crate uses every helper.
#![allow(dead_code)]

use chrono::{Duration, Utc};
use serde_json::{Value as JsonValue, json};
use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
};
use tiny_http::{Header, Response, Server};

/// One canned response, matched against the request URL.
///
/// The first matching entry wins, so put the most specific needle first.
pub struct CannedResponse {
    pub needle: &'static str,
    pub status: u16,
    pub body: JsonValue,
}

impl CannedResponse {
    pub fn ok(needle: &'static str, body: JsonValue) -> Self {
        Self {
            needle,
            status: 200,
            body,
        }
    }
}

/// Canned responses for a complete successful report run.
pub fn happy_api() -> Vec<CannedResponse> {
    vec![
        CannedResponse::ok(
            "reports:generate",
            json!({ "totals": { "cells": [{ "value": "4.52" }] } }),
        ),
        CannedResponse::ok(
            "/v2/accounts",
            json!({ "accounts": [{ "name": "accounts/pub-1234567890123456" }] }),
        ),
        CannedResponse::ok(
            "/token",
            json!({ "access_token": "fresh-access-token", "expires_in": 3599 }),
        ),
    ]
}

/// In-process mock of the AdSense API and the OAuth token endpoint.
///
/// Records every request URL so tests can assert which endpoints were hit.
pub struct MockApi {
    server: Arc<Server>,
    requests: Arc<Mutex<Vec<String>>>,
    handle: Option<JoinHandle<()>>,
}

impl MockApi {
    pub fn start(responses: Vec<CannedResponse>) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("Unable to bind socket"));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let server = Arc::clone(&server);
            let requests = Arc::clone(&requests);
            thread::spawn(move || serve(server, responses, requests))
        };

        Self {
            server,
            requests,
            handle: Some(handle),
        }
    }

    pub fn base_url(&self) -> String {
        let addr = self
            .server
            .server_addr()
            .to_ip()
            .expect("Unable to resolve listener address");
        format!("http://{addr}")
    }

    pub fn token_url(&self) -> String {
        format!("{}/token", self.base_url())
    }

    /// URLs of all requests received so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests whose URL contains `needle`.
    pub fn hits(&self, needle: &str) -> usize {
        self.requests()
            .iter()
            .filter(|url| url.contains(needle))
            .count()
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

fn serve(server: Arc<Server>, responses: Vec<CannedResponse>, requests: Arc<Mutex<Vec<String>>>) {
    for request in server.incoming_requests() {
        let url = request.url().to_string();
        requests.lock().unwrap().push(url.clone());

        let Some(canned) = responses.iter().find(|r| url.contains(r.needle)) else {
            let _ = request.respond(Response::from_string("Not Found").with_status_code(404));
            continue;
        };

        let header =
            Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
        let response = Response::from_string(canned.body.to_string())
            .with_status_code(canned.status)
            .with_header(header);
        let _ = request.respond(response);
    }
}

/// Writes a Google "installed application" client secret pointing the token
/// endpoint at the given URL.
pub fn write_client_secret(dir: &Path, token_url: &str) -> PathBuf {
    let path = dir.join("client_secret.json");
    let secret = json!({
        "installed": {
            "client_id": "test-client-id",
            "client_secret": "test-client-secret",
            "auth_uri": "https://accounts.google.com/o/oauth2/v2/auth",
            "token_uri": token_url,
            "redirect_uris": ["http://localhost"]
        }
    });
    fs::write(&path, secret.to_string()).expect("Failed to write client secret");
    path
}

/// Writes a credential cache file with the given contents.
pub fn write_token_cache(dir: &Path, credential: &JsonValue) -> PathBuf {
    let path = dir.join("token.json");
    fs::write(&path, credential.to_string()).expect("Failed to write token cache");
    path
}

/// A credential that stays valid for another hour.
pub fn valid_credential() -> JsonValue {
    json!({
        "access_token": "cached-access-token",
        "refresh_token": "cached-refresh-token",
        "expiry": (Utc::now() + Duration::hours(1)).to_rfc3339(),
    })
}

/// An expired credential that still carries a refresh token.
pub fn expired_credential() -> JsonValue {
    json!({
        "access_token": "stale-access-token",
        "refresh_token": "cached-refresh-token",
        "expiry": (Utc::now() - Duration::hours(1)).to_rfc3339(),
    })
}

/// Captured output of one CLI run.
pub struct CliRun {
    pub stdout: String,
    pub stderr: String,
    pub status: ExitStatus,
}

/// Spawns the real binary with its environment pointed at the mock API and
/// the seeded credential files.
pub fn run_cli(args: &[&str], api_url: &str, client_secret: &Path, token_cache: &Path) -> CliRun {
    let output = Command::new(binary_path())
        .args(args)
        .env("ADSENSE_API_URL", api_url)
        .env("ADSENSE_CLIENT_SECRET", client_secret)
        .env("ADSENSE_TOKEN_CACHE", token_cache)
        .output()
        .expect("Failed to run adsense-today");

    CliRun {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        status: output.status,
    }
}

pub fn binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_adsense-today"))
}
