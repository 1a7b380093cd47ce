/// A mock AdSense API server that answers the token, accounts, and report
/// endpoints with canned values.
///
/// On startup, prints its base URL to stdout (e.g., "http://127.0.0.1:12345")
/// so callers can point `ADSENSE_API_URL` — and the `token_uri` of a test
/// client secret — at it.
use serde_json::json;
use tiny_http::{Header, Response, Server};

fn main() {
    let server = Server::http("127.0.0.1:0").expect("Unable to bind socket");
    let addr = server
        .server_addr()
        .to_ip()
        .expect("Unable to resolve listener address");

    // Print the URL so the caller can read it
    println!("http://{addr}");

    for request in server.incoming_requests() {
        let url = request.url().to_string();

        let body = if url.contains("reports:generate") {
            json!({ "totals": { "cells": [{ "value": "4.52" }] } })
        } else if url.ends_with("/v2/accounts") {
            json!({
                "accounts": [
                    { "name": "accounts/pub-0000000000000000", "displayName": "Mock account" }
                ]
            })
        } else if url.ends_with("/token") {
            json!({
                "access_token": "mock-access-token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })
        } else {
            let _ = request.respond(Response::from_string("Not Found").with_status_code(404));
            continue;
        };

        let response = Response::from_string(body.to_string()).with_header(
            Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap(),
        );
        let _ = request.respond(response);
    }
}
