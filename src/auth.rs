use crate::token_cache::{self, StoredCredential};
use crate::Config;
use chrono::{DateTime, Duration, Utc};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, CsrfToken, PkceCodeChallenge, RedirectUrl, Scope,
    TokenResponse, TokenUrl, basic::BasicClient,
};
use reqwest::{Client, redirect::Policy};
use serde::Deserialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tiny_http::{Response, Server};
use tokio::task::spawn_blocking;
use url::Url;

/// OAuth scope granting read-only access to AdSense reporting data
pub const SCOPE: &str = "https://www.googleapis.com/auth/adsense.readonly";

/// The expected callback path for the OAuth redirect
const CALLBACK_PATH: &str = "/oauth2/callback";

/// Token lifetime assumed when the OAuth response omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Google "installed application" OAuth client configuration.
///
/// The `auth_uri` and `token_uri` recorded in the client secret file are
/// honored as-is, so all OAuth traffic goes wherever the file points.
#[derive(Deserialize, Clone)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct ClientSecret {
    #[serde(rename = "client_id")]
    pub client_id: String,

    #[serde(rename = "client_secret")]
    pub client_secret: String,

    #[serde(rename = "auth_uri")]
    pub auth_uri: String,

    #[serde(rename = "token_uri")]
    pub token_uri: String,
}

/// Wrapper matching the on-disk layout of a downloaded client secret file
#[derive(Deserialize)]
struct ClientSecretFile {
    #[serde(rename = "installed")]
    installed: ClientSecret,
}

impl ClientSecret {
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let raw = fs::read_to_string(path).map_err(|source| AuthError::ClientSecretRead {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ClientSecretFile =
            serde_json::from_str(&raw).map_err(AuthError::ClientSecretParse)?;
        Ok(file.installed)
    }
}

/// What the credential loader has to do to produce a usable credential.
#[cfg_attr(test, derive(Debug))]
pub enum CredentialPlan {
    /// The cached credential is still valid; no network traffic needed
    UseCached(StoredCredential),
    /// The cached credential is expired but carries a refresh token
    Refresh(StoredCredential),
    /// No usable cache; the user has to consent in a browser
    Interactive,
}

/// Decides how to obtain a usable credential from the cache state.
pub fn plan(cached: Option<StoredCredential>, now: DateTime<Utc>) -> CredentialPlan {
    match cached {
        Some(credential) if credential.is_valid(now) => CredentialPlan::UseCached(credential),
        Some(credential) if credential.refresh_token.is_some() => {
            CredentialPlan::Refresh(credential)
        }
        _ => CredentialPlan::Interactive,
    }
}

/// Resolves a valid credential for API calls.
///
/// This function:
/// 1. Loads the cached credential, treating a malformed cache as absent
/// 2. Returns the cached credential unchanged while it is still valid
/// 3. Refreshes an expired credential that carries a refresh token
/// 4. Falls back to the interactive browser flow otherwise
///
/// The refresh and interactive branches persist the resulting credential back
/// to the cache, overwriting any prior contents. A refresh failure propagates
/// instead of falling back to the browser; unattended runs must never block
/// on user consent.
pub async fn resolve_credentials(config: &Config) -> Result<StoredCredential, AuthError> {
    let cached = token_cache::load(&config.token_cache_path);

    match plan(cached, Utc::now()) {
        CredentialPlan::UseCached(credential) => Ok(credential),
        CredentialPlan::Refresh(credential) => {
            let secret = ClientSecret::load(&config.client_secret_path)?;
            let refreshed = refresh_credentials(&secret, &credential).await?;
            token_cache::store(&config.token_cache_path, &refreshed)?;
            Ok(refreshed)
        }
        CredentialPlan::Interactive => {
            let secret = ClientSecret::load(&config.client_secret_path)?;
            let fresh = authenticate(&secret).await?;
            token_cache::store(&config.token_cache_path, &fresh)?;
            Ok(fresh)
        }
    }
}

/// Forces the interactive flow and persists the resulting credential,
/// regardless of any cached state.
pub async fn login(config: &Config) -> Result<StoredCredential, AuthError> {
    let secret = ClientSecret::load(&config.client_secret_path)?;
    let credential = authenticate(&secret).await?;
    token_cache::store(&config.token_cache_path, &credential)?;
    Ok(credential)
}

/// Performs the installed-app OAuth browser flow and returns a new credential.
///
/// This function:
/// 1. Opens a browser for user consent
/// 2. Receives the authorization code via a local callback server
/// 3. Exchanges the code for tokens
///
/// Offline access is requested so the response carries a refresh token that
/// [`refresh_credentials()`] can use without another browser round trip.
pub async fn authenticate(secret: &ClientSecret) -> Result<StoredCredential, AuthError> {
    let http_client = create_http_client()?;

    // Start local callback server (blocking, but only binds the socket)
    let server = Server::http("localhost:0").map_err(|e| AuthError::ServerStart(e.into()))?;

    let local_addr = server
        .server_addr()
        .to_ip()
        .ok_or_else(|| AuthError::ServerStart("Failed to get server address".into()))?;

    let redirect_url = format!("http://localhost:{}{}", local_addr.port(), CALLBACK_PATH);

    let client = BasicClient::new(ClientId::new(secret.client_id.clone()))
        .set_client_secret(oauth2::ClientSecret::new(secret.client_secret.clone()))
        .set_auth_uri(AuthUrl::new(secret.auth_uri.clone())?)
        .set_token_uri(TokenUrl::new(secret.token_uri.clone())?)
        .set_redirect_uri(RedirectUrl::new(redirect_url)?);

    // Generate PKCE challenge
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    // access_type=offline makes Google issue a refresh token; prompt=consent
    // forces one even when the user already granted this client before
    let (auth_url, csrf_token) = client
        .authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new(SCOPE.to_string()))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(pkce_challenge)
        .url();

    eprintln!(
        "Opening browser for authorization... If the browser doesn't open, visit this URL manually:"
    );
    eprintln!("\n  {}\n", auth_url);

    open::that(auth_url.to_string()).map_err(AuthError::BrowserOpen)?;

    // Wait for callback (blocking tiny_http in spawn_blocking)
    let code = spawn_blocking(move || wait_for_authorization_code(server, csrf_token))
        .await
        .map_err(|e| AuthError::ServerStart(e.into()))??;

    let token_response = client
        .exchange_code(code)
        .set_pkce_verifier(pkce_verifier)
        .request_async(&http_client)
        .await
        .map_err(|e| AuthError::CodeExchange(e.into()))?;

    let expires_in = token_response
        .expires_in()
        .map(|d| d.as_secs() as i64)
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

    Ok(StoredCredential {
        access_token: token_response.access_token().secret().clone(),
        refresh_token: token_response.refresh_token().map(|t| t.secret().clone()),
        expiry: Utc::now() + Duration::seconds(expires_in),
    })
}

/// Exchanges a refresh token for a fresh access token.
///
/// Google omits the refresh token from refresh responses, so the prior one is
/// carried over into the returned credential.
pub async fn refresh_credentials(
    secret: &ClientSecret,
    credential: &StoredCredential,
) -> Result<StoredCredential, AuthError> {
    let refresh_token = credential
        .refresh_token
        .as_deref()
        .ok_or(AuthError::MissingRefreshToken)?;

    let http_client = create_http_client()?;

    let response = http_client
        .post(&secret.token_uri)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
        ])
        .send()
        .await?;

    let status = response.status().as_u16();
    if status != 200 {
        return Err(AuthError::TokenRefresh {
            status,
            body: response.text().await.unwrap_or_default(),
        });
    }

    let refreshed = response.json::<RefreshResponse>().await?;

    Ok(StoredCredential {
        access_token: refreshed.access_token,
        refresh_token: refreshed
            .refresh_token
            .or_else(|| credential.refresh_token.clone()),
        expiry: Utc::now()
            + Duration::seconds(refreshed.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)),
    })
}

/// Creates an HTTP client configured for OAuth operations.
fn create_http_client() -> Result<Client, AuthError> {
    Ok(Client::builder()
        .redirect(Policy::none()) // Disable redirects to prevent SSRF
        .build()?)
}

/// Waits for the OAuth callback and extracts the authorization code.
fn wait_for_authorization_code(
    server: Server,
    csrf_token: CsrfToken,
) -> Result<AuthorizationCode, AuthError> {
    loop {
        let Ok(request) = server.recv() else {
            continue;
        };

        // The callback arrives as a path + query; rebuild a full URL to parse it
        let full_url = format!("http://localhost{}", request.url());
        let Ok(parsed_url) = Url::parse(&full_url) else {
            respond(request, 400, "Bad Request: malformed callback URL");
            continue;
        };

        if parsed_url.path() != CALLBACK_PATH {
            respond(request, 404, "Not Found");
            continue;
        }

        // A denied consent comes back as error= instead of code=
        if let Some(error) = query_param(&parsed_url, "error") {
            let detail = query_param(&parsed_url, "error_description").unwrap_or_default();
            let message = format!("{} - {}", error, detail);
            respond(request, 400, &message);
            return Err(AuthError::OAuthServer(message));
        }

        let Some(code) = query_param(&parsed_url, "code") else {
            respond(request, 400, "Bad Request: missing code");
            continue;
        };

        // Verify state parameter (CSRF protection)
        match query_param(&parsed_url, "state") {
            Some(state) if state == *csrf_token.secret() => {}
            Some(_) => {
                respond(request, 400, "Bad Request: invalid state");
                continue;
            }
            None => {
                respond(request, 400, "Bad Request: missing state");
                continue;
            }
        }

        let page = Response::from_string(include_str!("auth_success.html")).with_header(
            tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..])
                .unwrap(),
        );
        let _ = request.respond(page);

        return Ok(AuthorizationCode::new(code));
    }
}

fn respond(request: tiny_http::Request, status: u16, message: &str) {
    let response = Response::from_string(message).with_status_code(status);
    let _ = request.respond(response);
}

/// Extracts a query parameter from a URL.
fn query_param(url: &Url, param_name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == param_name)
        .map(|(_, value)| value.into_owned())
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to read client secret {}: {source}", path.display())]
    ClientSecretRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse client secret: {0}")]
    ClientSecretParse(#[source] serde_json::Error),

    #[error("Failed to start local callback server: {0}")]
    ServerStart(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to open browser for authorization: {0}")]
    BrowserOpen(#[source] std::io::Error),

    #[error("OAuth server returned an error: {0}")]
    OAuthServer(String),

    #[error("Failed to exchange authorization code for tokens: {0}")]
    CodeExchange(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to refresh access token: {status} - {body}")]
    TokenRefresh { status: u16, body: String },

    #[error("Cached credential has no refresh token")]
    MissingRefreshToken,

    #[error("Failed to persist credential cache: {0}")]
    Cache(#[from] token_cache::CacheError),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] oauth2::url::ParseError),
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(rename = "access_token")]
    access_token: String,

    #[serde(rename = "refresh_token", default)]
    refresh_token: Option<String>,

    #[serde(rename = "expires_in", default)]
    expires_in: Option<i64>,
}
