use crate::adsense::{AdSenseClient, ApiError};
use crate::auth::AuthError;
use std::{env, path::PathBuf};
use thiserror::Error;

pub mod adsense;
pub mod auth;
pub mod token_cache;

/// Production AdSense Management API endpoint
pub const DEFAULT_API_URL: &str = "https://adsense.googleapis.com";

/// Runtime configuration resolved from the environment.
pub struct Config {
    /// Path to the Google "installed application" client secret JSON
    pub client_secret_path: PathBuf,

    /// Path to the persisted credential cache
    pub token_cache_path: PathBuf,

    /// Base URL of the AdSense API
    pub api_base_url: String,
}

impl Config {
    /// Reads configuration from environment variables, falling back to
    /// `client_secret.json` and `token.json` under the user's config
    /// directory (`~/.config/adsense-today` on Linux).
    pub fn from_env() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("adsense-today");

        let client_secret_path = env::var("ADSENSE_CLIENT_SECRET")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir.join("client_secret.json"));

        let token_cache_path = env::var("ADSENSE_TOKEN_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir.join("token.json"));

        let api_base_url = env::var("ADSENSE_API_URL")
            .ok()
            .unwrap_or_else(|| DEFAULT_API_URL.into());

        Self {
            client_secret_path,
            token_cache_path,
            api_base_url,
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Resolves a credential and fetches today's estimated earnings, formatted
/// as the final output line.
///
/// The call sequence is strictly linear: list accounts, take the first one,
/// generate today's single-metric report, extract the totals value.
pub async fn fetch_today_earnings(config: &Config) -> Result<String, FetchError> {
    let credential = auth::resolve_credentials(config).await?;
    let client = AdSenseClient::new(config.api_base_url.as_str(), credential.access_token.as_str());

    let accounts = client.list_accounts().await?;
    let account = accounts.first().ok_or(ApiError::NoAccounts)?;

    let report = client.generate_today_report(&account.name).await?;
    let earnings = report.today_earnings().ok_or(ApiError::MissingEarnings)?;

    Ok(format!("💰 AdSense Today: ${earnings}"))
}
