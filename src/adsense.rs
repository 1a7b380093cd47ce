use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

/// Metric requested from the reporting endpoint
pub const METRIC: &str = "ESTIMATED_EARNINGS";

/// Date range keyword understood by the reporting endpoint
pub const DATE_RANGE: &str = "TODAY";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to list accounts: {status} - {body}")]
    AccountsFetch { status: u16, body: String },

    #[error("Failed to generate report: {status} - {body}")]
    ReportFetch { status: u16, body: String },

    #[error("No accounts are accessible to this credential")]
    NoAccounts,

    #[error("Report carries no earnings total")]
    MissingEarnings,

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Minimal client for the AdSense Management API (v2).
pub struct AdSenseClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl AdSenseClient {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            access_token: access_token.into(),
        }
    }

    /// Lists the reporting accounts accessible to the credential.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, ApiError> {
        let response = self
            .http
            .get(format!("{}/v2/accounts", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(ApiError::AccountsFetch {
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json::<AccountList>().await?.accounts)
    }

    /// Generates today's earnings report for one account.
    ///
    /// `account` is the full resource name, e.g. `accounts/pub-1234567890`.
    pub async fn generate_today_report(&self, account: &str) -> Result<Report, ApiError> {
        let response = self
            .http
            .get(format!("{}/v2/{}/reports:generate", self.base_url, account))
            .query(&[("dateRange", DATE_RANGE), ("metrics", METRIC)])
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(ApiError::ReportFetch {
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json().await?)
    }
}

#[derive(Deserialize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
struct AccountList {
    // Google omits the field entirely when the list is empty
    #[serde(rename = "accounts", default)]
    accounts: Vec<Account>,
}

#[derive(Deserialize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct Account {
    #[serde(rename = "name")]
    pub name: String,
}

#[derive(Deserialize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct Report {
    #[serde(rename = "totals")]
    pub totals: Option<ReportTotals>,
}

#[derive(Deserialize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct ReportTotals {
    #[serde(rename = "cells", default)]
    pub cells: Vec<ReportCell>,
}

#[derive(Deserialize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct ReportCell {
    #[serde(rename = "value", default)]
    pub value: String,
}

impl Report {
    /// First cell of the totals row, which carries the single requested metric.
    pub fn today_earnings(&self) -> Option<&str> {
        let cell = self.totals.as_ref()?.cells.first()?;
        Some(cell.value.as_str())
    }
}
