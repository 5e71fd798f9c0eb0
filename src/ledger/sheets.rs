use anyhow::Result;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{Ledger, LedgerRow, Sheet, a1};
use crate::config::{SheetRange, SheetsConfig};
use crate::errors::LedgerError;

/// Response body of `GET .../values/{range}`. `values` is omitted for blank rows.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Request body of `PUT .../values/{range}`.
#[derive(Debug, Serialize)]
struct ValueRangeUpdate<'a> {
    range: &'a str,
    #[serde(rename = "majorDimension")]
    major_dimension: &'static str,
    values: Vec<&'a [String]>,
}

/// Response of the OAuth token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Ledger backed by the hosted spreadsheet's `values` REST API.
///
/// The bearer token starts as the configured `access_token`. When refresh
/// credentials are configured, a missing token or a 401 response fetches a
/// new one and the request is retried once.
pub struct SheetsLedger {
    client: reqwest::Client,
    config: SheetsConfig,
    token: RwLock<Option<String>>,
}

impl SheetsLedger {
    pub fn new(config: SheetsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: RwLock::new(config.access_token.clone()),
            config,
        }
    }

    fn values_url(&self, range: &SheetRange, a1_range: &str) -> Result<Url, LedgerError> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|e| LedgerError::InvalidRange(format!("bad api_base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| LedgerError::InvalidRange("api_base cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(["spreadsheets", range.spreadsheet_id.as_str(), "values", a1_range]);
        Ok(url)
    }

    /// Exchange the refresh token for a new access token and cache it.
    async fn refresh_token(&self) -> Result<String, LedgerError> {
        let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
            &self.config.client_id,
            &self.config.client_secret,
            &self.config.refresh_token,
        ) else {
            return Err(LedgerError::Auth("refresh credentials are not configured".to_string()));
        };

        let mut cached = self.token.write().await;
        let resp = self
            .client
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| LedgerError::Auth(e.to_string()))?
            .json::<TokenResponse>()
            .await
            .map_err(|e| LedgerError::Auth(format!("unreadable token response: {}", e)))?;

        let Some(token) = resp.access_token else {
            let error = resp.error.unwrap_or_else(|| "no access_token".to_string());
            return Err(LedgerError::Auth(match resp.error_description {
                Some(description) => format!("{}: {}", error, description),
                None => error,
            }));
        };
        tracing::info!("Refreshed spreadsheet access token");
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn current_token(&self) -> Result<Option<String>, LedgerError> {
        let token = self.token.read().await.clone();
        match token {
            None if self.config.can_refresh_token() => Ok(Some(self.refresh_token().await?)),
            token => Ok(token),
        }
    }

    async fn send_once(
        &self,
        request: reqwest::RequestBuilder,
        token: Option<&str>,
        a1_range: &str,
    ) -> Result<reqwest::Response, LedgerError> {
        let request = match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        request.send().await.map_err(|source| LedgerError::Transport {
            range: a1_range.to_string(),
            source,
        })
    }

    /// Send the request built by `build`, refreshing the token once on 401.
    async fn send<F>(&self, a1_range: &str, build: F) -> Result<reqwest::Response, LedgerError>
    where
        F: Fn() -> Result<reqwest::RequestBuilder, LedgerError>,
    {
        let token = self.current_token().await?;
        let resp = self.send_once(build()?, token.as_deref(), a1_range).await?;
        if resp.status() != StatusCode::UNAUTHORIZED || !self.config.can_refresh_token() {
            return ensure_success(resp, a1_range).await;
        }

        tracing::info!(range = a1_range, "Spreadsheet token rejected, refreshing");
        let token = self.refresh_token().await?;
        let resp = self.send_once(build()?, Some(&token), a1_range).await?;
        ensure_success(resp, a1_range).await
    }

    async fn put_values(
        &self,
        range: &SheetRange,
        a1_range: &str,
        cells: &[String],
    ) -> Result<(), LedgerError> {
        let body = ValueRangeUpdate {
            range: a1_range,
            major_dimension: "ROWS",
            values: vec![cells],
        };
        self.send(a1_range, || {
            Ok(self
                .client
                .put(self.values_url(range, a1_range)?)
                .query(&[("valueInputOption", "RAW")])
                .json(&body))
        })
        .await?;
        Ok(())
    }
}

async fn ensure_success(
    resp: reqwest::Response,
    a1_range: &str,
) -> Result<reqwest::Response, LedgerError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(LedgerError::Status {
        range: a1_range.to_string(),
        status: status.as_u16(),
        body,
    })
}

fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Ledger for SheetsLedger {
    async fn read_row(&self, sheet: Sheet, row: i64) -> Result<LedgerRow> {
        let range = self.config.range(sheet);
        let a1_range = a1::row_range(&range.tab, &range.start, &range.end, row);
        let resp = self
            .send(&a1_range, || {
                Ok(self
                    .client
                    .get(self.values_url(range, &a1_range)?)
                    .query(&[("majorDimension", "ROWS")]))
            })
            .await?;
        let body: ValueRange = resp.json().await.map_err(|source| LedgerError::Transport {
            range: a1_range.clone(),
            source,
        })?;

        let cells = body
            .values
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(cell_to_string)
            .collect();
        Ok(LedgerRow::padded(cells, range.width()))
    }

    async fn write_row(&self, sheet: Sheet, row: i64, cells: &LedgerRow) -> Result<()> {
        let range = self.config.range(sheet);
        if cells.len() > range.width() {
            return Err(LedgerError::InvalidRange(format!(
                "{} cells do not fit the {} range {}:{}",
                cells.len(),
                sheet.name(),
                range.start,
                range.end
            ))
            .into());
        }
        let a1_range = a1::row_range(&range.tab, &range.start, &range.end, row);
        self.put_values(range, &a1_range, cells.cells()).await?;
        tracing::debug!(sheet = sheet.name(), row, "ledger row written");
        Ok(())
    }

    async fn write_cell(&self, sheet: Sheet, column: &str, row: i64, value: &str) -> Result<()> {
        let range = self.config.range(sheet);
        if range.offset_of(column).is_none() {
            return Err(LedgerError::InvalidRange(format!(
                "column {} is outside the {} range",
                column,
                sheet.name()
            ))
            .into());
        }
        let a1_range = a1::row_range(&range.tab, column, column, row);
        self.put_values(range, &a1_range, &[value.to_string()]).await?;
        tracing::debug!(sheet = sheet.name(), row, column, "ledger cell written");
        Ok(())
    }
}
