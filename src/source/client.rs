use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{Order, OrderPage, OrderSource, ProductOrder, Session};
use crate::config::SourceConfig;
use crate::errors::SourceError;

const SUCCESS_CODE: i64 = 200;

/// HTTP client for the order platform's v2 REST API.
pub struct ImwebClient {
    client: reqwest::Client,
    config: SourceConfig,
}

fn response_code(body: &Value) -> Result<i64, SourceError> {
    match body.get("code") {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| SourceError::Decode(format!("non-integer response code {}", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| SourceError::Decode(format!("non-numeric response code '{}'", s))),
        _ => Err(SourceError::Decode("response has no code".to_string())),
    }
}

impl ImwebClient {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn fetch(
        &self,
        url: &str,
        token: Option<&str>,
        query: &[(&str, String)],
    ) -> Result<Value, SourceError> {
        let mut request = self.client.get(url).query(query);
        if let Some(token) = token {
            request = request.header("access-token", token);
        }
        let transport = |source| SourceError::Transport {
            url: url.to_string(),
            source,
        };
        let resp = request.send().await.map_err(transport)?;
        let resp = resp.error_for_status().map_err(transport)?;
        resp.json::<Value>()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))
    }

    /// Request a fresh access token. `None` when the platform refuses.
    async fn acquire_token(&self) -> Result<Option<String>> {
        let (Some(key), Some(secret)) = (&self.config.api_key, &self.config.api_secret) else {
            anyhow::bail!("Order API credentials are not configured");
        };
        let url = self.url(&self.config.auth_path);
        let body = self
            .fetch(&url, None, &[("key", key.clone()), ("secret", secret.clone())])
            .await?;

        let code = response_code(&body)?;
        if code != SUCCESS_CODE {
            let err = SourceError::from_code(code, &[]);
            tracing::error!(code, error = %err, "Order API token request rejected");
            return Ok(None);
        }
        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| SourceError::Decode("token response has no access_token".into()))?;
        tracing::debug!("Acquired order API access token");
        Ok(Some(token.to_string()))
    }

    /// GET an authenticated endpoint and return its `data`.
    ///
    /// A token-error code invalidates the session and retries once with a
    /// fresh token. Every other non-success code is logged and yields `None`.
    async fn get_data(
        &self,
        session: &mut Session,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>> {
        let url = self.url(path);
        let mut retried = false;
        loop {
            let token = match session.token() {
                Some(token) => token.to_string(),
                None => match self.acquire_token().await? {
                    Some(token) => {
                        session.set_token(token.clone());
                        token
                    }
                    None => return Ok(None),
                },
            };

            let mut body = self.fetch(&url, Some(&token), query).await?;
            let code = response_code(&body)?;
            if code == SUCCESS_CODE {
                return Ok(Some(body.get_mut("data").map(Value::take).unwrap_or(Value::Null)));
            }

            match SourceError::from_code(code, &self.config.token_error_codes) {
                SourceError::TokenExpired { code } if !retried => {
                    tracing::info!(code, path, "Order API token rejected, refreshing");
                    session.invalidate();
                    retried = true;
                }
                err => {
                    tracing::error!(code, path, error = %err, "Order API returned no data");
                    return Ok(None);
                }
            }
        }
    }

    async fn product_order(
        &self,
        session: &mut Session,
        order_no: &str,
    ) -> Result<Option<ProductOrder>> {
        let path = format!("/shop/orders/{}/prod-orders", order_no);
        let Some(data) = self.get_data(session, &path, &[]).await? else {
            return Ok(None);
        };
        let mut product_orders: Vec<ProductOrder> = serde_json::from_value(data)
            .map_err(|e| SourceError::Decode(e.to_string()))
            .with_context(|| format!("Failed to decode product orders of {}", order_no))?;
        if product_orders.is_empty() {
            return Ok(None);
        }
        Ok(Some(product_orders.swap_remove(0)))
    }
}

#[async_trait]
impl OrderSource for ImwebClient {
    async fn list_orders(
        &self,
        session: &mut Session,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let mut listed = Vec::new();
        let mut page: i64 = 1;
        loop {
            let query = [
                ("order_date_from", from.timestamp().to_string()),
                ("order_date_to", to.timestamp().to_string()),
                ("offset", page.to_string()),
                ("limit", self.config.page_size.to_string()),
            ];
            let Some(data) = self.get_data(session, "/shop/orders", &query).await? else {
                break;
            };
            let order_page: OrderPage = serde_json::from_value(data)
                .map_err(|e| SourceError::Decode(e.to_string()))
                .context("Failed to decode order list")?;

            let total_pages = order_page
                .pagination
                .as_ref()
                .map(|p| p.total_page)
                .unwrap_or(1);
            let empty = order_page.list.is_empty();
            listed.extend(order_page.list);
            if empty || page >= total_pages {
                break;
            }
            page += 1;
        }

        let mut orders = Vec::with_capacity(listed.len());
        for order in listed {
            match self.product_order(session, &order.order_no).await? {
                Some(product_order) => orders.push(order.with_product_order(product_order)),
                None => tracing::warn!(
                    order_no = %order.order_no,
                    "Skipping order without product order"
                ),
            }
        }
        tracing::debug!(count = orders.len(), pages = page, "Listed orders");
        Ok(orders)
    }

    async fn order_detail(&self, session: &mut Session, order_no: &str) -> Result<Option<Order>> {
        let path = format!("/shop/orders/{}", order_no);
        let Some(data) = self.get_data(session, &path, &[]).await? else {
            return Ok(None);
        };
        let order: Order = serde_json::from_value(data)
            .map_err(|e| SourceError::Decode(e.to_string()))
            .with_context(|| format!("Failed to decode order {}", order_no))?;

        let Some(product_order) = self.product_order(session, order_no).await? else {
            return Ok(None);
        };
        Ok(Some(order.with_product_order(product_order)))
    }
}
