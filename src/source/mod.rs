//! External order source.
//!
//! Wire models for the order platform, the session token holder that is
//! threaded through every call, and the `OrderSource` seam the reconciler
//! depends on. `ImwebClient` is the HTTP implementation; `projection` turns
//! an order into ledger rows.

pub mod client;
pub mod projection;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub use client::ImwebClient;

/// Accepts strings, numbers, booleans and null, always yielding a `String`.
///
/// The platform is inconsistent about quoting: phone numbers, prices and
/// product numbers arrive as either JSON strings or numbers.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_i64().unwrap_or_default(),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        })
        .collect())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Orderer {
    #[serde(default, deserialize_with = "lenient_string")]
    pub member_code: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub call: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub call2: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payment {
    #[serde(default, deserialize_with = "lenient_string")]
    pub pay_type: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pg_type: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub price_currency: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub total_price: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub deliv_price: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryAddress {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub postcode: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address_detail: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delivery {
    #[serde(default, deserialize_with = "lenient_string")]
    pub country: String,
    #[serde(default)]
    pub address: DeliveryAddress,
    #[serde(default, deserialize_with = "lenient_string")]
    pub memo: String,
}

/// One answer of the checkout form (channel, passengers, boarding date, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormField {
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,
}

/// One option group selected on a product (e.g. pickup place, airport).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductOption {
    #[serde(default, deserialize_with = "lenient_string")]
    pub option_code: String,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub value_name_list: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemPayment {
    #[serde(default, deserialize_with = "lenient_string")]
    pub count: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub price: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub no: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub prod_no: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub prod_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub prod_custom_code: String,
    #[serde(default)]
    pub payment: ItemPayment,
    #[serde(default)]
    pub options: Vec<Vec<ProductOption>>,
}

impl ProductItem {
    /// Option values of the first selected option group.
    pub fn option_values(&self) -> &[String] {
        self.options
            .first()
            .and_then(|group| group.first())
            .map(|opt| opt.value_name_list.as_slice())
            .unwrap_or(&[])
    }
}

/// Line-item view of an order (`/shop/orders/{no}/prod-orders`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductOrder {
    #[serde(default, deserialize_with = "lenient_string")]
    pub order_no: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub claim_status: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub claim_type: String,
    #[serde(default)]
    pub items: Vec<ProductItem>,
}

impl ProductOrder {
    pub fn first_item(&self) -> Option<&ProductItem> {
        self.items.first()
    }
}

/// An order as returned by the list and detail endpoints, with its first
/// product order attached once fetched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    #[serde(deserialize_with = "lenient_string")]
    pub order_no: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub order_type: String,
    /// Unix seconds.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub order_time: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub complete_time: i64,
    #[serde(default)]
    pub orderer: Orderer,
    #[serde(default)]
    pub delivery: Delivery,
    #[serde(default)]
    pub payment: Payment,
    #[serde(default)]
    pub form: Vec<FormField>,
    #[serde(skip_deserializing)]
    pub product_order: Option<ProductOrder>,
}

impl Order {
    /// Form answer at `index`, blank when the form is shorter.
    pub fn form_value(&self, index: usize) -> &str {
        self.form.get(index).map(|f| f.value.as_str()).unwrap_or("")
    }

    pub fn product_item(&self) -> Option<&ProductItem> {
        self.product_order.as_ref().and_then(ProductOrder::first_item)
    }

    pub fn with_product_order(mut self, product_order: ProductOrder) -> Self {
        self.product_order = Some(product_order);
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub data_count: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub current_page: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub total_page: i64,
}

/// `data` of the order list endpoint. The platform spells the key `pagenation`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderPage {
    #[serde(default)]
    pub list: Vec<Order>,
    #[serde(default, alias = "pagenation")]
    pub pagination: Option<Pagination>,
}

/// Access token for the order platform.
///
/// Created empty at the start of a task run and passed by `&mut` into every
/// source call; the client fills it on first use and replaces it when the
/// platform reports it invalid.
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn invalidate(&mut self) {
        self.token = None;
    }
}

/// Read access to the order platform.
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Orders placed in `[from, to]`, each with its product order attached.
    /// Orders whose product order cannot be fetched are left out.
    async fn list_orders(
        &self,
        session: &mut Session,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>>;

    /// Current details of one order with its product order, or `None` when
    /// the platform has no data for it.
    async fn order_detail(&self, session: &mut Session, order_no: &str) -> Result<Option<Order>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_decodes_mixed_number_and_string_fields() {
        let order: Order = serde_json::from_value(serde_json::json!({
            "order_no": 202405120001i64,
            "order_time": "1715475600",
            "orderer": { "name": "Kim", "call": 1099859547, "email": null },
            "payment": { "total_price": 55000, "price_currency": "KRW" },
            "form": [
                { "type": "text", "title": "SNS", "value": "kakao" },
                { "type": "text", "title": "ID", "value": 42 }
            ]
        }))
        .unwrap();

        assert_eq!(order.order_no, "202405120001");
        assert_eq!(order.order_time, 1715475600);
        assert_eq!(order.orderer.call, "1099859547");
        assert_eq!(order.orderer.email, "");
        assert_eq!(order.payment.total_price, "55000");
        assert_eq!(order.form_value(1), "42");
        assert_eq!(order.form_value(7), "");
        assert!(order.product_item().is_none());
    }

    #[test]
    fn product_order_exposes_first_option_group() {
        let product: ProductOrder = serde_json::from_value(serde_json::json!({
            "order_no": "O-1",
            "items": [{
                "prod_no": "147",
                "prod_name": "Airport sending",
                "options": [[{ "option_code": "x", "value_name_list": ["Hotel A", "ICN", "Seoul"] }]]
            }]
        }))
        .unwrap();

        let item = product.first_item().unwrap();
        assert_eq!(item.prod_no, 147);
        assert_eq!(item.option_values(), &["Hotel A", "ICN", "Seoul"]);
    }

    #[test]
    fn order_page_accepts_platform_spelling() {
        let page: OrderPage = serde_json::from_value(serde_json::json!({
            "list": [{ "order_no": "O-1" }],
            "pagenation": { "data_count": "1", "current_page": 1, "total_page": 3 }
        }))
        .unwrap();
        assert_eq!(page.list.len(), 1);
        assert_eq!(page.pagination.unwrap().total_page, 3);
    }

    #[test]
    fn session_token_lifecycle() {
        let mut session = Session::new();
        assert!(session.token().is_none());
        session.set_token("abc".into());
        assert_eq!(session.token(), Some("abc"));
        session.invalidate();
        assert!(session.token().is_none());
        assert_eq!(Session::with_token("t").token(), Some("t"));
    }
}
