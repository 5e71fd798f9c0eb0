//! Configuration for the order bridge.
//!
//! All column ranges, status lookup tables, schedule offsets and endpoints
//! live in one `BridgeConfig`, read from `orderbridge.toml`. Secrets are never
//! expected in the file: they are layered on top from the environment (a
//! `.env` file is loaded first by the binary).
//!
//! Layering: defaults → file → environment.
//!
//! # Configuration File Format
//!
//! ```toml
//! [source]
//! intake_window_days = 20
//! token_error_codes = [-2]
//!
//! [sheets.order]
//! spreadsheet_id = "1AbC..."
//! tab = "orders"
//! start = "B"
//! end = "AK"
//! start_line = 3
//!
//! [[status_map.dispatch_to_order]]
//! dispatch = "미배차"
//! order = "배차실패"
//!
//! [schedule]
//! intake_second = 1
//! utc_offset_hours = 9
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::ledger::a1;
use crate::ledger::Sheet;
use crate::status::{DispatchStatus, OrderStatus};

pub const DEFAULT_CONFIG_FILE: &str = "orderbridge.toml";

/// Upper bound for `source.intake_window_days`.
pub const MAX_INTAKE_WINDOW_DAYS: i64 = 365;

/// Order platform endpoints, credentials and intake window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_base_url")]
    pub base_url: String,
    /// Token endpoint, relative to `base_url`
    #[serde(default = "default_auth_path")]
    pub auth_path: String,
    /// API key (env: `IMWEB_API_KEY`)
    #[serde(default)]
    pub api_key: Option<String>,
    /// API secret (env: `IMWEB_API_SECRET`)
    #[serde(default)]
    pub api_secret: Option<String>,
    /// How many days back the intake task looks for orders
    #[serde(default = "default_intake_window_days")]
    pub intake_window_days: i64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Response codes that mean the access token must be refreshed
    #[serde(default = "default_token_error_codes")]
    pub token_error_codes: Vec<i64>,
    #[serde(default)]
    pub products: ProductIds,
}

fn default_source_base_url() -> String {
    "https://api.imweb.me/v2".to_string()
}

fn default_auth_path() -> String {
    "/auth".to_string()
}

fn default_intake_window_days() -> i64 {
    20
}

fn default_page_size() -> u32 {
    100
}

fn default_token_error_codes() -> Vec<i64> {
    vec![-2]
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_base_url(),
            auth_path: default_auth_path(),
            api_key: None,
            api_secret: None,
            intake_window_days: default_intake_window_days(),
            page_size: default_page_size(),
            token_error_codes: default_token_error_codes(),
            products: ProductIds::default(),
        }
    }
}

/// Product numbers on the order platform.
///
/// The `*_route` products carry pickup/drop-off details in their options;
/// the plain ones predate that form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductIds {
    pub charter: i64,
    pub pickup: i64,
    pub sending: i64,
    pub charter_route: i64,
    pub pickup_route: i64,
    pub sending_route: i64,
}

impl Default for ProductIds {
    fn default() -> Self {
        Self {
            charter: 133,
            pickup: 83,
            sending: 122,
            charter_route: 148,
            pickup_route: 146,
            sending_route: 147,
        }
    }
}

/// One named range of the ledger: a tab plus a fixed column span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetRange {
    #[serde(default)]
    pub spreadsheet_id: String,
    pub tab: String,
    pub start: String,
    pub end: String,
    /// Counter value before the first data row (the last header row)
    #[serde(default = "default_start_line")]
    pub start_line: i64,
}

fn default_start_line() -> i64 {
    3
}

impl SheetRange {
    fn new(tab: &str, start: &str, end: &str) -> Self {
        Self {
            spreadsheet_id: String::new(),
            tab: tab.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            start_line: default_start_line(),
        }
    }

    /// Number of cells in one row of this range.
    pub fn width(&self) -> usize {
        a1::range_width(&self.start, &self.end).unwrap_or(0)
    }

    /// Zero-based position of `column` inside this range.
    pub fn offset_of(&self, column: &str) -> Option<usize> {
        let start = a1::column_index(&self.start).ok()?;
        let col = a1::column_index(column).ok()?;
        col.checked_sub(start).filter(|offset| *offset < self.width())
    }
}

/// Spreadsheet ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    #[serde(default = "default_sheets_api_base")]
    pub api_base: String,
    /// OAuth bearer token (env: `SHEETS_ACCESS_TOKEN`)
    #[serde(default)]
    pub access_token: Option<String>,
    /// OAuth token endpoint used to refresh `access_token`
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// OAuth client id (env: `SHEETS_CLIENT_ID`)
    #[serde(default)]
    pub client_id: Option<String>,
    /// OAuth client secret (env: `SHEETS_CLIENT_SECRET`)
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Long-lived refresh token (env: `SHEETS_REFRESH_TOKEN`)
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_order_range")]
    pub order: SheetRange,
    #[serde(default = "default_order_log_range")]
    pub order_log: SheetRange,
    #[serde(default = "default_dispatch_range")]
    pub dispatch: SheetRange,
    #[serde(default = "default_dispatch_log_range")]
    pub dispatch_log: SheetRange,
    #[serde(default = "default_order_status_column")]
    pub order_status_column: String,
    #[serde(default = "default_dispatch_status_column")]
    pub dispatch_status_column: String,
    /// The "number" column shows `row - row_label_offset`
    #[serde(default = "default_start_line")]
    pub row_label_offset: i64,
}

fn default_sheets_api_base() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_order_range() -> SheetRange {
    SheetRange::new("orders", "B", "AK")
}

fn default_order_log_range() -> SheetRange {
    SheetRange::new("orders_log", "B", "AL")
}

fn default_dispatch_range() -> SheetRange {
    SheetRange::new("dispatch", "B", "R")
}

fn default_dispatch_log_range() -> SheetRange {
    SheetRange::new("dispatch_log", "B", "S")
}

fn default_order_status_column() -> String {
    "C".to_string()
}

fn default_dispatch_status_column() -> String {
    "R".to_string()
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            api_base: default_sheets_api_base(),
            access_token: None,
            token_url: default_token_url(),
            client_id: None,
            client_secret: None,
            refresh_token: None,
            order: default_order_range(),
            order_log: default_order_log_range(),
            dispatch: default_dispatch_range(),
            dispatch_log: default_dispatch_log_range(),
            order_status_column: default_order_status_column(),
            dispatch_status_column: default_dispatch_status_column(),
            row_label_offset: default_start_line(),
        }
    }
}

impl SheetsConfig {
    pub fn range(&self, sheet: Sheet) -> &SheetRange {
        match sheet {
            Sheet::Order => &self.order,
            Sheet::OrderLog => &self.order_log,
            Sheet::Dispatch => &self.dispatch,
            Sheet::DispatchLog => &self.dispatch_log,
        }
    }

    /// Position of the status cell inside an order ledger row.
    pub fn order_status_index(&self) -> Result<usize, ConfigError> {
        self.status_index(Sheet::Order, &self.order_status_column)
    }

    /// Position of the status cell inside a dispatch ledger row.
    pub fn dispatch_status_index(&self) -> Result<usize, ConfigError> {
        self.status_index(Sheet::Dispatch, &self.dispatch_status_column)
    }

    fn status_index(&self, sheet: Sheet, column: &str) -> Result<usize, ConfigError> {
        self.range(sheet)
            .offset_of(column)
            .ok_or_else(|| ConfigError::InvalidColumn {
                range: sheet.name().to_string(),
                column: column.to_string(),
                message: "status column is outside the range".to_string(),
            })
    }

    /// Sheet column index of a range's first column.
    pub fn first_column(&self, sheet: Sheet) -> Result<usize, ConfigError> {
        let range = self.range(sheet);
        a1::column_index(&range.start).map_err(|message| ConfigError::InvalidColumn {
            range: sheet.name().to_string(),
            column: range.start.clone(),
            message,
        })
    }

    /// Whether a rejected access token can be replaced from the refresh token.
    pub fn can_refresh_token(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some() && self.refresh_token.is_some()
    }
}

/// Fixed values written into every dispatch ledger row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchRowConfig {
    #[serde(default)]
    pub requester_name: String,
    #[serde(default)]
    pub contact_phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchMapping {
    pub dispatch: DispatchStatus,
    pub order: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeMapping {
    pub order: OrderStatus,
    pub dispatch: DispatchStatus,
}

/// Status lookup tables between the two ledgers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMapConfig {
    #[serde(default = "default_dispatch_to_order")]
    pub dispatch_to_order: Vec<DispatchMapping>,
    #[serde(default = "default_order_to_dispatch")]
    pub order_to_dispatch: Vec<CascadeMapping>,
}

fn default_dispatch_to_order() -> Vec<DispatchMapping> {
    use DispatchStatus as D;
    use OrderStatus as O;
    [
        (D::DispatchNo, O::DispatchFail),
        (D::DispatchDone, O::DispatchDone),
        (D::Cancel, O::Cancel),
        (D::Done, O::Done),
        (D::ChangeJini, O::DispatchChange),
        (D::CheckChangeBook, O::DispatchChange),
        (D::Expected, O::DispatchChange),
        (D::Waiting, O::DispatchChange),
    ]
    .into_iter()
    .map(|(dispatch, order)| DispatchMapping { dispatch, order })
    .collect()
}

fn default_order_to_dispatch() -> Vec<CascadeMapping> {
    vec![CascadeMapping {
        order: OrderStatus::Cancel,
        dispatch: DispatchStatus::Cancel,
    }]
}

impl Default for StatusMapConfig {
    fn default() -> Self {
        Self {
            dispatch_to_order: default_dispatch_to_order(),
            order_to_dispatch: default_order_to_dispatch(),
        }
    }
}

impl StatusMapConfig {
    pub fn order_status_for(&self, dispatch: DispatchStatus) -> Option<OrderStatus> {
        self.dispatch_to_order
            .iter()
            .find(|m| m.dispatch == dispatch)
            .map(|m| m.order)
    }

    pub fn dispatch_status_for(&self, order: OrderStatus) -> Option<DispatchStatus> {
        self.order_to_dispatch
            .iter()
            .find(|m| m.order == order)
            .map(|m| m.dispatch)
    }
}

/// Second-of-minute trigger for each task, plus the local time zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_intake_second")]
    pub intake_second: u32,
    #[serde(default = "default_dispatch_second")]
    pub dispatch_second: u32,
    #[serde(default = "default_order_changes_second")]
    pub order_changes_second: u32,
    #[serde(default = "default_dispatch_changes_second")]
    pub dispatch_changes_second: u32,
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

fn default_intake_second() -> u32 {
    1
}

fn default_dispatch_second() -> u32 {
    20
}

fn default_order_changes_second() -> u32 {
    30
}

fn default_dispatch_changes_second() -> u32 {
    40
}

fn default_utc_offset_hours() -> i32 {
    9
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            intake_second: default_intake_second(),
            dispatch_second: default_dispatch_second(),
            order_changes_second: default_order_changes_second(),
            dispatch_changes_second: default_dispatch_changes_second(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

impl ScheduleConfig {
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}

/// Chat webhook URLs per alert category and the direct-message bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// env: `SLACK_NEW_ORDER_WEBHOOK`
    #[serde(default)]
    pub new_order_webhook: Option<String>,
    /// env: `SLACK_DATA_CHANGE_WEBHOOK`
    #[serde(default)]
    pub data_change_webhook: Option<String>,
    /// env: `SLACK_ERROR_WEBHOOK`
    #[serde(default)]
    pub error_webhook: Option<String>,
    /// env: `TELEGRAM_BOT_TOKEN`
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    /// env: `TELEGRAM_CHAT_ID`
    #[serde(default)]
    pub telegram_chat_id: Option<i64>,
    #[serde(default = "default_telegram_api_base")]
    pub telegram_api_base: String,
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            new_order_webhook: None,
            data_change_webhook: None,
            error_webhook: None,
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_api_base: default_telegram_api_base(),
        }
    }
}

/// On-disk locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default = "default_order_log_dir")]
    pub order_log_dir: PathBuf,
    #[serde(default = "default_order_log_prefix")]
    pub order_log_prefix: String,
    #[serde(default = "default_dispatch_log_dir")]
    pub dispatch_log_dir: PathBuf,
    #[serde(default = "default_dispatch_log_prefix")]
    pub dispatch_log_prefix: String,
    #[serde(default = "default_error_log_dir")]
    pub error_log_dir: PathBuf,
}

fn default_database() -> PathBuf {
    PathBuf::from("data/orderbridge.db")
}

fn default_order_log_dir() -> PathBuf {
    PathBuf::from("files/order")
}

fn default_order_log_prefix() -> String {
    "ORDER".to_string()
}

fn default_dispatch_log_dir() -> PathBuf {
    PathBuf::from("files/dispatch")
}

fn default_dispatch_log_prefix() -> String {
    "DISPATCH".to_string()
}

fn default_error_log_dir() -> PathBuf {
    PathBuf::from("files/error")
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            order_log_dir: default_order_log_dir(),
            order_log_prefix: default_order_log_prefix(),
            dispatch_log_dir: default_dispatch_log_dir(),
            dispatch_log_prefix: default_dispatch_log_prefix(),
            error_log_dir: default_error_log_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub dispatch: DispatchRowConfig,
    #[serde(default)]
    pub status_map: StatusMapConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub files: FilesConfig,
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.check()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse configuration")?;
        config.check()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Ok(Self::load(path)?)
        } else {
            Ok(Self::default())
        }
    }

    /// File (or defaults) with the process environment layered on top.
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override secrets and endpoints from environment-style lookups.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("IMWEB_API_KEY") {
            self.source.api_key = Some(v);
        }
        if let Some(v) = non_empty("IMWEB_API_SECRET") {
            self.source.api_secret = Some(v);
        }
        if let Some(v) = non_empty("SHEETS_ACCESS_TOKEN") {
            self.sheets.access_token = Some(v);
        }
        if let Some(v) = non_empty("SHEETS_CLIENT_ID") {
            self.sheets.client_id = Some(v);
        }
        if let Some(v) = non_empty("SHEETS_CLIENT_SECRET") {
            self.sheets.client_secret = Some(v);
        }
        if let Some(v) = non_empty("SHEETS_REFRESH_TOKEN") {
            self.sheets.refresh_token = Some(v);
        }
        if let Some(v) = non_empty("ORDER_SPREADSHEET_ID") {
            self.sheets.order.spreadsheet_id = v.clone();
            self.sheets.order_log.spreadsheet_id = v;
        }
        if let Some(v) = non_empty("DISPATCH_SPREADSHEET_ID") {
            self.sheets.dispatch.spreadsheet_id = v.clone();
            self.sheets.dispatch_log.spreadsheet_id = v;
        }
        if let Some(v) = non_empty("SLACK_NEW_ORDER_WEBHOOK") {
            self.notify.new_order_webhook = Some(v);
        }
        if let Some(v) = non_empty("SLACK_DATA_CHANGE_WEBHOOK") {
            self.notify.data_change_webhook = Some(v);
        }
        if let Some(v) = non_empty("SLACK_ERROR_WEBHOOK") {
            self.notify.error_webhook = Some(v);
        }
        if let Some(v) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.notify.telegram_bot_token = Some(v);
        }
        if let Some(id) = non_empty("TELEGRAM_CHAT_ID").and_then(|v| v.trim().parse().ok()) {
            self.notify.telegram_chat_id = Some(id);
        }
        if let Some(v) = non_empty("ORDERBRIDGE_DATABASE") {
            self.files.database = PathBuf::from(v);
        }
    }

    /// Hard errors: malformed column letters or reversed ranges.
    pub fn check(&self) -> Result<(), ConfigError> {
        for sheet in Sheet::ALL {
            let range = self.sheets.range(sheet);
            let start = self.sheets.first_column(sheet)?;
            let end = a1::column_index(&range.end).map_err(|message| {
                ConfigError::InvalidColumn {
                    range: sheet.name().to_string(),
                    column: range.end.clone(),
                    message,
                }
            })?;
            if start > end {
                return Err(ConfigError::InvalidColumn {
                    range: sheet.name().to_string(),
                    column: range.start.clone(),
                    message: format!("start column is after end column {}", range.end),
                });
            }
        }
        self.sheets.order_status_index()?;
        self.sheets.dispatch_status_index()?;

        let days = self.source.intake_window_days;
        if !(0..=MAX_INTAKE_WINDOW_DAYS).contains(&days) {
            return Err(ConfigError::InvalidValue {
                key: "source.intake_window_days",
                value: days.to_string(),
                message: format!("must be between 0 and {}", MAX_INTAKE_WINDOW_DAYS),
            });
        }
        Ok(())
    }

    /// Soft problems that leave the bridge runnable but degraded.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.source.api_key.is_none() || self.source.api_secret.is_none() {
            warnings.push(
                "Order API credentials missing (IMWEB_API_KEY / IMWEB_API_SECRET)".to_string(),
            );
        }
        if self.sheets.access_token.is_none() && !self.sheets.can_refresh_token() {
            warnings.push(
                "Spreadsheet credentials missing (SHEETS_ACCESS_TOKEN or SHEETS_REFRESH_TOKEN)"
                    .to_string(),
            );
        } else if self.sheets.refresh_token.is_some() && !self.sheets.can_refresh_token() {
            warnings.push(
                "Token refresh needs SHEETS_CLIENT_ID, SHEETS_CLIENT_SECRET and SHEETS_REFRESH_TOKEN"
                    .to_string(),
            );
        }
        for sheet in Sheet::ALL {
            if self.sheets.range(sheet).spreadsheet_id.is_empty() {
                warnings.push(format!("No spreadsheet id for the {} range", sheet.name()));
            }
        }
        let webhooks = [
            ("new order", &self.notify.new_order_webhook),
            ("data change", &self.notify.data_change_webhook),
            ("error", &self.notify.error_webhook),
        ];
        for (name, url) in webhooks {
            if url.is_none() {
                warnings.push(format!("No webhook configured for {} alerts", name));
            }
        }
        if self.notify.telegram_bot_token.is_some() != self.notify.telegram_chat_id.is_some() {
            warnings.push("Direct messages need both TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID".to_string());
        }
        if self.source.intake_window_days == 0 {
            warnings.push(format!(
                "intake_window_days is {}; no orders will be fetched",
                self.source.intake_window_days
            ));
        }
        for (name, second) in [
            ("intake_second", self.schedule.intake_second),
            ("dispatch_second", self.schedule.dispatch_second),
            ("order_changes_second", self.schedule.order_changes_second),
            ("dispatch_changes_second", self.schedule.dispatch_changes_second),
        ] {
            if second > 59 {
                warnings.push(format!("{} = {} wraps into the next minute", name, second));
            }
        }

        warnings
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}
