//! # REST Movement Source
//!
//! [`MovementSource`] over the ERP's cash-register REST API.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET  {base}/cash-registers/active            → register | 404 | 204   │
//! │  GET  {base}/cash-registers/{id}/movements?…  → [movement]             │
//! │  POST {base}/cash-registers/{id}/movements    → movement               │
//! │  POST {base}/cash-registers/open              → register               │
//! │  POST {base}/cash-registers/{id}/close        → register               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Normalization
//! The backend is loose about shapes. Everything below is accepted and
//! normalized here, once, before any domain type is built:
//!
//! - bodies bare or wrapped in `{"data": …}`
//! - ids as strings or numbers
//! - amounts as JSON numbers or decimal strings
//! - snake_case or camelCase field names
//! - timestamps with or without an offset (offset-less means UTC)

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use till_core::{
    CashMovement, CashRegister, CloseRegister, Money, MovementFilters, MovementType, NewMovement,
    OpenRegister, RegisterStatus,
};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::source::MovementSource;

/// Header carrying a client-generated key on every POST.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

// =============================================================================
// HTTP Source
// =============================================================================

/// REST-backed movement source.
///
/// The auth token is never logged.
#[derive(Debug, Clone)]
pub struct HttpMovementSource {
    http: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpMovementSource {
    /// Builds a source from the `[api]` config section.
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let http = Client::builder().timeout(config.api.timeout()).build()?;
        let mut source = Self::with_client(http, &config.api.base_url)?;
        source.auth_token = config.api.auth_token.clone();
        Ok(source)
    }

    pub fn new_with_base_url(base_url: &str) -> ClientResult<Self> {
        Self::with_client(Client::new(), base_url)
    }

    fn with_client(http: Client, base_url: &str) -> ClientResult<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(format!(
                "API URL cannot be used as a base: {}",
                base_url
            )));
        }
        Ok(HttpMovementSource {
            http,
            base_url,
            auth_token: None,
        })
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// `{base}/cash-registers/{segments…}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("cash-registers")
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = error_message(response).await;
        debug!(status = status.as_u16(), %message, "Request failed");
        Err(ClientError::from_status(status.as_u16(), message))
    }

    async fn post<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> ClientResult<Response> {
        let key = Uuid::new_v4();
        debug!(%url, idempotency_key = %key, "POST");
        self.send(
            self.http
                .post(url)
                .header(IDEMPOTENCY_HEADER, key.to_string())
                .json(body),
        )
        .await
    }
}

#[async_trait]
impl MovementSource for HttpMovementSource {
    async fn fetch_active_register(&self) -> ClientResult<Option<CashRegister>> {
        let url = self.endpoint(&["active"])?;
        let response = self.authorize(self.http.get(url)).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            debug!(status = status.as_u16(), "No active register");
            return Ok(None);
        }
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(ClientError::from_status(status.as_u16(), message));
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let wire: Option<WireRegister> = decode_envelope(&body)?;
        wire.map(WireRegister::into_register).transpose()
    }

    async fn fetch_movements(
        &self,
        register_id: &str,
        filters: &MovementFilters,
    ) -> ClientResult<Vec<CashMovement>> {
        let url = self.endpoint(&[register_id, "movements"])?;
        let response = self.send(self.http.get(url).query(filters.pairs())).await?;
        let body = response.bytes().await?;

        let wire: Vec<WireMovement> = decode_envelope(&body)?;
        debug!(register_id, count = wire.len(), "Fetched movements");
        wire.into_iter()
            .map(|m| m.into_movement(register_id))
            .collect()
    }

    async fn submit_movement(
        &self,
        register_id: &str,
        movement: &NewMovement,
    ) -> ClientResult<CashMovement> {
        let url = self.endpoint(&[register_id, "movements"])?;
        let body = WireNewMovement {
            movement_type: movement.movement_type.as_str(),
            amount: movement.amount.to_string(),
            concept: &movement.concept,
            notes: movement.notes.as_deref(),
        };

        let response = self.post(url, &body).await?;
        let wire: WireMovement = decode_envelope(&response.bytes().await?)?;
        wire.into_movement(register_id)
    }

    async fn open_register(&self, request: &OpenRegister) -> ClientResult<CashRegister> {
        let url = self.endpoint(&["open"])?;
        let body = WireOpenRegister {
            initial_balance: request.initial_balance.to_string(),
            notes: request.notes.as_deref(),
        };

        let response = self.post(url, &body).await?;
        let wire: WireRegister = decode_envelope(&response.bytes().await?)?;
        wire.into_register()
    }

    async fn close_register(
        &self,
        register_id: &str,
        request: &CloseRegister,
    ) -> ClientResult<CashRegister> {
        let url = self.endpoint(&[register_id, "close"])?;
        let body = WireCloseRegister {
            counted_balance: request.counted_balance.map(|b| b.to_string()),
            notes: request.notes.as_deref(),
        };

        let response = self.post(url, &body).await?;
        let wire: WireRegister = decode_envelope(&response.bytes().await?)?;
        wire.into_register()
    }
}

/// Best-effort message from an error response body.
async fn error_message(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    let from_json = serde_json::from_str::<Value>(&text).ok().and_then(|v| {
        ["message", "error"]
            .iter()
            .find_map(|key| v.get(*key).and_then(Value::as_str).map(str::to_string))
    });

    match from_json {
        Some(message) => message,
        None if text.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        None => text.chars().take(200).collect(),
    }
}

// =============================================================================
// Wire DTOs
// =============================================================================

/// A body either bare or wrapped as `{"data": …}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(inner) => inner,
        }
    }
}

fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> ClientResult<T> {
    let envelope: Envelope<T> = serde_json::from_slice(body)?;
    Ok(envelope.into_inner())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(serde_json::Number),
}

impl IdValue {
    fn into_string(self) -> String {
        match self {
            IdValue::Text(s) => s,
            IdValue::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AmountValue {
    Text(String),
    Number(serde_json::Number),
}

/// Largest magnitude, in minor units, an `f64` still holds exactly (2^53).
const MAX_EXACT_MINOR: f64 = 9_007_199_254_740_992.0;

impl AmountValue {
    /// Exact conversion; a JSON number is re-read through its shortest
    /// decimal form, never through float arithmetic.
    ///
    /// A JSON number carrying binary noise past the cents (`0.30000000000000004`)
    /// is rounded to the nearest cent with a warning. Strings stay strict.
    fn to_money(&self) -> ClientResult<Money> {
        match self {
            AmountValue::Text(s) => {
                Money::from_decimal_str(s).map_err(|e| ClientError::Decode(e.to_string()))
            }
            AmountValue::Number(n) => {
                let raw = n.to_string();
                Money::from_decimal_str(&raw).or_else(|err| -> ClientResult<Money> {
                    let minor = n
                        .as_f64()
                        .map(|value| (value * 100.0).round())
                        .filter(|minor| minor.is_finite() && minor.abs() <= MAX_EXACT_MINOR)
                        .ok_or_else(|| ClientError::Decode(err.to_string()))?;
                    warn!(raw = %raw, minor, "Rounded JSON amount to cents");
                    Ok(Money::from_minor(minor as i64))
                })
            }
        }
    }
}

fn parse_timestamp(field: &str, raw: &str) -> ClientResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ClientError::Decode(format!("{field}: unrecognized timestamp '{raw}'")))
}

#[derive(Debug, Deserialize)]
struct WireRegister {
    id: IdValue,
    #[serde(alias = "initialBalance")]
    initial_balance: AmountValue,
    #[serde(default, alias = "currentBalance")]
    current_balance: Option<AmountValue>,
    #[serde(default)]
    status: Option<String>,
    #[serde(alias = "openedAt")]
    opened_at: String,
    #[serde(default, alias = "closedAt")]
    closed_at: Option<String>,
    #[serde(default, alias = "openedBy")]
    opened_by: Option<IdValue>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl WireRegister {
    fn into_register(self) -> ClientResult<CashRegister> {
        let closed_at = self
            .closed_at
            .as_deref()
            .map(|raw| parse_timestamp("closed_at", raw))
            .transpose()?;

        let status = match self.status.as_deref().map(RegisterStatus::parse) {
            Some(Some(status)) => status,
            Some(None) | None if closed_at.is_some() => RegisterStatus::Closed,
            _ => RegisterStatus::Open,
        };

        Ok(CashRegister {
            id: self.id.into_string(),
            initial_balance: self.initial_balance.to_money()?,
            current_balance: self.current_balance.as_ref().map(AmountValue::to_money).transpose()?,
            status,
            opened_at: parse_timestamp("opened_at", &self.opened_at)?,
            closed_at,
            opened_by: self.opened_by.map(IdValue::into_string),
            notes: self.notes,
            extra: self.extra,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireMovement {
    id: IdValue,
    #[serde(
        default,
        alias = "registerId",
        alias = "cash_register_id",
        alias = "cashRegisterId"
    )]
    register_id: Option<IdValue>,
    #[serde(alias = "movementType", alias = "type")]
    movement_type: String,
    amount: AmountValue,
    #[serde(default)]
    concept: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(alias = "createdAt")]
    created_at: String,
    #[serde(default, alias = "runningBalance")]
    running_balance: Option<AmountValue>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl WireMovement {
    /// `register_id` fills in the owner when the body omits it.
    ///
    /// An unreadable amount becomes zero so the reconciler reports the row
    /// as malformed instead of the whole fetch failing.
    fn into_movement(self, register_id: &str) -> ClientResult<CashMovement> {
        let id = self.id.into_string();

        let amount = self.amount.to_money().unwrap_or_else(|e| {
            warn!(movement_id = %id, error = %e, "Unreadable movement amount, treating as zero");
            Money::zero()
        });

        let running_balance = self
            .running_balance
            .as_ref()
            .and_then(|raw| match raw.to_money() {
                Ok(balance) => Some(balance),
                Err(e) => {
                    warn!(movement_id = %id, error = %e, "Unreadable running balance, recomputing");
                    None
                }
            });

        Ok(CashMovement {
            register_id: self
                .register_id
                .map(IdValue::into_string)
                .unwrap_or_else(|| register_id.to_string()),
            movement_type: MovementType::parse(&self.movement_type),
            amount,
            concept: self.concept,
            notes: self.notes,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            running_balance,
            extra: self.extra,
            id,
        })
    }
}

#[derive(Debug, Serialize)]
struct WireNewMovement<'a> {
    movement_type: &'a str,
    amount: String,
    concept: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WireOpenRegister<'a> {
    initial_balance: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WireCloseRegister<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    counted_balance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}
