//! GHN (Giao Hang Nhanh) implementation of [`CarrierGateway`].

mod wire;

use async_trait::async_trait;
use bazaar_core::carrier::{
    CancelResult, CarrierError, CarrierGateway, CarrierLogEntry, CreateShipmentSpec,
    CreatedShipment, FeeQuote, FeeRequest, LabelToken, ShipmentDetail,
};
use bazaar_shared::Masked;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use wire::{
    vnd, CancelData, CreateOrderBody, CreateOrderData, CreateOrderItem, DetailData, Envelope,
    FeeBody, FeeData, OrderCodeBody, OrderCodesBody, TokenData,
};

pub const DEFAULT_BASE_URL: &str = "https://online-gateway.ghn.vn/shiip/public-api/";
pub const DEFAULT_LABEL_PRINT_URL: &str = "https://online-gateway.ghn.vn/a5/public-api/printA5";

/// Pick-up address printed on every order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderInfo {
    pub name: String,
    pub phone: Masked<String>,
    pub address: String,
    pub ward_name: String,
    pub district_name: String,
    pub province_name: String,
    /// Used as the origin of fee quotes that do not name one.
    pub district_id: Option<i32>,
    pub ward_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GhnSettings {
    pub base_url: String,
    pub token: Masked<String>,
    pub shop_id: i64,
    pub timeout: Duration,
    pub label_print_url: String,
    pub sender: SenderInfo,
}

/// HTTP client for the GHN public API. One instance is shared process-wide.
#[derive(Debug, Clone)]
pub struct GhnClient {
    http: reqwest::Client,
    settings: GhnSettings,
}

impl GhnClient {
    pub fn new(settings: GhnSettings) -> Result<Self, CarrierError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| CarrierError::Unavailable(format!("failed to build http client: {}", e)))?;
        Ok(Self { http, settings })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    /// One POST round-trip. Returns the envelope's `data` (null when absent).
    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, CarrierError> {
        let resp = self
            .http
            .post(self.url(path))
            .header("Token", self.settings.token.expose().as_str())
            .header("ShopId", self.settings.shop_id.to_string())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("{} timed out after {:?}", path, self.settings.timeout)
                } else {
                    format!("{} request failed: {}", path, e)
                };
                tracing::warn!(path = path, "GHN call failed: {}", reason);
                CarrierError::Unavailable(reason)
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            CarrierError::Unavailable(format!("{} response read failed: {}", path, e))
        })?;
        let envelope: Option<Envelope> = serde_json::from_str(&text).ok();
        let message = envelope
            .as_ref()
            .and_then(|env| env.message.clone())
            .unwrap_or_else(|| text.trim().to_string());

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::error!(path = path, status = status.as_u16(), "GHN rejected credentials");
            return Err(CarrierError::Auth(message));
        }

        let envelope = match envelope {
            Some(env) => env,
            None if status.is_success() => {
                return Err(CarrierError::Unavailable(format!(
                    "{} returned an unreadable body",
                    path
                )))
            }
            None => {
                return Err(CarrierError::Rejected {
                    code: Some(i64::from(status.as_u16())),
                    message,
                })
            }
        };

        if !status.is_success() || envelope.code != 200 {
            tracing::warn!(path = path, status = status.as_u16(), code = envelope.code, "GHN rejected request: {}", message);
            return Err(CarrierError::Rejected {
                code: Some(envelope.code),
                message,
            });
        }

        tracing::debug!(path = path, "GHN call succeeded");
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    fn decode<T: DeserializeOwned>(path: &str, data: Value) -> Result<T, CarrierError> {
        serde_json::from_value(data)
            .map_err(|e| CarrierError::Unavailable(format!("{} response decode failed: {}", path, e)))
    }
}

/// GHN mostly sends RFC 3339; older endpoints send a naive `YYYY-MM-DD HH:MM:SS` in UTC.
fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[async_trait]
impl CarrierGateway for GhnClient {
    fn name(&self) -> &'static str {
        "GHN"
    }

    async fn create_order(&self, spec: &CreateShipmentSpec) -> Result<CreatedShipment, CarrierError> {
        const PATH: &str = "v2/shipping-order/create";
        let sender = &self.settings.sender;
        let dims = spec.dimensions;
        let body = CreateOrderBody {
            payment_type_id: spec.payment_type_id,
            note: spec.note.as_deref(),
            required_note: spec.required_note.as_str(),
            client_order_code: spec.client_order_code.as_deref(),
            from_name: &sender.name,
            from_phone: sender.phone.expose(),
            from_address: &sender.address,
            from_ward_name: &sender.ward_name,
            from_district_name: &sender.district_name,
            from_province_name: &sender.province_name,
            to_name: &spec.recipient.name,
            to_phone: spec.recipient.phone.expose(),
            to_address: &spec.recipient.address,
            to_ward_code: &spec.recipient.ward_code,
            to_district_id: spec.recipient.district_id,
            cod_amount: vnd(spec.cod_amount),
            content: &spec.content,
            weight: spec.weight_grams,
            length: dims.map(|d| d.length),
            width: dims.map(|d| d.width),
            height: dims.map(|d| d.height),
            insurance_value: spec.insurance_value.map(vnd),
            service_type_id: spec.service_type_id,
            items: spec
                .items
                .iter()
                .map(|item| CreateOrderItem {
                    name: &item.name,
                    quantity: item.quantity,
                    price: vnd(item.price),
                })
                .collect(),
        };

        let raw = self.post(PATH, &body).await?;
        let data: CreateOrderData = Self::decode(PATH, raw.clone())?;
        tracing::info!(tracking_code = %data.order_code, total_fee = %data.total_fee, "GHN order created");
        Ok(CreatedShipment {
            tracking_code: data.order_code,
            total_fee: data.total_fee,
            expected_delivery_time: parse_time(data.expected_delivery_time.as_deref()),
            raw,
        })
    }

    async fn get_order_detail(&self, tracking_code: &str) -> Result<ShipmentDetail, CarrierError> {
        const PATH: &str = "v2/shipping-order/detail";
        let raw = self
            .post(PATH, &OrderCodeBody { order_code: tracking_code })
            .await?;
        let data: DetailData = Self::decode(PATH, raw)?;
        Ok(ShipmentDetail {
            tracking_code: data.order_code,
            status: data.status,
            log: data
                .log
                .unwrap_or_default()
                .into_iter()
                .map(|entry| CarrierLogEntry {
                    timestamp: parse_time(entry.updated_date.as_deref()),
                    status: entry.status,
                    location: entry.location,
                    message: entry.message,
                })
                .collect(),
            expected_delivery_time: parse_time(data.leadtime.as_deref()),
        })
    }

    async fn cancel_order(&self, tracking_codes: &[String]) -> Result<CancelResult, CarrierError> {
        const PATH: &str = "v2/switch-status/cancel";
        let raw = self
            .post(PATH, &OrderCodesBody { order_codes: tracking_codes })
            .await?;
        if raw.is_null() {
            return Ok(CancelResult {
                result: true,
                message: "Success".to_string(),
            });
        }

        let results: Vec<CancelData> = Self::decode(PATH, raw)?;
        let failures: Vec<String> = results
            .iter()
            .filter(|r| !r.result)
            .map(|r| match (&r.order_code, &r.message) {
                (Some(code), Some(message)) => format!("{}: {}", code, message),
                (None, Some(message)) => message.clone(),
                (Some(code), None) => format!("{}: cancellation refused", code),
                (None, None) => "cancellation refused".to_string(),
            })
            .collect();

        if failures.is_empty() {
            Ok(CancelResult {
                result: true,
                message: results
                    .into_iter()
                    .find_map(|r| r.message)
                    .unwrap_or_else(|| "Success".to_string()),
            })
        } else {
            Ok(CancelResult {
                result: false,
                message: failures.join("; "),
            })
        }
    }

    async fn calculate_fee(&self, request: &FeeRequest) -> Result<FeeQuote, CarrierError> {
        const PATH: &str = "v2/shipping-order/fee";
        let sender = &self.settings.sender;
        let dims = request.dimensions;
        let body = FeeBody {
            from_district_id: request.from_district_id.or(sender.district_id),
            from_ward_code: request.from_ward_code.clone().or_else(|| sender.ward_code.clone()),
            to_district_id: request.to_district_id,
            to_ward_code: request.to_ward_code.clone(),
            weight: request.weight_grams,
            length: dims.map(|d| d.length),
            width: dims.map(|d| d.width),
            height: dims.map(|d| d.height),
            insurance_value: request.insurance_value.map(vnd),
            service_type_id: request.service_type_id.unwrap_or(2),
            cod_value: request.cod_value.map(vnd),
        };

        let raw = self.post(PATH, &body).await?;
        let data: FeeData = Self::decode(PATH, raw.clone())?;
        Ok(FeeQuote {
            service_fee: data.service_fee,
            insurance_fee: data.insurance_fee,
            cod_fee: data.cod_fee,
            total_fee: data.total,
            raw,
        })
    }

    async fn get_label(&self, tracking_code: &str) -> Result<LabelToken, CarrierError> {
        const PATH: &str = "v2/a5/gen-token";
        let codes = [tracking_code.to_string()];
        let raw = self.post(PATH, &OrderCodesBody { order_codes: &codes }).await?;
        let data: TokenData = Self::decode(PATH, raw)?;
        Ok(LabelToken { token: data.token })
    }

    fn label_url(&self, token: &LabelToken) -> String {
        format!("{}?token={}", self.settings.label_print_url, token.token)
    }
}
