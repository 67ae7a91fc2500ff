use async_trait::async_trait;
use bazaar_shared::Masked;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failures of a carrier round-trip. None of them are retried here; the caller owns
/// the retry policy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CarrierError {
    /// Transport failure, timeout or an unreadable response.
    #[error("Carrier unavailable: {0}")]
    Unavailable(String),
    /// The carrier understood the request and refused it. `message` is verbatim.
    #[error("Carrier rejected request: {message}")]
    Rejected { code: Option<i64>, message: String },
    #[error("Carrier authentication failed: {0}")]
    Auth(String),
}

/// Delivery instruction printed on the parcel.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequiredNote {
    /// Recipient may open and try the goods.
    #[serde(rename = "CHOTHUHANG")]
    AllowTryOut,
    /// Recipient may look but not try.
    #[serde(rename = "CHOXEMHANGKHONGTHU")]
    AllowViewNoTry,
    #[default]
    #[serde(rename = "KHONGCHOXEMHANG")]
    NoView,
}

impl RequiredNote {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredNote::AllowTryOut => "CHOTHUHANG",
            RequiredNote::AllowViewNoTry => "CHOXEMHANGKHONGTHU",
            RequiredNote::NoView => "KHONGCHOXEMHANG",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipient {
    pub name: String,
    pub phone: Masked<String>,
    pub address: String,
    pub ward_code: String,
    pub district_id: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimensions {
    pub length: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShipmentItem {
    pub name: String,
    pub quantity: u32,
    pub price: Decimal,
}

fn default_service_type() -> u32 {
    2
}

fn default_payment_type() -> u32 {
    1
}

/// What the platform asks the carrier to pick up and deliver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateShipmentSpec {
    pub recipient: Recipient,
    #[serde(default)]
    pub cod_amount: Decimal,
    pub insurance_value: Option<Decimal>,
    pub content: String,
    pub weight_grams: u32,
    pub dimensions: Option<Dimensions>,
    #[serde(default = "default_service_type")]
    pub service_type_id: u32,
    /// 1 = shop pays the fee, 2 = recipient pays.
    #[serde(default = "default_payment_type")]
    pub payment_type_id: u32,
    #[serde(default)]
    pub required_note: RequiredNote,
    pub note: Option<String>,
    pub client_order_code: Option<String>,
    #[serde(default)]
    pub items: Vec<ShipmentItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedShipment {
    pub tracking_code: String,
    pub total_fee: Decimal,
    pub expected_delivery_time: Option<DateTime<Utc>>,
    /// Carrier routing metadata and fee breakdown, kept verbatim.
    pub raw: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CarrierLogEntry {
    pub status: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShipmentDetail {
    pub tracking_code: String,
    /// Current status in carrier vocabulary.
    pub status: String,
    pub log: Vec<CarrierLogEntry>,
    pub expected_delivery_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelResult {
    pub result: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeeRequest {
    pub from_district_id: Option<i32>,
    pub from_ward_code: Option<String>,
    pub to_district_id: i32,
    pub to_ward_code: String,
    pub weight_grams: u32,
    pub dimensions: Option<Dimensions>,
    pub insurance_value: Option<Decimal>,
    pub service_type_id: Option<u32>,
    pub cod_value: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeeQuote {
    pub service_fee: Decimal,
    pub insurance_fee: Decimal,
    pub cod_fee: Decimal,
    pub total_fee: Decimal,
    pub raw: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelToken {
    pub token: String,
}

/// Thin adapter over a shipping carrier's remote API.
///
/// Every call is one bounded-timeout round-trip. Implementations never retry.
#[async_trait]
pub trait CarrierGateway: Send + Sync {
    /// Short carrier name stored on each shipment, e.g. `GHN`.
    fn name(&self) -> &'static str;

    async fn create_order(&self, spec: &CreateShipmentSpec) -> Result<CreatedShipment, CarrierError>;

    async fn get_order_detail(&self, tracking_code: &str) -> Result<ShipmentDetail, CarrierError>;

    async fn cancel_order(&self, tracking_codes: &[String]) -> Result<CancelResult, CarrierError>;

    async fn calculate_fee(&self, request: &FeeRequest) -> Result<FeeQuote, CarrierError>;

    async fn get_label(&self, tracking_code: &str) -> Result<LabelToken, CarrierError>;

    /// URL a label token can be printed from.
    fn label_url(&self, token: &LabelToken) -> String;
}
