//! GHN request and response bodies.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every GHN response is wrapped as `{code, message, data}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// GHN takes whole VND amounts.
pub(crate) fn vnd(amount: Decimal) -> i64 {
    amount.round().to_i64().unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateOrderItem<'a> {
    pub name: &'a str,
    pub quantity: u32,
    pub price: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateOrderBody<'a> {
    pub payment_type_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'a str>,
    pub required_note: &'static str,
    pub client_order_code: Option<&'a str>,

    pub from_name: &'a str,
    pub from_phone: &'a str,
    pub from_address: &'a str,
    pub from_ward_name: &'a str,
    pub from_district_name: &'a str,
    pub from_province_name: &'a str,

    pub to_name: &'a str,
    pub to_phone: &'a str,
    pub to_address: &'a str,
    pub to_ward_code: &'a str,
    pub to_district_id: i32,

    pub cod_amount: i64,
    pub content: &'a str,
    pub weight: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insurance_value: Option<i64>,
    pub service_type_id: u32,
    pub items: Vec<CreateOrderItem<'a>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateOrderData {
    pub order_code: String,
    #[serde(default)]
    pub total_fee: Decimal,
    #[serde(default)]
    pub expected_delivery_time: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OrderCodeBody<'a> {
    pub order_code: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct OrderCodesBody<'a> {
    pub order_codes: &'a [String],
}

#[derive(Debug, Deserialize)]
pub(crate) struct DetailLog {
    pub status: String,
    #[serde(default)]
    pub updated_date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DetailData {
    pub order_code: String,
    pub status: String,
    #[serde(default)]
    pub log: Option<Vec<DetailLog>>,
    #[serde(default)]
    pub leadtime: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CancelData {
    #[serde(default)]
    pub order_code: Option<String>,
    pub result: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FeeBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_district_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_ward_code: Option<String>,
    pub to_district_id: i32,
    pub to_ward_code: String,
    pub weight: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insurance_value: Option<i64>,
    pub service_type_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cod_value: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeeData {
    pub total: Decimal,
    #[serde(default)]
    pub service_fee: Decimal,
    #[serde(default)]
    pub insurance_fee: Decimal,
    #[serde(default)]
    pub cod_fee: Decimal,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenData {
    pub token: String,
}
