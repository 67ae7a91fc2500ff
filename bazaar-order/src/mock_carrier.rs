use async_trait::async_trait;
use bazaar_core::carrier::{
    CancelResult, CarrierError, CarrierGateway, CreateShipmentSpec, CreatedShipment, FeeQuote,
    FeeRequest, LabelToken, ShipmentDetail,
};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Script {
    next_orders: VecDeque<(String, Decimal)>,
    details: HashMap<String, ShipmentDetail>,
    reject_cancel: Option<String>,
    next_failure: Option<CarrierError>,
    created: Vec<CreateShipmentSpec>,
    cancelled: Vec<String>,
}

/// Scriptable in-process carrier. Used by tests and by the API when
/// `carrier.mock = true`.
#[derive(Default)]
pub struct MockCarrierGateway {
    script: Mutex<Script>,
}

impl MockCarrierGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue the tracking code and fee returned by the next `create_order`.
    pub fn push_order(&self, tracking_code: &str, total_fee: i64) {
        self.script()
            .next_orders
            .push_back((tracking_code.to_string(), Decimal::from(total_fee)));
    }

    pub fn set_detail(&self, detail: ShipmentDetail) {
        self.script()
            .details
            .insert(detail.tracking_code.clone(), detail);
    }

    /// Make every cancellation answer `result=false` with `message`.
    pub fn reject_cancellations(&self, message: &str) {
        self.script().reject_cancel = Some(message.to_string());
    }

    /// Fail the next call of any kind with `error`.
    pub fn fail_next(&self, error: CarrierError) {
        self.script().next_failure = Some(error);
    }

    pub fn created(&self) -> Vec<CreateShipmentSpec> {
        self.script().created.clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.script().cancelled.clone()
    }

    fn take_failure(&self) -> Result<(), CarrierError> {
        match self.script().next_failure.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CarrierGateway for MockCarrierGateway {
    fn name(&self) -> &'static str {
        "GHN"
    }

    async fn create_order(&self, spec: &CreateShipmentSpec) -> Result<CreatedShipment, CarrierError> {
        self.take_failure()?;
        let mut script = self.script();
        script.created.push(spec.clone());
        let (tracking_code, total_fee) = script.next_orders.pop_front().unwrap_or_else(|| {
            let suffix = Uuid::new_v4().simple().to_string();
            (format!("MOCK{}", &suffix[..8].to_uppercase()), Decimal::from(15_000))
        });
        Ok(CreatedShipment {
            raw: serde_json::json!({ "order_code": tracking_code, "total_fee": total_fee }),
            tracking_code,
            total_fee,
            expected_delivery_time: None,
        })
    }

    async fn get_order_detail(&self, tracking_code: &str) -> Result<ShipmentDetail, CarrierError> {
        self.take_failure()?;
        self.script()
            .details
            .get(tracking_code)
            .cloned()
            .ok_or_else(|| CarrierError::Rejected {
                code: Some(400),
                message: format!("order {} not found", tracking_code),
            })
    }

    async fn cancel_order(&self, tracking_codes: &[String]) -> Result<CancelResult, CarrierError> {
        self.take_failure()?;
        let mut script = self.script();
        if let Some(message) = script.reject_cancel.clone() {
            return Ok(CancelResult {
                result: false,
                message,
            });
        }
        script.cancelled.extend(tracking_codes.iter().cloned());
        Ok(CancelResult {
            result: true,
            message: "Success".to_string(),
        })
    }

    async fn calculate_fee(&self, request: &FeeRequest) -> Result<FeeQuote, CarrierError> {
        self.take_failure()?;
        let service_fee = Decimal::from(15_000) + Decimal::from(request.weight_grams / 500 * 2_500);
        let cod_fee = request.cod_value.unwrap_or_default() / Decimal::from(100);
        Ok(FeeQuote {
            service_fee,
            insurance_fee: Decimal::ZERO,
            cod_fee,
            total_fee: service_fee + cod_fee,
            raw: serde_json::Value::Null,
        })
    }

    async fn get_label(&self, tracking_code: &str) -> Result<LabelToken, CarrierError> {
        self.take_failure()?;
        Ok(LabelToken {
            token: format!("label-{}", tracking_code),
        })
    }

    fn label_url(&self, token: &LabelToken) -> String {
        format!("https://mock-carrier.local/a5/public-api/printA5?token={}", token.token)
    }
}
