use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use bazaar_api::{app, AppState, AuthConfig};
use bazaar_core::LogSink;
use bazaar_order::repository::VendorOrderRepository;
use bazaar_order::{
    MemoryStore, MockCarrierGateway, PaymentModel, ReturnWorkflow, ShipmentSynchronizer, Vendor,
    VendorOrder, VendorOrderStatus,
};
use bazaar_shared::Masked;
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "integration-secret";
const WEBHOOK_TOKEN: &str = "ghn-webhook-token";

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    carrier: Arc<MockCarrierGateway>,
}

fn setup() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let carrier = Arc::new(MockCarrierGateway::new());
    let sink = Arc::new(LogSink);

    let state = AppState {
        synchronizer: Arc::new(ShipmentSynchronizer::new(
            carrier.clone(),
            store.clone(),
            store.clone(),
            sink.clone(),
        )),
        returns: Arc::new(ReturnWorkflow::new(store.clone(), store.clone(), sink)),
        auth: AuthConfig {
            secret: Masked::from(SECRET),
        },
        webhook_token: Some(Masked::from(WEBHOOK_TOKEN)),
    };

    TestApp {
        router: app(state),
        store,
        carrier,
    }
}

fn exp() -> usize {
    (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize
}

fn admin_token() -> String {
    let claims = json!({ "sub": "ops@bazaar.vn", "email": "ops@bazaar.vn", "role": "ADMIN", "exp": exp() });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn vendor_token(vendor_id: Uuid) -> String {
    let claims = json!({ "sub": "vendor-user", "vendor_id": vendor_id, "role": "VENDOR", "exp": exp() });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn webhook(router: &Router, token: Option<&str>, payload: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/webhooks/carrier")
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Token", token);
    }
    let response = router
        .clone()
        .oneshot(builder.body(Body::from(payload.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn seed(store: &MemoryStore, model: PaymentModel, status: VendorOrderStatus) -> (Vendor, VendorOrder) {
    let mut vendor = Vendor::new("Gom Bat Trang", model);
    vendor.deposit_balance = Decimal::from(200_000);
    let mut order = VendorOrder::new(vendor.id, Decimal::from(50_000));
    order.update_status(status);
    store.insert_vendor(vendor.clone()).await;
    store.insert_vendor_order(order.clone()).await;
    (vendor, order)
}

fn return_body(order: &VendorOrder) -> Value {
    json!({
        "vendor_order_id": order.id,
        "return_reason": "Cracked glaze",
        "return_type": "damaged",
        "quantity_returned": 1,
        "images": ["https://cdn.bazaar.vn/returns/1.jpg"]
    })
}

#[tokio::test]
async fn test_shipment_creation_then_pickup_webhook() {
    let t = setup();
    let (_, order) = seed(&t.store, PaymentModel::Deposit, VendorOrderStatus::Pending).await;
    t.carrier.push_order("GHN123", 15_000);

    let (status, body) = send(
        &t.router,
        "POST",
        "/v1/admin/shipments",
        Some(&admin_token()),
        Some(json!({
            "vendor_order_id": order.id,
            "shipment": {
                "recipient": {
                    "name": "Le Van C",
                    "phone": "0912345678",
                    "address": "12 Le Loi",
                    "ward_code": "20308",
                    "district_id": 1444
                },
                "content": "Tea set",
                "weight_grams": 1200
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["tracking_code"], "GHN123");
    assert_eq!(body["status"], "pending");

    let stored = t.store.get_vendor_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, VendorOrderStatus::Processing);

    let (status, _) = webhook(
        &t.router,
        Some(WEBHOOK_TOKEN),
        json!({ "OrderCode": "GHN123", "Status": "picked", "Time": "2026-03-02T08:15:00Z" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&t.router, "GET", "/v1/admin/shipments/GHN123", Some(&admin_token()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "picked_up");

    let stored = t.store.get_vendor_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, VendorOrderStatus::Shipped);
    assert!(stored.shipped_at.is_some());
}

#[tokio::test]
async fn test_webhook_requires_token() {
    let t = setup();

    let (status, body) = webhook(
        &t.router,
        None,
        json!({ "OrderCode": "GHN123", "Status": "picked" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["kind"], "unauthorized");

    let (status, _) = webhook(
        &t.router,
        Some("wrong"),
        json!({ "OrderCode": "GHN123", "Status": "picked" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_without_order_code_is_rejected() {
    let t = setup();

    let (status, body) = webhook(&t.router, Some(WEBHOOK_TOKEN), json!({ "Status": "picked" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation_error");
}

#[tokio::test]
async fn test_webhook_for_unknown_shipment() {
    let t = setup();

    let (status, body) = webhook(
        &t.router,
        Some(WEBHOOK_TOKEN),
        json!({ "OrderCode": "GHN404", "Status": "delivered" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "not_found");
}

#[tokio::test]
async fn test_vendor_return_approved_credits_deposit() {
    let t = setup();
    let (vendor, order) = seed(&t.store, PaymentModel::Deposit, VendorOrderStatus::Delivered).await;

    let (status, created) = send(
        &t.router,
        "POST",
        "/v1/vendor/returns",
        Some(&vendor_token(vendor.id)),
        Some(return_body(&order)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    let id = created["id"].as_str().unwrap().to_string();

    let uri = format!("/v1/admin/returns/{}/approve", id);
    let (status, body) = send(&t.router, "POST", &uri, Some(&admin_token()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["return_request"]["status"], "approved");
    assert_eq!(body["return_request"]["processed_by"], "ops@bazaar.vn");
    assert_eq!(body["settlement"]["success"], true);

    let vendor = t.store.vendor(vendor.id).await.unwrap();
    assert_eq!(vendor.deposit_balance, Decimal::from(250_000));
    let stored = t.store.get_vendor_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, VendorOrderStatus::Returned);

    // Second approval must not credit again.
    let (status, body) = send(&t.router, "POST", &uri, Some(&admin_token()), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["kind"], "conflict");
    assert_eq!(t.store.ledger().await.len(), 1);
}

#[tokio::test]
async fn test_upfront_approval_is_invalid_operation() {
    let t = setup();
    let (vendor, order) = seed(&t.store, PaymentModel::Upfront, VendorOrderStatus::Delivered).await;

    let (_, created) = send(&t.router, "POST", "/v1/admin/returns", Some(&admin_token()), Some(return_body(&order))).await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &t.router,
        "POST",
        &format!("/v1/admin/returns/{}/approve", id),
        Some(&admin_token()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["kind"], "invalid_operation");

    let (_, body) = send(&t.router, "GET", &format!("/v1/admin/returns/{}", id), Some(&admin_token()), None).await;
    assert_eq!(body["status"], "pending");
    let vendor = t.store.vendor(vendor.id).await.unwrap();
    assert_eq!(vendor.deposit_balance, Decimal::from(200_000));
}

#[tokio::test]
async fn test_reject_requires_reason() {
    let t = setup();
    let (_, order) = seed(&t.store, PaymentModel::Monthly, VendorOrderStatus::Shipped).await;
    let (_, created) = send(&t.router, "POST", "/v1/admin/returns", Some(&admin_token()), Some(return_body(&order))).await;
    let uri = format!("/v1/admin/returns/{}/reject", created["id"].as_str().unwrap());

    let (status, _) = send(&t.router, "POST", &uri, Some(&admin_token()), Some(json!({ "reason": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &t.router,
        "POST",
        &uri,
        Some(&admin_token()),
        Some(json!({ "reason": "Damage caused by customer" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["admin_notes"], "Damage caused by customer");
}

#[tokio::test]
async fn test_vendor_cannot_open_return_for_other_vendor() {
    let t = setup();
    let (_, order) = seed(&t.store, PaymentModel::Deposit, VendorOrderStatus::Delivered).await;

    let (status, _) = send(
        &t.router,
        "POST",
        "/v1/vendor/returns",
        Some(&vendor_token(Uuid::new_v4())),
        Some(return_body(&order)),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_and_analytics() {
    let t = setup();
    let (vendor, order) = seed(&t.store, PaymentModel::Deposit, VendorOrderStatus::Delivered).await;
    seed(&t.store, PaymentModel::Deposit, VendorOrderStatus::Delivered).await;
    send(&t.router, "POST", "/v1/admin/returns", Some(&admin_token()), Some(return_body(&order))).await;

    let (status, body) = send(
        &t.router,
        "GET",
        &format!("/v1/admin/returns?vendor_id={}&status=pending", vendor.id),
        Some(&admin_token()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["returns"].as_array().unwrap().len(), 1);
    assert_eq!(body["limit"], 50);

    let (status, body) = send(
        &t.router,
        "GET",
        &format!("/v1/admin/returns/analytics?vendor_id={}", vendor.id),
        Some(&admin_token()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_returns"], 1);
    assert_eq!(body["total_orders"], 1);
    assert_eq!(body["by_status"]["pending"], 1);
    assert_eq!(body["by_type"]["damaged"], 1);
}

#[tokio::test]
async fn test_admin_routes_reject_missing_and_vendor_tokens() {
    let t = setup();

    let (status, _) = send(&t.router, "GET", "/v1/admin/returns", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&t.router, "GET", "/v1/admin/returns", Some(&vendor_token(Uuid::new_v4())), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&t.router, "POST", "/v1/vendor/returns", Some(&admin_token()), Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_vendor_sees_only_own_returns_and_analytics() {
    let t = setup();
    let (mine, my_order) = seed(&t.store, PaymentModel::Deposit, VendorOrderStatus::Delivered).await;
    let (theirs, their_order) = seed(&t.store, PaymentModel::Deposit, VendorOrderStatus::Delivered).await;
    for order in [&my_order, &their_order] {
        let (status, _) = send(&t.router, "POST", "/v1/admin/returns", Some(&admin_token()), Some(return_body(order))).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let token = vendor_token(mine.id);

    let (status, body) = send(
        &t.router,
        "GET",
        &format!("/v1/vendor/returns?vendor_id={}", theirs.id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let returns = body["returns"].as_array().unwrap();
    assert_eq!(returns.len(), 1);
    assert_eq!(returns[0]["vendor_id"], json!(mine.id));

    let (status, body) = send(
        &t.router,
        "GET",
        &format!("/v1/vendor/returns/analytics?vendor_id={}", theirs.id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_returns"], 1);
    assert_eq!(body["total_orders"], 1);

    let (status, _) = send(&t.router, "GET", "/v1/vendor/returns", Some(&admin_token()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_query_is_structured_bad_request() {
    let t = setup();

    let (status, body) = send(&t.router, "GET", "/v1/admin/returns?status=bogus", Some(&admin_token()), None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation_error");
    assert!(body["error"]["message"].as_str().unwrap().contains("status"));
}

#[tokio::test]
async fn test_malformed_json_body_is_structured_bad_request() {
    let t = setup();

    let (status, body) = send(
        &t.router,
        "POST",
        "/v1/admin/returns",
        Some(&admin_token()),
        Some(json!({ "vendor_order_id": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation_error");

    let (status, body) = send(&t.router, "GET", "/v1/admin/returns/not-a-uuid", Some(&admin_token()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation_error");
}

#[tokio::test]
async fn test_cancel_without_body_is_accepted() {
    let t = setup();
    let (_, order) = seed(&t.store, PaymentModel::Deposit, VendorOrderStatus::Pending).await;
    t.carrier.push_order("GHN123", 15_000);
    let (status, _) = send(
        &t.router,
        "POST",
        "/v1/admin/shipments",
        Some(&admin_token()),
        Some(json!({
            "vendor_order_id": order.id,
            "shipment": {
                "recipient": {
                    "name": "Le Van C",
                    "phone": "0912345678",
                    "address": "12 Le Loi",
                    "ward_code": "20308",
                    "district_id": 1444
                },
                "content": "Tea set",
                "weight_grams": 1200
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&t.router, "POST", "/v1/admin/shipments/GHN123/cancel", Some(&admin_token()), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["disposition"]["outcome"], "transitioned");
    assert_eq!(body["disposition"]["to"], "cancelled");
}
