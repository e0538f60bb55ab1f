use std::time::Duration;

use assert_matches::assert_matches;
use freshmarket_service::{
    api::fedapay::{CreateTransaction, FedaPayClient, GatewayStatus},
    app_error::AppError,
    config::{FedaPayConfig, FedaPayEnvironment},
    types::PaymentMethod,
};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

fn client(base_url: &str, timeout: Duration) -> FedaPayClient {
    let config = FedaPayConfig {
        environment: FedaPayEnvironment::Sandbox,
        base_url: Some(base_url.to_string()),
        private_key: "sk_sandbox_test".into(),
        webhook_secret: None,
        callback_url: Some("https://freshmarket.test/paiement/retour".into()),
        timeout,
    };
    let http = reqwest::Client::builder().timeout(timeout).build().unwrap();
    FedaPayClient::new(http, &config)
}

fn request(method: PaymentMethod) -> CreateTransaction<'static> {
    CreateTransaction {
        amount: 2500,
        phone: "97000000",
        email: "awa@example.com",
        customer_name: "Awa",
        order_id: 42,
        method,
    }
}

async fn mount_transaction(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .and(header("authorization", "Bearer sk_sandbox_test"))
        .and(body_partial_json(json!({
            "description": "Commande Fresh Market #42",
            "amount": 2500,
            "currency": {"iso": "XOF"},
            "custom_metadata": {"order_id": 42}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "v1/transaction": {"id": 9001, "reference": "trx_9001", "status": "pending"}
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/transactions/9001/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tok_9001",
            "url": "https://sandbox-checkout.fedapay.com/tok_9001"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn mobile_money_transaction_is_created_and_pushed() {
    let server = MockServer::start().await;
    mount_transaction(&server).await;
    Mock::given(method("POST"))
        .and(path("/mtn_open"))
        .and(body_partial_json(json!({"token": "tok_9001"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "sent"})))
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server.uri(), Duration::from_secs(2))
        .create_transaction(request(PaymentMethod::Mtn))
        .await
        .unwrap();

    assert_eq!(created.transaction_id, "9001");
    assert_eq!(created.reference.as_deref(), Some("trx_9001"));
    assert_eq!(created.status, GatewayStatus::Pending);
    assert_eq!(
        created.payment_url.as_deref(),
        Some("https://sandbox-checkout.fedapay.com/tok_9001")
    );
}

#[tokio::test]
async fn card_transaction_is_not_pushed() {
    let server = MockServer::start().await;
    mount_transaction(&server).await;
    Mock::given(method("POST"))
        .and(path("/mtn_open"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let created = client(&server.uri(), Duration::from_secs(2))
        .create_transaction(request(PaymentMethod::Card))
        .await
        .unwrap();
    assert_eq!(created.transaction_id, "9001");
}

#[tokio::test]
async fn provider_rejection_carries_its_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "Numéro de téléphone invalide"})),
        )
        .mount(&server)
        .await;

    let err = client(&server.uri(), Duration::from_secs(2))
        .create_transaction(request(PaymentMethod::Moov))
        .await
        .unwrap_err();
    assert_matches!(err, AppError::Upstream(msg) if msg == "Numéro de téléphone invalide");
}

#[tokio::test]
async fn status_lookup_maps_provider_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transactions/9001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "v1/transaction": {"id": 9001, "status": "approved"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/transactions/9002"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 9002, "status": "declined"
        })))
        .mount(&server)
        .await;

    let client = client(&server.uri(), Duration::from_secs(2));
    assert_eq!(
        client.get_transaction_status("9001").await.unwrap(),
        GatewayStatus::Succeeded
    );
    assert_eq!(
        client.get_transaction_status("9002").await.unwrap(),
        GatewayStatus::Failed
    );
}

#[tokio::test]
async fn slow_status_lookup_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transactions/9001"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": 9001, "status": "approved"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let status = client(&server.uri(), Duration::from_millis(200))
        .get_transaction_status("9001")
        .await
        .unwrap();
    assert_eq!(status, GatewayStatus::Unknown);
}

#[tokio::test]
async fn unreachable_provider_is_reported() {
    let err = client("http://127.0.0.1:1", Duration::from_secs(2))
        .get_transaction_status("9001")
        .await
        .unwrap_err();
    assert_matches!(err, AppError::ServiceUnreachable(_));
}
