//! Backend-as-a-service adapter against a mock PostgREST endpoint.

use std::time::Duration;

use fintrack::{
    error::StoreError,
    providers::{Collection, ProviderAdapter, RecordFilter, RecordId, RestAdapter},
};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path, query_param},
};

const KEY: &str = "service-role-key";

fn adapter(server: &MockServer) -> RestAdapter {
    RestAdapter::new(&format!("{}/", server.uri()), KEY, Duration::from_secs(2)).unwrap()
}

fn fields(value: serde_json::Value) -> fintrack::providers::Fields {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_insert_posts_without_id_and_returns_representation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/accounts"))
        .and(header("apikey", KEY))
        .and(header("authorization", format!("Bearer {KEY}").as_str()))
        .and(header("prefer", "return=representation"))
        .and(body_json(json!({"name": "Checking", "user_id": 4})))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([{"id": 17, "name": "Checking", "user_id": 4}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let record = adapter(&server)
        .insert(
            Collection::Accounts,
            fields(json!({"id": 3, "name": "Checking", "user_id": 4})),
        )
        .await
        .unwrap();

    assert_eq!(record.id, RecordId::Int(17));
    assert_eq!(record.fields["name"], "Checking");
    assert!(!record.fields.contains_key("id"));
}

#[tokio::test]
async fn test_list_sends_filters_and_paging() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/transactions"))
        .and(query_param("order", "id.asc"))
        .and(query_param("account_id", "eq.9"))
        .and(query_param("category_id", "is.null"))
        .and(query_param("limit", "10"))
        .and(query_param("offset", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "a1b2", "amount": 5, "account_id": 9, "category_id": null}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let filter = RecordFilter {
        limit: Some(10),
        offset: 20,
        ..RecordFilter::all()
            .with_eq("account_id", 9)
            .with_eq("category_id", serde_json::Value::Null)
    };
    let records = adapter(&server)
        .list(Collection::Transactions, &filter)
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, RecordId::Text("a1b2".to_string()));
}

#[tokio::test]
async fn test_get_missing_row_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/goals"))
        .and(query_param("id", "eq.42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .get(Collection::Goals, &RecordId::Int(42))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_update_patches_by_id() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bills"))
        .and(query_param("id", "eq.7"))
        .and(body_json(json!({"paid": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": 7, "paid": true, "amount": 30}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let record = adapter(&server)
        .update(Collection::Bills, &RecordId::Int(7), fields(json!({"paid": true})))
        .await
        .unwrap();
    assert_eq!(record.fields["amount"], 30);
}

#[tokio::test]
async fn test_delete_of_missing_row_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/budgets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .delete(Collection::Budgets, &RecordId::Int(1))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_error_statuses_are_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key value"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    let err = adapter
        .insert(Collection::Users, fields(json!({"email": "a@example.com"})))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(ref m) if m.contains("duplicate key")));

    let err = adapter
        .list(Collection::Users, &RecordFilter::all())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
}

#[tokio::test]
async fn test_unreachable_service_is_unavailable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let adapter = RestAdapter::new(&format!("http://{addr}/"), KEY, Duration::from_millis(500)).unwrap();
    let err = adapter.ping().await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)), "{err}");
}
