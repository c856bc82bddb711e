//! Connection tester: static validation, probe outcomes and real probes.

mod test_utils;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use fintrack::{
    error::StoreError,
    models::DatabaseConfiguration,
    providers::{ProviderKind, ProviderSettings, ServerCredentials},
    tester::{ConnectionProbe, ConnectionTester, NetworkProbe},
};
use test_utils::CountingProbe;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

fn configuration(settings: ProviderSettings) -> DatabaseConfiguration {
    let now = Utc::now();
    DatabaseConfiguration {
        id: "cfg-test".to_string(),
        name: "test".to_string(),
        settings,
        is_active: false,
        is_connected: false,
        last_connection_test: None,
        ssl: true,
        max_connections: 5,
        created_at: now,
        updated_at: now,
    }
}

struct SlowProbe;

#[async_trait]
impl ConnectionProbe for SlowProbe {
    async fn probe(&self, _config: &DatabaseConfiguration) -> Result<(), StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }
}

#[tokio::test]
async fn test_invalid_configuration_never_reaches_the_probe() {
    let probe = CountingProbe::reachable();
    let tester = ConnectionTester::new(probe.clone(), Duration::from_secs(1));

    let invalid = [
        ProviderSettings::PostgresManaged {
            connection_string: String::new(),
        },
        ProviderSettings::BackendAsAService {
            service_url: "https://abc.example.co".to_string(),
            anon_key: "anon".to_string(),
            service_role_key: String::new(),
        },
        ProviderSettings::MysqlSelfHosted(ServerCredentials {
            host: Some("db".to_string()),
            ..Default::default()
        }),
    ];

    for settings in invalid {
        let err = tester.test(&configuration(settings)).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)), "{err}");
    }
    assert_eq!(probe.calls(), 0);
}

#[tokio::test]
async fn test_reachable_configuration_reports_latency() {
    let probe = CountingProbe::reachable();
    let tester = ConnectionTester::new(probe.clone(), Duration::from_secs(1));

    let report = tester
        .test(&configuration(ProviderSettings::EmbeddedFile { file_path: None }))
        .await
        .unwrap();

    assert_eq!(report.provider, ProviderKind::EmbeddedFile);
    assert!(report.latency_ms < 1_000);
    assert_eq!(probe.calls(), 1);
}

#[tokio::test]
async fn test_probe_failures_surface_as_unavailable() {
    let probe = CountingProbe::unreachable();
    probe.set_outcome(Err(StoreError::storage("handshake rejected")));
    let tester = ConnectionTester::new(probe, Duration::from_secs(1));

    let err = tester
        .test(&configuration(ProviderSettings::EmbeddedFile { file_path: None }))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(ref m) if m.contains("handshake rejected")));
}

#[tokio::test]
async fn test_probe_timeout_is_unavailable() {
    let tester = ConnectionTester::new(Arc::new(SlowProbe), Duration::from_millis(50));

    let err = tester
        .test(&configuration(ProviderSettings::EmbeddedFile { file_path: None }))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(ref m) if m.contains("timed out")));
}

#[tokio::test]
async fn test_network_probe_opens_embedded_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("nested").join("ledger.db");
    let probe = NetworkProbe::new(Duration::from_secs(5)).unwrap();

    probe
        .probe(&configuration(ProviderSettings::EmbeddedFile {
            file_path: Some(file.to_string_lossy().into_owned()),
        }))
        .await
        .unwrap();

    assert!(file.exists());
}

#[tokio::test]
async fn test_network_probe_calls_backend_service() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .and(header("apikey", "role-key"))
        .and(header("authorization", "Bearer role-key"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let probe = NetworkProbe::new(Duration::from_secs(5)).unwrap();
    let settings = ProviderSettings::BackendAsAService {
        service_url: server.uri(),
        anon_key: "anon-key".to_string(),
        service_role_key: "role-key".to_string(),
    };

    probe.probe(&configuration(settings)).await.unwrap();
}

#[tokio::test]
async fn test_network_probe_rejected_key_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let probe = NetworkProbe::new(Duration::from_secs(5)).unwrap();
    let settings = ProviderSettings::BackendAsAService {
        service_url: server.uri(),
        anon_key: "anon-key".to_string(),
        service_role_key: "wrong".to_string(),
    };

    let err = probe.probe(&configuration(settings)).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(ref m) if m.contains("401")));
}
