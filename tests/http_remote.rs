//! HTTP transport against a mock training server.

use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server};
use serde_json::json;
use trainwatch::commands::ControlCommand;
use trainwatch::session::ConnectionStatus;
use trainwatch::transport::{HttpRemote, RemoteSource};
use trainwatch::view::{DashboardModel, LineOrigin};
use trainwatch::{CancellationToken, StatusSync, SyncConfig, SyncError};

fn state_body() -> String {
    json!({
        "episode": 4,
        "total_episodes": 50,
        "score": 3,
        "avg_score": 1.75,
        "epsilon": 0.8,
        "timeouts": 1,
        "step": 812,
        "frame_base64": "iVBORw0KGgo=",
        "log_messages": [
            {"timestamp": "10:00:00", "message": "Starting training"},
            {"timestamp": "10:00:02", "message": "Episode 4 started"}
        ]
    })
    .to_string()
}

fn remote(url: &str) -> HttpRemote {
    HttpRemote::new(url, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn fetches_and_decodes_state() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/state")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(state_body())
        .create_async()
        .await;

    let state = remote(&server.url()).fetch_state().await.unwrap();
    assert_eq!(state.episode, 4);
    assert_eq!(state.reported_log().map(|l| l.len()), Some(2));
    assert!(state.frame_base64.is_some());
    mock.assert_async().await;
}

#[tokio::test]
async fn trailing_slash_in_base_url_is_tolerated() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/state")
        .with_status(200)
        .with_body(state_body())
        .create_async()
        .await;

    let r = remote(&format!("{}/", server.url()));
    assert!(!r.base_url().ends_with('/'));
    assert!(r.fetch_state().await.is_ok());
}

#[tokio::test]
async fn undecodable_body_is_malformed() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/state")
        .with_status(200)
        .with_body("<html>gateway</html>")
        .create_async()
        .await;

    let err = remote(&server.url()).fetch_state().await.unwrap_err();
    assert!(matches!(err, SyncError::Malformed(_)));
    assert!(err.is_connectivity());
}

#[tokio::test]
async fn out_of_range_values_are_schema_violations() {
    let mut server = Server::new_async().await;
    let body = state_body().replace("0.8", "3.5");
    let _mock = server
        .mock("GET", "/api/state")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let err = remote(&server.url()).fetch_state().await.unwrap_err();
    assert!(matches!(err, SyncError::Schema { field: "epsilon", .. }));
}

#[tokio::test]
async fn server_error_status_is_reported() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/state")
        .with_status(503)
        .create_async()
        .await;

    let err = remote(&server.url()).fetch_state().await.unwrap_err();
    assert!(matches!(err, SyncError::HttpStatus { status: 503 }));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let r = HttpRemote::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
    let err = r.fetch_state().await.unwrap_err();
    assert!(matches!(err, SyncError::Transport(_)));
}

#[tokio::test]
async fn control_commands_post_json_bodies() {
    let mut server = Server::new_async().await;
    let speed = server
        .mock("POST", "/api/control")
        .match_body(Matcher::Json(json!({"command": "speed", "value": 2.5})))
        .with_status(200)
        .create_async()
        .await;
    let pause = server
        .mock("POST", "/api/control")
        .match_body(Matcher::Json(json!({"command": "pause"})))
        .with_status(200)
        .create_async()
        .await;

    let r = remote(&server.url());
    r.send_control(&ControlCommand::Speed { value: 2.5 }).await.unwrap();
    r.send_control(&ControlCommand::Pause).await.unwrap();
    speed.assert_async().await;
    pause.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loop_renders_live_server_into_dashboard_model() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/state")
        .with_status(200)
        .with_body(state_body())
        .expect_at_least(2)
        .create_async()
        .await;

    let config = SyncConfig {
        server_url: server.url(),
        ..SyncConfig::default()
    };
    let r = Arc::new(HttpRemote::new(&config.server_url, config.request_timeout()).unwrap());
    let model = DashboardModel::new(config.console());
    let (sync, handle) = StatusSync::new(r, model, &config, CancellationToken::new());
    let join = sync.spawn();

    tokio::time::sleep(Duration::from_millis(450)).await;
    handle.shutdown();
    let outcome = join.await.unwrap();

    assert_eq!(outcome.session.status(), ConnectionStatus::Connected);
    assert_eq!(outcome.session.processed_logs(), 2);

    let model = outcome.view;
    assert_eq!(model.status, ConnectionStatus::Connected);
    assert_eq!(model.chart.episodes(), vec![4]);
    assert_eq!(model.progress, 8.0);
    assert!(model.frame.is_some());
    assert_eq!(model.stats.as_ref().map(|s| s.episode_label()), Some("4/50".to_string()));

    let remote_lines: Vec<&str> = model
        .console
        .lines()
        .iter()
        .filter(|l| l.origin == LineOrigin::Remote)
        .map(|l| l.message.as_str())
        .collect();
    assert_eq!(remote_lines, vec!["Starting training", "Episode 4 started"]);
}
