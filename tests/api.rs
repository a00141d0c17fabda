#![cfg(unix)]

use std::time::Duration;

use api::device::{CameraConfig, OperationMode};
use api::message::DeviceCommand;
use http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

mod common;
use common::*;

#[tokio::test]
async fn test_register_is_idempotent() {
    let server = serve().await;
    let first = register(&server, "cam-1").await;
    let second = register(&server, "cam-1").await;
    assert_eq!(first, second);
    assert_eq!(first.config, CameraConfig::default());

    let other = register(&server, "cam-2").await;
    assert_ne!(first.api_key, other.api_key);

    let res = reqwest::Client::new()
        .post(server.url(api::path::REGISTER))
        .json(&api::request::Register {
            device_id: "  ".to_string(),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_devices() {
    let server = serve().await;
    register(&server, "b").await;
    register(&server, "a").await;

    let devices: Vec<api::response::Device> = reqwest::get(server.url(api::path::DEVICES))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<_> = devices.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);

    let res = reqwest::get(server.url(&api::path::device("zzz")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_config_patch() {
    let server = serve().await;
    register(&server, "cam").await;
    let client = reqwest::Client::new();

    let res = client
        .patch(server.url(&api::path::device_config("cam")))
        .json(&serde_json::json!({"framerate": 5, "quality": 20}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cfg: CameraConfig = res.json().await.unwrap();
    assert_eq!(cfg.framerate, 5);
    assert_eq!(cfg.quality, 20);
    assert_eq!(cfg.resolution, "VGA");

    let res = client
        .patch(server.url(&api::path::device_config("ghost")))
        .json(&serde_json::json!({"framerate": 5}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_command_delivery() {
    let server = serve().await;
    let client = reqwest::Client::new();
    let send = |device: &'static str, command: DeviceCommand| {
        client
            .post(server.url(&api::path::device_command(device)))
            .json(&command)
            .send()
    };

    let res = send("ghost", DeviceCommand::Reboot).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let registered = register(&server, "cam").await;
    let res = send("cam", DeviceCommand::Reboot).await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let mut device_ws = connect_device(&server, &registered.api_key).await;
    assert!(eventually(|| async { device(&server, "cam").await.connected }).await);

    let command = DeviceCommand::UpdateOperationMode {
        operation_mode: OperationMode::Continuous,
        config: None,
    };
    let res = send("cam", command.clone()).await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    match next_message(&mut device_ws, Duration::from_secs(5)).await {
        Some(Message::Text(text)) => {
            assert_eq!(
                serde_json::from_str::<DeviceCommand>(&text).unwrap(),
                command
            );
        }
        other => panic!("unexpected message {other:?}"),
    }
    assert_eq!(
        device(&server, "cam").await.operation_mode,
        OperationMode::Continuous
    );
}

#[tokio::test]
async fn test_admin_token() {
    let server = serve_with(|cfg| cfg.auth.tokens = vec!["secret".to_string()]).await;
    let client = reqwest::Client::new();

    let res = client
        .get(server.url(api::path::DEVICES))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(server.url(api::path::PIPELINES))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(server.url(api::path::DEVICES))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // devices still self-register without a token
    register(&server, "cam").await;
}

#[tokio::test]
async fn test_metrics() {
    camcore::metrics_register();
    let server = serve().await;
    register(&server, "cam").await;

    let body = reqwest::get(server.url(api::path::METRICS))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("camrelay_device"));
    assert!(body.contains("camrelay_frame"));
}
