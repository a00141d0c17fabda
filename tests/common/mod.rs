#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use camcore::config::{Config, RecorderConfig};
use futures_util::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct Server {
    pub addr: SocketAddr,
    pub root: TempDir,
}

impl Server {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn recordings(&self) -> &Path {
        self.root.path()
    }
}

/// Recorder that copies its input into the output file.
pub fn cat_recorder(root: &Path) -> RecorderConfig {
    RecorderConfig {
        root: root.to_string_lossy().to_string(),
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            "exec cat > \"$0\"".to_string(),
            "{output}".to_string(),
        ],
        restart_delay: 100,
        stop_timeout: 2000,
        ..Default::default()
    }
}

pub async fn serve() -> Server {
    serve_with(|_| {}).await
}

pub async fn serve_with(f: impl FnOnce(&mut Config)) -> Server {
    let root = tempfile::tempdir().unwrap();
    let mut cfg = Config {
        recorder: cat_recorder(root.path()),
        ..Default::default()
    };
    f(&mut cfg);

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(camcore::serve(cfg, listener, std::future::pending()));
    Server { addr, root }
}

pub async fn register(server: &Server, device_id: &str) -> api::response::Registered {
    let res = reqwest::Client::new()
        .post(server.url(api::path::REGISTER))
        .json(&api::request::Register {
            device_id: device_id.to_string(),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), http::StatusCode::OK);
    res.json().await.unwrap()
}

pub async fn connect_device(server: &Server, api_key: &str) -> Socket {
    let url = format!("ws://{}{}?apiKey={}", server.addr, api::path::WS, api_key);
    let (socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    socket
}

pub async fn connect_viewer(server: &Server, origin: Option<&str>) -> Socket {
    let mut req = format!("ws://{}{}", server.addr, api::path::WS)
        .into_client_request()
        .unwrap();
    if let Some(origin) = origin {
        req.headers_mut()
            .insert(http::header::ORIGIN, origin.parse().unwrap());
    }
    let (socket, _) = tokio_tungstenite::connect_async(req).await.unwrap();
    socket
}

pub async fn subscribe(viewer: &mut Socket, device_id: &str) {
    let msg = api::message::ViewerMessage::Subscribe {
        device_id: device_id.to_string(),
    };
    viewer
        .send(Message::Text(serde_json::to_string(&msg).unwrap()))
        .await
        .unwrap();
}

pub fn frame(n: u8) -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, n, n, n, 0xFF, 0xD9]
}

/// Next data message, skipping pings and pongs.
pub async fn next_message(socket: &mut Socket, timeout: Duration) -> Option<Message> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, socket.next()).await {
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            Ok(Some(Ok(msg))) => return Some(msg),
            _ => return None,
        }
    }
}

/// Close code the server ended the socket with.
pub async fn close_code(socket: &mut Socket) -> Option<u16> {
    match next_message(socket, Duration::from_secs(5)).await {
        Some(Message::Close(Some(frame))) => Some(frame.code.into()),
        _ => None,
    }
}

pub async fn device(server: &Server, device_id: &str) -> api::response::Device {
    reqwest::get(server.url(&api::path::device(device_id)))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

pub async fn pipelines(server: &Server) -> Vec<api::response::Pipeline> {
    reqwest::get(server.url(api::path::PIPELINES))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Every recording below `root`, sorted.
pub fn recordings(root: &Path) -> Vec<PathBuf> {
    let mut files = vec![];
    let mut dirs = vec![root.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}
