//! Wire-level classification of peers and payloads.

use api::request::Connect;
use bytes::Bytes;
use http::{header, HeaderMap};
use serde::de::DeserializeOwned;

use crate::auth;
use crate::connection::{CloseReason, CLOSE_INVALID_CREDENTIAL, CLOSE_ORIGIN_REJECTED};

/// JPEG start-of-image marker.
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

pub fn is_jpeg_frame(payload: &[u8]) -> bool {
    payload.starts_with(&JPEG_SOI)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound<T> {
    Frame(Bytes),
    Control(T),
    Malformed(String),
}

/// A binary payload is a frame when it opens with the JPEG marker, anything
/// else is treated as a UTF-8 JSON envelope.
pub fn classify_binary<T: DeserializeOwned>(payload: Bytes) -> Inbound<T> {
    if is_jpeg_frame(&payload) {
        return Inbound::Frame(payload);
    }
    match std::str::from_utf8(&payload) {
        Ok(text) => classify_text(text),
        Err(e) => Inbound::Malformed(format!("binary payload is not a JPEG frame: {e}")),
    }
}

pub fn classify_text<T: DeserializeOwned>(text: &str) -> Inbound<T> {
    match serde_json::from_str(text) {
        Ok(msg) => Inbound::Control(msg),
        Err(e) => Inbound::Malformed(format!("invalid envelope: {e}")),
    }
}

/// What the upgrade request told us about the peer.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub credential: Option<String>,
    pub origin: Option<String>,
    pub host: Option<String>,
}

impl Handshake {
    pub fn new(headers: &HeaderMap, query: Connect) -> Self {
        let value = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            credential: auth::api_key(headers).or(query.api_key),
            origin: value(header::ORIGIN),
            host: value(header::HOST),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerClass {
    /// Claims to be a device; the credential still has to be checked.
    Device(String),
    Viewer,
}

/// Devices present a credential. Viewers present none and must come from the
/// same origin as the host they connect to, or from an allowed origin.
pub fn classify_peer(
    handshake: &Handshake,
    allowed_origins: &[String],
) -> Result<PeerClass, CloseReason> {
    if let Some(credential) = &handshake.credential {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(CloseReason::new(
                CLOSE_INVALID_CREDENTIAL,
                "invalid credential",
            ));
        }
        return Ok(PeerClass::Device(credential.to_string()));
    }

    let Some(origin) = handshake.origin.as_deref() else {
        return Err(CloseReason::new(CLOSE_ORIGIN_REJECTED, "origin required"));
    };
    let origin = origin.trim_end_matches('/');
    if allowed_origins
        .iter()
        .any(|allowed| allowed == "*" || allowed.trim_end_matches('/').eq_ignore_ascii_case(origin))
    {
        return Ok(PeerClass::Viewer);
    }
    match (origin_authority(origin), handshake.host.as_deref()) {
        (Some(authority), Some(host)) if authority.eq_ignore_ascii_case(host) => {
            Ok(PeerClass::Viewer)
        }
        _ => Err(CloseReason::new(CLOSE_ORIGIN_REJECTED, "origin not allowed")),
    }
}

/// `https://example.com:8443` -> `example.com:8443`
fn origin_authority(origin: &str) -> Option<&str> {
    let (_, rest) = origin.split_once("://")?;
    let authority = rest.split('/').next().unwrap_or(rest);
    (!authority.is_empty()).then_some(authority)
}
