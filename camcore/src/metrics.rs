use lazy_static::lazy_static;
use prometheus::{IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    pub static ref DEVICE: IntGauge =
        IntGauge::new("device", "registered device number").unwrap();
    pub static ref CONNECTED: IntGauge =
        IntGauge::new("connected", "connected device number").unwrap();
    pub static ref PIPELINE: IntGauge =
        IntGauge::new("pipeline", "running transcoder number").unwrap();
    pub static ref VIEWER: IntGauge =
        IntGauge::new("viewer", "connected viewer number").unwrap();
    pub static ref FRAME: IntCounter =
        IntCounter::new("frame", "received frame number").unwrap();
    pub static ref DROPPED: IntCounter =
        IntCounter::new("dropped", "frames dropped in front of a transcoder").unwrap();
    pub static ref REGISTRY: Registry =
        Registry::new_custom(Some("camrelay".to_string()), None).unwrap();
    pub static ref ENCODER: TextEncoder = TextEncoder::new();
}
