pub const REGISTER: &str = "/register";
pub const WS: &str = "/ws";
pub const METRICS: &str = "/metrics";
pub const DEVICES: &str = "/api/devices";
pub const PIPELINES: &str = "/api/pipelines";

pub fn device(device: &str) -> String {
    format!("/api/devices/{}", device)
}

pub fn device_config(device: &str) -> String {
    format!("/api/devices/{}/config", device)
}

pub fn device_command(device: &str) -> String {
    format!("/api/devices/{}/command", device)
}
