use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Register {
    pub device_id: String,
}

/// Query string accepted on the WebSocket endpoint.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Connect {
    #[serde(default)]
    pub api_key: Option<String>,
}
