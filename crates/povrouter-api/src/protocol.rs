//! obs-websocket v5 wire messages.
//!
//! Every frame is a JSON text message shaped `{ "op": <u8>, "d": { ... } }`.
//! Only the opcodes a request/response client needs are modelled; anything
//! else is surfaced as [`Incoming::Other`] and ignored by the session.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::Error;

// ── Opcodes ──────────────────────────────────────────────────────────

pub const OP_HELLO: u8 = 0;
pub const OP_IDENTIFY: u8 = 1;
pub const OP_IDENTIFIED: u8 = 2;
pub const OP_EVENT: u8 = 5;
pub const OP_REQUEST: u8 = 6;
pub const OP_REQUEST_RESPONSE: u8 = 7;

// ── Server → client ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawFrame {
    op: u8,
    #[serde(default)]
    d: Value,
}

/// First message OBS sends after the socket opens.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    /// Present only when the server has authentication enabled.
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

/// An event pushed by OBS (only received for subscribed categories).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsEvent {
    pub event_type: String,
    #[serde(default)]
    pub event_intent: u32,
    #[serde(default)]
    pub event_data: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatus {
    pub result: bool,
    pub code: u32,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

impl RequestResponse {
    /// Unwrap the response into its data payload, or a request error.
    pub fn into_result(self) -> Result<Value, Error> {
        if self.request_status.result {
            Ok(self.response_data.unwrap_or(Value::Null))
        } else {
            Err(Error::Request {
                request_type: self.request_type,
                code: self.request_status.code,
                comment: self.request_status.comment.unwrap_or_default(),
            })
        }
    }
}

/// A decoded server frame.
#[derive(Debug)]
pub enum Incoming {
    Hello(Hello),
    Identified(Identified),
    Event(ObsEvent),
    RequestResponse(RequestResponse),
    Other(u8),
}

impl Incoming {
    pub fn op(&self) -> u8 {
        match self {
            Self::Hello(_) => OP_HELLO,
            Self::Identified(_) => OP_IDENTIFIED,
            Self::Event(_) => OP_EVENT,
            Self::RequestResponse(_) => OP_REQUEST_RESPONSE,
            Self::Other(op) => *op,
        }
    }
}

/// Parse one text frame into a typed message.
pub fn parse_frame(text: &str) -> Result<Incoming, Error> {
    let raw: RawFrame = serde_json::from_str(text).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: text.to_owned(),
    })?;

    let decoded = match raw.op {
        OP_HELLO => Incoming::Hello(decode(raw.d)?),
        OP_IDENTIFIED => Incoming::Identified(decode(raw.d)?),
        OP_EVENT => Incoming::Event(decode(raw.d)?),
        OP_REQUEST_RESPONSE => Incoming::RequestResponse(decode(raw.d)?),
        other => Incoming::Other(other),
    };
    Ok(decoded)
}

/// Deserialize a JSON payload, keeping the raw body on failure.
pub fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: value.to_string(),
    })
}

// ── Client → server ──────────────────────────────────────────────────

/// Build an Identify frame. `event_subscriptions` is the obs-websocket
/// bitmask; `0` opts out of every event category.
pub fn identify_frame(rpc_version: u32, authentication: Option<&str>, event_subscriptions: u32) -> String {
    let mut d = json!({
        "rpcVersion": rpc_version,
        "eventSubscriptions": event_subscriptions,
    });
    if let Some(auth) = authentication {
        d["authentication"] = Value::String(auth.to_owned());
    }
    json!({ "op": OP_IDENTIFY, "d": d }).to_string()
}

/// Build a Request frame.
pub fn request_frame(request_type: &str, request_id: &str, request_data: &Value) -> String {
    let mut d = json!({
        "requestType": request_type,
        "requestId": request_id,
    });
    if !request_data.is_null() {
        d["requestData"] = request_data.clone();
    }
    json!({ "op": OP_REQUEST, "d": d }).to_string()
}

// ── Typed response payloads ──────────────────────────────────────────

/// One entry of `GetSceneItemList` / `GetGroupSceneItemList`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItemInfo {
    pub scene_item_id: i64,
    pub source_name: String,
    /// OBS reports `null` for anything that is not a group.
    #[serde(default)]
    pub is_group: Option<bool>,
    #[serde(default)]
    pub scene_item_enabled: bool,
    #[serde(default)]
    pub scene_item_index: i64,
}

impl SceneItemInfo {
    pub fn is_group(&self) -> bool {
        self.is_group.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItemList {
    pub scene_items: Vec<SceneItemInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsVersion {
    pub obs_version: String,
    pub obs_web_socket_version: String,
    pub rpc_version: u32,
    #[serde(default)]
    pub platform: Option<String>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_hello_with_auth() {
        let text = json!({
            "op": 0,
            "d": {
                "obsWebSocketVersion": "5.1.0",
                "rpcVersion": 1,
                "authentication": {
                    "challenge": "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=",
                    "salt": "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI="
                }
            }
        })
        .to_string();

        let Incoming::Hello(hello) = parse_frame(&text).unwrap() else {
            panic!("expected Hello");
        };
        assert_eq!(hello.rpc_version, 1);
        let auth = hello.authentication.unwrap();
        assert_eq!(auth.salt, "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=");
    }

    #[test]
    fn parse_hello_without_auth() {
        let text = r#"{"op":0,"d":{"obsWebSocketVersion":"5.0.1","rpcVersion":1}}"#;
        let Incoming::Hello(hello) = parse_frame(text).unwrap() else {
            panic!("expected Hello");
        };
        assert!(hello.authentication.is_none());
    }

    #[test]
    fn failed_request_response_becomes_request_error() {
        let text = json!({
            "op": 7,
            "d": {
                "requestType": "SetSceneItemEnabled",
                "requestId": "abc",
                "requestStatus": {
                    "result": false,
                    "code": 600,
                    "comment": "No scene items were found in scene `POV_ROUTER` with the ID `42`."
                }
            }
        })
        .to_string();

        let Incoming::RequestResponse(resp) = parse_frame(&text).unwrap() else {
            panic!("expected RequestResponse");
        };
        assert_eq!(resp.request_id, "abc");
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.request_code(), Some(600));
    }

    #[test]
    fn successful_request_without_data_is_null() {
        let text = r#"{"op":7,"d":{"requestType":"SetSceneItemEnabled","requestId":"x","requestStatus":{"result":true,"code":100}}}"#;
        let Incoming::RequestResponse(resp) = parse_frame(text).unwrap() else {
            panic!("expected RequestResponse");
        };
        assert_eq!(resp.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn scene_item_list_handles_null_is_group() {
        let data = json!({
            "sceneItems": [
                { "sceneItemId": 1, "sourceName": "POV_Alice", "isGroup": null, "sceneItemEnabled": true, "sceneItemIndex": 0 },
                { "sceneItemId": 7, "sourceName": "Team", "isGroup": true, "sceneItemEnabled": false, "sceneItemIndex": 1 }
            ]
        });
        let list: SceneItemList = decode(data).unwrap();
        assert_eq!(list.scene_items.len(), 2);
        assert!(!list.scene_items[0].is_group());
        assert!(list.scene_items[1].is_group());
        assert_eq!(list.scene_items[1].scene_item_id, 7);
    }

    #[test]
    fn unknown_opcode_is_other() {
        let frame = parse_frame(r#"{"op":9,"d":{}}"#).unwrap();
        assert_eq!(frame.op(), 9);
        assert!(matches!(frame, Incoming::Other(9)));
    }

    #[test]
    fn malformed_frame_is_deserialization_error() {
        let err = parse_frame("not json").unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }));
    }

    #[test]
    fn request_frame_shape() {
        let frame = request_frame(
            "SetSceneItemEnabled",
            "id-1",
            &json!({ "sceneName": "POV_ROUTER", "sceneItemId": 3, "sceneItemEnabled": true }),
        );
        let parsed: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["op"], 6);
        assert_eq!(parsed["d"]["requestType"], "SetSceneItemEnabled");
        assert_eq!(parsed["d"]["requestId"], "id-1");
        assert_eq!(parsed["d"]["requestData"]["sceneItemId"], 3);
    }

    #[test]
    fn identify_frame_omits_missing_auth() {
        let parsed: Value = serde_json::from_str(&identify_frame(1, None, 0)).unwrap();
        assert_eq!(parsed["op"], 1);
        assert_eq!(parsed["d"]["rpcVersion"], 1);
        assert!(parsed["d"].get("authentication").is_none());
    }
}
