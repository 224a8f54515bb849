/// Message envelopes for the window channel (agent <-> bridge) and the
/// extension channel (coordinator <-> bridge, popup <-> coordinator)
use crate::error::HandshakeError;
use crate::request_id::RequestId;
use crate::tabs::{TabId, TabSpec, WindowId};
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

/// Window-channel message, discriminated by `target` then `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target")]
pub enum PageMessage {
    ToAgent(AgentMessage),
    ToBridge(BridgeMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentMessage {
    RequestConnect {
        #[serde(rename = "requestId")]
        request_id: RequestId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    AgentConnectResult {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        address: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    AgentReady,
}

impl PageMessage {
    /// Accept only messages posted by this same window that parse as ours
    pub fn decode(same_window: bool, raw: Value) -> Option<PageMessage> {
        if !same_window {
            return None;
        }
        serde_json::from_value(raw).ok()
    }

    pub fn request_connect(request_id: RequestId) -> PageMessage {
        PageMessage::ToAgent(AgentMessage::RequestConnect { request_id })
    }

    pub fn connect_result(request_id: RequestId, reply: ConnectReply) -> PageMessage {
        PageMessage::ToBridge(BridgeMessage::AgentConnectResult {
            request_id,
            address: reply.address,
            error: reply.error,
        })
    }
}

/// Outbound side of the window channel
pub trait PagePort {
    fn post(&self, message: &PageMessage) -> Result<(), String>;
}

/// `{address}` or `{error}`; both absent means the peer sent nothing useful
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectReply {
    pub fn connected(address: impl Into<String>) -> ConnectReply {
        ConnectReply {
            address: Some(address.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<HandshakeError>) -> ConnectReply {
        ConnectReply {
            address: None,
            error: Some(error.into().wire()),
        }
    }

    /// Non-empty address, if the reply carries one
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref().filter(|a| !a.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingReply {
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenTabsReply {
    pub ok: bool,
    #[serde(rename = "windowId", default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OpenTabsReply {
    pub fn opened(window_id: WindowId) -> OpenTabsReply {
        OpenTabsReply {
            ok: true,
            window_id: Some(window_id),
            error: None,
        }
    }

    pub fn failed(error: impl Into<HandshakeError>) -> OpenTabsReply {
        OpenTabsReply {
            ok: false,
            window_id: None,
            error: Some(error.into().wire()),
        }
    }
}

/// Extension-channel request, discriminated by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExtensionRequest {
    Ping,
    Connect,
    OpenConnectTab {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    ConnectTab {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    OpenTabs {
        #[serde(default)]
        tabs: Vec<TabSpec>,
    },
    WalletConnected {
        address: String,
    },
}

const REQUEST_KINDS: [&str; 6] = [
    "Ping",
    "Connect",
    "OpenConnectTab",
    "ConnectTab",
    "OpenTabs",
    "WalletConnected",
];

/// Result of decoding a raw extension message
#[derive(Debug, PartialEq)]
pub enum Inbound {
    Request(ExtensionRequest),
    /// One of our kinds, but the body did not parse
    Malformed(String),
    /// Not addressed to us
    Foreign,
}

impl ExtensionRequest {
    pub fn decode(raw: Value) -> Inbound {
        let kind = match raw.get("type").and_then(Value::as_str) {
            Some(kind) if REQUEST_KINDS.contains(&kind) => kind.to_string(),
            _ => return Inbound::Foreign,
        };

        match serde_json::from_value(raw) {
            Ok(request) => Inbound::Request(request),
            Err(e) => {
                log::warn!("malformed {} message: {}", kind, e);
                Inbound::Malformed(kind)
            }
        }
    }
}

/// How a handler answers an extension message
pub enum Reply {
    /// Answer synchronously; the channel closes after this
    Now(Value),
    /// Keep the channel open and answer when the future completes
    Later(LocalBoxFuture<'static, Value>),
    /// Not ours to answer
    Ignored,
}

impl Reply {
    pub fn now<T: Serialize>(body: &T) -> Reply {
        Reply::Now(to_body(body))
    }

    pub fn later<F, T>(work: F) -> Reply
    where
        F: Future<Output = T> + 'static,
        T: Serialize,
    {
        Reply::Later(Box::pin(async move { to_body(&work.await) }))
    }

    pub fn keeps_channel_open(&self) -> bool {
        matches!(self, Reply::Later(_))
    }
}

fn to_body<T: Serialize>(body: &T) -> Value {
    serde_json::to_value(body).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_request_connect_wire_shape() {
        let msg = PageMessage::request_connect(RequestId::from("1-abc"));
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"target": "ToAgent", "type": "RequestConnect", "requestId": "1-abc"})
        );
    }

    #[test]
    fn test_decode_connect_result() {
        let raw = json!({
            "target": "ToBridge",
            "type": "AgentConnectResult",
            "requestId": "1-abc",
            "address": "Addr123"
        });

        assert_eq!(
            PageMessage::decode(true, raw),
            Some(PageMessage::ToBridge(BridgeMessage::AgentConnectResult {
                request_id: RequestId::from("1-abc"),
                address: Some("Addr123".to_string()),
                error: None,
            }))
        );
    }

    #[test]
    fn test_decode_agent_ready() {
        let raw = json!({"target": "ToBridge", "type": "AgentReady"});
        assert_eq!(
            PageMessage::decode(true, raw),
            Some(PageMessage::ToBridge(BridgeMessage::AgentReady))
        );
    }

    #[test]
    fn test_decode_rejects_other_windows() {
        let raw = json!({"target": "ToAgent", "type": "RequestConnect", "requestId": "x"});
        assert_eq!(PageMessage::decode(false, raw), None);
    }

    #[test]
    fn test_decode_ignores_foreign_page_traffic() {
        assert_eq!(PageMessage::decode(true, json!({"target": "SomeWidget", "type": "hello"})), None);
        assert_eq!(PageMessage::decode(true, json!("just a string")), None);
        // right target, wrong direction
        assert_eq!(
            PageMessage::decode(true, json!({"target": "ToAgent", "type": "AgentReady"})),
            None
        );
    }

    #[test]
    fn test_extension_request_kinds() {
        assert_eq!(
            ExtensionRequest::decode(json!({"type": "Ping"})),
            Inbound::Request(ExtensionRequest::Ping)
        );
        assert_eq!(
            ExtensionRequest::decode(json!({"type": "OpenConnectTab"})),
            Inbound::Request(ExtensionRequest::OpenConnectTab { url: None })
        );
        assert_eq!(
            ExtensionRequest::decode(json!({"type": "OpenTabs", "tabs": [{"url": "a"}, {"url": "b", "pinned": true}]})),
            Inbound::Request(ExtensionRequest::OpenTabs {
                tabs: vec![
                    TabSpec { url: "a".to_string(), pinned: false },
                    TabSpec { url: "b".to_string(), pinned: true },
                ]
            })
        );
    }

    #[test]
    fn test_extension_request_foreign_and_malformed() {
        assert_eq!(ExtensionRequest::decode(json!({"type": "SomethingElse"})), Inbound::Foreign);
        assert_eq!(ExtensionRequest::decode(json!({"command": "OPEN_TABS"})), Inbound::Foreign);
        assert_eq!(
            ExtensionRequest::decode(json!({"type": "OpenTabs", "tabs": "nope"})),
            Inbound::Malformed("OpenTabs".to_string())
        );
    }

    #[test]
    fn test_reply_shapes() {
        assert_eq!(
            serde_json::to_value(ConnectReply::failed(ErrorCode::TabCreateFailed)).unwrap(),
            json!({"error": "TAB_CREATE_FAILED"})
        );
        assert_eq!(
            serde_json::to_value(OpenTabsReply::opened(12)).unwrap(),
            json!({"ok": true, "windowId": 12})
        );
        assert_eq!(
            serde_json::to_value(OpenTabsReply::failed(ErrorCode::NoTabs)).unwrap(),
            json!({"ok": false, "error": "NO_TABS"})
        );
        assert_eq!(serde_json::to_value(ConnectReply::default()).unwrap(), json!({}));
    }

    #[test]
    fn test_only_deferred_replies_keep_channel_open() {
        assert!(!Reply::now(&PingReply { ok: true }).keeps_channel_open());
        assert!(Reply::later(async { PingReply { ok: true } }).keeps_channel_open());
        assert!(!Reply::Ignored.keeps_channel_open());
    }

    #[test]
    fn test_empty_address_is_no_address() {
        let reply = ConnectReply { address: Some(String::new()), error: None };
        assert_eq!(reply.address(), None);
        assert_eq!(ConnectReply::connected("Addr123").address(), Some("Addr123"));
    }
}
