use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outgoing CDP command (client to Chrome).
#[derive(Debug, Serialize)]
pub struct CdpCommand {
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Raw incoming CDP message before classification — every inbound frame
/// is parsed into this union first, then split into response/event.
#[derive(Debug, Deserialize)]
pub struct RawCdpMessage {
    pub id: Option<u64>,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<CdpProtocolError>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdpProtocolError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug)]
pub struct CdpResponse {
    pub id: u64,
    pub result: Result<Value, CdpProtocolError>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

pub enum MessageKind {
    Response(CdpResponse),
    Event(CdpEvent),
}

impl RawCdpMessage {
    pub fn classify(self) -> Option<MessageKind> {
        if let Some(id) = self.id {
            let result = if let Some(error) = self.error {
                Err(error)
            } else {
                Ok(self.result.unwrap_or(Value::Null))
            };
            Some(MessageKind::Response(CdpResponse {
                id,
                result,
                session_id: self.session_id,
            }))
        } else if let Some(method) = self.method {
            Some(MessageKind::Event(CdpEvent {
                method,
                params: self.params.unwrap_or(Value::Null),
                session_id: self.session_id,
            }))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_response() {
        let raw: RawCdpMessage = serde_json::from_str(r#"{"id": 1, "result": {"ok": true}}"#).unwrap();
        assert!(matches!(raw.classify(), Some(MessageKind::Response(_))));
    }

    #[test]
    fn classify_event() {
        let raw: RawCdpMessage =
            serde_json::from_str(r#"{"method": "Page.loadEventFired", "params": {}}"#).unwrap();
        assert!(matches!(raw.classify(), Some(MessageKind::Event(_))));
    }

    #[test]
    fn classify_error_response() {
        let raw: RawCdpMessage =
            serde_json::from_str(r#"{"id": 2, "error": {"code": -32000, "message": "no such node"}}"#)
                .unwrap();
        if let Some(MessageKind::Response(resp)) = raw.classify() {
            assert!(resp.result.is_err());
        } else {
            panic!("expected response");
        }
    }

    #[test]
    fn unclassifiable_message_is_none() {
        let raw: RawCdpMessage = serde_json::from_str("{}").unwrap();
        assert!(raw.classify().is_none());
    }
}
