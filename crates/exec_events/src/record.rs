use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One parsed NDJSON object off a child's stdout, untyped until classified.
///
/// Vendors tag records with a `type` field; everything else is dialect-specific
/// and left to the normalizers.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    value: Value,
}

impl StreamRecord {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// The `type` discriminator, when present.
    pub fn record_type(&self) -> Option<&str> {
        self.value.get("type").and_then(Value::as_str)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Decodes the record as an inbound control request, if it is one.
    pub fn as_control_request(&self) -> Option<ControlRequest> {
        if self.record_type() != Some("control_request") {
            return None;
        }
        let id = self.value.get("id")?.clone();
        let subtype = self.value.get("subtype")?.as_str()?.to_string();
        let payload = self.value.get("payload").cloned().unwrap_or(Value::Null);
        Some(ControlRequest {
            id,
            subtype,
            payload,
        })
    }

    /// Decodes the record as an inbound control response, if it is one.
    ///
    /// Responses nest their body under a `response` key:
    /// `{"type":"control_response","response":{"id":...,"ok":true,"result":{...}}}`.
    pub fn as_control_response(&self) -> Option<ControlResponse> {
        if self.record_type() != Some("control_response") {
            return None;
        }
        let body = self.value.get("response")?;
        let id = body.get("id")?.clone();
        let ok = body.get("ok").and_then(Value::as_bool)?;
        Some(ControlResponse {
            id,
            ok,
            result: body.get("result").cloned(),
            error: body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// A control request: one half of the request/response subprotocol that rides
/// on the same NDJSON stream as free-form events.
///
/// `id` is an opaque JSON value (string or integer); it is echoed verbatim in
/// the matching response.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlRequest {
    pub id: Value,
    pub subtype: String,
    pub payload: Value,
}

impl ControlRequest {
    pub fn new(id: impl Into<Value>, subtype: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            subtype: subtype.into(),
            payload,
        }
    }

    /// Wire form of this request.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "type": "control_request",
            "id": self.id,
            "subtype": self.subtype,
            "payload": self.payload,
        })
    }

    /// Builds the success-response envelope echoing this request's id.
    pub fn response_ok(&self, result: Value) -> Value {
        serde_json::json!({
            "type": "control_response",
            "response": { "id": self.id, "ok": true, "result": result },
        })
    }

    /// Builds the error-response envelope echoing this request's id.
    pub fn response_err(&self, error: impl AsRef<str>) -> Value {
        serde_json::json!({
            "type": "control_response",
            "response": { "id": self.id, "ok": false, "error": error.as_ref() },
        })
    }
}

/// A settled control response, matched to its request by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlResponse {
    pub id: Value,
    pub ok: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// Answer to a `can_use_tool` control request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionResponse {
    pub allow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PermissionResponse {
    pub fn allow() -> Self {
        Self {
            allow: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reason: Some(reason.into()),
        }
    }
}

/// Verdict of a `hook_callback` control request. `Deny` short-circuits the
/// tool call the hook guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookDecision {
    Allow,
    Deny,
    Ask,
}

/// Full hook output structure returned from a `hook_callback` handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookOutput {
    pub decision: HookDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifications: Option<Value>,
}

impl HookOutput {
    pub fn allow() -> Self {
        Self {
            decision: HookDecision::Allow,
            reason: None,
            modifications: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn control_request_round_trips_through_wire_form() {
        let req = ControlRequest::new(7u64, "can_use_tool", json!({"tool": "write"}));
        let wire = StreamRecord::new(req.to_wire());
        let parsed = wire.as_control_request().unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn control_response_parses_both_outcomes() {
        let ok = StreamRecord::new(json!({
            "type": "control_response",
            "response": {"id": 1, "ok": true, "result": {"allow": true}},
        }));
        let resp = ok.as_control_response().unwrap();
        assert!(resp.ok);
        assert_eq!(resp.result.unwrap()["allow"], true);

        let err = StreamRecord::new(json!({
            "type": "control_response",
            "response": {"id": "req-2", "ok": false, "error": "denied"},
        }));
        let resp = err.as_control_response().unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.error.as_deref(), Some("denied"));
    }

    #[test]
    fn response_envelopes_echo_the_request_id() {
        let req = ControlRequest::new("abc", "interrupt", Value::Null);
        let ok = req.response_ok(json!({}));
        assert_eq!(ok["response"]["id"], "abc");
        let err = req.response_err("nope");
        assert_eq!(err["response"]["ok"], false);
        assert_eq!(err["response"]["error"], "nope");
    }

    #[test]
    fn non_control_records_classify_as_neither() {
        let rec = StreamRecord::new(json!({"type": "assistant", "message": {}}));
        assert!(rec.as_control_request().is_none());
        assert!(rec.as_control_response().is_none());
        assert_eq!(rec.record_type(), Some("assistant"));
    }
}
