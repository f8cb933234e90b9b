use crate::broker::BIN_ERROR_SENTINEL;
use crate::error::{ClientError, Result};

/// Stderr fragments the external tool emits on authentication failures.
/// Matching is best-effort and tied to the tool's wording; anything else
/// classifies as a generic query error.
const SESSION_ERROR_PHRASES: [&str; 2] =
    ["not currently signed in", "401: Authentication required"];

/// A successfully classified payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    Raw(String),
}

impl Payload {
    pub(crate) fn into_json(self) -> Result<serde_json::Value> {
        match self {
            Payload::Json(value) => Ok(value),
            Payload::Raw(text) => serde_json::from_str(&text)
                .map_err(|err| ClientError::query(format!("malformed payload: {err}"))),
        }
    }

    pub(crate) fn into_raw(self) -> String {
        match self {
            Payload::Raw(text) => text,
            Payload::Json(value) => value.to_string(),
        }
    }
}

/// Classify a broker result. Pure: no I/O, fully drivable with literal
/// strings. A sentinel-carrying output becomes a typed failure; anything
/// else is returned verbatim (`expect_raw`) or parsed as JSON.
pub fn classify(raw_output: &str, expect_raw: bool) -> Result<Payload> {
    if let Some(idx) = raw_output.find(BIN_ERROR_SENTINEL) {
        let message = raw_output[idx + BIN_ERROR_SENTINEL.len()..].to_string();
        if SESSION_ERROR_PHRASES
            .iter()
            .any(|phrase| message.contains(phrase))
        {
            return Err(ClientError::Session { message });
        }
        return Err(ClientError::Query { message });
    }

    if expect_raw {
        return Ok(Payload::Raw(raw_output.to_string()));
    }

    serde_json::from_str(raw_output)
        .map(Payload::Json)
        .map_err(|err| ClientError::query(format!("malformed payload: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_payload_as_json() {
        let payload = classify(r#"{"uuid":"v1","name":"Home"}"#, false).unwrap();
        assert_eq!(
            payload,
            Payload::Json(serde_json::json!({"uuid": "v1", "name": "Home"}))
        );
    }

    #[test]
    fn raw_mode_returns_text_unchanged() {
        let payload = classify("not json at all", true).unwrap();
        assert_eq!(payload, Payload::Raw("not json at all".to_string()));
    }

    #[test]
    fn malformed_json_is_a_query_error() {
        let err = classify("not json at all", false).unwrap_err();
        assert!(matches!(err, ClientError::Query { .. }));
    }

    #[test]
    fn signed_out_message_is_a_session_error() {
        let raw = "[bin-error]---[LOG] 2020/01/01 00:00:00 (ERROR) You are not currently signed in. Please run `op signin --help` for instructions";
        let err = classify(raw, false).unwrap_err();
        match err {
            ClientError::Session { message } => {
                assert!(message.contains("not currently signed in"));
            }
            other => panic!("expected session error, got {other:?}"),
        }
    }

    #[test]
    fn authentication_required_is_a_session_error() {
        let raw = "[bin-error]---[LOG] (ERROR) 401: Authentication required.";
        assert!(classify(raw, false).unwrap_err().is_session());
    }

    #[test]
    fn other_tool_errors_are_query_errors() {
        let raw = "[bin-error]---[LOG] (ERROR) Item 3142 not found";
        let err = classify(raw, false).unwrap_err();
        match err {
            ClientError::Query { message } => assert!(message.contains("Item 3142 not found")),
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn sentinel_beats_raw_mode() {
        let err = classify("[bin-error]---boom", true).unwrap_err();
        assert!(matches!(err, ClientError::Query { .. }));
    }
}
