//! QR payload parsing.
//!
//! Check-in codes come in three shapes, tried in this order:
//!
//! 1. A JSON object carrying `eventAttendanceId` and `checkingInAccountId`
//!    (or the legacy `id` and `accountId` keys)
//! 2. `"<attendanceId>:<accountId>"`
//! 3. A bare `"<attendanceId>"`
//!
//! Parsing only classifies the text. [`DecodedPayload::validate`] decides
//! whether the result can be sent to the backend.

use crate::error::{MissingField, ParseError, PayloadError};
use serde::{Deserialize, Serialize};

/// Separator between the attendance id and the account id.
pub const ID_SEPARATOR: char = ':';

/// Structured content of a decoded QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedPayload {
    /// Attendance record to confirm
    pub event_attendance_id: Option<String>,
    /// Account performing the check-in
    pub checking_in_account_id: Option<String>,
    /// The text exactly as the decoder delivered it
    pub raw_text: String,
}

impl DecodedPayload {
    /// Turn the payload into a ticket the backend can confirm.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::IncompletePayload`] if either id is missing.
    pub fn validate(self) -> Result<CheckInTicket, PayloadError> {
        match (self.event_attendance_id, self.checking_in_account_id) {
            (Some(event_attendance_id), Some(checking_in_account_id)) => Ok(CheckInTicket {
                event_attendance_id,
                checking_in_account_id,
                raw_text: self.raw_text,
            }),
            (None, Some(_)) => Err(PayloadError::IncompletePayload {
                missing: MissingField::EventAttendanceId,
            }),
            (Some(_), None) => Err(PayloadError::IncompletePayload {
                missing: MissingField::CheckingInAccountId,
            }),
            (None, None) => Err(PayloadError::IncompletePayload {
                missing: MissingField::Both,
            }),
        }
    }
}

/// A payload with both identifiers present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInTicket {
    /// Attendance record to confirm
    pub event_attendance_id: String,
    /// Account performing the check-in
    pub checking_in_account_id: String,
    /// Source text
    pub raw_text: String,
}

impl CheckInTicket {
    /// Body of the confirmation call.
    #[must_use]
    pub fn request(&self) -> ConfirmationRequest {
        ConfirmationRequest {
            event_attendance_id: self.event_attendance_id.clone(),
            checking_in_account_id: self.checking_in_account_id.clone(),
        }
    }

    /// The ticket as a decoded payload, for display in results.
    #[must_use]
    pub fn payload(&self) -> DecodedPayload {
        DecodedPayload {
            event_attendance_id: Some(self.event_attendance_id.clone()),
            checking_in_account_id: Some(self.checking_in_account_id.clone()),
            raw_text: self.raw_text.clone(),
        }
    }
}

/// JSON body sent to the confirmation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    /// Attendance record to confirm
    pub event_attendance_id: String,
    /// Account performing the check-in
    pub checking_in_account_id: String,
}

/// Identifier as it may appear in the JSON payload.
///
/// Any other JSON type under an id key makes the whole payload malformed.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(serde_json::Number),
}

impl IdValue {
    fn into_id(self) -> Option<String> {
        match self {
            Self::Text(text) => non_empty(&text),
            Self::Number(number) => Some(number.to_string()),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePayload {
    event_attendance_id: Option<IdValue>,
    id: Option<IdValue>,
    checking_in_account_id: Option<IdValue>,
    account_id: Option<IdValue>,
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn first_id(primary: Option<IdValue>, legacy: Option<IdValue>) -> Option<String> {
    primary
        .and_then(IdValue::into_id)
        .or_else(|| legacy.and_then(IdValue::into_id))
}

/// Parse decoded QR text.
///
/// # Errors
///
/// Returns [`ParseError::MalformedPayload`] for empty text, text that opens
/// like a JSON object but is not one, and delimited text with more than two
/// parts.
///
/// # Examples
///
/// ```
/// use turnstile_checkin::parser::parse;
///
/// let payload = parse("att-1:acct-9").unwrap();
/// assert_eq!(payload.event_attendance_id.as_deref(), Some("att-1"));
/// assert_eq!(payload.checking_in_account_id.as_deref(), Some("acct-9"));
/// ```
pub fn parse(raw_text: &str) -> Result<DecodedPayload, ParseError> {
    let text = raw_text.trim();
    if text.is_empty() {
        return Err(ParseError::malformed("empty text"));
    }

    let (event_attendance_id, checking_in_account_id) = if text.starts_with('{') {
        let wire: WirePayload = serde_json::from_str(text)
            .map_err(|error| ParseError::malformed(format!("invalid JSON object: {error}")))?;
        (
            first_id(wire.event_attendance_id, wire.id),
            first_id(wire.checking_in_account_id, wire.account_id),
        )
    } else if text.contains(ID_SEPARATOR) {
        let parts: Vec<&str> = text.split(ID_SEPARATOR).collect();
        let [attendance, account] = parts.as_slice() else {
            return Err(ParseError::malformed(format!(
                "expected two '{ID_SEPARATOR}'-separated ids, found {}",
                parts.len()
            )));
        };
        (non_empty(attendance), non_empty(account))
    } else {
        (Some(text.to_string()), None)
    };

    Ok(DecodedPayload {
        event_attendance_id,
        checking_in_account_id,
        raw_text: raw_text.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn json_payload_with_primary_keys() {
        let payload =
            parse(r#"{"eventAttendanceId":"att-1","checkingInAccountId":"acct-2"}"#).unwrap();
        assert_eq!(payload.event_attendance_id.as_deref(), Some("att-1"));
        assert_eq!(payload.checking_in_account_id.as_deref(), Some("acct-2"));
    }

    #[test]
    fn json_payload_with_legacy_keys() {
        let payload = parse(r#"{"id": 42, "accountId": "acct-2"}"#).unwrap();
        assert_eq!(payload.event_attendance_id.as_deref(), Some("42"));
        assert_eq!(payload.checking_in_account_id.as_deref(), Some("acct-2"));
    }

    #[test]
    fn primary_keys_win_over_legacy_keys() {
        let payload = parse(
            r#"{"id":"old","eventAttendanceId":"new","accountId":"a","checkingInAccountId":"b"}"#,
        )
        .unwrap();
        assert_eq!(payload.event_attendance_id.as_deref(), Some("new"));
        assert_eq!(payload.checking_in_account_id.as_deref(), Some("b"));
    }

    #[test]
    fn empty_primary_key_falls_back_to_legacy() {
        let payload = parse(r#"{"eventAttendanceId":"  ","id":"att"}"#).unwrap();
        assert_eq!(payload.event_attendance_id.as_deref(), Some("att"));
        assert_eq!(payload.checking_in_account_id, None);
    }

    #[test]
    fn delimited_payload() {
        let payload = parse("  att-1 : acct-2 \n").unwrap();
        assert_eq!(payload.event_attendance_id.as_deref(), Some("att-1"));
        assert_eq!(payload.checking_in_account_id.as_deref(), Some("acct-2"));
        assert_eq!(payload.raw_text, "  att-1 : acct-2 \n");
    }

    #[test]
    fn bare_attendance_id_is_incomplete() {
        let payload = parse("att-1").unwrap();
        assert_eq!(payload.event_attendance_id.as_deref(), Some("att-1"));
        assert_eq!(payload.checking_in_account_id, None);
        assert_eq!(
            payload.validate(),
            Err(PayloadError::IncompletePayload {
                missing: MissingField::CheckingInAccountId
            })
        );
    }

    #[test]
    fn malformed_inputs() {
        for text in ["", "   ", "{not json", r#"{"id": "a""#, r#"{"id": true}"#, "a:b:c"] {
            assert!(
                matches!(parse(text), Err(ParseError::MalformedPayload { .. })),
                "{text:?} should be malformed"
            );
        }
    }

    #[test]
    fn empty_ids_count_as_missing() {
        let payload = parse(":acct").unwrap();
        assert_eq!(payload.event_attendance_id, None);
        assert_eq!(
            payload.validate(),
            Err(PayloadError::IncompletePayload {
                missing: MissingField::EventAttendanceId
            })
        );

        let payload = parse(r#"{"eventAttendanceId": null}"#).unwrap();
        assert_eq!(
            payload.validate(),
            Err(PayloadError::IncompletePayload {
                missing: MissingField::Both
            })
        );
    }

    #[test]
    fn confirmation_request_uses_camel_case() {
        let ticket = parse("att-1:acct-2").unwrap().validate().unwrap();
        let body = serde_json::to_value(ticket.request()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"eventAttendanceId": "att-1", "checkingInAccountId": "acct-2"})
        );
    }

    proptest! {
        #[test]
        fn parse_never_panics(text in ".*") {
            let _ = parse(&text);
        }

        #[test]
        fn delimited_ids_round_trip(a in "[A-Za-z0-9-]{1,24}", b in "[A-Za-z0-9-]{1,24}") {
            let ticket = parse(&format!("{a}:{b}")).unwrap().validate().unwrap();
            prop_assert_eq!(ticket.event_attendance_id, a);
            prop_assert_eq!(ticket.checking_in_account_id, b);
        }
    }
}
