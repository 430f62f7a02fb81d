//! Validation Utilities
//!
//! Envelope parsing and payload validation shared by client and server.

use serde::de::DeserializeOwned;
use serde_json::Value;
use validator::{Validate, ValidationErrors};

use super::error::ProtocolError;
use super::protocol::{Envelope, MessageType};

/// Parse a text frame into an envelope.
///
/// Requires a JSON object with a non-empty string `type`. A `payload`, when
/// present and not `null`, must be an object.
pub fn parse_envelope(text: &str) -> Result<Envelope, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;

    let Value::Object(mut fields) = value else {
        return Err(ProtocolError::NotAnObject);
    };

    let kind = match fields.remove("type") {
        Some(Value::String(kind)) if !kind.is_empty() => kind,
        _ => return Err(ProtocolError::MissingType),
    };

    let payload = match fields.remove("payload") {
        None | Some(Value::Null) => None,
        Some(payload @ Value::Object(_)) => Some(payload),
        Some(_) => {
            return Err(ProtocolError::InvalidPayload(
                "payload must be an object".into(),
            ))
        }
    };

    Ok(Envelope { kind, payload })
}

/// Resolve the envelope's type, rejecting names outside the protocol.
pub fn message_type(envelope: &Envelope) -> Result<MessageType, ProtocolError> {
    envelope
        .message_type()
        .ok_or_else(|| ProtocolError::UnknownType(envelope.kind.clone()))
}

/// Deserialize and validate an envelope payload.
pub fn payload_as<T>(envelope: &Envelope) -> Result<T, ProtocolError>
where
    T: DeserializeOwned + Validate,
{
    let payload = envelope
        .payload
        .clone()
        .ok_or_else(|| ProtocolError::InvalidPayload("payload is required".into()))?;

    let parsed: T = serde_json::from_value(payload)
        .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;

    parsed.validate().map_err(validation_error)?;
    Ok(parsed)
}

/// Convert validation errors to a protocol error
pub fn validation_error(errors: ValidationErrors) -> ProtocolError {
    let message = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let detail = e.message.clone().map(|m| m.to_string()).unwrap_or_default();
                format!("{}: {}", field, detail)
            })
        })
        .next()
        .unwrap_or_else(|| "Validation failed".into());

    ProtocolError::InvalidPayload(message)
}
