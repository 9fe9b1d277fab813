//! Envelope codec: raw request bytes to typed envelopes and back.
//!
//! Checks run in a fixed order: size ceiling, emptiness, JSON syntax,
//! single-value rule, then field-level checks. The size check happens
//! before any parsing so an oversized body is rejected regardless of
//! whether its content is valid.

use serde_json::{Map, Value};
use thiserror::Error;

use super::action::{Action, ActionEnvelope, AuthPayload, LogPayload, MailPayload, Payload};

/// Default body ceiling: 1 MiB.
pub const DEFAULT_MAX_BODY: usize = 1_048_576;

/// Knobs for a single decode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Largest accepted body, in bytes.
    pub max_size: usize,
    /// Reject fields that the target type does not declare.
    pub strict: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_BODY,
            strict: false,
        }
    }
}

impl DecodeOptions {
    /// Default ceiling with unknown-field rejection turned on.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }
}

/// Why a request body could not be decoded. Always a client error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("body contains badly-formed JSON (at character {0})")]
    Malformed(usize),
    #[error("body contains incorrect JSON type for field {0:?}")]
    TypeMismatch(String),
    #[error("body must not be empty")]
    Empty,
    #[error("body contains unknown key {0:?}")]
    UnknownField(String),
    #[error("body must not be larger than {0} bytes")]
    TooLarge(usize),
    #[error("body must only have a single JSON value")]
    MultipleValues,
}

impl DecodeError {
    /// HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        400
    }
}

/// Decode an action envelope.
///
/// Payloads for known actions are type-checked field by field. With
/// `strict` set, unknown keys at the top level or inside a known payload
/// are rejected.
pub fn decode(raw: &[u8], options: &DecodeOptions) -> Result<ActionEnvelope, DecodeError> {
    let value = parse_single(raw, options.max_size)?;
    let Value::Object(mut object) = value else {
        return Err(DecodeError::TypeMismatch("body".into()));
    };

    if options.strict {
        if let Some(key) = object
            .keys()
            .find(|key| !ActionEnvelope::FIELDS.contains(&key.as_str()))
        {
            return Err(DecodeError::UnknownField(key.clone()));
        }
    }

    let action = match object.remove("action") {
        None | Some(Value::Null) => Action::from(""),
        Some(Value::String(name)) => Action::from(name),
        Some(_) => return Err(DecodeError::TypeMismatch("action".into())),
    };

    Ok(ActionEnvelope {
        action,
        auth: payload_field::<AuthPayload>(&mut object, "auth", options.strict)?,
        log: payload_field::<LogPayload>(&mut object, "log", options.strict)?,
        mail: payload_field::<MailPayload>(&mut object, "mail", options.strict)?,
    })
}

/// Decode a bare payload record, e.g. the body of an auth request.
pub fn decode_payload<P: Payload>(raw: &[u8], options: &DecodeOptions) -> Result<P, DecodeError> {
    let value = parse_single(raw, options.max_size)?;
    decode_record(value, "", options.strict)
}

/// Encode an envelope as JSON.
pub fn encode(envelope: &ActionEnvelope) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(envelope)
}

/// Parse exactly one JSON value out of `raw`.
fn parse_single(raw: &[u8], max_size: usize) -> Result<Value, DecodeError> {
    if raw.len() > max_size {
        return Err(DecodeError::TooLarge(max_size));
    }
    if raw.iter().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r')) {
        return Err(DecodeError::Empty);
    }

    let mut values = serde_json::Deserializer::from_slice(raw).into_iter::<Value>();
    let value = match values.next() {
        None => return Err(DecodeError::Empty),
        Some(Ok(value)) => value,
        Some(Err(err)) => return Err(DecodeError::Malformed(byte_offset(raw, &err))),
    };

    // Trailing whitespace yields `None` here; anything else is a second value.
    match values.next() {
        None => Ok(value),
        Some(_) => Err(DecodeError::MultipleValues),
    }
}

fn payload_field<P: Payload>(
    object: &mut Map<String, Value>,
    key: &str,
    strict: bool,
) -> Result<Option<P>, DecodeError> {
    match object.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => decode_record(value, key, strict).map(Some),
    }
}

/// Check each declared field is a string (or null), then build the record.
///
/// Null and undeclared keys are dropped before deserializing, so absent and
/// null fields both fall back to the empty string.
fn decode_record<P: Payload>(value: Value, path: &str, strict: bool) -> Result<P, DecodeError> {
    let Value::Object(object) = value else {
        let field = if path.is_empty() { "body" } else { path };
        return Err(DecodeError::TypeMismatch(field.to_string()));
    };

    let mut fields = Map::new();
    for (key, value) in object {
        if !P::FIELDS.contains(&key.as_str()) {
            if strict {
                return Err(DecodeError::UnknownField(qualify(path, &key)));
            }
            continue;
        }
        match value {
            Value::Null => {}
            Value::String(_) => {
                fields.insert(key, value);
            }
            _ => return Err(DecodeError::TypeMismatch(qualify(path, &key))),
        }
    }

    serde_json::from_value(Value::Object(fields)).map_err(|_| {
        let field = if path.is_empty() { "body" } else { path };
        DecodeError::TypeMismatch(field.to_string())
    })
}

fn qualify(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Convert serde_json's line/column position into a byte offset.
fn byte_offset(raw: &[u8], err: &serde_json::Error) -> usize {
    let line_start: usize = raw
        .split(|b| *b == b'\n')
        .take(err.line().saturating_sub(1))
        .map(|line| line.len() + 1)
        .sum();
    (line_start + err.column()).min(raw.len())
}
