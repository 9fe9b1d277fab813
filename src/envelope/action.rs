//! Action names and their payloads.

use std::fmt;

use serde::de::{DeserializeOwned, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// The action named by an inbound envelope.
///
/// The known set is fixed at compile time. Anything else is carried as
/// `Other` so the dispatcher can reject it by name instead of the codec
/// failing on it. `Other` never holds a known name: build actions through
/// `From<&str>` / `From<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Credential check against the auth capability.
    Auth,
    /// Write a log record.
    Log,
    /// Send a mail.
    Mail,
    /// An action this router does not know.
    Other(UnknownAction),
}

/// Name of an action outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnknownAction(String);

impl UnknownAction {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Action {
    /// The wire name of this action.
    pub fn as_str(&self) -> &str {
        match self {
            Action::Auth => "auth",
            Action::Log => "log",
            Action::Mail => "mail",
            Action::Other(name) => name.as_str(),
        }
    }

    /// True for every action except `Other`.
    pub fn is_known(&self) -> bool {
        !matches!(self, Action::Other(_))
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        match name {
            "auth" => Action::Auth,
            "log" => Action::Log,
            "mail" => Action::Mail,
            other => Action::Other(UnknownAction(other.to_string())),
        }
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        match name.as_str() {
            "auth" | "log" | "mail" => Action::from(name.as_str()),
            _ => Action::Other(UnknownAction(name)),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Action::from)
    }
}

/// A flat payload record whose fields are all strings.
///
/// `FIELDS` lists the accepted keys; the codec uses it for strict-mode
/// unknown-key checks and per-field type errors.
pub trait Payload: Serialize + DeserializeOwned {
    const FIELDS: &'static [&'static str];
}

/// Credentials forwarded to the auth capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthPayload {
    pub email: String,
    pub password: String,
}

impl Payload for AuthPayload {
    const FIELDS: &'static [&'static str] = &["email", "password"];
}

/// A log record: a short name plus free-form data.
///
/// The same shape travels over every log transport and is the body of a
/// topic-exchange wire message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogPayload {
    pub name: String,
    pub data: String,
}

impl LogPayload {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

impl Payload for LogPayload {
    const FIELDS: &'static [&'static str] = &["name", "data"];
}

/// Mail fields forwarded to the mailer capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailPayload {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub message: String,
}

impl Payload for MailPayload {
    const FIELDS: &'static [&'static str] = &["from", "to", "subject", "message"];
}

/// The inbound request: an action plus the payloads it may carry.
///
/// Only the payload named by `action` is used. Siblings are tolerated and
/// ignored so callers can send payload supersets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<MailPayload>,
}

impl ActionEnvelope {
    /// Field names accepted at the top level in strict mode.
    pub const FIELDS: &'static [&'static str] = &["action", "auth", "log", "mail"];

    /// An envelope with no payloads.
    pub fn new(action: impl Into<Action>) -> Self {
        Self {
            action: action.into(),
            auth: None,
            log: None,
            mail: None,
        }
    }

    pub fn auth(payload: AuthPayload) -> Self {
        Self {
            auth: Some(payload),
            ..Self::new(Action::Auth)
        }
    }

    pub fn log(payload: LogPayload) -> Self {
        Self {
            log: Some(payload),
            ..Self::new(Action::Log)
        }
    }

    pub fn mail(payload: MailPayload) -> Self {
        Self {
            mail: Some(payload),
            ..Self::new(Action::Mail)
        }
    }

    /// The payload named by `action`, serialized to JSON.
    ///
    /// Returns `Ok(None)` when the action is unknown or its payload is absent.
    pub fn active_payload(&self) -> Result<Option<serde_json::Value>, serde_json::Error> {
        match self.action {
            Action::Auth => self.auth.as_ref().map(serde_json::to_value).transpose(),
            Action::Log => self.log.as_ref().map(serde_json::to_value).transpose(),
            Action::Mail => self.mail.as_ref().map(serde_json::to_value).transpose(),
            Action::Other(_) => Ok(None),
        }
    }
}
