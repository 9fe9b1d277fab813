//! envelope: the generic request/response JSON shapes.
//!
//! An inbound request is an [`ActionEnvelope`]: one action name plus the
//! payload that action needs. Every reply, success or failure, is a
//! [`ResponseEnvelope`].
//!
//! ```json
//! { "action": "auth", "auth": { "email": "a@b.c", "password": "secret" } }
//! ```
//!
//! ```json
//! { "error": false, "message": "Authenticated user a@b.c", "data": { ... } }
//! ```
//!
//! Decoding goes through [`decode`], which enforces the size ceiling, the
//! single-value rule, and (optionally) strict field checking before any
//! typed value is built.

mod action;
mod codec;
mod response;

pub use action::{Action, ActionEnvelope, AuthPayload, LogPayload, MailPayload, Payload, UnknownAction};
pub use codec::{decode, decode_payload, encode, DecodeError, DecodeOptions, DEFAULT_MAX_BODY};
pub use response::ResponseEnvelope;
