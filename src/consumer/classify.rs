/// What the consumer does with a decoded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Send to the logging capability.
    Forward,
    /// Accept and do nothing.
    Ignore,
}

/// Pick a disposition from the message's `name`.
///
/// `auth` is accepted and dropped; everything else, known or not, is
/// forwarded.
pub fn classify(name: &str) -> Disposition {
    match name {
        "auth" => Disposition::Ignore,
        "log" | "event" => Disposition::Forward,
        _ => Disposition::Forward,
    }
}
