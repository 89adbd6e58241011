use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

/// Short-lived credentials issued for one invocation.
#[derive(Clone, PartialEq, Eq)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Absent only for static profile keys.
    pub session_token: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// The `credential_process` JSON document.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ProcessCredentials<'a> {
    version: u8,
    access_key_id: &'a str,
    secret_access_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration: Option<String>,
}

impl<'a> From<&'a TemporaryCredentials> for ProcessCredentials<'a> {
    fn from(c: &'a TemporaryCredentials) -> Self {
        Self {
            version: 1,
            access_key_id: &c.access_key_id,
            secret_access_key: &c.secret_access_key,
            session_token: c.session_token.as_deref(),
            expiration: c.expiration.map(|e| e.to_rfc3339()),
        }
    }
}

/// Formats an expiry as weekday and wall-clock time in `tz`, e.g. `Tue 12:25`.
pub fn format_expiration<Tz>(expiration: Option<&DateTime<Utc>>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    expiration
        .map(|e| e.with_timezone(tz).format("%a %H:%M").to_string())
        .unwrap_or_default()
}
