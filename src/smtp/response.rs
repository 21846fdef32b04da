//! SMTP response handling

use chrono::{DateTime, Utc};

/// Product string announced in the greeting banner
pub const SERVER_SOFTWARE: &str = "FakeSmtpServer 1.0.0/1.0.0";

/// Represents a single-line SMTP reply that can be sent to a client
#[derive(Debug, Clone, PartialEq)]
pub struct SmtpResponse {
    /// The SMTP reply code (e.g., "220", "250", "550")
    pub code: String,
    /// The human-readable message
    pub message: String,
}

impl SmtpResponse {
    /// Create a new SMTP response
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Create the greeting banner (220) stamped with `now`
    pub fn greeting(domain: &str, now: &DateTime<Utc>) -> Self {
        Self::new(
            "220",
            &format!("{domain} ESMTP {SERVER_SOFTWARE}; {}", now.to_rfc2822()),
        )
    }

    /// Create a positive verification reply (250) for a known user
    pub fn user_ok(user: &str, domain: &str) -> Self {
        Self::new("250", &format!("2.1.5 {user} <{user}@{domain}>"))
    }

    /// Create a negative verification reply (550) for an unknown user
    pub fn user_unknown(user: &str) -> Self {
        Self::new("550", &format!("5.1.1 {user}... User unknown"))
    }

    /// Reply used when VRFY is turned off (502)
    pub fn vrfy_disallowed() -> Self {
        Self::new("502", "VRFY disallowed.")
    }

    /// Reply used when a verb is turned off (502)
    pub fn unimplemented() -> Self {
        Self::new("502", "Unimplemented command.")
    }

    /// Format the response for sending over the wire
    pub fn format(&self) -> String {
        format!("{} {}\n", self.code, self.message)
    }
}
