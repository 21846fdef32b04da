//! Server configuration

use std::collections::BTreeSet;

/// Domain announced in the banner and used in verification replies
pub const DEFAULT_DOMAIN: &str = "mail.example.tld";

/// Local users known to the server out of the box
pub const DEFAULT_USERS: [&str; 2] = ["root", "james"];

/// Static configuration shared read-only by every session.
///
/// Built once with the `with_*`/`allow_*` methods and then handed to
/// [`SmtpServer`](crate::SmtpServer), which never mutates it.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    domain: String,
    users: BTreeSet<String>,
    allow_vrfy: bool,
    allow_expn: bool,
    allow_rcpt_to: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_owned(),
            users: DEFAULT_USERS.iter().map(|u| (*u).to_owned()).collect(),
            allow_vrfy: true,
            allow_expn: true,
            allow_rcpt_to: false,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the domain used in the banner and in addresses
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_owned();
        self
    }

    /// Replace the user list
    pub fn with_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users = users.into_iter().map(Into::into).collect();
        self
    }

    pub fn allow_vrfy(mut self, allow: bool) -> Self {
        self.allow_vrfy = allow;
        self
    }

    pub fn allow_expn(mut self, allow: bool) -> Self {
        self.allow_expn = allow;
        self
    }

    pub fn allow_rcpt_to(mut self, allow: bool) -> Self {
        self.allow_rcpt_to = allow;
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Check whether `name` is a known local user (exact match)
    pub fn is_user(&self, name: &str) -> bool {
        self.users.contains(name)
    }

    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(String::as_str)
    }

    pub fn vrfy_enabled(&self) -> bool {
        self.allow_vrfy
    }

    pub fn expn_enabled(&self) -> bool {
        self.allow_expn
    }

    pub fn rcpt_to_enabled(&self) -> bool {
        self.allow_rcpt_to
    }
}
