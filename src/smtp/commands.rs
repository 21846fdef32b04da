//! Implementation of SMTP commands

use crate::smtp::config::ServerConfig;
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::SmtpSession;

use log::info;

const VRFY_PREFIX: &[u8] = b"VRFY ";
const EXPN_PREFIX: &[u8] = b"EXPN ";
const RCPT_TO_PREFIX: &[u8] = b"RCPT TO:";

/// A command line parsed into its verb and argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `VRFY <user>`
    Vrfy(String),
    /// `EXPN <user>`
    Expn(String),
    /// `RCPT TO:<user>`
    RcptTo(String),
    /// Anything else. Never answered.
    Unrecognized,
}

impl Command {
    /// Parse a raw line. Verbs are matched case-sensitively on the exact
    /// prefix; the argument is trimmed of whitespace and line terminators.
    pub fn parse(line: &[u8]) -> Self {
        if let Some(rest) = line.strip_prefix(VRFY_PREFIX) {
            Command::Vrfy(argument(rest))
        } else if let Some(rest) = line.strip_prefix(EXPN_PREFIX) {
            Command::Expn(argument(rest))
        } else if let Some(rest) = line.strip_prefix(RCPT_TO_PREFIX) {
            Command::RcptTo(recipient(&argument(rest)))
        } else {
            Command::Unrecognized
        }
    }
}

fn argument(rest: &[u8]) -> String {
    String::from_utf8_lossy(rest).trim().to_owned()
}

/// Reduce `<user@domain>` to `user`
fn recipient(arg: &str) -> String {
    let arg = arg
        .strip_prefix('<')
        .and_then(|a| a.strip_suffix('>'))
        .unwrap_or(arg);
    match arg.split_once('@') {
        Some((local, _)) => local.to_owned(),
        None => arg.to_owned(),
    }
}

/// Handles SMTP commands and returns appropriate responses
#[derive(Debug)]
pub struct SmtpCommandHandler<'a> {
    config: &'a ServerConfig,
}

impl<'a> SmtpCommandHandler<'a> {
    /// Create a new command handler
    pub fn new(config: &'a ServerConfig) -> Self {
        Self { config }
    }

    /// Process a command line and return the reply, if any
    pub fn process_command(&self, line: &[u8]) -> Option<SmtpResponse> {
        match Command::parse(line) {
            Command::Vrfy(user) => Some(self.handle_vrfy(&user)),
            Command::Expn(user) => Some(self.handle_expn(&user)),
            Command::RcptTo(user) => self.handle_rcpt_to(&user),
            Command::Unrecognized => None,
        }
    }

    /// Process a command line and queue the reply on the session
    pub fn execute(&self, session: &mut SmtpSession, line: &[u8]) {
        info!(
            "[{}]: {}",
            session.id(),
            String::from_utf8_lossy(line).trim()
        );

        if let Some(response) = self.process_command(line) {
            session.queue(&response);
        }
    }

    /// Run every complete line buffered on the session, in arrival order
    ///
    /// Returns the number of lines processed.
    pub fn process_pending(&self, session: &mut SmtpSession) -> usize {
        let mut processed = 0;
        while let Some(line) = session.next_line() {
            self.execute(session, &line);
            processed += 1;
        }
        processed
    }

    /// Handle VRFY command
    fn handle_vrfy(&self, user: &str) -> SmtpResponse {
        if !self.config.vrfy_enabled() {
            return SmtpResponse::vrfy_disallowed();
        }
        self.lookup(user)
    }

    /// Handle EXPN command
    fn handle_expn(&self, user: &str) -> SmtpResponse {
        if !self.config.expn_enabled() {
            return SmtpResponse::unimplemented();
        }
        self.lookup(user)
    }

    /// Handle RCPT TO command. Stays silent while disabled.
    fn handle_rcpt_to(&self, user: &str) -> Option<SmtpResponse> {
        if !self.config.rcpt_to_enabled() {
            return None;
        }
        Some(self.lookup(user))
    }

    fn lookup(&self, user: &str) -> SmtpResponse {
        if self.config.is_user(user) {
            SmtpResponse::user_ok(user, self.config.domain())
        } else {
            SmtpResponse::user_unknown(user)
        }
    }
}
