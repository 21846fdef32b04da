//! SMTP session state management

use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::response::SmtpResponse;

use log::warn;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Build the registry key for a peer address (`"<ip>:<port>"`)
pub fn session_id(addr: &SocketAddr) -> String {
    format!("{}:{}", addr.ip(), addr.port())
}

/// Per-connection state tracked between accept and close
#[derive(Debug)]
pub struct SmtpSession {
    id: String,
    /// Bytes received but not yet consumed as complete lines
    inbound: Vec<u8>,
    /// Bytes waiting to be written to the peer
    outbound: Vec<u8>,
    greeting_sent: bool,
}

impl SmtpSession {
    /// Create a new SMTP session
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            inbound: Vec::new(),
            outbound: Vec::new(),
            greeting_sent: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue the banner. Only the first call has an effect.
    pub fn queue_greeting(&mut self, greeting: &SmtpResponse) {
        if self.greeting_sent {
            return;
        }
        self.queue(greeting);
        self.greeting_sent = true;
    }

    #[cfg(test)]
    pub fn greeting_sent(&self) -> bool {
        self.greeting_sent
    }

    /// Append a formatted reply to the outbound buffer
    pub fn queue(&mut self, response: &SmtpResponse) {
        self.outbound.extend_from_slice(response.format().as_bytes());
    }

    /// Append received bytes to the inbound buffer
    ///
    /// Fails once the unterminated tail grows past
    /// [`SmtpLimits::INBOUND_BUFFER_MAX`].
    pub fn push_inbound(&mut self, data: &[u8]) -> Result<(), SmtpError> {
        self.inbound.extend_from_slice(data);
        let tail = match self.inbound.iter().rposition(|&b| b == b'\n') {
            Some(pos) => self.inbound.len() - pos - 1,
            None => self.inbound.len(),
        };
        if tail > SmtpLimits::INBOUND_BUFFER_MAX {
            return Err(SmtpError::LineTooLong {
                max: SmtpLimits::INBOUND_BUFFER_MAX,
            });
        }
        Ok(())
    }

    /// Take the next newline-terminated line, terminator included
    ///
    /// A trailing partial line stays buffered until its newline arrives.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let end = self.inbound.iter().position(|&b| b == b'\n')?;
        Some(self.inbound.drain(..=end).collect())
    }

    /// Bytes received but not yet terminated by a newline
    pub fn pending_input(&self) -> &[u8] {
        &self.inbound
    }

    pub fn pending_output(&self) -> &[u8] {
        &self.outbound
    }

    /// Drop the first `n` bytes of the outbound buffer after they were sent
    pub fn consume_output(&mut self, n: usize) {
        let n = n.min(self.outbound.len());
        self.outbound.drain(..n);
    }

    pub fn has_pending_output(&self) -> bool {
        !self.outbound.is_empty()
    }
}

/// In-memory mapping from connection identity to session state
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, SmtpSession>,
}

impl SessionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a session for `id`
    ///
    /// An existing entry is never overwritten.
    pub fn open(&mut self, id: &str) -> Result<&mut SmtpSession, SmtpError> {
        if self.sessions.contains_key(id) {
            return Err(SmtpError::DuplicateSession(id.to_owned()));
        }
        Ok(self
            .sessions
            .entry(id.to_owned())
            .or_insert_with(|| SmtpSession::new(id)))
    }

    /// Remove the session for `id`, returning it if it existed
    pub fn close(&mut self, id: &str) -> Option<SmtpSession> {
        let session = self.sessions.remove(id);
        if session.is_none() {
            warn!("Close requested for unknown session {id}");
        }
        session
    }

    /// Get the session for `id`
    pub fn lookup(&mut self, id: &str) -> Result<&mut SmtpSession, SmtpError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| SmtpError::UnknownSession(id.to_owned()))
    }

    #[cfg(test)]
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
