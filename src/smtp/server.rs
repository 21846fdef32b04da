//! SMTP server implementation

use crate::smtp::config::ServerConfig;
use crate::smtp::error::SmtpError;
use crate::smtp::multiplexer::Multiplexer;

use mio::Poll;
use std::net::{TcpListener, ToSocketAddrs};

/// Fake SMTP server answering VRFY and EXPN against a fixed user list
#[derive(Debug, Clone, Default)]
pub struct SmtpServer {
    config: ServerConfig,
}

impl SmtpServer {
    /// Create a new SMTP server
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind to `addr` and build the event loop without starting it
    pub fn bind<A: ToSocketAddrs>(&self, addr: A) -> Result<Multiplexer, SmtpError> {
        let listener = TcpListener::bind(addr).map_err(SmtpError::Listener)?;
        self.bind_listener(listener)
    }

    /// Build the event loop around an already bound listener
    pub fn bind_listener(&self, listener: TcpListener) -> Result<Multiplexer, SmtpError> {
        listener
            .set_nonblocking(true)
            .map_err(SmtpError::Listener)?;
        let listener = mio::net::TcpListener::from_std(listener);
        Multiplexer::new(Poll::new()?, listener)
    }

    /// Start the server on the specified address (blocking)
    pub fn start<A: ToSocketAddrs>(&self, addr: A) -> Result<(), SmtpError> {
        self.bind(addr)?.run(self)
    }

    /// Start the server with an existing listener (blocking)
    pub fn start_with_listener(&self, listener: TcpListener) -> Result<(), SmtpError> {
        self.bind_listener(listener)?.run(self)
    }
}
