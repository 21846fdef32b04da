//! # fakesmtp
//!
//! fakesmtp is a fake SMTP responder for testing clients.
//!
//! It greets every connection with a banner and answers the diagnostic
//! `VRFY` and `EXPN` commands against a fixed list of local users, which is
//! enough to exercise user-enumeration tools without a real mail server.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fakesmtp::{ServerConfig, SmtpServer};
//! use std::thread;
//!
//! let server = SmtpServer::new(ServerConfig::default());
//! let mut multiplexer = server.bind("127.0.0.1:2525").unwrap();
//! let shutdown = multiplexer.shutdown_handle();
//!
//! let worker = thread::spawn(move || multiplexer.run(&server));
//!
//! // Client connects to localhost:2525 and sends `VRFY root`
//! // ...
//!
//! shutdown.shutdown().unwrap();
//! worker.join().unwrap().unwrap();
//! ```
//!
//! ## Supported SMTP commands
//!
//! - `VRFY <user>` - Verify a user (`250` or `550`, `502` when disabled)
//! - `EXPN <user>` - Expand a mailing list, answered like `VRFY`
//! - `RCPT TO:<user>` - Answered like `VRFY`, only when enabled
//!
//! Every other line is ignored without a reply.
//!
//! ## Notes
//!
//! - Verbs are case-sensitive and must be followed by a single space.
//! - One thread serves every connection through readiness polling.
//! - No mail is delivered, stored or relayed.
//! - SMTP authentication is not supported.
//! - SSL/TLS connection is not supported.

mod smtp;

pub use smtp::{
    Command, Multiplexer, ServerConfig, SessionRegistry, ShutdownHandle, SmtpCommandHandler,
    SmtpError, SmtpLimits, SmtpResponse, SmtpServer, SmtpSession,
};
