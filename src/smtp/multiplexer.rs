//! Single-threaded readiness loop driving every connection

use crate::smtp::commands::SmtpCommandHandler;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::response::SmtpResponse;
use crate::smtp::server::SmtpServer;
use crate::smtp::session::{SessionRegistry, SmtpSession, session_id};

use chrono::Utc;
use log::{debug, error, info, warn};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use std::collections::HashMap;
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CLIENT: usize = 2;

const EVENTS_CAPACITY: usize = 128;

/// Wakes a running [`Multiplexer`] and asks it to stop
///
/// The loop finishes the cycle it is in, closes every socket and returns.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) -> Result<(), SmtpError> {
        self.waker.wake()?;
        Ok(())
    }
}

/// A registered client socket and the registry key of its session
#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    id: String,
}

/// Owns the poller, the listening socket and every client socket
#[derive(Debug)]
pub struct Multiplexer {
    poll: Poll,
    listener: TcpListener,
    waker: Arc<Waker>,
    connections: HashMap<Token, Connection>,
    registry: SessionRegistry,
    next_token: usize,
}

impl Multiplexer {
    /// Register `listener` with `poll` and build the loop around them
    pub fn new(poll: Poll, mut listener: TcpListener) -> Result<Self, SmtpError> {
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        Ok(Self {
            poll,
            listener,
            waker,
            connections: HashMap::new(),
            registry: SessionRegistry::new(),
            next_token: FIRST_CLIENT,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SmtpError> {
        self.listener.local_addr().map_err(SmtpError::Listener)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            waker: Arc::clone(&self.waker),
        }
    }

    /// Number of open client connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Run the event loop until shut down or a fatal error occurs
    pub fn run(&mut self, server: &SmtpServer) -> Result<(), SmtpError> {
        let handler = SmtpCommandHandler::new(server.config());
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        info!("SMTP server listening on {}", self.local_addr()?);

        let result = loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                break Err(SmtpError::Io(e));
            }

            match self.run_cycle(&events, server, &handler) {
                Ok(true) => break Ok(()),
                Ok(false) => {}
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = &result {
            error!("Server loop stopped: {e}");
        }
        self.close_all();
        result
    }

    /// Service one batch of readiness events. Returns `true` when a shutdown
    /// was requested.
    fn run_cycle(
        &mut self,
        events: &Events,
        server: &SmtpServer,
        handler: &SmtpCommandHandler,
    ) -> Result<bool, SmtpError> {
        let mut shutdown = false;

        for event in events.iter() {
            match event.token() {
                LISTENER => self.accept_connections(server)?,
                WAKER => shutdown = true,
                token => {
                    self.service_connection(token, event.is_readable(), event.is_writable(), handler)?
                }
            }
        }

        if shutdown {
            info!("Shutdown requested, closing {} session(s)", self.registry.len());
        }
        Ok(shutdown)
    }

    /// Accept every pending connection on the listener
    fn accept_connections(&mut self, server: &SmtpServer) -> Result<(), SmtpError> {
        loop {
            let (mut stream, addr) = match self.listener.accept() {
                Ok(pair) => pair,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::ConnectionAborted => {
                    warn!("Connection aborted before accept: {e}");
                    continue;
                }
                Err(e) => return Err(SmtpError::Listener(e)),
            };

            let token = Token(self.next_token);
            self.next_token += 1;

            if let Err(e) = self.poll.registry().register(
                &mut stream,
                token,
                Interest::READABLE | Interest::WRITABLE,
            ) {
                warn!("Cannot register connection from {addr}: {e}");
                continue;
            }

            let id = session_id(&addr);
            let greeting = SmtpResponse::greeting(server.config().domain(), &Utc::now());
            self.registry.open(&id)?.queue_greeting(&greeting);

            info!("Accepted connection from {id}");
            self.connections.insert(token, Connection { stream, id });
        }
    }

    /// Handle readiness on a client socket: read first, then write
    fn service_connection(
        &mut self,
        token: Token,
        readable: bool,
        writable: bool,
        handler: &SmtpCommandHandler,
    ) -> Result<(), SmtpError> {
        // Events for a connection closed earlier in this cycle
        let Some(connection) = self.connections.get_mut(&token) else {
            return Ok(());
        };
        let session = self.registry.lookup(&connection.id)?;

        let mut open = true;
        if readable {
            let outcome = match receive(&mut connection.stream, session) {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Dropping {}: {e}", connection.id);
                    ReadOutcome::Failed
                }
            };

            match outcome {
                ReadOutcome::Open => {
                    handler.process_pending(session);
                }
                // The peer may only have closed its write side; answer what
                // it sent before the FIN and send everything still queued.
                ReadOutcome::PeerClosed => {
                    handler.process_pending(session);
                    let tail = session.pending_input().len();
                    if tail > 0 {
                        debug!("Discarding {tail} unterminated byte(s) from {}", connection.id);
                    }
                    if let Err(e) = flush(&mut connection.stream, session) {
                        warn!("Final write to {} failed: {e}", connection.id);
                    }
                    open = false;
                }
                ReadOutcome::Failed => open = false,
            }
        }

        if open && (writable || session.has_pending_output()) {
            if let Err(e) = flush(&mut connection.stream, session) {
                warn!("Write to {} failed: {e}", connection.id);
                open = false;
            }
        }

        if !open {
            self.close_connection(token);
        }
        Ok(())
    }

    fn close_connection(&mut self, token: Token) {
        let Some(mut connection) = self.connections.remove(&token) else {
            return;
        };
        info!("Closing connection to {}", connection.id);
        if let Err(e) = self.poll.registry().deregister(&mut connection.stream) {
            warn!("Cannot deregister {}: {e}", connection.id);
        }
        self.registry.close(&connection.id);
    }

    fn close_all(&mut self) {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.close_connection(token);
        }
        if !self.registry.is_empty() {
            warn!("{} session(s) left after closing all connections", self.registry.len());
        }
        if let Err(e) = self.poll.registry().deregister(&mut self.listener) {
            warn!("Cannot deregister listener: {e}");
        }
    }
}

/// What draining a client socket ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadOutcome {
    /// Nothing more to read for now
    Open,
    /// Zero-byte read: the peer closed its write side
    PeerClosed,
    /// Transport error: the connection is unusable
    Failed,
}

/// Drain the socket into the session's inbound buffer
///
/// Bytes read before the peer's FIN stay buffered. An over-long
/// unterminated line is reported as `SmtpError::LineTooLong`.
fn receive(stream: &mut TcpStream, session: &mut SmtpSession) -> Result<ReadOutcome, SmtpError> {
    let mut buf = [0u8; SmtpLimits::READ_CHUNK_SIZE];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return Ok(ReadOutcome::PeerClosed),
            Ok(n) => session.push_inbound(&buf[..n])?,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(ReadOutcome::Open),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Read from {} failed: {e}", session.id());
                return Ok(ReadOutcome::Failed);
            }
        }
    }
}

/// Write as much of the outbound buffer as the socket accepts
///
/// Whatever is left stays queued for the next writable event.
fn flush(stream: &mut TcpStream, session: &mut SmtpSession) -> io::Result<()> {
    while session.has_pending_output() {
        match stream.write(session.pending_output()) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(n) => {
                debug!("Sent {n} byte(s) to {}", session.id());
                session.consume_output(n);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
