//! SMTP server implementation

pub mod commands;
pub mod config;
pub mod error;
pub mod multiplexer;
pub mod response;
pub mod server;
pub mod session;

pub use commands::{Command, SmtpCommandHandler};
pub use config::ServerConfig;
pub use error::{SmtpError, SmtpLimits};
pub use multiplexer::{Multiplexer, ShutdownHandle};
pub use response::SmtpResponse;
pub use server::SmtpServer;
pub use session::{SessionRegistry, SmtpSession};
