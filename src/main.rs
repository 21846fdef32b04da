use fakesmtp::{ServerConfig, SmtpError, SmtpServer};
use log::{error, info};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::env;
use std::process;

fn parse_args(args: &[String]) -> Result<(String, u16), SmtpError> {
    match args {
        [_, host, port] => {
            let port = port
                .parse()
                .map_err(|_| SmtpError::InvalidArguments(format!("invalid port '{port}'")))?;
            Ok((host.clone(), port))
        }
        _ => Err(SmtpError::InvalidArguments(
            "expected <host> <port>".to_owned(),
        )),
    }
}

fn run(host: &str, port: u16) -> Result<(), SmtpError> {
    let server = SmtpServer::new(ServerConfig::default());
    let mut multiplexer = server.bind((host, port))?;

    let shutdown = multiplexer.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("Caught keyboard interrupt, exiting");
        if let Err(e) = shutdown.shutdown() {
            error!("Cannot stop server: {e}");
        }
    })?;

    multiplexer.run(&server)
}

fn main() {
    if let Err(e) = TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("Cannot initialize logger: {e}");
    }

    let args: Vec<String> = env::args().collect();
    let (host, port) = match parse_args(&args) {
        Ok(pair) => pair,
        Err(e) => {
            let program = args.first().map(String::as_str).unwrap_or("fakesmtp");
            eprintln!("{e}");
            eprintln!("Usage: {program} <host> <port>");
            process::exit(1);
        }
    };

    if let Err(e) = run(&host, port) {
        error!("Failed to run server: {e}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let (host, port) = parse_args(&args(&["fakesmtp", "127.0.0.1", "2525"])).unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 2525);
    }

    #[test]
    fn test_parse_args_rejects_bad_input() {
        assert!(parse_args(&args(&["fakesmtp"])).is_err());
        assert!(parse_args(&args(&["fakesmtp", "127.0.0.1"])).is_err());
        assert!(parse_args(&args(&["fakesmtp", "127.0.0.1", "smtp"])).is_err());
        assert!(parse_args(&args(&["fakesmtp", "127.0.0.1", "70000"])).is_err());
        assert!(parse_args(&args(&["fakesmtp", "a", "1", "extra"])).is_err());
    }
}
