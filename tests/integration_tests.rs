//! Integration tests for the banner, VRFY/EXPN replies and connection handling

use chrono::DateTime;
use fakesmtp::{ServerConfig, ShutdownHandle, SmtpLimits, SmtpServer};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const BANNER_PREFIX: &str = "220 mail.example.tld ESMTP FakeSmtpServer 1.0.0/1.0.0; ";

struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    worker: JoinHandle<Result<(), fakesmtp::SmtpError>>,
}

impl TestServer {
    fn stop(self) {
        self.shutdown.shutdown().unwrap();
        let result = self.worker.join().unwrap();
        assert!(result.is_ok(), "server loop failed: {result:?}");
    }
}

fn start_test_server(config: ServerConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let server = SmtpServer::new(config);
    let mut multiplexer = server.bind_listener(listener).unwrap();
    let addr = multiplexer.local_addr().unwrap();
    let shutdown = multiplexer.shutdown_handle();

    // Start server in background thread
    let worker = thread::spawn(move || multiplexer.run(&server));

    TestServer {
        addr,
        shutdown,
        worker,
    }
}

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Self { stream, reader }
    }

    /// Connect and consume the banner
    fn connect_greeted(addr: SocketAddr) -> Self {
        let mut client = Self::connect(addr);
        let greeting = client.read_line();
        assert!(greeting.starts_with(BANNER_PREFIX), "{greeting:?}");
        client
    }

    fn send(&mut self, data: &str) {
        self.stream.write_all(data.as_bytes()).unwrap();
        self.stream.flush().unwrap();
    }

    fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        line
    }

    fn command(&mut self, command: &str) -> String {
        self.send(&format!("{command}\n"));
        self.read_line()
    }

    /// Assert nothing arrives within a short window
    fn assert_silent(&mut self) {
        self.stream
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let mut buf = [0u8; 64];
        match self.reader.read(&mut buf) {
            Ok(n) => panic!("unexpected {n} byte(s): {:?}", &buf[..n]),
            Err(e) => assert!(
                matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut),
                "{e}"
            ),
        }
        self.stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
    }
}

#[test]
fn test_banner_is_first_line() {
    let server = start_test_server(ServerConfig::default());
    let mut client = Client::connect(server.addr);

    let greeting = client.read_line();
    assert!(greeting.starts_with(BANNER_PREFIX), "{greeting:?}");
    assert!(greeting.ends_with('\n'));
    assert!(!greeting.ends_with("\r\n"));

    let date = greeting[BANNER_PREFIX.len()..].trim_end();
    assert!(DateTime::parse_from_rfc2822(date).is_ok(), "{date:?}");

    server.stop();
}

#[test]
fn test_vrfy_known_user() {
    let server = start_test_server(ServerConfig::default());
    let mut client = Client::connect_greeted(server.addr);

    assert_eq!(
        client.command("VRFY root"),
        "250 2.1.5 root <root@mail.example.tld>\n"
    );
    assert_eq!(
        client.command("VRFY james"),
        "250 2.1.5 james <james@mail.example.tld>\n"
    );

    server.stop();
}

#[test]
fn test_vrfy_unknown_user() {
    let server = start_test_server(ServerConfig::default());
    let mut client = Client::connect_greeted(server.addr);

    assert_eq!(
        client.command("VRFY nobody"),
        "550 5.1.1 nobody... User unknown\n"
    );

    server.stop();
}

#[test]
fn test_expn_mirrors_vrfy() {
    let server = start_test_server(ServerConfig::default());
    let mut client = Client::connect_greeted(server.addr);

    for user in ["root", "james", "nobody"] {
        let vrfy = client.command(&format!("VRFY {user}"));
        let expn = client.command(&format!("EXPN {user}"));
        assert_eq!(vrfy, expn);
    }

    server.stop();
}

#[test]
fn test_disabled_verbs() {
    let config = ServerConfig::default().allow_vrfy(false).allow_expn(false);
    let server = start_test_server(config);
    let mut client = Client::connect_greeted(server.addr);

    for user in ["root", "nobody"] {
        assert_eq!(
            client.command(&format!("VRFY {user}")),
            "502 VRFY disallowed.\n"
        );
        assert_eq!(
            client.command(&format!("EXPN {user}")),
            "502 Unimplemented command.\n"
        );
    }

    server.stop();
}

#[test]
fn test_rcpt_to_when_enabled() {
    let server = start_test_server(ServerConfig::default().allow_rcpt_to(true));
    let mut client = Client::connect_greeted(server.addr);

    assert_eq!(
        client.command("RCPT TO:<root@mail.example.tld>"),
        "250 2.1.5 root <root@mail.example.tld>\n"
    );

    server.stop();
}

#[test]
fn test_unrecognized_commands_get_no_reply() {
    // Unknown verbs are dropped silently instead of answered with 500
    let server = start_test_server(ServerConfig::default());
    let mut client = Client::connect_greeted(server.addr);

    client.send("HELO client.local\nvrfy root\nRCPT TO:<root>\nQUIT\n");
    client.assert_silent();

    // The connection is still usable and the next reply is ours
    assert_eq!(
        client.command("VRFY root"),
        "250 2.1.5 root <root@mail.example.tld>\n"
    );

    server.stop();
}

#[test]
fn test_crlf_terminated_commands() {
    let server = start_test_server(ServerConfig::default());
    let mut client = Client::connect_greeted(server.addr);

    client.send("VRFY root  \r\n");
    assert_eq!(
        client.read_line(),
        "250 2.1.5 root <root@mail.example.tld>\n"
    );

    server.stop();
}

#[test]
fn test_multiple_commands_in_one_write() {
    let server = start_test_server(ServerConfig::default());
    let mut client = Client::connect_greeted(server.addr);

    client.send("VRFY root\nEXPN nobody\nVRFY james\n");
    assert_eq!(
        client.read_line(),
        "250 2.1.5 root <root@mail.example.tld>\n"
    );
    assert_eq!(client.read_line(), "550 5.1.1 nobody... User unknown\n");
    assert_eq!(
        client.read_line(),
        "250 2.1.5 james <james@mail.example.tld>\n"
    );

    server.stop();
}

#[test]
fn test_command_split_across_writes() {
    let server = start_test_server(ServerConfig::default());
    let mut client = Client::connect_greeted(server.addr);

    client.send("VRFY ro");
    client.assert_silent();

    client.send("ot\n");
    assert_eq!(
        client.read_line(),
        "250 2.1.5 root <root@mail.example.tld>\n"
    );

    server.stop();
}

#[test]
fn test_concurrent_connections_do_not_cross_talk() {
    let server = start_test_server(ServerConfig::default());
    let mut first = Client::connect_greeted(server.addr);
    let mut second = Client::connect_greeted(server.addr);

    first.send("VRFY ro");
    second.send("VRFY nob");
    first.send("ot\n");
    second.send("ody\n");

    assert_eq!(
        first.read_line(),
        "250 2.1.5 root <root@mail.example.tld>\n"
    );
    assert_eq!(second.read_line(), "550 5.1.1 nobody... User unknown\n");

    for _ in 0..5 {
        assert_eq!(
            second.command("EXPN james"),
            "250 2.1.5 james <james@mail.example.tld>\n"
        );
        assert_eq!(
            first.command("EXPN nobody"),
            "550 5.1.1 nobody... User unknown\n"
        );
    }

    first.assert_silent();
    second.assert_silent();

    server.stop();
}

#[test]
fn test_close_mid_command() {
    let server = start_test_server(ServerConfig::default());

    {
        let mut client = Client::connect_greeted(server.addr);
        client.send("VRFY roo");
        client.stream.shutdown(Shutdown::Both).unwrap();
    }

    // The server keeps serving other clients
    let mut client = Client::connect_greeted(server.addr);
    assert_eq!(
        client.command("VRFY root"),
        "250 2.1.5 root <root@mail.example.tld>\n"
    );

    server.stop();
}

#[test]
fn test_half_close_mid_command_gets_only_banner() {
    let server = start_test_server(ServerConfig::default());
    let mut client = Client::connect(server.addr);

    client.send("VRFY roo");
    client.stream.shutdown(Shutdown::Write).unwrap();

    let mut received = String::new();
    client.reader.read_to_string(&mut received).unwrap();
    assert!(received.starts_with(BANNER_PREFIX), "{received:?}");
    assert_eq!(received.lines().count(), 1, "{received:?}");
    assert!(received.ends_with('\n'));

    server.stop();
}

#[test]
fn test_half_close_after_command_gets_reply() {
    let server = start_test_server(ServerConfig::default());

    for _ in 0..20 {
        let mut client = Client::connect(server.addr);
        client.send("VRFY root\n");
        client.stream.shutdown(Shutdown::Write).unwrap();

        let mut received = String::new();
        client.reader.read_to_string(&mut received).unwrap();

        let lines: Vec<&str> = received.lines().collect();
        assert_eq!(lines.len(), 2, "{received:?}");
        assert!(lines[0].starts_with(BANNER_PREFIX.trim_end()), "{received:?}");
        assert_eq!(lines[1], "250 2.1.5 root <root@mail.example.tld>");
    }

    server.stop();
}

#[test]
fn test_many_sequential_connections() {
    let server = start_test_server(ServerConfig::default());

    for _ in 0..20 {
        let mut client = Client::connect_greeted(server.addr);
        assert_eq!(
            client.command("VRFY james"),
            "250 2.1.5 james <james@mail.example.tld>\n"
        );
    }

    server.stop();
}

#[test]
fn test_overlong_line_disconnects_only_that_client() {
    let server = start_test_server(ServerConfig::default());
    let mut bystander = Client::connect_greeted(server.addr);
    let mut flooder = Client::connect_greeted(server.addr);

    let flood = "a".repeat(SmtpLimits::INBOUND_BUFFER_MAX + 1);
    // The server may close while we are still writing
    let _ = flooder.stream.write_all(flood.as_bytes());

    let mut rest = String::new();
    let received = flooder.reader.read_to_string(&mut rest).unwrap_or(0);
    assert_eq!(received, 0, "no reply expected, got {rest:?}");

    assert_eq!(
        bystander.command("VRFY root"),
        "250 2.1.5 root <root@mail.example.tld>\n"
    );

    server.stop();
}

#[test]
fn test_shutdown_closes_connections() {
    let server = start_test_server(ServerConfig::default());
    let mut client = Client::connect_greeted(server.addr);

    server.stop();

    let mut rest = String::new();
    let received = client.reader.read_to_string(&mut rest).unwrap_or(0);
    assert_eq!(received, 0);
}
