use async_trait::async_trait;
use lettre::{
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::{
        self,
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
};

use crate::{
    config::{Config, SmtpTls},
    message::OutboundMessage,
    transport::{FailureKind, MessageId, Transport, TransportError},
};

/// SMTP status codes servers use to refuse authentication.
const AUTH_REJECTED_CODES: [u16; 3] = [530, 534, 535];

/// [`Transport`] backed by lettre's pooled async SMTP client.
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    /// Builds the client once for the lifetime of the process.
    ///
    /// Development defaults to the provider's implicit-TLS port with
    /// verified certificates. Production defaults to STARTTLS on an explicit
    /// host and port and tolerates certificates that do not validate, which
    /// some hosting networks require.
    pub fn from_config(config: &Config) -> Result<Self, smtp::Error> {
        let host = config.smtp.host.as_str();
        let timeouts = config.smtp.timeouts(config.mode);

        let tls = match config.smtp.tls(config.mode) {
            SmtpTls::None => Tls::None,
            secured => {
                let params = TlsParameters::builder(host.to_string())
                    .dangerous_accept_invalid_certs(config.mode.is_production())
                    .build()?;
                if secured == SmtpTls::Implicit {
                    Tls::Wrapper(params)
                } else {
                    Tls::Required(params)
                }
            }
        };

        let builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(config.smtp.port(config.mode))
            .tls(tls)
            .timeout(Some(timeouts.socket));

        let builder = match config.sender.credentials() {
            Some((user, pass)) => {
                builder.credentials(Credentials::new(user.to_string(), pass.to_string()))
            }
            None => {
                tracing::warn!("SMTP credentials missing, contact messages will be refused");
                builder
            }
        };

        tracing::info!(
            "SMTP transport configured for {}:{} ({} mode)",
            host,
            config.smtp.port(config.mode),
            config.mode.as_str()
        );

        Ok(Self {
            mailer: builder.build(),
        })
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn verify_connection(&self) -> Result<(), TransportError> {
        match self.mailer.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransportError::new(
                FailureKind::ConnectionFailed,
                "SMTP server did not accept the connection check",
            )),
            Err(e) => Err(to_transport_error(&e)),
        }
    }

    async fn send(&self, message: OutboundMessage) -> Result<MessageId, TransportError> {
        let message_id = message.message_id.clone();
        let email = build_message(message)?;

        let response = self
            .mailer
            .send(email)
            .await
            .map_err(|e| to_transport_error(&e))?;

        tracing::debug!(
            "SMTP server accepted message {} with code {}",
            message_id,
            response.code()
        );

        Ok(MessageId(message_id))
    }
}

fn build_message(message: OutboundMessage) -> Result<Message, TransportError> {
    let invalid = |what: &str, e: &dyn std::error::Error| {
        TransportError::new(FailureKind::Unknown, format!("invalid {what}: {e}"))
    };

    let sender = message
        .from
        .parse::<Address>()
        .map_err(|e| invalid("sender address", &e))?;
    let to = message
        .to
        .parse::<Address>()
        .map_err(|e| invalid("recipient address", &e))?;
    let reply_to = message
        .reply_to
        .parse::<Address>()
        .map_err(|e| invalid("reply-to address", &e))?;

    Message::builder()
        .from(Mailbox::new(Some(message.from_name), sender))
        .reply_to(Mailbox::new(None, reply_to))
        .to(Mailbox::new(None, to))
        .subject(message.subject)
        .message_id(Some(message.message_id))
        .multipart(MultiPart::alternative_plain_html(message.text, message.html))
        .map_err(|e| invalid("message", &e))
}

fn to_transport_error(e: &smtp::Error) -> TransportError {
    TransportError::new(classify(e), e.to_string())
}

fn classify(e: &smtp::Error) -> FailureKind {
    if e.is_timeout() {
        return FailureKind::TimedOut;
    }

    if let Some(code) = e.status().and_then(|code| code.to_string().parse::<u16>().ok()) {
        return classify_status(code);
    }

    // a reply that never completed means the server went away mid-session
    if e.is_tls() || e.is_response() || has_io_source(e) {
        FailureKind::ConnectionFailed
    } else {
        FailureKind::Unknown
    }
}

fn classify_status(code: u16) -> FailureKind {
    if AUTH_REJECTED_CODES.contains(&code) {
        FailureKind::Unauthenticated
    } else if code == 421 {
        // service not available, closing channel
        FailureKind::ConnectionFailed
    } else {
        FailureKind::Unknown
    }
}

fn has_io_source(e: &smtp::Error) -> bool {
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if err.is::<std::io::Error>() {
            return true;
        }
        source = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Local;
    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::{TcpListener, TcpStream},
    };

    use std::{sync::Arc, time::Duration};

    use crate::{
        config::{Mode, SenderConfig, SmtpConfig, Timeouts},
        message::compose,
        models::Submission,
        service::Relay,
    };

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Session {
        RejectAuth,
        HangUpAfterEhlo,
        Silent,
    }

    /// Minimal SMTP server on a random local port following `session`.
    async fn local_server(session: Session) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, session));
            }
        });
        port
    }

    async fn serve(stream: TcpStream, session: Session) {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        if session == Session::Silent {
            // hold the connection open without ever greeting
            while let Ok(Some(_)) = lines.next_line().await {}
            return;
        }

        if write.write_all(b"220 localhost ESMTP\r\n").await.is_err() {
            return;
        }
        while let Ok(Some(line)) = lines.next_line().await {
            let command = line.to_ascii_uppercase();
            let reply: &[u8] = if command.starts_with("EHLO") {
                if session == Session::HangUpAfterEhlo {
                    return;
                }
                b"250-localhost\r\n250 AUTH PLAIN LOGIN\r\n"
            } else if command.starts_with("AUTH") {
                b"535 5.7.8 Username and Password not accepted\r\n"
            } else if command.starts_with("QUIT") {
                let _ = write.write_all(b"221 Bye\r\n").await;
                return;
            } else {
                b"250 OK\r\n"
            };
            if write.write_all(reply).await.is_err() {
                return;
            }
        }
    }

    fn local_config(port: u16) -> Config {
        Config {
            sender: SenderConfig::new("owner@example.com", "app-password"),
            smtp: SmtpConfig {
                host: "127.0.0.1".to_string(),
                port: Some(port),
                tls: Some(SmtpTls::None),
                timeouts: Some(Timeouts {
                    connection: Duration::from_millis(500),
                    greeting: Duration::from_millis(500),
                    socket: Duration::from_millis(500),
                }),
                verify_connection: true,
            },
            ..Config::default()
        }
    }

    fn outbound() -> OutboundMessage {
        OutboundMessage {
            from_name: "Ana".to_string(),
            from: "owner@example.com".to_string(),
            reply_to: "ana@example.com".to_string(),
            to: "owner@example.com".to_string(),
            subject: "📧 Nuevo mensaje de contacto de Ana".to_string(),
            html: "<p>Hola<br>Mundo</p>".to_string(),
            text: "Hola\nMundo".to_string(),
            message_id: "<abc@example.com>".to_string(),
        }
    }

    #[test]
    fn auth_codes_are_unauthenticated() {
        for code in AUTH_REJECTED_CODES {
            assert_eq!(classify_status(code), FailureKind::Unauthenticated);
        }
    }

    #[test]
    fn other_codes_are_classified() {
        assert_eq!(classify_status(421), FailureKind::ConnectionFailed);
        assert_eq!(classify_status(550), FailureKind::Unknown);
        assert_eq!(classify_status(451), FailureKind::Unknown);
    }

    #[test]
    fn builds_headers_from_outbound_message() {
        let email = build_message(outbound()).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();

        assert!(raw.contains("From: Ana <owner@example.com>"));
        assert!(raw.contains("Reply-To: ana@example.com"));
        assert!(raw.contains("To: owner@example.com"));
        assert!(raw.contains("Message-ID: <abc@example.com>"));
        assert!(raw.contains("multipart/alternative"));
    }

    #[test]
    fn unparsable_reply_to_is_reported() {
        let mut message = outbound();
        message.reply_to = "not an address".to_string();

        let err = build_message(message).unwrap_err();
        assert_eq!(err.kind, FailureKind::Unknown);
        assert!(err.detail.starts_with("invalid reply-to address"));
    }

    #[test]
    fn multi_line_name_renders_single_line_from_header() {
        let submission = Submission {
            name: "Ana\r\nMaria".to_string(),
            email: "ana@example.com".to_string(),
            phone: None,
            message: "Hola".to_string(),
        }
        .validate()
        .unwrap();
        let outbound = compose(&submission, "owner@example.com", "Tours", Local::now());

        let email = build_message(outbound).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("From: Ana Maria <owner@example.com>"));
    }

    #[tokio::test]
    async fn rejected_credentials_are_unauthenticated() {
        let port = local_server(Session::RejectAuth).await;
        let transport = SmtpTransport::from_config(&local_config(port)).unwrap();

        let err = transport.verify_connection().await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Unauthenticated, "{err}");
    }

    #[tokio::test]
    async fn refused_connection_is_connection_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let transport = SmtpTransport::from_config(&local_config(port)).unwrap();

        let err = transport.verify_connection().await.unwrap_err();
        assert_eq!(err.kind, FailureKind::ConnectionFailed, "{err}");
    }

    #[tokio::test]
    async fn server_hanging_up_mid_session_is_connection_failed() {
        let port = local_server(Session::HangUpAfterEhlo).await;
        let transport = SmtpTransport::from_config(&local_config(port)).unwrap();

        let err = transport.verify_connection().await.unwrap_err();
        assert_eq!(err.kind, FailureKind::ConnectionFailed, "{err}");
    }

    #[tokio::test]
    async fn silent_server_times_out_within_verify_bound() {
        let port = local_server(Session::Silent).await;
        let config = local_config(port);
        let bound = config.smtp.timeouts(config.mode).verify_bound();
        let transport = SmtpTransport::from_config(&config).unwrap();
        let relay = Relay::new(&config, Arc::new(transport));

        let started = std::time::Instant::now();
        let outcome = relay
            .relay(Submission {
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
                phone: None,
                message: "Hola".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(outcome.failure_kind(), Some(FailureKind::TimedOut));
        assert!(started.elapsed() < bound + Duration::from_secs(2));
    }

    #[tokio::test]
    async fn production_transport_builds_without_network() {
        let config = Config {
            mode: Mode::Production,
            sender: crate::config::SenderConfig::new("owner@example.com", "pw"),
            ..Config::default()
        };

        assert!(SmtpTransport::from_config(&config).is_ok());
    }
}
