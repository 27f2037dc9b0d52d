use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info};
use native_tls::{TlsConnector, TlsStream};

use crate::domain::email::{MessageId, RawMessage};
use crate::error::{Error, Result};
use crate::mail::transport::{Credentials, MailSession, MailTransport};

/// IMAP over implicit TLS with username/password login.
pub struct ImapClient {
    pub server: String,
    pub port: u16,
    pub timeout: Duration,
    /// Fetch with `RFC822` (sets `\Seen`) instead of `BODY.PEEK[]`.
    pub mark_as_read: bool,
}

impl ImapClient {
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            server: server.into(),
            port,
            timeout: Duration::from_secs(30),
            mark_as_read: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn mark_as_read(mut self, mark: bool) -> Self {
        self.mark_as_read = mark;
        self
    }

    /// TCP connect and TLS handshake, with the timeout applied to every read
    /// and write on the socket.
    fn open_stream(&self) -> Result<TlsStream<TcpStream>> {
        let target = format!("{}:{}", self.server, self.port);
        let addr = (self.server.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| Error::Connection(format!("cannot resolve {target}: {e}")))?
            .next()
            .ok_or_else(|| Error::Connection(format!("no address for {target}")))?;

        let tcp = TcpStream::connect_timeout(&addr, self.timeout)
            .map_err(|e| Error::Connection(format!("cannot reach {target}: {e}")))?;
        tcp.set_read_timeout(Some(self.timeout))
            .and_then(|()| tcp.set_write_timeout(Some(self.timeout)))
            .map_err(|e| Error::Connection(format!("cannot set socket timeout: {e}")))?;

        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| Error::Connection(format!("TLS setup failed: {e}")))?;
        tls.connect(&self.server, tcp)
            .map_err(|e| Error::Connection(format!("TLS handshake with {target} failed: {e}")))
    }
}

impl MailTransport for ImapClient {
    type Session = ImapSession;

    fn connect(&self, credentials: &Credentials) -> Result<ImapSession> {
        info!("connecting to {}:{}", self.server, self.port);
        let stream = self.open_stream()?;

        let mut client = imap::Client::new(stream);
        client.read_greeting()?;

        let session = client
            .login(&credentials.address, &credentials.password)
            .map_err(|(e, _client)| {
                Error::Connection(format!("login failed for {}: {e}", credentials.address))
            })?;

        Ok(ImapSession {
            session,
            fetch_query: if self.mark_as_read {
                "RFC822"
            } else {
                "BODY.PEEK[]"
            },
        })
    }
}

pub struct ImapSession {
    session: imap::Session<TlsStream<TcpStream>>,
    fetch_query: &'static str,
}

impl MailSession for ImapSession {
    fn select_mailbox(&mut self, name: &str) -> Result<()> {
        let mailbox = self.session.select(name)?;
        debug!("{name} has {} messages", mailbox.exists);
        Ok(())
    }

    fn search_unread(&mut self) -> Result<Vec<MessageId>> {
        let mut ids: Vec<MessageId> = self.session.search("UNSEEN")?.into_iter().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn fetch(&mut self, id: MessageId) -> Result<RawMessage> {
        let fetch_err = |reason: String| Error::Fetch { id, reason };

        let fetches = self
            .session
            .fetch(id.to_string(), self.fetch_query)
            .map_err(|e| fetch_err(e.to_string()))?;
        let body = fetches
            .iter()
            .next()
            .and_then(|f| f.body())
            .ok_or_else(|| fetch_err("server returned no body".to_string()))?;

        Ok(RawMessage {
            id,
            bytes: body.to_vec(),
        })
    }

    fn close(&mut self) -> Result<()> {
        // CLOSE fails when nothing is selected; LOGOUT must still go out.
        let closed = self.session.close();
        self.session.logout()?;
        closed?;
        Ok(())
    }
}
