use std::fmt;
use std::ops::{Deref, DerefMut};

use log::debug;

use crate::domain::email::{MessageId, RawMessage};
use crate::error::Result;

#[derive(Clone)]
pub struct Credentials {
    pub address: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("address", &self.address)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub trait MailTransport {
    type Session: MailSession;

    /// Open and authenticate a session.
    fn connect(&self, credentials: &Credentials) -> Result<Self::Session>;
}

impl<T: MailTransport + ?Sized> MailTransport for &T {
    type Session = T::Session;

    fn connect(&self, credentials: &Credentials) -> Result<Self::Session> {
        (**self).connect(credentials)
    }
}

pub trait MailSession {
    fn select_mailbox(&mut self, name: &str) -> Result<()>;

    /// Identifiers of unread messages, ascending.
    fn search_unread(&mut self) -> Result<Vec<MessageId>>;

    fn fetch(&mut self, id: MessageId) -> Result<RawMessage>;

    /// Release the session. Called exactly once, by [`SessionGuard`].
    fn close(&mut self) -> Result<()>;
}

/// Owns a session and closes it when dropped, whatever path the run took.
pub struct SessionGuard<S: MailSession> {
    session: S,
}

impl<S: MailSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }
}

impl<S: MailSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: MailSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: MailSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        match self.session.close() {
            Ok(()) => debug!("mailbox session closed"),
            Err(e) => debug!("ignoring error while closing mailbox session: {e}"),
        }
    }
}
