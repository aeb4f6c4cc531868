//! Ordered UID search and RFC822 fetch over a remote mailbox, with
//! transient-error retry (component C9).

use async_imap::Session as ImapLibSession;
use async_native_tls::TlsStream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::retry::BackoffPolicy;
use crate::secret::{SecretBytes, SecretError, SecretResolver};

#[derive(Error, Debug)]
pub enum ImapError {
    #[error("transient imap error: {0}")]
    Transient(String),

    #[error("imap authentication failed: {0}")]
    Auth(String),

    #[error("imap protocol error: {0}")]
    Protocol(String),

    #[error("mailbox or message not found: {0}")]
    NotFound(String),
}

impl From<SecretError> for ImapError {
    fn from(err: SecretError) -> Self {
        ImapError::Auth(err.to_string())
    }
}

/// Resolved once at session start via the Secret Resolver (C3).
pub enum Credentials {
    AppPassword { username: String, password: SecretBytes },
    OAuth2Bearer { username: String, token: SecretBytes },
}

impl Credentials {
    pub async fn resolve(
        resolver: &dyn SecretResolver,
        username: &str,
        secret_uri: &str,
        oauth2: bool,
    ) -> Result<Credentials, ImapError> {
        let secret = resolver.resolve(secret_uri).await?;
        Ok(if oauth2 {
            Credentials::OAuth2Bearer { username: username.to_string(), token: secret }
        } else {
            Credentials::AppPassword { username: username.to_string(), password: secret }
        })
    }
}

/// The minimal remote-mailbox contract (§4.8). Implemented by
/// `AsyncImapSession`, a real `async-imap`-backed session; tests use an
/// in-memory fake.
#[async_trait]
pub trait ImapSession: Send {
    /// Descending-sorted UIDs matching the optional date bounds.
    async fn search(
        &mut self,
        folder: &str,
        since: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<u32>, ImapError>;

    async fn fetch_rfc822(&mut self, folder: &str, uid: u32) -> Result<Vec<u8>, ImapError>;
}

/// A live IMAP session over TLS, authenticated once at connect time (§4.8).
/// Re-selects `folder` on every call rather than caching the selected
/// mailbox, since a session may be asked to operate on more than one
/// folder across its lifetime.
pub struct AsyncImapSession {
    session: ImapLibSession<TlsStream<TcpStream>>,
}

impl AsyncImapSession {
    pub async fn connect(host: &str, port: u16, credentials: &Credentials) -> Result<Self, ImapError> {
        let tcp_stream = TcpStream::connect((host, port))
            .await
            .map_err(|err| ImapError::Transient(err.to_string()))?;
        let tls_stream = async_native_tls::connect(host, tcp_stream)
            .await
            .map_err(|err| ImapError::Protocol(err.to_string()))?;
        let client = async_imap::Client::new(tls_stream);

        let (username, secret) = match credentials {
            Credentials::AppPassword { username, password } => (username.as_str(), password.expose_string()?),
            Credentials::OAuth2Bearer { username, token } => (username.as_str(), token.expose_string()?),
        };

        let session = client
            .login(username, secret)
            .await
            .map_err(|(err, _client)| ImapError::Auth(err.to_string()))?;

        Ok(Self { session })
    }
}

#[async_trait]
impl ImapSession for AsyncImapSession {
    async fn search(
        &mut self,
        folder: &str,
        since: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<u32>, ImapError> {
        self.session.select(folder).await.map_err(|err| ImapError::Protocol(err.to_string()))?;

        let mut criteria = Vec::new();
        if let Some(since) = since {
            criteria.push(format!("SINCE {}", since.format("%d-%b-%Y")));
        }
        if let Some(before) = before {
            criteria.push(format!("BEFORE {}", before.format("%d-%b-%Y")));
        }
        let query = if criteria.is_empty() { "ALL".to_string() } else { criteria.join(" ") };

        let mut uids: Vec<u32> = self
            .session
            .uid_search(&query)
            .await
            .map_err(|err| ImapError::Protocol(err.to_string()))?
            .into_iter()
            .collect();
        uids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(uids)
    }

    async fn fetch_rfc822(&mut self, folder: &str, uid: u32) -> Result<Vec<u8>, ImapError> {
        self.session.select(folder).await.map_err(|err| ImapError::Protocol(err.to_string()))?;

        let mut stream = self
            .session
            .uid_fetch(uid.to_string(), "RFC822")
            .await
            .map_err(|err| ImapError::Protocol(err.to_string()))?;

        let fetch = stream
            .next()
            .await
            .ok_or_else(|| ImapError::NotFound(format!("uid {uid} not found in {folder}")))?
            .map_err(|err| ImapError::Protocol(err.to_string()))?;

        fetch
            .body()
            .map(|body| body.to_vec())
            .ok_or_else(|| ImapError::NotFound(format!("uid {uid} has no RFC822 body")))
    }
}

/// Retries `operation` on transient errors with exponential backoff, up to
/// a minimum of 2 attempts (§4.8).
pub async fn with_transient_retry<T, F, Fut>(mut operation: F) -> Result<T, ImapError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ImapError>>,
{
    let policy = BackoffPolicy { max_retries: 1, ..BackoffPolicy::default() };
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(ImapError::Transient(msg)) => {
                attempt += 1;
                if attempt >= policy.total_attempts() {
                    return Err(ImapError::Transient(msg));
                }
                tokio::time::sleep(policy.delay_for(attempt, None)).await;
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_at_least_twice() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, ImapError> = with_transient_retry(|| async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 1 {
                Err(ImapError::Transient("timeout".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_transient_errors_propagate_immediately() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, ImapError> = with_transient_retry(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(ImapError::Auth("bad credentials".to_string()))
        })
        .await;
        assert!(matches!(result, Err(ImapError::Auth(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
