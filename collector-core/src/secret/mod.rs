//! Resolves `scheme://…` references to opaque byte secrets (component C3).
//! Secrets resolved at run start are held only for the run's duration;
//! inline secrets are never written to disk or logged.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("unsupported secret scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid secret uri: {0}")]
    InvalidUri(String),

    #[error("secret backend error: {0}")]
    Backend(String),
}

/// An opaque secret value. Deliberately does not implement `Debug`/`Display`
/// so it can't be accidentally logged.
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    pub fn expose_string(&self) -> Result<String, SecretError> {
        String::from_utf8(self.0.clone())
            .map_err(|err| SecretError::Backend(err.to_string()))
    }
}

#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve(&self, uri: &str) -> Result<SecretBytes, SecretError>;
}

/// `keychain://<service>/<account>` or `keychain://<service>?account=<account>`.
/// The OS keychain itself is an external collaborator; this resolver is
/// parameterized over a lookup function so tests and the server wiring can
/// supply their own backend.
pub struct KeychainResolver<F> {
    lookup: F,
}

impl<F> KeychainResolver<F>
where
    F: Fn(&str, &str) -> Option<Vec<u8>> + Send + Sync,
{
    pub fn new(lookup: F) -> Self {
        Self { lookup }
    }

    fn parse(uri: &str) -> Result<(String, String), SecretError> {
        let parsed = Url::parse(uri).map_err(|err| SecretError::InvalidUri(err.to_string()))?;
        let service = parsed.host_str().unwrap_or_default().to_string();
        let account = parsed
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| {
                parsed
                    .query_pairs()
                    .find(|(k, _)| k == "account")
                    .map(|(_, v)| v.into_owned())
            })
            .ok_or_else(|| SecretError::InvalidUri(format!("missing account in {uri}")))?;
        Ok((service, account))
    }
}

#[async_trait]
impl<F> SecretResolver for KeychainResolver<F>
where
    F: Fn(&str, &str) -> Option<Vec<u8>> + Send + Sync,
{
    async fn resolve(&self, uri: &str) -> Result<SecretBytes, SecretError> {
        let (service, account) = Self::parse(uri)?;
        (self.lookup)(&service, &account)
            .map(SecretBytes::new)
            .ok_or_else(|| SecretError::NotFound(uri.to_string()))
    }
}

/// `inline://<id>` — secrets supplied per request, held only in memory.
#[derive(Default)]
pub struct InlineResolver {
    values: HashMap<String, Vec<u8>>,
}

impl InlineResolver {
    pub fn new(values: HashMap<String, Vec<u8>>) -> Self {
        Self { values }
    }
}

#[async_trait]
impl SecretResolver for InlineResolver {
    async fn resolve(&self, uri: &str) -> Result<SecretBytes, SecretError> {
        let id = uri
            .strip_prefix("inline://")
            .ok_or_else(|| SecretError::InvalidUri(uri.to_string()))?;
        self.values
            .get(id)
            .cloned()
            .map(SecretBytes::new)
            .ok_or_else(|| SecretError::NotFound(uri.to_string()))
    }
}

/// Tries members in order. A `NotFound` from one member falls through to
/// the next; any other error is retained as the "last error" and returned
/// only if every member fails.
pub struct ChainResolver {
    members: Vec<Box<dyn SecretResolver>>,
}

impl ChainResolver {
    pub fn new(members: Vec<Box<dyn SecretResolver>>) -> Self {
        Self { members }
    }
}

#[async_trait]
impl SecretResolver for ChainResolver {
    async fn resolve(&self, uri: &str) -> Result<SecretBytes, SecretError> {
        let mut last_error: Option<SecretError> = None;
        for member in &self.members {
            match member.resolve(uri).await {
                Ok(bytes) => return Ok(bytes),
                Err(SecretError::NotFound(_)) => continue,
                Err(other) => last_error = Some(other),
            }
        }
        Err(last_error.unwrap_or_else(|| SecretError::NotFound(uri.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inline_resolver_round_trips() {
        let mut values = HashMap::new();
        values.insert("app-password".to_string(), b"hunter2".to_vec());
        let resolver = InlineResolver::new(values);
        let secret = resolver.resolve("inline://app-password").await.unwrap();
        assert_eq!(secret.expose(), b"hunter2");
    }

    #[tokio::test]
    async fn inline_resolver_missing_is_not_found() {
        let resolver = InlineResolver::new(HashMap::new());
        let err = resolver.resolve("inline://missing").await.unwrap_err();
        assert!(matches!(err, SecretError::NotFound(_)));
    }

    #[tokio::test]
    async fn chain_falls_through_not_found() {
        let mut values = HashMap::new();
        values.insert("key".to_string(), b"value".to_vec());
        let chain = ChainResolver::new(vec![
            Box::new(InlineResolver::default()),
            Box::new(InlineResolver::new(values)),
        ]);
        let secret = chain.resolve("inline://key").await.unwrap();
        assert_eq!(secret.expose(), b"value");
    }

    #[tokio::test]
    async fn chain_fails_when_all_members_fail() {
        let chain = ChainResolver::new(vec![Box::new(InlineResolver::default())]);
        let err = chain.resolve("inline://missing").await.unwrap_err();
        assert!(matches!(err, SecretError::NotFound(_)));
    }

    #[tokio::test]
    async fn keychain_resolver_parses_account_from_path() {
        let resolver = KeychainResolver::new(|service, account| {
            if service == "mail.example.com" && account == "user@example.com" {
                Some(b"app-password".to_vec())
            } else {
                None
            }
        });
        let secret = resolver
            .resolve("keychain://mail.example.com/user@example.com")
            .await
            .unwrap();
        assert_eq!(secret.expose(), b"app-password");
    }
}
