use fernet::Fernet;
use moka::sync::Cache;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedactionError {
    #[error("invalid redactor key")]
    InvalidKey,

    #[error("token cannot be decrypted under the current key")]
    Undecryptable,

    #[error("decrypted token is not valid UTF-8")]
    NotUtf8,
}

/// Symmetric key material for [`FernetRedactor`].
///
/// Lives from process start to process end. It is never persisted, so tokens
/// written by a previous process cannot be revealed by this one.
#[derive(Clone)]
pub struct RedactorKey(String);

impl RedactorKey {
    pub fn generate() -> Self {
        Self(Fernet::generate_key())
    }

    /// Accepts a url-safe base64 Fernet key, e.g. a fixed key in tests.
    pub fn from_base64(key: impl Into<String>) -> Result<Self, RedactionError> {
        let key = key.into();
        Fernet::new(&key).ok_or(RedactionError::InvalidKey)?;
        Ok(Self(key))
    }
}

impl fmt::Debug for RedactorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RedactorKey(..)")
    }
}

/// Turns identifying plaintext into an opaque, reversible token.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Redactor: Send + Sync {
    /// Never fails. The same plaintext yields the same token for as long as it stays memoized.
    fn redact(&self, plaintext: &str) -> String;

    fn reveal(&self, token: &str) -> Result<String, RedactionError>;
}

pub struct FernetRedactor {
    fernet: Fernet,
    memo: Cache<String, String>,
}

impl FernetRedactor {
    pub fn new(key: &RedactorKey, memo_capacity: u64) -> Result<Self, RedactionError> {
        let fernet = Fernet::new(&key.0).ok_or(RedactionError::InvalidKey)?;
        Ok(Self {
            fernet,
            memo: Cache::new(memo_capacity),
        })
    }
}

impl Redactor for FernetRedactor {
    fn redact(&self, plaintext: &str) -> String {
        self.memo.get_with(plaintext.to_string(), || {
            self.fernet.encrypt(plaintext.as_bytes())
        })
    }

    fn reveal(&self, token: &str) -> Result<String, RedactionError> {
        let bytes = self
            .fernet
            .decrypt(token)
            .map_err(|_| RedactionError::Undecryptable)?;
        String::from_utf8(bytes).map_err(|_| RedactionError::NotUtf8)
    }
}
