//! Request signing for the object storage and media processing APIs.
//!
//! Both services verify the same HMAC-SHA1 scheme:
//!
//! 1. `KeyTime = "{start};{end}"` (Unix seconds)
//! 2. `SignKey = hex(HMAC-SHA1(secret_key, KeyTime))`
//! 3. `HttpString = "{method}\n{uri}\n\nhost={host}\n"` (method and host lowercased)
//! 4. `StringToSign = "sha1\n{KeyTime}\n{hex(SHA1(HttpString))}\n"`
//! 5. `Signature = hex(HMAC-SHA1(SignKey, StringToSign))`
//!
//! The hex text of `SignKey` (not its raw bytes) is the key in step 5; the
//! remote verifier derives it the same way.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};

use crate::error::{StorageError, StorageResult};

type HmacSha1 = Hmac<Sha1>;

/// Default validity window of a signature (1 hour).
pub const DEFAULT_SIGN_WINDOW_SECS: i64 = 3600;

/// Access key pair. Never printed.
#[derive(Clone)]
pub struct Credential {
    secret_id: String,
    secret_key: String,
}

impl Credential {
    /// Build a credential, rejecting empty values.
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> StorageResult<Self> {
        let secret_id = secret_id.into();
        let secret_key = secret_key.into();
        if secret_id.trim().is_empty() || secret_key.trim().is_empty() {
            return Err(StorageError::config_error("secret id and secret key must be set"));
        }
        Ok(Self {
            secret_id,
            secret_key,
        })
    }

    pub fn secret_id(&self) -> &str {
        &self.secret_id
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Source of the current time in Unix seconds.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_unix(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Settable clock for tests and replay tooling.
#[derive(Debug, Default)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Validity window of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTime {
    pub start: i64,
    pub end: i64,
}

impl KeyTime {
    pub fn starting_at(start: i64, window_secs: i64) -> Self {
        Self {
            start,
            end: start + window_secs,
        }
    }

    /// Whether `now` falls inside `[start, end)`.
    pub fn contains(&self, now: i64) -> bool {
        self.start <= now && now < self.end
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (start, end) = value.split_once(';')?;
        Some(Self {
            start: start.trim().parse().ok()?,
            end: end.trim().parse().ok()?,
        })
    }
}

impl fmt::Display for KeyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.start, self.end)
    }
}

/// A computed signature, ready to be rendered into an Authorization header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub secret_id: String,
    pub key_time: KeyTime,
    pub signature: String,
}

impl SignedRequest {
    /// Authorization header value.
    pub fn authorization(&self) -> String {
        format!(
            "q-sign-algorithm=sha1&q-ak={ak}&q-sign-time={kt}&q-key-time={kt}\
             &q-header-list=host&q-url-param-list=&q-signature={sig}",
            ak = self.secret_id,
            kt = self.key_time,
            sig = self.signature,
        )
    }
}

/// Percent-encode an object key into a request URI.
///
/// Each path segment is escaped except for unreserved characters; `/`
/// separators are preserved and a leading `/` is always present.
pub fn canonical_uri(object_key: &str) -> String {
    let trimmed = object_key.trim_start_matches('/');
    let encoded: Vec<String> = trimmed
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("/{}", encoded.join("/"))
}

fn hmac_sha1_hex(key: &[u8], message: &str) -> StorageResult<String> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| StorageError::ConfigError(format!("Invalid HMAC key: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn string_to_sign(method: &str, uri: &str, host: &str, key_time: KeyTime) -> String {
    let http_string = format!(
        "{}\n{}\n\nhost={}\n",
        method.to_ascii_lowercase(),
        uri,
        host.to_ascii_lowercase()
    );
    let digest = hex::encode(Sha1::digest(http_string.as_bytes()));
    format!("sha1\n{}\n{}\n", key_time, digest)
}

/// Compute the signature for one request.
///
/// Pure: the same inputs always produce the same token.
pub fn sign_request(
    credential: &Credential,
    method: &str,
    uri: &str,
    host: &str,
    key_time: KeyTime,
) -> StorageResult<SignedRequest> {
    let sign_key = hmac_sha1_hex(credential.secret_key.as_bytes(), &key_time.to_string())?;
    let signature = hmac_sha1_hex(
        sign_key.as_bytes(),
        &string_to_sign(method, uri, host, key_time),
    )?;

    Ok(SignedRequest {
        secret_id: credential.secret_id.clone(),
        key_time,
        signature,
    })
}

/// Check an Authorization token against a request at time `now`.
///
/// Returns `Ok(false)` for malformed, foreign, tampered or expired tokens.
pub fn verify(
    credential: &Credential,
    authorization: &str,
    method: &str,
    uri: &str,
    host: &str,
    now: i64,
) -> StorageResult<bool> {
    let mut secret_id = None;
    let mut key_time = None;
    let mut signature = None;
    for pair in authorization.split('&') {
        match pair.split_once('=') {
            Some(("q-ak", v)) => secret_id = Some(v),
            Some(("q-key-time", v)) => key_time = KeyTime::parse(v),
            Some(("q-signature", v)) => signature = hex::decode(v).ok(),
            _ => {}
        }
    }

    let (Some(secret_id), Some(key_time), Some(signature)) = (secret_id, key_time, signature) else {
        return Ok(false);
    };
    if secret_id != credential.secret_id || !key_time.contains(now) {
        return Ok(false);
    }

    let sign_key = hmac_sha1_hex(credential.secret_key.as_bytes(), &key_time.to_string())?;
    let mut mac = HmacSha1::new_from_slice(sign_key.as_bytes())
        .map_err(|e| StorageError::ConfigError(format!("Invalid HMAC key: {}", e)))?;
    mac.update(string_to_sign(method, uri, host, key_time).as_bytes());
    Ok(mac.verify_slice(&signature).is_ok())
}

/// Signs requests with a fresh key window on every call.
#[derive(Clone)]
pub struct RequestSigner {
    credential: Credential,
    window_secs: i64,
    clock: std::sync::Arc<dyn Clock>,
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("credential", &self.credential)
            .field("window_secs", &self.window_secs)
            .finish()
    }
}

impl RequestSigner {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            window_secs: DEFAULT_SIGN_WINDOW_SECS,
            clock: std::sync::Arc::new(SystemClock),
        }
    }

    pub fn with_window(mut self, window_secs: i64) -> Self {
        self.window_secs = window_secs.max(1);
        self
    }

    pub fn with_clock(mut self, clock: std::sync::Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn now_unix(&self) -> i64 {
        self.clock.now_unix()
    }

    /// Sign a request starting the validity window now.
    pub fn sign(&self, method: &str, uri: &str, host: &str) -> StorageResult<SignedRequest> {
        let key_time = KeyTime::starting_at(self.clock.now_unix(), self.window_secs);
        sign_request(&self.credential, method, uri, host, key_time)
    }

    /// Shorthand for `sign(..)?.authorization()`.
    pub fn authorization(&self, method: &str, uri: &str, host: &str) -> StorageResult<String> {
        Ok(self.sign(method, uri, host)?.authorization())
    }
}
