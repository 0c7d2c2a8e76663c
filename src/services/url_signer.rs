//! Time-limited signed URLs for object download and upload.
//!
//! A signed URL looks like
//! `{base}/objects/{bucket}/{key}?expires=<unix secs>&signature=<sig>`.
//! The signature is an HMAC-SHA256, keyed with the server secret, over the
//! HTTP method, bucket, key and expiry. It is encoded as URL-safe base64
//! without padding.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Which operation a URL grants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignedMethod {
    Get,
    Put,
}

impl SignedMethod {
    fn as_str(self) -> &'static str {
        match self {
            SignedMethod::Get => "GET",
            SignedMethod::Put => "PUT",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signed URL has expired")]
    Expired,
    #[error("signature does not match")]
    Invalid,
}

#[derive(Clone)]
pub struct UrlSigner {
    secret: String,
    base_url: String,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            secret: secret.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build a URL for `method` on `bucket/key`, valid until `expires_at`.
    pub fn sign(
        &self,
        method: SignedMethod,
        bucket: &str,
        key: &str,
        expires_at: DateTime<Utc>,
    ) -> String {
        let expires = expires_at.timestamp();
        let signature = self.signature(method, bucket, key, expires);
        format!(
            "{}/objects/{}/{}?expires={}&signature={}",
            self.base_url, bucket, key, expires, signature
        )
    }

    /// Check a signature presented with a request at time `now`.
    ///
    /// The digest comparison runs in constant time.
    pub fn verify(
        &self,
        method: SignedMethod,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let presented = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SignatureError::Invalid)?;
        self.mac(method, bucket, key, expires)
            .verify_slice(&presented)
            .map_err(|_| SignatureError::Invalid)?;
        if now.timestamp() >= expires {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }

    fn signature(&self, method: SignedMethod, bucket: &str, key: &str, expires: i64) -> String {
        let tag = self.mac(method, bucket, key, expires).finalize().into_bytes();
        URL_SAFE_NO_PAD.encode(tag)
    }

    fn mac(&self, method: SignedMethod, bucket: &str, key: &str, expires: i64) -> HmacSha256 {
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC key length is unrestricted"));
        mac.update(method.as_str().as_bytes());
        mac.update(b"\n");
        mac.update(bucket.as_bytes());
        mac.update(b"\n");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix(name)?.strip_prefix('='))
            .unwrap()
    }

    #[test]
    fn signed_url_verifies_until_expiry() {
        let signer = UrlSigner::new("s3cret", "http://localhost:3000/");
        let now = Utc::now();
        let url = signer.sign(SignedMethod::Get, "feed", "abc", now + TimeDelta::seconds(60));

        assert!(url.starts_with("http://localhost:3000/objects/feed/abc?expires="));
        let expires: i64 = query_param(&url, "expires").parse().unwrap();
        let sig = query_param(&url, "signature");

        assert_eq!(
            signer.verify(SignedMethod::Get, "feed", "abc", expires, sig, now),
            Ok(())
        );
        assert_eq!(
            signer.verify(
                SignedMethod::Get,
                "feed",
                "abc",
                expires,
                sig,
                now + TimeDelta::seconds(61)
            ),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn signature_is_bound_to_method_and_key() {
        let signer = UrlSigner::new("s3cret", "http://localhost:3000");
        let now = Utc::now();
        let url = signer.sign(SignedMethod::Get, "feed", "abc", now + TimeDelta::seconds(60));
        let expires: i64 = query_param(&url, "expires").parse().unwrap();
        let sig = query_param(&url, "signature");

        assert_eq!(
            signer.verify(SignedMethod::Put, "feed", "abc", expires, sig, now),
            Err(SignatureError::Invalid)
        );
        assert_eq!(
            signer.verify(SignedMethod::Get, "feed", "abd", expires, sig, now),
            Err(SignatureError::Invalid)
        );
        assert_eq!(
            signer.verify(SignedMethod::Get, "feed", "abc", expires + 1, sig, now),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn signature_depends_on_secret() {
        let now = Utc::now();
        let expires_at = now + TimeDelta::seconds(60);
        let ours = UrlSigner::new("s3cret", "http://localhost:3000");
        let theirs = UrlSigner::new("other", "http://localhost:3000");
        let url = theirs.sign(SignedMethod::Get, "feed", "abc", expires_at);
        let sig = query_param(&url, "signature");

        assert_eq!(
            ours.verify(SignedMethod::Get, "feed", "abc", expires_at.timestamp(), sig, now),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn malformed_signatures_are_rejected() {
        let signer = UrlSigner::new("s3cret", "http://localhost:3000");
        let now = Utc::now();
        let expires_at = now + TimeDelta::seconds(60);
        let url = signer.sign(SignedMethod::Get, "feed", "abc", expires_at);
        let sig = query_param(&url, "signature");
        // 32-byte tag, unpadded URL-safe base64
        assert_eq!(sig.len(), 43);

        let expires = expires_at.timestamp();
        let extended = format!("{sig}AA");
        let candidates: [&str; 4] = ["", "not base64!", &sig[..42], &extended];
        for bad in candidates {
            assert_eq!(
                signer.verify(SignedMethod::Get, "feed", "abc", expires, bad, now),
                Err(SignatureError::Invalid),
                "signature={bad:?}"
            );
        }
    }
}
