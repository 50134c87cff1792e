//! Authentication utilities for the Phemex API
//!
//! Every private request carries three headers:
//! - `x-phemex-access-token`: the API key
//! - `x-phemex-request-expiry`: unix seconds after which the request is void
//! - `x-phemex-request-signature`: hex HMAC-SHA256 of
//!   `path + query + expiry + body`, keyed with the API secret

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Seconds a signed request stays valid
pub const REQUEST_EXPIRY_SECS: i64 = 60;

/// Generate HMAC-SHA256 signature for API authentication
///
/// # Example
///
/// ```
/// use perp_trader::exchange::auth::sign_request;
///
/// let path = "/g-orders/activeList";
/// let signature = sign_request(path, "symbol=BTCUSDT", 1700000060, "", "secret");
/// assert_eq!(signature.len(), 64);
/// ```
pub fn sign_request(path: &str, query: &str, expiry: i64, body: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(path.as_bytes());
    mac.update(query.as_bytes());
    mac.update(expiry.to_string().as_bytes());
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// API credentials container
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Sign a request with these credentials
    pub fn sign(&self, path: &str, query: &str, expiry: i64, body: &str) -> String {
        sign_request(path, query, expiry, body, &self.api_secret)
    }
}

// Keep the secret out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .finish()
    }
}
