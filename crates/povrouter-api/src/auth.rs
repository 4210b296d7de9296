//! obs-websocket v5 challenge-response authentication.
//!
//! OBS never sees the password itself. The Hello message carries a `salt`
//! and a `challenge`; the client answers with
//! `base64(sha256(base64(sha256(password + salt)) + challenge))`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// Compute the `authentication` string for an Identify message.
pub fn authentication_string(password: &str, salt: &str, challenge: &str) -> String {
    let secret = STANDARD.encode(Sha256::digest(format!("{password}{salt}")));
    STANDARD.encode(Sha256::digest(format!("{secret}{challenge}")))
}
