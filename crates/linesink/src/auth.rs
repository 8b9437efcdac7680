// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! Authentication credentials and handshakes.
//!
//! HTTP transports authenticate per request via an `Authorization` header
//! (Basic or Bearer/JWT). The TCP transport authenticates once per
//! connection with a key-pair challenge/response: the client sends its key
//! id, the server answers with a one-line challenge, and the client replies
//! with a base64 ECDSA P-256/SHA-256 signature over the challenge bytes.
//!
//! Credentials are fixed at session construction and replayed verbatim on
//! reconnect; the security level of a live session never changes.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
#[cfg(feature = "ecdsa-auth")]
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL;
use base64::Engine;

use crate::error::{Error, Result};

/// Maximum accepted server challenge length, in bytes (anti-OOM cap).
#[cfg(feature = "ecdsa-auth")]
const MAX_CHALLENGE_LEN: usize = 1024;

/// Authentication credentials for a sender session.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthParams {
    /// No authentication.
    None,
    /// HTTP Basic authentication.
    Basic {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// HTTP Bearer token (pre-issued token or JWT).
    Token {
        /// The literal token placed after `Bearer `.
        token: String,
    },
    /// TCP key-pair authentication (ECDSA P-256).
    #[cfg(feature = "ecdsa-auth")]
    Ecdsa(EcdsaKey),
}

/// ECDSA P-256 key material for TCP authentication.
///
/// All three scalars are base64url-encoded (no padding) 32-byte values:
/// the private scalar `d` and the public point coordinates `x`, `y`.
#[cfg(feature = "ecdsa-auth")]
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct EcdsaKey {
    /// Key id announced to the server before the challenge.
    pub key_id: String,
    /// Private scalar `d`, base64url.
    pub private_key: String,
    /// Public point `x` coordinate, base64url.
    pub public_key_x: String,
    /// Public point `y` coordinate, base64url.
    pub public_key_y: String,
}

impl AuthParams {
    /// Render the `Authorization` header value for HTTP transports.
    ///
    /// Returns `None` when the credentials carry no HTTP representation.
    pub(crate) fn http_header(&self) -> Option<String> {
        match self {
            AuthParams::None => None,
            AuthParams::Basic { username, password } => {
                let raw = format!("{}:{}", username, password);
                Some(format!("Basic {}", BASE64_STANDARD.encode(raw)))
            }
            AuthParams::Token { token } => Some(format!("Bearer {}", token)),
            #[cfg(feature = "ecdsa-auth")]
            AuthParams::Ecdsa(_) => None,
        }
    }
}

#[cfg(feature = "ecdsa-auth")]
impl EcdsaKey {
    /// Decode one base64url scalar, expecting exactly 32 bytes.
    fn decode_scalar(name: &str, value: &str) -> Result<Vec<u8>> {
        let bytes = BASE64_URL
            .decode(value)
            .map_err(|e| Error::Auth(format!("invalid base64url in {}: {}", name, e)))?;
        if bytes.len() != 32 {
            return Err(Error::Auth(format!(
                "{} must decode to 32 bytes, got {}",
                name,
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    /// Build the ring key pair from the stored scalars.
    fn key_pair(&self) -> Result<ring::signature::EcdsaKeyPair> {
        let d = Self::decode_scalar("private_key", &self.private_key)?;
        let x = Self::decode_scalar("public_key_x", &self.public_key_x)?;
        let y = Self::decode_scalar("public_key_y", &self.public_key_y)?;

        // Uncompressed SEC1 point: 0x04 || x || y.
        let mut public = Vec::with_capacity(65);
        public.push(0x04);
        public.extend_from_slice(&x);
        public.extend_from_slice(&y);

        let rng = ring::rand::SystemRandom::new();
        ring::signature::EcdsaKeyPair::from_private_key_and_public_key(
            &ring::signature::ECDSA_P256_SHA256_FIXED_SIGNING,
            &d,
            &public,
            &rng,
        )
        .map_err(|e| Error::Auth(format!("invalid ECDSA key material: {}", e)))
    }

    /// Sign `challenge` and return the base64 (standard alphabet) signature.
    pub(crate) fn sign_challenge(&self, challenge: &[u8]) -> Result<String> {
        let key_pair = self.key_pair()?;
        let rng = ring::rand::SystemRandom::new();
        let signature = key_pair
            .sign(&rng, challenge)
            .map_err(|e| Error::Auth(format!("signing failed: {}", e)))?;
        Ok(BASE64_STANDARD.encode(signature.as_ref()))
    }
}

/// Run the TCP login dialogue on a freshly connected stream.
///
/// Protocol: `key_id\n` out, one challenge line in, `base64(sig)\n` out.
#[cfg(feature = "ecdsa-auth")]
pub(crate) fn tcp_login<S: std::io::Read + std::io::Write>(
    stream: &mut S,
    key: &EcdsaKey,
) -> Result<()> {
    use crate::error::conn_err;

    log::debug!("starting key-pair login for key id {:?}", key.key_id);

    stream
        .write_all(key.key_id.as_bytes())
        .and_then(|()| stream.write_all(b"\n"))
        .and_then(|()| stream.flush())
        .map_err(|e| conn_err("sending key id", &e))?;

    let challenge = read_challenge_line(stream)?;
    let signature = key.sign_challenge(&challenge)?;

    stream
        .write_all(signature.as_bytes())
        .and_then(|()| stream.write_all(b"\n"))
        .and_then(|()| stream.flush())
        .map_err(|e| conn_err("sending challenge response", &e))?;

    log::debug!("key-pair login complete for key id {:?}", key.key_id);
    Ok(())
}

/// Read the server challenge up to (excluding) the terminating `\n`.
#[cfg(feature = "ecdsa-auth")]
fn read_challenge_line<S: std::io::Read>(stream: &mut S) -> Result<Vec<u8>> {
    use crate::error::conn_err;

    let mut challenge = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream
            .read(&mut byte)
            .map_err(|e| conn_err("reading auth challenge", &e))?;
        if n == 0 {
            return Err(Error::Auth(
                "server closed the connection during the auth handshake \
                 (unknown key id?)"
                    .into(),
            ));
        }
        if byte[0] == b'\n' {
            return Ok(challenge);
        }
        challenge.push(byte[0]);
        if challenge.len() > MAX_CHALLENGE_LEN {
            return Err(Error::Auth(format!(
                "auth challenge exceeds {} bytes",
                MAX_CHALLENGE_LEN
            )));
        }
    }
}
