// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! Configuration-string parsing.
//!
//! A conf string packs a whole session configuration into one line, handy
//! for environment variables and CLI flags:
//!
//! ```text
//! tcp::addr=localhost:9009;
//! https::addr=db.example.com:9000;token=abc123;tls_verify=on;
//! tcp::addr=localhost;username=admin;token=...;token_x=...;token_y=...;
//! ```
//!
//! Grammar: `schema::key=value;key=value;...`. The trailing `;` is
//! optional, a literal `;` inside a value is written `;;`, keys may appear
//! once, and unknown keys are rejected rather than ignored.

use std::time::Duration;

use crate::auth::AuthParams;
use crate::config::{Protocol, SenderConfig, TlsVerifyMode};
use crate::error::{Error, Result};

/// Parse a configuration string into a [`SenderConfig`].
pub fn parse_conf(conf: &str) -> Result<SenderConfig> {
    let (schema, rest) = conf
        .split_once("::")
        .ok_or_else(|| Error::Config(format!("missing schema separator \"::\" in {:?}", conf)))?;
    let protocol = Protocol::from_schema(schema)?;

    let params = split_params(rest)?;
    let mut seen: Vec<&str> = Vec::new();
    for (key, _) in &params {
        if seen.contains(&key.as_str()) {
            return Err(Error::Config(format!("duplicate key {:?}", key)));
        }
        seen.push(key.as_str());
    }

    let addr = lookup(&params, "addr")
        .ok_or_else(|| Error::Config("missing required key addr".into()))?;
    let (host, port) = parse_addr(addr, protocol)?;
    let mut config = SenderConfig::new(protocol, host, port);

    for (key, value) in &params {
        apply_key(&mut config, key, value)?;
    }
    config.auth = build_auth(protocol, &params)?;
    config.validate()?;
    Ok(config)
}

fn lookup<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Split `key=value;` pairs, decoding the `;;` escape inside values.
fn split_params(rest: &str) -> Result<Vec<(String, String)>> {
    let mut params = Vec::new();
    let mut chars = rest.chars().peekable();

    while chars.peek().is_some() {
        let mut key = String::new();
        for c in chars.by_ref() {
            if c == '=' {
                break;
            }
            key.push(c);
        }
        if key.is_empty() {
            return Err(Error::Config("empty key in configuration string".into()));
        }

        let mut value = String::new();
        loop {
            match chars.next() {
                Some(';') => {
                    if chars.peek() == Some(&';') {
                        chars.next();
                        value.push(';');
                    } else {
                        break;
                    }
                }
                Some(c) => value.push(c),
                // Trailing `;` is optional on the last pair.
                None => break,
            }
        }
        params.push((key, value));
    }
    Ok(params)
}

/// Split `host[:port]`, defaulting the port by protocol.
fn parse_addr(addr: &str, protocol: Protocol) -> Result<(String, u16)> {
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid port in addr {:?}", addr)))?;
            Ok((host.to_string(), port))
        }
        None => Ok((addr.to_string(), protocol.default_port())),
    }
}

/// Parse `off` or a non-negative integer; `off` and `0` both disable.
fn parse_count(key: &str, value: &str) -> Result<Option<usize>> {
    if value == "off" {
        return Ok(None);
    }
    let n: usize = value
        .parse()
        .map_err(|_| Error::Config(format!("invalid value {:?} for {}", value, key)))?;
    Ok((n > 0).then_some(n))
}

/// Parse `off` or a millisecond count.
fn parse_millis(key: &str, value: &str) -> Result<Option<Duration>> {
    if value == "off" {
        return Ok(None);
    }
    let ms: u64 = value
        .parse()
        .map_err(|_| Error::Config(format!("invalid value {:?} for {}", value, key)))?;
    Ok((ms > 0).then(|| Duration::from_millis(ms)))
}

fn apply_key(config: &mut SenderConfig, key: &str, value: &str) -> Result<()> {
    match key {
        // addr handled up front; auth keys assembled afterwards.
        "addr" | "username" | "password" | "token" | "token_x" | "token_y" => {}
        "auto_flush" => {
            if value != "off" {
                return Err(Error::Config(format!(
                    "auto_flush only accepts \"off\", got {:?}",
                    value
                )));
            }
            config.auto_flush_rows = None;
            config.auto_flush_bytes = None;
            config.auto_flush_interval = None;
        }
        "auto_flush_rows" => config.auto_flush_rows = parse_count(key, value)?,
        "auto_flush_bytes" => config.auto_flush_bytes = parse_count(key, value)?,
        "auto_flush_interval" => config.auto_flush_interval = parse_millis(key, value)?,
        "connect_timeout" => {
            config.connect_timeout = parse_millis(key, value)?.ok_or_else(|| {
                Error::Config("connect_timeout must be a positive millisecond count".into())
            })?;
        }
        "request_timeout" => {
            config.request_timeout = parse_millis(key, value)?.ok_or_else(|| {
                Error::Config("request_timeout must be a positive millisecond count".into())
            })?;
        }
        "retry_attempts" => {
            config.retry_attempts = value
                .parse()
                .map_err(|_| Error::Config(format!("invalid value {:?} for {}", value, key)))?;
        }
        "retry_backoff" => {
            config.retry_backoff = parse_millis(key, value)?.ok_or_else(|| {
                Error::Config("retry_backoff must be a positive millisecond count".into())
            })?;
        }
        "tls_verify" => {
            config.tls_verify = match value {
                "on" => TlsVerifyMode::Strict,
                "relaxed" => TlsVerifyMode::Relaxed,
                "unsafe_off" => TlsVerifyMode::Disabled,
                other => {
                    return Err(Error::Config(format!(
                        "tls_verify accepts on, relaxed or unsafe_off, got {:?}",
                        other
                    )));
                }
            };
        }
        "tls_roots" => config.tls_roots = Some(value.into()),
        "tls_client_cert" => config.tls_client_cert = Some(value.into()),
        "tls_client_key" => config.tls_client_key = Some(value.into()),
        "max_name_len" => {
            config.max_name_len = value
                .parse()
                .map_err(|_| Error::Config(format!("invalid value {:?} for {}", value, key)))?;
        }
        other => {
            return Err(Error::Config(format!(
                "unknown configuration key {:?}",
                other
            )));
        }
    }
    Ok(())
}

/// Assemble credentials from the auth-related keys.
fn build_auth(protocol: Protocol, params: &[(String, String)]) -> Result<AuthParams> {
    let username = lookup(params, "username");
    let password = lookup(params, "password");
    let token = lookup(params, "token");
    let token_x = lookup(params, "token_x");
    let token_y = lookup(params, "token_y");

    if protocol.is_http() {
        if token_x.is_some() || token_y.is_some() {
            return Err(Error::Config(
                "token_x/token_y are key-pair auth keys, not valid with http(s)".into(),
            ));
        }
        return match (username, password, token) {
            (None, None, None) => Ok(AuthParams::None),
            (Some(u), Some(p), None) => Ok(AuthParams::Basic {
                username: u.to_string(),
                password: p.to_string(),
            }),
            (None, None, Some(t)) => Ok(AuthParams::Token {
                token: t.to_string(),
            }),
            _ => Err(Error::Config(
                "http(s) auth is either username+password or token".into(),
            )),
        };
    }

    if password.is_some() {
        return Err(Error::Config(
            "password is an http(s) auth key, not valid with tcp(s)".into(),
        ));
    }
    match (username, token, token_x, token_y) {
        (None, None, None, None) => Ok(AuthParams::None),
        #[cfg(feature = "ecdsa-auth")]
        (Some(u), Some(d), Some(x), Some(y)) => {
            Ok(AuthParams::Ecdsa(crate::auth::EcdsaKey {
                key_id: u.to_string(),
                private_key: d.to_string(),
                public_key_x: x.to_string(),
                public_key_y: y.to_string(),
            }))
        }
        #[cfg(feature = "ecdsa-auth")]
        _ => Err(Error::Config(
            "tcp(s) key-pair auth needs username, token, token_x and token_y".into(),
        )),
        #[cfg(not(feature = "ecdsa-auth"))]
        _ => Err(Error::Config(
            "tcp(s) key-pair auth requires the 'ecdsa-auth' feature".into(),
        )),
    }
}
