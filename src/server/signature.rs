//! HMAC verification for inbound Slack and Jira requests.

use crate::errors::{JiraldoError, Result};
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SLACK_SIGNATURE_HEADER: &str = "x-slack-signature";
pub const SLACK_TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const JIRA_SIGNATURE_HEADER: &str = "x-hub-signature";

/// Slack rejects replays older than five minutes; so do we.
pub const SLACK_MAX_SKEW_SECS: u64 = 60 * 5;

fn mac(secret: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| JiraldoError::Other(format!("Invalid HMAC key: {}", e)))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| JiraldoError::InvalidSignature(format!("missing {} header", name)))
}

fn verify_hex(mut mac: HmacSha256, provided: &str) -> Result<()> {
    let provided = hex::decode(provided)
        .map_err(|_| JiraldoError::InvalidSignature("signature is not hex".to_string()))?;
    mac.verify_slice(&provided)
        .map_err(|_| JiraldoError::InvalidSignature("signature mismatch".to_string()))
}

/// `v0=<hex hmac of "v0:{timestamp}:{body}">`
pub fn slack_signature(secret: &str, timestamp: &str, body: &[u8]) -> Result<String> {
    let mut mac = mac(secret)?;
    mac.update(format!("v0:{}:", timestamp).as_bytes());
    mac.update(body);
    Ok(format!("v0={}", hex::encode(mac.finalize().into_bytes())))
}

pub fn verify_slack(secret: &str, headers: &HeaderMap, body: &[u8], now: i64) -> Result<()> {
    let timestamp = header(headers, SLACK_TIMESTAMP_HEADER)?;
    let signature = header(headers, SLACK_SIGNATURE_HEADER)?;

    let sent_at: i64 = timestamp
        .parse()
        .map_err(|_| JiraldoError::InvalidSignature("bad timestamp".to_string()))?;
    if now.abs_diff(sent_at) > SLACK_MAX_SKEW_SECS {
        return Err(JiraldoError::InvalidSignature(
            "timestamp outside the allowed window".to_string(),
        ));
    }

    let provided = signature
        .strip_prefix("v0=")
        .ok_or_else(|| JiraldoError::InvalidSignature("unsupported version".to_string()))?;

    let mut mac = mac(secret)?;
    mac.update(format!("v0:{}:", timestamp).as_bytes());
    mac.update(body);
    verify_hex(mac, provided)
}

/// `sha256=<hex hmac of body>`
pub fn jira_signature(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = mac(secret)?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

pub fn verify_jira(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<()> {
    let signature = header(headers, JIRA_SIGNATURE_HEADER)?;
    let provided = signature
        .strip_prefix("sha256=")
        .ok_or_else(|| JiraldoError::InvalidSignature("unsupported algorithm".to_string()))?;

    let mut mac = mac(secret)?;
    mac.update(body);
    verify_hex(mac, provided)
}
