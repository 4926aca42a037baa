/**
 * Webhook Signatures
 *
 * Every delivery is signed with HMAC-SHA256 over a canonical JSON
 * rendering of the payload: object keys sorted recursively, no
 * extraneous whitespace. The delivered body is exactly the canonical
 * bytes, so receivers verify against the raw body.
 *
 * The signature travels as `X-Webhook-Signature: sha256=<hex>`.
 * Verification is constant-time via the `hmac` Mac API.
 */

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header value prefix for SHA-256 signatures
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Render a JSON value canonically: sorted object keys, compact
/// separators.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // serde_json handles key escaping
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => {
            out.push_str(&other.to_string());
        }
    }
}

/// Sign a payload with the subscription secret.
///
/// Returns the full header value, `sha256=<hex digest>`.
pub fn sign(secret: &str, payload: &serde_json::Value) -> String {
    let canonical = canonical_json(payload);
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(canonical.as_bytes());
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature header against a payload and secret.
///
/// Comparison is constant-time. Any malformed header fails closed.
pub fn verify(secret: &str, payload: &serde_json::Value, signature: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let canonical = canonical_json(payload);
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(canonical.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_json_sorts_keys_recursively() {
        let value = serde_json::json!({
            "zeta": 1,
            "alpha": {"c": true, "b": [1, 2], "a": null}
        });
        assert_eq!(
            canonical_json(&value),
            r#"{"alpha":{"a":null,"b":[1,2],"c":true},"zeta":1}"#
        );
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let payload = serde_json::json!({"event_type": "user.created", "data": {"id": 1}});
        let signature = sign("s3cret", &payload);
        assert!(signature.starts_with("sha256="));
        assert!(verify("s3cret", &payload, &signature));
    }

    #[test]
    fn test_wrong_secret_fails_verification() {
        let payload = serde_json::json!({"data": {"id": 1}});
        let signature = sign("secret-a", &payload);
        assert!(!verify("secret-b", &payload, &signature));
    }

    #[test]
    fn test_tampered_payload_fails_verification() {
        let payload = serde_json::json!({"data": {"id": 1}});
        let signature = sign("s", &payload);
        let tampered = serde_json::json!({"data": {"id": 2}});
        assert!(!verify("s", &tampered, &signature));
    }

    #[test]
    fn test_malformed_header_fails_closed() {
        let payload = serde_json::json!({});
        assert!(!verify("s", &payload, "md5=abc"));
        assert!(!verify("s", &payload, "sha256=not-hex"));
        assert!(!verify("s", &payload, ""));
    }

    #[test]
    fn test_signature_ignores_key_order() {
        let a = serde_json::json!({"x": 1, "y": 2});
        let b: serde_json::Value =
            serde_json::from_str(r#"{"y": 2, "x": 1}"#).unwrap();
        assert_eq!(sign("k", &a), sign("k", &b));
    }
}
