use devauth_crypto::{CryptoError, WireCipher};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn cipher() -> WireCipher {
    WireCipher::new("shared-secret").unwrap()
}

#[test]
fn encrypt_decrypt_roundtrip() {
    let c = cipher();
    let token = c.encrypt(b"Hello, World!").unwrap();
    assert_eq!(c.decrypt(&token).unwrap(), b"Hello, World!");
}

#[test]
fn encrypt_decrypt_empty() {
    let c = cipher();
    let token = c.encrypt(b"").unwrap();
    assert_eq!(c.decrypt(&token).unwrap(), b"");
}

#[test]
fn empty_secret_is_rejected() {
    assert!(matches!(WireCipher::new(""), Err(CryptoError::MissingSecret)));
}

#[test]
fn wrong_secret_fails_decryption() {
    let token = cipher().encrypt(b"Secret").unwrap();
    let other = WireCipher::new("another-secret").unwrap();
    assert!(other.decrypt(&token).is_none());
}

#[test]
fn tampered_token_fails_decryption() {
    let c = cipher();
    let token = c.encrypt(b"Secret payload").unwrap();
    let mut bytes = token.into_bytes();
    // swap a character in the middle of the ciphertext region
    let mid = bytes.len() / 2;
    bytes[mid] = if bytes[mid] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(bytes).unwrap();
    assert!(c.decrypt(&tampered).is_none());
}

#[test]
fn garbage_tokens_fail_quietly() {
    let c = cipher();
    assert!(c.decrypt("").is_none());
    assert!(c.decrypt("not base64 !!!").is_none());
    assert!(c.decrypt("gAAAAA==").is_none());
}

#[test]
fn same_plaintext_produces_different_tokens() {
    let c = cipher();
    let t1 = c.encrypt(b"Same").unwrap();
    let t2 = c.encrypt(b"Same").unwrap();
    assert_ne!(t1, t2);
}

#[test]
fn token_is_url_safe_base64() {
    let token = cipher().encrypt(&[0xFFu8; 100]).unwrap();
    assert!(token
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'='));
    assert!(!token.contains('+'));
    assert!(!token.contains('/'));
}

#[test]
fn seal_open_json_roundtrip() {
    let c = cipher();
    let body = json!({"device_id": "abc", "software_name": null, "device_info": {"cpu_count": 8}});
    let token = c.seal(&body).unwrap();
    let opened: Value = c.open(&token).unwrap();
    assert_eq!(opened, body);
}

#[test]
fn seal_uses_compact_json() {
    let c = cipher();
    let token = c.seal(&json!({"authorized": true, "message": "ok"})).unwrap();
    let raw = c.decrypt(&token).unwrap();
    assert_eq!(
        String::from_utf8(raw).unwrap(),
        r#"{"authorized":true,"message":"ok"}"#
    );
}

#[test]
fn open_rejects_non_json_plaintext() {
    let c = cipher();
    let token = c.encrypt(b"not json").unwrap();
    assert!(c.open::<Value>(&token).is_none());
}

#[test]
fn decrypt_tolerates_surrounding_whitespace() {
    let c = cipher();
    let token = c.encrypt(b"x").unwrap();
    assert_eq!(c.decrypt(&format!("  {token}\n")).unwrap(), b"x");
}

#[test]
fn debug_output_hides_key_material() {
    let c = cipher();
    let dbg = format!("{c:?}");
    assert!(dbg.contains("REDACTED"));
    assert!(!dbg.contains("shared-secret"));
}
