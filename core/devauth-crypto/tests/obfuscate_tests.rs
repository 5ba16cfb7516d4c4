use devauth_crypto::{ObfuscationCodec, HEADER_SIZE};
use pretty_assertions::assert_eq;

const SERVER: &str = "http://auth.example.com";
const DEVICE: &str = "0123456789abcdef0123456789abcdef";
const HOUR: f64 = 3600.0;
const T0: f64 = 1_750_000_000.0;

fn codec() -> ObfuscationCodec {
    ObfuscationCodec::new(SERVER, DEVICE, 7)
}

fn record() -> Vec<u8> {
    br#"{"a":true,"m":"device authorized","c":1750000000.25,"l":1750000000.25,"v":2,"f":"9a0b1c2d"}"#
        .to_vec()
}

#[test]
fn roundtrip_same_hour() {
    let c = codec();
    let blob = c.encode_at(&record(), T0).unwrap();
    assert_eq!(c.decode_at(&blob, T0).unwrap(), record());
}

#[test]
fn roundtrip_with_current_clock() {
    let c = codec();
    let blob = c.encode(&record()).unwrap();
    assert_eq!(c.decode(&blob).unwrap(), record());
}

#[test]
fn seven_day_window_is_180_hours() {
    assert_eq!(codec().window_hours(), 180);
}

#[test]
fn decodes_179_hours_later_and_earlier() {
    let c = codec();
    let blob = c.encode_at(&record(), T0).unwrap();
    assert_eq!(c.decode_at(&blob, T0 + 179.0 * HOUR).unwrap(), record());
    assert_eq!(c.decode_at(&blob, T0 - 179.0 * HOUR).unwrap(), record());
}

#[test]
fn decodes_at_window_edge() {
    let c = codec();
    let blob = c.encode_at(&record(), T0).unwrap();
    assert!(c.decode_at(&blob, T0 + 180.0 * HOUR).is_some());
    assert!(c.decode_at(&blob, T0 - 180.0 * HOUR).is_some());
}

#[test]
fn fails_one_hour_past_window() {
    let c = codec();
    let blob = c.encode_at(&record(), T0).unwrap();
    assert!(c.decode_at(&blob, T0 + 181.0 * HOUR).is_none());
    assert!(c.decode_at(&blob, T0 - 181.0 * HOUR).is_none());
}

#[test]
fn blob_is_not_plaintext() {
    let blob = codec().encode_at(&record(), T0).unwrap();
    let text = String::from_utf8_lossy(&blob);
    assert!(!text.contains("authorized"));
    assert!(blob.len() > HEADER_SIZE);
}

#[test]
fn encoding_differs_across_hours() {
    let c = codec();
    let a = c.encode_at(&record(), T0).unwrap();
    let b = c.encode_at(&record(), T0 + HOUR).unwrap();
    assert_ne!(a, b);
}

#[test]
fn wrong_device_cannot_decode() {
    let blob = codec().encode_at(&record(), T0).unwrap();
    let other = ObfuscationCodec::new(SERVER, "ffffffffffffffffffffffffffffffff", 7);
    assert!(other.decode_at(&blob, T0).is_none());
}

#[test]
fn wrong_server_cannot_decode() {
    let blob = codec().encode_at(&record(), T0).unwrap();
    let other = ObfuscationCodec::new("http://elsewhere", DEVICE, 7);
    assert!(other.decode_at(&blob, T0).is_none());
}

#[test]
fn short_blobs_fail_fast() {
    let c = codec();
    assert!(c.decode_at(&[], T0).is_none());
    assert!(c.decode_at(&[0u8; HEADER_SIZE - 1], T0).is_none());
}

#[test]
fn truncated_blob_fails() {
    let c = codec();
    let blob = c.encode_at(&record(), T0).unwrap();
    assert!(c.decode_at(&blob[..blob.len() - 1], T0).is_none());
}

#[test]
fn empty_plaintext_roundtrips() {
    let c = codec();
    let blob = c.encode_at(b"", T0).unwrap();
    assert_eq!(c.decode_at(&blob, T0).unwrap(), b"");
}

#[test]
fn single_byte_flips_are_rejected() {
    let c = codec();
    let blob = c.encode_at(&record(), T0).unwrap();

    let mut attempts = 0usize;
    let mut rejected = 0usize;
    for pos in 0..blob.len() {
        for mask in [0x01u8, 0x80, 0xFF] {
            let mut tampered = blob.clone();
            tampered[pos] ^= mask;
            attempts += 1;
            if c.decode_at(&tampered, T0).is_none() {
                rejected += 1;
            }
        }
    }
    assert!(
        rejected * 100 >= attempts * 99,
        "only {rejected} of {attempts} flips rejected"
    );
}

#[test]
fn large_payload_roundtrips() {
    let c = codec();
    let plaintext: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let blob = c.encode_at(&plaintext, T0).unwrap();
    assert_eq!(c.decode_at(&blob, T0 + 3.0 * HOUR).unwrap(), plaintext);
}
