use atelier_common::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;
use subtle::ConstantTimeEq;

const PBKDF2_ITERATIONS: u32 = 600_000;
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32; // 256 bits
const SCHEME: &str = "pbkdf2-sha256";

/// Hash a plaintext password into a self-describing encoded string:
/// `pbkdf2-sha256$<iterations>$<salt b64>$<derived b64>`.
///
/// The iteration count is part of the encoding, so stored hashes keep
/// verifying after the default changes.
pub fn hash(plaintext: &str) -> Result<String> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| Error::Auth("failed to generate password salt".into()))?;

    let derived = derive(plaintext, &salt, PBKDF2_ITERATIONS);
    Ok(format!(
        "{SCHEME}${PBKDF2_ITERATIONS}${}${}",
        BASE64.encode(salt),
        BASE64.encode(derived)
    ))
}

/// Verify a plaintext password against an encoded hash. Malformed
/// encodings verify as `false` rather than erroring.
pub fn verify(plaintext: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    if scheme != SCHEME {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    if iterations == 0 {
        return false;
    }
    let (Ok(salt), Ok(expected)) = (BASE64.decode(salt), BASE64.decode(expected)) else {
        return false;
    };

    let derived = derive(plaintext, &salt, iterations);
    derived.as_slice().ct_eq(expected.as_slice()).into()
}

fn derive(plaintext: &str, salt: &[u8], iterations: u32) -> Vec<u8> {
    let iterations = NonZeroU32::new(iterations).expect("iterations > 0");
    let mut out = vec![0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        plaintext.as_bytes(),
        &mut out,
    );
    out
}

#[cfg(test)]
mod tests {
    use super::{hash, verify};

    #[test]
    fn hash_verify_round_trip() {
        let encoded = hash("correct horse battery staple").expect("hash should succeed");

        assert_ne!(encoded, "correct horse battery staple");
        assert!(encoded.starts_with("pbkdf2-sha256$"));
        assert!(verify("correct horse battery staple", &encoded));
    }

    #[test]
    fn wrong_password_fails() {
        let encoded = hash("password-one").expect("hash should succeed");
        assert!(!verify("password-two", &encoded));
    }

    #[test]
    fn same_password_hashes_differently() {
        let first = hash("repeat-me").expect("first hash should succeed");
        let second = hash("repeat-me").expect("second hash should succeed");
        assert_ne!(first, second); // fresh salt each time
    }

    #[test]
    fn malformed_encodings_verify_false() {
        assert!(!verify("anything", ""));
        assert!(!verify("anything", "plaintext"));
        assert!(!verify("anything", "pbkdf2-sha256$notanumber$AA==$AA=="));
        assert!(!verify("anything", "md5$1000$AA==$AA=="));
        assert!(!verify("anything", "pbkdf2-sha256$0$AA==$AA=="));
    }
}
