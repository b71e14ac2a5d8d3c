// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM seal/open and the two key-derivation paths.
//!
//! Every call to [`encrypt`] generates a fresh random 96-bit IV via the system
//! CSPRNG. IV reuse under one key would be catastrophic for GCM security.
//!
//! Two deliberately different derivations exist:
//! - [`derive_direct_key`] for vault keys: a base64 blob of exactly 32 bytes
//!   is used verbatim, anything else is hashed once with SHA-256.
//! - [`derive_from_password`] for locked artifacts: PBKDF2-HMAC-SHA256 with a
//!   random per-blob salt.

use std::num::NonZeroU32;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cloak_core::CloakError;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use ring::{digest, pbkdf2};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

/// Vault and blob keys are 256 bits.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length (96 bits).
pub const IV_LEN: usize = 12;

/// PBKDF2 salt length for locked artifacts.
pub const SALT_LEN: usize = 16;

/// GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// PBKDF2 iteration count for locked artifacts. Part of the artifact format.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Turn key material into a 32-byte key.
///
/// Base64 that decodes to exactly 32 bytes is trusted as a generated key;
/// anything else (a human password, odd-length base64) is SHA-256 hashed.
pub fn derive_direct_key(material: &str) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    if let Ok(decoded) = STANDARD.decode(material)
        && decoded.len() == KEY_LEN
    {
        let decoded = Zeroizing::new(decoded);
        key.copy_from_slice(&decoded);
        return key;
    }
    let hash = digest::digest(&digest::SHA256, material.as_bytes());
    key.copy_from_slice(hash.as_ref());
    key
}

/// Encode a raw key the way key providers store it.
pub fn encode_key(key: &[u8; KEY_LEN]) -> SecretString {
    SecretString::from(STANDARD.encode(key))
}

/// Derive a 32-byte key from a password with PBKDF2-HMAC-SHA256.
pub fn derive_from_password(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CloakError> {
    let iterations = NonZeroU32::new(iterations)
        .ok_or_else(|| CloakError::Internal("PBKDF2 iterations must be non-zero".to_string()))?;
    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password,
        out.as_mut(),
    );
    Ok(out)
}

/// Encrypt plaintext with AES-256-GCM under a fresh random IV.
///
/// Returns `(ciphertext_with_tag, iv)`. Both must be stored to decrypt later.
pub fn encrypt(
    plaintext: &[u8],
    key: &[u8; KEY_LEN],
) -> Result<(Vec<u8>, [u8; IV_LEN]), CloakError> {
    let sealing_key = aes_key(key)?;
    let iv: [u8; IV_LEN] = random_bytes()?;
    let nonce = Nonce::assume_unique_for_key(iv);

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CloakError::Internal("AES-256-GCM encryption failed".to_string()))?;

    Ok((in_out, iv))
}

/// Decrypt AES-256-GCM ciphertext (tag appended).
///
/// A tag mismatch (wrong key, tampered data) is `AuthFailed`; no partial
/// plaintext is ever returned.
pub fn decrypt(ciphertext: &[u8], iv: &[u8], key: &[u8; KEY_LEN]) -> Result<Vec<u8>, CloakError> {
    let iv: [u8; IV_LEN] = iv.try_into().map_err(|_| {
        CloakError::MalformedInput(format!("IV must be {IV_LEN} bytes, got {}", iv.len()))
    })?;
    let opening_key = aes_key(key)?;
    let nonce = Nonce::assume_unique_for_key(iv);

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| {
            CloakError::AuthFailed("decryption failed -- wrong key or corrupted data".to_string())
        })?;

    Ok(plaintext.to_vec())
}

/// Encrypt a whole buffer under a password: `salt(16) || iv(12) || ciphertext`.
pub fn encrypt_blob(data: &[u8], password: &SecretString) -> Result<Vec<u8>, CloakError> {
    let salt: [u8; SALT_LEN] = random_bytes()?;
    let key = derive_from_password(password.expose_secret().as_bytes(), &salt, PBKDF2_ITERATIONS)?;
    let (ciphertext, iv) = encrypt(data, &key)?;

    let mut blob = Vec::with_capacity(SALT_LEN + IV_LEN + ciphertext.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Reverse [`encrypt_blob`].
///
/// Buffers too short to hold salt, IV, and tag fail with `MalformedInput`
/// before any key derivation; a wrong password is `AuthFailed`.
pub fn decrypt_blob(
    blob: &[u8],
    password: &SecretString,
) -> Result<Zeroizing<Vec<u8>>, CloakError> {
    let min_len = SALT_LEN + IV_LEN + TAG_LEN;
    if blob.len() < min_len {
        return Err(CloakError::MalformedInput(format!(
            "encrypted blob is {} bytes, need at least {min_len}",
            blob.len()
        )));
    }

    let (salt, rest) = blob.split_at(SALT_LEN);
    let (iv, ciphertext) = rest.split_at(IV_LEN);
    let key = derive_from_password(password.expose_secret().as_bytes(), salt, PBKDF2_ITERATIONS)?;

    decrypt(ciphertext, iv, &key)
        .map(Zeroizing::new)
        .map_err(|err| match err {
            CloakError::AuthFailed(_) => {
                CloakError::AuthFailed("wrong password or corrupted locked vault".to_string())
            }
            other => other,
        })
}

/// Generate a random 32-byte vault key.
pub fn generate_key() -> Result<Zeroizing<[u8; KEY_LEN]>, CloakError> {
    Ok(Zeroizing::new(random_bytes()?))
}

fn random_bytes<const N: usize>() -> Result<[u8; N], CloakError> {
    let mut buf = [0u8; N];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| CloakError::Internal("system random number generator failed".to_string()))?;
    Ok(buf)
}

fn aes_key(key: &[u8; KEY_LEN]) -> Result<LessSafeKey, CloakError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| CloakError::Internal("failed to create AES-256-GCM key".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Zeroizing<[u8; KEY_LEN]> {
        generate_key().unwrap()
    }

    #[test]
    fn roundtrip_edge_values() {
        let key = key();
        let big = "x".repeat(100 * 1024);
        for value in ["", "héllo wörld 🔑", big.as_str()] {
            let (ciphertext, iv) = encrypt(value.as_bytes(), &key).unwrap();
            let plaintext = decrypt(&ciphertext, &iv, &key).unwrap();
            assert_eq!(plaintext, value.as_bytes());
        }
    }

    #[test]
    fn same_plaintext_gets_fresh_iv_and_ciphertext() {
        let key = key();
        let (ct1, iv1) = encrypt(b"same input twice", &key).unwrap();
        let (ct2, iv2) = encrypt(b"same input twice", &key).unwrap();
        assert_ne!(iv1, iv2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn wrong_key_is_auth_failure() {
        let (ciphertext, iv) = encrypt(b"secret data", &key()).unwrap();
        let err = decrypt(&ciphertext, &iv, &key()).unwrap_err();
        assert!(matches!(err, CloakError::AuthFailed(_)));
    }

    #[test]
    fn tampered_ciphertext_is_auth_failure() {
        let key = key();
        let (mut ciphertext, iv) = encrypt(b"do not tamper", &key).unwrap();
        ciphertext[0] ^= 0x01;
        assert!(matches!(
            decrypt(&ciphertext, &iv, &key),
            Err(CloakError::AuthFailed(_))
        ));
    }

    #[test]
    fn short_iv_is_malformed() {
        let key = key();
        let (ciphertext, _) = encrypt(b"abc", &key).unwrap();
        assert!(matches!(
            decrypt(&ciphertext, &[0u8; 8], &key),
            Err(CloakError::MalformedInput(_))
        ));
    }

    #[test]
    fn ciphertext_carries_gcm_tag() {
        let (ciphertext, _) = encrypt(b"hello", &key()).unwrap();
        assert_eq!(ciphertext.len(), 5 + TAG_LEN);
    }

    #[test]
    fn direct_key_passes_32_byte_base64_through() {
        let raw = [7u8; KEY_LEN];
        let encoded = STANDARD.encode(raw);
        assert_eq!(*derive_direct_key(&encoded), raw);
    }

    #[test]
    fn direct_key_hashes_everything_else() {
        let hashed = derive_direct_key("correct horse battery staple");
        let expected = digest::digest(&digest::SHA256, b"correct horse battery staple");
        assert_eq!(hashed.as_slice(), expected.as_ref());

        // Valid base64, wrong length: hashed, not decoded.
        let short = STANDARD.encode([1u8; 16]);
        let expected = digest::digest(&digest::SHA256, short.as_bytes());
        assert_eq!(derive_direct_key(&short).as_slice(), expected.as_ref());
    }

    #[test]
    fn encode_key_roundtrips_through_direct_derivation() {
        let key = key();
        let encoded = encode_key(&key);
        assert_eq!(*derive_direct_key(encoded.expose_secret()), *key);
    }

    #[test]
    fn password_derivation_depends_on_salt() {
        let a = derive_from_password(b"pw", &[1u8; SALT_LEN], 1_000).unwrap();
        let b = derive_from_password(b"pw", &[1u8; SALT_LEN], 1_000).unwrap();
        let c = derive_from_password(b"pw", &[2u8; SALT_LEN], 1_000).unwrap();
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn blob_roundtrip_and_layout() {
        let password = SecretString::from("travel password".to_string());
        let blob = encrypt_blob(b"payload bytes", &password).unwrap();
        assert_eq!(blob.len(), SALT_LEN + IV_LEN + 13 + TAG_LEN);
        let data = decrypt_blob(&blob, &password).unwrap();
        assert_eq!(data.as_slice(), b"payload bytes");
    }

    #[test]
    fn blob_wrong_password_is_auth_failure() {
        let blob = encrypt_blob(b"payload", &SecretString::from("right".to_string())).unwrap();
        let err = decrypt_blob(&blob, &SecretString::from("wrong".to_string())).unwrap_err();
        assert!(matches!(err, CloakError::AuthFailed(_)));
    }

    #[test]
    fn short_blob_is_malformed() {
        let password = SecretString::from("pw".to_string());
        let err = decrypt_blob(&[0u8; SALT_LEN + IV_LEN + TAG_LEN - 1], &password).unwrap_err();
        assert!(matches!(err, CloakError::MalformedInput(_)));
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(64))]

        #[test]
        fn roundtrip_any_bytes(data in proptest::collection::vec(proptest::num::u8::ANY, 0..2048)) {
            let key = key();
            let (ciphertext, iv) = encrypt(&data, &key).unwrap();
            proptest::prop_assert_eq!(decrypt(&ciphertext, &iv, &key).unwrap(), data);
        }
    }
}
