//! Credential lifecycle: password hashing, client-secret encryption and
//! signed-token mint/verify.
//!
//! Hashing and encryption failures are configuration-level problems (bad
//! master secret, broken RNG) and are surfaced as hard errors; token
//! verification failures are recoverable and leave the caller anonymous.

use aes::Aes256;
use aes::cipher::{KeyIvInit, StreamCipher};
use anyhow::{Context, Result, anyhow};
use argon2::{
    Argon2, PasswordHasher, PasswordVerifier,
    password_hash::{PasswordHash, SaltString, rand_core::OsRng as SaltRng},
};
use ctr::Ctr128BE;
use rand::{RngCore, rngs::OsRng};

mod token;

pub use token::{SubjectKind, TokenClaims, TokenError, mint_token, verify_token};

type Aes256Ctr = Ctr128BE<Aes256>;

/// Separator between the IV and the ciphertext in stored secrets.
const SECRET_SEPARATOR: &str = "|.|";

/// Fixed salt for deriving the secret-encryption key from the master secret.
/// Per-secret randomness comes from the IV, not the key.
const KDF_SALT: &[u8] = b"vigilo/secret-key/v1";

const IV_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Hash a plaintext credential with a fresh random salt.
///
/// Used for user passwords and for long-lived client access tokens; the
/// plaintext is never stored, only this verifying hash.
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_password(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut SaltRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("password hashing failed: {err}"))
}

/// Verify a plaintext credential against a stored hash.
///
/// An unparseable hash verifies as `false` rather than erroring; a corrupt
/// stored hash must never grant access.
#[must_use]
pub fn verify_password(plaintext: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Derive the 256-bit secret-encryption key from the master secret.
fn derive_key(master_secret: &str) -> Result<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(master_secret.as_bytes(), KDF_SALT, &mut key)
        .map_err(|err| anyhow!("key derivation failed: {err}"))?;
    Ok(key)
}

/// Encrypt a client secret with AES-256-CTR under a key derived from the
/// master secret.
///
/// Returns `<iv hex>|.|<ciphertext hex>`. A fresh 16-byte IV is generated per
/// call, so encrypting the same secret twice yields different ciphertexts.
///
/// # Errors
/// Returns an error if key derivation or IV generation fails.
pub fn encrypt_secret(plaintext: &str, master_secret: &str) -> Result<String> {
    let key = derive_key(master_secret)?;

    let mut iv = [0u8; IV_LEN];
    OsRng
        .try_fill_bytes(&mut iv)
        .context("failed to generate secret IV")?;

    let mut buf = plaintext.as_bytes().to_vec();
    let mut cipher = Aes256Ctr::new(&key.into(), &iv.into());
    cipher.apply_keystream(&mut buf);

    Ok(format!(
        "{}{SECRET_SEPARATOR}{}",
        hex::encode(iv),
        hex::encode(buf)
    ))
}

/// Decrypt a stored `<iv hex>|.|<ciphertext hex>` secret.
///
/// # Errors
/// Returns an error if the stored value is malformed or the master secret
/// does not produce valid UTF-8 plaintext.
pub fn decrypt_secret(stored: &str, master_secret: &str) -> Result<String> {
    let (iv_hex, cipher_hex) = stored
        .split_once(SECRET_SEPARATOR)
        .ok_or_else(|| anyhow!("malformed encrypted secret: missing separator"))?;

    let iv: [u8; IV_LEN] = hex::decode(iv_hex)
        .context("malformed encrypted secret: invalid IV encoding")?
        .try_into()
        .map_err(|_| anyhow!("malformed encrypted secret: bad IV length"))?;

    let mut buf =
        hex::decode(cipher_hex).context("malformed encrypted secret: invalid ciphertext")?;

    let key = derive_key(master_secret)?;
    let mut cipher = Aes256Ctr::new(&key.into(), &iv.into());
    cipher.apply_keystream(&mut buf);

    String::from_utf8(buf).context("decrypted secret is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_and_verify() -> Result<()> {
        let hash = hash_password("hunter2")?;
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        Ok(())
    }

    #[test]
    fn password_hashes_are_salted() -> Result<()> {
        let first = hash_password("hunter2")?;
        let second = hash_password("hunter2")?;
        assert_ne!(first, second);
        assert!(verify_password("hunter2", &first));
        assert!(verify_password("hunter2", &second));
        Ok(())
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(!verify_password("hunter2", "not-a-phc-string"));
    }

    #[test]
    fn encrypt_decrypt_round_trip() -> Result<()> {
        let stored = encrypt_secret("s3cret-value", "master")?;
        assert_eq!(decrypt_secret(&stored, "master")?, "s3cret-value");
        Ok(())
    }

    #[test]
    fn fresh_iv_per_secret() -> Result<()> {
        let first = encrypt_secret("same-secret", "master")?;
        let second = encrypt_secret("same-secret", "master")?;
        assert_ne!(first, second);
        assert_eq!(decrypt_secret(&first, "master")?, "same-secret");
        assert_eq!(decrypt_secret(&second, "master")?, "same-secret");
        Ok(())
    }

    #[test]
    fn stored_format_is_iv_separator_cipher() -> Result<()> {
        let stored = encrypt_secret("abc", "master")?;
        let (iv_hex, cipher_hex) = stored.split_once("|.|").expect("separator");
        assert_eq!(iv_hex.len(), IV_LEN * 2);
        assert_eq!(cipher_hex.len(), "abc".len() * 2);
        assert!(iv_hex.chars().all(|c| c.is_ascii_hexdigit()));
        Ok(())
    }

    #[test]
    fn decrypt_rejects_malformed_input() {
        assert!(decrypt_secret("deadbeef", "master").is_err());
        assert!(decrypt_secret("zz|.|00", "master").is_err());
        assert!(decrypt_secret("00ff|.|00", "master").is_err());
    }

    #[test]
    fn wrong_master_secret_does_not_round_trip() -> Result<()> {
        let stored = encrypt_secret("s3cret-value", "master")?;
        let decrypted = decrypt_secret(&stored, "other-master");
        // CTR decryption with the wrong key yields garbage; either invalid
        // UTF-8 or a different string, never the original plaintext.
        if let Ok(plain) = decrypted {
            assert_ne!(plain, "s3cret-value");
        }
        Ok(())
    }
}
