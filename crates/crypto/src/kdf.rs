//! Key derivation functions
//!
//! `vault_key_from_password` — Argon2id, derives the 32-byte key used to
//!   encrypt the local SQLite vault.
//!
//! `hkdf_expand` — HKDF-SHA256, general-purpose expansion (used by X3DH).
//!
//! `kdf_rk` / `kdf_ck` — the Double Ratchet's two derivation steps:
//!   KDF_RK mixes a DH ratchet output into the root key, producing a new
//!   root key and a fresh chain key for that direction; KDF_CK advances a
//!   chain key and derives the per-message key. These are kept in one
//!   place so the ratchet module never re-implements its own HKDF
//!   plumbing.

use argon2::{Argon2, Params, Version};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

// ── Vault key (Argon2id) ──────────────────────────────────────────────────────

/// 32-byte vault key derived from user password. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct VaultKey(pub [u8; 32]);

/// Argon2id parameters — tuned for interactive (desktop) use.
fn argon2_params() -> Params {
    Params::new(
        64 * 1024, // m_cost: 64 MiB
        3,         // t_cost: 3 iterations
        1,         // p_cost: 1 thread
        Some(32),  // output len
    )
    .expect("Static Argon2 params are always valid")
}

/// Derive a vault key from a user password + 16-byte salt.
/// The salt should be stored alongside the encrypted vault (not secret).
pub fn vault_key_from_password(password: &[u8], salt: &[u8; 16]) -> Result<VaultKey, CryptoError> {
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon2_params());
    let mut output = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(VaultKey(output))
}

/// Generate a fresh random 16-byte salt (call once on first run; store in DB).
pub fn generate_salt() -> [u8; 16] {
    use rand::RngCore;
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

// ── HKDF-SHA256 ───────────────────────────────────────────────────────────────

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
///
/// `salt` may be empty (HKDF will use a zeroed salt).
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

// ── Double Ratchet KDFs (per the Signal spec naming) ─────────────────────────

/// KDF_RK: root key derivation from a DH ratchet output.
/// Returns (new_root_key, new_chain_key) for the direction this step serves.
pub fn kdf_rk(root_key: &[u8; 32], dh_output: &[u8]) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(root_key), dh_output);
    let mut new_rk = [0u8; 32];
    let mut new_ck = [0u8; 32];
    hk.expand(b"rc-ratchet-rk", &mut new_rk)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    hk.expand(b"rc-ratchet-ck", &mut new_ck)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok((new_rk, new_ck))
}

/// KDF_CK: chain key → (next_chain_key, message_key).
pub fn kdf_ck(chain_key: &[u8; 32]) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    use hmac::{Hmac, Mac};
    type HmacSha256 = Hmac<Sha256>;

    let mut mac_ck = HmacSha256::new_from_slice(chain_key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    mac_ck.update(&[0x01]);
    let new_ck: [u8; 32] = mac_ck.finalize().into_bytes().into();

    let mut mac_mk = HmacSha256::new_from_slice(chain_key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    mac_mk.update(&[0x02]);
    let mk: [u8; 32] = mac_mk.finalize().into_bytes().into();

    Ok((new_ck, mk))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kdf_ck_is_deterministic_and_advances() {
        let ck = [5u8; 32];
        let (ck1, mk1) = kdf_ck(&ck).unwrap();
        let (ck1_again, mk1_again) = kdf_ck(&ck).unwrap();
        assert_eq!(ck1, ck1_again);
        assert_eq!(mk1, mk1_again);
        assert_ne!(ck1, mk1);

        let (ck2, mk2) = kdf_ck(&ck1).unwrap();
        assert_ne!(ck2, ck1);
        assert_ne!(mk2, mk1);
    }

    #[test]
    fn kdf_rk_mixes_dh_output() {
        let rk = [1u8; 32];
        let (new_rk_a, ck_a) = kdf_rk(&rk, b"dh-output-a").unwrap();
        let (new_rk_b, ck_b) = kdf_rk(&rk, b"dh-output-b").unwrap();
        assert_ne!(new_rk_a, new_rk_b);
        assert_ne!(ck_a, ck_b);
    }
}
