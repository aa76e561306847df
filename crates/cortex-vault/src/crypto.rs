// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM sealing with a fresh random nonce per message.

use cortex_core::CortexError;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

/// Ciphertext (with the GCM tag appended) and the nonce needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

fn aead_key(key: &[u8; 32]) -> Result<LessSafeKey, CortexError> {
    UnboundKey::new(&AES_256_GCM, key)
        .map(LessSafeKey::new)
        .map_err(|_| CortexError::Vault("invalid AES-256-GCM key".to_string()))
}

/// Fill an array from the system CSPRNG.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], CortexError> {
    let mut out = [0u8; N];
    SystemRandom::new()
        .fill(&mut out)
        .map_err(|_| CortexError::Vault("system random source unavailable".to_string()))?;
    Ok(out)
}

/// Encrypt `plaintext` under `key`.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<SealedBox, CortexError> {
    let nonce = random_bytes::<NONCE_LEN>()?;
    let mut buf = plaintext.to_vec();
    aead_key(key)?
        .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut buf)
        .map_err(|_| CortexError::Vault("encryption failed".to_string()))?;
    Ok(SealedBox {
        ciphertext: buf,
        nonce,
    })
}

/// Decrypt a [`SealedBox`]. Fails on a wrong key or tampered data.
pub fn open(key: &[u8; 32], sealed: &SealedBox) -> Result<Vec<u8>, CortexError> {
    let mut buf = sealed.ciphertext.clone();
    let plaintext = aead_key(key)?
        .open_in_place(
            Nonce::assume_unique_for_key(sealed.nonce),
            Aad::empty(),
            &mut buf,
        )
        .map_err(|_| CortexError::Vault("decryption failed: wrong key or corrupted data".to_string()))?;
    Ok(plaintext.to_vec())
}
