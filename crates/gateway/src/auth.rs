//! Caller identity verification
//!
//! The registry's trust model requires every mutating call to carry a
//! verifiable identity: an ed25519 verifying key (base58) plus a
//! signature (base64) over the canonical command bytes. The verified
//! key bytes become the caller's `ClientId`/`MemberId`; the registry
//! never sees an unauthenticated identity.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use thiserror::Error;

/// Signature verification errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid signer key: {0}")]
    InvalidSigner(String),

    #[error("Invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("Signature does not match signer and payload")]
    VerificationFailed,
}

/// Verify `signature` over `message` and return the signer's identity.
pub fn verify_signer(
    signer: &str,
    signature: &str,
    message: &[u8],
) -> Result<[u8; 32], AuthError> {
    let key_bytes: [u8; 32] = bs58::decode(signer)
        .into_vec()
        .map_err(|e| AuthError::InvalidSigner(e.to_string()))?
        .try_into()
        .map_err(|_| AuthError::InvalidSigner("expected 32 bytes".to_string()))?;

    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| AuthError::InvalidSigner(e.to_string()))?;

    let sig_bytes = BASE64
        .decode(signature)
        .map_err(|e| AuthError::InvalidSignature(e.to_string()))?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| AuthError::InvalidSignature(e.to_string()))?;

    verifying_key
        .verify(message, &signature)
        .map_err(|_| AuthError::VerificationFailed)?;

    Ok(key_bytes)
}
