//! The digest that input signatures commit to, and ECDSA verification.
//!
//! A signature over an input commits to the output being spent: the
//! outpoint, the lock kind tag, and the locking parameters, hashed with
//! sha256d. The input's own unlocking field is excluded, which breaks
//! the circularity of a signature signing itself.

use lazy_static::lazy_static;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, Signature};
use thiserror::Error;

use crate::serialization::sha256d;
use crate::transparent::{LockScript, OutPoint};
use crate::ThunderboltSerialize;

lazy_static! {
    static ref SECP: Secp256k1<secp256k1::All> = Secp256k1::new();
}

/// An error related to a signature or its key material.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed public key")]
    InvalidKey,
    #[error("malformed signature encoding")]
    InvalidSignature,
    #[error("signature does not verify against the key")]
    Failed,
}

/// Compute the digest an input's signature must commit to: the spent
/// outpoint followed by the serialized lock it satisfies.
pub fn signing_digest(outpoint: &OutPoint, lock: &LockScript) -> [u8; 32] {
    let mut data = Vec::with_capacity(OutPoint::len() + lock.serialized_size());
    outpoint
        .thunderbolt_serialize(&mut data)
        .expect("serializing to a Vec is infallible");
    lock.thunderbolt_serialize(&mut data)
        .expect("serializing to a Vec is infallible");
    sha256d::digest(&data)
}

/// Verify a 64-byte compact ECDSA signature over `digest` against a
/// serialized secp256k1 public key (compressed or uncompressed).
pub fn verify(digest: &[u8; 32], public_key: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
    let key = PublicKey::from_slice(public_key).map_err(|_| SignatureError::InvalidKey)?;
    let signature =
        Signature::from_compact(signature).map_err(|_| SignatureError::InvalidSignature)?;
    let message = Message::from_slice(digest).expect("digest is exactly 32 bytes");

    SECP.verify(&message, &signature, &key)
        .map_err(|_| SignatureError::Failed)
}

/// Produce a 64-byte compact signature over `digest`.
///
/// Used by the work-template builder's tests and the wallet seam; the
/// consensus paths only ever verify.
pub fn sign(digest: &[u8; 32], secret_key: &SecretKey) -> [u8; 64] {
    let message = Message::from_slice(digest).expect("digest is exactly 32 bytes");
    SECP.sign(&message, secret_key).serialize_compact()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction;
    use crate::transparent::LockScript;

    fn test_key() -> (SecretKey, PublicKey) {
        let secret = SecretKey::from_slice(&[0x42u8; 32]).expect("constant key is valid");
        let public = PublicKey::from_secret_key(&SECP, &secret);
        (secret, public)
    }

    #[test]
    fn sign_then_verify() {
        let (secret, public) = test_key();
        let outpoint = OutPoint {
            tx_id: transaction::Hash([9u8; 32]),
            index: 1,
        };
        let lock = LockScript::single_sig(public.serialize().to_vec());

        let digest = signing_digest(&outpoint, &lock);
        let signature = sign(&digest, &secret);

        assert_eq!(verify(&digest, &public.serialize(), &signature), Ok(()));
    }

    #[test]
    fn verify_rejects_wrong_digest() {
        let (secret, public) = test_key();
        let digest = [3u8; 32];
        let signature = sign(&digest, &secret);

        let other_digest = [4u8; 32];
        assert_eq!(
            verify(&other_digest, &public.serialize(), &signature),
            Err(SignatureError::Failed)
        );
    }

    #[test]
    fn verify_rejects_garbage_key() {
        let digest = [3u8; 32];
        assert_eq!(
            verify(&digest, &[0u8; 33], &[0u8; 64]),
            Err(SignatureError::InvalidKey)
        );
    }
}
