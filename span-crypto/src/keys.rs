use ed25519_dalek::{Signer, Verifier};
use span_types::error::SpanError;
use span_types::primitives::{Address, PublicKey, Signature};

use crate::address::pubkey_to_address;

/// Validator signing key.
pub struct Keypair {
    inner: ed25519_dalek::SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Create a keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// Parse a hex-encoded 32-byte seed.
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self, SpanError> {
        let digits = seed_hex.strip_prefix("0x").unwrap_or(seed_hex);
        let bytes = hex::decode(digits).map_err(|_| SpanError::InvalidKeyMaterial)?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SpanError::InvalidKeyMaterial)?;
        Ok(Self::from_seed(&seed))
    }

    /// Get the public key bytes.
    pub fn public_key(&self) -> PublicKey {
        self.inner.verifying_key().to_bytes()
    }

    /// Address of this key.
    pub fn address(&self) -> Address {
        pubkey_to_address(&self.public_key())
    }

    /// Get the 32-byte seed (secret key bytes) of this keypair.
    pub fn seed(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Sign a message, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.inner.sign(message).to_bytes()
    }
}

/// Verify an Ed25519 signature.
pub fn verify(message: &[u8], signature: &Signature, pubkey: &PublicKey) -> Result<(), SpanError> {
    let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(pubkey)
        .map_err(|_| SpanError::InvalidKeyMaterial)?;
    let sig = ed25519_dalek::Signature::from_bytes(signature);
    verifying_key
        .verify(message, &sig)
        .map_err(|_| SpanError::InvalidSignature { signer_index: 0 })
}

/// Batch-verify signatures. Returns `Ok(())` when every signature is valid,
/// otherwise the index of the first invalid one.
///
/// Runs ed25519-dalek batch verification first and falls back to checking
/// each signature when the batch fails.
pub fn batch_verify(
    messages: &[&[u8]],
    signatures: &[Signature],
    pubkeys: &[PublicKey],
) -> Result<(), SpanError> {
    if messages.len() != signatures.len() || messages.len() != pubkeys.len() {
        return Err(SpanError::InvalidSignature { signer_index: 0 });
    }
    if messages.is_empty() {
        return Ok(());
    }

    let mut verifying_keys = Vec::with_capacity(pubkeys.len());
    let mut dalek_sigs = Vec::with_capacity(signatures.len());
    for (i, (pk, sig)) in pubkeys.iter().zip(signatures.iter()).enumerate() {
        let vk = ed25519_dalek::VerifyingKey::from_bytes(pk)
            .map_err(|_| SpanError::InvalidSignature { signer_index: i })?;
        verifying_keys.push(vk);
        dalek_sigs.push(ed25519_dalek::Signature::from_bytes(sig));
    }

    if ed25519_dalek::verify_batch(messages, &dalek_sigs, &verifying_keys).is_ok() {
        return Ok(());
    }

    for (i, ((msg, sig), vk)) in messages
        .iter()
        .zip(dalek_sigs.iter())
        .zip(verifying_keys.iter())
        .enumerate()
    {
        if vk.verify(msg, sig).is_err() {
            return Err(SpanError::InvalidSignature { signer_index: i });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let kp = Keypair::generate();
        let msg = b"attest lock 5";
        let sig = kp.sign(msg);
        assert!(verify(msg, &sig, &kp.public_key()).is_ok());
    }

    #[test]
    fn test_corrupted_signature_rejected() {
        let kp = Keypair::generate();
        let mut sig = kp.sign(b"attest lock 5");
        sig[0] ^= 0xff;
        assert!(verify(b"attest lock 5", &sig, &kp.public_key()).is_err());
        assert!(verify(b"attest lock 6", &kp.sign(b"attest lock 5"), &kp.public_key()).is_err());
    }

    #[test]
    fn test_from_seed_hex() {
        let kp = Keypair::from_seed_hex(&"2a".repeat(32)).unwrap();
        assert_eq!(kp.public_key(), Keypair::from_seed(&[0x2a; 32]).public_key());
        assert_eq!(kp.address(), pubkey_to_address(&kp.public_key()));
        assert!(Keypair::from_seed_hex("abcd").is_err());
        assert!(Keypair::from_seed_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_batch_verify_reports_bad_index() {
        let kp1 = Keypair::from_seed(&[1u8; 32]);
        let kp2 = Keypair::from_seed(&[2u8; 32]);
        let sig1 = kp1.sign(b"one");
        let mut sig2 = kp2.sign(b"two");
        assert!(batch_verify(
            &[b"one".as_slice(), b"two".as_slice()],
            &[sig1, sig2],
            &[kp1.public_key(), kp2.public_key()],
        )
        .is_ok());

        sig2[0] ^= 0xff;
        let err = batch_verify(
            &[b"one".as_slice(), b"two".as_slice()],
            &[sig1, sig2],
            &[kp1.public_key(), kp2.public_key()],
        )
        .unwrap_err();
        assert_eq!(err, SpanError::InvalidSignature { signer_index: 1 });
    }
}
