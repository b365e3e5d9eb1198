//! The signer module wraps message signing and signer recovery. Both sides apply
//! [hash_with_prefix] before touching the curve, so a signature produced by [ChannelSigner::sign]
//! always recovers to the signer's address through [recover].

use crate::codec::hash_with_prefix;
use anyhow::Result;
use async_trait::async_trait;
use ethers::{
    signers::{LocalWallet, Signer},
    types::{Address, Bytes, Signature, H256, U256},
};
use thiserror::Error;

/// The length of an encoded signature: `r (32) || s (32) || v (1)`.
pub const SIGNATURE_LENGTH: usize = 65;

/// Recovery failed because the signature bytes are not a valid 65 byte recoverable signature.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid signature format: {0}")]
pub struct InvalidSignatureFormat(pub String);

/// The [ChannelSigner] trait abstracts the identity that signs state updates. Signing may
/// suspend, e.g. while waiting on a hardware wallet or an interactive confirmation.
#[async_trait]
pub trait ChannelSigner: Send + Sync {
    /// The address that signatures produced by this signer recover to.
    fn address(&self) -> Address;

    /// Signs `hash` after applying the signed-message prefix.
    ///
    /// ### Returns
    /// - `Ok(Bytes)`: The 65 byte signature with `v` normalized to 27 or 28.
    /// - `Err(anyhow::Error)`: The underlying signer refused or failed.
    async fn sign(&self, hash: H256) -> Result<Bytes>;
}

#[async_trait]
impl ChannelSigner for LocalWallet {
    fn address(&self) -> Address {
        Signer::address(self)
    }

    async fn sign(&self, hash: H256) -> Result<Bytes> {
        let signature = self.sign_hash(hash_with_prefix(hash))?;
        Ok(encode_signature(&signature))
    }
}

/// Encodes a signature as `r || s || v` with `v` normalized to 27 or 28.
pub fn encode_signature(signature: &Signature) -> Bytes {
    let mut out = [0u8; SIGNATURE_LENGTH];
    signature.r.to_big_endian(&mut out[..32]);
    signature.s.to_big_endian(&mut out[32..64]);
    out[64] = normalize_v(signature.v as u8);
    Bytes::from(out.to_vec())
}

/// Decodes a 65 byte signature, accepting `v` in either the `{0, 1}` or `{27, 28}` form.
pub fn decode_signature(bytes: &[u8]) -> Result<Signature, InvalidSignatureFormat> {
    if bytes.len() != SIGNATURE_LENGTH {
        return Err(InvalidSignatureFormat(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LENGTH,
            bytes.len()
        )));
    }
    let v = normalize_v(bytes[64]);
    if v != 27 && v != 28 {
        return Err(InvalidSignatureFormat(format!(
            "recovery id {} out of range",
            bytes[64]
        )));
    }
    Ok(Signature {
        r: U256::from_big_endian(&bytes[..32]),
        s: U256::from_big_endian(&bytes[32..64]),
        v: v as u64,
    })
}

/// Recovers the address that signed `hash`. A well-formed signature by the "wrong" key is not
/// an error here; callers compare the returned address against the party they expect.
pub fn recover(hash: H256, signature: &[u8]) -> Result<Address, InvalidSignatureFormat> {
    let signature = decode_signature(signature)?;
    signature
        .recover(hash_with_prefix(hash))
        .map_err(|e| InvalidSignatureFormat(e.to_string()))
}

fn normalize_v(v: u8) -> u8 {
    if v < 27 {
        v + 27
    } else {
        v
    }
}
