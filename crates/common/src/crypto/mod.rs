//! Cryptographic primitives for loglink
//!
//! This module implements the reader side of the hybrid envelope scheme used
//! to publish log bundles:
//!
//! - **Envelope**: the wire structure `{ d, k, n, t }` carrying ciphertext,
//!   an asymmetrically-wrapped symmetric key, a nonce, and an auth tag
//! - **Key unwrap**: RSA-OAEP with a configurable digest recovers the
//!   symmetric key material from `k`
//! - **Content decryption**: an authenticated cipher (AES-GCM by default)
//!   over `d` with `n` and `t`
//!
//! # Key sizing contract
//!
//! The publisher wraps a fixed-size block of key material; the reader uses
//! the first `key_size / 8` bytes of it as the symmetric key. This is a
//! protocol contract with already-published envelopes, not a key-derivation
//! scheme, and it must not be changed.

mod decryptor;
mod envelope;

pub use decryptor::{
    generate_private_key_pem, seal, CipherKind, CryptoConfig, DecryptError, HybridDecryptor,
    OaepDigest, KEY_MATERIAL_SIZE, NONCE_SIZE,
};
pub use envelope::{Envelope, EnvelopeError, RawEnvelope};
