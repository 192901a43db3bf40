//! Hybrid envelope decryption
//!
//! The decryptor unwraps the envelope's symmetric key with RSA-OAEP, takes
//! the first `key_size / 8` bytes of the unwrapped material as the content
//! key, and opens the payload with an authenticated cipher. The truncation is
//! a protocol contract with the publishing side (see the module docs on
//! [`crate::crypto`]); it is preserved exactly.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use super::envelope::{Envelope, EnvelopeError, RawEnvelope};

/// Nonce size shared by every supported cipher
pub const NONCE_SIZE: usize = 12;
/// Size of the key material block wrapped by the publisher
pub const KEY_MATERIAL_SIZE: usize = 32;
/// Authentication tag size shared by every supported cipher
const TAG_SIZE: usize = 16;

/// Errors raised on the decrypt path
///
/// The classes are deliberately distinct: [`DecryptError::Envelope`] means no
/// cryptography was attempted, [`DecryptError::Authentication`] means the key
/// or tag did not check out, and [`DecryptError::InvalidPlaintext`] means the
/// envelope opened fine but did not contain JSON; callers use the last one
/// to decide whether to show a raw-response diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("authentication failure: {0}")]
    Authentication(String),
    #[error("decrypted payload is not valid JSON: {0}")]
    InvalidPlaintext(#[source] serde_json::Error),
    #[error("cannot load private key {}: {reason}", .path.display())]
    Key { path: PathBuf, reason: String },
    #[error("crypto configuration error: {0}")]
    Config(String),
    #[error("crypto error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Supported authenticated ciphers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl CipherKind {
    /// Symmetric key size in bytes
    pub fn key_len(self) -> usize {
        match self {
            CipherKind::Aes128Gcm => 16,
            CipherKind::Aes256Gcm | CipherKind::ChaCha20Poly1305 => 32,
        }
    }

    /// Decrypt `ciphertext || tag` with the given key and nonce
    fn open(self, key: &[u8], nonce: &[u8], sealed: &[u8]) -> Result<Vec<u8>, DecryptError> {
        let result = match self {
            CipherKind::Aes128Gcm => Aes128Gcm::new_from_slice(key)
                .map_err(bad_key_length)?
                .decrypt(aes_gcm::Nonce::from_slice(nonce), sealed),
            CipherKind::Aes256Gcm => Aes256Gcm::new_from_slice(key)
                .map_err(bad_key_length)?
                .decrypt(aes_gcm::Nonce::from_slice(nonce), sealed),
            CipherKind::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key)
                .map_err(bad_key_length)?
                .decrypt(chacha20poly1305::Nonce::from_slice(nonce), sealed),
        };
        result.map_err(|_| DecryptError::Authentication("bad tag".to_string()))
    }

    /// Encrypt plaintext, returning `ciphertext || tag`
    fn seal(self, key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DecryptError> {
        let result = match self {
            CipherKind::Aes128Gcm => Aes128Gcm::new_from_slice(key)
                .map_err(bad_key_length)?
                .encrypt(aes_gcm::Nonce::from_slice(nonce), plaintext),
            CipherKind::Aes256Gcm => Aes256Gcm::new_from_slice(key)
                .map_err(bad_key_length)?
                .encrypt(aes_gcm::Nonce::from_slice(nonce), plaintext),
            CipherKind::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key)
                .map_err(bad_key_length)?
                .encrypt(chacha20poly1305::Nonce::from_slice(nonce), plaintext),
        };
        result.map_err(|_| DecryptError::Config("encrypt error".to_string()))
    }
}

fn bad_key_length(e: impl fmt::Display) -> DecryptError {
    DecryptError::Config(format!("invalid key length: {}", e))
}

impl FromStr for CipherKind {
    type Err = DecryptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aes-128-gcm" => Ok(CipherKind::Aes128Gcm),
            "aes-256-gcm" => Ok(CipherKind::Aes256Gcm),
            "chacha20-poly1305" => Ok(CipherKind::ChaCha20Poly1305),
            other => Err(DecryptError::Config(format!("unknown cipher '{}'", other))),
        }
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CipherKind::Aes128Gcm => "aes-128-gcm",
            CipherKind::Aes256Gcm => "aes-256-gcm",
            CipherKind::ChaCha20Poly1305 => "chacha20-poly1305",
        })
    }
}

/// Digest used for the OAEP key unwrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OaepDigest {
    Sha1,
    #[default]
    Sha256,
    Sha512,
}

impl OaepDigest {
    fn padding(self) -> Oaep {
        match self {
            OaepDigest::Sha1 => Oaep::new::<Sha1>(),
            OaepDigest::Sha256 => Oaep::new::<Sha256>(),
            OaepDigest::Sha512 => Oaep::new::<Sha512>(),
        }
    }
}

impl FromStr for OaepDigest {
    type Err = DecryptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha1" => Ok(OaepDigest::Sha1),
            "sha256" => Ok(OaepDigest::Sha256),
            "sha512" => Ok(OaepDigest::Sha512),
            other => Err(DecryptError::Config(format!(
                "unknown OAEP digest '{}'",
                other
            ))),
        }
    }
}

/// Cryptographic configuration, supplied by the caller at construction
///
/// A configuration reload means building a new [`HybridDecryptor`]; instances
/// never mutate.
#[derive(Debug, Clone)]
pub struct CryptoConfig {
    pub cipher: CipherKind,
    /// Symmetric key size in bits; `key_size / 8` bytes of the unwrapped
    /// material become the content key
    pub key_size: u32,
    pub oaep_digest: OaepDigest,
    pub private_key_file: PathBuf,
}

/// Authenticates and decrypts envelopes with a private RSA key
///
/// The private key is loaded once at construction and the instance is
/// immutable afterwards, so it is safe to share across concurrent requests.
pub struct HybridDecryptor {
    key: RsaPrivateKey,
    cipher: CipherKind,
    key_len: usize,
    oaep: OaepDigest,
}

impl HybridDecryptor {
    /// Load the private key and validate the cipher/key-size pairing
    ///
    /// # Errors
    ///
    /// Returns an error if `key_size / 8` does not match the configured
    /// cipher's key length, or if the key file is unreadable or not a pkcs8
    /// or pkcs1 PEM private key.
    pub fn new(config: &CryptoConfig) -> Result<Self, DecryptError> {
        let key_len = (config.key_size / 8) as usize;
        if key_len != config.cipher.key_len() {
            return Err(DecryptError::Config(format!(
                "key_size {} does not match cipher {} ({}-byte key)",
                config.key_size,
                config.cipher,
                config.cipher.key_len()
            )));
        }

        let pem = std::fs::read_to_string(&config.private_key_file).map_err(|e| {
            DecryptError::Key {
                path: config.private_key_file.clone(),
                reason: e.to_string(),
            }
        })?;
        let key = parse_private_key(&pem).map_err(|reason| DecryptError::Key {
            path: config.private_key_file.clone(),
            reason,
        })?;

        Ok(Self {
            key,
            cipher: config.cipher,
            key_len,
            oaep: config.oaep_digest,
        })
    }

    /// Unwrap the symmetric key and open the payload
    ///
    /// # Errors
    ///
    /// Returns [`DecryptError::Authentication`] if the key unwrap fails, the
    /// unwrapped material is shorter than the sizing contract requires, or
    /// the authentication tag does not verify.
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>, DecryptError> {
        if envelope.nonce.len() != NONCE_SIZE {
            return Err(EnvelopeError::NonceLength {
                expected: NONCE_SIZE,
                got: envelope.nonce.len(),
            }
            .into());
        }

        let material = self
            .key
            .decrypt(self.oaep.padding(), &envelope.wrapped_key)
            .map_err(|e| DecryptError::Authentication(format!("key unwrap failed: {}", e)))?;
        if material.len() < self.key_len {
            return Err(DecryptError::Authentication(format!(
                "unwrapped key material too short: expected at least {} bytes, got {}",
                self.key_len,
                material.len()
            )));
        }

        // Sizing contract: the first key_len bytes are the content key.
        let key = &material[..self.key_len];

        let mut sealed = Vec::with_capacity(envelope.data.len() + envelope.auth_tag.len());
        sealed.extend_from_slice(&envelope.data);
        sealed.extend_from_slice(&envelope.auth_tag);

        self.cipher.open(key, &envelope.nonce, &sealed)
    }

    /// Decrypt raw wire bytes and parse the plaintext as JSON
    pub fn decrypt_and_parse(&self, raw: &[u8]) -> Result<serde_json::Value, DecryptError> {
        let envelope = Envelope::from_json(raw)?;
        let plaintext = self.decrypt(&envelope)?;
        serde_json::from_slice(&plaintext).map_err(DecryptError::InvalidPlaintext)
    }

    /// Public half of the loaded private key
    pub fn public_key(&self) -> RsaPublicKey {
        self.key.to_public_key()
    }
}

/// Build an envelope for the given plaintext, the inverse of
/// [`HybridDecryptor::decrypt`]
///
/// A fresh [`KEY_MATERIAL_SIZE`]-byte block of key material is generated and
/// wrapped whole; only its first `key_size / 8` bytes are used as the content
/// key, matching what the decryptor will select. Provided for publishers and
/// round-trip tests.
pub fn seal(
    plaintext: &[u8],
    public_key: &RsaPublicKey,
    config: &CryptoConfig,
) -> Result<RawEnvelope, DecryptError> {
    let key_len = (config.key_size / 8) as usize;
    if key_len != config.cipher.key_len() {
        return Err(DecryptError::Config(format!(
            "key_size {} does not match cipher {} ({}-byte key)",
            config.key_size,
            config.cipher,
            config.cipher.key_len()
        )));
    }

    let mut material = [0u8; KEY_MATERIAL_SIZE];
    getrandom::getrandom(&mut material)
        .map_err(|e| anyhow::anyhow!("failed to generate key material: {}", e))?;
    let mut nonce = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| anyhow::anyhow!("failed to generate nonce: {}", e))?;

    let sealed = config.cipher.seal(&material[..key_len], &nonce, plaintext)?;
    let (data, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

    let wrapped = public_key
        .encrypt(&mut rand::thread_rng(), config.oaep_digest.padding(), &material)
        .map_err(|e| anyhow::anyhow!("key wrap failed: {}", e))?;

    Ok(Envelope {
        data: data.to_vec(),
        wrapped_key: wrapped,
        nonce: nonce.to_vec(),
        auth_tag: tag.to_vec(),
    }
    .to_raw())
}

/// Generate a new RSA private key and encode it as pkcs8 PEM
pub fn generate_private_key_pem(bits: u32) -> Result<String, DecryptError> {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), bits as usize)
        .map_err(|e| anyhow::anyhow!("RSA key generation failed: {}", e))?;
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| anyhow::anyhow!("PEM encoding failed: {}", e))?;
    Ok(pem.to_string())
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, String> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| format!("not a pkcs8 or pkcs1 private key: {e}"))
}

#[cfg(test)]
mod test {
    use std::sync::OnceLock;

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    use super::*;

    fn test_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap())
    }

    fn test_config(
        dir: &tempfile::TempDir,
        cipher: CipherKind,
        key_size: u32,
        digest: OaepDigest,
    ) -> CryptoConfig {
        let pem = test_key().to_pkcs8_pem(LineEnding::LF).unwrap();
        let path = dir.path().join("key.pem");
        std::fs::write(&path, pem.as_bytes()).unwrap();
        CryptoConfig {
            cipher,
            key_size,
            oaep_digest: digest,
            private_key_file: path,
        }
    }

    fn round_trip(cipher: CipherKind, key_size: u32, digest: OaepDigest) {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, cipher, key_size, digest);
        let decryptor = HybridDecryptor::new(&config).unwrap();

        let payload = serde_json::json!({ "logs": ["{}"], "prev_cid": "bafy123" });
        let plaintext = serde_json::to_vec(&payload).unwrap();

        let envelope = seal(&plaintext, &decryptor.public_key(), &config).unwrap();
        let raw = serde_json::to_vec(&envelope).unwrap();

        let parsed = decryptor.decrypt_and_parse(&raw).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_round_trip_aes_256_gcm() {
        round_trip(CipherKind::Aes256Gcm, 256, OaepDigest::Sha256);
    }

    #[test]
    fn test_round_trip_aes_128_gcm_truncates_key_material() {
        // 128-bit key: only the first 16 of 32 unwrapped bytes are used.
        round_trip(CipherKind::Aes128Gcm, 128, OaepDigest::Sha256);
    }

    #[test]
    fn test_round_trip_chacha20_poly1305() {
        round_trip(CipherKind::ChaCha20Poly1305, 256, OaepDigest::Sha256);
    }

    #[test]
    fn test_round_trip_alternate_oaep_digests() {
        round_trip(CipherKind::Aes256Gcm, 256, OaepDigest::Sha1);
        round_trip(CipherKind::Aes256Gcm, 256, OaepDigest::Sha512);
    }

    #[test]
    fn test_tampered_tag_fails_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, CipherKind::Aes256Gcm, 256, OaepDigest::Sha256);
        let decryptor = HybridDecryptor::new(&config).unwrap();

        let plaintext = serde_json::to_vec(&serde_json::json!({ "logs": [] })).unwrap();
        let mut envelope = seal(&plaintext, &decryptor.public_key(), &config)
            .unwrap()
            .decode()
            .unwrap();

        // Flip one bit of the auth tag.
        envelope.auth_tag[0] ^= 0x01;
        let raw = serde_json::to_vec(&envelope.to_raw()).unwrap();

        match decryptor.decrypt_and_parse(&raw) {
            Err(DecryptError::Authentication(_)) => {}
            other => panic!("expected authentication failure, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_private_key_fails_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, CipherKind::Aes256Gcm, 256, OaepDigest::Sha256);

        // Seal against a key the decryptor does not hold.
        let other_key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let plaintext = serde_json::to_vec(&serde_json::json!({ "logs": [] })).unwrap();
        let envelope = seal(&plaintext, &other_key.to_public_key(), &config).unwrap();
        let raw = serde_json::to_vec(&envelope).unwrap();

        let decryptor = HybridDecryptor::new(&config).unwrap();
        assert!(matches!(
            decryptor.decrypt_and_parse(&raw),
            Err(DecryptError::Authentication(_))
        ));
    }

    #[test]
    fn test_non_json_plaintext_is_invalid_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, CipherKind::Aes256Gcm, 256, OaepDigest::Sha256);
        let decryptor = HybridDecryptor::new(&config).unwrap();

        let envelope = seal(b"plain text, not json", &decryptor.public_key(), &config).unwrap();
        let raw = serde_json::to_vec(&envelope).unwrap();

        assert!(matches!(
            decryptor.decrypt_and_parse(&raw),
            Err(DecryptError::InvalidPlaintext(_))
        ));
    }

    #[test]
    fn test_missing_field_is_malformed_before_any_crypto() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, CipherKind::Aes256Gcm, 256, OaepDigest::Sha256);
        let decryptor = HybridDecryptor::new(&config).unwrap();

        let raw = format!(r#"{{ "d": "{}", "n": "{}" }}"#, BASE64.encode(b"x"), BASE64.encode(b"y"));
        assert!(matches!(
            decryptor.decrypt_and_parse(raw.as_bytes()),
            Err(DecryptError::Envelope(EnvelopeError::MissingField("k")))
        ));
    }

    #[test]
    fn test_key_size_must_match_cipher() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, CipherKind::Aes256Gcm, 128, OaepDigest::Sha256);
        assert!(matches!(
            HybridDecryptor::new(&config),
            Err(DecryptError::Config(_))
        ));
    }

    #[test]
    fn test_generated_pem_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let pem = generate_private_key_pem(2048).unwrap();
        let path = dir.path().join("generated.pem");
        std::fs::write(&path, pem).unwrap();

        let config = CryptoConfig {
            cipher: CipherKind::Aes256Gcm,
            key_size: 256,
            oaep_digest: OaepDigest::Sha256,
            private_key_file: path,
        };
        assert!(HybridDecryptor::new(&config).is_ok());
    }

    #[test]
    fn test_cipher_and_digest_parsing() {
        assert_eq!(
            "aes-256-gcm".parse::<CipherKind>().unwrap(),
            CipherKind::Aes256Gcm
        );
        assert_eq!(
            "chacha20-poly1305".parse::<CipherKind>().unwrap(),
            CipherKind::ChaCha20Poly1305
        );
        assert!("des-ecb".parse::<CipherKind>().is_err());

        assert_eq!("sha256".parse::<OaepDigest>().unwrap(), OaepDigest::Sha256);
        assert!("md5".parse::<OaepDigest>().is_err());
    }
}
