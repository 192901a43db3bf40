/**
 * Log-bundle chain model: entries, ordering,
 *  and the back-link to the previous bundle.
 */
pub mod bundle;
/**
 * Opaque identifier for content-addressed data.
 */
pub mod content_id;
/**
 * Cryptographic types and operations.
 *  - Wire envelope parsing and validation
 *  - Hybrid (asymmetric + authenticated symmetric) decryption
 */
pub mod crypto;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::bundle::{
        parse_bundle, BundleError, LogBundle, LogEntry, ParsedEntry, SortField, SortOrder,
    };
    pub use crate::content_id::ContentId;
    pub use crate::crypto::{CryptoConfig, DecryptError, EnvelopeError, HybridDecryptor};
    pub use crate::version::build_info;
}
