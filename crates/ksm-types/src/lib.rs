pub mod audit;
pub mod profile;
pub mod record_types;
pub mod rpc;

use serde::{Deserialize, Serialize};

/// A sealed `salt||nonce||ciphertext` packing, base64-encoded for JSON
/// transport on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub salt: Vec<u8>,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// PBKDF2-HMAC-SHA256 parameters. `iterations` must be >= 100_000
/// outside of tests, where a much lower count keeps the suite fast.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KdfParams {
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self { iterations: 100_000 }
    }
}

pub use audit::{AuditEvent, AuditEventType, Severity};
pub use profile::{Profile, ProfileConfig, ProfileDatabase, StoredProfileRecord};
pub use rpc::{Request, RequestId, Response, RpcError};
