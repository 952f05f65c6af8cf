//! Symbol mangling and ABI versioning.
//!
//! Two modules compose only when their ABI major matches the compiler's;
//! the manifest emitted next to each translation unit records it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const ABI_VERSION_MAJOR: u32 = 2;
pub const ABI_VERSION_MINOR: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiVersion {
    pub major: u32,
    pub minor: u32,
}

pub fn version() -> AbiVersion {
    AbiVersion { major: ABI_VERSION_MAJOR, minor: ABI_VERSION_MINOR }
}

/// `daisy_<module>__<name>`, with dots flattened.
pub fn mangle(module: &str, name: &str) -> String {
    let safe_module = module.replace('.', "__");
    let safe_name = name.replace('.', "__");
    format!("daisy_{safe_module}__{safe_name}")
}

/// First 16 hex chars of the SHA-256 over the signature shape.
pub fn signature_hash(params: &[String], return_type: &str) -> String {
    let payload = format!("{}->{}", params.join(","), return_type);
    let digest = Sha256::digest(payload.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangling_flattens_dots() {
        assert_eq!(mangle("util", "helper"), "daisy_util__helper");
        assert_eq!(mangle("a.b", "f"), "daisy_a__b__f");
    }

    #[test]
    fn signature_hash_is_stable_and_short() {
        let a = signature_hash(&["int".into(), "string".into()], "int");
        let b = signature_hash(&["int".into(), "string".into()], "int");
        let c = signature_hash(&["int".into()], "int");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
