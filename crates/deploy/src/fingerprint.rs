use alloy_core::primitives::Bytes;
use sha2::{Digest, Sha256};

/// Identity of a deployment's input.
///
/// Two deployments with the same fingerprint would submit byte-identical creation code, so
/// the second one is a no-op. The creation bytecode and the encoded constructor arguments are
/// both part of the fingerprint: changing either requires a new contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentFingerprint {
    /// Creation bytecode of the artifact.
    pub bytecode: Bytes,
    /// ABI-encoded constructor arguments.
    pub constructor_args: Bytes,
}

impl DeploymentFingerprint {
    pub fn new(bytecode: Bytes, constructor_args: Bytes) -> Self {
        Self {
            bytecode,
            constructor_args,
        }
    }

    /// Compute a SHA-256 hash of the creation code.
    ///
    /// The hash is deterministic and covers exactly the bytes that end up in the
    /// transaction input, so it matches for any two identical deployment transactions.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytecode);
        hasher.update(&self.constructor_args);
        let result = hasher.finalize();

        hex::encode(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> DeploymentFingerprint {
        DeploymentFingerprint::new(
            "0x6080604052348015600f57600080fd5b50".parse().unwrap(),
            Bytes::new(),
        )
    }

    #[test]
    fn test_hash_determinism() {
        let hash1 = counter().compute_hash();
        let hash2 = counter().compute_hash();

        assert_eq!(hash1, hash2, "Hash should be deterministic");
        assert_eq!(hash1.len(), 64, "SHA-256 hash should be 64 hex characters");
    }

    #[test]
    fn test_hash_changes_with_bytecode() {
        let mut changed = counter();
        changed.bytecode = "0x6080604052348015600f57600080fd5b51".parse().unwrap();

        assert_ne!(
            counter().compute_hash(),
            changed.compute_hash(),
            "Hash should change when the bytecode changes"
        );
    }

    #[test]
    fn test_hash_changes_with_constructor_args() {
        let mut changed = counter();
        changed.constructor_args = Bytes::from(vec![0u8; 32]);

        assert_ne!(
            counter().compute_hash(),
            changed.compute_hash(),
            "Hash should change when constructor arguments change"
        );
    }

    #[test]
    fn test_hash_covers_init_code_bytes() {
        // Same concatenated bytes give the same hash regardless of the split point.
        let split_a = DeploymentFingerprint::new(Bytes::from(vec![1, 2, 3]), Bytes::from(vec![4]));
        let split_b = DeploymentFingerprint::new(Bytes::from(vec![1, 2]), Bytes::from(vec![3, 4]));

        assert_eq!(split_a.compute_hash(), split_b.compute_hash());
    }
}
