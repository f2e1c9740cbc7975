use bytes::Bytes;
use casa_storage::FilesystemBackend;
use std::path::Path;

/// Filesystem backend rooted at `dir` with a fixed signing secret.
#[allow(dead_code)]
pub async fn filesystem_backend(dir: &Path) -> FilesystemBackend {
    FilesystemBackend::new(
        dir,
        "http://localhost/storage",
        Some("fixture-secret".to_string()),
    )
    .await
    .unwrap()
}

/// Generate deterministic test data using a seeded pseudo-random generator.
/// Same seed produces same output.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        assert_eq!(seeded_bytes(42, 1000), seeded_bytes(42, 1000));
        assert_ne!(seeded_bytes(42, 1000), seeded_bytes(43, 1000));
    }
}
