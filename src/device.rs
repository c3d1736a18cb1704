//! Persistent device identity
//!
//! The remote policy's allow/deny lists key on a stable per-installation id.
//! The id is generated once and stored next to the settings file.

use std::path::Path;

use anyhow::{Context, Result};
use rand::Rng;

/// Load the device id from `path`, generating and persisting one if missing.
pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();

    if path.exists() {
        let id = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read device id file: {}", path.display()))?;
        let id = id.trim().to_string();
        if !id.is_empty() {
            return Ok(id);
        }
    }

    let id = generate_id(&mut rand::thread_rng());
    std::fs::write(path, &id)
        .with_context(|| format!("Failed to write device id file: {}", path.display()))?;
    Ok(id)
}

/// Generate a fresh 16-hex-char device id.
pub fn generate_id<R: Rng>(rng: &mut R) -> String {
    let value: u64 = rng.gen();
    format!("{value:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_id_is_16_hex_chars() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = generate_id(&mut rng);
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_id_is_seed_deterministic() {
        let a = generate_id(&mut StdRng::seed_from_u64(42));
        let b = generate_id(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_load_creates_and_reuses_id() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("device_id");

        let first = load_or_create(&path).unwrap();
        let second = load_or_create(&path).unwrap();
        assert_eq!(first, second);
        assert!(path.exists());
    }

    #[test]
    fn test_load_regenerates_when_file_is_blank() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("device_id");
        std::fs::write(&path, "  \n").unwrap();

        let id = load_or_create(&path).unwrap();
        assert!(!id.trim().is_empty());
    }
}
