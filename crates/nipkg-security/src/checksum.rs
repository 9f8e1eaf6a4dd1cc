use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use nipkg_core::{PackageError, Result};
use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn sha256_file_hex(path: &Path) -> Result<String> {
    let file = File::open(path)
        .map_err(|err| PackageError::io(format!("failed to open {}", path.display()), err))?;
    sha256_reader_hex(file)
        .map_err(|err| PackageError::io(format!("failed to hash {}", path.display()), err))
}

/// Fails with [`PackageError::ChecksumMismatch`] unless the archive hashes to
/// `expected` (hex, case-insensitive). Returns the digest on success.
pub fn verify_sha256_file(path: &Path, expected: &str) -> Result<String> {
    let actual = sha256_file_hex(path)?;
    let expected = expected.trim();
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(PackageError::ChecksumMismatch {
            archive: path.to_path_buf(),
            expected: expected.to_ascii_lowercase(),
            actual,
        });
    }
    Ok(actual)
}

fn sha256_reader_hex(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
