//! Checksum utilities for archive change detection

use crate::error::Result;
use crate::types::ChecksumAlgorithm;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

const READ_BUFFER_SIZE: usize = 8192;

/// Compute checksum for a file
pub fn compute_file_checksum(
    path: impl AsRef<Path>,
    algorithm: ChecksumAlgorithm,
) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    compute_checksum(&mut file, algorithm)
}

/// Compute checksum for any readable source, streaming in fixed-size chunks
pub fn compute_checksum<R: Read>(reader: &mut R, algorithm: ChecksumAlgorithm) -> Result<String> {
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    match algorithm {
        ChecksumAlgorithm::Md5 => {
            let mut context = md5::Context::new();

            loop {
                let bytes_read = reader.read(&mut buffer)?;
                if bytes_read == 0 {
                    break;
                }
                context.consume(&buffer[..bytes_read]);
            }

            Ok(format!("{:x}", context.compute()))
        },
        ChecksumAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();

            loop {
                let bytes_read = reader.read(&mut buffer)?;
                if bytes_read == 0 {
                    break;
                }
                hasher.update(&buffer[..bytes_read]);
            }

            Ok(hex::encode(hasher.finalize()))
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn test_compute_checksum_md5() {
        let mut cursor = Cursor::new(b"Hello, world!");
        let checksum = compute_checksum(&mut cursor, ChecksumAlgorithm::Md5).unwrap();
        assert_eq!(checksum, "6cd3556deb0da54bca060b4c39479839");
    }

    #[test]
    fn test_compute_checksum_sha256() {
        let mut cursor = Cursor::new(b"hello world");
        let checksum = compute_checksum(&mut cursor, ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(checksum, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
    }

    #[test]
    fn test_file_checksum_spans_multiple_buffers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let payload = vec![b'x'; READ_BUFFER_SIZE * 3 + 17];
        file.write_all(&payload).unwrap();

        let from_file = compute_file_checksum(file.path(), ChecksumAlgorithm::Md5).unwrap();
        let from_memory = format!("{:x}", md5::compute(&payload));
        assert_eq!(from_file, from_memory);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = compute_file_checksum("/definitely/not/here.zip", ChecksumAlgorithm::Md5);
        assert!(matches!(result, Err(crate::NamestatError::Io(_))));
    }
}
