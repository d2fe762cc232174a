//! Streaming SHA-256 file digests.
//!
//! Every artifact in every report is fingerprinted with [`sha256_file`]. The
//! file is read in fixed 1 MiB chunks, so memory stays flat regardless of size.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Chunk size used when streaming a file through the hasher.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Hex-encoded SHA-256 digest of a file's bytes.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    sha256_reader(file)
}

/// Hex-encoded SHA-256 digest of everything readable from `reader`.
pub fn sha256_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Size and digest of a file, or `None` for each when the file is absent.
///
/// Reports use this for optional destination fields.
pub fn fingerprint(path: &Path) -> io::Result<Option<(u64, String)>> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some((meta.len(), sha256_file(path)?))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
