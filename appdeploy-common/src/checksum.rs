//! Checksum helpers for the bootstrap installer's local/remote comparison.

use md5::Md5;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

use crate::error::CommonError;

/// Hex-encoded sha256 of a local file, read in fixed chunks.
pub fn sha256_file(path: &Path) -> Result<String, CommonError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex-encoded md5 of a local file. md5 is only ever used as the last-resort
/// fallback algorithm when neither `sha256sum` nor `openssl sha256` exist on
/// the remote host.
pub fn md5_file(path: &Path) -> Result<String, CommonError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Algorithm a remote checksum was computed with, so the caller recomputes
/// locally with the same one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha256,
    Md5,
}

/// Parse the stdout of `sha256sum`, `openssl sha256`, or `md5sum` run against
/// a single remote path, trying each in that order. Returns `None` if none of
/// the three command outputs look valid (the tool is treated as missing).
pub fn parse_remote_checksum(
    sha256sum_stdout: Option<&str>,
    openssl_sha256_stdout: Option<&str>,
    md5sum_stdout: Option<&str>,
) -> Option<(String, ChecksumAlgorithm)> {
    if let Some(out) = sha256sum_stdout {
        if let Some(hash) = out.split_whitespace().next() {
            if !hash.is_empty() {
                return Some((hash.to_lowercase(), ChecksumAlgorithm::Sha256));
            }
        }
    }

    if let Some(out) = openssl_sha256_stdout {
        if let Some(hash) = openssl_hash(out) {
            return Some((hash, ChecksumAlgorithm::Sha256));
        }
    }

    if let Some(out) = md5sum_stdout {
        if let Some(hash) = out.split_whitespace().next() {
            if !hash.is_empty() {
                return Some((hash.to_lowercase(), ChecksumAlgorithm::Md5));
            }
        }
    }

    None
}

fn openssl_hash(output: &str) -> Option<String> {
    // "SHA256(filename)= hexdigest"
    let (_, after_eq) = output.split_once('=')?;
    let hash = after_eq.trim();
    if hash.is_empty() {
        None
    } else {
        Some(hash.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sha256sum_output() {
        let (hash, algo) = parse_remote_checksum(Some("abc123  file\n"), None, None).unwrap();
        assert_eq!(hash, "abc123");
        assert_eq!(algo, ChecksumAlgorithm::Sha256);
    }

    #[test]
    fn falls_back_to_openssl() {
        let (hash, algo) =
            parse_remote_checksum(None, Some("SHA256(file)= DEADBEEF\n"), None).unwrap();
        assert_eq!(hash, "deadbeef");
        assert_eq!(algo, ChecksumAlgorithm::Sha256);
    }

    #[test]
    fn falls_back_to_md5() {
        let (hash, algo) = parse_remote_checksum(None, None, Some("feedface  file\n")).unwrap();
        assert_eq!(hash, "feedface");
        assert_eq!(algo, ChecksumAlgorithm::Md5);
    }

    #[test]
    fn none_when_all_absent() {
        assert!(parse_remote_checksum(None, None, None).is_none());
    }

    #[test]
    fn md5_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();
        assert_eq!(md5_file(&path).unwrap(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn sha256_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
