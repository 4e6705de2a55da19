//! Streaming, multi-algorithm hash verification over the assembled file.
//!
//! Mirrors `verify_hash` in the original Python implementation: memory-map
//! the completed file read-only, feed it through the selected digest in
//! fixed-size chunks, and compare the lowercase hex digest against the
//! caller-supplied expectation.

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use blake2::{Blake2b512, Blake2s256};
use digest::Digest;
use memmap2::Mmap;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use sha3::{Sha3_224, Sha3_256, Sha3_384, Sha3_512, Shake128, Shake256};

use crate::constants::ONE_MB;
use crate::error::{DownloadError, Result};

/// All hash algorithms the hash verifier supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Blake2b,
    Blake2s,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
    Shake128,
    Shake256,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Blake2b => "blake2b",
            HashAlgorithm::Blake2s => "blake2s",
            HashAlgorithm::Sha3_224 => "sha3_224",
            HashAlgorithm::Sha3_256 => "sha3_256",
            HashAlgorithm::Sha3_384 => "sha3_384",
            HashAlgorithm::Sha3_512 => "sha3_512",
            HashAlgorithm::Shake128 => "shake_128",
            HashAlgorithm::Shake256 => "shake_256",
        };
        f.write_str(s)
    }
}

impl FromStr for HashAlgorithm {
    type Err = DownloadError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "md5" => HashAlgorithm::Md5,
            "sha1" => HashAlgorithm::Sha1,
            "sha224" => HashAlgorithm::Sha224,
            "sha256" => HashAlgorithm::Sha256,
            "sha384" => HashAlgorithm::Sha384,
            "sha512" => HashAlgorithm::Sha512,
            "blake2b" => HashAlgorithm::Blake2b,
            "blake2s" => HashAlgorithm::Blake2s,
            "sha3_224" => HashAlgorithm::Sha3_224,
            "sha3_256" => HashAlgorithm::Sha3_256,
            "sha3_384" => HashAlgorithm::Sha3_384,
            "sha3_512" => HashAlgorithm::Sha3_512,
            "shake_128" => HashAlgorithm::Shake128,
            "shake_256" => HashAlgorithm::Shake256,
            other => {
                return Err(DownloadError::InvalidArgument(format!(
                    "unsupported hash type: {other}"
                )))
            }
        })
    }
}

/// Hashes `data` in `ONE_MB`-sized steps with the given algorithm,
/// returning the lowercase hex digest. `shake_128`/`shake_256` use a
/// 32-byte output length, matching common CLI/library defaults.
fn digest_hex(algorithm: HashAlgorithm, mut feed: impl FnMut(&mut dyn FnMut(&[u8]))) -> String {
    macro_rules! run {
        ($hasher:ty) => {{
            let mut hasher = <$hasher>::new();
            feed(&mut |chunk: &[u8]| hasher.update(chunk));
            hex::encode(hasher.finalize())
        }};
    }

    match algorithm {
        HashAlgorithm::Md5 => run!(md5::Md5),
        HashAlgorithm::Sha1 => run!(Sha1),
        HashAlgorithm::Sha224 => run!(Sha224),
        HashAlgorithm::Sha256 => run!(Sha256),
        HashAlgorithm::Sha384 => run!(Sha384),
        HashAlgorithm::Sha512 => run!(Sha512),
        HashAlgorithm::Blake2b => run!(Blake2b512),
        HashAlgorithm::Blake2s => run!(Blake2s256),
        HashAlgorithm::Sha3_224 => run!(Sha3_224),
        HashAlgorithm::Sha3_256 => run!(Sha3_256),
        HashAlgorithm::Sha3_384 => run!(Sha3_384),
        HashAlgorithm::Sha3_512 => run!(Sha3_512),
        HashAlgorithm::Shake128 => {
            use sha3::digest::{ExtendableOutput, Update, XofReader};
            let mut hasher = Shake128::default();
            feed(&mut |chunk: &[u8]| hasher.update(chunk));
            let mut reader = hasher.finalize_xof();
            let mut out = [0u8; 32];
            reader.read(&mut out);
            hex::encode(out)
        }
        HashAlgorithm::Shake256 => {
            use sha3::digest::{ExtendableOutput, Update, XofReader};
            let mut hasher = Shake256::default();
            feed(&mut |chunk: &[u8]| hasher.update(chunk));
            let mut reader = hasher.finalize_xof();
            let mut out = [0u8; 32];
            reader.read(&mut out);
            hex::encode(out)
        }
    }
}

/// Computes the hex digest of the file at `path` using `algorithm`, reading
/// through a read-only memory map in `ONE_MB` steps.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();

    if len == 0 {
        return Ok(digest_hex(algorithm, |_feed| {}));
    }

    // Safety-by-convention: the file is complete and exclusively owned by
    // this process at verification time (the job holds no other writer).
    let mmap = unsafe { Mmap::map(&file)? };

    let hex = digest_hex(algorithm, |feed| {
        let mut offset = 0usize;
        let step = ONE_MB as usize;
        while offset < mmap.len() {
            let end = (offset + step).min(mmap.len());
            feed(&mmap[offset..end]);
            offset = end;
        }
    });
    Ok(hex)
}

/// Verifies that the file at `path` hashes (with `algorithm`) to
/// `expected_hex` (case-insensitive). On mismatch, returns
/// [`DownloadError::HashVerification`]; the caller is responsible for
/// unlinking the file.
pub fn verify_hash(path: &Path, expected_hex: &str, algorithm: HashAlgorithm) -> Result<()> {
    let actual = hash_file(path, algorithm)?;
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(DownloadError::HashVerification {
            algorithm: algorithm.to_string(),
            expected: expected_hex.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn md5_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, vec![0xABu8; 1024 * 1024]).unwrap();
        let digest = hash_file(&path, HashAlgorithm::Md5).unwrap();
        assert_eq!(digest.len(), 32);
    }

    #[test]
    fn sha256_roundtrip_matches_expected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"hello world").unwrap();
        drop(f);

        let digest = hash_file(&path, HashAlgorithm::Sha256).unwrap();
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dacefbe26068c4e60b73e6e10cf4e2ad2ea8"
        );
    }

    #[test]
    fn verify_hash_mismatch_reports_both_digests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"content").unwrap();

        let err = verify_hash(&path, "deadbeef", HashAlgorithm::Md5).unwrap_err();
        match err {
            DownloadError::HashVerification { expected, .. } => assert_eq!(expected, "deadbeef"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn algorithm_from_str_round_trips() {
        for name in [
            "md5", "sha1", "sha224", "sha256", "sha384", "sha512", "blake2b", "blake2s",
            "sha3_224", "sha3_256", "sha3_384", "sha3_512", "shake_128", "shake_256",
        ] {
            let algo: HashAlgorithm = name.parse().unwrap();
            assert_eq!(algo.to_string(), name);
        }
    }
}
