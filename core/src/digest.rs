//! Named streaming hash functions.
//!
//! Algorithms form a closed set resolved by case-insensitive name. Hashing
//! reads the input in fixed-size blocks so memory use does not depend on the
//! size of the stream.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest as _, Sha256, Sha384, Sha512};
use std::cmp::Ordering;
use std::fmt;
use std::io::{ErrorKind, Read};
use std::str::FromStr;

const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    #[serde(rename = "SHA-1")]
    Sha1,
    #[serde(rename = "SHA-256")]
    Sha256,
    #[serde(rename = "SHA-384")]
    Sha384,
    #[serde(rename = "SHA-512")]
    Sha512,
    #[serde(rename = "BLAKE3")]
    Blake3,
}

impl DigestAlgorithm {
    /// Algorithm used when cataloging if the caller does not pick one.
    pub const CATALOG_DEFAULT: Self = Self::Sha1;
    /// Algorithm fixed for snapshot manifests and file storage.
    pub const BACKUP_DEFAULT: Self = Self::Sha256;

    pub const ALL: [Self; 5] = [
        Self::Sha1,
        Self::Sha256,
        Self::Sha384,
        Self::Sha512,
        Self::Blake3,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
            Self::Blake3 => "BLAKE3",
        }
    }

    /// Length in bytes of every digest this algorithm produces.
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
            Self::Blake3 => 32,
        }
    }

    /// First registered algorithm whose digests are `len` bytes long.
    /// SHA-256 and BLAKE3 share a length; SHA-256 wins.
    pub fn for_digest_len(len: usize) -> Option<Self> {
        Self::ALL.iter().copied().find(|algorithm| algorithm.digest_len() == len)
    }

    pub fn from_name(name: &str) -> Result<Self> {
        let wanted = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|algorithm| algorithm.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnsupportedAlgorithm {
                name: name.to_string(),
            })
    }

    /// Hashes everything `reader` yields until end of stream.
    pub fn compute<R: Read + ?Sized>(&self, reader: &mut R) -> Result<Digest> {
        let mut hasher = StreamingHasher::new(*self);
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Digest {
            algorithm: *self,
            value: hasher.finalize(),
        })
    }

    pub fn compute_bytes(&self, data: &[u8]) -> Digest {
        let mut hasher = StreamingHasher::new(*self);
        hasher.update(data);
        Digest {
            algorithm: *self,
            value: hasher.finalize(),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

enum StreamingHasher {
    Sha1(Sha1),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl StreamingHasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            DigestAlgorithm::Sha384 => Self::Sha384(Sha384::new()),
            DigestAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
            DigestAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha1(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
            Self::Blake3(h) => h.finalize().as_bytes().to_vec(),
        }
    }
}

/// A digest value tagged with the algorithm that produced it.
///
/// Ordering is byte-wise and only defined between digests of the same
/// algorithm; `partial_cmp` returns `None` otherwise.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "DigestRepr", into = "DigestRepr")]
pub struct Digest {
    algorithm: DigestAlgorithm,
    value: Vec<u8>,
}

impl Digest {
    pub fn new(algorithm: DigestAlgorithm, value: Vec<u8>) -> Result<Self> {
        if value.len() != algorithm.digest_len() {
            return Err(Error::InvalidDigestLength {
                expected: algorithm.digest_len(),
                actual: value.len(),
            });
        }
        Ok(Self { algorithm, value })
    }

    pub fn from_hex(algorithm: DigestAlgorithm, hex_str: &str) -> Result<Self> {
        let value = hex::decode(hex_str.trim())
            .map_err(|e| Error::InvalidDigest(format!("{}: {}", hex_str, e)))?;
        Self::new(algorithm, value)
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.value
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.value
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.value)
    }

    pub fn short_string(&self) -> String {
        self.to_hex().chars().take(8).collect()
    }
}

impl PartialOrd for Digest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.algorithm != other.algorithm {
            return None;
        }
        Some(self.value.cmp(&other.value))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}:{})", self.algorithm, self.to_hex())
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct DigestRepr {
    algorithm: DigestAlgorithm,
    value: String,
}

impl From<Digest> for DigestRepr {
    fn from(digest: Digest) -> Self {
        Self {
            value: digest.to_hex(),
            algorithm: digest.algorithm,
        }
    }
}

impl TryFrom<DigestRepr> for Digest {
    type Error = Error;

    fn try_from(repr: DigestRepr) -> Result<Self> {
        Digest::from_hex(repr.algorithm, &repr.value)
    }
}

/// Seam between the orchestrators and the hash functions.
pub trait DigestEngine {
    fn compute(&self, algorithm: DigestAlgorithm, reader: &mut dyn Read) -> Result<Digest>;
}

/// Hashes streams in-process with the registered algorithms.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamingDigestEngine;

impl DigestEngine for StreamingDigestEngine {
    fn compute(&self, algorithm: DigestAlgorithm, reader: &mut dyn Read) -> Result<Digest> {
        algorithm.compute(reader)
    }
}

/// Resolves `algorithm_name` and hashes `reader` with it.
pub fn compute(algorithm_name: &str, reader: &mut dyn Read) -> Result<Digest> {
    DigestAlgorithm::from_name(algorithm_name)?.compute(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HELLO_SHA256: &str = "64ec88ca00b268e5ba1a35678a1b5316d212f4f366b2477232534a8aeca37f3c";

    #[test]
    fn test_known_digests() {
        let cases = [
            ("SHA-1", "7b502c3a1f48c8609ae212cdfb639dee39673f5e"),
            ("SHA-256", HELLO_SHA256),
            (
                "SHA-384",
                "9203b0c4439fd1e6ae5878866337b7c532acd6d9260150c80318e8ab8c27ce330189f8df94fb890df1d298ff360627e1",
            ),
        ];

        for (name, expected) in cases {
            let digest = compute(name, &mut Cursor::new(b"Hello world")).unwrap();
            assert_eq!(digest.to_hex(), expected, "{}", name);
        }
    }

    #[test]
    fn test_names_are_case_insensitive() {
        assert_eq!(DigestAlgorithm::from_name("sha-256").unwrap(), DigestAlgorithm::Sha256);
        assert_eq!(DigestAlgorithm::from_name("Blake3").unwrap(), DigestAlgorithm::Blake3);
        assert_eq!("sha-1".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha1);
    }

    #[test]
    fn test_algorithm_for_digest_len() {
        assert_eq!(DigestAlgorithm::for_digest_len(20), Some(DigestAlgorithm::Sha1));
        assert_eq!(DigestAlgorithm::for_digest_len(32), Some(DigestAlgorithm::Sha256));
        assert_eq!(DigestAlgorithm::for_digest_len(64), Some(DigestAlgorithm::Sha512));
        assert_eq!(DigestAlgorithm::for_digest_len(3), None);
    }

    #[test]
    fn test_unsupported_algorithm() {
        let result = compute("MD4", &mut Cursor::new(b"data"));
        assert!(matches!(result, Err(Error::UnsupportedAlgorithm { name }) if name == "MD4"));
    }

    #[test]
    fn test_streaming_matches_in_memory() {
        let data: Vec<u8> = (0..(3 * READ_BUFFER_SIZE + 17)).map(|i| (i % 251) as u8).collect();

        for algorithm in DigestAlgorithm::ALL {
            let streamed = algorithm.compute(&mut Cursor::new(&data)).unwrap();
            let direct = algorithm.compute_bytes(&data);
            assert_eq!(streamed, direct);
            assert_eq!(streamed.as_bytes().len(), algorithm.digest_len());
        }
    }

    #[test]
    fn test_read_failure_is_io_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk went away"))
            }
        }

        let result = DigestAlgorithm::Sha256.compute(&mut Broken);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_digests_of_different_algorithms_do_not_compare() {
        let a = DigestAlgorithm::Sha256.compute_bytes(b"x");
        let b = DigestAlgorithm::Blake3.compute_bytes(b"x");
        assert_eq!(a.partial_cmp(&b), None);

        let c = DigestAlgorithm::Sha256.compute_bytes(b"y");
        assert!(a.partial_cmp(&c).is_some());
    }

    #[test]
    fn test_digest_length_validated() {
        let result = Digest::from_hex(DigestAlgorithm::Sha256, "abcd");
        assert!(matches!(
            result,
            Err(Error::InvalidDigestLength { expected: 32, actual: 2 })
        ));
    }

    #[test]
    fn test_digest_json_roundtrip() {
        let digest = Digest::from_hex(DigestAlgorithm::Sha256, HELLO_SHA256).unwrap();
        let json = serde_json::to_string(&digest).unwrap();
        assert!(json.contains("SHA-256"));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }
}
