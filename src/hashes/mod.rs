//! Checksum fragments on index links and digest computation
//!
//! Index pages advertise a file digest in the link fragment, e.g.
//! `...tar.gz#sha256=<hex>`. Only the algorithms in [`HashAlgorithm`] are
//! recognized.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use anyhow::Context;
use md5::Md5;
use regex::Regex;
use serde::Serialize;
use sha1::Sha1;
use sha2::digest::DynDigest;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

const BLOCK_SIZE: usize = 1 << 20;

static HASH_FRAGMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let choices: Vec<String> = HashAlgorithm::ALL
        .iter()
        .map(|algorithm| regex::escape(algorithm.name()))
        .collect();
    Regex::new(&format!(r"[#&]({})=([^&]*)", choices.join("|")))
        .expect("hash fragment regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha512,
    Sha384,
    Sha256,
    Sha224,
    Sha1,
    Md5,
}

impl HashAlgorithm {
    /// Strongest first
    pub const ALL: [HashAlgorithm; 6] = [
        HashAlgorithm::Sha512,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha224,
        HashAlgorithm::Sha1,
        HashAlgorithm::Md5,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Md5 => "md5",
        }
    }

    fn hasher(&self) -> Box<dyn DynDigest> {
        match self {
            HashAlgorithm::Sha512 => Box::new(Sha512::new()),
            HashAlgorithm::Sha384 => Box::new(Sha384::new()),
            HashAlgorithm::Sha256 => Box::new(Sha256::new()),
            HashAlgorithm::Sha224 => Box::new(Sha224::new()),
            HashAlgorithm::Sha1 => Box::new(Sha1::new()),
            HashAlgorithm::Md5 => Box::new(Md5::new()),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        HashAlgorithm::ALL
            .into_iter()
            .find(|algorithm| algorithm.name() == lowered)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unsupported hash algorithm: '{}'. Valid options: sha512, sha384, sha256, \
                     sha224, sha1, md5",
                    s
                )
            })
    }
}

/// A digest advertised by a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkHash {
    pub algorithm: HashAlgorithm,
    pub digest: String,
}

impl LinkHash {
    /// Whether `bytes` hash to the advertised digest (hex, case-insensitive)
    pub fn verify(&self, bytes: &[u8]) -> bool {
        hash_bytes(self.algorithm, bytes).eq_ignore_ascii_case(&self.digest)
    }
}

impl fmt::Display for LinkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.algorithm, self.digest)
    }
}

/// Find a `#sha256=...` style checksum in a URL
///
/// The first recognized `name=value` after a `#` or `&` wins.
///
/// ```
/// use pyindex::hashes::{extract_link_hash, HashAlgorithm};
///
/// let hash = extract_link_hash("https://x.org/p-1.0.tar.gz#sha256=abc123").unwrap();
/// assert_eq!(hash.algorithm, HashAlgorithm::Sha256);
/// assert_eq!(hash.digest, "abc123");
/// assert!(extract_link_hash("https://x.org/p-1.0.tar.gz").is_none());
/// ```
pub fn extract_link_hash(url: &str) -> Option<LinkHash> {
    let caps = HASH_FRAGMENT_REGEX.captures(url)?;
    let algorithm = caps[1].parse().ok()?;

    Some(LinkHash {
        algorithm,
        digest: caps[2].to_string(),
    })
}

/// Lowercase hex digest of `bytes`
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> String {
    let mut hasher = algorithm.hasher();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash a file in 1 MiB blocks, returning the hex digest and the byte length.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> anyhow::Result<(String, u64)> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = algorithm.hasher();
    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut length = 0u64;

    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        length += n as u64;
        hasher.update(&buf[..n]);
    }

    Ok((hex::encode(hasher.finalize()), length))
}
