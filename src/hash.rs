// Content identifiers for blobs and layers.
//
// A Hash is rendered the way registries expect it in manifests and blob
// URLs: `sha256:<64 lowercase hex chars>`.
use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;
use std::sync::OnceLock;

/// Hashing scheme used for content addressing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Sha256,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An algorithm tag paired with the digest it produced.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash {
    algorithm: Algorithm,
    bytes: [u8; 32],
}

impl Hash {
    pub fn new(algorithm: Algorithm, bytes: [u8; 32]) -> Hash {
        Hash { algorithm, bytes }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Lowercase hex of the digest, without the algorithm prefix.
    pub fn hex(&self) -> String {
        hex::encode(self.bytes)
    }

    fn from_sha256(digest: Sha256) -> Hash {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest.result());
        Hash::new(Algorithm::Sha256, bytes)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex())
    }
}

// Debug prints the same as Display, it's what shows up in assert failures.
impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Hash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Hash> {
        static RE: OnceLock<regex::Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            regex::Regex::new(r"^(?P<algorithm>[a-z0-9]+):(?P<hex>[0-9a-f]{64})$")
                .expect("static regex")
        });
        let caps = re
            .captures(s)
            .ok_or_else(|| Error::InvalidHash(s.to_string()))?;
        let algorithm = match &caps["algorithm"] {
            "sha256" => Algorithm::Sha256,
            _ => return Err(Error::InvalidHash(s.to_string())),
        };
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&caps["hex"], &mut bytes)
            .map_err(|_| Error::InvalidHash(s.to_string()))?;
        Ok(Hash::new(algorithm, bytes))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Hash, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Digests `reader` to the end, returning the hash and the number of bytes read.
pub fn sha256<R: Read>(mut reader: R) -> Result<(Hash, u64)> {
    let mut hasher = Sha256::new();
    let size = io::copy(&mut reader, &mut hasher).map_err(Error::HashComputationFailed)?;
    let hash = Hash::from_sha256(hasher);
    debug!("computed {} over {} bytes", hash, size);
    Ok((hash, size))
}

/// Forwards writes to `inner` while hashing and counting them, so a blob
/// can be written and identified in one pass.
pub struct HashAndWrite<W: Write> {
    inner: W,
    digest: Sha256,
    size: u64,
}

impl<W: Write> HashAndWrite<W> {
    pub fn new(inner: W) -> HashAndWrite<W> {
        HashAndWrite {
            inner,
            digest: Sha256::new(),
            size: 0,
        }
    }

    /// Returns the writer together with the hash of everything written to it.
    pub fn finish(self) -> (W, Hash, u64) {
        (self.inner, Hash::from_sha256(self.digest), self.size)
    }
}

impl<W: Write> Write for HashAndWrite<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // only hash what the inner writer accepted
        let n = self.inner.write(buf)?;
        self.digest.input(&buf[..n]);
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
