//! Streaming SHA-256 over archive bytes
//!
//! [`HashingWriter`] sits between the compressor and the archive file. Every
//! byte that reaches the file passes through it once, so the digest is known
//! the moment the stream is finished without buffering or re-reading the
//! archive.

use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};

use crate::types::IDENTITY_LEN;

/// Full digest of an archive stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    hex: String,
}

impl ContentDigest {
    fn from_hasher(hasher: Sha256) -> Self {
        Self {
            hex: hex::encode(hasher.finalize()),
        }
    }

    /// Full lowercase hex digest (64 characters)
    pub fn as_hex(&self) -> &str {
        &self.hex
    }

    /// Short identity used to name snapshots
    pub fn identity(&self) -> String {
        self.hex[..IDENTITY_LEN].to_string()
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hex)
    }
}

/// Writer adapter that hashes everything written through it
#[derive(Debug)]
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
    bytes: u64,
}

impl<W: Write> HashingWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    /// Bytes observed so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Flush the inner writer and return it with the digest
    pub fn finalize(mut self) -> io::Result<(W, ContentDigest, u64)> {
        self.inner.flush()?;
        Ok((self.inner, ContentDigest::from_hasher(self.hasher), self.bytes))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Only the bytes the inner writer accepted are hashed.
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Hash a reader to the end using an 8KB buffer
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<ContentDigest> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(ContentDigest::from_hasher(hasher))
}
