//! Digest-verifying reader.

use std::io::{self, Read};

use cloudkeep_core::domain::Digest;
use sha2::{Digest as _, Sha256};

use crate::digest_from_hasher;

/// Wraps a reader and checks the running SHA-256 against an expected digest
/// once the stream is fully consumed.
///
/// Every byte handed to the caller has passed through the hasher before EOF
/// is reported, so a reader that returns `Ok(0)` has already been verified.
/// A mismatch surfaces as an `InvalidData` I/O error. Callers that stop
/// early can call [`VerifyingReader::verify_to_end`] to drain and check the
/// remainder.
pub struct VerifyingReader<R: Read> {
    inner: R,
    expected: Digest,
    hasher: Sha256,
    verified: bool,
}

impl<R: Read> VerifyingReader<R> {
    pub fn new(inner: R, expected: Digest) -> Self {
        Self {
            inner,
            expected,
            hasher: Sha256::new(),
            verified: false,
        }
    }

    /// The digest this reader checks against.
    pub fn expected(&self) -> &Digest {
        &self.expected
    }

    fn check(&mut self) -> io::Result<()> {
        if self.verified {
            return Ok(());
        }
        self.verified = true;
        let actual = digest_from_hasher(self.hasher.clone());
        if actual != self.expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("digest mismatch: expected {}, got {actual}", self.expected),
            ));
        }
        Ok(())
    }

    /// Consume the rest of the stream and run the digest check.
    pub fn verify_to_end(mut self) -> io::Result<()> {
        let mut buf = [0u8; 65536];
        loop {
            match self.inner.read(&mut buf)? {
                0 => break,
                n => self.hasher.update(&buf[..n]),
            }
        }
        self.check()
    }
}

impl<R: Read> Read for VerifyingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
        } else {
            self.check()?;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute_digest;

    #[test]
    fn read_to_end_passes_on_match() {
        let data = b"hello world\n";
        let mut reader = VerifyingReader::new(&data[..], compute_digest(data));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn read_to_end_fails_on_mismatch() {
        let data = b"hello world\n";
        let wrong = compute_digest(b"something else");
        let mut reader = VerifyingReader::new(&data[..], wrong);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn empty_stream_verifies_empty_digest() {
        let mut reader = VerifyingReader::new(&b""[..], compute_digest(b""));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn verify_to_end_drains_unread_remainder() {
        let data = b"0123456789";
        let mut reader = VerifyingReader::new(&data[..], compute_digest(data));
        let mut head = [0u8; 4];
        reader.read_exact(&mut head).unwrap();
        reader.verify_to_end().unwrap();
    }

    #[test]
    fn verify_to_end_detects_corruption() {
        let reader = VerifyingReader::new(&b"tampered"[..], compute_digest(b"original"));
        assert!(reader.verify_to_end().is_err());
    }
}
