//! The double-SHA-256 digest that identifies blocks and transactions.

use sha2::{Digest, Sha256};
use std::io;

/// Computes SHA256(SHA256(data)).
pub fn digest(data: &[u8]) -> [u8; 32] {
    let inner = Sha256::digest(data);
    let outer = Sha256::digest(&inner);
    let mut result = [0u8; 32];
    result.copy_from_slice(&outer);
    result
}

/// A writer that calculates SHA256(SHA256(data)) for the data written to it.
#[derive(Default)]
pub struct Writer {
    hash: Sha256,
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hash.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Writer {
    /// Consume the writer and produce the hash of everything written so far.
    pub fn finish(self) -> [u8; 32] {
        let inner = self.hash.finalize();
        let outer = Sha256::digest(&inner);
        let mut result = [0u8; 32];
        result.copy_from_slice(&outer);
        result
    }
}

/// A 4-byte checksum: the first four bytes of a sha256d digest.
///
/// Used in the wire message envelope to cheaply detect corruption.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Checksum(pub [u8; 4]);

impl<'a> From<&'a [u8]> for Checksum {
    fn from(bytes: &'a [u8]) -> Self {
        let hash = digest(bytes);
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&hash[0..4]);
        Self(checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn writer_matches_digest() {
        let data = b"thunderbolt";
        let mut writer = Writer::default();
        writer.write_all(&data[..]).unwrap();
        assert_eq!(writer.finish(), digest(&data[..]));
    }

    #[test]
    fn checksum_is_digest_prefix() {
        let data = b"checksum me";
        let checksum = Checksum::from(&data[..]);
        assert_eq!(checksum.0[..], digest(&data[..])[0..4]);
    }
}
