use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::{Hasher, Result};

/// Streaming reader that hashes data as it passes through.
pub struct VerifiedReader<R, H> {
    reader: R,
    hasher: H,
}

impl<R, H> VerifiedReader<R, H> {
    pub fn new(reader: R, hasher: H) -> Self { Self { reader, hasher } }
}

impl<R: Read, H: Hasher> Read for VerifiedReader<R, H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}

impl<R: Read, H: Hasher> VerifiedReader<R, H> {
    pub fn into_digest(self) -> Vec<u8> { self.hasher.finalize() }
}

/// Hash the full contents of the file at `path`.
pub fn hash_file<H: Hasher>(path: impl AsRef<Path>, hasher: H) -> Result<Vec<u8>> {
    let file = File::open(path.as_ref())?;
    let mut reader = VerifiedReader::new(BufReader::new(file), hasher);
    io::copy(&mut reader, &mut io::sink())?;
    Ok(reader.into_digest())
}
