use digest::Digest;

pub trait Hasher: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self) -> Vec<u8>;
}

/// MD5, as carried by the `Content-MD5` response header.
pub struct Md5Hasher(md5::Md5);

impl Md5Hasher {
    pub const LEN: usize = 16;

    pub fn new() -> Self { Self(md5::Md5::new()) }

    pub fn digest(data: &[u8]) -> Vec<u8> { md5::Md5::digest(data).to_vec() }
}

impl Default for Md5Hasher {
    fn default() -> Self { Self::new() }
}

impl Hasher for Md5Hasher {
    fn update(&mut self, data: &[u8]) { Digest::update(&mut self.0, data); }
    fn finalize(self) -> Vec<u8> { self.0.finalize().to_vec() }
}
