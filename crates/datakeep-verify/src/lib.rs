//! Content verification for downloaded data files.
//!
//! Hashes a payload incrementally and compares it with the digest the server
//! announced, usually through a `Content-MD5` response header.
//!
//! # Example
//!
//! ```
//! use datakeep_verify::{ExpectedDigest, Hasher, Md5Hasher, VerifiedReader};
//!
//! let data = b"hello world";
//! let expected = ExpectedDigest::parse("XrY7u+Ae7tCTyyK7j1rNww==", Md5Hasher::LEN).unwrap();
//!
//! let mut reader = VerifiedReader::new(&data[..], Md5Hasher::new());
//! std::io::copy(&mut reader, &mut std::io::sink()).unwrap();
//!
//! expected.verify(&reader.into_digest()).unwrap();
//! ```

pub use self::expected::ExpectedDigest;
pub use self::error::{Result, VerificationError};
pub use self::hasher::{Hasher, Md5Hasher};
pub use self::reader::{VerifiedReader, hash_file};

mod error;
mod expected;
mod hasher;
mod reader;
