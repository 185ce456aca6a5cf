//! Conditional HTTP retrieval of data file payloads.
//!
//! # Key Features
//!
//! - **Trait Seam**: [`HttpClient`] abstracts the transport; [`ReqwestClient`] is the
//!   production implementation, tests supply canned [`Response`]s
//! - **Conditional Requests**: [`if_modified_since`] renders the publish date of the
//!   currently installed payload as an IMF-fixdate header
//! - **Status Classes**: [`StatusClass`] separates the outcomes a refresh cycle reacts to
//! - **Streaming**: [`download_to_file`] writes the body to disk chunk by chunk

mod conditional;
mod download;
mod error;
mod http;
mod status;

pub use conditional::{CONTENT_MD5, IF_MODIFIED_SINCE, if_modified_since};
pub use download::download_to_file;
pub use error::{FetchError, Result};
pub use http::{BoxStream, HttpClient, Response};
pub use status::StatusClass;

#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
