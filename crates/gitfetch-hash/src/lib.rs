//! Object identity for the gitfetch fetch-pack client.
//!
//! Provides the 20-byte `ObjectId`, its canonical 40-character lowercase hex
//! form used on the wire, and content hashing for stores that compute
//! addresses themselves.

mod error;
pub mod hasher;
pub mod hex;
mod oid;

pub use error::HashError;
pub use oid::ObjectId;
