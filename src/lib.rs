//! Python package index client: link extraction, URL quoting, checksum
//! fragments and PEP 440 version specifiers.

pub mod hashes;
pub mod html;
pub mod link;
pub mod pep440;
pub mod quoting;
pub mod simple;
