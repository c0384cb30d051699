//! An OSCORE (RFC 8613) sender for constrained environments.
//!
//! This crate turns plaintext CoAP messages into OSCORE-protected ones
//! under a [`SecurityContext`](oscore::SecurityContext). It is written for
//! endpoints where message size and bit-exact RFC conformance matter: all
//! buffers are caller-provided or stack-allocated with compile-time
//! bounds, and nothing is ever heap-allocated.
//!
//! The inverse direction (unprotecting received OSCORE messages) and the
//! EDHOC key exchange are out of scope; the security context is assumed to
//! be bootstrapped from a master secret and salt.

#![no_std]

#[cfg(any(feature = "std", test))]
extern crate std;

mod cbor;
mod error;

pub mod coap;
pub mod oscore;

pub use error::Error;

/// The result type for operations of this crate.
pub type Result<T> = core::result::Result<T, Error>;
