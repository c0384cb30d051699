//! Helpful functionality around the `serde_cbor` crate.

use serde::Serialize;
use serde_cbor::ser::{SliceWrite, Serializer};

use crate::Result;

/// Serializes an object into CBOR at the front of `buf`.
///
/// Returns the number of bytes written. Unlike a growable writer, this
/// fails when `buf` cannot hold the encoding, which keeps the crate free
/// of allocations.
pub fn encode(object: impl Serialize, buf: &mut [u8]) -> Result<usize> {
    let writer = SliceWrite::new(buf);
    let mut serializer = Serializer::new(writer);
    object.serialize(&mut serializer)?;
    let writer = serializer.into_inner();

    Ok(writer.bytes_written())
}
