use core::fmt;
#[cfg(feature = "std")]
use std::error;

/// The error type for this crate.
///
/// Every fallible operation surfaces one of these; no partial output is
/// ever returned alongside an error.
#[derive(Debug, PartialEq)]
pub enum Error {
    /// The input violates the CoAP wire format.
    InvalidPacket,
    /// A message carries more options than the compile-time bound.
    TooManyOptions,
    /// An option number is neither Class E nor Class U.
    UnknownOption(u16),
    /// An output buffer cannot hold the result.
    BufferTooSmall,
    /// The sender sequence number has exhausted the partial IV space.
    SeqNumOverflow,
    /// The sender ID does not fit the nonce construction.
    IdTooLong,
    /// The OSCORE option value exceeds its cap.
    OscoreValueTooLong,
    /// The AEAD primitive failed.
    Aead,
    /// CBOR encoding failed, usually because a scratch buffer was too
    /// small.
    Cbor,
    /// The HKDF expansion was asked for an invalid output length.
    Hkdf,
}

impl From<serde_cbor::Error> for Error {
    fn from(_: serde_cbor::Error) -> Error {
        Error::Cbor
    }
}

impl From<hkdf::InvalidLength> for Error {
    fn from(_: hkdf::InvalidLength) -> Error {
        Error::Hkdf
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidPacket => {
                write!(f, "Input violates the CoAP wire format")
            }
            Error::TooManyOptions => {
                write!(f, "Message carries too many options")
            }
            Error::UnknownOption(n) => {
                write!(f, "Option {} is neither Class E nor Class U", n)
            }
            Error::BufferTooSmall => {
                write!(f, "Output buffer cannot hold the result")
            }
            Error::SeqNumOverflow => {
                write!(f, "Sender sequence number exhausted")
            }
            Error::IdTooLong => {
                write!(f, "Sender ID does not fit the nonce construction")
            }
            Error::OscoreValueTooLong => {
                write!(f, "OSCORE option value exceeds its cap")
            }
            Error::Aead => write!(f, "Error using AEAD"),
            Error::Cbor => write!(f, "CBOR encoding failed"),
            Error::Hkdf => write!(f, "Invalid HKDF output length"),
        }
    }
}

#[cfg(feature = "std")]
impl error::Error for Error {}
