//! The AEAD algorithms usable for OSCORE protection.

use aes::Aes128;
use ccm::{
    aead::{generic_array::GenericArray, AeadInPlace, NewAead},
    consts::{U13, U8},
    Ccm,
};

use crate::{Error, Result};

/// The largest authentication tag any algorithm in the table produces.
pub(crate) const MAX_TAG_LEN: usize = 8;

/// An AEAD algorithm, identified by its COSE registration.
///
/// Dispatch is a plain match over this table; adding an algorithm means
/// adding a variant and its parameters here.
#[allow(non_camel_case_types)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AeadAlgorithm {
    /// AES-CCM-16-64-128, the OSCORE default.
    AesCcm16_64_128,
}

impl AeadAlgorithm {
    /// The COSE algorithm identifier carried in the AAD.
    pub fn cose_value(self) -> u8 {
        match self {
            AeadAlgorithm::AesCcm16_64_128 => 10,
        }
    }

    /// The AEAD key size in bytes.
    pub fn key_len(self) -> usize {
        match self {
            AeadAlgorithm::AesCcm16_64_128 => 16,
        }
    }

    /// The AEAD nonce size in bytes.
    pub fn nonce_len(self) -> usize {
        match self {
            AeadAlgorithm::AesCcm16_64_128 => 13,
        }
    }

    /// The authentication tag size in bytes.
    pub fn tag_len(self) -> usize {
        match self {
            AeadAlgorithm::AesCcm16_64_128 => 8,
        }
    }

    /// Encrypts `buf[..plaintext_len]` in place and appends the tag,
    /// returning the total ciphertext length.
    pub fn encrypt(
        self,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        buf: &mut [u8],
        plaintext_len: usize,
    ) -> Result<usize> {
        if key.len() != self.key_len() || nonce.len() != self.nonce_len() {
            return Err(Error::Aead);
        }
        let ciphertext_len = plaintext_len + self.tag_len();
        if buf.len() < ciphertext_len {
            return Err(Error::BufferTooSmall);
        }

        match self {
            AeadAlgorithm::AesCcm16_64_128 => {
                let ccm: Ccm<Aes128, U8, U13> =
                    Ccm::new(GenericArray::from_slice(key));
                let tag = ccm
                    .encrypt_in_place_detached(
                        GenericArray::from_slice(nonce),
                        aad,
                        &mut buf[..plaintext_len],
                    )
                    .map_err(|_| Error::Aead)?;
                buf[plaintext_len..ciphertext_len]
                    .copy_from_slice(tag.as_slice());
            }
        }

        Ok(ciphertext_len)
    }
}
