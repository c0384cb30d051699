//! Helpers for partial IV handling, nonce derivation, AAD construction and
//! the OSCORE option value.

use serde_bytes::Bytes;

use super::aead::AeadAlgorithm;
use crate::{cbor, Error, Result};

/// AEAD key length in bytes.
pub const KEY_LEN: usize = 16;
/// AEAD nonce length in bytes.
pub const NONCE_LEN: usize = 13;
/// Maximal encoded partial IV length (RFC 8613 §6.1 caps it at 5 bytes).
pub const MAX_PIV_LEN: usize = 5;
/// Maximal sender ID length usable in the nonce construction.
pub const MAX_KID_LEN: usize = NONCE_LEN - 6;
/// Maximal ID context length.
pub const MAX_ID_CONTEXT_LEN: usize = 8;
/// Cap on the OSCORE option value: flag byte, partial IV, length-prefixed
/// KID context and KID.
pub const OSCORE_OPT_VALUE_LEN: usize =
    2 + MAX_PIV_LEN + MAX_ID_CONTEXT_LEN + MAX_KID_LEN;
/// Scratch size for the Encrypt0 AAD.
pub const MAX_AAD_LEN: usize = 64;

/// The sequence number space is limited by the 5 byte partial IV.
pub(crate) const MAX_SEQ_NUM: u64 = (1 << 40) - 1;

/// A partial IV: the minimally encoded sender sequence number.
pub type Piv = heapless::Vec<u8, MAX_PIV_LEN>;

/// Returns the partial IV for a sequence number: its minimal big-endian
/// encoding, a single zero byte for zero.
pub(crate) fn piv_from_seq_num(seq_num: u64) -> Result<Piv> {
    if seq_num > MAX_SEQ_NUM {
        return Err(Error::SeqNumOverflow);
    }
    let bytes = seq_num.to_be_bytes();
    // Skip leading zero bytes, but keep one for the number zero
    let first_nonzero =
        bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);

    Piv::from_slice(&bytes[first_nonzero..]).map_err(|_| Error::SeqNumOverflow)
}

/// Derives the AEAD nonce from the partial IV, the ID of the party that
/// generated it and the common IV (RFC 8613 §5.2).
pub(crate) fn compute_nonce(
    mut piv: &[u8],
    id_piv: &[u8],
    common_iv: &[u8; NONCE_LEN],
) -> Result<[u8; NONCE_LEN]> {
    if id_piv.len() > MAX_KID_LEN {
        return Err(Error::IdTooLong);
    }
    if piv.len() > MAX_PIV_LEN {
        piv = &piv[piv.len() - MAX_PIV_LEN..];
    }

    let mut nonce = [0; NONCE_LEN];
    // The size of the ID (a single byte S), then the ID left-padded with
    // zeros to exactly nonce length minus 6 bytes, then the partial IV
    // left-padded with zeros to exactly 5 bytes
    nonce[0] = id_piv.len() as u8;
    nonce[1 + MAX_KID_LEN - id_piv.len()..NONCE_LEN - MAX_PIV_LEN]
        .copy_from_slice(id_piv);
    nonce[NONCE_LEN - piv.len()..].copy_from_slice(piv);
    // XOR with common IV
    for (nonce_byte, iv_byte) in nonce.iter_mut().zip(common_iv.iter()) {
        *nonce_byte ^= iv_byte;
    }

    Ok(nonce)
}

/// Encodes the `external_aad` array (RFC 8613 §5.4) into `buf`.
///
/// There's no argument for class I options, because the standard doesn't
/// define any at this point.
pub(crate) fn build_aad_array(
    alg: AeadAlgorithm,
    request_kid: &[u8],
    request_piv: &[u8],
    buf: &mut [u8],
) -> Result<usize> {
    // (oscore_version, algorithms, request_kid, request_piv, options)
    let array = (
        1,
        [alg.cose_value()],
        Bytes::new(request_kid),
        Bytes::new(request_piv),
        Bytes::new(&[]),
    );

    cbor::encode(array, buf)
}

/// Encodes the COSE `Encrypt0` structure wrapping the external AAD into
/// `buf`, returning the bytes passed to the AEAD.
pub(crate) fn build_aad(
    alg: AeadAlgorithm,
    request_kid: &[u8],
    request_piv: &[u8],
    buf: &mut [u8],
) -> Result<usize> {
    // First we need to construct the AAD array containing our parameters
    let mut array_buf = [0; MAX_AAD_LEN];
    let array_len =
        build_aad_array(alg, request_kid, request_piv, &mut array_buf)?;
    // Then we pack it into an Encrypt0 structure
    let enc_structure =
        ("Encrypt0", Bytes::new(&[]), Bytes::new(&array_buf[..array_len]));

    cbor::encode(enc_structure, buf)
}

/// Builds the OSCORE option value: the flag byte, the partial IV, the
/// length-prefixed KID context if there is one, and the KID (RFC 8613
/// §6.1).
///
/// The KID flag is always set here; requests carry the KID even when the
/// sender ID is empty. Responses without a fresh partial IV get an empty
/// option value instead and never reach this function.
pub(crate) fn build_oscore_option(
    piv: &[u8],
    kid: &[u8],
    kid_context: Option<&[u8]>,
    buf: &mut [u8],
) -> Result<usize> {
    let length = 1
        + piv.len()
        + kid_context.map_or(0, |context| 1 + context.len())
        + kid.len();
    if length > buf.len() {
        return Err(Error::OscoreValueTooLong);
    }

    // Set the partial IV length (3 least significant bits of flag byte)
    buf[0] = piv.len() as u8 & 0b0000_0111;
    let mut pos = 1;
    buf[pos..pos + piv.len()].copy_from_slice(piv);
    pos += piv.len();

    if let Some(context) = kid_context {
        // Set the kid context flag and the single length byte s
        buf[0] |= 0b0001_0000;
        buf[pos] = context.len() as u8;
        pos += 1;
        buf[pos..pos + context.len()].copy_from_slice(context);
        pos += context.len();
    }

    // Set the kid flag
    buf[0] |= 0b0000_1000;
    buf[pos..pos + kid.len()].copy_from_slice(kid);
    pos += kid.len();

    Ok(pos)
}

#[cfg(test)]
mod tests {
    use super::super::test_vectors::*;
    use super::*;

    #[test]
    fn piv_format() {
        assert_eq!([0x00], piv_from_seq_num(0).unwrap()[..]);
        assert_eq!([0x14], piv_from_seq_num(20).unwrap()[..]);
        assert_eq!([0xFF], piv_from_seq_num(0xFF).unwrap()[..]);
        assert_eq!([0x01, 0x00], piv_from_seq_num(0x100).unwrap()[..]);
        assert_eq!(
            [0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
            piv_from_seq_num(MAX_SEQ_NUM).unwrap()[..]
        );
        assert_eq!(
            Error::SeqNumOverflow,
            piv_from_seq_num(MAX_SEQ_NUM + 1).unwrap_err()
        );
    }

    #[test]
    fn nonce() {
        // With an all-zero common IV the nonce is the padded S, ID, PIV
        // concatenation itself
        let pre_nonce = [
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x14,
        ];
        assert_eq!(
            pre_nonce,
            compute_nonce(&[0x14], &[0x00], &[0; NONCE_LEN]).unwrap()
        );

        // XORing the common IV in is the last step
        let mut expected = pre_nonce;
        for (byte, iv) in expected.iter_mut().zip(COMMON_IV.iter()) {
            *byte ^= iv;
        }
        assert_eq!(
            expected,
            compute_nonce(&[0x14], &[0x00], &COMMON_IV).unwrap()
        );
    }

    #[test]
    fn nonce_empty_sender_id() {
        let mut expected = [0; NONCE_LEN];
        expected[NONCE_LEN - 1] = 0x01;
        for (byte, iv) in expected.iter_mut().zip(COMMON_IV.iter()) {
            *byte ^= iv;
        }
        assert_eq!(expected, compute_nonce(&[0x01], &[], &COMMON_IV).unwrap());
    }

    #[test]
    fn nonce_rejects_long_id() {
        assert_eq!(
            Error::IdTooLong,
            compute_nonce(&[0x01], &[0; MAX_KID_LEN + 1], &COMMON_IV)
                .unwrap_err()
        );
    }

    #[test]
    fn aad_array() {
        let mut buf = [0; MAX_AAD_LEN];
        let len = build_aad_array(
            AeadAlgorithm::AesCcm16_64_128,
            &[],
            &[0x14],
            &mut buf,
        )
        .unwrap();
        // [1, [10], h'', h'14', h'']
        assert_eq!(
            [0x85, 0x01, 0x81, 0x0A, 0x40, 0x41, 0x14, 0x40],
            buf[..len]
        );

        let len = build_aad_array(
            AeadAlgorithm::AesCcm16_64_128,
            &[0x00],
            &[0x14],
            &mut buf,
        )
        .unwrap();
        // [1, [10], h'00', h'14', h'']
        assert_eq!(
            [0x85, 0x01, 0x81, 0x0A, 0x41, 0x00, 0x41, 0x14, 0x40],
            buf[..len]
        );
    }

    #[test]
    fn aad() {
        let mut buf = [0; MAX_AAD_LEN];
        let len =
            build_aad(AeadAlgorithm::AesCcm16_64_128, &[], &[0x14], &mut buf)
                .unwrap();
        // ["Encrypt0", h'', bstr wrapped external_aad]
        assert_eq!(
            [
                0x83, 0x68, 0x45, 0x6E, 0x63, 0x72, 0x79, 0x70, 0x74, 0x30,
                0x40, 0x48, 0x85, 0x01, 0x81, 0x0A, 0x40, 0x41, 0x14, 0x40,
            ],
            buf[..len]
        );
    }

    #[test]
    fn option_value() {
        let mut buf = [0; OSCORE_OPT_VALUE_LEN];

        // Fresh PIV, one byte KID, no KID context
        let len =
            build_oscore_option(&[0x14], &[0x00], None, &mut buf).unwrap();
        assert_eq!([0x09, 0x14, 0x00], buf[..len]);

        // Empty KID still sets the kid flag
        let len = build_oscore_option(&[0x05], &[], None, &mut buf).unwrap();
        assert_eq!([0x09, 0x05], buf[..len]);

        // KID context is length-prefixed and flagged
        let len = build_oscore_option(
            &[0x05],
            &[],
            Some(&[0x37, 0xCB, 0xF3, 0x21, 0x00, 0x17, 0xA2, 0xD3]),
            &mut buf,
        )
        .unwrap();
        assert_eq!(
            [
                0x19, 0x05, 0x08, 0x37, 0xCB, 0xF3, 0x21, 0x00, 0x17, 0xA2,
                0xD3,
            ],
            buf[..len]
        );
    }

    #[test]
    fn option_value_cap() {
        let mut buf = [0; 4];
        assert_eq!(
            Error::OscoreValueTooLong,
            build_oscore_option(&[0x01, 0x02, 0x03], &[0x42], None, &mut buf)
                .unwrap_err()
        );
    }
}
