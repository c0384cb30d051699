use heapless::Vec;
use hkdf::Hkdf;
use serde_bytes::Bytes;
use sha2::Sha256;

use super::{aead::AeadAlgorithm, util};
use crate::{cbor, coap, Error, Result};

/// Maximal length of a cached ECHO option value (RFC 9175 §2.2).
pub const MAX_ECHO_LEN: usize = 40;

/// Scratch size for the CBOR `info` structure driving the HKDF expansion.
const MAX_INFO_LEN: usize = 32;

/// The common context part of the security context.
#[derive(Debug)]
struct CommonContext {
    common_iv: [u8; util::NONCE_LEN],
    id_context: Option<Vec<u8, { util::MAX_ID_CONTEXT_LEN }>>,
    aead_alg: AeadAlgorithm,
}

/// The sender context part of the security context.
#[derive(Debug)]
struct SenderContext {
    sender_id: Vec<u8, { util::MAX_KID_LEN }>,
    sender_key: [u8; util::KEY_LEN],
    sender_seq_num: u64,
}

/// Cached request parameters shared between the two directions of an
/// exchange, plus the reboot recovery state.
#[derive(Debug)]
struct ExchangeCache {
    request_kid: Vec<u8, { util::MAX_KID_LEN }>,
    request_piv: util::Piv,
    nonce: [u8; util::NONCE_LEN],
    echo_opt_val: Option<Vec<u8, MAX_ECHO_LEN>>,
    reboot: bool,
}

/// The security context.
///
/// Holds the long-lived sender state and is mutated once per protected
/// message. Concurrent protection under the same context must be
/// serialized by the caller; the sequence number is consumed without gaps
/// and the request cache is updated in place.
#[derive(Debug)]
pub struct SecurityContext {
    common: CommonContext,
    sender: SenderContext,
    cache: ExchangeCache,
}

impl SecurityContext {
    /// Creates a new `SecurityContext`, deriving the sender key and the
    /// common IV from the master secret and salt (RFC 8613 §3.2).
    ///
    /// The sequence number starts at zero and the reboot flag is set, as
    /// on any fresh start. A host restoring persisted state calls
    /// [`restore_sequence_number`](SecurityContext::restore_sequence_number)
    /// afterwards.
    pub fn new(
        master_secret: &[u8],
        master_salt: &[u8],
        sender_id: &[u8],
        id_context: Option<&[u8]>,
    ) -> Result<SecurityContext> {
        let aead_alg = AeadAlgorithm::AesCcm16_64_128;
        let sender_id =
            Vec::from_slice(sender_id).map_err(|_| Error::IdTooLong)?;
        let id_context = match id_context {
            Some(bytes) => {
                Some(Vec::from_slice(bytes).map_err(|_| Error::IdTooLong)?)
            }
            None => None,
        };

        // Derive the key and IV
        let mut sender_key = [0; util::KEY_LEN];
        hkdf(
            master_secret,
            master_salt,
            &sender_id,
            id_context.as_deref(),
            aead_alg,
            "Key",
            &mut sender_key,
        )?;
        let mut common_iv = [0; util::NONCE_LEN];
        hkdf(
            master_secret,
            master_salt,
            &[],
            id_context.as_deref(),
            aead_alg,
            "IV",
            &mut common_iv,
        )?;

        Ok(SecurityContext {
            common: CommonContext {
                common_iv,
                id_context,
                aead_alg,
            },
            sender: SenderContext {
                sender_id,
                sender_key,
                sender_seq_num: 0,
            },
            cache: ExchangeCache {
                request_kid: Vec::new(),
                request_piv: util::Piv::new(),
                nonce: [0; util::NONCE_LEN],
                echo_opt_val: None,
                reboot: true,
            },
        })
    }

    /// Returns the partial IV for this message and burns the sequence
    /// number.
    ///
    /// The number stays consumed even if a later pipeline step fails,
    /// since reusing it under the same key would void the AEAD
    /// guarantees.
    pub(crate) fn acquire_sender_piv(&mut self) -> Result<util::Piv> {
        let piv = util::piv_from_seq_num(self.sender.sender_seq_num)?;
        self.sender.sender_seq_num += 1;

        Ok(piv)
    }

    /// Records the parameters matching responses will bind their AAD to.
    pub(crate) fn remember_request(&mut self, piv: &util::Piv) {
        self.cache.request_kid = self.sender.sender_id.clone();
        self.cache.request_piv = piv.clone();
    }

    /// Caches the ECHO value from the first response after reboot and
    /// clears the reboot flag.
    pub(crate) fn cache_echo(
        &mut self,
        inner_options: &[coap::Opt],
    ) -> Result<()> {
        if let Some(echo) =
            inner_options.iter().find(|option| option.number == coap::ECHO)
        {
            self.cache.echo_opt_val = Some(
                Vec::from_slice(echo.value)
                    .map_err(|_| Error::BufferTooSmall)?,
            );
        }
        self.cache.reboot = false;

        Ok(())
    }

    /// Computes the nonce for this message and caches it.
    pub(crate) fn refresh_nonce(&mut self, piv: &[u8]) -> Result<()> {
        self.cache.nonce = util::compute_nonce(
            piv,
            &self.sender.sender_id,
            &self.common.common_iv,
        )?;

        Ok(())
    }

    /// Encodes the Encrypt0 AAD for the cached request parameters into
    /// `buf`.
    pub(crate) fn build_aad(&self, buf: &mut [u8]) -> Result<usize> {
        util::build_aad(
            self.common.aead_alg,
            &self.cache.request_kid,
            &self.cache.request_piv,
            buf,
        )
    }

    pub(crate) fn aead_alg(&self) -> AeadAlgorithm {
        self.common.aead_alg
    }

    pub(crate) fn sender_id(&self) -> &[u8] {
        &self.sender.sender_id
    }

    pub(crate) fn id_context(&self) -> Option<&[u8]> {
        self.common.id_context.as_deref()
    }

    pub(crate) fn sender_key(&self) -> &[u8] {
        &self.sender.sender_key
    }

    pub(crate) fn nonce(&self) -> &[u8] {
        &self.cache.nonce
    }

    /// Whether the context is still in post-restart recovery, i.e. no
    /// response has been protected since it was created.
    pub fn reboot(&self) -> bool {
        self.cache.reboot
    }

    /// The next sequence number to be consumed.
    ///
    /// Hosts persist this so a restart never reuses a number; writing it
    /// back goes through
    /// [`restore_sequence_number`](SecurityContext::restore_sequence_number).
    pub fn sequence_number(&self) -> u64 {
        self.sender.sender_seq_num
    }

    /// Restores a persisted sequence number after a restart.
    ///
    /// Any safety margin added on top of the persisted value is the
    /// host's responsibility. The reboot flag stays set until the first
    /// protected response re-establishes freshness.
    pub fn restore_sequence_number(&mut self, seq_num: u64) {
        self.sender.sender_seq_num = seq_num;
    }

    /// Primes the request cache with the parameters of an incoming
    /// request.
    ///
    /// The receive path records the request KID, partial IV and nonce
    /// here, so the matching plain response can be protected without a
    /// fresh partial IV.
    pub fn cache_request(
        &mut self,
        kid: &[u8],
        piv: &[u8],
        nonce: [u8; util::NONCE_LEN],
    ) -> Result<()> {
        self.cache.request_kid =
            Vec::from_slice(kid).map_err(|_| Error::IdTooLong)?;
        // A partial IV beyond 5 bytes encodes a sequence number outside
        // the allowed space
        self.cache.request_piv =
            util::Piv::from_slice(piv).map_err(|_| Error::SeqNumOverflow)?;
        self.cache.nonce = nonce;

        Ok(())
    }

    /// The ECHO option value cached from the first response after reboot,
    /// if one has been seen.
    pub fn echo_value(&self) -> Option<&[u8]> {
        self.cache.echo_opt_val.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn common_iv(&self) -> &[u8; util::NONCE_LEN] {
        &self.common.common_iv
    }
}

/// Runs the HKDF expansion for one derived parameter (RFC 8613 §3.2.1).
fn hkdf(
    master_secret: &[u8],
    master_salt: &[u8],
    id: &[u8],
    id_context: Option<&[u8]>,
    aead_alg: AeadAlgorithm,
    kind: &str,
    okm: &mut [u8],
) -> Result<()> {
    let mut info_buf = [0; MAX_INFO_LEN];
    let info_len =
        build_info(id, id_context, aead_alg, kind, okm.len(), &mut info_buf)?;

    // The extract step results in the pseudorandom key, which the expand
    // step stretches to the desired output keying material
    let extracted = Hkdf::<Sha256>::new(Some(master_salt), master_secret);
    extracted.expand(&info_buf[..info_len], okm)?;

    Ok(())
}

/// Encodes the CBOR `info` structure for the HKDF expansion into `buf`.
fn build_info(
    id: &[u8],
    id_context: Option<&[u8]>,
    aead_alg: AeadAlgorithm,
    kind: &str,
    l: usize,
    buf: &mut [u8],
) -> Result<usize> {
    // (id, id_context, alg_aead, type, L)
    let info = (
        Bytes::new(id),
        id_context.map(Bytes::new),
        aead_alg.cose_value(),
        kind,
        l,
    );

    cbor::encode(info, buf)
}
