//! OSCORE sender-side protection.
//!
//! The entry point is [`coap2oscore`], which runs the full pipeline over
//! one outbound message: parse, split the options into their encryption
//! classes, build the plaintext, generate the OSCORE option, derive the
//! AAD, encrypt, and assemble the outer message. The only state it
//! touches is the [`SecurityContext`].

mod aead;
mod context;
#[cfg(test)]
mod test_vectors;
mod util;

use log::trace;

pub use aead::AeadAlgorithm;
pub use context::{SecurityContext, MAX_ECHO_LEN};
pub use util::{
    KEY_LEN, MAX_AAD_LEN, MAX_ID_CONTEXT_LEN, MAX_KID_LEN, MAX_PIV_LEN,
    NONCE_LEN, OSCORE_OPT_VALUE_LEN,
};

use crate::{
    coap,
    coap::{Message, MessageType, Opt},
    Error, Result,
};

/// Upper bound on one message's plaintext: the code byte, the serialized
/// inner options and the payload.
pub const MAX_PLAINTEXT_LEN: usize = 1024;
/// Upper bound on one message's ciphertext, plaintext plus tag.
pub const MAX_CIPHERTEXT_LEN: usize = MAX_PLAINTEXT_LEN + aead::MAX_TAG_LEN;

type OptionList<'a> = heapless::Vec<Opt<'a>, { coap::MAX_OPTION_COUNT }>;

/// Converts a CoAP message into its OSCORE-protected counterpart.
///
/// Writes the protected message into `output` and returns its length.
/// Messaging-layer packets (empty ACKs) are passed through verbatim, as
/// RFC 8613 §4.2 requires.
///
/// The security context is updated in the process, so concurrent calls on
/// the same context must be serialized by the caller. Once a sequence
/// number has been consumed, a later failure does not give it back;
/// callers must not transmit anything on error.
pub fn coap2oscore(
    input: &[u8],
    output: &mut [u8],
    ctx: &mut SecurityContext,
) -> Result<usize> {
    trace!("protecting CoAP message ({} bytes)", input.len());
    let msg = coap::parse(input)?;

    // Messaging layer packet: protection is dismissed and the raw input
    // copied out
    if msg.code == coap::CODE_EMPTY
        && msg.mtype == MessageType::Acknowledgement
    {
        trace!("messaging layer packet, protection dismissed");
        if output.len() < input.len() {
            return Err(Error::BufferTooSmall);
        }
        output[..input.len()].copy_from_slice(input);
        return Ok(input.len());
    }

    let (inner, outer, inner_len) = inner_outer_split(&msg)?;
    trace!(
        "split into {} inner ({} bytes) and {} outer options",
        inner.len(),
        inner_len,
        outer.len()
    );

    // The plaintext is assembled at the front of the ciphertext buffer
    // and encrypted in place
    let mut ciphertext = [0; MAX_CIPHERTEXT_LEN];
    let plaintext_len =
        build_plaintext(&msg, &inner, &mut ciphertext[..MAX_PLAINTEXT_LEN])?;

    // The OSCORE option only carries a value when a fresh partial IV is
    // needed: requests, observe exchanges and the recovery messages after
    // a reboot. Plain responses reuse the cached request parameters.
    let request = coap::is_request(msg.code);
    let observe = outer.iter().any(|option| option.number == coap::OBSERVE);
    let mut option_value = [0; OSCORE_OPT_VALUE_LEN];
    let option_len = if request || observe || ctx.reboot() {
        let piv = ctx.acquire_sender_piv()?;
        if request || ctx.reboot() {
            ctx.remember_request(&piv);
        }
        if ctx.reboot() && !request {
            ctx.cache_echo(&inner)?;
        }
        ctx.refresh_nonce(&piv)?;
        util::build_oscore_option(
            &piv,
            ctx.sender_id(),
            ctx.id_context(),
            &mut option_value,
        )?
    } else {
        0
    };
    trace!("OSCORE option value: {:02X?}", &option_value[..option_len]);

    let mut aad = [0; MAX_AAD_LEN];
    let aad_len = ctx.build_aad(&mut aad)?;

    let ciphertext_len = ctx.aead_alg().encrypt(
        ctx.sender_key(),
        ctx.nonce(),
        &aad[..aad_len],
        &mut ciphertext,
        plaintext_len,
    )?;

    let oscore_option = Opt {
        number: coap::OSCORE,
        value: &option_value[..option_len],
    };
    assemble(
        &msg,
        &outer,
        oscore_option,
        &ciphertext[..ciphertext_len],
        output,
    )
}

/// Class E option numbers (RFC 8613 §4.1): encrypted and integrity
/// protected.
fn is_class_e(number: u16) -> bool {
    matches!(
        number,
        coap::IF_MATCH
            | coap::ETAG
            | coap::IF_NONE_MATCH
            | coap::OBSERVE
            | coap::LOCATION_PATH
            | coap::URI_PATH
            | coap::CONTENT_FORMAT
            | coap::MAX_AGE
            | coap::URI_QUERY
            | coap::ACCEPT
            | coap::LOCATION_QUERY
            | coap::BLOCK2
            | coap::BLOCK1
            | coap::SIZE2
            | coap::SIZE1
            | coap::ECHO
            | coap::NO_RESPONSE
    )
}

/// Class U option numbers (RFC 8613 §4.1): left visible for proxies.
fn is_class_u(number: u16) -> bool {
    matches!(
        number,
        coap::URI_HOST
            | coap::URI_PORT
            | coap::OSCORE
            | coap::PROXY_URI
            | coap::PROXY_SCHEME
    )
}

/// Partitions the message's options into the encrypted inner set and the
/// visible outer set, returning both along with the serialized length of
/// the inner set.
///
/// Observe lands in both sets: the outer copy keeps the original value,
/// the inner copy keeps it only for requests (registrations and
/// cancellations) and is emptied for notifications. Options in neither
/// class are rejected rather than passed through in the clear.
fn inner_outer_split<'a>(
    msg: &Message<'a>,
) -> Result<(OptionList<'a>, OptionList<'a>, usize)> {
    let mut inner = OptionList::new();
    let mut outer = OptionList::new();

    for option in &msg.options {
        match option.number {
            coap::OBSERVE => {
                let inner_value = if coap::is_request(msg.code) {
                    option.value
                } else {
                    &[]
                };
                push(
                    &mut inner,
                    Opt {
                        number: option.number,
                        value: inner_value,
                    },
                )?;
                push(&mut outer, *option)?;
            }
            number if is_class_e(number) => push(&mut inner, *option)?,
            number if is_class_u(number) => push(&mut outer, *option)?,
            number => return Err(Error::UnknownOption(number)),
        }
    }

    let inner_len = coap::options_len(&inner);
    Ok((inner, outer, inner_len))
}

fn push<'a>(list: &mut OptionList<'a>, option: Opt<'a>) -> Result<()> {
    list.push(option).map_err(|_| Error::TooManyOptions)
}

/// Emits `code ∥ serialized inner options ∥ 0xFF ∥ payload` into `buf`,
/// the marker and payload only when there is a payload.
fn build_plaintext(
    msg: &Message,
    inner: &[Opt],
    buf: &mut [u8],
) -> Result<usize> {
    if buf.is_empty() {
        return Err(Error::BufferTooSmall);
    }
    buf[0] = msg.code;
    let mut len = 1 + coap::serialize_options(inner, &mut buf[1..])?;

    if !msg.payload.is_empty() {
        if buf.len() - len < 1 + msg.payload.len() {
            return Err(Error::BufferTooSmall);
        }
        buf[len] = coap::PAYLOAD_MARKER;
        len += 1;
        buf[len..len + msg.payload.len()].copy_from_slice(msg.payload);
        len += msg.payload.len();
    }

    Ok(len)
}

/// Builds and serializes the outer message: the messaging layer header is
/// copied from the input, the code is rewritten per RFC 8613 §4.1.3.5,
/// the OSCORE option goes into its sorted position among the outer
/// options and the ciphertext becomes the payload.
fn assemble<'a>(
    msg: &Message<'a>,
    outer: &[Opt<'a>],
    oscore_option: Opt<'a>,
    ciphertext: &'a [u8],
    out: &mut [u8],
) -> Result<usize> {
    let observe =
        outer.iter().any(|option| option.number == coap::OBSERVE);
    let code = if coap::is_request(msg.code) {
        if observe {
            coap::CODE_GET
        } else {
            coap::CODE_POST
        }
    } else if observe {
        coap::CODE_CONTENT
    } else {
        coap::CODE_CHANGED
    };

    let mut options = OptionList::new();
    let oscore_pos = outer
        .iter()
        .position(|option| option.number > coap::OSCORE)
        .unwrap_or_else(|| outer.len());
    for option in &outer[..oscore_pos] {
        push(&mut options, *option)?;
    }
    push(&mut options, oscore_option)?;
    for option in &outer[oscore_pos..] {
        push(&mut options, *option)?;
    }

    let outer_msg = Message {
        version: msg.version,
        mtype: msg.mtype,
        code,
        message_id: msg.message_id,
        token: msg.token,
        options,
        payload: ciphertext,
    };

    coap::serialize(&outer_msg, out)
}
