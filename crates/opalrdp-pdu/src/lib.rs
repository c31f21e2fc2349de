//! RDP wire formats: ASN.1 primitives, TPKT/X.224 framing, the connection
//! negotiation sub-protocol, T.124 GCC, T.125 MCS, the RDP share messages
//! used by the connection sequence, and the RemoteFX block stream.

use opalrdp_core::{DecodeResult, ReadCursor};

pub mod gcc;
pub mod mcs;
pub mod nego;
pub mod rdp;
pub mod rfx;
pub mod tpdu;
pub mod tpkt;
pub mod x224;

pub(crate) mod ber;
pub(crate) mod per;

use crate::tpkt::TpktHeader;

/// Hints the transport driver about the size of the next PDU.
///
/// The driver accumulates bytes until `find_size` returns `Some`, then
/// hands exactly that many bytes to the decoder.
pub trait PduHint: Send + Sync + core::fmt::Debug + 'static {
    /// Finds the next PDU size by peeking at the first few bytes.
    fn find_size(&self, bytes: &[u8]) -> DecodeResult<Option<usize>>;
}

#[derive(Clone, Copy, Debug)]
pub struct X224Hint;

pub const X224_HINT: X224Hint = X224Hint;

impl PduHint for X224Hint {
    fn find_size(&self, bytes: &[u8]) -> DecodeResult<Option<usize>> {
        find_x224_size(bytes)
    }
}

/// Peeks a TPKT header and returns the total frame length, or `None` when
/// fewer than four bytes are available.
pub fn find_x224_size(bytes: &[u8]) -> DecodeResult<Option<usize>> {
    if bytes.len() < TpktHeader::SIZE {
        return Ok(None);
    }

    let mut cursor = ReadCursor::new(bytes);
    let tpkt = TpktHeader::read(&mut cursor)?;

    Ok(Some(tpkt.packet_length()))
}
