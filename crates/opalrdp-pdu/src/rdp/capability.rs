//! Capability exchange envelope. Capability-set contents are opaque to
//! this crate: the combined capabilities blob (count, padding and sets)
//! is carried as raw bytes for the embedder to produce and interpret.

use opalrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};

const SOURCE_DESCRIPTOR: &[u8] = b"OPAL\0";
const ORIGINATOR_ID: u16 = 0x03EA; // server channel id, per MS-RDPBCGR

/// TS_DEMAND_ACTIVE_PDU minus the share control header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDemandActive {
    pub source_descriptor: Vec<u8>,
    /// Combined capabilities: `numberCapabilities`, padding and the sets.
    pub capability_data: Vec<u8>,
}

impl ServerDemandActive {
    const NAME: &'static str = "ServerDemandActive";

    const FIXED_PART_SIZE: usize = 2 /* lengthSourceDescriptor */ + 2 /* lengthCombinedCapabilities */;
}

impl Encode for ServerDemandActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u16(cast_length!(Self::NAME, "lengthSourceDescriptor", self.source_descriptor.len())?);
        dst.write_u16(cast_length!(Self::NAME, "lengthCombinedCapabilities", self.capability_data.len())?);
        dst.write_slice(&self.source_descriptor);
        dst.write_slice(&self.capability_data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.source_descriptor.len() + self.capability_data.len()
    }
}

impl<'de> Decode<'de> for ServerDemandActive {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let source_descriptor_length = usize::from(src.read_u16());
        let capability_length = usize::from(src.read_u16());

        ensure_size!(ctx: Self::NAME, in: src, size: source_descriptor_length + capability_length);
        let source_descriptor = src.read_slice(source_descriptor_length).to_vec();
        let capability_data = src.read_slice(capability_length).to_vec();

        Ok(Self {
            source_descriptor,
            capability_data,
        })
    }
}

/// TS_CONFIRM_ACTIVE_PDU minus the share control header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfirmActive {
    /// Combined capabilities blob supplied by the embedder.
    pub capability_data: Vec<u8>,
}

impl ClientConfirmActive {
    const NAME: &'static str = "ClientConfirmActive";

    const FIXED_PART_SIZE: usize =
        2 /* originatorId */ + 2 /* lengthSourceDescriptor */ + 2 /* lengthCombinedCapabilities */;
}

impl Encode for ClientConfirmActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u16(ORIGINATOR_ID);
        dst.write_u16(cast_length!(Self::NAME, "lengthSourceDescriptor", SOURCE_DESCRIPTOR.len())?);
        dst.write_u16(cast_length!(Self::NAME, "lengthCombinedCapabilities", self.capability_data.len())?);
        dst.write_slice(SOURCE_DESCRIPTOR);
        dst.write_slice(&self.capability_data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + SOURCE_DESCRIPTOR.len() + self.capability_data.len()
    }
}

impl<'de> Decode<'de> for ClientConfirmActive {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let _originator_id = src.read_u16();
        let source_descriptor_length = usize::from(src.read_u16());
        let capability_length = usize::from(src.read_u16());

        ensure_size!(ctx: Self::NAME, in: src, size: source_descriptor_length + capability_length);
        src.advance(source_descriptor_length);
        let capability_data = src.read_slice(capability_length).to_vec();

        Ok(Self { capability_data })
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;

    #[test]
    fn demand_active_roundtrip() {
        let pdu = ServerDemandActive {
            source_descriptor: b"RDP\0".to_vec(),
            capability_data: vec![0x02, 0x00, 0x00, 0x00, 0xAA, 0xBB],
        };

        let encoded = encode_vec(&pdu).unwrap();
        assert_eq!(encoded.len(), pdu.size());

        let decoded: ServerDemandActive = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn confirm_active_carries_the_blob_verbatim() {
        let pdu = ClientConfirmActive {
            capability_data: vec![0x01, 0x00, 0x00, 0x00, 0x10, 0x20, 0x30],
        };

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: ClientConfirmActive = decode(&encoded).unwrap();
        assert_eq!(decoded.capability_data, pdu.capability_data);
    }
}
