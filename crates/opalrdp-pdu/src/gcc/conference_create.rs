//! T.124 Conference Create Request / Response, the PER-encoded envelope
//! around the CS_* / SC_* user-data blocks.

use opalrdp_core::{
    cast_length, ensure_size, invalid_field_err, other_err, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};

use super::{ClientGccBlocks, ServerGccBlocks};
use crate::{mcs, per};

const CONFERENCE_OBJECT_ID: [u8; 6] = [0, 0, 20, 124, 0, 1];
const H221_CLIENT_TO_SERVER_KEY: &[u8; 4] = b"Duca";
const H221_SERVER_TO_CLIENT_KEY: &[u8; 4] = b"McDn";
const H221_KEY_MIN_LENGTH: usize = 4;

const OBJECT_IDENTIFIER_KEY: u8 = 0;
const CONFERENCE_CREATE_REQUEST_CHOICE: u8 = 0;
const CONFERENCE_CREATE_RESPONSE_CHOICE: u8 = 0x14;
const USER_DATA_SELECTION: u8 = 0x08;
const CONFERENCE_NAME: &[u8] = b"1";
const NUMBER_OF_SETS: u8 = 1;
const H221_NON_STANDARD_CHOICE: u8 = 0xC0;
const NODE_ID_MIN: u16 = 1001;
const RESPONSE_TAG: u32 = 1;
const RESPONSE_RESULT_SUCCESS: u8 = 0;

// Envelope bytes between the connect PDU length determinant and the user
// data blob: spec-fixed, 14 bytes minus the two length determinants.
const REQUEST_CONNECT_PDU_SIZE: usize = 12;
const RESPONSE_CONNECT_PDU_SIZE: usize = 13;

/// Conference Create Request carrying the client user-data blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConferenceCreateRequest {
    pub gcc_blocks: ClientGccBlocks,
}

impl ConferenceCreateRequest {
    const NAME: &'static str = "ConferenceCreateRequest";
}

impl Encode for ConferenceCreateRequest {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        let gcc_blocks_size = self.gcc_blocks.size();

        // ConnectData::Key: select object of type OBJECT_IDENTIFIER
        per::write_choice(dst, OBJECT_IDENTIFIER_KEY);
        per::write_object_id(dst, CONFERENCE_OBJECT_ID);

        // ConnectData::connectPDU length
        per::write_length(
            dst,
            cast_length!(Self::NAME, "connectPduLen", gcc_blocks_size + REQUEST_CONNECT_PDU_SIZE)?,
        );

        // ConnectGCCPDU (CHOICE): conferenceCreateRequest
        per::write_choice(dst, CONFERENCE_CREATE_REQUEST_CHOICE);
        // select optional userData
        per::write_selection(dst, USER_DATA_SELECTION);
        // conferenceName (numeric string, minimum length one)
        per::write_numeric_string(dst, CONFERENCE_NAME, 1).map_err(|e| other_err!(Self::NAME, source: e))?;
        per::write_padding(dst, 1);
        // one set of user data, keyed h221NonStandard "Duca"
        per::write_number_of_sets(dst, NUMBER_OF_SETS);
        per::write_choice(dst, H221_NON_STANDARD_CHOICE);
        per::write_octet_string(dst, H221_CLIENT_TO_SERVER_KEY, H221_KEY_MIN_LENGTH)
            .map_err(|e| other_err!(Self::NAME, source: e))?;
        // the user data octet string itself
        per::write_length(dst, cast_length!(Self::NAME, "userDataLen", gcc_blocks_size)?);
        self.gcc_blocks.encode(dst)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let gcc_blocks_size = self.gcc_blocks.size();
        let connect_pdu_length = REQUEST_CONNECT_PDU_SIZE + gcc_blocks_size;

        per::CHOICE_SIZE
            + CONFERENCE_OBJECT_ID.len()
            + per::sizeof_length(connect_pdu_length as u16)
            + REQUEST_CONNECT_PDU_SIZE
            + per::sizeof_length(gcc_blocks_size as u16)
            + gcc_blocks_size
    }
}

impl<'de> Decode<'de> for ConferenceCreateRequest {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: per::CHOICE_SIZE);
        if per::read_choice(src) != OBJECT_IDENTIFIER_KEY {
            return Err(invalid_field_err(Self::NAME, "key", "unexpected ConnectData key"));
        }
        if per::read_object_id(src).map_err(|e| other_err!(Self::NAME, source: e))? != CONFERENCE_OBJECT_ID {
            return Err(invalid_field_err(Self::NAME, "oid", "unexpected conference object id"));
        }

        let _connect_pdu_length = per::read_length(src).map_err(|e| other_err!(Self::NAME, source: e))?;

        ensure_size!(ctx: Self::NAME, in: src, size: per::CHOICE_SIZE * 2);
        if per::read_choice(src) != CONFERENCE_CREATE_REQUEST_CHOICE {
            return Err(invalid_field_err(Self::NAME, "choice", "expected conferenceCreateRequest"));
        }
        if per::read_selection(src) != USER_DATA_SELECTION {
            return Err(invalid_field_err(Self::NAME, "selection", "expected userData selection"));
        }

        per::read_numeric_string(src, 1).map_err(|e| other_err!(Self::NAME, source: e))?;
        per::read_padding(src, 1);

        ensure_size!(ctx: Self::NAME, in: src, size: per::CHOICE_SIZE * 2);
        if per::read_number_of_sets(src) != NUMBER_OF_SETS {
            return Err(invalid_field_err(Self::NAME, "numberOfSets", "expected one set of user data"));
        }
        if per::read_choice(src) != H221_NON_STANDARD_CHOICE {
            return Err(invalid_field_err(Self::NAME, "choice", "expected h221NonStandard user data"));
        }

        if per::read_octet_string(src, H221_KEY_MIN_LENGTH).map_err(|e| other_err!(Self::NAME, source: e))?
            != H221_CLIENT_TO_SERVER_KEY
        {
            return Err(invalid_field_err(Self::NAME, "h221Key", "bad client-to-server H.221 key"));
        }

        let _user_data_length = per::read_length(src).map_err(|e| other_err!(Self::NAME, source: e))?;
        let gcc_blocks = ClientGccBlocks::decode(src)?;

        Ok(Self { gcc_blocks })
    }
}

/// Conference Create Response carrying the server user-data blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConferenceCreateResponse {
    pub node_id: u16,
    pub gcc_blocks: ServerGccBlocks,
}

impl ConferenceCreateResponse {
    const NAME: &'static str = "ConferenceCreateResponse";
}

impl Encode for ConferenceCreateResponse {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        let gcc_blocks_size = self.gcc_blocks.size();

        per::write_choice(dst, OBJECT_IDENTIFIER_KEY);
        per::write_object_id(dst, CONFERENCE_OBJECT_ID);

        per::write_length(
            dst,
            cast_length!(Self::NAME, "connectPduLen", gcc_blocks_size + RESPONSE_CONNECT_PDU_SIZE)?,
        );

        per::write_choice(dst, CONFERENCE_CREATE_RESPONSE_CHOICE);
        per::write_u16(dst, self.node_id, NODE_ID_MIN).map_err(|e| other_err!(Self::NAME, source: e))?;
        per::write_u32(dst, RESPONSE_TAG);
        per::write_enum(dst, RESPONSE_RESULT_SUCCESS);
        per::write_number_of_sets(dst, NUMBER_OF_SETS);
        per::write_choice(dst, H221_NON_STANDARD_CHOICE);
        per::write_octet_string(dst, H221_SERVER_TO_CLIENT_KEY, H221_KEY_MIN_LENGTH)
            .map_err(|e| other_err!(Self::NAME, source: e))?;
        per::write_length(dst, cast_length!(Self::NAME, "userDataLen", gcc_blocks_size)?);
        self.gcc_blocks.encode(dst)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let gcc_blocks_size = self.gcc_blocks.size();
        let connect_pdu_length = RESPONSE_CONNECT_PDU_SIZE + gcc_blocks_size;

        per::CHOICE_SIZE
            + CONFERENCE_OBJECT_ID.len()
            + per::sizeof_length(connect_pdu_length as u16)
            + RESPONSE_CONNECT_PDU_SIZE
            + per::sizeof_length(gcc_blocks_size as u16)
            + gcc_blocks_size
    }
}

impl<'de> Decode<'de> for ConferenceCreateResponse {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: per::CHOICE_SIZE);
        if per::read_choice(src) != OBJECT_IDENTIFIER_KEY {
            return Err(invalid_field_err(Self::NAME, "key", "unexpected ConnectData key"));
        }
        if per::read_object_id(src).map_err(|e| other_err!(Self::NAME, source: e))? != CONFERENCE_OBJECT_ID {
            return Err(invalid_field_err(Self::NAME, "oid", "unexpected conference object id"));
        }

        // ignored per MS-RDPBCGR
        let _connect_pdu_length = per::read_length(src).map_err(|e| other_err!(Self::NAME, source: e))?;

        ensure_size!(ctx: Self::NAME, in: src, size: per::CHOICE_SIZE);
        if per::read_choice(src) != CONFERENCE_CREATE_RESPONSE_CHOICE {
            return Err(invalid_field_err(Self::NAME, "choice", "expected conferenceCreateResponse"));
        }

        let node_id = per::read_u16(src, NODE_ID_MIN).map_err(|e| other_err!(Self::NAME, source: e))?;

        if per::read_u32(src).map_err(|e| other_err!(Self::NAME, source: e))? != RESPONSE_TAG {
            return Err(invalid_field_err(Self::NAME, "tag", "unexpected response tag"));
        }

        if per::read_enum(src, mcs::RESULT_ENUM_LENGTH).map_err(|e| other_err!(Self::NAME, source: e))?
            != RESPONSE_RESULT_SUCCESS
        {
            return Err(invalid_field_err(Self::NAME, "result", "conference create rejected"));
        }

        ensure_size!(ctx: Self::NAME, in: src, size: per::CHOICE_SIZE * 2);
        if per::read_number_of_sets(src) != NUMBER_OF_SETS {
            return Err(invalid_field_err(Self::NAME, "numberOfSets", "expected one set of user data"));
        }
        if per::read_choice(src) != H221_NON_STANDARD_CHOICE {
            return Err(invalid_field_err(Self::NAME, "choice", "expected h221NonStandard user data"));
        }

        if per::read_octet_string(src, H221_KEY_MIN_LENGTH).map_err(|e| other_err!(Self::NAME, source: e))?
            != H221_SERVER_TO_CLIENT_KEY
        {
            return Err(invalid_field_err(Self::NAME, "h221Key", "bad server-to-client H.221 key"));
        }

        let _user_data_length = per::read_length(src).map_err(|e| other_err!(Self::NAME, source: e))?;
        let gcc_blocks = ServerGccBlocks::decode(src)?;

        Ok(Self { node_id, gcc_blocks })
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;
    use crate::gcc::tests::{client_blocks, server_blocks};

    #[test]
    fn request_roundtrip() {
        let request = ConferenceCreateRequest {
            gcc_blocks: client_blocks(),
        };

        let encoded = encode_vec(&request).unwrap();
        assert_eq!(encoded.len(), request.size());

        // choice + OID, then the envelope
        assert_eq!(&encoded[..7], &[0x00, 0x05, 0x00, 0x14, 0x7C, 0x00, 0x01]);

        let decoded: ConferenceCreateRequest = decode(&encoded).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn response_roundtrip() {
        let response = ConferenceCreateResponse {
            node_id: 0x79F3,
            gcc_blocks: server_blocks(),
        };

        let encoded = encode_vec(&response).unwrap();
        assert_eq!(encoded.len(), response.size());

        let decoded: ConferenceCreateResponse = decode(&encoded).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn bad_h221_key_is_rejected() {
        let request = ConferenceCreateRequest {
            gcc_blocks: client_blocks(),
        };

        let mut encoded = encode_vec(&request).unwrap();
        // the "Duca" key sits after choice(1) + oid(6) + len + choice(1) +
        // selection(1) + confName(2) + padding(1) + sets(1) + choice(1) + len(1)
        let key_offset = encoded.windows(4).position(|w| w == b"Duca").unwrap();
        encoded[key_offset] = b'X';

        assert!(decode::<ConferenceCreateRequest>(&encoded).is_err());
    }
}
