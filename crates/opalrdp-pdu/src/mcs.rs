//! T.125 MCS: the BER-encoded connect sequence (Connect-Initial /
//! Connect-Response) and the PER-encoded domain PDUs that carry everything
//! afterwards.

use std::borrow::Cow;

use opalrdp_core::{
    cast_length, ensure_size, invalid_field_err, invalid_field_err_with_source, other_err, read_padding,
    unexpected_message_type_err, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

use crate::gcc::{ConferenceCreateRequest, ConferenceCreateResponse};
use crate::tpdu::{TpduCode, TpduHeader};
use crate::tpkt::TpktHeader;
use crate::x224::{impl_x224_pdu_framing, user_data_size, X224Pdu};
use crate::{ber, per};

pub const RESULT_ENUM_LENGTH: u8 = 16;

const BASE_CHANNEL_ID: u16 = 1001;
const SEND_DATA_PRIORITY_AND_SEGMENTATION: u8 = 0x70;
const SEND_DATA_SEGMENTATION: u8 = 0x00;

const CONNECT_INITIAL_TAG: u8 = 101;
const CONNECT_RESPONSE_TAG: u8 = 102;

/// Human-readable name for a T.125 `Result` enumerated value.
pub fn result_description(result: u8) -> &'static str {
    match result {
        0 => "rt-successful",
        1 => "rt-domain-merging",
        2 => "rt-domain-not-hierarchical",
        3 => "rt-no-such-channel",
        4 => "rt-no-such-domain",
        5 => "rt-no-such-user",
        6 => "rt-not-admitted",
        7 => "rt-other-user-id",
        8 => "rt-parameters-unacceptable",
        9 => "rt-token-not-available",
        10 => "rt-token-not-possessed",
        11 => "rt-too-many-channels",
        12 => "rt-too-many-tokens",
        13 => "rt-too-many-users",
        14 => "rt-unspecified-failure",
        15 => "rt-user-rejected",
        _ => "unknown T.125 result",
    }
}

macro_rules! per_field_err {
    ($field_name:expr) => {{
        |error| invalid_field_err_with_source(Self::MCS_NAME, $field_name, "PER", error)
    }};
}

/// A domain PDU body; the blanket impl supplies the X.224 framing.
pub trait McsPdu<'de>: Sized {
    const MCS_NAME: &'static str;

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()>;

    fn mcs_body_decode(src: &mut ReadCursor<'de>, tpdu_user_data_size: usize) -> DecodeResult<Self>;

    fn mcs_size(&self) -> usize;
}

impl<'de, T> X224Pdu<'de> for T
where
    T: McsPdu<'de>,
{
    const X224_NAME: &'static str = T::MCS_NAME;

    const TPDU_CODE: TpduCode = TpduCode::DATA;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        self.mcs_body_encode(dst)
    }

    fn x224_body_decode(src: &mut ReadCursor<'de>, tpkt: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self> {
        T::mcs_body_decode(src, user_data_size(tpkt, tpdu))
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        0
    }

    fn tpdu_user_data_size(&self) -> usize {
        self.mcs_size()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
enum DomainPduType {
    ErectDomainRequest = 1,
    DisconnectProviderUltimatum = 8,
    AttachUserRequest = 10,
    AttachUserConfirm = 11,
    ChannelJoinRequest = 14,
    ChannelJoinConfirm = 15,
    SendDataRequest = 25,
    SendDataIndication = 26,
}

impl DomainPduType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::ErectDomainRequest),
            8 => Some(Self::DisconnectProviderUltimatum),
            10 => Some(Self::AttachUserRequest),
            11 => Some(Self::AttachUserConfirm),
            14 => Some(Self::ChannelJoinRequest),
            15 => Some(Self::ChannelJoinConfirm),
            25 => Some(Self::SendDataRequest),
            26 => Some(Self::SendDataIndication),
            _ => None,
        }
    }

    fn as_u8(self) -> u8 {
        self as u8
    }

    /// The PER CHOICE byte carries the PDU type in its upper six bits.
    fn from_choice(choice: u8) -> Option<Self> {
        Self::from_u8(choice >> 2)
    }

    fn to_choice(self) -> u8 {
        self.as_u8() << 2
    }

    fn check_expected(self, name: &'static str, expected: DomainPduType) -> DecodeResult<()> {
        if self == expected {
            Ok(())
        } else {
            Err(unexpected_message_type_err!(name, self.as_u8()))
        }
    }
}

fn read_domain_pdu_header(src: &mut ReadCursor<'_>, ctx: &'static str) -> DecodeResult<DomainPduType> {
    let choice = src.try_read_u8().map_err(|e| other_err!(ctx, source: e))?;

    DomainPduType::from_choice(choice)
        .ok_or_else(|| invalid_field_err(ctx, "domain-mcspdu", "unexpected application tag for CHOICE"))
}

fn peek_domain_pdu_header(src: &ReadCursor<'_>, ctx: &'static str) -> DecodeResult<DomainPduType> {
    let choice = src.try_peek_u8().map_err(|e| other_err!(ctx, source: e))?;

    DomainPduType::from_choice(choice)
        .ok_or_else(|| invalid_field_err(ctx, "domain-mcspdu", "unexpected application tag for CHOICE"))
}

fn write_domain_pdu_header(dst: &mut WriteCursor<'_>, pdu_type: DomainPduType, options: u8) {
    let choice = pdu_type.to_choice();

    debug_assert_eq!(options & !0b11, 0);
    debug_assert_eq!(choice & 0b11, 0);

    dst.write_u8(choice | options);
}

/// Any domain PDU, dispatched on the CHOICE byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McsMessage<'a> {
    ErectDomainRequest(ErectDomainPdu),
    AttachUserRequest(AttachUserRequest),
    AttachUserConfirm(AttachUserConfirm),
    ChannelJoinRequest(ChannelJoinRequest),
    ChannelJoinConfirm(ChannelJoinConfirm),
    SendDataRequest(SendDataRequest<'a>),
    SendDataIndication(SendDataIndication<'a>),
    DisconnectProviderUltimatum(DisconnectProviderUltimatum),
}

impl<'de> McsPdu<'de> for McsMessage<'de> {
    const MCS_NAME: &'static str = "McsMessage";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            Self::ErectDomainRequest(msg) => msg.mcs_body_encode(dst),
            Self::AttachUserRequest(msg) => msg.mcs_body_encode(dst),
            Self::AttachUserConfirm(msg) => msg.mcs_body_encode(dst),
            Self::ChannelJoinRequest(msg) => msg.mcs_body_encode(dst),
            Self::ChannelJoinConfirm(msg) => msg.mcs_body_encode(dst),
            Self::SendDataRequest(msg) => msg.mcs_body_encode(dst),
            Self::SendDataIndication(msg) => msg.mcs_body_encode(dst),
            Self::DisconnectProviderUltimatum(msg) => msg.mcs_body_encode(dst),
        }
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, tpdu_user_data_size: usize) -> DecodeResult<Self> {
        match peek_domain_pdu_header(src, Self::MCS_NAME)? {
            DomainPduType::ErectDomainRequest => {
                ErectDomainPdu::mcs_body_decode(src, tpdu_user_data_size).map(Self::ErectDomainRequest)
            }
            DomainPduType::AttachUserRequest => {
                AttachUserRequest::mcs_body_decode(src, tpdu_user_data_size).map(Self::AttachUserRequest)
            }
            DomainPduType::AttachUserConfirm => {
                AttachUserConfirm::mcs_body_decode(src, tpdu_user_data_size).map(Self::AttachUserConfirm)
            }
            DomainPduType::ChannelJoinRequest => {
                ChannelJoinRequest::mcs_body_decode(src, tpdu_user_data_size).map(Self::ChannelJoinRequest)
            }
            DomainPduType::ChannelJoinConfirm => {
                ChannelJoinConfirm::mcs_body_decode(src, tpdu_user_data_size).map(Self::ChannelJoinConfirm)
            }
            DomainPduType::SendDataRequest => {
                SendDataRequest::mcs_body_decode(src, tpdu_user_data_size).map(Self::SendDataRequest)
            }
            DomainPduType::SendDataIndication => {
                SendDataIndication::mcs_body_decode(src, tpdu_user_data_size).map(Self::SendDataIndication)
            }
            DomainPduType::DisconnectProviderUltimatum => {
                DisconnectProviderUltimatum::mcs_body_decode(src, tpdu_user_data_size)
                    .map(Self::DisconnectProviderUltimatum)
            }
        }
    }

    fn mcs_size(&self) -> usize {
        match self {
            Self::ErectDomainRequest(msg) => msg.mcs_size(),
            Self::AttachUserRequest(msg) => msg.mcs_size(),
            Self::AttachUserConfirm(msg) => msg.mcs_size(),
            Self::ChannelJoinRequest(msg) => msg.mcs_size(),
            Self::ChannelJoinConfirm(msg) => msg.mcs_size(),
            Self::SendDataRequest(msg) => msg.mcs_size(),
            Self::SendDataIndication(msg) => msg.mcs_size(),
            Self::DisconnectProviderUltimatum(msg) => msg.mcs_size(),
        }
    }
}

impl_x224_pdu_framing!(McsMessage<'de>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErectDomainPdu {
    pub sub_height: u32,
    pub sub_interval: u32,
}

impl<'de> McsPdu<'de> for ErectDomainPdu {
    const MCS_NAME: &'static str = "ErectDomainPdu";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_domain_pdu_header(dst, DomainPduType::ErectDomainRequest, 0);

        per::write_u32(dst, self.sub_height);
        per::write_u32(dst, self.sub_interval);

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, _: usize) -> DecodeResult<Self> {
        read_domain_pdu_header(src, Self::MCS_NAME)?.check_expected(Self::MCS_NAME, DomainPduType::ErectDomainRequest)?;

        let sub_height = per::read_u32(src).map_err(per_field_err!("subHeight"))?;
        let sub_interval = per::read_u32(src).map_err(per_field_err!("subInterval"))?;

        Ok(Self {
            sub_height,
            sub_interval,
        })
    }

    fn mcs_size(&self) -> usize {
        per::CHOICE_SIZE + per::sizeof_u32(self.sub_height) + per::sizeof_u32(self.sub_interval)
    }
}

impl_x224_pdu_framing!(ErectDomainPdu);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachUserRequest;

impl<'de> McsPdu<'de> for AttachUserRequest {
    const MCS_NAME: &'static str = "AttachUserRequest";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_domain_pdu_header(dst, DomainPduType::AttachUserRequest, 0);

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, _: usize) -> DecodeResult<Self> {
        read_domain_pdu_header(src, Self::MCS_NAME)?.check_expected(Self::MCS_NAME, DomainPduType::AttachUserRequest)?;

        Ok(Self)
    }

    fn mcs_size(&self) -> usize {
        per::CHOICE_SIZE
    }
}

impl_x224_pdu_framing!(AttachUserRequest);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachUserConfirm {
    pub result: u8,
    pub initiator_id: u16,
}

impl<'de> McsPdu<'de> for AttachUserConfirm {
    const MCS_NAME: &'static str = "AttachUserConfirm";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_domain_pdu_header(dst, DomainPduType::AttachUserConfirm, 2);

        per::write_enum(dst, self.result);
        per::write_u16(dst, self.initiator_id, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, _: usize) -> DecodeResult<Self> {
        read_domain_pdu_header(src, Self::MCS_NAME)?.check_expected(Self::MCS_NAME, DomainPduType::AttachUserConfirm)?;

        let result = per::read_enum(src, RESULT_ENUM_LENGTH).map_err(per_field_err!("result"))?;
        let initiator_id = per::read_u16(src, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;

        Ok(Self { result, initiator_id })
    }

    fn mcs_size(&self) -> usize {
        per::CHOICE_SIZE + per::ENUM_SIZE + per::U16_SIZE
    }
}

impl_x224_pdu_framing!(AttachUserConfirm);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelJoinRequest {
    pub initiator_id: u16,
    pub channel_id: u16,
}

impl<'de> McsPdu<'de> for ChannelJoinRequest {
    const MCS_NAME: &'static str = "ChannelJoinRequest";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_domain_pdu_header(dst, DomainPduType::ChannelJoinRequest, 0);

        per::write_u16(dst, self.initiator_id, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;
        per::write_u16(dst, self.channel_id, 0).map_err(per_field_err!("channelId"))?;

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, _: usize) -> DecodeResult<Self> {
        read_domain_pdu_header(src, Self::MCS_NAME)?.check_expected(Self::MCS_NAME, DomainPduType::ChannelJoinRequest)?;

        let initiator_id = per::read_u16(src, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;
        let channel_id = per::read_u16(src, 0).map_err(per_field_err!("channelId"))?;

        Ok(Self {
            initiator_id,
            channel_id,
        })
    }

    fn mcs_size(&self) -> usize {
        per::CHOICE_SIZE + per::U16_SIZE * 2
    }
}

impl_x224_pdu_framing!(ChannelJoinRequest);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelJoinConfirm {
    pub result: u8,
    pub initiator_id: u16,
    pub requested_channel_id: u16,
    pub channel_id: u16,
}

impl<'de> McsPdu<'de> for ChannelJoinConfirm {
    const MCS_NAME: &'static str = "ChannelJoinConfirm";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_domain_pdu_header(dst, DomainPduType::ChannelJoinConfirm, 2);

        per::write_enum(dst, self.result);
        per::write_u16(dst, self.initiator_id, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;
        per::write_u16(dst, self.requested_channel_id, 0).map_err(per_field_err!("requested"))?;
        per::write_u16(dst, self.channel_id, 0).map_err(per_field_err!("channelId"))?;

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, _: usize) -> DecodeResult<Self> {
        read_domain_pdu_header(src, Self::MCS_NAME)?.check_expected(Self::MCS_NAME, DomainPduType::ChannelJoinConfirm)?;

        let result = per::read_enum(src, RESULT_ENUM_LENGTH).map_err(per_field_err!("result"))?;
        let initiator_id = per::read_u16(src, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;
        let requested_channel_id = per::read_u16(src, 0).map_err(per_field_err!("requested"))?;
        let channel_id = per::read_u16(src, 0).map_err(per_field_err!("channelId"))?;

        Ok(Self {
            result,
            initiator_id,
            requested_channel_id,
            channel_id,
        })
    }

    fn mcs_size(&self) -> usize {
        per::CHOICE_SIZE + per::ENUM_SIZE + per::U16_SIZE * 3
    }
}

impl_x224_pdu_framing!(ChannelJoinConfirm);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendDataRequest<'a> {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub user_data: Cow<'a, [u8]>,
}

impl<'de> McsPdu<'de> for SendDataRequest<'de> {
    const MCS_NAME: &'static str = "SendDataRequest";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_domain_pdu_header(dst, DomainPduType::SendDataRequest, 0);

        per::write_u16(dst, self.initiator_id, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;
        per::write_u16(dst, self.channel_id, 0).map_err(per_field_err!("channelId"))?;

        dst.write_u8(SEND_DATA_PRIORITY_AND_SEGMENTATION);

        per::write_length(dst, cast_length!(Self::MCS_NAME, "userDataLength", self.user_data.len())?);
        dst.write_slice(&self.user_data);

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, tpdu_user_data_size: usize) -> DecodeResult<Self> {
        decode_send_data(src, tpdu_user_data_size, DomainPduType::SendDataRequest, Self::MCS_NAME).map(
            |(initiator_id, channel_id, user_data)| Self {
                initiator_id,
                channel_id,
                user_data: Cow::Borrowed(user_data),
            },
        )
    }

    fn mcs_size(&self) -> usize {
        send_data_size(&self.user_data)
    }
}

impl_x224_pdu_framing!(SendDataRequest<'de>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendDataIndication<'a> {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub user_data: Cow<'a, [u8]>,
}

impl<'de> McsPdu<'de> for SendDataIndication<'de> {
    const MCS_NAME: &'static str = "SendDataIndication";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_domain_pdu_header(dst, DomainPduType::SendDataIndication, 0);

        per::write_u16(dst, self.initiator_id, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;
        per::write_u16(dst, self.channel_id, 0).map_err(per_field_err!("channelId"))?;

        dst.write_u8(SEND_DATA_SEGMENTATION);

        per::write_length(dst, cast_length!(Self::MCS_NAME, "userDataLength", self.user_data.len())?);
        dst.write_slice(&self.user_data);

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, tpdu_user_data_size: usize) -> DecodeResult<Self> {
        decode_send_data(src, tpdu_user_data_size, DomainPduType::SendDataIndication, Self::MCS_NAME).map(
            |(initiator_id, channel_id, user_data)| Self {
                initiator_id,
                channel_id,
                user_data: Cow::Borrowed(user_data),
            },
        )
    }

    fn mcs_size(&self) -> usize {
        send_data_size(&self.user_data)
    }
}

impl_x224_pdu_framing!(SendDataIndication<'de>);

fn decode_send_data<'de>(
    src: &mut ReadCursor<'de>,
    tpdu_user_data_size: usize,
    expected: DomainPduType,
    name: &'static str,
) -> DecodeResult<(u16, u16, &'de [u8])> {
    let src_len_before = src.len();

    read_domain_pdu_header(src, name)?.check_expected(name, expected)?;

    let initiator_id = per::read_u16(src, BASE_CHANNEL_ID)
        .map_err(|e| invalid_field_err_with_source(name, "initiator", "PER", e))?;
    let channel_id =
        per::read_u16(src, 0).map_err(|e| invalid_field_err_with_source(name, "channelId", "PER", e))?;

    // dataPriority + segmentation
    ensure_size!(ctx: name, in: src, size: 1);
    read_padding!(src, 1);

    let (length, _) = per::read_length(src)
        .map_err(|e| invalid_field_err_with_source(name, "userDataLength", "PER", e))?;
    let length = usize::from(length);

    let consumed = src_len_before - src.len();

    if length > tpdu_user_data_size.saturating_sub(consumed) {
        return Err(invalid_field_err(
            name,
            "userDataLength",
            "inconsistent with the user data size advertised in the TPDU",
        ));
    }

    ensure_size!(ctx: name, in: src, size: length);
    let user_data = src.read_slice(length);

    Ok((initiator_id, channel_id, user_data))
}

fn send_data_size(user_data: &[u8]) -> usize {
    per::CHOICE_SIZE
        + per::U16_SIZE * 2
        + 1
        + per::sizeof_length(u16::try_from(user_data.len()).unwrap_or(u16::MAX))
        + user_data.len()
}

/// Reason carried by a Disconnect-Provider-Ultimatum.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum DisconnectReason {
    DomainDisconnected = 0,
    ProviderInitiated = 1,
    TokenPurged = 2,
    UserRequested = 3,
    ChannelPurged = 4,
}

impl DisconnectReason {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::DomainDisconnected),
            1 => Some(Self::ProviderInitiated),
            2 => Some(Self::TokenPurged),
            3 => Some(Self::UserRequested),
            4 => Some(Self::ChannelPurged),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::DomainDisconnected => "domain disconnected",
            Self::ProviderInitiated => "server-initiated disconnect",
            Self::TokenPurged => "token purged",
            Self::UserRequested => "user-requested disconnect",
            Self::ChannelPurged => "channel purged",
        }
    }
}

impl core::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.description())
    }
}

/// Fatal server-side termination of the domain. The three reason bits
/// straddle the CHOICE byte and the following octet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DisconnectProviderUltimatum {
    pub reason: DisconnectReason,
}

impl<'de> McsPdu<'de> for DisconnectProviderUltimatum {
    const MCS_NAME: &'static str = "DisconnectProviderUltimatum";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        let pdu_type = DomainPduType::DisconnectProviderUltimatum.as_u8();
        let reason = self.reason.as_u8();

        dst.write_array([(pdu_type << 2) | ((reason >> 1) & 0x03), reason << 7]);

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, _: usize) -> DecodeResult<Self> {
        const NAME: &str = DisconnectProviderUltimatum::MCS_NAME;

        ensure_size!(ctx: NAME, in: src, size: 2);

        let [b1, b2] = src.read_array();

        let choice = b1 >> 2;
        let reason = ((b1 & 0x03) << 1) | (b2 >> 7);

        DomainPduType::from_u8(choice)
            .ok_or_else(|| invalid_field_err(NAME, "domain-mcspdu", "unexpected application tag for CHOICE"))?
            .check_expected(NAME, DomainPduType::DisconnectProviderUltimatum)?;

        Ok(Self {
            reason: DisconnectReason::from_u8(reason)
                .ok_or_else(|| invalid_field_err(NAME, "reason", "unknown disconnect reason"))?,
        })
    }

    fn mcs_size(&self) -> usize {
        2
    }
}

impl_x224_pdu_framing!(DisconnectProviderUltimatum);

/// T.125 domain parameters, a BER sequence of eight integers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainParameters {
    pub max_channel_ids: u32,
    pub max_user_ids: u32,
    pub max_token_ids: u32,
    pub num_priorities: u32,
    pub min_throughput: u32,
    pub max_height: u32,
    pub max_mcs_pdu_size: u32,
    pub protocol_version: u32,
}

impl DomainParameters {
    const NAME: &'static str = "DomainParameters";

    pub fn target() -> Self {
        Self {
            max_channel_ids: 34,
            max_user_ids: 2,
            max_token_ids: 0,
            num_priorities: 1,
            min_throughput: 0,
            max_height: 1,
            max_mcs_pdu_size: 65535,
            protocol_version: 2,
        }
    }

    pub fn min() -> Self {
        Self {
            max_channel_ids: 1,
            max_user_ids: 1,
            max_token_ids: 1,
            num_priorities: 1,
            min_throughput: 0,
            max_height: 1,
            max_mcs_pdu_size: 1056,
            protocol_version: 2,
        }
    }

    pub fn max() -> Self {
        Self {
            max_channel_ids: 65535,
            max_user_ids: 65535,
            max_token_ids: 65535,
            num_priorities: 1,
            min_throughput: 0,
            max_height: 1,
            max_mcs_pdu_size: 65535,
            protocol_version: 2,
        }
    }

    fn fields_length(&self) -> usize {
        ber::sizeof_integer(self.max_channel_ids)
            + ber::sizeof_integer(self.max_user_ids)
            + ber::sizeof_integer(self.max_token_ids)
            + ber::sizeof_integer(self.num_priorities)
            + ber::sizeof_integer(self.min_throughput)
            + ber::sizeof_integer(self.max_height)
            + ber::sizeof_integer(self.max_mcs_pdu_size)
            + ber::sizeof_integer(self.protocol_version)
    }
}

impl Encode for DomainParameters {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        ber::write_sequence_tag(dst, cast_length!(Self::NAME, "len", self.fields_length())?)?;
        ber::write_integer(dst, self.max_channel_ids)?;
        ber::write_integer(dst, self.max_user_ids)?;
        ber::write_integer(dst, self.max_token_ids)?;
        ber::write_integer(dst, self.num_priorities)?;
        ber::write_integer(dst, self.min_throughput)?;
        ber::write_integer(dst, self.max_height)?;
        ber::write_integer(dst, self.max_mcs_pdu_size)?;
        ber::write_integer(dst, self.protocol_version)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let fields_length = self.fields_length();
        fields_length + ber::sizeof_sequence_tag(fields_length as u16)
    }
}

impl<'de> Decode<'de> for DomainParameters {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ber::read_sequence_tag(src)?;

        Ok(Self {
            max_channel_ids: ber::read_integer(src)?,
            max_user_ids: ber::read_integer(src)?,
            max_token_ids: ber::read_integer(src)?,
            num_priorities: ber::read_integer(src)?,
            min_throughput: ber::read_integer(src)?,
            max_height: ber::read_integer(src)?,
            max_mcs_pdu_size: ber::read_integer(src)?,
            protocol_version: ber::read_integer(src)?,
        })
    }
}

/// MCS Connect-Initial (BER application tag 101).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectInitial {
    pub conference_create_request: ConferenceCreateRequest,
    pub calling_domain_selector: Vec<u8>,
    pub called_domain_selector: Vec<u8>,
    pub upward_flag: bool,
    pub target_parameters: DomainParameters,
    pub min_parameters: DomainParameters,
    pub max_parameters: DomainParameters,
}

impl ConnectInitial {
    const NAME: &'static str = "ConnectInitial";

    pub fn with_conference_create_request(conference_create_request: ConferenceCreateRequest) -> Self {
        Self {
            conference_create_request,
            calling_domain_selector: vec![0x01],
            called_domain_selector: vec![0x01],
            upward_flag: true,
            target_parameters: DomainParameters::target(),
            min_parameters: DomainParameters::min(),
            max_parameters: DomainParameters::max(),
        }
    }

    fn fields_length(&self) -> usize {
        ber::sizeof_octet_string(self.calling_domain_selector.len() as u16)
            + ber::sizeof_octet_string(self.called_domain_selector.len() as u16)
            + ber::SIZEOF_BOOL
            + self.target_parameters.size()
            + self.min_parameters.size()
            + self.max_parameters.size()
            + ber::sizeof_octet_string(self.conference_create_request.size() as u16)
    }
}

impl Encode for ConnectInitial {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        ber::write_application_tag(dst, CONNECT_INITIAL_TAG, self.fields_length() as u16)?;
        ber::write_octet_string(dst, &self.calling_domain_selector)?;
        ber::write_octet_string(dst, &self.called_domain_selector)?;
        ber::write_bool(dst, self.upward_flag)?;
        self.target_parameters.encode(dst)?;
        self.min_parameters.encode(dst)?;
        self.max_parameters.encode(dst)?;
        ber::write_octet_string_tag(dst, cast_length!(Self::NAME, "userDataLen", self.conference_create_request.size())?)?;
        self.conference_create_request.encode(dst)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let fields_length = self.fields_length();
        fields_length + ber::sizeof_application_tag(CONNECT_INITIAL_TAG, fields_length as u16)
    }
}

impl<'de> Decode<'de> for ConnectInitial {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ber::read_application_tag(src, CONNECT_INITIAL_TAG)?;

        let calling_domain_selector = ber::read_octet_string(src)?;
        let called_domain_selector = ber::read_octet_string(src)?;
        let upward_flag = ber::read_bool(src)?;
        let target_parameters = DomainParameters::decode(src)?;
        let min_parameters = DomainParameters::decode(src)?;
        let max_parameters = DomainParameters::decode(src)?;
        let _user_data_length = ber::read_octet_string_tag(src)?;
        let conference_create_request = ConferenceCreateRequest::decode(src)?;

        Ok(Self {
            conference_create_request,
            calling_domain_selector,
            called_domain_selector,
            upward_flag,
            target_parameters,
            min_parameters,
            max_parameters,
        })
    }
}

/// MCS Connect-Response (BER application tag 102).
///
/// The T.125 result is surfaced as-is; deciding what a non-zero value
/// means for the connection is the caller's policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectResponse {
    pub result: u8,
    pub called_connect_id: u32,
    pub domain_parameters: DomainParameters,
    pub conference_create_response: ConferenceCreateResponse,
}

impl ConnectResponse {
    const NAME: &'static str = "ConnectResponse";

    pub fn channel_ids(&self) -> Vec<u16> {
        self.conference_create_response.gcc_blocks.channel_ids()
    }

    pub fn global_channel_id(&self) -> u16 {
        self.conference_create_response.gcc_blocks.global_channel_id()
    }

    fn fields_length(&self) -> usize {
        ber::SIZEOF_ENUMERATED
            + ber::sizeof_integer(self.called_connect_id)
            + self.domain_parameters.size()
            + ber::sizeof_octet_string(self.conference_create_response.size() as u16)
    }
}

impl Encode for ConnectResponse {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        ber::write_application_tag(dst, CONNECT_RESPONSE_TAG, self.fields_length() as u16)?;
        ber::write_enumerated(dst, self.result)?;
        ber::write_integer(dst, self.called_connect_id)?;
        self.domain_parameters.encode(dst)?;
        ber::write_octet_string_tag(
            dst,
            cast_length!(Self::NAME, "userDataLen", self.conference_create_response.size())?,
        )?;
        self.conference_create_response.encode(dst)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let fields_length = self.fields_length();
        fields_length + ber::sizeof_application_tag(CONNECT_RESPONSE_TAG, fields_length as u16)
    }
}

impl<'de> Decode<'de> for ConnectResponse {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ber::read_application_tag(src, CONNECT_RESPONSE_TAG)?;

        let result = ber::read_enumerated(src, RESULT_ENUM_LENGTH)?;
        let called_connect_id = ber::read_integer(src)?;
        let domain_parameters = DomainParameters::decode(src)?;
        let _user_data_length = ber::read_octet_string_tag(src)?;
        let conference_create_response = ConferenceCreateResponse::decode(src)?;

        Ok(Self {
            result,
            called_connect_id,
            domain_parameters,
            conference_create_response,
        })
    }
}
