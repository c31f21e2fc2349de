//! T.124 user-data blocks exchanged inside the GCC conference create
//! request and response (CS_* client-to-server, SC_* server-to-client).

pub mod conference_create;

use bitflags::bitflags;

use opalrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, read_padding, write_padding, Decode,
    DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

pub use self::conference_create::{ConferenceCreateRequest, ConferenceCreateResponse};

const USER_DATA_HEADER_SIZE: usize = 4;

const CS_CORE: u16 = 0xC001;
const CS_SECURITY: u16 = 0xC002;
const CS_NET: u16 = 0xC003;
const CS_CLUSTER: u16 = 0xC004;

const SC_CORE: u16 = 0x0C01;
const SC_SECURITY: u16 = 0x0C02;
const SC_NET: u16 = 0x0C03;

const RDP_VERSION_5_PLUS: u32 = 0x0008_0004;
const COLOR_DEPTH_8BPP: u16 = 0xCA01;
const SAS_DEL: u16 = 0xAA03;

const CLIENT_NAME_SIZE: usize = 32;
const IME_FILE_NAME_SIZE: usize = 64;
const DIG_PRODUCT_ID_SIZE: usize = 64;

const CHANNEL_NAME_SIZE: usize = 8;
const CHANNEL_DEF_SIZE: usize = CHANNEL_NAME_SIZE + 4;

fn write_user_data_header(dst: &mut WriteCursor<'_>, block_type: u16, block_size: usize) -> EncodeResult<()> {
    ensure_size!(ctx: "UserDataHeader", in: dst, size: USER_DATA_HEADER_SIZE);

    dst.write_u16(block_type);
    dst.write_u16(cast_length!("UserDataHeader", "len", block_size + USER_DATA_HEADER_SIZE)?);

    Ok(())
}

/// Writes a string as a fixed-size, null-terminated UTF-16LE field,
/// truncating as needed.
fn write_utf16_fixed(dst: &mut WriteCursor<'_>, value: &str, byte_size: usize) {
    let max_units = byte_size / 2 - 1;
    let mut written = 0;

    for unit in value.encode_utf16().take(max_units) {
        dst.write_u16(unit);
        written += 2;
    }

    for _ in (written..byte_size).step_by(2) {
        dst.write_u16(0);
    }
}

fn read_utf16_fixed(src: &mut ReadCursor<'_>, byte_size: usize) -> String {
    let units: Vec<u16> = (0..byte_size / 2).map(|_| src.read_u16()).collect();
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClientEarlyCapabilityFlags: u16 {
        const SUPPORT_ERR_INFO_PDU = 0x0001;
        const WANT_32_BPP_SESSION = 0x0002;
        const SUPPORT_STATUS_INFO_PDU = 0x0004;
        const STRONG_ASYMMETRIC_KEYS = 0x0008;
        const VALID_CONNECTION_TYPE = 0x0020;
        const SUPPORT_MONITOR_LAYOUT_PDU = 0x0040;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ServerEarlyCapabilityFlags: u32 {
        const EDGE_ACTIONS_SUPPORTED_V1 = 0x0000_0001;
        const DYNAMIC_DST_SUPPORTED = 0x0000_0002;
        const EDGE_ACTIONS_SUPPORTED_V2 = 0x0000_0004;
        const SKIP_CHANNELJOIN_SUPPORTED = 0x0000_0008;
    }
}

/// TS_UD_CS_CORE, written up to and including `serverSelectedProtocol`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCoreData {
    pub desktop_width: u16,
    pub desktop_height: u16,
    pub keyboard_layout: u32,
    pub client_build: u32,
    pub client_name: String,
    pub keyboard_type: u32,
    pub keyboard_subtype: u32,
    pub keyboard_functional_keys_count: u32,
    pub ime_file_name: String,
    pub high_color_depth: u16,
    pub supported_color_depths: u16,
    pub early_capability_flags: ClientEarlyCapabilityFlags,
    pub dig_product_id: String,
    pub server_selected_protocol: u32,
}

impl ClientCoreData {
    const NAME: &'static str = "ClientCoreData";

    const FIXED_PART_SIZE: usize = 4 /* version */
        + 2 /* desktopWidth */ + 2 /* desktopHeight */
        + 2 /* colorDepth */ + 2 /* SASSequence */
        + 4 /* keyboardLayout */ + 4 /* clientBuild */
        + CLIENT_NAME_SIZE
        + 4 /* keyboardType */ + 4 /* keyboardSubType */ + 4 /* keyboardFunctionKey */
        + IME_FILE_NAME_SIZE
        + 2 /* postBeta2ColorDepth */ + 2 /* clientProductId */ + 4 /* serialNumber */
        + 2 /* highColorDepth */ + 2 /* supportedColorDepths */ + 2 /* earlyCapabilityFlags */
        + DIG_PRODUCT_ID_SIZE
        + 1 /* connectionType */ + 1 /* pad1octet */
        + 4 /* serverSelectedProtocol */;
}

impl Encode for ClientCoreData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(RDP_VERSION_5_PLUS);
        dst.write_u16(self.desktop_width);
        dst.write_u16(self.desktop_height);
        dst.write_u16(COLOR_DEPTH_8BPP); // superseded by highColorDepth
        dst.write_u16(SAS_DEL);
        dst.write_u32(self.keyboard_layout);
        dst.write_u32(self.client_build);
        write_utf16_fixed(dst, &self.client_name, CLIENT_NAME_SIZE);
        dst.write_u32(self.keyboard_type);
        dst.write_u32(self.keyboard_subtype);
        dst.write_u32(self.keyboard_functional_keys_count);
        write_utf16_fixed(dst, &self.ime_file_name, IME_FILE_NAME_SIZE);
        dst.write_u16(COLOR_DEPTH_8BPP); // postBeta2ColorDepth, superseded as well
        dst.write_u16(1); // clientProductId
        dst.write_u32(0); // serialNumber
        dst.write_u16(self.high_color_depth);
        dst.write_u16(self.supported_color_depths);
        dst.write_u16(self.early_capability_flags.bits());
        write_utf16_fixed(dst, &self.dig_product_id, DIG_PRODUCT_ID_SIZE);
        dst.write_u8(0x06); // connectionType: LAN
        write_padding!(dst, 1);
        dst.write_u32(self.server_selected_protocol);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for ClientCoreData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let version = src.read_u32();
        if version < RDP_VERSION_5_PLUS {
            return Err(invalid_field_err!("version", "client RDP version too old"));
        }

        let desktop_width = src.read_u16();
        let desktop_height = src.read_u16();
        read_padding!(src, 4); // colorDepth, SASSequence
        let keyboard_layout = src.read_u32();
        let client_build = src.read_u32();
        let client_name = read_utf16_fixed(src, CLIENT_NAME_SIZE);
        let keyboard_type = src.read_u32();
        let keyboard_subtype = src.read_u32();
        let keyboard_functional_keys_count = src.read_u32();
        let ime_file_name = read_utf16_fixed(src, IME_FILE_NAME_SIZE);
        read_padding!(src, 8); // postBeta2ColorDepth, clientProductId, serialNumber
        let high_color_depth = src.read_u16();
        let supported_color_depths = src.read_u16();
        let early_capability_flags = ClientEarlyCapabilityFlags::from_bits_truncate(src.read_u16());
        let dig_product_id = read_utf16_fixed(src, DIG_PRODUCT_ID_SIZE);
        read_padding!(src, 2); // connectionType, pad1octet
        let server_selected_protocol = src.read_u32();

        Ok(Self {
            desktop_width,
            desktop_height,
            keyboard_layout,
            client_build,
            client_name,
            keyboard_type,
            keyboard_subtype,
            keyboard_functional_keys_count,
            ime_file_name,
            high_color_depth,
            supported_color_depths,
            early_capability_flags,
            dig_product_id,
            server_selected_protocol,
        })
    }
}

/// TS_UD_CS_SEC.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSecurityData {
    pub encryption_methods: u32,
    pub ext_encryption_methods: u32,
}

impl ClientSecurityData {
    const NAME: &'static str = "ClientSecurityData";

    const FIXED_PART_SIZE: usize = 4 + 4;

    /// Enhanced security: no RDP-level encryption.
    pub fn no_security() -> Self {
        Self::default()
    }
}

impl Encode for ClientSecurityData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.encryption_methods);
        dst.write_u32(self.ext_encryption_methods);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for ClientSecurityData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        Ok(Self {
            encryption_methods: src.read_u32(),
            ext_encryption_methods: src.read_u32(),
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChannelOptions: u32 {
        const INITIALIZED = 0x8000_0000;
        const ENCRYPT_RDP = 0x4000_0000;
        const COMPRESS_RDP = 0x0080_0000;
        const SHOW_PROTOCOL = 0x0010_0000;
    }
}

/// One static virtual channel definition inside CS_NET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDef {
    /// ANSI channel name, at most seven characters.
    pub name: String,
    pub options: ChannelOptions,
}

impl ChannelDef {
    const NAME: &'static str = "ChannelDef";

    const FIXED_PART_SIZE: usize = CHANNEL_DEF_SIZE;
}

impl Encode for ChannelDef {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        let mut name = [0u8; CHANNEL_NAME_SIZE];
        let bytes = self.name.as_bytes();
        if bytes.len() >= CHANNEL_NAME_SIZE {
            return Err(invalid_field_err!("name", "channel name longer than seven characters"));
        }
        name[..bytes.len()].copy_from_slice(bytes);

        dst.write_slice(&name);
        dst.write_u32(self.options.bits());

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for ChannelDef {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let raw_name = src.read_slice(CHANNEL_NAME_SIZE);
        let end = raw_name.iter().position(|&b| b == 0).unwrap_or(CHANNEL_NAME_SIZE);
        let name = core::str::from_utf8(&raw_name[..end])
            .map_err(|_| invalid_field_err!("name", "channel name is not ASCII"))?
            .to_owned();

        let options = ChannelOptions::from_bits_truncate(src.read_u32());

        Ok(Self { name, options })
    }
}

/// TS_UD_CS_NET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientNetworkData {
    pub channels: Vec<ChannelDef>,
}

impl ClientNetworkData {
    const NAME: &'static str = "ClientNetworkData";

    const FIXED_PART_SIZE: usize = 4 /* channelCount */;
}

impl Encode for ClientNetworkData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u32(cast_length!(Self::NAME, "channelCount", self.channels.len())?);

        for channel in &self.channels {
            channel.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.channels.len() * CHANNEL_DEF_SIZE
    }
}

impl<'de> Decode<'de> for ClientNetworkData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let channel_count = src.read_u32() as usize;
        ensure_size!(ctx: Self::NAME, in: src, size: channel_count * CHANNEL_DEF_SIZE);

        let channels = (0..channel_count)
            .map(|_| ChannelDef::decode(src))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { channels })
    }
}

/// TS_UD_CS_CLUSTER.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientClusterData {
    pub flags: u32,
    pub redirected_session_id: u32,
}

impl ClientClusterData {
    const NAME: &'static str = "ClientClusterData";

    const FIXED_PART_SIZE: usize = 4 + 4;
}

impl Encode for ClientClusterData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.flags);
        dst.write_u32(self.redirected_session_id);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for ClientClusterData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        Ok(Self {
            flags: src.read_u32(),
            redirected_session_id: src.read_u32(),
        })
    }
}

/// Concatenation of the client-to-server user-data blocks, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientGccBlocks {
    pub core: ClientCoreData,
    pub security: ClientSecurityData,
    pub network: Option<ClientNetworkData>,
    pub cluster: Option<ClientClusterData>,
}

impl ClientGccBlocks {
    const NAME: &'static str = "ClientGccBlocks";

    pub fn channel_names(&self) -> Vec<String> {
        self.network
            .as_ref()
            .map(|net| net.channels.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }
}

impl Encode for ClientGccBlocks {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_user_data_header(dst, CS_CORE, self.core.size())?;
        self.core.encode(dst)?;

        write_user_data_header(dst, CS_SECURITY, self.security.size())?;
        self.security.encode(dst)?;

        if let Some(network) = &self.network {
            write_user_data_header(dst, CS_NET, network.size())?;
            network.encode(dst)?;
        }

        if let Some(cluster) = &self.cluster {
            write_user_data_header(dst, CS_CLUSTER, cluster.size())?;
            cluster.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let mut size = USER_DATA_HEADER_SIZE * 2 + self.core.size() + self.security.size();

        if let Some(network) = &self.network {
            size += USER_DATA_HEADER_SIZE + network.size();
        }
        if let Some(cluster) = &self.cluster {
            size += USER_DATA_HEADER_SIZE + cluster.size();
        }

        size
    }
}

impl<'de> Decode<'de> for ClientGccBlocks {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let mut core = None;
        let mut security = None;
        let mut network = None;
        let mut cluster = None;

        while src.len() >= USER_DATA_HEADER_SIZE {
            let block_type = src.read_u16();
            let block_length = usize::from(src.read_u16());

            let body_length = block_length
                .checked_sub(USER_DATA_HEADER_SIZE)
                .ok_or_else(|| invalid_field_err!("len", "user data block shorter than its header"))?;

            ensure_size!(ctx: Self::NAME, in: src, size: body_length);
            let mut body = ReadCursor::new(src.read_slice(body_length));

            match block_type {
                CS_CORE => core = Some(ClientCoreData::decode(&mut body)?),
                CS_SECURITY => security = Some(ClientSecurityData::decode(&mut body)?),
                CS_NET => network = Some(ClientNetworkData::decode(&mut body)?),
                CS_CLUSTER => cluster = Some(ClientClusterData::decode(&mut body)?),
                _ => {} // unknown blocks are skipped
            }
        }

        Ok(Self {
            core: core.ok_or_else(|| invalid_field_err!("csCore", "missing client core data"))?,
            security: security.ok_or_else(|| invalid_field_err!("csSecurity", "missing client security data"))?,
            network,
            cluster,
        })
    }
}

/// TS_UD_SC_CORE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCoreData {
    pub version: u32,
    pub client_requested_protocols: Option<u32>,
    pub early_capability_flags: Option<ServerEarlyCapabilityFlags>,
}

impl ServerCoreData {
    const NAME: &'static str = "ServerCoreData";

    const FIXED_PART_SIZE: usize = 4 /* version */;
}

impl Encode for ServerCoreData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u32(self.version);

        if let Some(protocols) = self.client_requested_protocols {
            dst.write_u32(protocols);
        }
        if let Some(flags) = self.early_capability_flags {
            dst.write_u32(flags.bits());
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + self.client_requested_protocols.map_or(0, |_| 4)
            + self.early_capability_flags.map_or(0, |_| 4)
    }
}

impl<'de> Decode<'de> for ServerCoreData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let version = src.read_u32();

        let client_requested_protocols = (src.len() >= 4).then(|| src.read_u32());
        let early_capability_flags =
            (src.len() >= 4).then(|| ServerEarlyCapabilityFlags::from_bits_truncate(src.read_u32()));

        Ok(Self {
            version,
            client_requested_protocols,
            early_capability_flags,
        })
    }
}

/// TS_UD_SC_SEC1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSecurityData {
    pub encryption_method: u32,
    pub encryption_level: u32,
}

impl ServerSecurityData {
    const NAME: &'static str = "ServerSecurityData";

    const FIXED_PART_SIZE: usize = 4 + 4;

    pub fn no_security() -> Self {
        Self::default()
    }
}

impl Encode for ServerSecurityData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.encryption_method);
        dst.write_u32(self.encryption_level);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for ServerSecurityData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let encryption_method = src.read_u32();
        let encryption_level = src.read_u32();

        // With enhanced security both are zero and the certificate fields
        // are absent; the RC4 path is not supported.
        if encryption_method != 0 || encryption_level != 0 {
            return Err(invalid_field_err!(
                "encryptionMethod",
                "server requires standard RDP security (not supported)",
            ));
        }

        Ok(Self {
            encryption_method,
            encryption_level,
        })
    }
}

/// TS_UD_SC_NET: the I/O (global) channel plus one id per joined static
/// virtual channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerNetworkData {
    pub io_channel: u16,
    pub channel_ids: Vec<u16>,
}

impl ServerNetworkData {
    const NAME: &'static str = "ServerNetworkData";

    const FIXED_PART_SIZE: usize = 2 /* MCSChannelId */ + 2 /* channelCount */;

    fn padding_size(&self) -> usize {
        self.channel_ids.len() % 2 * 2
    }
}

impl Encode for ServerNetworkData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u16(self.io_channel);
        dst.write_u16(cast_length!(Self::NAME, "channelCount", self.channel_ids.len())?);

        for channel_id in &self.channel_ids {
            dst.write_u16(*channel_id);
        }

        write_padding!(dst, self.padding_size());

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.channel_ids.len() * 2 + self.padding_size()
    }
}

impl<'de> Decode<'de> for ServerNetworkData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let io_channel = src.read_u16();
        let channel_count = usize::from(src.read_u16());

        ensure_size!(ctx: Self::NAME, in: src, size: channel_count * 2);
        let channel_ids = (0..channel_count).map(|_| src.read_u16()).collect();

        Ok(Self {
            io_channel,
            channel_ids,
        })
    }
}

/// Concatenation of the server-to-client user-data blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerGccBlocks {
    pub core: ServerCoreData,
    pub security: ServerSecurityData,
    pub network: ServerNetworkData,
}

impl ServerGccBlocks {
    const NAME: &'static str = "ServerGccBlocks";

    pub fn channel_ids(&self) -> Vec<u16> {
        self.network.channel_ids.clone()
    }

    pub fn global_channel_id(&self) -> u16 {
        self.network.io_channel
    }

    pub fn skip_channel_join_supported(&self) -> bool {
        self.core
            .early_capability_flags
            .is_some_and(|flags| flags.contains(ServerEarlyCapabilityFlags::SKIP_CHANNELJOIN_SUPPORTED))
    }
}

impl Encode for ServerGccBlocks {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_user_data_header(dst, SC_CORE, self.core.size())?;
        self.core.encode(dst)?;

        write_user_data_header(dst, SC_SECURITY, self.security.size())?;
        self.security.encode(dst)?;

        write_user_data_header(dst, SC_NET, self.network.size())?;
        self.network.encode(dst)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        USER_DATA_HEADER_SIZE * 3 + self.core.size() + self.security.size() + self.network.size()
    }
}

impl<'de> Decode<'de> for ServerGccBlocks {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let mut core = None;
        let mut security = None;
        let mut network = None;

        while src.len() >= USER_DATA_HEADER_SIZE {
            let block_type = src.read_u16();
            let block_length = usize::from(src.read_u16());

            let body_length = block_length
                .checked_sub(USER_DATA_HEADER_SIZE)
                .ok_or_else(|| invalid_field_err!("len", "user data block shorter than its header"))?;

            ensure_size!(ctx: Self::NAME, in: src, size: body_length);
            let mut body = ReadCursor::new(src.read_slice(body_length));

            match block_type {
                SC_CORE => core = Some(ServerCoreData::decode(&mut body)?),
                SC_SECURITY => security = Some(ServerSecurityData::decode(&mut body)?),
                SC_NET => network = Some(ServerNetworkData::decode(&mut body)?),
                _ => {}
            }
        }

        Ok(Self {
            core: core.ok_or_else(|| invalid_field_err!("scCore", "missing server core data"))?,
            security: security.ok_or_else(|| invalid_field_err!("scSecurity", "missing server security data"))?,
            network: network.ok_or_else(|| invalid_field_err!("scNet", "missing server network data"))?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;

    pub(crate) fn client_blocks() -> ClientGccBlocks {
        ClientGccBlocks {
            core: ClientCoreData {
                desktop_width: 1280,
                desktop_height: 720,
                keyboard_layout: 0x409,
                client_build: 2600,
                client_name: "opal".to_owned(),
                keyboard_type: 4,
                keyboard_subtype: 0,
                keyboard_functional_keys_count: 12,
                ime_file_name: String::new(),
                high_color_depth: 24,
                supported_color_depths: 0x08,
                early_capability_flags: ClientEarlyCapabilityFlags::SUPPORT_ERR_INFO_PDU,
                dig_product_id: String::new(),
                server_selected_protocol: 1,
            },
            security: ClientSecurityData::no_security(),
            network: Some(ClientNetworkData {
                channels: vec![ChannelDef {
                    name: "rdpdr".to_owned(),
                    options: ChannelOptions::INITIALIZED,
                }],
            }),
            cluster: None,
        }
    }

    pub(crate) fn server_blocks() -> ServerGccBlocks {
        ServerGccBlocks {
            core: ServerCoreData {
                version: RDP_VERSION_5_PLUS,
                client_requested_protocols: Some(1),
                early_capability_flags: None,
            },
            security: ServerSecurityData::no_security(),
            network: ServerNetworkData {
                io_channel: 1003,
                channel_ids: vec![1004],
            },
        }
    }

    #[test]
    fn client_blocks_roundtrip() {
        let blocks = client_blocks();
        let encoded = encode_vec(&blocks).unwrap();
        assert_eq!(encoded.len(), blocks.size());

        let decoded: ClientGccBlocks = decode(&encoded).unwrap();
        assert_eq!(decoded, blocks);
    }

    #[test]
    fn server_blocks_roundtrip() {
        let blocks = server_blocks();
        let encoded = encode_vec(&blocks).unwrap();
        assert_eq!(encoded.len(), blocks.size());

        let decoded: ServerGccBlocks = decode(&encoded).unwrap();
        assert_eq!(decoded, blocks);
        assert_eq!(decoded.global_channel_id(), 1003);
        assert_eq!(decoded.channel_ids(), vec![1004]);
        assert!(!decoded.skip_channel_join_supported());
    }

    #[test]
    fn odd_channel_count_is_padded_to_even_length() {
        let blocks = server_blocks();
        assert_eq!(blocks.network.size() % 4, 0);
    }
}
