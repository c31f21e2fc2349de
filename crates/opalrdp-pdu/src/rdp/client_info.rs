//! TS_INFO_PACKET, sent on the global channel right after channel join.
//!
//! Under enhanced security (TLS / NLA) the packet is written bare, without
//! an RDP basic security header.

use bitflags::bitflags;

use opalrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClientInfoFlags: u32 {
        const MOUSE = 0x0000_0001;
        const DISABLE_CTRL_ALT_DEL = 0x0000_0002;
        const AUTOLOGON = 0x0000_0008;
        const UNICODE = 0x0000_0010;
        const MAXIMIZE_SHELL = 0x0000_0020;
        const LOGON_NOTIFY = 0x0000_0040;
        const COMPRESSION = 0x0000_0080;
        const ENABLE_WINDOWS_KEY = 0x0000_0100;
        const MOUSE_HAS_WHEEL = 0x0002_0000;
        const NO_AUDIO_PLAYBACK = 0x0008_0000;
        const LOGON_ERRORS = 0x0010_0000;
        const VIDEO_DISABLE = 0x0040_0000;
    }
}

/// Address family of the extended info packet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AddressFamily(u16);

impl AddressFamily {
    pub const INET: Self = Self(0x0002);
    pub const INET6: Self = Self(0x0017);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub domain: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedClientInfo {
    pub address_family: AddressFamily,
    pub address: String,
    pub working_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub credentials: Credentials,
    pub code_page: u32,
    pub flags: ClientInfoFlags,
    pub alternate_shell: String,
    pub work_dir: String,
    pub extra_info: ExtendedClientInfo,
}

impl ClientInfo {
    const NAME: &'static str = "ClientInfo";

    const FIXED_PART_SIZE: usize = 4 /* codePage */ + 4 /* flags */ + 2 * 5 /* cb fields */;

    // Every string is UTF-16 with a null terminator not counted by its
    // cb field.
    fn utf16_len(value: &str) -> usize {
        value.encode_utf16().count() * 2
    }
}

fn write_utf16_with_null(dst: &mut WriteCursor<'_>, value: &str) {
    for unit in value.encode_utf16() {
        dst.write_u16(unit);
    }
    dst.write_u16(0);
}

fn read_utf16(src: &mut ReadCursor<'_>, byte_length: usize) -> DecodeResult<String> {
    let units: Vec<u16> = (0..byte_length / 2).map(|_| src.read_u16()).collect();
    String::from_utf16(&units).map_err(|_| invalid_field_err!("string", "invalid UTF-16"))
}

impl Encode for ClientInfo {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u32(self.code_page);
        dst.write_u32((self.flags | ClientInfoFlags::UNICODE).bits());

        dst.write_u16(cast_length!(Self::NAME, "cbDomain", Self::utf16_len(&self.credentials.domain))?);
        dst.write_u16(cast_length!(Self::NAME, "cbUserName", Self::utf16_len(&self.credentials.username))?);
        dst.write_u16(cast_length!(Self::NAME, "cbPassword", Self::utf16_len(&self.credentials.password))?);
        dst.write_u16(cast_length!(Self::NAME, "cbAlternateShell", Self::utf16_len(&self.alternate_shell))?);
        dst.write_u16(cast_length!(Self::NAME, "cbWorkingDir", Self::utf16_len(&self.work_dir))?);

        write_utf16_with_null(dst, &self.credentials.domain);
        write_utf16_with_null(dst, &self.credentials.username);
        write_utf16_with_null(dst, &self.credentials.password);
        write_utf16_with_null(dst, &self.alternate_shell);
        write_utf16_with_null(dst, &self.work_dir);

        // TS_EXTENDED_INFO_PACKET, through clientDir
        dst.write_u16(self.extra_info.address_family.0);
        dst.write_u16(cast_length!(
            Self::NAME,
            "cbClientAddress",
            Self::utf16_len(&self.extra_info.address) + 2
        )?);
        write_utf16_with_null(dst, &self.extra_info.address);
        dst.write_u16(cast_length!(
            Self::NAME,
            "cbClientDir",
            Self::utf16_len(&self.extra_info.working_dir) + 2
        )?);
        write_utf16_with_null(dst, &self.extra_info.working_dir);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + Self::utf16_len(&self.credentials.domain) + 2
            + Self::utf16_len(&self.credentials.username) + 2
            + Self::utf16_len(&self.credentials.password) + 2
            + Self::utf16_len(&self.alternate_shell) + 2
            + Self::utf16_len(&self.work_dir) + 2
            + 2 /* addressFamily */
            + 2 + Self::utf16_len(&self.extra_info.address) + 2
            + 2 + Self::utf16_len(&self.extra_info.working_dir) + 2
    }
}

impl<'de> Decode<'de> for ClientInfo {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let code_page = src.read_u32();
        let flags = ClientInfoFlags::from_bits_truncate(src.read_u32());

        let cb_domain = usize::from(src.read_u16());
        let cb_username = usize::from(src.read_u16());
        let cb_password = usize::from(src.read_u16());
        let cb_alternate_shell = usize::from(src.read_u16());
        let cb_work_dir = usize::from(src.read_u16());

        let strings_size = cb_domain + cb_username + cb_password + cb_alternate_shell + cb_work_dir + 5 * 2;
        ensure_size!(ctx: Self::NAME, in: src, size: strings_size);

        let mut read_counted = |cb: usize| -> DecodeResult<String> {
            let value = read_utf16(src, cb)?;
            src.advance(2); // null terminator
            Ok(value)
        };

        let domain = read_counted(cb_domain)?;
        let username = read_counted(cb_username)?;
        let password = read_counted(cb_password)?;
        let alternate_shell = read_counted(cb_alternate_shell)?;
        let work_dir = read_counted(cb_work_dir)?;

        ensure_size!(ctx: Self::NAME, in: src, size: 4);
        let address_family = AddressFamily(src.read_u16());
        let cb_address = usize::from(src.read_u16());
        ensure_size!(ctx: Self::NAME, in: src, size: cb_address);
        let address = read_utf16(src, cb_address.saturating_sub(2))?;
        src.advance(2);

        ensure_size!(ctx: Self::NAME, in: src, size: 2);
        let cb_client_dir = usize::from(src.read_u16());
        ensure_size!(ctx: Self::NAME, in: src, size: cb_client_dir);
        let working_dir = read_utf16(src, cb_client_dir.saturating_sub(2))?;
        src.advance(2);

        Ok(Self {
            credentials: Credentials {
                domain,
                username,
                password,
            },
            code_page,
            flags,
            alternate_shell,
            work_dir,
            extra_info: ExtendedClientInfo {
                address_family,
                address,
                working_dir,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;

    fn sample() -> ClientInfo {
        ClientInfo {
            credentials: Credentials {
                domain: "CORP".to_owned(),
                username: "alex".to_owned(),
                password: "hunter2".to_owned(),
            },
            code_page: 0,
            flags: ClientInfoFlags::MOUSE | ClientInfoFlags::DISABLE_CTRL_ALT_DEL,
            alternate_shell: String::new(),
            work_dir: String::new(),
            extra_info: ExtendedClientInfo {
                address_family: AddressFamily::INET,
                address: "192.0.2.17".to_owned(),
                working_dir: "C:\\".to_owned(),
            },
        }
    }

    #[test]
    fn roundtrip() {
        let info = sample();

        let encoded = encode_vec(&info).unwrap();
        assert_eq!(encoded.len(), info.size());

        let decoded: ClientInfo = decode(&encoded).unwrap();
        // the UNICODE flag is forced on encode
        assert_eq!(decoded.flags, info.flags | ClientInfoFlags::UNICODE);
        assert_eq!(decoded.credentials, info.credentials);
        assert_eq!(decoded.extra_info, info.extra_info);
    }

    #[test]
    fn counted_fields_exclude_the_null_terminator() {
        let info = sample();
        let encoded = encode_vec(&info).unwrap();

        // cbDomain at offset 8: "CORP" is four UTF-16 units
        assert_eq!(&encoded[8..10], &8u16.to_le_bytes());
    }
}
