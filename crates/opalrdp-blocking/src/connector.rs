//! Drives a [`ClientConnector`] over a blocking stream.
//!
//! The sequence splits at the security upgrade: `connect_begin` runs up
//! to the point where the TLS handshake must happen, the caller upgrades
//! the stream (externally, with whatever TLS stack it uses), and
//! `connect_finalize` resumes over the upgraded stream, running the
//! CredSSP token exchange first when NLA was negotiated.

use std::io::{Read, Write};

use opalrdp_connector::{
    custom_err, ClientConnector, ClientConnectorState, ConnectionResult, ConnectorResult, NlaAuthenticator,
    NlaSequence, Sequence as _, State as _,
};
use opalrdp_core::WriteBuf;

use crate::framed::Framed;
use crate::{StreamDeadline, LICENSING_READ_TIMEOUT, SECURITY_UPGRADE_TIMEOUT};

#[non_exhaustive]
pub struct ShouldUpgrade;

pub fn connect_begin<S>(framed: &mut Framed<S>, connector: &mut ClientConnector) -> ConnectorResult<ShouldUpgrade>
where
    S: Read + Write,
{
    let mut buf = WriteBuf::new();

    info!("Begin connection procedure");

    while !connector.should_perform_security_upgrade() {
        single_sequence_step(framed, connector, &mut buf)?;
    }

    Ok(ShouldUpgrade)
}

#[non_exhaustive]
pub struct Upgraded;

pub fn mark_as_upgraded(_: ShouldUpgrade, connector: &mut ClientConnector) -> ConnectorResult<Upgraded> {
    trace!("Marked as upgraded");
    connector.mark_security_upgrade_as_done()?;
    Ok(Upgraded)
}

pub fn connect_finalize<S>(
    _: Upgraded,
    framed: &mut Framed<S>,
    mut connector: ClientConnector,
    mut authenticator: Option<&mut dyn NlaAuthenticator>,
) -> ConnectorResult<ConnectionResult>
where
    S: Read + Write + StreamDeadline,
{
    let mut buf = WriteBuf::new();

    if connector.should_perform_nla() {
        let authenticator = authenticator
            .take()
            .ok_or_else(|| opalrdp_connector::general_err!("NLA was negotiated but no authenticator was provided"))?;

        framed
            .get_inner_mut()
            .set_read_deadline(Some(SECURITY_UPGRADE_TIMEOUT))
            .map_err(|e| custom_err!("set NLA deadline", e))?;

        perform_nla_exchange(framed, authenticator, &mut buf)?;

        connector.mark_nla_as_done()?;
    }

    debug!("Remainder of the connection sequence");

    let result = loop {
        let licensing = matches!(connector.state, ClientConnectorState::LicensingExchange { .. });
        framed
            .get_inner_mut()
            .set_read_deadline(licensing.then_some(LICENSING_READ_TIMEOUT))
            .map_err(|e| custom_err!("set licensing deadline", e))?;

        single_sequence_step(framed, &mut connector, &mut buf)?;

        if let ClientConnectorState::Connected { result } = connector.state {
            break result;
        }
    };

    info!("Connected with success");

    Ok(result)
}

/// One step of any sans-IO sequence: read the PDU the hint asks for (if
/// any), advance the state machine, flush what it wrote.
pub fn single_sequence_step<S>(
    framed: &mut Framed<S>,
    connector: &mut ClientConnector,
    buf: &mut WriteBuf,
) -> ConnectorResult<()>
where
    S: Read + Write,
{
    buf.clear();

    let written = if let Some(next_pdu_hint) = connector.next_pdu_hint() {
        debug!(
            connector.state = connector.state().name(),
            hint = ?next_pdu_hint,
            "Wait for PDU"
        );

        let pdu = framed
            .read_by_hint(next_pdu_hint)
            .map_err(|e| custom_err!("read frame by hint", e))?;

        trace!(length = pdu.len(), "PDU received");

        connector.step(&pdu, buf)?
    } else {
        connector.step_no_input(buf)?
    };

    if let Some(response_len) = written.size() {
        let response = &buf[..response_len];
        trace!(response_len, "Send response");
        framed.write_all(response).map_err(|e| custom_err!("write all", e))?;
    }

    Ok(())
}

fn perform_nla_exchange<S>(
    framed: &mut Framed<S>,
    authenticator: &mut dyn NlaAuthenticator,
    buf: &mut WriteBuf,
) -> ConnectorResult<()>
where
    S: Read + Write,
{
    debug!("CredSSP exchange");

    let mut sequence = NlaSequence::new(authenticator);

    while !sequence.is_complete() {
        buf.clear();

        let input = if sequence.wants_input() {
            read_ts_request(framed)?
        } else {
            Vec::new()
        };

        let written = sequence.step(&input, buf)?;

        if let Some(response_len) = written.size() {
            framed
                .write_all(&buf[..response_len])
                .map_err(|e| custom_err!("write all", e))?;
        }
    }

    Ok(())
}

/// Reads one DER-framed TS-Request from the stream.
fn read_ts_request<S>(framed: &mut Framed<S>) -> ConnectorResult<Vec<u8>>
where
    S: Read + Write,
{
    loop {
        if let Some(length) = find_ts_request_size(framed.peek())? {
            let token = framed
                .read_exact(length)
                .map_err(|e| custom_err!("read TS-Request", e))?;
            return Ok(token.to_vec());
        }

        let buffered = framed.peek().len();
        framed
            .fill_to(buffered + 1)
            .map_err(|e| custom_err!("read TS-Request header", e))?;
    }
}

/// DER length of a TS-Request (an ASN.1 SEQUENCE), or `None` when more
/// header bytes are needed.
fn find_ts_request_size(bytes: &[u8]) -> ConnectorResult<Option<usize>> {
    if bytes.len() < 2 {
        return Ok(None);
    }

    if bytes[0] != 0x30 {
        return Err(opalrdp_connector::reason_err!(
            "TS-Request",
            "unexpected leading byte {:#04X} (not a DER SEQUENCE)",
            bytes[0],
        ));
    }

    let first = bytes[1];

    if first & 0x80 == 0 {
        return Ok(Some(2 + usize::from(first)));
    }

    let length_of_length = usize::from(first & 0x7F);
    if length_of_length == 0 || length_of_length > 4 {
        return Err(opalrdp_connector::reason_err!(
            "TS-Request",
            "unsupported DER length of length: {length_of_length}",
        ));
    }

    if bytes.len() < 2 + length_of_length {
        return Ok(None);
    }

    let mut length: usize = 0;
    for byte in &bytes[2..2 + length_of_length] {
        length = (length << 8) | usize::from(*byte);
    }

    Ok(Some(2 + length_of_length + length))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn der_short_form_length() {
        assert_eq!(find_ts_request_size(&[0x30, 0x05]).unwrap(), Some(7));
    }

    #[test]
    fn der_long_form_length() {
        assert_eq!(find_ts_request_size(&[0x30, 0x82, 0x01, 0x00]).unwrap(), Some(0x104));
    }

    #[test]
    fn der_header_needs_more_bytes() {
        assert_eq!(find_ts_request_size(&[0x30]).unwrap(), None);
        assert_eq!(find_ts_request_size(&[0x30, 0x82, 0x01]).unwrap(), None);
    }

    #[test]
    fn non_sequence_leading_byte_is_rejected() {
        assert!(find_ts_request_size(&[0x31, 0x05]).is_err());
    }
}
