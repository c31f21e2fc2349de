//! Licensing phase of the connection sequence.
//!
//! The client accepts exactly two outcomes: a SERVER_NEW_LICENSE, or an
//! ERROR_ALERT carrying STATUS_VALID_CLIENT with ST_NO_TRANSITION.
//! Anything else ends the connection. A disconnect-provider-ultimatum
//! arriving here almost always means the credentials were rejected, and
//! the error says so.

use core::mem;

use opalrdp_core::{decode, WriteBuf};
use opalrdp_pdu::rdp::license::{LicenseMessage, ST_NO_TRANSITION, STATUS_VALID_CLIENT};
use opalrdp_pdu::{mcs, PduHint};

use crate::{ConnectorError, ConnectorErrorExt as _, ConnectorErrorKind, ConnectorResult, Sequence, State, Written};

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum LicenseExchangeState {
    #[default]
    Consumed,

    WaitLicenseMessage,
    LicenseExchanged,
}

impl State for LicenseExchangeState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::WaitLicenseMessage => "WaitLicenseMessage",
            Self::LicenseExchanged => "LicenseExchanged",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::LicenseExchanged)
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

#[derive(Debug)]
pub struct LicenseExchangeSequence {
    pub state: LicenseExchangeState,
    pub io_channel_id: u16,
}

impl LicenseExchangeSequence {
    pub fn new(io_channel_id: u16) -> Self {
        Self {
            state: LicenseExchangeState::WaitLicenseMessage,
            io_channel_id,
        }
    }
}

impl Sequence for LicenseExchangeSequence {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match self.state {
            LicenseExchangeState::Consumed => None,
            LicenseExchangeState::WaitLicenseMessage => Some(&opalrdp_pdu::X224_HINT),
            LicenseExchangeState::LicenseExchanged => None,
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], _output: &mut WriteBuf) -> ConnectorResult<Written> {
        let next_state = match mem::take(&mut self.state) {
            LicenseExchangeState::Consumed => {
                return Err(general_err!("license exchange sequence state is consumed (this is a bug)"))
            }

            LicenseExchangeState::WaitLicenseMessage => {
                let message = decode::<mcs::McsMessage<'_>>(input).map_err(ConnectorError::decode)?;

                let indication = match message {
                    mcs::McsMessage::SendDataIndication(indication) => indication,
                    mcs::McsMessage::DisconnectProviderUltimatum(ultimatum) => {
                        error!(reason = %ultimatum.reason, "Disconnected during licensing");
                        return Err(ConnectorError::new(
                            "licensing (authentication likely failed)",
                            ConnectorErrorKind::DisconnectUltimatum(ultimatum.reason),
                        ));
                    }
                    _ => return Err(general_err!("unexpected MCS message during licensing")),
                };

                if indication.channel_id != self.io_channel_id {
                    warn!(
                        channel_id = indication.channel_id,
                        io_channel_id = self.io_channel_id,
                        "License message on an unexpected channel"
                    );
                }

                let license = decode::<LicenseMessage>(indication.user_data.as_ref())
                    .map_err(ConnectorError::decode)?;

                match license {
                    LicenseMessage::NewLicense => {
                        info!("Server issued a new license");
                        LicenseExchangeState::LicenseExchanged
                    }
                    LicenseMessage::ErrorAlert(alert) if alert.is_valid_client() => {
                        debug!(message = ?alert, "Received");
                        info!("Server did not initiate license exchange");
                        LicenseExchangeState::LicenseExchanged
                    }
                    LicenseMessage::ErrorAlert(alert) => {
                        debug_assert!(
                            alert.error_code != STATUS_VALID_CLIENT || alert.state_transition != ST_NO_TRANSITION
                        );
                        return Err(ConnectorError::new(
                            "licensing",
                            ConnectorErrorKind::License(alert.error_code),
                        ));
                    }
                    LicenseMessage::Unsupported(msg_type) => {
                        return Err(reason_err!(
                            "licensing",
                            "server initiated a full license exchange (message type {msg_type:#04X}), which is not supported",
                        ));
                    }
                }
            }

            LicenseExchangeState::LicenseExchanged => return Err(general_err!("license already exchanged")),
        };

        self.state = next_state;

        Ok(Written::Nothing)
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use opalrdp_core::encode_vec;

    use super::*;

    fn indication_with(user_data: &[u8]) -> Vec<u8> {
        encode_vec(&mcs::SendDataIndication {
            initiator_id: 1002,
            channel_id: 1003,
            user_data: Cow::Borrowed(user_data),
        })
        .unwrap()
    }

    #[test]
    fn valid_client_alert_completes_the_phase() {
        let mut sequence = LicenseExchangeSequence::new(1003);
        let mut output = WriteBuf::new();

        let license = [
            0xFF, 0x03, 0x10, 0x00, //
            0x07, 0x00, 0x00, 0x00, //
            0x02, 0x00, 0x00, 0x00, //
            0x04, 0x00, 0x00, 0x00, //
        ];

        sequence.step(&indication_with(&license), &mut output).unwrap();
        assert!(sequence.state.is_terminal());
    }

    #[test]
    fn new_license_completes_the_phase() {
        let mut sequence = LicenseExchangeSequence::new(1003);
        let mut output = WriteBuf::new();

        let license = [0x03, 0x03, 0x04, 0x00];

        sequence.step(&indication_with(&license), &mut output).unwrap();
        assert!(sequence.state.is_terminal());
    }

    #[test]
    fn other_error_codes_are_terminal() {
        let mut sequence = LicenseExchangeSequence::new(1003);
        let mut output = WriteBuf::new();

        let license = [
            0xFF, 0x03, 0x0C, 0x00, //
            0x06, 0x00, 0x00, 0x00, // ERR_INVALID_CLIENT
            0x02, 0x00, 0x00, 0x00, //
        ];

        let err = sequence.step(&indication_with(&license), &mut output).unwrap_err();
        assert!(matches!(err.kind(), ConnectorErrorKind::License(0x06)));
    }

    #[test]
    fn disconnect_ultimatum_reads_as_authentication_failure() {
        let mut sequence = LicenseExchangeSequence::new(1003);
        let mut output = WriteBuf::new();

        let ultimatum = encode_vec(&mcs::DisconnectProviderUltimatum {
            reason: mcs::DisconnectReason::ProviderInitiated,
        })
        .unwrap();

        let err = sequence.step(&ultimatum, &mut output).unwrap_err();
        assert!(matches!(err.kind(), ConnectorErrorKind::DisconnectUltimatum(_)));
        assert!(err.to_string().contains("authentication likely failed"));
    }

    #[test]
    fn platform_challenge_is_rejected() {
        let mut sequence = LicenseExchangeSequence::new(1003);
        let mut output = WriteBuf::new();

        let license = [0x02, 0x03, 0x04, 0x00];

        let err = sequence.step(&indication_with(&license), &mut output).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }
}
