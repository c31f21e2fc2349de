//! Connection finalization: the client fires its four PDUs (synchronize,
//! cooperate, request control, font list) and waits for the server's
//! font map, after which the session is active.

use core::mem;

use opalrdp_core::{decode, WriteBuf};
use opalrdp_pdu::rdp::{
    ControlAction, ControlPdu, FontPdu, ShareControlHeader, ShareControlPdu, ShareDataHeader, ShareDataPdu,
    StreamPriority, SynchronizePdu,
};
use opalrdp_pdu::{mcs, PduHint};

use crate::connection::encode_send_data_request;
use crate::{ConnectorError, ConnectorErrorExt as _, ConnectorErrorKind, ConnectorResult, Sequence, State, Written};

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum ConnectionFinalizationState {
    #[default]
    Consumed,

    SendSynchronize,
    SendControlCooperate,
    SendRequestControl,
    SendFontList,
    WaitForResponse,
    Finalized,
}

impl State for ConnectionFinalizationState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::SendSynchronize => "SendSynchronize",
            Self::SendControlCooperate => "SendControlCooperate",
            Self::SendRequestControl => "SendRequestControl",
            Self::SendFontList => "SendFontList",
            Self::WaitForResponse => "WaitForResponse",
            Self::Finalized => "Finalized",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized)
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

#[derive(Debug)]
pub struct ConnectionFinalizationSequence {
    pub state: ConnectionFinalizationState,
    io_channel_id: u16,
    user_channel_id: u16,
    share_id: u32,
}

impl ConnectionFinalizationSequence {
    pub fn new(io_channel_id: u16, user_channel_id: u16, share_id: u32) -> Self {
        Self {
            state: ConnectionFinalizationState::SendSynchronize,
            io_channel_id,
            user_channel_id,
            share_id,
        }
    }

    fn send_data_pdu(&self, pdu: ShareDataPdu, output: &mut WriteBuf) -> ConnectorResult<Written> {
        let header = ShareControlHeader {
            share_control_pdu: ShareControlPdu::Data(ShareDataHeader {
                share_data_pdu: pdu,
                stream_priority: StreamPriority::Medium,
            }),
            pdu_source: self.user_channel_id,
            share_id: self.share_id,
        };

        debug!(message = ?header, "Send");

        let written = encode_send_data_request(self.user_channel_id, self.io_channel_id, &header, output)?;

        Written::from_size(written)
    }
}

impl Sequence for ConnectionFinalizationSequence {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match self.state {
            ConnectionFinalizationState::WaitForResponse => Some(&opalrdp_pdu::X224_HINT),
            _ => None,
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written> {
        let (written, next_state) = match mem::take(&mut self.state) {
            ConnectionFinalizationState::Consumed => {
                return Err(general_err!("finalization sequence state is consumed (this is a bug)"))
            }

            ConnectionFinalizationState::SendSynchronize => {
                let pdu = ShareDataPdu::Synchronize(SynchronizePdu {
                    target_user_id: self.user_channel_id,
                });

                (
                    self.send_data_pdu(pdu, output)?,
                    ConnectionFinalizationState::SendControlCooperate,
                )
            }

            ConnectionFinalizationState::SendControlCooperate => {
                let pdu = ShareDataPdu::Control(ControlPdu {
                    action: ControlAction::Cooperate,
                    grant_id: 0,
                    control_id: 0,
                });

                (
                    self.send_data_pdu(pdu, output)?,
                    ConnectionFinalizationState::SendRequestControl,
                )
            }

            ConnectionFinalizationState::SendRequestControl => {
                let pdu = ShareDataPdu::Control(ControlPdu {
                    action: ControlAction::RequestControl,
                    grant_id: 0,
                    control_id: 0,
                });

                (
                    self.send_data_pdu(pdu, output)?,
                    ConnectionFinalizationState::SendFontList,
                )
            }

            ConnectionFinalizationState::SendFontList => {
                let pdu = ShareDataPdu::FontList(FontPdu::default());

                (
                    self.send_data_pdu(pdu, output)?,
                    ConnectionFinalizationState::WaitForResponse,
                )
            }

            ConnectionFinalizationState::WaitForResponse => {
                let message = decode::<mcs::McsMessage<'_>>(input).map_err(ConnectorError::decode)?;

                let indication = match message {
                    mcs::McsMessage::SendDataIndication(indication) => indication,
                    mcs::McsMessage::DisconnectProviderUltimatum(ultimatum) => {
                        return Err(ConnectorError::new(
                            "finalization",
                            ConnectorErrorKind::DisconnectUltimatum(ultimatum.reason),
                        ));
                    }
                    _ => return Err(general_err!("unexpected MCS message during finalization")),
                };

                let header =
                    decode::<ShareControlHeader>(indication.user_data.as_ref()).map_err(ConnectorError::decode)?;

                let next_state = match header.share_control_pdu {
                    ShareControlPdu::Data(data) => match data.share_data_pdu {
                        ShareDataPdu::FontMap(_) => {
                            debug!("Received font map; session is active");
                            ConnectionFinalizationState::Finalized
                        }
                        ShareDataPdu::Synchronize(_) | ShareDataPdu::Control(_) => {
                            debug!(message = ?data.share_data_pdu, "Received");
                            ConnectionFinalizationState::WaitForResponse
                        }
                        ShareDataPdu::ErrorInfo(code) => {
                            return Err(reason_err!("finalization", "server error info: {code:#010X}"));
                        }
                        other => {
                            warn!(message = ?other, "Unexpected data PDU during finalization");
                            ConnectionFinalizationState::WaitForResponse
                        }
                    },
                    other => {
                        warn!(message = ?other, "Unexpected share control PDU during finalization");
                        ConnectionFinalizationState::WaitForResponse
                    }
                };

                (Written::Nothing, next_state)
            }

            ConnectionFinalizationState::Finalized => return Err(general_err!("already finalized")),
        };

        self.state = next_state;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use opalrdp_core::encode_vec;

    use super::*;

    fn indication_with_share_data(pdu: ShareDataPdu) -> Vec<u8> {
        let header = ShareControlHeader {
            share_control_pdu: ShareControlPdu::Data(ShareDataHeader {
                share_data_pdu: pdu,
                stream_priority: StreamPriority::Medium,
            }),
            pdu_source: 1002,
            share_id: 0x0001_000F,
        };

        let user_data = encode_vec(&header).unwrap();

        encode_vec(&mcs::SendDataIndication {
            initiator_id: 1002,
            channel_id: 1003,
            user_data: Cow::Owned(user_data),
        })
        .unwrap()
    }

    #[test]
    fn four_sends_then_font_map_finalizes() {
        let mut sequence = ConnectionFinalizationSequence::new(1003, 1007, 0x0001_000F);
        let mut output = WriteBuf::new();

        for _ in 0..4 {
            output.clear();
            let written = sequence.step_no_input(&mut output).unwrap();
            assert!(written.size().is_some());
        }

        assert!(matches!(sequence.state, ConnectionFinalizationState::WaitForResponse));

        // server synchronize, cooperate, granted control, then font map
        let responses = [
            ShareDataPdu::Synchronize(SynchronizePdu { target_user_id: 1007 }),
            ShareDataPdu::Control(ControlPdu {
                action: ControlAction::Cooperate,
                grant_id: 0,
                control_id: 0,
            }),
            ShareDataPdu::Control(ControlPdu {
                action: ControlAction::GrantedControl,
                grant_id: 1007,
                control_id: 0x03EA,
            }),
            ShareDataPdu::FontMap(FontPdu::default()),
        ];

        for pdu in responses {
            output.clear();
            sequence.step(&indication_with_share_data(pdu), &mut output).unwrap();
        }

        assert!(sequence.state.is_terminal());
    }

    #[test]
    fn error_info_is_fatal() {
        let mut sequence = ConnectionFinalizationSequence::new(1003, 1007, 1);
        sequence.state = ConnectionFinalizationState::WaitForResponse;
        let mut output = WriteBuf::new();

        let err = sequence
            .step(&indication_with_share_data(ShareDataPdu::ErrorInfo(0x1234)), &mut output)
            .unwrap_err();

        assert!(err.to_string().contains("error info"));
    }
}
