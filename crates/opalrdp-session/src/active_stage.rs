//! Per-channel demultiplexer for the active phase.
//!
//! Server send-data-indications arrive in order and are routed by
//! channel id: the graphics channel feeds the RemoteFX pipeline, the
//! global channel carries share-control traffic (errors, deactivation),
//! anything else is logged and dropped.

use std::borrow::Cow;

use opalrdp_connector::ConnectionResult;
use opalrdp_core::{decode, encode_buf, encode_vec, WriteBuf};
use opalrdp_pdu::rdp::{ShareControlHeader, ShareControlPdu, ShareDataHeader, ShareDataPdu, StreamPriority};
use opalrdp_pdu::rfx::FrameAcknowledgePdu;
use opalrdp_pdu::mcs;

use crate::rfx::{DecodingContext, FrameId};
use crate::{Compositor, SessionError, SessionErrorExt as _, SessionErrorKind, SessionResult};

/// What one processed PDU amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveStageOutput {
    /// Nothing user-visible happened.
    Nothing,
    /// These RemoteFX frames finished; acknowledges were written.
    FramesComplete(Vec<FrameId>),
    /// The server deactivated the share (a resize or reconnect follows).
    DeactivateAll,
}

pub struct ActiveStage {
    io_channel_id: u16,
    user_channel_id: u16,
    graphics_channel_id: u16,
    share_id: u32,
    rfx: DecodingContext,
}

impl ActiveStage {
    /// `graphics_channel_id` selects which channel's payloads are fed to
    /// the RemoteFX parser.
    pub fn new(connection: &ConnectionResult, graphics_channel_id: u16) -> Self {
        Self {
            io_channel_id: connection.io_channel_id,
            user_channel_id: connection.user_channel_id,
            graphics_channel_id,
            share_id: connection.share_id,
            rfx: DecodingContext::new(),
        }
    }

    pub fn decoding_context(&self) -> &DecodingContext {
        &self.rfx
    }

    /// Processes one incoming X.224-framed PDU. Frame acknowledges for
    /// completed frames are written into `output`.
    pub fn process(
        &mut self,
        input: &[u8],
        compositor: &mut dyn Compositor,
        output: &mut WriteBuf,
    ) -> SessionResult<ActiveStageOutput> {
        let message = decode::<mcs::McsMessage<'_>>(input).map_err(SessionError::decode)?;

        let indication = match message {
            mcs::McsMessage::SendDataIndication(indication) => indication,
            mcs::McsMessage::DisconnectProviderUltimatum(ultimatum) => {
                info!(reason = %ultimatum.reason, "Server disconnected the session");
                return Err(SessionError::new(
                    "active stage",
                    SessionErrorKind::Disconnected(ultimatum.reason),
                ));
            }
            other => {
                warn!(message = ?other, "Unexpected MCS message during the active phase");
                return Ok(ActiveStageOutput::Nothing);
            }
        };

        if indication.channel_id == self.graphics_channel_id {
            let completed = self.rfx.process(indication.user_data.as_ref(), compositor)?;

            for frame_id in &completed {
                self.send_frame_acknowledge(*frame_id, output)?;
            }

            return Ok(if completed.is_empty() {
                ActiveStageOutput::Nothing
            } else {
                ActiveStageOutput::FramesComplete(completed)
            });
        }

        if indication.channel_id == self.io_channel_id {
            return self.process_share_control(indication.user_data.as_ref());
        }

        debug!(channel_id = indication.channel_id, "Data on an unhandled channel");
        Ok(ActiveStageOutput::Nothing)
    }

    fn process_share_control(&mut self, user_data: &[u8]) -> SessionResult<ActiveStageOutput> {
        let header = decode::<ShareControlHeader>(user_data).map_err(SessionError::decode)?;

        match header.share_control_pdu {
            ShareControlPdu::ServerDeactivateAll => {
                info!("Server deactivated the share");
                Ok(ActiveStageOutput::DeactivateAll)
            }
            ShareControlPdu::Data(data) => match data.share_data_pdu {
                ShareDataPdu::ErrorInfo(code) => Err(SessionError::reason(
                    "active stage",
                    format!("server error info: {code:#010X}"),
                )),
                other => {
                    debug!(message = ?other, "Ignored share data PDU");
                    Ok(ActiveStageOutput::Nothing)
                }
            },
            other => {
                debug!(message = ?other, "Ignored share control PDU");
                Ok(ActiveStageOutput::Nothing)
            }
        }
    }

    fn send_frame_acknowledge(&self, frame_id: FrameId, output: &mut WriteBuf) -> SessionResult<usize> {
        let header = ShareControlHeader {
            share_control_pdu: ShareControlPdu::Data(ShareDataHeader {
                share_data_pdu: ShareDataPdu::FrameAcknowledge(FrameAcknowledgePdu { frame_id }),
                stream_priority: StreamPriority::Low,
            }),
            pdu_source: self.user_channel_id,
            share_id: self.share_id,
        };

        let user_data = encode_vec(&header).map_err(SessionError::encode)?;

        let pdu = mcs::SendDataRequest {
            initiator_id: self.user_channel_id,
            channel_id: self.io_channel_id,
            user_data: Cow::Owned(user_data),
        };

        encode_buf(&pdu, output).map_err(SessionError::encode)
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_connector::DesktopSize;
    use opalrdp_pdu::rfx::RfxRectangle;

    use super::*;

    const IO_CHANNEL: u16 = 1003;
    const GFX_CHANNEL: u16 = 1005;

    #[derive(Default)]
    struct CountingCompositor {
        tiles: usize,
        frames: Vec<FrameId>,
    }

    impl Compositor for CountingCompositor {
        fn apply_tile(&mut self, _: u16, _: u16, _: &[u8]) {
            self.tiles += 1;
        }

        fn frame_complete(&mut self, frame_index: u32, _: &[RfxRectangle]) {
            self.frames.push(frame_index);
        }
    }

    fn stage() -> ActiveStage {
        ActiveStage::new(
            &ConnectionResult {
                io_channel_id: IO_CHANNEL,
                user_channel_id: 1007,
                share_id: 0x0001_000F,
                desktop_size: DesktopSize { width: 1280, height: 720 },
                static_channels: vec![("graphics".to_owned(), GFX_CHANNEL)],
            },
            GFX_CHANNEL,
        )
    }

    fn indication(channel_id: u16, user_data: Vec<u8>) -> Vec<u8> {
        encode_vec(&mcs::SendDataIndication {
            initiator_id: 1002,
            channel_id,
            user_data: Cow::Owned(user_data),
        })
        .unwrap()
    }

    fn frame_end_only_stream() -> Vec<u8> {
        // FRAME_BEGIN index 9, then FRAME_END
        let mut stream = Vec::new();
        stream.extend_from_slice(&[0xC4, 0xCC, 0x0E, 0x00, 0x00, 0x00, 0x01, 0x00]);
        stream.extend_from_slice(&[0x09, 0x00, 0x00, 0x00, 0x01, 0x00]);
        stream.extend_from_slice(&[0xC5, 0xCC, 0x08, 0x00, 0x00, 0x00, 0x01, 0x00]);
        stream
    }

    #[test]
    fn graphics_payload_produces_an_acknowledge() {
        let mut stage = stage();
        let mut compositor = CountingCompositor::default();
        let mut output = WriteBuf::new();

        let outcome = stage
            .process(&indication(GFX_CHANNEL, frame_end_only_stream()), &mut compositor, &mut output)
            .unwrap();

        assert_eq!(outcome, ActiveStageOutput::FramesComplete(vec![9]));
        assert_eq!(compositor.frames, vec![9]);
        assert!(output.filled_len() > 0, "frame acknowledge must be written");
    }

    #[test]
    fn error_info_on_the_io_channel_is_fatal() {
        let mut stage = stage();
        let mut compositor = CountingCompositor::default();
        let mut output = WriteBuf::new();

        let header = ShareControlHeader {
            share_control_pdu: ShareControlPdu::Data(ShareDataHeader {
                share_data_pdu: ShareDataPdu::ErrorInfo(0xDEAD),
                stream_priority: StreamPriority::Medium,
            }),
            pdu_source: 1002,
            share_id: 0x0001_000F,
        };

        let err = stage
            .process(
                &indication(IO_CHANNEL, encode_vec(&header).unwrap()),
                &mut compositor,
                &mut output,
            )
            .unwrap_err();

        assert!(err.to_string().contains("error info"));
    }

    #[test]
    fn unknown_channels_are_ignored() {
        let mut stage = stage();
        let mut compositor = CountingCompositor::default();
        let mut output = WriteBuf::new();

        let outcome = stage
            .process(&indication(1099, vec![0xAA; 8]), &mut compositor, &mut output)
            .unwrap();

        assert_eq!(outcome, ActiveStageOutput::Nothing);
        assert_eq!(compositor.tiles, 0);
    }

    #[test]
    fn disconnect_ultimatum_is_terminal() {
        let mut stage = stage();
        let mut compositor = CountingCompositor::default();
        let mut output = WriteBuf::new();

        let ultimatum = encode_vec(&mcs::DisconnectProviderUltimatum {
            reason: mcs::DisconnectReason::UserRequested,
        })
        .unwrap();

        let err = stage.process(&ultimatum, &mut compositor, &mut output).unwrap_err();
        assert!(matches!(err.kind(), SessionErrorKind::Disconnected(_)));
    }
}
