//! MCS domain bring-up: erect domain, attach user, then one channel
//! join at a time. Joins are strictly sequential: the next request goes
//! out only after the previous confirm came back.

use core::mem;
use std::collections::VecDeque;

use opalrdp_core::{decode, encode_buf, WriteBuf};
use opalrdp_pdu::{mcs, PduHint};

use crate::{ConnectorError, ConnectorErrorExt as _, ConnectorResult, Sequence, State, Written};

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum ChannelConnectionState {
    #[default]
    Consumed,

    SendErectDomainRequest,
    SendAttachUserRequest,
    WaitAttachUserConfirm,
    SendChannelJoinRequest {
        user_channel_id: u16,
        queue: VecDeque<u16>,
    },
    WaitChannelJoinConfirm {
        user_channel_id: u16,
        requested_channel_id: u16,
        queue: VecDeque<u16>,
    },
    AllJoined {
        user_channel_id: u16,
    },
}

impl State for ChannelConnectionState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::SendErectDomainRequest => "SendErectDomainRequest",
            Self::SendAttachUserRequest => "SendAttachUserRequest",
            Self::WaitAttachUserConfirm => "WaitAttachUserConfirm",
            Self::SendChannelJoinRequest { .. } => "SendChannelJoinRequest",
            Self::WaitChannelJoinConfirm { .. } => "WaitChannelJoinConfirm",
            Self::AllJoined { .. } => "AllJoined",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::AllJoined { .. })
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

#[derive(Debug)]
pub struct ChannelConnectionSequence {
    pub state: ChannelConnectionState,
    io_channel_id: u16,
    virtual_channel_ids: Vec<u16>,
}

impl ChannelConnectionSequence {
    /// `virtual_channel_ids` are joined after the global and user
    /// channels, in the given order.
    pub fn new(io_channel_id: u16, virtual_channel_ids: Vec<u16>) -> Self {
        Self {
            state: ChannelConnectionState::SendErectDomainRequest,
            io_channel_id,
            virtual_channel_ids,
        }
    }

    pub fn user_channel_id(&self) -> Option<u16> {
        match self.state {
            ChannelConnectionState::AllJoined { user_channel_id } => Some(user_channel_id),
            _ => None,
        }
    }
}

impl Sequence for ChannelConnectionSequence {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match self.state {
            ChannelConnectionState::Consumed => None,
            ChannelConnectionState::SendErectDomainRequest => None,
            ChannelConnectionState::SendAttachUserRequest => None,
            ChannelConnectionState::WaitAttachUserConfirm => Some(&opalrdp_pdu::X224_HINT),
            ChannelConnectionState::SendChannelJoinRequest { .. } => None,
            ChannelConnectionState::WaitChannelJoinConfirm { .. } => Some(&opalrdp_pdu::X224_HINT),
            ChannelConnectionState::AllJoined { .. } => None,
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written> {
        let (written, next_state) = match mem::take(&mut self.state) {
            ChannelConnectionState::Consumed => {
                return Err(general_err!("channel connection sequence state is consumed (this is a bug)"))
            }

            ChannelConnectionState::SendErectDomainRequest => {
                let erect_domain_request = mcs::ErectDomainPdu {
                    sub_height: 0,
                    sub_interval: 0,
                };

                debug!(message = ?erect_domain_request, "Send");

                let written = encode_buf(&erect_domain_request, output).map_err(ConnectorError::encode)?;

                (
                    Written::from_size(written)?,
                    ChannelConnectionState::SendAttachUserRequest,
                )
            }

            ChannelConnectionState::SendAttachUserRequest => {
                let attach_user_request = mcs::AttachUserRequest;

                debug!(message = ?attach_user_request, "Send");

                let written = encode_buf(&attach_user_request, output).map_err(ConnectorError::encode)?;

                (
                    Written::from_size(written)?,
                    ChannelConnectionState::WaitAttachUserConfirm,
                )
            }

            ChannelConnectionState::WaitAttachUserConfirm => {
                let attach_user_confirm =
                    decode::<mcs::AttachUserConfirm>(input).map_err(ConnectorError::decode)?;

                debug!(message = ?attach_user_confirm, "Received");

                if attach_user_confirm.result != 0 {
                    return Err(reason_err!(
                        "AttachUserConfirm",
                        "attach user failed: {}",
                        mcs::result_description(attach_user_confirm.result),
                    ));
                }

                let user_channel_id = attach_user_confirm.initiator_id;

                // join order: global, user, then the virtual channels
                let mut queue = VecDeque::with_capacity(2 + self.virtual_channel_ids.len());
                queue.push_back(self.io_channel_id);
                queue.push_back(user_channel_id);
                queue.extend(self.virtual_channel_ids.iter().copied());

                (
                    Written::Nothing,
                    ChannelConnectionState::SendChannelJoinRequest {
                        user_channel_id,
                        queue,
                    },
                )
            }

            ChannelConnectionState::SendChannelJoinRequest {
                user_channel_id,
                mut queue,
            } => {
                let Some(channel_id) = queue.pop_front() else {
                    return Err(general_err!("empty channel join queue (this is a bug)"));
                };

                let channel_join_request = mcs::ChannelJoinRequest {
                    initiator_id: user_channel_id,
                    channel_id,
                };

                debug!(message = ?channel_join_request, "Send");

                let written = encode_buf(&channel_join_request, output).map_err(ConnectorError::encode)?;

                (
                    Written::from_size(written)?,
                    ChannelConnectionState::WaitChannelJoinConfirm {
                        user_channel_id,
                        requested_channel_id: channel_id,
                        queue,
                    },
                )
            }

            ChannelConnectionState::WaitChannelJoinConfirm {
                user_channel_id,
                requested_channel_id,
                queue,
            } => {
                let channel_join_confirm =
                    decode::<mcs::ChannelJoinConfirm>(input).map_err(ConnectorError::decode)?;

                debug!(message = ?channel_join_confirm, "Received");

                if channel_join_confirm.result != 0 {
                    return Err(reason_err!(
                        "ChannelJoinConfirm",
                        "channel {requested_channel_id} join failed: {}",
                        mcs::result_description(channel_join_confirm.result),
                    ));
                }

                if channel_join_confirm.requested_channel_id != requested_channel_id {
                    return Err(reason_err!(
                        "ChannelJoinConfirm",
                        "confirm for channel {} while waiting on channel {requested_channel_id}",
                        channel_join_confirm.requested_channel_id,
                    ));
                }

                if channel_join_confirm.channel_id != channel_join_confirm.requested_channel_id {
                    return Err(reason_err!(
                        "ChannelJoinConfirm",
                        "channel joined under a different id: requested {}, got {}",
                        channel_join_confirm.requested_channel_id,
                        channel_join_confirm.channel_id,
                    ));
                }

                let next_state = if queue.is_empty() {
                    ChannelConnectionState::AllJoined { user_channel_id }
                } else {
                    ChannelConnectionState::SendChannelJoinRequest {
                        user_channel_id,
                        queue,
                    }
                };

                (Written::Nothing, next_state)
            }

            ChannelConnectionState::AllJoined { .. } => return Err(general_err!("all channels are already joined")),
        };

        self.state = next_state;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::encode_vec;

    use super::*;

    fn drive_send(sequence: &mut ChannelConnectionSequence) -> Vec<u8> {
        let mut output = WriteBuf::new();
        let written = sequence.step_no_input(&mut output).unwrap();
        output[..written.size().unwrap()].to_vec()
    }

    fn feed(sequence: &mut ChannelConnectionSequence, input: &[u8]) {
        let mut output = WriteBuf::new();
        let written = sequence.step(input, &mut output).unwrap();
        assert!(written.is_nothing());
    }

    #[test]
    fn joins_run_one_at_a_time_in_order() {
        let mut sequence = ChannelConnectionSequence::new(1003, vec![1005, 1006]);

        drive_send(&mut sequence); // erect domain
        drive_send(&mut sequence); // attach user

        let confirm = encode_vec(&mcs::AttachUserConfirm {
            result: 0,
            initiator_id: 1007,
        })
        .unwrap();
        feed(&mut sequence, &confirm);

        let expected_order = [1003u16, 1007, 1005, 1006];

        for expected in expected_order {
            let request_bytes = drive_send(&mut sequence);
            let request: mcs::ChannelJoinRequest = opalrdp_core::decode(&request_bytes).unwrap();
            assert_eq!(request.channel_id, expected);

            let confirm = encode_vec(&mcs::ChannelJoinConfirm {
                result: 0,
                initiator_id: 1007,
                requested_channel_id: expected,
                channel_id: expected,
            })
            .unwrap();
            feed(&mut sequence, &confirm);
        }

        assert!(sequence.state.is_terminal());
        assert_eq!(sequence.user_channel_id(), Some(1007));
    }

    #[test]
    fn join_failure_is_fatal() {
        let mut sequence = ChannelConnectionSequence::new(1003, vec![]);

        drive_send(&mut sequence);
        drive_send(&mut sequence);

        let confirm = encode_vec(&mcs::AttachUserConfirm {
            result: 0,
            initiator_id: 1007,
        })
        .unwrap();
        feed(&mut sequence, &confirm);

        drive_send(&mut sequence); // join request for the global channel

        let confirm = encode_vec(&mcs::ChannelJoinConfirm {
            result: 3, // rt-no-such-channel
            initiator_id: 1007,
            requested_channel_id: 1003,
            channel_id: 1003,
        })
        .unwrap();

        let mut output = WriteBuf::new();
        let err = sequence.step(&confirm, &mut output).unwrap_err();
        assert!(err.to_string().contains("rt-no-such-channel"));
    }

    #[test]
    fn attach_user_failure_is_fatal() {
        let mut sequence = ChannelConnectionSequence::new(1003, vec![]);

        drive_send(&mut sequence);
        drive_send(&mut sequence);

        let confirm = encode_vec(&mcs::AttachUserConfirm {
            result: 14,
            initiator_id: 1007,
        })
        .unwrap();

        let mut output = WriteBuf::new();
        assert!(sequence.step(&confirm, &mut output).is_err());
    }
}
