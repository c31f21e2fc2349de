//! The client connection sequence, from the X.224 connection request to
//! the active session.

use core::mem;
use std::borrow::Cow;

use opalrdp_core::{decode, encode_buf, encode_vec, Encode, WriteBuf};
use opalrdp_pdu::rdp::client_info::{AddressFamily, ClientInfoFlags, ExtendedClientInfo};
use opalrdp_pdu::rdp::{ClientInfo, ShareControlHeader, ShareControlPdu};
use opalrdp_pdu::x224::X224Data;
use opalrdp_pdu::{gcc, mcs, nego, rdp, PduHint};

use crate::channel_connection::{ChannelConnectionSequence, ChannelConnectionState};
use crate::connection_finalization::ConnectionFinalizationSequence;
use crate::license_exchange::LicenseExchangeSequence;
use crate::{
    encode_x224_packet, Config, ConnectorError, ConnectorErrorExt as _, ConnectorErrorKind, ConnectorResult,
    DesktopSize, Sequence, State, Written,
};

/// Everything the active session needs from the finished connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionResult {
    pub io_channel_id: u16,
    pub user_channel_id: u16,
    pub share_id: u32,
    pub desktop_size: DesktopSize,
    /// Joined static virtual channels, `(name, id)`, in join order.
    pub static_channels: Vec<(String, u16)>,
}

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum ClientConnectorState {
    #[default]
    Consumed,

    ConnectionInitiationSendRequest,
    ConnectionInitiationWaitConfirm {
        requested_protocol: nego::SecurityProtocol,
    },
    EnhancedSecurityUpgrade {
        selected_protocol: nego::SecurityProtocol,
    },
    Credssp {
        selected_protocol: nego::SecurityProtocol,
    },
    BasicSettingsExchangeSendInitial {
        selected_protocol: nego::SecurityProtocol,
    },
    BasicSettingsExchangeWaitResponse,
    ChannelConnection {
        io_channel_id: u16,
        static_channels: Vec<(String, u16)>,
        channel_connection: ChannelConnectionSequence,
    },
    SecureSettingsExchange {
        io_channel_id: u16,
        user_channel_id: u16,
        static_channels: Vec<(String, u16)>,
    },
    LicensingExchange {
        io_channel_id: u16,
        user_channel_id: u16,
        static_channels: Vec<(String, u16)>,
        license_exchange: LicenseExchangeSequence,
    },
    CapabilitiesExchange {
        io_channel_id: u16,
        user_channel_id: u16,
        static_channels: Vec<(String, u16)>,
    },
    ConnectionFinalization {
        io_channel_id: u16,
        user_channel_id: u16,
        share_id: u32,
        static_channels: Vec<(String, u16)>,
        finalization: ConnectionFinalizationSequence,
    },
    Connected {
        result: ConnectionResult,
    },
}

impl State for ClientConnectorState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::ConnectionInitiationSendRequest => "ConnectionInitiationSendRequest",
            Self::ConnectionInitiationWaitConfirm { .. } => "ConnectionInitiationWaitConfirm",
            Self::EnhancedSecurityUpgrade { .. } => "EnhancedSecurityUpgrade",
            Self::Credssp { .. } => "Credssp",
            Self::BasicSettingsExchangeSendInitial { .. } => "BasicSettingsExchangeSendInitial",
            Self::BasicSettingsExchangeWaitResponse => "BasicSettingsExchangeWaitResponse",
            Self::ChannelConnection { .. } => "ChannelConnection",
            Self::SecureSettingsExchange { .. } => "SecureSettingsExchange",
            Self::LicensingExchange { .. } => "LicensingExchange",
            Self::CapabilitiesExchange { .. } => "CapabilitiesExchange",
            Self::ConnectionFinalization { .. } => "ConnectionFinalization",
            Self::Connected { .. } => "Connected",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

#[derive(Debug)]
pub struct ClientConnector {
    pub config: Config,
    pub state: ClientConnectorState,
}

impl ClientConnector {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: ClientConnectorState::ConnectionInitiationSendRequest,
        }
    }

    /// The sequence pauses here so the caller can run the TLS handshake.
    pub fn should_perform_security_upgrade(&self) -> bool {
        matches!(self.state, ClientConnectorState::EnhancedSecurityUpgrade { .. })
    }

    pub fn mark_security_upgrade_as_done(&mut self) -> ConnectorResult<()> {
        debug_assert!(self.should_perform_security_upgrade());
        self.step(&[], &mut WriteBuf::new())?;
        debug_assert!(!self.should_perform_security_upgrade());
        Ok(())
    }

    /// The sequence pauses here so the caller can run CredSSP over the
    /// upgraded stream (see [`crate::NlaSequence`]).
    pub fn should_perform_nla(&self) -> bool {
        matches!(self.state, ClientConnectorState::Credssp { .. })
    }

    pub fn mark_nla_as_done(&mut self) -> ConnectorResult<()> {
        debug_assert!(self.should_perform_nla());
        let written = self.step(&[], &mut WriteBuf::new())?;
        debug_assert!(!self.should_perform_nla());
        debug_assert!(written.is_nothing());
        Ok(())
    }
}

impl Sequence for ClientConnector {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match &self.state {
            ClientConnectorState::Consumed => None,
            ClientConnectorState::ConnectionInitiationSendRequest => None,
            ClientConnectorState::ConnectionInitiationWaitConfirm { .. } => Some(&opalrdp_pdu::X224_HINT),
            ClientConnectorState::EnhancedSecurityUpgrade { .. } => None,
            ClientConnectorState::Credssp { .. } => None,
            ClientConnectorState::BasicSettingsExchangeSendInitial { .. } => None,
            ClientConnectorState::BasicSettingsExchangeWaitResponse => Some(&opalrdp_pdu::X224_HINT),
            ClientConnectorState::ChannelConnection { channel_connection, .. } => channel_connection.next_pdu_hint(),
            ClientConnectorState::SecureSettingsExchange { .. } => None,
            ClientConnectorState::LicensingExchange { license_exchange, .. } => license_exchange.next_pdu_hint(),
            ClientConnectorState::CapabilitiesExchange { .. } => Some(&opalrdp_pdu::X224_HINT),
            ClientConnectorState::ConnectionFinalization { finalization, .. } => finalization.next_pdu_hint(),
            ClientConnectorState::Connected { .. } => None,
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written> {
        let (written, next_state) = match mem::take(&mut self.state) {
            ClientConnectorState::Consumed => {
                return Err(general_err!("connector sequence state is consumed (this is a bug)"))
            }

            //== Connection Initiation ==//
            // Advertise supported security protocols, get the server's pick.
            ClientConnectorState::ConnectionInitiationSendRequest => {
                debug!("Connection Initiation");

                let mut security_protocol = nego::SecurityProtocol::empty();

                if self.config.enable_tls {
                    security_protocol.insert(nego::SecurityProtocol::SSL);
                }

                if self.config.enable_nla {
                    security_protocol.insert(nego::SecurityProtocol::HYBRID | nego::SecurityProtocol::HYBRID_EX);
                }

                if security_protocol.is_standard_rdp_security() {
                    return Err(reason_err!("Initiation", "standard RDP security is not supported"));
                }

                let connection_request = nego::ConnectionRequest {
                    cookie: (!self.config.credentials.username.is_empty())
                        .then(|| nego::Cookie(self.config.credentials.username.clone())),
                    flags: nego::RequestFlags::empty(),
                    protocol: security_protocol,
                };

                debug!(message = ?connection_request, "Send");

                let written = encode_buf(&connection_request, output).map_err(ConnectorError::encode)?;

                (
                    Written::from_size(written)?,
                    ClientConnectorState::ConnectionInitiationWaitConfirm {
                        requested_protocol: security_protocol,
                    },
                )
            }

            ClientConnectorState::ConnectionInitiationWaitConfirm { requested_protocol } => {
                let connection_confirm =
                    decode::<nego::ConnectionConfirm>(input).map_err(ConnectorError::decode)?;

                debug!(message = ?connection_confirm, "Received");

                let (flags, selected_protocol) = match connection_confirm {
                    nego::ConnectionConfirm::Response { flags, protocol } => (flags, protocol),
                    nego::ConnectionConfirm::Failure { code } => {
                        error!(?code, "Received connection failure code");
                        return Err(ConnectorError::new(
                            "negotiation failure",
                            ConnectorErrorKind::Negotiation(code),
                        ));
                    }
                };

                info!(?selected_protocol, ?flags, "Server confirmed connection");

                if !selected_protocol.intersects(requested_protocol) {
                    return Err(reason_err!(
                        "Initiation",
                        "client advertised {requested_protocol}, but the server selected {selected_protocol}",
                    ));
                }

                (
                    Written::Nothing,
                    ClientConnectorState::EnhancedSecurityUpgrade { selected_protocol },
                )
            }

            //== Security Upgrade ==//
            // The caller runs the TLS handshake while the sequence sits here.
            ClientConnectorState::EnhancedSecurityUpgrade { selected_protocol } => {
                let next_state = if selected_protocol
                    .intersects(nego::SecurityProtocol::HYBRID | nego::SecurityProtocol::HYBRID_EX)
                {
                    debug!("Begin NLA using CredSSP");
                    ClientConnectorState::Credssp { selected_protocol }
                } else {
                    debug!("NLA not selected, skipping CredSSP");
                    ClientConnectorState::BasicSettingsExchangeSendInitial { selected_protocol }
                };

                (Written::Nothing, next_state)
            }

            //== CredSSP ==//
            // Performed externally over the upgraded stream.
            ClientConnectorState::Credssp { selected_protocol } => (
                Written::Nothing,
                ClientConnectorState::BasicSettingsExchangeSendInitial { selected_protocol },
            ),

            //== Basic Settings Exchange ==//
            ClientConnectorState::BasicSettingsExchangeSendInitial { selected_protocol } => {
                debug!("Basic Settings Exchange");

                let client_gcc_blocks = create_gcc_blocks(&self.config, selected_protocol);

                let connect_initial = mcs::ConnectInitial::with_conference_create_request(
                    gcc::ConferenceCreateRequest {
                        gcc_blocks: client_gcc_blocks,
                    },
                );

                debug!(message = ?connect_initial, "Send");

                let written = encode_x224_packet(&connect_initial, output)?;

                (
                    Written::from_size(written)?,
                    ClientConnectorState::BasicSettingsExchangeWaitResponse,
                )
            }

            ClientConnectorState::BasicSettingsExchangeWaitResponse => {
                let x224_payload = decode::<X224Data<'_>>(input).map_err(ConnectorError::decode)?;
                let connect_response =
                    decode::<mcs::ConnectResponse>(x224_payload.data.as_ref()).map_err(ConnectorError::decode)?;

                debug!(message = ?connect_response, "Received");

                if connect_response.result != 0 {
                    error!(
                        result = connect_response.result,
                        description = mcs::result_description(connect_response.result),
                        "MCS Connect-Response failed"
                    );
                    return Err(ConnectorError::new(
                        "BasicSettingsExchange",
                        ConnectorErrorKind::ConnectResponseFailed(connect_response.result),
                    ));
                }

                let io_channel_id = connect_response.global_channel_id();
                let channel_ids = connect_response.channel_ids();

                debug!(?channel_ids, io_channel_id);

                let server_blocks = &connect_response.conference_create_response.gcc_blocks;
                if server_blocks.skip_channel_join_supported() {
                    // the join dance always runs; see the design notes
                    debug!("Server supports skipping channel join (ignored)");
                }

                let static_channels: Vec<(String, u16)> = self
                    .config
                    .channel_names
                    .iter()
                    .cloned()
                    .zip(channel_ids.iter().copied())
                    .collect();

                (
                    Written::Nothing,
                    ClientConnectorState::ChannelConnection {
                        io_channel_id,
                        channel_connection: ChannelConnectionSequence::new(io_channel_id, channel_ids),
                        static_channels,
                    },
                )
            }

            //== Channel Connection ==//
            ClientConnectorState::ChannelConnection {
                io_channel_id,
                static_channels,
                mut channel_connection,
            } => {
                debug!("Channel Connection");
                let written = channel_connection.step(input, output)?;

                let next_state =
                    if let ChannelConnectionState::AllJoined { user_channel_id } = channel_connection.state {
                        ClientConnectorState::SecureSettingsExchange {
                            io_channel_id,
                            user_channel_id,
                            static_channels,
                        }
                    } else {
                        ClientConnectorState::ChannelConnection {
                            io_channel_id,
                            static_channels,
                            channel_connection,
                        }
                    };

                (written, next_state)
            }

            //== Secure Settings Exchange ==//
            // Client info goes out on the global channel. Enhanced security
            // is always active here, so no RDP security header is written.
            ClientConnectorState::SecureSettingsExchange {
                io_channel_id,
                user_channel_id,
                static_channels,
            } => {
                debug!("Secure Settings Exchange");

                let client_info = create_client_info(&self.config);

                debug!(message = ?client_info, "Send");

                let written = encode_send_data_request(user_channel_id, io_channel_id, &client_info, output)?;

                (
                    Written::from_size(written)?,
                    ClientConnectorState::LicensingExchange {
                        io_channel_id,
                        user_channel_id,
                        static_channels,
                        license_exchange: LicenseExchangeSequence::new(io_channel_id),
                    },
                )
            }

            //== Licensing ==//
            ClientConnectorState::LicensingExchange {
                io_channel_id,
                user_channel_id,
                static_channels,
                mut license_exchange,
            } => {
                debug!("Licensing Exchange");

                let written = license_exchange.step(input, output)?;

                let next_state = if license_exchange.state.is_terminal() {
                    ClientConnectorState::CapabilitiesExchange {
                        io_channel_id,
                        user_channel_id,
                        static_channels,
                    }
                } else {
                    ClientConnectorState::LicensingExchange {
                        io_channel_id,
                        user_channel_id,
                        static_channels,
                        license_exchange,
                    }
                };

                (written, next_state)
            }

            //== Capabilities Exchange ==//
            // The server demands, the client confirms with the opaque
            // capability blob from the configuration.
            ClientConnectorState::CapabilitiesExchange {
                io_channel_id,
                user_channel_id,
                static_channels,
            } => {
                debug!("Capabilities Exchange");

                let message = decode::<mcs::McsMessage<'_>>(input).map_err(ConnectorError::decode)?;

                let indication = match message {
                    mcs::McsMessage::SendDataIndication(indication) => indication,
                    mcs::McsMessage::DisconnectProviderUltimatum(ultimatum) => {
                        return Err(ConnectorError::new(
                            "capabilities",
                            ConnectorErrorKind::DisconnectUltimatum(ultimatum.reason),
                        ));
                    }
                    _ => return Err(general_err!("unexpected MCS message during capabilities exchange")),
                };

                let header =
                    decode::<ShareControlHeader>(indication.user_data.as_ref()).map_err(ConnectorError::decode)?;

                let ShareControlPdu::ServerDemandActive(demand_active) = header.share_control_pdu else {
                    return Err(general_err!("expected a Server Demand Active PDU"));
                };

                debug!(
                    share_id = header.share_id,
                    capability_bytes = demand_active.capability_data.len(),
                    "Received Demand Active"
                );

                let confirm = ShareControlHeader {
                    share_control_pdu: ShareControlPdu::ClientConfirmActive(rdp::ClientConfirmActive {
                        capability_data: self.config.client_capabilities.clone(),
                    }),
                    pdu_source: user_channel_id,
                    share_id: header.share_id,
                };

                debug!(message = ?confirm, "Send");

                let written = encode_send_data_request(user_channel_id, io_channel_id, &confirm, output)?;

                (
                    Written::from_size(written)?,
                    ClientConnectorState::ConnectionFinalization {
                        io_channel_id,
                        user_channel_id,
                        share_id: header.share_id,
                        static_channels,
                        finalization: ConnectionFinalizationSequence::new(
                            io_channel_id,
                            user_channel_id,
                            header.share_id,
                        ),
                    },
                )
            }

            //== Connection Finalization ==//
            ClientConnectorState::ConnectionFinalization {
                io_channel_id,
                user_channel_id,
                share_id,
                static_channels,
                mut finalization,
            } => {
                let written = finalization.step(input, output)?;

                let next_state = if finalization.state.is_terminal() {
                    info!("Connected");

                    ClientConnectorState::Connected {
                        result: ConnectionResult {
                            io_channel_id,
                            user_channel_id,
                            share_id,
                            desktop_size: self.config.desktop_size,
                            static_channels,
                        },
                    }
                } else {
                    ClientConnectorState::ConnectionFinalization {
                        io_channel_id,
                        user_channel_id,
                        share_id,
                        static_channels,
                        finalization,
                    }
                };

                (written, next_state)
            }

            //== Connected ==//
            ClientConnectorState::Connected { .. } => return Err(general_err!("already connected")),
        };

        self.state = next_state;

        Ok(written)
    }
}

/// Wraps a PDU into an MCS send-data-request inside X.224 framing.
pub fn encode_send_data_request<T: Encode>(
    initiator_id: u16,
    channel_id: u16,
    user_msg: &T,
    buf: &mut WriteBuf,
) -> ConnectorResult<usize> {
    let user_data = encode_vec(user_msg).map_err(ConnectorError::encode)?;

    let pdu = mcs::SendDataRequest {
        initiator_id,
        channel_id,
        user_data: Cow::Owned(user_data),
    };

    encode_buf(&pdu, buf).map_err(ConnectorError::encode)
}

fn create_gcc_blocks(config: &Config, selected_protocol: nego::SecurityProtocol) -> gcc::ClientGccBlocks {
    gcc::ClientGccBlocks {
        core: gcc::ClientCoreData {
            desktop_width: config.desktop_size.width,
            desktop_height: config.desktop_size.height,
            keyboard_layout: config.keyboard_layout,
            client_build: config.client_build,
            client_name: config.client_name.clone(),
            keyboard_type: 4, // IBM enhanced, 101/102 keys
            keyboard_subtype: 0,
            keyboard_functional_keys_count: 12,
            ime_file_name: String::new(),
            high_color_depth: 24,
            supported_color_depths: 0x01 | 0x02 | 0x04 | 0x08,
            early_capability_flags: gcc::ClientEarlyCapabilityFlags::SUPPORT_ERR_INFO_PDU
                | gcc::ClientEarlyCapabilityFlags::VALID_CONNECTION_TYPE,
            dig_product_id: String::new(),
            server_selected_protocol: selected_protocol.bits(),
        },
        security: gcc::ClientSecurityData::no_security(),
        network: if config.channel_names.is_empty() {
            None
        } else {
            Some(gcc::ClientNetworkData {
                channels: config
                    .channel_names
                    .iter()
                    .map(|name| gcc::ChannelDef {
                        name: name.clone(),
                        options: gcc::ChannelOptions::INITIALIZED | gcc::ChannelOptions::SHOW_PROTOCOL,
                    })
                    .collect(),
            })
        },
        cluster: None,
    }
}

fn create_client_info(config: &Config) -> ClientInfo {
    let mut flags = ClientInfoFlags::MOUSE
        | ClientInfoFlags::MOUSE_HAS_WHEEL
        | ClientInfoFlags::UNICODE
        | ClientInfoFlags::DISABLE_CTRL_ALT_DEL
        | ClientInfoFlags::LOGON_NOTIFY
        | ClientInfoFlags::LOGON_ERRORS
        | ClientInfoFlags::ENABLE_WINDOWS_KEY
        | ClientInfoFlags::MAXIMIZE_SHELL;

    if !config.credentials.password.is_empty() {
        flags |= ClientInfoFlags::AUTOLOGON;
    }

    ClientInfo {
        credentials: opalrdp_pdu::rdp::client_info::Credentials {
            domain: config.credentials.domain.clone().unwrap_or_default(),
            username: config.credentials.username.clone(),
            password: config.credentials.password.clone(),
        },
        code_page: 0,
        flags,
        alternate_shell: String::new(),
        work_dir: String::new(),
        extra_info: ExtendedClientInfo {
            address_family: if config.client_address.contains(':') {
                AddressFamily::INET6
            } else {
                AddressFamily::INET
            },
            address: config.client_address.clone(),
            working_dir: config.client_dir.clone(),
        },
    }
}
