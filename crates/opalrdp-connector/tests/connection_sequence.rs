//! Drives the whole connection sequence against a scripted server.

use std::borrow::Cow;

use opalrdp_connector::{
    ClientConnector, ClientConnectorState, Config, ConnectorErrorKind, Credentials, DesktopSize, Sequence as _,
};
use opalrdp_core::{encode_vec, WriteBuf};
use opalrdp_pdu::rdp::{
    ControlAction, ControlPdu, FontPdu, ServerDemandActive, ShareControlHeader, ShareControlPdu, ShareDataHeader,
    ShareDataPdu, StreamPriority, SynchronizePdu,
};
use opalrdp_pdu::{gcc, mcs, nego};

const IO_CHANNEL_ID: u16 = 1003;
const USER_CHANNEL_ID: u16 = 1007;
const SHARE_ID: u32 = 0x0001_000F;

fn config() -> Config {
    Config {
        desktop_size: DesktopSize { width: 1280, height: 720 },
        enable_tls: true,
        enable_nla: true,
        credentials: Credentials {
            username: "alex".to_owned(),
            password: "hunter2".to_owned(),
            domain: None,
        },
        client_name: "opal-test".to_owned(),
        client_build: 2600,
        keyboard_layout: 0x409,
        client_address: "192.0.2.17".to_owned(),
        client_dir: "C:\\".to_owned(),
        channel_names: vec!["rdpdr".to_owned()],
        client_capabilities: vec![0x01, 0x00, 0x00, 0x00],
    }
}

fn server_gcc_blocks() -> gcc::ServerGccBlocks {
    gcc::ServerGccBlocks {
        core: gcc::ServerCoreData {
            version: 0x0008_0004,
            client_requested_protocols: Some(nego::SecurityProtocol::HYBRID.bits()),
            early_capability_flags: None,
        },
        security: gcc::ServerSecurityData::no_security(),
        network: gcc::ServerNetworkData {
            io_channel: IO_CHANNEL_ID,
            channel_ids: vec![1004],
        },
    }
}

fn connect_response(result: u8) -> Vec<u8> {
    let response = mcs::ConnectResponse {
        result,
        called_connect_id: 1,
        domain_parameters: mcs::DomainParameters::target(),
        conference_create_response: gcc::ConferenceCreateResponse {
            node_id: 1001,
            gcc_blocks: server_gcc_blocks(),
        },
    };

    // the connect response travels inside a plain X.224 data TPDU
    let payload = encode_vec(&response).unwrap();
    let data = opalrdp_pdu::x224::X224Data {
        data: Cow::Owned(payload),
    };
    encode_vec(&data).unwrap()
}

fn send_data_indication(user_data: Vec<u8>) -> Vec<u8> {
    encode_vec(&mcs::SendDataIndication {
        initiator_id: 1002,
        channel_id: IO_CHANNEL_ID,
        user_data: Cow::Owned(user_data),
    })
    .unwrap()
}

fn license_valid_client() -> Vec<u8> {
    send_data_indication(vec![
        0xFF, 0x03, 0x10, 0x00, //
        0x07, 0x00, 0x00, 0x00, //
        0x02, 0x00, 0x00, 0x00, //
        0x04, 0x00, 0x00, 0x00, //
    ])
}

fn demand_active() -> Vec<u8> {
    let header = ShareControlHeader {
        share_control_pdu: ShareControlPdu::ServerDemandActive(ServerDemandActive {
            source_descriptor: b"RDP\0".to_vec(),
            capability_data: vec![0x02, 0x00, 0x00, 0x00, 0xAA, 0xBB],
        }),
        pdu_source: 1002,
        share_id: SHARE_ID,
    };
    send_data_indication(encode_vec(&header).unwrap())
}

fn share_data(pdu: ShareDataPdu) -> Vec<u8> {
    let header = ShareControlHeader {
        share_control_pdu: ShareControlPdu::Data(ShareDataHeader {
            share_data_pdu: pdu,
            stream_priority: StreamPriority::Medium,
        }),
        pdu_source: 1002,
        share_id: SHARE_ID,
    };
    send_data_indication(encode_vec(&header).unwrap())
}

/// Runs `step` and asserts the connector produced output.
fn step_send(connector: &mut ClientConnector, input: &[u8]) -> Vec<u8> {
    let mut output = WriteBuf::new();
    let written = connector.step(input, &mut output).unwrap();
    output[..written.size().expect("expected bytes to send")].to_vec()
}

/// Runs `step` and asserts the connector produced nothing.
fn step_silent(connector: &mut ClientConnector, input: &[u8]) {
    let mut output = WriteBuf::new();
    let written = connector.step(input, &mut output).unwrap();
    assert!(written.is_nothing());
}

#[test]
fn full_connection_sequence_reaches_the_active_state() {
    let mut connector = ClientConnector::new(config());

    // X.224 connection request goes out
    let request = step_send(&mut connector, &[]);
    assert_eq!(request[..2], [0x03, 0x00]); // TPKT framed

    // server selects NLA
    let confirm = encode_vec(&nego::ConnectionConfirm::Response {
        flags: nego::ResponseFlags::empty(),
        protocol: nego::SecurityProtocol::HYBRID,
    })
    .unwrap();
    step_silent(&mut connector, &confirm);

    assert!(connector.should_perform_security_upgrade());
    connector.mark_security_upgrade_as_done().unwrap();

    assert!(connector.should_perform_nla());
    connector.mark_nla_as_done().unwrap();

    // MCS connect initial
    let connect_initial = step_send(&mut connector, &[]);
    assert!(!connect_initial.is_empty());

    step_silent(&mut connector, &connect_response(0));

    // erect domain, attach user
    step_send(&mut connector, &[]);
    step_send(&mut connector, &[]);

    let attach_confirm = encode_vec(&mcs::AttachUserConfirm {
        result: 0,
        initiator_id: USER_CHANNEL_ID,
    })
    .unwrap();
    step_silent(&mut connector, &attach_confirm);

    // sequential joins: global, user, rdpdr
    for channel_id in [IO_CHANNEL_ID, USER_CHANNEL_ID, 1004] {
        let request_bytes = step_send(&mut connector, &[]);
        let request: mcs::ChannelJoinRequest = opalrdp_core::decode(&request_bytes).unwrap();
        assert_eq!(request.channel_id, channel_id);

        let confirm = encode_vec(&mcs::ChannelJoinConfirm {
            result: 0,
            initiator_id: USER_CHANNEL_ID,
            requested_channel_id: channel_id,
            channel_id,
        })
        .unwrap();
        step_silent(&mut connector, &confirm);
    }

    // client info
    let client_info = step_send(&mut connector, &[]);
    assert!(!client_info.is_empty());

    // licensing: server says valid client
    step_silent(&mut connector, &license_valid_client());

    // capabilities: demand -> confirm
    let confirm_active = step_send(&mut connector, &demand_active());
    assert!(!confirm_active.is_empty());

    // finalization: four client PDUs...
    for _ in 0..4 {
        step_send(&mut connector, &[]);
    }

    // ...then the server's responses, ending with the font map
    step_silent(
        &mut connector,
        &share_data(ShareDataPdu::Synchronize(SynchronizePdu {
            target_user_id: USER_CHANNEL_ID,
        })),
    );
    step_silent(
        &mut connector,
        &share_data(ShareDataPdu::Control(ControlPdu {
            action: ControlAction::Cooperate,
            grant_id: 0,
            control_id: 0,
        })),
    );
    step_silent(&mut connector, &share_data(ShareDataPdu::FontMap(FontPdu::default())));

    let ClientConnectorState::Connected { result } = &connector.state else {
        panic!("connector did not reach the connected state: {:?}", connector.state);
    };

    assert_eq!(result.io_channel_id, IO_CHANNEL_ID);
    assert_eq!(result.user_channel_id, USER_CHANNEL_ID);
    assert_eq!(result.share_id, SHARE_ID);
    assert_eq!(result.static_channels, vec![("rdpdr".to_owned(), 1004)]);
}

#[test]
fn nla_failure_code_names_network_level_authentication() {
    let mut connector = ClientConnector::new(config());

    step_send(&mut connector, &[]);

    // literal X.224 Connection Confirm carrying HYBRID_REQUIRED_BY_SERVER
    let confirm = [
        0x03, 0x00, 0x00, 0x13, // TPKT
        0x0E, 0xD0, 0x00, 0x00, 0x12, 0x34, 0x00, // TPDU
        0x03, 0x00, 0x08, 0x00, 0x05, 0x00, 0x00, 0x00, // failure, code 5
    ];

    let mut output = WriteBuf::new();
    let err = connector.step(&confirm, &mut output).unwrap_err();

    assert!(matches!(err.kind(), ConnectorErrorKind::Negotiation(_)));
    assert!(err.to_string().contains("Network Level Authentication"));
}

#[test]
fn unspecified_mcs_failure_is_surfaced_with_its_result() {
    let mut connector = ClientConnector::new(config());

    step_send(&mut connector, &[]);

    let confirm = encode_vec(&nego::ConnectionConfirm::Response {
        flags: nego::ResponseFlags::empty(),
        protocol: nego::SecurityProtocol::HYBRID,
    })
    .unwrap();
    step_silent(&mut connector, &confirm);

    connector.mark_security_upgrade_as_done().unwrap();
    connector.mark_nla_as_done().unwrap();
    step_send(&mut connector, &[]);

    // rt-unspecified-failure
    let mut output = WriteBuf::new();
    let err = connector.step(&connect_response(14), &mut output).unwrap_err();

    assert!(matches!(err.kind(), ConnectorErrorKind::ConnectResponseFailed(14)));
    assert!(err.to_string().contains("rt-unspecified-failure"));
}
