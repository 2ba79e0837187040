//! Card session state machine and framing behavior against the mock

mod common;

use std::panic::{catch_unwind, AssertUnwindSafe};

use common::{MockTransport, MOCK_ATR};
use scard::transport::ProtocolHeader;
use scard::{
    Attribute, Context, Disposition, Error, Protocol, Protocols, Scope, ShareMode,
    MAX_BUFFER_SIZE_EXTENDED,
};

fn connected(
    transport: &'static MockTransport,
    negotiated: Protocol,
) -> (Context, scard::Card) {
    transport.set_connect_outcome(Ok(negotiated));
    let ctx = Context::with_transport(transport, Scope::System).expect("establish");
    let card = ctx
        .connect("Mock Reader 00", ShareMode::Exclusive, Protocols::ANY)
        .expect("connect");
    (ctx, card)
}

#[test]
fn connect_records_the_negotiated_protocol() {
    let transport = MockTransport::leaked();
    let (_ctx, card) = connected(transport, Protocol::T0);
    assert_eq!(card.active_protocol(), Protocol::T0);
    assert_eq!(card.share_mode(), ShareMode::Exclusive);
}

#[test]
fn status_after_connect_matches_connect_arguments() {
    let transport = MockTransport::leaked();
    let (_ctx, card) = connected(transport, Protocol::T1);

    let status = card.status().expect("status");
    assert_eq!(status.reader, "Mock Reader 00");
    assert_eq!(status.protocol, card.active_protocol());
    assert_eq!(status.atr, MOCK_ATR);
}

#[test]
fn connect_failures_surface_their_kind() {
    let transport = MockTransport::leaked();
    transport.set_connect_outcome(Err(Error::NoSmartcard));
    let ctx = Context::with_transport(transport, Scope::System).expect("establish");
    let err = ctx
        .connect("Mock Reader 00", ShareMode::Shared, Protocols::ANY)
        .expect_err("no card");
    assert_eq!(err, Error::NoSmartcard);
}

#[test]
fn transmit_uses_the_t0_header_on_a_t0_session() {
    let transport = MockTransport::leaked();
    let (_ctx, card) = connected(transport, Protocol::T0);
    card.transmit(&[0x00, 0xA4, 0x04, 0x00, 0x00]).expect("transmit");
    assert_eq!(transport.transmit_calls()[0].header, ProtocolHeader::T0);
}

#[test]
fn transmit_uses_the_t1_header_on_a_t1_session() {
    let transport = MockTransport::leaked();
    let (_ctx, card) = connected(transport, Protocol::T1);
    card.transmit(&[0x00, 0xA4, 0x04, 0x00, 0x00]).expect("transmit");
    assert_eq!(transport.transmit_calls()[0].header, ProtocolHeader::T1);
}

#[test]
fn transmit_on_undefined_protocol_panics_before_the_boundary() {
    let transport = MockTransport::leaked();
    // Direct connections negotiate no protocol.
    transport.set_connect_outcome(Ok(Protocol::Undefined));
    let ctx = Context::with_transport(transport, Scope::System).expect("establish");
    let card = ctx
        .connect("Mock Reader 00", ShareMode::Direct, Protocols::UNDEFINED)
        .expect("connect");

    let result = catch_unwind(AssertUnwindSafe(|| card.transmit(&[0x00, 0xA4])));
    assert!(result.is_err(), "expected a panic");
    assert_eq!(transport.call_count("transmit"), 0);
}

#[test]
fn transmit_sizes_the_receive_buffer_to_extended_capacity() {
    let transport = MockTransport::leaked();
    let (_ctx, card) = connected(transport, Protocol::T1);
    transport.push_transmit(Ok(vec![0x6A, 0x82]));

    let response = card.transmit(&[0x00, 0xA4, 0x04, 0x00, 0x00]).expect("transmit");

    // Full extended capacity offered, only the reported bytes returned.
    assert_eq!(
        transport.transmit_calls()[0].recv_capacity,
        MAX_BUFFER_SIZE_EXTENDED
    );
    assert_eq!(response.as_ref(), &[0x6A, 0x82]);
}

#[test]
fn empty_command_is_rejected_before_the_boundary() {
    let transport = MockTransport::leaked();
    let (_ctx, card) = connected(transport, Protocol::T1);
    assert_eq!(card.transmit(&[]), Err(Error::InvalidParameter));
    assert_eq!(transport.call_count("transmit"), 0);
}

#[test]
fn transaction_guard_always_ends_the_bracket() {
    let transport = MockTransport::leaked();
    let (_ctx, mut card) = connected(transport, Protocol::T1);

    // End immediately after begin, no intervening operation.
    let tx = card.transaction().expect("begin");
    drop(tx);
    assert_eq!(transport.begin_count(), 1);
    assert_eq!(transport.end_dispositions(), vec![Disposition::Leave]);

    // End still runs after a failed operation inside the bracket.
    transport.push_transmit(Err(Error::RemovedCard));
    let tx = card.transaction().expect("begin");
    let err = tx.card().transmit(&[0x00, 0xB0, 0x00, 0x00]).expect_err("removed");
    assert_eq!(err, Error::RemovedCard);
    drop(tx);
    assert_eq!(transport.begin_count(), 2);
    assert_eq!(
        transport.end_dispositions(),
        vec![Disposition::Leave, Disposition::Leave]
    );
}

#[test]
fn explicit_end_uses_the_given_disposition_once() {
    let transport = MockTransport::leaked();
    let (_ctx, mut card) = connected(transport, Protocol::T1);

    let tx = card.transaction().expect("begin");
    tx.end(Disposition::Reset).expect("end");

    assert_eq!(transport.end_dispositions(), vec![Disposition::Reset]);
}

#[test]
fn reconnect_updates_protocol_only_on_success() {
    let transport = MockTransport::leaked();
    let (_ctx, mut card) = connected(transport, Protocol::T1);

    transport.push_reconnect(Ok(Protocol::T0));
    card.reconnect(ShareMode::Shared, Protocols::T0, Disposition::Reset)
        .expect("reconnect");
    assert_eq!(card.active_protocol(), Protocol::T0);
    assert_eq!(card.share_mode(), ShareMode::Shared);

    transport.push_reconnect(Err(Error::SharingViolation));
    let err = card
        .reconnect(ShareMode::Exclusive, Protocols::T1, Disposition::Leave)
        .expect_err("violation");
    assert_eq!(err, Error::SharingViolation);

    // The previously negotiated protocol and mode are left unchanged.
    assert_eq!(card.active_protocol(), Protocol::T0);
    assert_eq!(card.share_mode(), ShareMode::Shared);
}

#[test]
fn disconnect_passes_the_mandatory_disposition() {
    let transport = MockTransport::leaked();
    let (_ctx, card) = connected(transport, Protocol::T1);
    card.disconnect(Disposition::Eject).expect("disconnect");
    assert_eq!(transport.disconnect_dispositions(), vec![Disposition::Eject]);
}

#[test]
fn dropped_card_disconnects_with_leave() {
    let transport = MockTransport::leaked();
    let (_ctx, card) = connected(transport, Protocol::T1);
    drop(card);
    assert_eq!(transport.disconnect_dispositions(), vec![Disposition::Leave]);
}

#[test]
fn get_attrib_is_two_phase() {
    let transport = MockTransport::leaked();
    let (_ctx, card) = connected(transport, Protocol::T1);
    transport.set_attrib_value(b"Mock Vendor");

    let value = card.get_attrib(Attribute::VendorName).expect("attrib");
    assert_eq!(value, b"Mock Vendor");
    assert_eq!(transport.call_count("get_attrib"), 2);
}

#[test]
fn set_attrib_passes_id_and_data() {
    let transport = MockTransport::leaked();
    let (_ctx, card) = connected(transport, Protocol::T1);
    card.set_attrib(Attribute::SuppressT1IfsRequest, &[0x01])
        .expect("set");
    assert_eq!(
        transport.set_attrib_calls(),
        vec![(Attribute::SuppressT1IfsRequest.raw(), vec![0x01])]
    );
}

#[test]
fn control_allows_empty_input() {
    let transport = MockTransport::leaked();
    let (_ctx, card) = connected(transport, Protocol::T1);
    transport.set_control_response(&[0x01, 0x02]);

    let response = card.control(scard::ctl_code(1), &[]).expect("control");
    assert_eq!(response.as_ref(), &[0x01, 0x02]);
    assert_eq!(transport.control_calls(), vec![(scard::ctl_code(1), vec![])]);
}
