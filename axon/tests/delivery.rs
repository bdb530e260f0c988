use critical_section as _;
use axon::buffer::{MsgBuffer, MsgId};
use axon::core::{EndpointId, Header};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

type Buffer = MsgBuffer<CriticalSectionRawMutex, 128, 4>;

fn endpoint(id: u16) -> EndpointId {
    EndpointId::new(id).unwrap()
}

fn loop_back(buffer: &Buffer, cmd: u8, payload: &[u8]) -> MsgId {
    let header = Header {
        protocol: 0,
        target: 0x00a,
        target_mode: 0,
        source: 0x00b,
        cmd,
        size: payload.len() as u16,
    };
    buffer.push_loop_back(&header, payload);
    buffer.pop_msg_task().expect("a parked frame")
}

#[test]
fn test_alloc_then_pull_law() {
    let buffer = Buffer::new();
    let msg = loop_back(&buffer, 0x10, &[1, 2, 3]);

    buffer.alloc_delivery(endpoint(1), msg);
    let pulled = buffer.pop_delivery(endpoint(1)).expect("a delivery");
    buffer.with_msg(pulled, |_, payload| assert_eq!(payload, &[1, 2, 3]));
    buffer.release();

    assert_eq!(buffer.pop_delivery(endpoint(1)), None);
}

#[test]
fn test_fan_out_shares_one_frame() {
    let buffer = Buffer::new();
    let msg = loop_back(&buffer, 0x10, &[4, 5]);

    for id in 1..=3 {
        buffer.alloc_delivery(endpoint(id), msg);
    }
    assert_eq!(buffer.delivery_count(), 3);

    for id in 1..=3 {
        let pulled = buffer.pop_delivery(endpoint(id)).expect("a delivery");
        assert_eq!(pulled, msg);
        buffer.release();
    }
    assert_eq!(buffer.delivery_count(), 0);
}

#[test]
fn test_clear_fan_out_spares_other_frames() {
    let buffer = Buffer::new();
    let doomed = loop_back(&buffer, 0x10, &[1]);
    let kept = loop_back(&buffer, 0x11, &[2]);

    for id in 1..=3 {
        buffer.alloc_delivery(endpoint(id), doomed);
    }
    buffer.alloc_delivery(endpoint(4), kept);

    buffer.clear_deliveries(doomed);
    assert_eq!(buffer.delivery_count(), 1);
    for id in 1..=3 {
        assert_eq!(buffer.pop_delivery(endpoint(id)), None);
    }
    assert_eq!(buffer.pop_delivery(endpoint(4)), Some(kept));
}

#[test]
fn test_peeks_follow_the_stack() {
    let buffer = Buffer::new();
    let first = loop_back(&buffer, 0x21, &[1]);
    let second = loop_back(&buffer, 0x22, &[2, 3]);
    buffer.alloc_delivery(endpoint(1), first);
    buffer.alloc_delivery(endpoint(2), second);

    assert_eq!(buffer.delivery_cmd(0), Some(0x21));
    assert_eq!(buffer.delivery_cmd(1), Some(0x22));
    assert_eq!(buffer.delivery_size(0), Some(1));
    assert_eq!(buffer.delivery_size(1), Some(2));
    assert_eq!(buffer.delivery_source(0), Some(0x00b));
    assert_eq!(buffer.delivery_endpoint(0), Some(endpoint(1)));

    buffer.pop_delivery_at(0).expect("a delivery");
    assert_eq!(buffer.delivery_cmd(0), Some(0x22));
    assert_eq!(buffer.delivery_cmd(1), None);
}

#[test]
fn test_watermark_tracks_peak_occupancy() {
    let buffer = Buffer::new();
    let msg = loop_back(&buffer, 0x10, &[1]);

    buffer.alloc_delivery(endpoint(1), msg);
    buffer.alloc_delivery(endpoint(2), msg);
    assert_eq!(buffer.stats().delivery_stack_ratio, 50);

    buffer.pop_delivery(endpoint(1)).expect("a delivery");
    buffer.pop_delivery(endpoint(2)).expect("a delivery");
    assert_eq!(buffer.stats().delivery_stack_ratio, 50);

    buffer.alloc_delivery(endpoint(3), msg);
    assert_eq!(buffer.stats().delivery_stack_ratio, 50);
}
