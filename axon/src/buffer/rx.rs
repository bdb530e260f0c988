//! Reception surface, driven from interrupt context
//!
//! The wire driver feeds bytes one at a time; the framing collaborator
//! punctuates the stream with header and end-of-frame verdicts. All entry
//! points here are safe to call from the interrupt handler: every critical
//! section is bounded by a handful of loads and stores, never by a copy
//! that scales with the buffer.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::core::{CRC_SIZE, HEADER_SIZE, Header, MAX_DATA_SIZE};

use super::{Inner, MsgBuffer, MsgId};

impl<M: RawMutex, const BUF: usize, const TASKS: usize> MsgBuffer<M, BUF, TASKS> {
    /// Writes one received byte at the write cursor.
    ///
    /// No bounds check: header validation reserves the frame's space before
    /// payload bytes arrive, and the cursor advance after each frame keeps
    /// room for the next header.
    pub fn write_byte(&self, byte: u8) {
        self.lock(|inner| {
            inner.buffer[inner.write_idx] = byte;
            inner.write_idx += 1;
        });
    }

    /// Bounds the current frame after its header passed validation.
    ///
    /// `data_size` is the payload length the header declares. When the
    /// frame would run past the buffer end, the frame is restarted at
    /// offset 0 and the already-received header bytes are left parked at
    /// the tail for [`tick`](Self::tick) to move.
    pub fn accept_header(&self, data_size: u16) {
        self.lock(|inner| inner.accept_header(data_size));
    }

    /// Discards the received header in place; the frame slot is reused.
    pub fn reject_header(&self) {
        self.lock(|inner| inner.write_idx = inner.frame_start);
    }

    /// Abandons the frame being received.
    pub fn discard_msg(&self) {
        let (from, to) = self.lock(|inner| (inner.frame_start, inner.write_idx));
        let _ = self.clear_space(from, to);
        self.lock(|inner| {
            inner.write_idx = inner.frame_start;
            inner.expected_end = inner.frame_start + HEADER_SIZE + CRC_SIZE;
            if inner.frame_start == 0 {
                inner.pending_header_move = None;
            }
        });
    }

    /// Completes the frame being received (CRC bytes included) and hands it
    /// to the interpretation stack, evicting the oldest frame when the
    /// stack is full. The cursor then advances to a fresh landing zone.
    pub fn end_msg(&self) {
        let (from, to) = self.lock(|inner| (inner.frame_start, inner.write_idx));
        let _ = self.clear_space(from, to);

        if self.lock(|inner| inner.msg_tasks.is_full()) {
            trace!("interpretation stack full, evicting the oldest frame");
            self.remove_msg_task(0);
            self.lock(|inner| inner.stats.count_drop());
        }

        let (from, to) = self.lock(|inner| inner.finish_frame());
        let _ = self.clear_space(from, to);
    }

    /// Stages a locally-generated frame as if it had been received.
    ///
    /// The payload is clamped to the declared size, itself clamped to
    /// [`MAX_DATA_SIZE`]. Called from the main loop; reception may preempt
    /// at any point, which is why the write cursor is pushed past the
    /// staged frame before a single byte of it is copied.
    pub fn push_loop_back(&self, header: &Header, payload: &[u8]) {
        let data_size = (header.size as usize).min(MAX_DATA_SIZE);
        assert!(payload.len() >= data_size);
        let frame_size = HEADER_SIZE + data_size;

        let (start, from, to) = self.lock(|inner| {
            if inner.frame_start + frame_size >= BUF {
                inner.frame_start = 0;
            }
            let start = inner.frame_start;
            (start, start, start + frame_size)
        });
        let _ = self.clear_space(from, to);

        self.lock(|inner| {
            // fake the cursor forward so reception of the next frame can
            // begin while the copy below is still running
            inner.write_idx = start + frame_size + CRC_SIZE;
        });
        self.end_msg();

        self.lock(|inner| {
            inner.buffer[start..start + HEADER_SIZE].copy_from_slice(&header.to_bytes());
            inner.buffer[start + HEADER_SIZE..start + frame_size]
                .copy_from_slice(&payload[..data_size]);
        });
    }

    /// Pops the oldest frame awaiting protocol interpretation.
    pub fn pop_msg_task(&self) -> Option<MsgId> {
        let msg = self.lock(|inner| inner.msg_tasks.head().copied())?;
        assert!(msg < BUF);
        self.remove_msg_task(0);
        Some(MsgId(msg))
    }
}

impl<const BUF: usize, const TASKS: usize> Inner<BUF, TASKS> {
    fn accept_header(&mut self, data_size: u16) {
        let mut end = self.frame_start + HEADER_SIZE + data_size as usize + CRC_SIZE;
        if end >= BUF {
            trace!("frame runs past the buffer end, restarting at offset 0");
            self.pending_header_move = Some(self.frame_start);
            self.frame_start = 0;
            self.write_idx = HEADER_SIZE;
            end = HEADER_SIZE + data_size as usize + CRC_SIZE;
            // a frame that does not fit even in an empty buffer is a
            // collaborator contract violation
            assert!(end < BUF);
        }
        self.expected_end = end;
        self.drop_in_use_within(self.frame_start, end);
    }

    /// Parks the finished frame on the interpretation stack and advances
    /// the cursor to the next landing zone. Returns that zone so the caller
    /// can reclaim it.
    fn finish_frame(&mut self) -> (usize, usize) {
        assert!(self.frame_start < BUF);
        self.msg_tasks.push(self.frame_start);

        // the cursor sits two bytes past the data because of the CRC
        self.write_idx -= CRC_SIZE;
        if self.write_idx + HEADER_SIZE + CRC_SIZE >= BUF {
            self.write_idx = 0;
        } else if self.buffer[self.write_idx] % 2 != 1 {
            self.write_idx += 1;
        }
        self.frame_start = self.write_idx;
        self.expected_end = self.frame_start + HEADER_SIZE + CRC_SIZE;
        (self.frame_start, self.expected_end)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use critical_section as _;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    use crate::core::{EndpointId, Header};

    use super::*;

    type TestBuffer = MsgBuffer<CriticalSectionRawMutex, 64, 4>;

    fn header(size: u16) -> Header {
        Header {
            protocol: 0,
            target: 0x001,
            target_mode: 0,
            source: 0x002,
            cmd: 0x30,
            size,
        }
    }

    fn receive(buffer: &TestBuffer, header: &Header, payload: &[u8], crc: [u8; 2]) {
        for byte in header.to_bytes() {
            buffer.write_byte(byte);
        }
        buffer.accept_header(payload.len() as u16);
        for &byte in payload {
            buffer.write_byte(byte);
        }
        for byte in crc {
            buffer.write_byte(byte);
        }
        buffer.end_msg();
    }

    #[test]
    fn test_empty_until_first_byte() {
        let buffer = TestBuffer::new();
        assert!(buffer.is_empty());
        buffer.write_byte(0xaa);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_receive_then_pull_round_trip() {
        let buffer = TestBuffer::new();
        let header = header(3);
        receive(&buffer, &header, &[1, 2, 3], [0x55, 0x55]);

        let msg = buffer.pop_msg_task().unwrap();
        buffer.with_msg(msg, |parked, payload| {
            assert_eq!(parked, &header);
            assert_eq!(payload, &[1, 2, 3]);
        });
        assert_eq!(buffer.pop_msg_task(), None);
    }

    #[test]
    fn test_rejected_header_reuses_slot() {
        let buffer = TestBuffer::new();
        for byte in header(3).to_bytes() {
            buffer.write_byte(byte);
        }
        buffer.reject_header();

        let header = header(1);
        receive(&buffer, &header, &[9], [1, 1]);
        let msg = buffer.pop_msg_task().unwrap();
        buffer.with_msg(msg, |parked, payload| {
            assert_eq!(parked.size, 1);
            assert_eq!(payload, &[9]);
        });
    }

    #[test]
    fn test_discard_resets_cursor() {
        let buffer = TestBuffer::new();
        let first = header(2);
        receive(&buffer, &first, &[4, 5], [1, 1]);

        for byte in header(3).to_bytes() {
            buffer.write_byte(byte);
        }
        buffer.accept_header(3);
        buffer.write_byte(0xde);
        buffer.discard_msg();

        let second = header(2);
        receive(&buffer, &second, &[6, 7], [1, 1]);
        assert_eq!(buffer.pop_msg_task(), Some(MsgId(0)));
        let msg = buffer.pop_msg_task().unwrap();
        buffer.with_msg(msg, |_, payload| assert_eq!(payload, &[6, 7]));
    }

    #[test]
    fn test_loop_back_round_trip() {
        let buffer = TestBuffer::new();
        let header = header(4);
        buffer.push_loop_back(&header, &[1, 2, 3, 4]);

        let msg = buffer.pop_msg_task().unwrap();
        buffer.with_msg(msg, |parked, payload| {
            assert_eq!(parked, &header);
            assert_eq!(payload, &[1, 2, 3, 4]);
        });
    }

    #[test]
    fn test_loop_back_clamps_payload() {
        let buffer: MsgBuffer<CriticalSectionRawMutex, 256, 4> = MsgBuffer::new();
        let header = header(200);
        let payload = [0x11u8; 200];
        buffer.push_loop_back(&header, &payload);

        // the declared size survives, the staged bytes are clamped
        let msg = buffer.pop_msg_task().unwrap();
        buffer.with_msg(msg, |parked, _| assert_eq!(parked.size, 200));
    }

    #[test]
    fn test_interleaved_reception_and_interpretation() {
        let buffer = TestBuffer::new();
        let endpoint = EndpointId::new(5).unwrap();
        receive(&buffer, &header(1), &[1], [1, 1]);
        receive(&buffer, &header(1), &[2], [1, 1]);

        let first = buffer.pop_msg_task().unwrap();
        buffer.alloc_delivery(endpoint, first);
        receive(&buffer, &header(1), &[3], [1, 1]);

        let second = buffer.pop_msg_task().unwrap();
        let third = buffer.pop_msg_task().unwrap();
        buffer.with_msg(second, |_, payload| assert_eq!(payload, &[2]));
        buffer.with_msg(third, |_, payload| assert_eq!(payload, &[3]));

        let delivered = buffer.pop_delivery(endpoint).unwrap();
        buffer.with_msg(delivered, |_, payload| assert_eq!(payload, &[1]));
    }
}
