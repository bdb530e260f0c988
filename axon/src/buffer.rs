//! Zero-copy message buffer manager
//!
//! Every byte that crosses the bus lives in a single fixed-size buffer.
//! Reception writes frames into it in place, and every downstream consumer
//! works through small stacks of offsets into that same buffer; a frame is
//! never copied once parked.
//!
//! ```text
//!          byte buffer
//!         +-------------------------------------------------------------+
//!         |hhhhhhhdddd|-------------------------------------------------|
//!         +------^---^--------------------------------------------------+
//!                |   |
//!                A   B    msg_tasks         delivery_tasks
//!                    |   +---------+        +-----------+
//!                    +-->| frame B |---C--->| task D1   |
//!                        |---------|        | task D2   |
//!                        |---------|        |-----------|
//!                        +---------+        +-----------+
//! ```
//!
//! * **A** — the interrupt handler finished receiving a header. The frame's
//!   total length is now known, so the write cursor can be bounded and, if
//!   the frame would run off the buffer end, restarted at offset 0.
//! * **B** — the interrupt handler finished receiving a valid frame. Its
//!   start offset is pushed on `msg_tasks`, space for the next frame is
//!   reclaimed from older tasks, and the cursor advances.
//! * **C** — the protocol loop pops `msg_tasks`, interprets the frame and
//!   fans it out to one delivery task per concerned endpoint.
//! * **D** — the application loop pops `delivery_tasks` per endpoint.
//!
//! Outbound frames are staged in the same buffer through [`MsgBuffer::stage_tx`]
//! and drained by the wire driver through `tx_tasks`.
//!
//! ## Concurrency model
//!
//! Two execution contexts share the state: the interrupt-level producer
//! (byte reception, frame completion) and the cooperative main loop
//! (interpretation, delivery, transmit staging). The only synchronisation
//! is a scoped critical section, expressed as a [`RawMutex`] type
//! parameter; on bare-metal targets use
//! `embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex`, which
//! masks interrupts for the duration of each lock.
//!
//! Critical sections stay short and bounded. Multi-step operations — the
//! FIFO slides of the task stacks in particular — release the lock between
//! element moves, so the worst-case interrupt latency is one element move,
//! not one slide.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::core::{CRC_SIZE, EndpointId, HEADER_SIZE, Header};
use crate::stats::MemoryStats;

mod delivery;
mod reclaim;
mod rx;
mod stack;
mod tx;

use stack::{Slide, TaskStack};

pub use tx::TxTask;

/// Reference to a frame parked in the buffer, as handed out by the pull
/// operations. Stays `Copy`-cheap: it is a buffer offset, not the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MsgId(pub(crate) usize);

/// One pending delivery: a frame and the endpoint it is routed to.
#[derive(Debug, Clone, Copy)]
struct Delivery {
    msg: usize,
    endpoint: EndpointId,
}

/// The buffer manager.
///
/// `BUF` is the byte capacity of the message buffer, `TASKS` the depth of
/// each task stack. The object is safe to share between the interrupt
/// producer and main-loop consumers; pick `M` accordingly.
pub struct MsgBuffer<M: RawMutex, const BUF: usize, const TASKS: usize> {
    state: Mutex<M, RefCell<Inner<BUF, TASKS>>>,
}

struct Inner<const BUF: usize, const TASKS: usize> {
    buffer: [u8; BUF],
    /// Start of the frame being received (or of the next one to receive).
    frame_start: usize,
    /// Next byte to write.
    write_idx: usize,
    /// One past the last byte the current frame is expected to occupy.
    /// Before header validation this is the minimal-frame guess.
    expected_end: usize,
    /// Header parked at the buffer tail, waiting for the main loop to move
    /// it to offset 0. At most one such move can be pending.
    pending_header_move: Option<usize>,
    /// Frames awaiting protocol interpretation, in arrival order.
    msg_tasks: TaskStack<usize, TASKS>,
    /// Frames routed to endpoints, awaiting application pulls.
    delivery_tasks: TaskStack<Delivery, TASKS>,
    /// Staged outbound frames, awaiting the wire driver.
    tx_tasks: TaskStack<TxTask, TASKS>,
    /// Frame a consumer is currently reading, if any.
    in_use: Option<usize>,
    stats: MemoryStats,
}

impl<M: RawMutex, const BUF: usize, const TASKS: usize> MsgBuffer<M, BUF, TASKS> {
    // The cursor advance logic needs room for two minimal frames. Underflow
    // here fails the build for unusable buffer geometries.
    const _ASSERT_BUF: usize = BUF - 2 * (HEADER_SIZE + CRC_SIZE);
    const _ASSERT_TASKS: usize = TASKS - 1;

    pub const fn new() -> Self {
        let _ = Self::_ASSERT_BUF;
        let _ = Self::_ASSERT_TASKS;
        Self {
            state: Mutex::new(RefCell::new(Inner::new())),
        }
    }

    fn lock<R>(&self, f: impl FnOnce(&mut Inner<BUF, TASKS>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// True until the first received byte lands.
    pub fn is_empty(&self) -> bool {
        self.lock(|inner| inner.write_idx == 0)
    }

    /// Snapshot of the memory pressure counters.
    pub fn stats(&self) -> MemoryStats {
        self.lock(|inner| inner.stats)
    }

    /// Main-loop housekeeping: refresh the interpretation stack watermark
    /// and perform the pending header move, if one is armed.
    pub fn tick(&self) {
        self.lock(|inner| {
            let ratio = (inner.msg_tasks.len() * 100 / TASKS) as u8;
            inner.stats.raise_msg_stack(ratio);
            if let Some(src) = inner.pending_header_move.take() {
                trace!("moving parked header from {} to buffer start", src);
                inner.buffer.copy_within(src..src + HEADER_SIZE, 0);
            }
        });
    }

    /// Reads a parked frame in place.
    ///
    /// The closure runs under the critical section, so the bytes it sees
    /// are consistent; keep it short and do not call back into the buffer
    /// manager from it.
    pub fn with_msg<R>(&self, msg: MsgId, f: impl FnOnce(&Header, &[u8]) -> R) -> R {
        self.lock(|inner| {
            let header = inner.header_at(msg.0);
            let data = msg.0 + HEADER_SIZE;
            let data_end = (data + header.size as usize).min(BUF);
            f(&header, &inner.buffer[data..data_end])
        })
    }

    /// Reads the bytes of the frame currently being received.
    ///
    /// The framing collaborator uses this to validate the header in place.
    /// After a restart at offset 0 the header bytes are only in place once
    /// [`tick`](Self::tick) has run.
    pub fn with_current_msg<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.lock(|inner| f(&inner.buffer[inner.frame_start..inner.write_idx]))
    }

    /// Consumer signal that it is done reading the frame it pulled.
    pub fn release(&self) {
        self.lock(|inner| inner.in_use = None);
    }

    fn remove_msg_task(&self, index: usize) {
        let mut slide = Slide::starting_at(index);
        while self.lock(|inner| inner.msg_tasks.slide_step(&mut slide)) {}
    }

    fn remove_delivery(&self, index: usize) {
        let mut slide = Slide::starting_at(index);
        while self.lock(|inner| inner.delivery_tasks.slide_step(&mut slide)) {}
    }

    fn remove_tx(&self, index: usize) {
        let mut slide = Slide::starting_at(index);
        while self.lock(|inner| inner.tx_tasks.slide_step(&mut slide)) {}
    }
}

impl<M: RawMutex, const BUF: usize, const TASKS: usize> Default for MsgBuffer<M, BUF, TASKS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const BUF: usize, const TASKS: usize> Inner<BUF, TASKS> {
    const fn new() -> Self {
        Self {
            buffer: [0; BUF],
            frame_start: 0,
            write_idx: 0,
            expected_end: HEADER_SIZE + CRC_SIZE,
            pending_header_move: None,
            msg_tasks: TaskStack::new(),
            delivery_tasks: TaskStack::new(),
            tx_tasks: TaskStack::new(),
            in_use: None,
            stats: MemoryStats::new(),
        }
    }

    fn header_at(&self, at: usize) -> Header {
        let bytes = unwrap!(self.buffer[at..at + HEADER_SIZE].try_into().ok());
        Header::from_bytes(&bytes)
    }
}
