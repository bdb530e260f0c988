//! Transmit staging
//!
//! Outbound frames are parked in the same buffer as inbound ones, so
//! staging must coexist with a reception that may be mid-frame: the
//! in-flight frame is displaced, not clobbered. The pointer shuffle runs
//! under one short critical section; the byte copies run outside it, after
//! reception has been re-aimed at the frame's new location.

use embassy_sync::blocking_mutex::raw::RawMutex;

use super::MsgBuffer;

/// Bytes copied before the task becomes visible, so a polling driver can
/// start transmitting while the rest of the frame is still being staged.
const TX_PREFIX: usize = 3;

/// A staged outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxTask {
    pub(crate) offset: usize,
    pub(crate) len: usize,
}

impl TxTask {
    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }
}

impl<M: RawMutex, const BUF: usize, const TASKS: usize> MsgBuffer<M, BUF, TASKS> {
    /// Stages `frame` for transmission.
    ///
    /// When the frame does not fit before the buffer end, it is placed at
    /// offset 0 and the in-flight reception is displaced behind it. When it
    /// fits but leaves no room for the receiving frame's expected tail, the
    /// reception is wrapped back to offset 0 instead. Either way the bytes
    /// already received keep their progress at the new location.
    pub fn stage_tx(&self, frame: &[u8]) {
        let size = frame.len();
        assert!(size >= TX_PREFIX && size < BUF);

        let (tx, old_start, new_start, progression, end_hint) = self.lock(|inner| {
            let progression = inner.write_idx - inner.frame_start;
            let reserved = inner.expected_end - inner.frame_start;
            let old_start = inner.frame_start;
            let tx;
            if inner.frame_start + size >= BUF {
                tx = 0;
                inner.frame_start = size;
            } else {
                tx = inner.frame_start;
                if tx + size + reserved >= BUF {
                    inner.frame_start = 0;
                } else {
                    inner.frame_start = tx + size;
                }
            }
            inner.write_idx = inner.frame_start + progression;
            inner.expected_end = inner.frame_start + reserved;
            (
                tx,
                old_start,
                inner.frame_start,
                progression,
                inner.expected_end,
            )
        });

        let _ = self.clear_space(tx, tx + size);
        let _ = self.clear_space(new_start, end_hint);

        // reception resumed into the new location the moment the lock above
        // dropped; the already-received bytes follow it now
        self.lock(|inner| {
            inner
                .buffer
                .copy_within(old_start..old_start + progression, new_start);
        });

        self.lock(|inner| {
            inner.buffer[tx..tx + TX_PREFIX].copy_from_slice(&frame[..TX_PREFIX]);
        });

        if self.lock(|inner| inner.tx_tasks.is_full()) {
            trace!("transmit stack full, evicting the oldest frame");
            self.pop_tx();
            self.lock(|inner| inner.stats.count_drop());
        }
        self.lock(|inner| {
            inner.tx_tasks.push(TxTask {
                offset: tx,
                len: size,
            });
        });

        self.lock(|inner| {
            inner.buffer[tx + TX_PREFIX..tx + size].copy_from_slice(&frame[TX_PREFIX..]);
        });
    }

    /// Oldest staged frame, without consuming it.
    pub fn peek_tx(&self) -> Option<TxTask> {
        self.lock(|inner| inner.tx_tasks.head().copied())
    }

    /// Reads the oldest staged frame in place. The closure runs under the
    /// critical section; keep it short and do not call back into the
    /// buffer manager from it.
    pub fn with_tx<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.lock(|inner| {
            let task = inner.tx_tasks.head().copied()?;
            Some(f(&inner.buffer[task.offset..task.offset + task.len]))
        })
    }

    /// Retires the oldest staged frame. Called by the wire driver on
    /// transmission completion.
    pub fn pop_tx(&self) {
        self.remove_tx(0);
    }
}
