//! Overlap reclamation
//!
//! The buffer is finite and frames vary in size, so a new write eventually
//! lands on bytes still referenced by pending tasks. Before any region is
//! claimed, the reclaimer evicts every task pointing into it, counting each
//! eviction as a drop.
//!
//! Tasks enter the stacks in address-monotonic order (modulo the wrap
//! logic, which clears ahead of itself), so checking the stack head is
//! enough: if the oldest entry is outside the claimed window, the younger
//! ones are too.

use embassy_sync::blocking_mutex::raw::RawMutex;

use super::{Inner, MsgBuffer};

/// The claimed region runs past the buffer end; the caller wraps first.
pub(crate) struct OutOfBuffer;

impl<M: RawMutex, const BUF: usize, const TASKS: usize> MsgBuffer<M, BUF, TASKS> {
    /// Makes `from..to` writable by evicting every task that references it.
    ///
    /// `to` is one past the region's last byte. The window checks are
    /// inclusive of `to` itself, matching the cursor arithmetic of the
    /// callers.
    pub(crate) fn clear_space(&self, from: usize, to: usize) -> Result<(), OutOfBuffer> {
        if to >= BUF {
            return Err(OutOfBuffer);
        }

        self.lock(|inner| inner.drop_in_use_within(from, to));

        loop {
            let hit = self.lock(|inner| {
                inner
                    .delivery_tasks
                    .head()
                    .is_some_and(|task| from <= task.msg && task.msg <= to)
            });
            if !hit {
                break;
            }
            self.remove_delivery(0);
            self.lock(|inner| inner.stats.count_drop());
        }

        loop {
            let hit = self.lock(|inner| {
                inner
                    .msg_tasks
                    .head()
                    .is_some_and(|&msg| from <= msg && msg <= to)
            });
            if !hit {
                break;
            }
            trace!("reclaiming a frame awaiting interpretation");
            self.remove_msg_task(0);
            self.lock(|inner| inner.stats.count_drop());
        }

        Ok(())
    }
}

impl<const BUF: usize, const TASKS: usize> Inner<BUF, TASKS> {
    /// Invalidates the consumer's in-use frame when the claimed region
    /// covers it.
    pub(super) fn drop_in_use_within(&mut self, from: usize, to: usize) {
        if let Some(msg) = self.in_use
            && from <= msg
            && msg <= to
        {
            self.in_use = None;
            self.stats.count_drop();
        }
    }
}
