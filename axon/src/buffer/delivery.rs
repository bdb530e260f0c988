//! Per-endpoint delivery stack
//!
//! After interpretation, a frame is fanned out to one delivery task per
//! concerned endpoint. Several tasks may reference the same frame; the
//! frame's storage outlives them all and is reclaimed implicitly by later
//! writes.
//!
//! Pulling a delivery marks the frame as in use, which lets the reclaimer
//! invalidate the consumer's view (and count a drop) when the space is
//! claimed before the consumer calls [`MsgBuffer::release`].

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::core::EndpointId;

use super::{Delivery, MsgBuffer, MsgId};

impl<M: RawMutex, const BUF: usize, const TASKS: usize> MsgBuffer<M, BUF, TASKS> {
    /// Routes a frame to an endpoint. Called once per concerned endpoint
    /// by the interpretation loop; evicts the oldest delivery when the
    /// stack is full.
    pub fn alloc_delivery(&self, endpoint: EndpointId, msg: MsgId) {
        if self.lock(|inner| inner.delivery_tasks.is_full()) {
            trace!("delivery stack full, evicting the oldest task");
            self.remove_delivery(0);
            self.lock(|inner| inner.stats.count_drop());
        }
        self.lock(|inner| {
            inner.delivery_tasks.push(Delivery {
                msg: msg.0,
                endpoint,
            });
            let ratio = (inner.delivery_tasks.len() * 100 / TASKS) as u8;
            inner.stats.raise_delivery_stack(ratio);
        });
    }

    /// Pops the oldest delivery routed to `endpoint` and marks its frame
    /// as in use.
    pub fn pop_delivery(&self, endpoint: EndpointId) -> Option<MsgId> {
        let found = self.lock(|inner| {
            let mut found = None;
            for index in 0..inner.delivery_tasks.len() {
                if let Some(task) = inner.delivery_tasks.get(index)
                    && task.endpoint == endpoint
                {
                    found = Some((index, task.msg));
                    break;
                }
            }
            if let Some((_, msg)) = found {
                inner.in_use = Some(msg);
            }
            found
        });
        let (index, msg) = found?;
        self.remove_delivery(index);
        Some(MsgId(msg))
    }

    /// Pops the delivery at `index` and marks its frame as in use.
    pub fn pop_delivery_at(&self, index: u16) -> Option<MsgId> {
        let msg = self.lock(|inner| {
            let task = inner.delivery_tasks.get(index as usize)?;
            let msg = task.msg;
            inner.in_use = Some(msg);
            Some(msg)
        })?;
        self.remove_delivery(index as usize);
        Some(MsgId(msg))
    }

    /// Endpoint of the delivery at `index`, without consuming it.
    pub fn delivery_endpoint(&self, index: u16) -> Option<EndpointId> {
        self.lock(|inner| {
            inner
                .delivery_tasks
                .get(index as usize)
                .map(|task| task.endpoint)
        })
    }

    /// Command byte of the frame referenced by the delivery at `index`.
    pub fn delivery_cmd(&self, index: u16) -> Option<u8> {
        self.lock(|inner| {
            let task = inner.delivery_tasks.get(index as usize).copied()?;
            Some(inner.header_at(task.msg).cmd)
        })
    }

    /// Source id of the frame referenced by the delivery at `index`.
    pub fn delivery_source(&self, index: u16) -> Option<u16> {
        self.lock(|inner| {
            let task = inner.delivery_tasks.get(index as usize).copied()?;
            Some(inner.header_at(task.msg).source)
        })
    }

    /// Declared payload size of the frame referenced by the delivery at
    /// `index`.
    pub fn delivery_size(&self, index: u16) -> Option<u16> {
        self.lock(|inner| {
            let task = inner.delivery_tasks.get(index as usize).copied()?;
            Some(inner.header_at(task.msg).size)
        })
    }

    /// Number of pending deliveries.
    pub fn delivery_count(&self) -> u16 {
        self.lock(|inner| inner.delivery_tasks.len() as u16)
    }

    /// Removes every delivery referencing `msg`. Used when a downstream
    /// decision invalidates a whole fan-out.
    pub fn clear_deliveries(&self, msg: MsgId) {
        let mut index = 0;
        loop {
            let matches = self.lock(|inner| {
                inner
                    .delivery_tasks
                    .get(index)
                    .map(|task| task.msg == msg.0)
            });
            match matches {
                None => break,
                Some(true) => self.remove_delivery(index),
                Some(false) => index += 1,
            }
        }
    }
}
