//! # Axon
//!
//! This library provides the message-buffering core of a half-duplex
//! serial-bus runtime for no_std environments. Frames are framed, queued
//! and consumed in place inside a single fixed-size buffer, requiring no
//! dynamic memory allocation.
//!
//! The library is designed for systems with tight interrupt latency
//! requirements, keeping all critical section durations bounded.
//!
//! ## Architecture
//!
//! ```text
//!  ┌─────────────┐  bytes   ┌───────────────────────────────┐
//!  │ wire driver ├─────────►│          MsgBuffer            │
//!  │  (ISR ctx)  │◄─────────┤                               │
//!  └─────────────┘ tx_tasks │  byte buffer ── msg_tasks ────┼──► protocol loop
//!                           │              ── delivery_tasks┼──► application loop
//!  ┌─────────────┐ verdicts │              ── tx_tasks      │
//!  │   framing   ├─────────►│                               │
//!  │  validator  │          └───────────────────────────────┘
//!  └─────────────┘
//! ```
//!
//! Components:
//! * [`buffer::MsgBuffer`] owns the byte buffer, the reception cursor and
//!   three bounded task stacks (interpretation, delivery, transmit). It is
//!   the only component; everything else on this diagram is a collaborator
//!   the host provides.
//! * The _wire driver_ feeds received bytes from interrupt context and
//!   drains staged outbound frames.
//! * The _framing validator_ checks header and frame CRCs and reports its
//!   verdicts (`accept_header` / `reject_header`, `end_msg` /
//!   `discard_msg`).
//! * The _protocol loop_ interprets parked frames and fans them out to
//!   per-endpoint deliveries; the _application loop_ consumes those.
//!
//! ## Concurrency model
//!
//! There are exactly two execution contexts: the interrupt-level producer
//! and the cooperative main loop. The buffer manager is generic over an
//! `embassy_sync` raw mutex; `CriticalSectionRawMutex` gives the
//! interrupt-masking behaviour the bus timing relies on. See
//! [`buffer`] for the details of how critical sections are kept short.
//!
//! Delivery is at-most-once. When consumers fall behind, the oldest
//! pending work is dropped and accounted in [`stats::MemoryStats`]; there
//! are no timers and no retries.
#![no_std]

pub use axon_core as core;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod buffer;
pub mod stats;
