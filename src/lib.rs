//! Sans-IO HTTP/2 stream priority tree (RFC 7540 Section 5.3).
//!
//! This crate answers "which stream should transmit next?" for an HTTP/2
//! connection. It holds the dependency forest of streams (each with a
//! weight in 1..=256 and a parent) and serves the active ones by weighted
//! round-robin, letting resources flow through blocked parents to their
//! highest-priority unblocked descendants.
//!
//! It is a pure data structure: no I/O, no framing, no locking. The caller
//! feeds in priority information (from PRIORITY frames or elsewhere),
//! signals readiness with `block`/`unblock`, and polls `next_stream()`.
//!
//! # Architecture
//!
//! ```text
//!   insert / reprioritize / remove           next_stream()
//!   block / unblock                                |
//!        |                                         v
//!   +----v------------+   per-node   +---------------------------+
//!   | PriorityTree    |------------->| weighted fair child queue |
//!   | id -> node slab |   schedulers | keyed by virtual finish   |
//!   +-----------------+              +---------------------------+
//! ```
//!
//! # Example
//!
//! ```rust
//! use h2_priority::{Priority, PriorityTree};
//!
//! let mut tree = PriorityTree::default();
//! tree.insert_stream(1, Priority::default())?;
//! tree.insert_stream(3, Priority { weight: 32, ..Priority::default() })?;
//!
//! // New streams start blocked; unblock them once they have data to send.
//! tree.unblock(1)?;
//! tree.unblock(3)?;
//!
//! // Stream 3 carries twice the weight, so it is served twice as often.
//! assert_eq!(tree.next_stream()?, 3);
//! # Ok::<(), h2_priority::Error>(())
//! ```

pub mod error;
mod scheduler;
mod stream;
pub mod tree;

pub use error::Error;
pub use stream::{Priority, DEFAULT_WEIGHT};
pub use tree::{Config, Ids, PriorityTree};
