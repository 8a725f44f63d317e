//! Session & chat-task persistence (spec §4.5) plus compress-and-branch
//! (spec §4.5, §4.9).

pub mod compression;
pub mod service;

pub use compression::{CompressionOutcome, CompressionService, Summarizer};
pub use service::{SessionService, SessionWithProject};
