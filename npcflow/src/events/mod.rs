//! Stage events and the sinks that receive them.
//!
//! The orchestrator emits a [`StageEvent`] at every stage boundary:
//! `stage.started`, `stage.cached`, `stage.succeeded` and `stage.failed`.
//! Sinks are injected; there is no process-wide sink.

mod channel;
mod event;
mod sink;

pub use channel::ChannelEventSink;
pub use event::{StageEvent, StageEventKind};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
