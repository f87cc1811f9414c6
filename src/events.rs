//! Rotator event stream.
//!
//! Subscribers receive events over a broadcast channel obtained from
//! [`Rotator::subscribe`](crate::Rotator::subscribe). There is no emitter
//! base type; the channel is the whole mechanism.

use std::sync::Arc;

use crate::error::Error;
use crate::state::ArchiveRecord;

/// Events emitted by a running [`Rotator`](crate::Rotator).
#[derive(Debug, Clone)]
pub enum RotatorEvent {
    /// Startup checks and initial scheduling completed.
    Ready,
    /// A rotation finished and its state was persisted.
    Rotate(ArchiveRecord),
    /// A recoverable failure occurred; the rotator keeps running.
    Error(Arc<Error>),
}
