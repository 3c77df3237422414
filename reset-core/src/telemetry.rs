//! Telemetry event catalog and ring buffer shared by firmware and host targets.
//!
//! The sequencer records every line transition and sequence boundary here so
//! operators can inspect what the controller actually drove, including the
//! partial traces left behind by failed sequences.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::line::LineId;
use crate::sequencer::SequenceKind;

/// Identifier assigned to each recorded event.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 32;

/// Discriminated telemetry events.
///
/// For the mode-select line, "asserted" means driven to the programming level.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryEventKind {
    LineAsserted(LineId),
    LineReleased(LineId),
    SequenceStarted(SequenceKind),
    SequenceComplete(SequenceKind),
    SequenceFailed(SequenceKind),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::LineAsserted(line) => write!(f, "line-asserted {line}"),
            TelemetryEventKind::LineReleased(line) => write!(f, "line-released {line}"),
            TelemetryEventKind::SequenceStarted(kind) => write!(f, "sequence-started {kind}"),
            TelemetryEventKind::SequenceComplete(kind) => write!(f, "sequence-complete {kind}"),
            TelemetryEventKind::SequenceFailed(kind) => write!(f, "sequence-failed {kind}"),
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub event: TelemetryEventKind,
}

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: HistoryBuf<TelemetryRecord, CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    #[must_use]
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records a line transition.
    pub fn record_line(&mut self, line: LineId, asserted: bool) -> EventId {
        self.record(if asserted {
            TelemetryEventKind::LineAsserted(line)
        } else {
            TelemetryEventKind::LineReleased(line)
        })
    }

    pub fn record(&mut self, event: TelemetryEventKind) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(TelemetryRecord { id, event });
        id
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}
