use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::{Resolver, SparseTimingRecord, Tempo};
use crate::error::{RecordError, ValidationError};
use crate::events::{self, Channel, ScheduledEvent};

/// Whether notes get a paired note-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReleasePolicy {
    /// One note-on per note event; the receiver decides when it ends.
    #[default]
    EmitOnce,
    /// Each note-on is followed by a note-off `hold_ms` later.
    AutoRelease { hold_ms: u64 },
}

impl ReleasePolicy {
    fn hold_seconds(&self) -> Option<f64> {
        match self {
            ReleasePolicy::EmitOnce => None,
            ReleasePolicy::AutoRelease { hold_ms } => Some(*hold_ms as f64 / 1000.0),
        }
    }
}

/// Turns sparse records into scheduled events one at a time.
///
/// Resolution, time conversion and encoding are all pure, so the same
/// scheduler backs both the precomputed schedule and the just-in-time source.
#[derive(Debug, Clone)]
pub struct Scheduler {
    tempo: Tempo,
    channel: Channel,
    release: ReleasePolicy,
    resolver: Resolver,
    last_offset: f64,
    pending_releases: VecDeque<ScheduledEvent>,
}

impl Scheduler {
    pub fn new(tempo: Tempo, channel: Channel, release: ReleasePolicy) -> Self {
        Self {
            tempo,
            channel,
            release,
            resolver: Resolver::new(),
            last_offset: 0.0,
            pending_releases: VecDeque::new(),
        }
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    /// Resolves, validates ordering, converts and encodes one record.
    ///
    /// A rejected record leaves the running state untouched, so the records
    /// after it resolve as if it had never been there.
    pub fn schedule_record(
        &mut self,
        index: usize,
        record: &SparseTimingRecord,
    ) -> Result<ScheduledEvent, RecordError> {
        let previous = self.resolver.clone();
        let resolved = self
            .resolver
            .resolve(record)
            .map_err(|e| RecordError::new(index, e))?;
        let position = resolved.position;

        let offset_seconds = self.tempo.offset_seconds(&position);
        if offset_seconds < self.last_offset {
            self.resolver = previous;
            return Err(RecordError::new(
                index,
                ValidationError::OutOfOrder {
                    offset: offset_seconds,
                    previous: self.last_offset,
                },
            ));
        }

        let message = match events::encode(&resolved.event, resolved.value, self.channel) {
            Ok(message) => message,
            Err(e) => {
                self.resolver = previous;
                return Err(RecordError::new(index, e));
            }
        };

        self.last_offset = offset_seconds;
        let event = ScheduledEvent {
            index,
            position,
            offset_seconds,
            message,
        };

        if let (Some(hold), Some(note_off)) =
            (self.release.hold_seconds(), events::release_for(&message))
        {
            // Hold is constant and accepted offsets never decrease, so releases
            // come out of the queue already ordered.
            self.pending_releases.push_back(ScheduledEvent {
                offset_seconds: offset_seconds + hold,
                message: note_off,
                ..event.clone()
            });
        }

        Ok(event)
    }

    /// Offset of the earliest queued note-off.
    pub fn next_release_offset(&self) -> Option<f64> {
        self.pending_releases.front().map(|e| e.offset_seconds)
    }

    pub fn pop_release(&mut self) -> Option<ScheduledEvent> {
        self.pending_releases.pop_front()
    }

    /// Pops the next note-off if it is due at or before `offset`.
    pub fn pop_release_due(&mut self, offset: f64) -> Option<ScheduledEvent> {
        match self.next_release_offset() {
            Some(release) if release <= offset => self.pop_release(),
            _ => None,
        }
    }
}

/// A precomputed, time-ordered list of events plus the records that were skipped.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub events: Vec<ScheduledEvent>,
    pub rejected: Vec<RecordError>,
}

impl Schedule {
    pub fn duration_seconds(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.offset_seconds)
    }
}

/// Schedules a whole record sequence ahead of playback.
///
/// Note-offs due at the same moment as a note-on are placed before it so a
/// re-struck note isn't cut off by its own earlier release.
pub fn schedule_records(
    records: &[SparseTimingRecord],
    tempo: Tempo,
    channel: Channel,
    release: ReleasePolicy,
) -> Schedule {
    let mut scheduler = Scheduler::new(tempo, channel, release);
    let mut schedule = Schedule {
        events: Vec::with_capacity(records.len()),
        rejected: Vec::new(),
    };

    for (index, record) in records.iter().enumerate() {
        match scheduler.schedule_record(index, record) {
            Ok(event) => {
                while let Some(release) = scheduler.pop_release_due(event.offset_seconds) {
                    schedule.events.push(release);
                }
                schedule.events.push(event);
            }
            Err(e) => {
                tracing::warn!("Skipping {}", e);
                schedule.rejected.push(e);
            }
        }
    }

    while let Some(release) = scheduler.pop_release() {
        schedule.events.push(release);
    }

    tracing::debug!(
        events = schedule.events.len(),
        rejected = schedule.rejected.len(),
        "Schedule built for {}",
        tempo
    );

    schedule
}
