//! Feeds of scheduled events for the dispatcher.
//!
//! A source hands out events in time order. It can be fully precomputed, can
//! resolve each record just before it is needed, or can be filled from another
//! thread over a channel. An empty channel reports [`NextEvent::Pending`] rather
//! than blocking, so a slow producer never stalls the timing loop.

use std::iter::Peekable;

use crossbeam::channel::{Receiver, Sender, TryRecvError};

use super::{ReleasePolicy, Schedule, Scheduler, SparseTimingRecord, Tempo};
use crate::error::RecordError;
use crate::events::{Channel, ScheduledEvent};

/// What a source has ready next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NextEvent {
    /// An event is available at this offset.
    Ready(f64),
    /// Nothing available yet, but more may arrive.
    Pending,
    /// The sequence is over.
    Exhausted,
}

pub trait EventSource {
    fn peek(&mut self) -> NextEvent;

    /// Removes the event last reported by [`EventSource::peek`].
    fn take(&mut self) -> Option<ScheduledEvent>;

    /// Records skipped so far because they could not be resolved or encoded.
    fn rejected(&self) -> usize {
        0
    }
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn peek(&mut self) -> NextEvent {
        (**self).peek()
    }

    fn take(&mut self) -> Option<ScheduledEvent> {
        (**self).take()
    }

    fn rejected(&self) -> usize {
        (**self).rejected()
    }
}

/// Walks a schedule computed before playback.
pub struct PrecomputedSource {
    events: Peekable<std::vec::IntoIter<ScheduledEvent>>,
    rejected: usize,
}

impl PrecomputedSource {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            events: schedule.events.into_iter().peekable(),
            rejected: schedule.rejected.len(),
        }
    }
}

impl From<Vec<ScheduledEvent>> for PrecomputedSource {
    fn from(events: Vec<ScheduledEvent>) -> Self {
        Self::new(Schedule {
            events,
            rejected: Vec::new(),
        })
    }
}

impl EventSource for PrecomputedSource {
    fn peek(&mut self) -> NextEvent {
        self.events
            .peek()
            .map_or(NextEvent::Exhausted, |e| NextEvent::Ready(e.offset_seconds))
    }

    fn take(&mut self) -> Option<ScheduledEvent> {
        self.events.next()
    }

    fn rejected(&self) -> usize {
        self.rejected
    }
}

/// Resolves, converts and encodes each record only when the dispatcher asks for it.
pub struct LazySource<I: Iterator<Item = SparseTimingRecord>> {
    records: std::iter::Enumerate<I>,
    scheduler: Scheduler,
    lookahead: Option<ScheduledEvent>,
    rejected: Vec<RecordError>,
}

impl<I: Iterator<Item = SparseTimingRecord>> LazySource<I> {
    pub fn new(
        records: impl IntoIterator<IntoIter = I>,
        tempo: Tempo,
        channel: Channel,
        release: ReleasePolicy,
    ) -> Self {
        Self {
            records: records.into_iter().enumerate(),
            scheduler: Scheduler::new(tempo, channel, release),
            lookahead: None,
            rejected: Vec::new(),
        }
    }

    pub fn rejected_records(&self) -> &[RecordError] {
        &self.rejected
    }

    fn fill_lookahead(&mut self) {
        while self.lookahead.is_none() {
            let Some((index, record)) = self.records.next() else {
                return;
            };
            match self.scheduler.schedule_record(index, &record) {
                Ok(event) => self.lookahead = Some(event),
                Err(e) => {
                    tracing::warn!("Skipping {}", e);
                    self.rejected.push(e);
                }
            }
        }
    }

    /// A queued note-off goes first when it is due no later than the next record.
    fn release_first(&self) -> bool {
        match (self.scheduler.next_release_offset(), &self.lookahead) {
            (Some(release), Some(next)) => release <= next.offset_seconds,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

impl<I: Iterator<Item = SparseTimingRecord>> EventSource for LazySource<I> {
    fn peek(&mut self) -> NextEvent {
        self.fill_lookahead();
        if self.release_first() {
            return self
                .scheduler
                .next_release_offset()
                .map_or(NextEvent::Exhausted, NextEvent::Ready);
        }
        self.lookahead
            .as_ref()
            .map_or(NextEvent::Exhausted, |e| NextEvent::Ready(e.offset_seconds))
    }

    fn take(&mut self) -> Option<ScheduledEvent> {
        self.fill_lookahead();
        if self.release_first() {
            self.scheduler.pop_release()
        } else {
            self.lookahead.take()
        }
    }

    fn rejected(&self) -> usize {
        self.rejected.len()
    }
}

/// Receives events pushed by a producer thread.
///
/// The producer must send events in time order. Dropping every sender ends
/// the sequence.
pub struct ChannelSource {
    receiver: Receiver<ScheduledEvent>,
    slot: Option<ScheduledEvent>,
    disconnected: bool,
}

impl ChannelSource {
    pub fn new(receiver: Receiver<ScheduledEvent>) -> Self {
        Self {
            receiver,
            slot: None,
            disconnected: false,
        }
    }

    /// A bounded channel and the source reading from it.
    pub fn bounded(capacity: usize) -> (Sender<ScheduledEvent>, Self) {
        let (sender, receiver) = crossbeam::channel::bounded(capacity);
        (sender, Self::new(receiver))
    }

    fn fill_slot(&mut self) {
        if self.slot.is_some() || self.disconnected {
            return;
        }
        match self.receiver.try_recv() {
            Ok(event) => self.slot = Some(event),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => self.disconnected = true,
        }
    }
}

impl EventSource for ChannelSource {
    fn peek(&mut self) -> NextEvent {
        self.fill_slot();
        match &self.slot {
            Some(event) => NextEvent::Ready(event.offset_seconds),
            None if self.disconnected => NextEvent::Exhausted,
            None => NextEvent::Pending,
        }
    }

    fn take(&mut self) -> Option<ScheduledEvent> {
        self.fill_slot();
        self.slot.take()
    }
}
