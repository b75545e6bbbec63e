//! The realtime dispatch loop.
//!
//! A session walks a time-ordered [`EventSource`]. Each tick samples the clock,
//! moves every event whose offset has elapsed into a batch and flushes that
//! batch to the sink in one call. Batch boundaries depend only on the clock
//! readings and the scheduled offsets, so a [`ManualClock`](crate::ManualClock)
//! reproduces them exactly.
//!
//! ```text
//! Idle --start--> Running --source exhausted--> Draining --final flush--> Idle
//!                    \--cancel--> Cancelled --------------------------> Idle
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{DispatchError, SinkError};
use crate::events::ScheduledEvent;
use crate::sink::MidiSink;
use crate::timing::{EventSource, NextEvent, Tempo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Running,
    Draining,
    Cancelled,
}

/// Cooperative cancellation flag, checked once per tick.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Raised once each time the sink's availability changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkNotice {
    Unavailable,
    Restored,
}

/// What happened to the batch built during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    Delivered(usize),
    /// No device was selected; the events were consumed but not sent.
    Undelivered(usize),
    /// The sink accepted the call but failed to send. Holds the count that didn't go out.
    Failed(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub flush: Option<Flush>,
    pub notice: Option<SinkNotice>,
    /// State after the tick.
    pub state: DispatcherState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Finished,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub end: SessionEnd,
    pub delivered: usize,
    pub undelivered: usize,
    pub batches: usize,
    /// Events consumed from the source. Never counts cancelled leftovers.
    pub cursor: usize,
    /// Records the source skipped for validation or encoding problems.
    pub rejected: usize,
    /// Streamed events dropped because they arrived out of time order.
    pub late_dropped: usize,
}

struct Session {
    tempo: Tempo,
    source: Box<dyn EventSource + Send>,
    cancel: CancelToken,
    started_at: Duration,
    cursor: usize,
    batch: Vec<ScheduledEvent>,
    last_offset: f64,
    delivered: usize,
    undelivered: usize,
    batches: usize,
    late_dropped: usize,
}

impl Session {
    fn summary(&self, end: SessionEnd) -> SessionSummary {
        SessionSummary {
            end,
            delivered: self.delivered,
            undelivered: self.undelivered,
            batches: self.batches,
            cursor: self.cursor,
            rejected: self.source.rejected(),
            late_dropped: self.late_dropped,
        }
    }
}

pub struct Dispatcher<C: Clock, S: MidiSink> {
    clock: C,
    sink: S,
    poll_interval: Duration,
    session: Option<Session>,
    state: DispatcherState,
    sink_available: Option<bool>,
    last_summary: Option<SessionSummary>,
}

impl<C: Clock, S: MidiSink> Dispatcher<C, S> {
    /// `poll_interval` is the sleep between ticks in [`Dispatcher::run`]; a zero
    /// interval is bumped to one microsecond so the loop always yields.
    pub fn new(clock: C, sink: S, poll_interval: Duration) -> Self {
        Self {
            clock,
            sink,
            poll_interval: poll_interval.max(Duration::from_micros(1)),
            session: None,
            state: DispatcherState::Idle,
            sink_available: None,
            last_summary: None,
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == DispatcherState::Idle
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Events consumed so far in the current session.
    pub fn cursor(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.cursor)
    }

    pub fn tempo(&self) -> Option<Tempo> {
        self.session.as_ref().map(|s| s.tempo)
    }

    /// Summary of the most recently ended session.
    pub fn last_summary(&self) -> Option<SessionSummary> {
        self.last_summary
    }

    pub fn start(
        &mut self,
        tempo: Tempo,
        source: impl EventSource + Send + 'static,
        cancel: CancelToken,
    ) -> Result<(), DispatchError> {
        if !self.is_idle() {
            return Err(DispatchError::SessionActive);
        }

        let started_at = self.clock.now();
        tracing::info!("Playback started: {}", tempo);
        self.session = Some(Session {
            tempo,
            source: Box::new(source),
            cancel,
            started_at,
            cursor: 0,
            batch: Vec::new(),
            last_offset: 0.0,
            delivered: 0,
            undelivered: 0,
            batches: 0,
            late_dropped: 0,
        });
        self.state = DispatcherState::Running;
        Ok(())
    }

    /// Stops the current session right away, dropping every unconsumed event.
    pub fn cancel(&mut self) -> Result<SessionSummary, DispatchError> {
        if self.session.is_none() {
            return Err(DispatchError::NoActiveSession);
        }
        self.state = DispatcherState::Cancelled;
        Ok(self.finish(SessionEnd::Cancelled))
    }

    /// Runs one scheduling step.
    pub fn tick(&mut self) -> Result<TickReport, DispatchError> {
        let Some(session) = self.session.as_mut() else {
            return Err(DispatchError::NoActiveSession);
        };

        if session.cancel.is_cancelled() {
            self.state = DispatcherState::Cancelled;
            self.finish(SessionEnd::Cancelled);
            return Ok(TickReport {
                flush: None,
                notice: None,
                state: self.state,
            });
        }

        let elapsed = self.clock.now().saturating_sub(session.started_at).as_secs_f64();
        let exhausted = loop {
            match session.source.peek() {
                NextEvent::Ready(offset) if offset <= elapsed => {
                    let Some(event) = session.source.take() else {
                        break false;
                    };
                    session.cursor += 1;
                    if event.offset_seconds < session.last_offset {
                        tracing::warn!(
                            "Dropping event at {:.3}s, it arrived after {:.3}s was already dispatched",
                            event.offset_seconds,
                            session.last_offset
                        );
                        session.late_dropped += 1;
                        continue;
                    }
                    session.last_offset = event.offset_seconds;
                    session.batch.push(event);
                }
                NextEvent::Ready(_) | NextEvent::Pending => break false,
                NextEvent::Exhausted => break true,
            }
        };

        if exhausted {
            self.state = DispatcherState::Draining;
        }

        let (flush, notice) = self.flush();

        if exhausted {
            self.finish(SessionEnd::Finished);
        }

        Ok(TickReport {
            flush,
            notice,
            state: self.state,
        })
    }

    /// Ticks until the session ends, sleeping `poll_interval` between ticks.
    pub fn run(
        &mut self,
        mut on_tick: impl FnMut(&TickReport),
    ) -> Result<SessionSummary, DispatchError> {
        loop {
            let report = self.tick()?;
            on_tick(&report);
            if report.state == DispatcherState::Idle {
                return self.last_summary.ok_or(DispatchError::NoActiveSession);
            }
            self.clock.sleep(self.poll_interval);
        }
    }

    fn flush(&mut self) -> (Option<Flush>, Option<SinkNotice>) {
        let Some(session) = self.session.as_mut() else {
            return (None, None);
        };
        if session.batch.is_empty() {
            return (None, None);
        }

        let batch: Vec<[u8; 3]> = session.batch.drain(..).map(|e| e.wire_payload()).collect();
        let count = batch.len();
        session.batches += 1;

        let available = self.sink.is_available();
        let result = if available {
            self.sink.send_batch(&batch)
        } else {
            Err(SinkError::Unavailable)
        };

        let (flush, available) = match result {
            Ok(()) => {
                session.delivered += count;
                tracing::debug!("Flushed {} event(s) at cursor {}", count, session.cursor);
                (Flush::Delivered(count), true)
            }
            Err(SinkError::Unavailable) => {
                session.undelivered += count;
                (Flush::Undelivered(count), false)
            }
            Err(SinkError::Send { sent, message }) => {
                let sent = sent.min(count);
                session.delivered += sent;
                session.undelivered += count - sent;
                tracing::warn!("Dropped {} of {} in batch: {}", count - sent, count, message);
                (Flush::Failed(count - sent), true)
            }
            Err(e) => {
                session.undelivered += count;
                tracing::warn!("Dropped batch of {}: {}", count, e);
                (Flush::Failed(count), true)
            }
        };

        let notice = match (self.sink_available, available) {
            (Some(false), true) => Some(SinkNotice::Restored),
            (None | Some(true), false) => Some(SinkNotice::Unavailable),
            _ => None,
        };
        match notice {
            Some(SinkNotice::Unavailable) => {
                tracing::warn!("No MIDI output selected; events will not be delivered")
            }
            Some(SinkNotice::Restored) => tracing::info!("MIDI output available again"),
            None => {}
        }
        self.sink_available = Some(available);

        (Some(flush), notice)
    }

    fn finish(&mut self, end: SessionEnd) -> SessionSummary {
        let summary = match self.session.take() {
            Some(session) => {
                let summary = session.summary(end);
                match end {
                    SessionEnd::Finished => tracing::info!(
                        "Playback finished: {} delivered, {} undelivered in {} batch(es)",
                        summary.delivered,
                        summary.undelivered,
                        summary.batches
                    ),
                    SessionEnd::Cancelled => tracing::info!(
                        "Playback cancelled after {} event(s)",
                        summary.cursor
                    ),
                }
                summary
            }
            None => SessionSummary {
                end,
                delivered: 0,
                undelivered: 0,
                batches: 0,
                cursor: 0,
                rejected: 0,
                late_dropped: 0,
            },
        };
        self.state = DispatcherState::Idle;
        self.last_summary = Some(summary);
        summary
    }
}
