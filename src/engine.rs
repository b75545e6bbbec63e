use crossbeam::channel::{Receiver, Sender, TryRecvError};

use crate::clock::{Clock, SystemClock};
use crate::config::{PlaybackConfig, ScheduleMode};
use crate::dispatcher::{
    CancelToken, Dispatcher, DispatcherState, SessionSummary, SinkNotice, TickReport,
};
use crate::error::{DispatchError, ValidationError};
use crate::sink::MidiSink;
use crate::timing::{EventSource, LazySource, PrecomputedSource, Tempo, schedule_records};
use crate::Performance;

#[derive(Debug, Clone)]
pub enum EngineCommand {
    Play(Performance),
    Cancel,
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum EngineUpdate {
    PlaybackState { playing: bool },
    SinkUnavailable,
    SinkRestored,
    /// A command was refused; the engine keeps running.
    Rejected(DispatchError),
    InvalidPerformance(ValidationError),
    Finished(SessionSummary),
}

pub struct EngineHandle {
    pub command_tx: Sender<EngineCommand>,
    pub update_rx: Receiver<EngineUpdate>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl EngineHandle {
    pub fn play(&self, performance: Performance) {
        let _ = self.command_tx.send(EngineCommand::Play(performance));
    }

    pub fn cancel(&self) {
        let _ = self.command_tx.send(EngineCommand::Cancel);
    }

    /// Stops the engine thread, cancelling any session, and waits for it to exit.
    pub fn shutdown(mut self) {
        let _ = self.command_tx.send(EngineCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Spawns the timing thread on the wall clock.
///
/// The sink is built on the engine thread, so device handles that can't
/// cross threads are fine.
pub fn spawn_engine<S, F>(config: PlaybackConfig, make_sink: F) -> EngineHandle
where
    S: MidiSink + 'static,
    F: FnOnce() -> S + Send + 'static,
{
    spawn_engine_with_clock(config, SystemClock::new(), make_sink)
}

pub fn spawn_engine_with_clock<C, S, F>(
    config: PlaybackConfig,
    clock: C,
    make_sink: F,
) -> EngineHandle
where
    C: Clock + Send + 'static,
    S: MidiSink + 'static,
    F: FnOnce() -> S + Send + 'static,
{
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();

    let thread = std::thread::spawn(move || {
        let dispatcher = Dispatcher::new(clock, make_sink(), config.poll_interval());
        engine_thread(EngineState::new(dispatcher, config), command_rx, update_tx);
    });

    EngineHandle {
        command_tx,
        update_rx,
        thread: Some(thread),
    }
}

struct EngineState<C: Clock, S: MidiSink> {
    dispatcher: Dispatcher<C, S>,
    config: PlaybackConfig,
    cancel: Option<CancelToken>,
}

impl<C: Clock, S: MidiSink> EngineState<C, S> {
    fn new(dispatcher: Dispatcher<C, S>, config: PlaybackConfig) -> Self {
        Self {
            dispatcher,
            config,
            cancel: None,
        }
    }

    fn source_for(&self, performance: Performance, tempo: Tempo) -> Box<dyn EventSource + Send> {
        let channel = self.config.channel;
        let release = self.config.release;
        match self.config.mode {
            ScheduleMode::Precomputed => Box::new(PrecomputedSource::new(schedule_records(
                &performance.events,
                tempo,
                channel,
                release,
            ))),
            ScheduleMode::Lazy => {
                Box::new(LazySource::new(performance.events, tempo, channel, release))
            }
        }
    }

    fn play(&mut self, performance: Performance, update_tx: &Sender<EngineUpdate>) {
        if !self.dispatcher.is_idle() {
            let _ = update_tx.send(EngineUpdate::Rejected(DispatchError::SessionActive));
            return;
        }

        if let Some(key) = &performance.key {
            tracing::info!(
                "Playing in {} ({})",
                key,
                performance.style.as_deref().unwrap_or("no style given")
            );
        }
        if !performance.chord_progression.is_empty() {
            tracing::info!("Chords: {}", performance.chord_progression.join(" - "));
        }

        let tempo = match performance.tempo() {
            Ok(tempo) => tempo,
            Err(e) => {
                let _ = update_tx.send(EngineUpdate::InvalidPerformance(e));
                return;
            }
        };
        let source = self.source_for(performance, tempo);

        let cancel = CancelToken::new();
        match self.dispatcher.start(tempo, source, cancel.clone()) {
            Ok(()) => {
                self.cancel = Some(cancel);
                let _ = update_tx.send(EngineUpdate::PlaybackState { playing: true });
            }
            Err(e) => {
                let _ = update_tx.send(EngineUpdate::Rejected(e));
            }
        }
    }

    fn cancel(&mut self, update_tx: &Sender<EngineUpdate>) {
        match &self.cancel {
            Some(cancel) if !self.dispatcher.is_idle() => cancel.cancel(),
            _ => {
                let _ = update_tx.send(EngineUpdate::Rejected(DispatchError::NoActiveSession));
            }
        }
    }

    fn report(&mut self, report: &TickReport, update_tx: &Sender<EngineUpdate>) {
        match report.notice {
            Some(SinkNotice::Unavailable) => {
                let _ = update_tx.send(EngineUpdate::SinkUnavailable);
            }
            Some(SinkNotice::Restored) => {
                let _ = update_tx.send(EngineUpdate::SinkRestored);
            }
            None => {}
        }

        if report.state == DispatcherState::Idle {
            self.cancel = None;
            if let Some(summary) = self.dispatcher.last_summary() {
                let _ = update_tx.send(EngineUpdate::Finished(summary));
            }
            let _ = update_tx.send(EngineUpdate::PlaybackState { playing: false });
        }
    }
}

/// Blocks on commands while idle. While a session runs, commands are drained
/// between ticks and the poll interval sleep is the only wait.
fn engine_thread<C: Clock, S: MidiSink>(
    mut state: EngineState<C, S>,
    command_rx: Receiver<EngineCommand>,
    update_tx: Sender<EngineUpdate>,
) {
    loop {
        let command = if state.dispatcher.is_idle() {
            match command_rx.recv() {
                Ok(command) => Some(command),
                Err(crossbeam::channel::RecvError) => break,
            }
        } else {
            match command_rx.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(EngineCommand::Shutdown),
            }
        };

        match command {
            Some(EngineCommand::Play(performance)) => state.play(performance, &update_tx),
            Some(EngineCommand::Cancel) => state.cancel(&update_tx),
            Some(EngineCommand::Shutdown) => {
                if let Ok(summary) = state.dispatcher.cancel() {
                    let _ = update_tx.send(EngineUpdate::Finished(summary));
                    let _ = update_tx.send(EngineUpdate::PlaybackState { playing: false });
                }
                tracing::debug!("Engine shutting down");
                break;
            }
            None => {}
        }

        if state.dispatcher.is_idle() {
            continue;
        }

        match state.dispatcher.tick() {
            Ok(report) => {
                state.report(&report, &update_tx);
                if report.state != DispatcherState::Idle {
                    let interval = state.dispatcher.poll_interval();
                    state.dispatcher.clock().sleep(interval);
                }
            }
            Err(e) => tracing::warn!("Tick failed: {}", e),
        }
    }
}
