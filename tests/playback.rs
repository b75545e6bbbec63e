use std::time::Duration;

use assert_approx_eq::assert_approx_eq;
use midicue::engine::{EngineUpdate, spawn_engine, spawn_engine_with_clock};
use midicue::timing::{
    ChannelSource, EventSource, LazySource, PrecomputedSource, ReleasePolicy,
    SparseTimingRecord, Tempo, TimeSignature, schedule_records,
};
use midicue::{
    CancelToken, DispatchError, Dispatcher, ManualClock, MemorySink, Performance, PlaybackConfig,
    ScheduleMode, SessionEnd, SinkNotice, SystemClock,
};

const WAIT: Duration = Duration::from_secs(5);

fn tempo() -> Tempo {
    Tempo::new(120, TimeSignature::COMMON).unwrap()
}

fn phrase() -> Vec<SparseTimingRecord> {
    vec![
        SparseTimingRecord::new("C4", 100).measure(1).beat(1),
        SparseTimingRecord::new("Sustain", 100),
        SparseTimingRecord::new("E4", 80).quarter_sub(3),
        SparseTimingRecord::new("G4", 60).beat(2),
        SparseTimingRecord::new("Banjo", 60).beat(3),
        SparseTimingRecord::new("C5", 100).beat(3).sixteenth_sub(5),
        SparseTimingRecord::new("Sustain", 0).measure(2),
    ]
}

fn play_to_end(source: impl EventSource + Send + 'static) -> Vec<Vec<[u8; 3]>> {
    let sink = MemorySink::new();
    let mut dispatcher =
        Dispatcher::new(ManualClock::new(), sink.clone(), Duration::from_millis(5));
    dispatcher.start(tempo(), source, CancelToken::new()).unwrap();
    let summary = dispatcher.run(|_| {}).unwrap();
    assert_eq!(summary.end, SessionEnd::Finished);
    assert_eq!(summary.rejected, 1);
    sink.batches()
}

#[test]
fn lazy_and_precomputed_deliver_identical_batches() {
    for release in [
        ReleasePolicy::EmitOnce,
        ReleasePolicy::AutoRelease { hold_ms: 120 },
    ] {
        let precomputed = PrecomputedSource::new(schedule_records(&phrase(), tempo(), 0, release));
        let lazy = LazySource::new(phrase(), tempo(), 0, release);

        let expected = play_to_end(precomputed);
        assert!(!expected.is_empty());
        assert_eq!(play_to_end(lazy), expected);
    }
}

#[test]
fn auto_release_follows_each_note_on() {
    let records = vec![
        SparseTimingRecord::new("C4", 100),
        SparseTimingRecord::new("C4", 100).beat(2),
        SparseTimingRecord::new("Sustain", 100).beat(3),
    ];
    let schedule = schedule_records(
        &records,
        tempo(),
        0,
        ReleasePolicy::AutoRelease { hold_ms: 500 },
    );

    let wire: Vec<[u8; 3]> = schedule.events.iter().map(|e| e.wire_payload()).collect();
    assert_eq!(
        wire,
        vec![
            [0x90, 60, 127],
            [0x80, 60, 0],
            [0x90, 60, 127],
            [0x80, 60, 0],
            [0xB0, 64, 127],
        ]
    );
    let offsets: Vec<f64> = schedule.events.iter().map(|e| e.offset_seconds).collect();
    assert_approx_eq!(offsets[0], 0.0);
    assert_approx_eq!(offsets[1], 0.5);
    assert_approx_eq!(offsets[2], 0.5);
    assert_approx_eq!(offsets[3], 1.0);
    assert_approx_eq!(offsets[4], 1.0);
}

#[test]
fn streamed_events_from_a_slow_producer() {
    let schedule = schedule_records(&phrase()[..4], tempo(), 0, ReleasePolicy::EmitOnce);
    let expected: Vec<[u8; 3]> = schedule.events.iter().map(|e| e.wire_payload()).collect();
    let (sender, source) = ChannelSource::bounded(1);

    let producer = std::thread::spawn(move || {
        for mut event in schedule.events {
            std::thread::sleep(Duration::from_millis(15));
            event.offset_seconds /= 20.0;
            if sender.send(event).is_err() {
                return;
            }
        }
    });

    let sink = MemorySink::new();
    let mut dispatcher =
        Dispatcher::new(SystemClock::new(), sink.clone(), Duration::from_millis(1));
    dispatcher.start(tempo(), source, CancelToken::new()).unwrap();
    let summary = dispatcher.run(|_| {}).unwrap();
    producer.join().unwrap();

    assert_eq!(summary.end, SessionEnd::Finished);
    assert_eq!(summary.delivered, expected.len());
    assert_eq!(summary.late_dropped, 0);
    assert_eq!(sink.messages(), expected);
}

#[test]
fn streamed_event_behind_the_cursor_is_dropped() {
    let schedule = schedule_records(&phrase()[..2], tempo(), 0, ReleasePolicy::EmitOnce);
    let (sender, source) = ChannelSource::bounded(4);
    let mut late = schedule.events[0].clone();
    let mut on_time = schedule.events[1].clone();
    on_time.offset_seconds = 0.5;
    late.offset_seconds = 0.1;
    sender.send(on_time).unwrap();
    sender.send(late).unwrap();
    drop(sender);

    let clock = ManualClock::new();
    let sink = MemorySink::new();
    let mut dispatcher = Dispatcher::new(clock.clone(), sink.clone(), Duration::from_millis(1));
    dispatcher.start(tempo(), source, CancelToken::new()).unwrap();

    clock.set_secs(1.0);
    dispatcher.tick().unwrap();
    let summary = dispatcher.last_summary().unwrap();
    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.late_dropped, 1);
    assert_eq!(sink.messages(), vec![[0xB0, 64, 127]]);
}

#[test]
fn unavailable_sink_notifies_once_per_transition() {
    let clock = ManualClock::new();
    let sink = MemorySink::new();
    sink.set_available(false);
    let mut dispatcher = Dispatcher::new(clock.clone(), sink.clone(), Duration::from_millis(1));
    let source = PrecomputedSource::new(schedule_records(
        &phrase(),
        tempo(),
        0,
        ReleasePolicy::EmitOnce,
    ));
    dispatcher.start(tempo(), source, CancelToken::new()).unwrap();

    let mut notices = Vec::new();
    for step in 0..=50 {
        clock.set_secs(step as f64 * 0.05);
        if step == 20 {
            sink.set_available(true);
        }
        let report = dispatcher.tick().unwrap();
        notices.extend(report.notice);
        if dispatcher.is_idle() {
            break;
        }
    }

    assert_eq!(notices, vec![SinkNotice::Unavailable, SinkNotice::Restored]);
    let summary = dispatcher.last_summary().unwrap();
    assert_eq!(summary.end, SessionEnd::Finished);
    assert_eq!(summary.delivered + summary.undelivered, 6);
    assert!(summary.undelivered > 0);
    assert_eq!(sink.messages().len(), summary.delivered);
}

#[test]
fn engine_plays_lazily_from_collaborator_json() {
    let json = r#"{
        "bpm": 240,
        "dsl": [
            {"measure": 1, "beat": 1, "event": "A3", "value": 50},
            {"beat_div4": 2, "event": "Modulation", "value": 100},
            {"beat": 2, "event": "A4", "value": 100}
        ]
    }"#;
    let performance = Performance::from_json(json).unwrap();
    let config = PlaybackConfig {
        channel: 2,
        mode: ScheduleMode::Lazy,
        release: ReleasePolicy::AutoRelease { hold_ms: 100 },
        ..Default::default()
    };
    let sink = MemorySink::new();
    let engine_sink = sink.clone();
    let engine = spawn_engine_with_clock(config, ManualClock::new(), move || engine_sink);

    engine.play(performance);
    let summary = loop {
        if let EngineUpdate::Finished(summary) = engine.update_rx.recv_timeout(WAIT).unwrap() {
            break summary;
        }
    };
    engine.shutdown();

    assert_eq!(summary.end, SessionEnd::Finished);
    assert_eq!(
        sink.messages(),
        vec![
            [0x92, 57, 64],
            [0xB2, 1, 127],
            [0x82, 57, 0],
            [0x92, 69, 127],
            [0x82, 69, 0],
        ]
    );
}

#[test]
fn engine_rejects_second_play_and_cancels() {
    let mut performance = Performance::new(
        60,
        TimeSignature::COMMON,
        vec![
            SparseTimingRecord::new("C4", 100),
            SparseTimingRecord::new("C5", 100).measure(50),
        ],
    );
    performance.key = Some("C major".to_string());
    let sink = MemorySink::new();
    let engine_sink = sink.clone();
    let engine = spawn_engine(PlaybackConfig::default(), move || engine_sink);

    engine.play(performance.clone());
    engine.play(performance);

    let mut rejected = false;
    let summary = loop {
        match engine.update_rx.recv_timeout(WAIT).unwrap() {
            EngineUpdate::Rejected(DispatchError::SessionActive) => {
                rejected = true;
                engine.cancel();
            }
            EngineUpdate::Finished(summary) => break summary,
            _ => {}
        }
    };
    engine.shutdown();

    assert!(rejected);
    assert_eq!(summary.end, SessionEnd::Cancelled);
    assert!(summary.delivered <= 1);
    assert!(!sink.messages().contains(&[0x90, 72, 127]));
}
