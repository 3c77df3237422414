mod support;

use std::thread;
use std::time::{Duration, Instant};

use reset_core::config::{ASSERTED_STATE_PROPERTY, DURATION_MS_PROPERTY};
use reset_core::telemetry::TelemetryEventKind;
use reset_core::{LineId, PropertyValue, ResetControl, ResetError, SequenceKind};
use support::{Bench, BenchError, RecordingDelay, RecordingRegistrar, ThreadDelay, attach};

const RESET: &str = "reset";
const ISP: &str = "isp";

#[test]
fn assert_and_deassert_are_reflected_by_status() {
    let bench = Bench::new();
    let mut registrar = RecordingRegistrar::default();
    let device = attach(&bench, &mut registrar, &[], RecordingDelay::default());
    let control = device.sequencer();

    assert!(!control.status(0).unwrap(), "attach leaves reset released");

    control.assert(0).unwrap();
    assert!(control.status(0).unwrap());
    assert_eq!(bench.level(RESET), Some(true), "active-high by default");

    control.deassert(0).unwrap();
    assert!(!control.status(0).unwrap());
    assert_eq!(bench.level(RESET), Some(false));
}

#[test]
fn active_low_polarity_inverts_physical_levels() {
    let bench = Bench::new();
    let mut registrar = RecordingRegistrar::default();
    let properties = [(ASSERTED_STATE_PROPERTY, PropertyValue::U32(0))];
    let device = attach(&bench, &mut registrar, &properties, RecordingDelay::default());

    assert_eq!(bench.level(RESET), Some(true), "released level is high");

    device.sequencer().assert(0).unwrap();
    assert_eq!(bench.level(RESET), Some(false));
    assert!(device.sequencer().status(0).unwrap());
}

#[test]
fn reset_holds_for_configured_duration() {
    let bench = Bench::new();
    let mut registrar = RecordingRegistrar::default();
    let properties = [
        (DURATION_MS_PROPERTY, PropertyValue::U32(500)),
        (ASSERTED_STATE_PROPERTY, PropertyValue::Flag),
    ];
    let device = attach(&bench, &mut registrar, &properties, ThreadDelay);

    let started = Instant::now();
    device.sequencer().reset(0).unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(500), "returned after {elapsed:?}");
    assert!(!device.sequencer().status(0).unwrap());

    let trace = bench.trace();
    assert_eq!(
        bench.levels_written(),
        [(RESET, true), (RESET, false)],
        "one assert/deassert pair"
    );
    let held = trace[1].at.duration_since(trace[0].at);
    assert!(held >= Duration::from_millis(500), "held for {held:?}");
}

#[test]
fn reset_uses_default_duration_without_properties() {
    let bench = Bench::new();
    let mut registrar = RecordingRegistrar::default();
    let delay = RecordingDelay::default();
    let device = attach(&bench, &mut registrar, &[], delay.clone());

    device.sequencer().reset(0).unwrap();

    assert_eq!(delay.total_ms(), 2_000);
    assert_eq!(device.sequencer().duration_ms(), 2_000);
}

#[test]
fn isp_entry_latches_programming_level_across_reset() {
    let bench = Bench::new();
    let mut registrar = RecordingRegistrar::default();
    let delay = RecordingDelay::default();
    let properties = [(DURATION_MS_PROPERTY, PropertyValue::U32(25))];
    let device = attach(&bench, &mut registrar, &properties, delay.clone());

    assert!(!device.sequencer().in_isp_mode());
    device.sequencer().enter_isp().unwrap();

    assert_eq!(
        bench.levels_written(),
        [(ISP, false), (RESET, true), (RESET, false), (ISP, true)]
    );
    assert_eq!(delay.total_ms(), 25);
    assert!(device.sequencer().in_isp_mode());
    assert_eq!(bench.level(ISP), Some(true), "mode-select back at normal level");
}

#[test]
fn plain_reset_clears_isp_flag() {
    let bench = Bench::new();
    let mut registrar = RecordingRegistrar::default();
    let device = attach(&bench, &mut registrar, &[], RecordingDelay::default());

    device.sequencer().enter_isp().unwrap();
    assert!(device.sequencer().in_isp_mode());

    device.sequencer().plain_reset().unwrap();
    assert!(!device.sequencer().in_isp_mode());
}

#[test]
fn contract_assert_does_not_touch_isp_flag() {
    let bench = Bench::new();
    let mut registrar = RecordingRegistrar::default();
    let device = attach(&bench, &mut registrar, &[], RecordingDelay::default());

    device.sequencer().enter_isp().unwrap();
    device.sequencer().assert(0).unwrap();
    device.sequencer().deassert(0).unwrap();

    assert!(device.sequencer().in_isp_mode());
}

#[test]
fn failed_release_leaves_target_held_and_flag_unchanged() {
    let bench = Bench::new();
    let mut registrar = RecordingRegistrar::default();
    let device = attach(&bench, &mut registrar, &[], RecordingDelay::default());

    bench.fail_write(RESET, false);
    let error = device.sequencer().enter_isp().unwrap_err();

    assert_eq!(
        error,
        ResetError::PartialSequence {
            source: BenchError::Injected
        }
    );
    assert!(!device.sequencer().in_isp_mode());
    assert!(device.sequencer().status(0).unwrap(), "reset still asserted");
    assert_eq!(
        bench.level(ISP),
        Some(false),
        "mode-select is not restored after a failed sequence"
    );

    bench.clear_faults();
    device.sequencer().reset(0).unwrap();
    assert!(!device.sequencer().status(0).unwrap(), "a retry recovers");
}

#[test]
fn failed_mode_select_aborts_before_reset() {
    let bench = Bench::new();
    let mut registrar = RecordingRegistrar::default();
    let device = attach(&bench, &mut registrar, &[], RecordingDelay::default());

    bench.fail_write(ISP, false);
    let error = device.sequencer().enter_isp().unwrap_err();

    assert_eq!(
        error,
        ResetError::Hardware {
            line: LineId::ModeSelect,
            source: BenchError::Injected
        }
    );
    assert!(bench.levels_written().is_empty(), "reset never asserted");
}

#[test]
fn unknown_reset_id_is_rejected_without_line_activity() {
    let bench = Bench::new();
    let mut registrar = RecordingRegistrar::default();
    let device = attach(&bench, &mut registrar, &[], RecordingDelay::default());
    let control = device.sequencer();

    assert_eq!(control.assert(1), Err(ResetError::UnknownResetId(1)));
    assert_eq!(control.reset(7), Err(ResetError::UnknownResetId(7)));
    assert_eq!(control.status(2), Err(ResetError::UnknownResetId(2)));
    assert!(bench.levels_written().is_empty());
}

#[test]
fn concurrent_sequences_never_interleave() {
    let bench = Bench::new();
    let mut registrar = RecordingRegistrar::default();
    let properties = [(DURATION_MS_PROPERTY, PropertyValue::U32(20))];
    let device = attach(&bench, &mut registrar, &properties, ThreadDelay);

    thread::scope(|scope| {
        for worker in 0..4 {
            let device = &device;
            scope.spawn(move || {
                for _ in 0..3 {
                    if worker % 2 == 0 {
                        device.sequencer().reset(0).unwrap();
                    } else {
                        device.sequencer().enter_isp().unwrap();
                    }
                }
            });
        }
    });

    let written = bench.levels_written();
    let mut rest = written.as_slice();
    let mut resets = 0;
    let mut isp_entries = 0;
    while !rest.is_empty() {
        match rest {
            [(RESET, true), (RESET, false), tail @ ..] => {
                resets += 1;
                rest = tail;
            }
            [
                (ISP, false),
                (RESET, true),
                (RESET, false),
                (ISP, true),
                tail @ ..,
            ] => {
                isp_entries += 1;
                rest = tail;
            }
            _ => panic!("interleaved line writes: {written:?}"),
        }
    }
    assert_eq!((resets, isp_entries), (6, 6));
}

#[test]
fn telemetry_brackets_each_sequence() {
    let bench = Bench::new();
    let mut registrar = RecordingRegistrar::default();
    let device = attach(&bench, &mut registrar, &[], RecordingDelay::default());

    device.sequencer().plain_reset().unwrap();

    let events: Vec<TelemetryEventKind> = device
        .sequencer()
        .with_telemetry(|telemetry| telemetry.oldest_first().map(|record| record.event).collect());
    assert_eq!(
        events,
        [
            TelemetryEventKind::SequenceStarted(SequenceKind::PlainReset),
            TelemetryEventKind::LineAsserted(LineId::Reset),
            TelemetryEventKind::LineReleased(LineId::Reset),
            TelemetryEventKind::SequenceComplete(SequenceKind::PlainReset),
        ]
    );

    bench.fail_write(RESET, true);
    assert!(device.sequencer().plain_reset().is_err());
    let last = device
        .sequencer()
        .with_telemetry(|telemetry| telemetry.latest().map(|record| record.event));
    assert_eq!(
        last,
        Some(TelemetryEventKind::SequenceFailed(SequenceKind::PlainReset))
    );
}

#[test]
fn separate_instances_reset_in_parallel() {
    let benches = [Bench::new(), Bench::new()];
    let properties = [(DURATION_MS_PROPERTY, PropertyValue::U32(300))];
    let devices = benches.each_ref().map(|bench| {
        attach(bench, &mut RecordingRegistrar::default(), &properties, ThreadDelay)
    });

    let started = Instant::now();
    thread::scope(|scope| {
        for device in &devices {
            scope.spawn(move || device.sequencer().reset(0).unwrap());
        }
    });
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(300), "returned after {elapsed:?}");
    assert!(
        elapsed < Duration::from_millis(550),
        "instances waited on each other: {elapsed:?}"
    );
}

#[test]
fn status_and_mode_reads_do_not_wait_for_a_running_sequence() {
    let bench = Bench::new();
    let mut registrar = RecordingRegistrar::default();
    let properties = [(DURATION_MS_PROPERTY, PropertyValue::U32(500))];
    let device = attach(&bench, &mut registrar, &properties, ThreadDelay);

    thread::scope(|scope| {
        let sequence = scope.spawn(|| device.sequencer().enter_isp());

        let deadline = Instant::now() + Duration::from_millis(400);
        while bench.level(RESET) != Some(true) {
            assert!(Instant::now() < deadline, "reset never asserted");
            thread::sleep(Duration::from_millis(1));
        }

        let started = Instant::now();
        let held = device.sequencer().status(0).unwrap();
        let in_isp = device.sequencer().in_isp_mode();
        let elapsed = started.elapsed();

        assert!(held, "reset reads back asserted mid-hold");
        assert!(!in_isp, "flag is set only once the sequence completes");
        assert!(
            elapsed < Duration::from_millis(100),
            "reads blocked for {elapsed:?}"
        );

        sequence.join().unwrap().unwrap();
    });

    assert!(device.sequencer().in_isp_mode());
}
