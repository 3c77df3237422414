//! Serialized reset and ISP-entry sequences.
//!
//! The sequencer composes the reset and mode-select controllers. A single
//! blocking mutex per instance guards every operation that drives a line, so
//! two sequences never interleave their transitions: a second caller blocks on
//! the mutex until the first sequence has run to completion or failed. The
//! raw mutex flavour is chosen by the integration (a std mutex per instance on
//! hosts, thread-mode on the firmware).
//!
//! Status and mode queries skip the mutex; each reads a single line or flag.

use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::delay::DelayNs;
use portable_atomic::{AtomicBool, Ordering};

use crate::contract::ResetControllerHandle;
use crate::controller::{ModeSelect, ResetLine};
use crate::error::ResetError;
use crate::line::{DigitalLine, LineId};
use crate::telemetry::{TelemetryEventKind, TelemetryRecorder};

/// Composite operations run under the sequencing lock.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequenceKind {
    PlainReset,
    IspEntry,
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SequenceKind::PlainReset => "plain-reset",
            SequenceKind::IspEntry => "isp-entry",
        })
    }
}

/// State that is only touched while the lock is held.
struct SequencerState<D> {
    delay: D,
    telemetry: TelemetryRecorder,
}

pub struct ResetSequencer<M: RawMutex, L, D> {
    handle: ResetControllerHandle,
    reset: ResetLine<L>,
    mode: ModeSelect<L>,
    duration_ms: u32,
    in_isp_mode: AtomicBool,
    state: Mutex<M, RefCell<SequencerState<D>>>,
}

impl<M, L, D> ResetSequencer<M, L, D>
where
    M: RawMutex,
    L: DigitalLine,
    D: DelayNs,
{
    pub fn new(
        handle: ResetControllerHandle,
        reset: ResetLine<L>,
        mode: ModeSelect<L>,
        duration_ms: u32,
        delay: D,
    ) -> Self {
        Self {
            handle,
            reset,
            mode,
            duration_ms,
            in_isp_mode: AtomicBool::new(false),
            state: Mutex::new(RefCell::new(SequencerState {
                delay,
                telemetry: TelemetryRecorder::new(),
            })),
        }
    }

    /// Identity the reset contract is published under; contract ids are
    /// resolved against it.
    #[must_use]
    pub fn handle(&self) -> &ResetControllerHandle {
        &self.handle
    }

    /// Hold time applied to every reset pulse.
    pub fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    /// Returns `true` once an ISP-entry sequence has completed and no plain
    /// reset has run since.
    pub fn in_isp_mode(&self) -> bool {
        self.in_isp_mode.load(Ordering::Acquire)
    }

    /// Reports whether the reset line currently reads back as asserted.
    ///
    /// # Errors
    ///
    /// Returns [`ResetError::Hardware`] when the line read fails.
    pub fn is_held_in_reset(&self) -> Result<bool, ResetError<L::Error>> {
        self.reset.status()
    }

    /// Asserts reset and leaves it asserted.
    ///
    /// # Errors
    ///
    /// Returns [`ResetError::Hardware`] when the line write fails.
    pub fn assert_reset(&self) -> Result<(), ResetError<L::Error>> {
        self.with_state(|state| {
            self.reset.assert()?;
            state.telemetry.record_line(LineId::Reset, true);
            Ok(())
        })
    }

    /// Releases reset.
    ///
    /// # Errors
    ///
    /// Returns [`ResetError::Hardware`] when the line write fails.
    pub fn deassert_reset(&self) -> Result<(), ResetError<L::Error>> {
        self.with_state(|state| {
            self.reset.deassert()?;
            state.telemetry.record_line(LineId::Reset, false);
            Ok(())
        })
    }

    /// Pulses reset for the configured duration and returns the target to
    /// normal boot, clearing the ISP flag.
    ///
    /// # Errors
    ///
    /// Propagates the first failing line operation; the ISP flag is left
    /// untouched in that case.
    pub fn plain_reset(&self) -> Result<(), ResetError<L::Error>> {
        self.run(SequenceKind::PlainReset, |state| {
            self.cycle(state)?;
            self.in_isp_mode.store(false, Ordering::Release);
            Ok(())
        })
    }

    /// Resets the target with mode-select held at the programming level so it
    /// boots into its ISP loader.
    ///
    /// Mode-select is driven before reset asserts and restored only after
    /// reset releases; the target latches it while held in reset.
    ///
    /// # Errors
    ///
    /// Aborts at the first failing line operation without attempting to undo
    /// earlier steps; the ISP flag is left untouched in that case.
    pub fn enter_isp(&self) -> Result<(), ResetError<L::Error>> {
        self.run(SequenceKind::IspEntry, |state| {
            self.mode.enter_programming_level()?;
            state.telemetry.record_line(LineId::ModeSelect, true);

            self.cycle(state)?;

            self.mode.restore_normal_level()?;
            state.telemetry.record_line(LineId::ModeSelect, false);

            self.in_isp_mode.store(true, Ordering::Release);
            Ok(())
        })
    }

    /// Runs `f` against the telemetry history.
    ///
    /// Blocks while a sequence is in flight.
    pub fn with_telemetry<R>(&self, f: impl FnOnce(&TelemetryRecorder) -> R) -> R {
        self.state.lock(|state| f(&state.borrow().telemetry))
    }

    /// Tears the sequencer down, returning the reset and mode-select lines.
    pub fn into_lines(self) -> (L, L) {
        (self.reset.into_line(), self.mode.into_line())
    }

    fn run<F>(&self, kind: SequenceKind, body: F) -> Result<(), ResetError<L::Error>>
    where
        F: FnOnce(&mut SequencerState<D>) -> Result<(), ResetError<L::Error>>,
    {
        self.with_state(|state| {
            state
                .telemetry
                .record(TelemetryEventKind::SequenceStarted(kind));
            #[cfg(feature = "defmt")]
            defmt::info!("sequencer: {} started", kind);

            let result = body(&mut *state);

            match &result {
                Ok(()) => {
                    state
                        .telemetry
                        .record(TelemetryEventKind::SequenceComplete(kind));
                    #[cfg(feature = "defmt")]
                    defmt::info!("sequencer: {} complete", kind);
                }
                Err(_) => {
                    state
                        .telemetry
                        .record(TelemetryEventKind::SequenceFailed(kind));
                    #[cfg(feature = "defmt")]
                    defmt::warn!("sequencer: {} failed", kind);
                }
            }

            result
        })
    }

    fn cycle(&self, state: &mut SequencerState<D>) -> Result<(), ResetError<L::Error>> {
        let SequencerState { delay, telemetry } = state;
        self.reset.pulse(delay, self.duration_ms, |asserted| {
            telemetry.record_line(LineId::Reset, asserted);
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SequencerState<D>) -> R) -> R {
        self.state.lock(|state| f(&mut state.borrow_mut()))
    }
}
