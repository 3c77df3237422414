//! Single-line controllers for the reset and mode-select outputs.
//!
//! Both controllers are thin: they translate logical requests into physical
//! levels and tag I/O failures with the line they came from. Coordination
//! between the two lives in [`crate::sequencer`].

use embedded_hal::delay::DelayNs;

use crate::config::ResetPolarity;
use crate::error::ResetError;
use crate::line::{DigitalLine, LineId};

/// Owns the reset output and knows which level holds the target in reset.
pub struct ResetLine<L> {
    line: L,
    polarity: ResetPolarity,
}

impl<L: DigitalLine> ResetLine<L> {
    pub const fn new(line: L, polarity: ResetPolarity) -> Self {
        Self { line, polarity }
    }

    /// Drives the line to the asserted level.
    ///
    /// # Errors
    ///
    /// Returns [`ResetError::Hardware`] when the line write fails.
    pub fn assert(&self) -> Result<(), ResetError<L::Error>> {
        self.line
            .set_level(self.polarity.asserted_level())
            .map_err(ResetError::hardware(LineId::Reset))
    }

    /// Drives the line to the deasserted level.
    ///
    /// # Errors
    ///
    /// Returns [`ResetError::Hardware`] when the line write fails.
    pub fn deassert(&self) -> Result<(), ResetError<L::Error>> {
        self.line
            .set_level(self.polarity.deasserted_level())
            .map_err(ResetError::hardware(LineId::Reset))
    }

    /// Reports whether the target is currently held in reset.
    ///
    /// # Errors
    ///
    /// Returns [`ResetError::Hardware`] when the line read fails.
    pub fn status(&self) -> Result<bool, ResetError<L::Error>> {
        self.line
            .level()
            .map(|high| high == self.polarity.asserted_level())
            .map_err(ResetError::hardware(LineId::Reset))
    }

    /// Asserts reset, holds it for `duration_ms`, then releases it.
    ///
    /// `on_edge` observes each completed transition (`true` for assert).
    ///
    /// # Errors
    ///
    /// A failed assert is a [`ResetError::Hardware`]; a failed release after a
    /// successful assert is a [`ResetError::PartialSequence`].
    pub fn pulse<D, F>(
        &self,
        delay: &mut D,
        duration_ms: u32,
        mut on_edge: F,
    ) -> Result<(), ResetError<L::Error>>
    where
        D: DelayNs,
        F: FnMut(bool),
    {
        self.assert()?;
        on_edge(true);

        delay.delay_ms(duration_ms);

        self.line
            .set_level(self.polarity.deasserted_level())
            .map_err(|source| ResetError::PartialSequence { source })?;
        on_edge(false);
        Ok(())
    }

    pub fn into_line(self) -> L {
        self.line
    }
}

/// Owns the mode-select output sampled by the target while in reset.
pub struct ModeSelect<L> {
    line: L,
}

impl<L: DigitalLine> ModeSelect<L> {
    /// Idle level; the target boots its application.
    pub const NORMAL_LEVEL: bool = true;
    /// Level that makes the target boot into its ISP loader.
    pub const PROGRAMMING_LEVEL: bool = !Self::NORMAL_LEVEL;

    pub const fn new(line: L) -> Self {
        Self { line }
    }

    /// # Errors
    ///
    /// Returns [`ResetError::Hardware`] when the line write fails.
    pub fn enter_programming_level(&self) -> Result<(), ResetError<L::Error>> {
        self.line
            .set_level(Self::PROGRAMMING_LEVEL)
            .map_err(ResetError::hardware(LineId::ModeSelect))
    }

    /// # Errors
    ///
    /// Returns [`ResetError::Hardware`] when the line write fails.
    pub fn restore_normal_level(&self) -> Result<(), ResetError<L::Error>> {
        self.line
            .set_level(Self::NORMAL_LEVEL)
            .map_err(ResetError::hardware(LineId::ModeSelect))
    }

    pub fn into_line(self) -> L {
        self.line
    }
}
