//! Reset-controller contract offered to other components.
//!
//! Consumers address resets by numeric id. This controller manages exactly one
//! resettable line, so [`RESET_ID`] is the only id it accepts.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::delay::DelayNs;

use crate::error::ResetError;
use crate::line::DigitalLine;
use crate::sequencer::ResetSequencer;

/// Opaque reset identifier used by contract consumers.
pub type ResetId = u32;

/// The single reset line exposed by this controller.
pub const RESET_ID: ResetId = 0;

/// Identity registered with the reset framework at attach time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetControllerHandle {
    pub name: &'static str,
    pub nr_resets: u32,
}

impl ResetControllerHandle {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name, nr_resets: 1 }
    }

    /// Returns `true` when `id` addresses a line owned by this controller.
    #[must_use]
    pub const fn owns(&self, id: ResetId) -> bool {
        id < self.nr_resets
    }
}

/// Standard reset-controller operations.
pub trait ResetControl {
    type Error;

    /// # Errors
    ///
    /// [`ResetError::UnknownResetId`] for ids this controller does not own,
    /// otherwise the line failure.
    fn assert(&self, id: ResetId) -> Result<(), ResetError<Self::Error>>;

    /// # Errors
    ///
    /// [`ResetError::UnknownResetId`] for ids this controller does not own,
    /// otherwise the line failure.
    fn deassert(&self, id: ResetId) -> Result<(), ResetError<Self::Error>>;

    /// Returns `true` while the target is held in reset.
    ///
    /// # Errors
    ///
    /// [`ResetError::UnknownResetId`] for ids this controller does not own,
    /// otherwise the read failure.
    fn status(&self, id: ResetId) -> Result<bool, ResetError<Self::Error>>;

    /// Asserts, holds for the configured duration, then deasserts.
    ///
    /// # Errors
    ///
    /// [`ResetError::UnknownResetId`] for ids this controller does not own;
    /// [`ResetError::PartialSequence`] when the release fails after a
    /// successful assert.
    fn reset(&self, id: ResetId) -> Result<(), ResetError<Self::Error>>;
}

fn check_id<E>(handle: &ResetControllerHandle, id: ResetId) -> Result<(), ResetError<E>> {
    if handle.owns(id) {
        Ok(())
    } else {
        Err(ResetError::UnknownResetId(id))
    }
}

impl<M, L, D> ResetControl for ResetSequencer<M, L, D>
where
    M: RawMutex,
    L: DigitalLine,
    D: DelayNs,
{
    type Error = L::Error;

    fn assert(&self, id: ResetId) -> Result<(), ResetError<Self::Error>> {
        check_id(self.handle(), id)?;
        self.assert_reset()
    }

    fn deassert(&self, id: ResetId) -> Result<(), ResetError<Self::Error>> {
        check_id(self.handle(), id)?;
        self.deassert_reset()
    }

    fn status(&self, id: ResetId) -> Result<bool, ResetError<Self::Error>> {
        check_id(self.handle(), id)?;
        self.is_held_in_reset()
    }

    fn reset(&self, id: ResetId) -> Result<(), ResetError<Self::Error>> {
        check_id(self.handle(), id)?;
        self.plain_reset()
    }
}
