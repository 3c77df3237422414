//! Digital output lines consumed by the reset controller.
//!
//! The backend owning the physical pins (a GPIO character device, an MCU port,
//! or the host simulator) implements [`LineProvider`] and hands out
//! [`DigitalLine`] handles. Handles are moved back into the provider on
//! release, so a released line can no longer be read or written.

use core::fmt;

/// Identifier for the two lines this controller drives.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineId {
    Reset,
    ModeSelect,
}

impl LineId {
    /// Name used when acquiring the line from the provider.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            LineId::Reset => "reset",
            LineId::ModeSelect => "isp",
        }
    }

}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}


/// Handle to one acquired physical output.
///
/// Methods take `&self` so status reads can run while another caller holds the
/// sequencing lock; implementations provide their own interior mutability.
pub trait DigitalLine {
    type Error: fmt::Debug;

    /// Configures the line as an output driving `high`.
    ///
    /// # Errors
    ///
    /// Returns the backend error when the pin cannot be switched to output.
    fn set_output(&self, high: bool) -> Result<(), Self::Error>;

    /// Drives the line to `high`.
    ///
    /// # Errors
    ///
    /// Returns the backend error when the write does not reach the pin.
    fn set_level(&self, high: bool) -> Result<(), Self::Error>;

    /// Reads back the current line level.
    ///
    /// # Errors
    ///
    /// Returns the backend error when the level cannot be read.
    fn level(&self) -> Result<bool, Self::Error>;
}

/// Source of named output lines for a single device instance.
pub trait LineProvider {
    type Line: DigitalLine;
    type Error: fmt::Debug;

    /// Acquires the line registered under `name`, driving `initial_high`.
    ///
    /// # Errors
    ///
    /// Returns the provider error when the line is unknown or already held.
    fn acquire(&mut self, name: &'static str, initial_high: bool)
    -> Result<Self::Line, Self::Error>;

    /// Returns a previously acquired line to the provider.
    fn release(&mut self, line: Self::Line);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_names_match_acquisition_keys() {
        assert_eq!(LineId::Reset.name(), "reset");
        assert_eq!(LineId::ModeSelect.name(), "isp");
    }
}
