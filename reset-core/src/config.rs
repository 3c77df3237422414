//! Device configuration resolved from hardware-description properties.
//!
//! Every property is optional. Absent and malformed values both fall back to
//! the documented defaults without reporting an error, so a sparse or sloppy
//! description still yields a usable controller.

/// Property controlling which physical level means "held in reset".
pub const ASSERTED_STATE_PROPERTY: &str = "asserted-state";
/// Property holding the reset pulse hold time in milliseconds.
pub const DURATION_MS_PROPERTY: &str = "duration-ms";
/// Presence flag requesting a reset pulse during attach.
pub const AUTO_RESET_PROPERTY: &str = "auto";

/// Hold time applied when `duration-ms` is absent or malformed.
pub const DEFAULT_DURATION_MS: u32 = 2_000;

/// Value stored under a property key.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PropertyValue<'a> {
    /// Key present without a value.
    Flag,
    U32(u32),
    Str(&'a str),
}

/// Read-only view over the key/value properties describing one device.
pub trait PropertySource {
    fn property(&self, key: &str) -> Option<PropertyValue<'_>>;
}

impl<'p> PropertySource for [(&'p str, PropertyValue<'p>)] {
    fn property(&self, key: &str) -> Option<PropertyValue<'_>> {
        self.iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| *value)
    }
}

/// Physical level that corresponds to an asserted reset.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetPolarity {
    #[default]
    ActiveHigh,
    ActiveLow,
}

impl ResetPolarity {
    /// Level written to assert reset.
    #[must_use]
    pub const fn asserted_level(self) -> bool {
        matches!(self, ResetPolarity::ActiveHigh)
    }

    /// Level written to release reset.
    #[must_use]
    pub const fn deasserted_level(self) -> bool {
        !self.asserted_level()
    }

    const fn from_asserted_level(high: bool) -> Self {
        if high {
            ResetPolarity::ActiveHigh
        } else {
            ResetPolarity::ActiveLow
        }
    }
}

/// Settings fixed for the lifetime of an attached device.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceConfig {
    pub duration_ms: u32,
    pub asserted_polarity: ResetPolarity,
    pub auto_reset_on_attach: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            duration_ms: DEFAULT_DURATION_MS,
            asserted_polarity: ResetPolarity::ActiveHigh,
            auto_reset_on_attach: false,
        }
    }
}

impl DeviceConfig {
    /// Resolves the configuration, substituting defaults for anything unusable.
    pub fn from_properties<S>(properties: &S) -> Self
    where
        S: PropertySource + ?Sized,
    {
        let defaults = Self::default();

        let duration_ms = properties
            .property(DURATION_MS_PROPERTY)
            .and_then(parse_u32)
            .unwrap_or(defaults.duration_ms);

        let asserted_polarity = properties
            .property(ASSERTED_STATE_PROPERTY)
            .and_then(parse_bool)
            .map_or(defaults.asserted_polarity, ResetPolarity::from_asserted_level);

        let auto_reset_on_attach = properties.property(AUTO_RESET_PROPERTY).is_some();

        Self {
            duration_ms,
            asserted_polarity,
            auto_reset_on_attach,
        }
    }
}

fn parse_u32(value: PropertyValue<'_>) -> Option<u32> {
    match value {
        PropertyValue::U32(value) => Some(value),
        PropertyValue::Str(text) => text.trim().parse().ok(),
        PropertyValue::Flag => None,
    }
}

fn parse_bool(value: PropertyValue<'_>) -> Option<bool> {
    match value {
        PropertyValue::Flag | PropertyValue::U32(1) => Some(true),
        PropertyValue::U32(0) => Some(false),
        PropertyValue::U32(_) => None,
        PropertyValue::Str(text) => {
            let text = text.trim();
            if ["1", "true", "high"]
                .iter()
                .any(|word| text.eq_ignore_ascii_case(word))
            {
                Some(true)
            } else if ["0", "false", "low"]
                .iter()
                .any(|word| text.eq_ignore_ascii_case(word))
            {
                Some(false)
            } else {
                None
            }
        }
    }
}
