//! Host-side stand-ins for the GPIO backend, the device description, and the
//! registrar that the firmware gets from its board.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::delay::DelayNs;
use reset_core::contract::ResetControllerHandle;
use reset_core::controller::ModeSelect;
use reset_core::endpoints::{ControlEndpoint, Registrar};
use reset_core::{
    DigitalLine, LineId, LineProvider, PropertySource, PropertyValue, ResetPolarity,
};

/// What the simulated target does once it leaves reset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BootMode {
    Application,
    IspLoader,
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BootMode::Application => "application",
            BootMode::IspLoader => "isp-loader",
        })
    }
}

/// Observable change on the simulated board.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChipEvent {
    Level {
        line: &'static str,
        high: bool,
        at: Duration,
    },
    Booted {
        mode: BootMode,
        at: Duration,
    },
}

impl fmt::Display for ChipEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChipEvent::Level { line, high, at } => write!(
                f,
                "  [+{:>5} ms] {line} -> {}",
                at.as_millis(),
                level_label(*high)
            ),
            ChipEvent::Booted { mode, at } => {
                write!(f, "  [+{:>5} ms] target booted {mode}", at.as_millis())
            }
        }
    }
}

#[derive(Debug)]
struct ChipState {
    polarity: ResetPolarity,
    levels: BTreeMap<&'static str, bool>,
    held: Vec<&'static str>,
    boot_mode: Option<BootMode>,
    events: Vec<ChipEvent>,
}

/// Board model shared by every line handed out to the device.
///
/// The target latches the mode-select level when reset is released, which is
/// what makes the ISP entry sequence observable from the console.
#[derive(Clone, Debug)]
pub struct SimulatedChip {
    state: Arc<Mutex<ChipState>>,
    powered_at: Instant,
}

impl SimulatedChip {
    pub fn new(polarity: ResetPolarity) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChipState {
                polarity,
                levels: BTreeMap::new(),
                held: Vec::new(),
                boot_mode: None,
                events: Vec::new(),
            })),
            powered_at: Instant::now(),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChipState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Events recorded since the previous call.
    pub fn drain_events(&self) -> Vec<ChipEvent> {
        std::mem::take(&mut self.state().events)
    }

    pub fn boot_mode(&self) -> Option<BootMode> {
        self.state().boot_mode
    }

    pub fn level(&self, line: &str) -> Option<bool> {
        self.state().levels.get(line).copied()
    }

    pub fn held_lines(&self) -> Vec<&'static str> {
        self.state().held.clone()
    }

    /// One-line summary for the `lines` console command.
    pub fn describe(&self) -> String {
        let state = self.state();
        let mut parts: Vec<String> = state
            .levels
            .iter()
            .map(|(line, high)| {
                let owner = if state.held.contains(line) {
                    ""
                } else {
                    " (released)"
                };
                format!("{line}={}{owner}", level_label(*high))
            })
            .collect();
        parts.push(match state.boot_mode {
            Some(mode) => format!("target={mode}"),
            None => "target=unknown".to_string(),
        });
        parts.join(" ")
    }

    fn drive(&self, line: &'static str, high: bool) {
        let at = self.powered_at.elapsed();
        let mut state = self.state();
        let previous = state.levels.insert(line, high);
        state.events.push(ChipEvent::Level { line, high, at });

        let asserted = state.polarity.asserted_level();
        if line == LineId::Reset.name() && previous == Some(asserted) && high != asserted {
            let mode = match state.levels.get(LineId::ModeSelect.name()) {
                Some(&level) if level == ModeSelect::<HostLine>::PROGRAMMING_LEVEL => {
                    BootMode::IspLoader
                }
                _ => BootMode::Application,
            };
            state.boot_mode = Some(mode);
            state.events.push(ChipEvent::Booted { mode, at });
        }
    }
}

fn level_label(high: bool) -> &'static str {
    if high { "high" } else { "low" }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HostLineError {
    Busy(&'static str),
    Unavailable(&'static str),
}

/// Simulated output pin.
pub struct HostLine {
    name: &'static str,
    chip: SimulatedChip,
}

impl DigitalLine for HostLine {
    type Error = HostLineError;

    fn set_output(&self, high: bool) -> Result<(), Self::Error> {
        self.chip.state().levels.insert(self.name, high);
        Ok(())
    }

    fn set_level(&self, high: bool) -> Result<(), Self::Error> {
        self.chip.drive(self.name, high);
        Ok(())
    }

    fn level(&self) -> Result<bool, Self::Error> {
        self.chip
            .level(self.name)
            .ok_or(HostLineError::Unavailable(self.name))
    }
}

/// Hands out lines on the simulated chip, optionally refusing one by name.
pub struct HostProvider {
    chip: SimulatedChip,
    refuse: Option<String>,
}

impl HostProvider {
    pub fn new(chip: SimulatedChip, refuse: Option<String>) -> Self {
        Self { chip, refuse }
    }
}

impl LineProvider for HostProvider {
    type Line = HostLine;
    type Error = HostLineError;

    fn acquire(&mut self, name: &'static str, initial_high: bool) -> Result<HostLine, Self::Error> {
        if self.refuse.as_deref() == Some(name) {
            return Err(HostLineError::Unavailable(name));
        }

        let mut state = self.chip.state();
        if state.held.contains(&name) {
            return Err(HostLineError::Busy(name));
        }
        state.held.push(name);
        state.levels.insert(name, initial_high);
        drop(state);

        Ok(HostLine {
            name,
            chip: self.chip.clone(),
        })
    }

    fn release(&mut self, line: HostLine) {
        self.chip.state().held.retain(|held| *held != line.name);
    }
}

/// Device description assembled from `--prop key[=value]` flags.
#[derive(Clone, Debug, Default)]
pub struct HostProperties {
    entries: Vec<(String, Option<String>)>,
}

impl HostProperties {
    /// Adds `key` or `key=value`; a later entry for the same key wins.
    pub fn push(&mut self, entry: &str) {
        let (key, value) = match entry.split_once('=') {
            Some((key, value)) => (key.trim(), Some(value.trim().to_string())),
            None => (entry.trim(), None),
        };
        self.entries.retain(|(existing, _)| existing != key);
        self.entries.push((key.to_string(), value));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PropertySource for HostProperties {
    fn property(&self, key: &str) -> Option<PropertyValue<'_>> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| match value {
                Some(text) => PropertyValue::Str(text),
                None => PropertyValue::Flag,
            })
    }
}

impl fmt::Display for HostProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (key, value)) in self.entries.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            match value {
                Some(value) => write!(f, "{key}={value}")?,
                None => f.write_str(key)?,
            }
        }
        Ok(())
    }
}

/// Keeps the set of published names so `detach` can be checked from the
/// console.
#[derive(Debug, Default)]
pub struct HostRegistrar {
    published: Vec<&'static str>,
}

impl HostRegistrar {
    pub fn published(&self) -> &[&'static str] {
        &self.published
    }

    fn publish(&mut self, name: &'static str) -> Result<(), &'static str> {
        if self.published.contains(&name) {
            return Err("name already published");
        }
        self.published.push(name);
        Ok(())
    }

    fn withdraw(&mut self, name: &str) {
        self.published.retain(|published| *published != name);
    }
}

impl Registrar for HostRegistrar {
    type Error = &'static str;

    fn register_reset_controller(
        &mut self,
        handle: &ResetControllerHandle,
    ) -> Result<(), Self::Error> {
        self.publish(handle.name)
    }

    fn unregister_reset_controller(&mut self, handle: &ResetControllerHandle) {
        self.withdraw(handle.name);
    }

    fn register_endpoint(&mut self, endpoint: &ControlEndpoint) -> Result<(), Self::Error> {
        self.publish(endpoint.name)
    }

    fn unregister_endpoint(&mut self, endpoint: &ControlEndpoint) {
        self.withdraw(endpoint.name);
    }
}

/// Blocks the calling thread for the requested time.
#[derive(Copy, Clone, Debug, Default)]
pub struct ThreadDelay;

impl DelayNs for ThreadDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

/// Sequencing lock for one emulated device, backed by a std mutex so each
/// instance serializes only its own sequences. Not reentrant.
#[derive(Debug, Default)]
pub struct HostMutex(Mutex<()>);

impl HostMutex {
    pub const fn new() -> Self {
        Self(Mutex::new(()))
    }
}

// SAFETY: the std mutex excludes every other thread for the duration of `f`.
unsafe impl RawMutex for HostMutex {
    const INIT: Self = Self::new();

    fn lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}
