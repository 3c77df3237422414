#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::delay::DelayNs;
use reset_core::contract::ResetControllerHandle;
use reset_core::endpoints::{ControlEndpoint, Registrar};
use reset_core::{DigitalLine, LineProvider, PropertyValue, ResetDevice};

pub type BenchDevice<D> = ResetDevice<BenchMutex, BenchLine, D>;

/// Raw mutex owned by a single device, so separate instances never contend.
/// Not reentrant.
pub struct BenchMutex(Mutex<()>);

// SAFETY: the std mutex excludes every other thread for the duration of `f`.
unsafe impl RawMutex for BenchMutex {
    const INIT: Self = Self(Mutex::new(()));

    fn lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

/// Level change observed on a simulated line.
#[derive(Copy, Clone, Debug)]
pub struct Transition {
    pub line: &'static str,
    pub high: bool,
    pub at: Instant,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BenchError {
    Busy,
    Injected,
}

#[derive(Default)]
struct BenchState {
    levels: BTreeMap<&'static str, bool>,
    held: Vec<&'static str>,
    trace: Vec<Transition>,
    fail_acquire: Option<&'static str>,
    fail_output: Option<&'static str>,
    fail_write: Option<(&'static str, bool)>,
}

/// Shared record of every line the bench hands out.
#[derive(Clone, Default)]
pub struct Bench {
    state: Arc<Mutex<BenchState>>,
}

impl Bench {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BenchState> {
        self.state.lock().unwrap()
    }

    pub fn provider(&self) -> BenchProvider {
        BenchProvider {
            bench: self.clone(),
        }
    }

    pub fn fail_acquire(&self, line: &'static str) {
        self.state().fail_acquire = Some(line);
    }

    pub fn fail_output(&self, line: &'static str) {
        self.state().fail_output = Some(line);
    }

    pub fn fail_write(&self, line: &'static str, high: bool) {
        self.state().fail_write = Some((line, high));
    }

    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.fail_acquire = None;
        state.fail_output = None;
        state.fail_write = None;
    }

    pub fn level(&self, line: &str) -> Option<bool> {
        self.state().levels.get(line).copied()
    }

    pub fn held(&self) -> Vec<&'static str> {
        self.state().held.clone()
    }

    pub fn trace(&self) -> Vec<Transition> {
        self.state().trace.clone()
    }

    /// Trace reduced to `(line, level)` pairs.
    pub fn levels_written(&self) -> Vec<(&'static str, bool)> {
        self.state()
            .trace
            .iter()
            .map(|transition| (transition.line, transition.high))
            .collect()
    }

    pub fn clear_trace(&self) {
        self.state().trace.clear();
    }
}

pub struct BenchLine {
    name: &'static str,
    bench: Bench,
}

impl DigitalLine for BenchLine {
    type Error = BenchError;

    fn set_output(&self, high: bool) -> Result<(), Self::Error> {
        let mut state = self.bench.state();
        if state.fail_output == Some(self.name) {
            return Err(BenchError::Injected);
        }
        state.levels.insert(self.name, high);
        Ok(())
    }

    fn set_level(&self, high: bool) -> Result<(), Self::Error> {
        let mut state = self.bench.state();
        if state.fail_write == Some((self.name, high)) {
            return Err(BenchError::Injected);
        }
        state.levels.insert(self.name, high);
        state.trace.push(Transition {
            line: self.name,
            high,
            at: Instant::now(),
        });
        Ok(())
    }

    fn level(&self) -> Result<bool, Self::Error> {
        self.bench
            .state()
            .levels
            .get(self.name)
            .copied()
            .ok_or(BenchError::Injected)
    }
}

pub struct BenchProvider {
    bench: Bench,
}

impl LineProvider for BenchProvider {
    type Line = BenchLine;
    type Error = BenchError;

    fn acquire(&mut self, name: &'static str, initial_high: bool) -> Result<BenchLine, BenchError> {
        let mut state = self.bench.state();
        if state.fail_acquire == Some(name) {
            return Err(BenchError::Injected);
        }
        if state.held.contains(&name) {
            return Err(BenchError::Busy);
        }
        state.held.push(name);
        state.levels.insert(name, initial_high);
        Ok(BenchLine {
            name,
            bench: self.bench.clone(),
        })
    }

    fn release(&mut self, line: BenchLine) {
        self.bench.state().held.retain(|held| *held != line.name);
    }
}

/// Registrar recording which names are currently published.
#[derive(Default)]
pub struct RecordingRegistrar {
    pub registered: Vec<&'static str>,
    pub fail_on: Option<&'static str>,
}

impl RecordingRegistrar {
    pub fn failing_on(name: &'static str) -> Self {
        Self {
            registered: Vec::new(),
            fail_on: Some(name),
        }
    }

    fn register(&mut self, name: &'static str) -> Result<(), &'static str> {
        if self.fail_on == Some(name) {
            return Err("registration refused");
        }
        self.registered.push(name);
        Ok(())
    }
}

impl Registrar for RecordingRegistrar {
    type Error = &'static str;

    fn register_reset_controller(
        &mut self,
        handle: &ResetControllerHandle,
    ) -> Result<(), Self::Error> {
        self.register(handle.name)
    }

    fn unregister_reset_controller(&mut self, handle: &ResetControllerHandle) {
        self.registered.retain(|name| *name != handle.name);
    }

    fn register_endpoint(&mut self, endpoint: &ControlEndpoint) -> Result<(), Self::Error> {
        self.register(endpoint.name)
    }

    fn unregister_endpoint(&mut self, endpoint: &ControlEndpoint) {
        self.registered.retain(|name| *name != endpoint.name);
    }
}

/// Delay that actually sleeps the calling thread.
#[derive(Copy, Clone, Default)]
pub struct ThreadDelay;

impl DelayNs for ThreadDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

/// Delay that only accumulates the requested time.
#[derive(Clone, Default)]
pub struct RecordingDelay {
    total_ms: Arc<AtomicU32>,
}

impl RecordingDelay {
    pub fn total_ms(&self) -> u32 {
        self.total_ms.load(Ordering::SeqCst)
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ms.fetch_add(ns / 1_000_000, Ordering::SeqCst);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.total_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

/// Attaches a device on `bench` with the given properties.
pub fn attach<'p, D: DelayNs>(
    bench: &Bench,
    registrar: &mut RecordingRegistrar,
    properties: &[(&'p str, PropertyValue<'p>)],
    delay: D,
) -> BenchDevice<D> {
    let mut provider = bench.provider();
    ResetDevice::attach(&mut provider, registrar, properties, delay).expect("attach succeeds")
}
