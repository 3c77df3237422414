//! Attach/detach lifecycle for one reset controller instance.
//!
//! Attach acquires the reset line, then the mode-select line, optionally pulses
//! reset, and finally publishes the reset contract followed by the control
//! endpoints. Any failure unwinds what was already done in reverse order, so
//! a failed attach never leaves a line held or a name registered. Detach is
//! the mirror image and consumes the instance, which makes a second detach
//! unrepresentable.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::delay::DelayNs;

use crate::config::{DeviceConfig, PropertySource};
use crate::contract::ResetControllerHandle;
use crate::controller::{ModeSelect, ResetLine};
use crate::endpoints::{CONTROL_ENDPOINTS, ControlSurface, Registrar};
use crate::error::AttachError;
use crate::line::{DigitalLine, LineId, LineProvider};
use crate::sequencer::ResetSequencer;

/// Name under which the reset contract is registered.
pub const DEVICE_NAME: &str = "isp-reset";

type LineError<P> = <<P as LineProvider>::Line as DigitalLine>::Error;

type ProviderAttachError<P, R> =
    AttachError<<P as LineProvider>::Error, LineError<P>, <R as Registrar>::Error>;

/// An attached controller owning both lines and its configuration.
pub struct ResetDevice<M: RawMutex, L, D> {
    config: DeviceConfig,
    sequencer: ResetSequencer<M, L, D>,
}

impl<M, L, D> ResetDevice<M, L, D>
where
    M: RawMutex,
    L: DigitalLine,
    D: DelayNs,
{
    /// Brings the controller up.
    ///
    /// # Errors
    ///
    /// Returns the first acquisition, configuration, auto-reset, or
    /// registration failure after releasing everything acquired so far.
    pub fn attach<P, R, S>(
        provider: &mut P,
        registrar: &mut R,
        properties: &S,
        delay: D,
    ) -> Result<Self, ProviderAttachError<P, R>>
    where
        P: LineProvider<Line = L>,
        R: Registrar,
        S: PropertySource + ?Sized,
    {
        let config = DeviceConfig::from_properties(properties);
        let polarity = config.asserted_polarity;

        let reset =
            acquire_output::<_, R::Error>(provider, LineId::Reset, polarity.deasserted_level())?;
        let mode = match acquire_output(
            provider,
            LineId::ModeSelect,
            ModeSelect::<L>::NORMAL_LEVEL,
        ) {
            Ok(line) => line,
            Err(error) => {
                provider.release(reset);
                return Err(error);
            }
        };

        let sequencer = ResetSequencer::new(
            ResetControllerHandle::new(DEVICE_NAME),
            ResetLine::new(reset, polarity),
            ModeSelect::new(mode),
            config.duration_ms,
            delay,
        );

        if config.auto_reset_on_attach
            && let Err(error) = sequencer.plain_reset()
        {
            #[cfg(feature = "defmt")]
            defmt::warn!("attach: auto reset failed");
            release_lines(provider, sequencer);
            return Err(AttachError::AutoReset(error));
        }

        if let Err((name, source)) = register_all(registrar, sequencer.handle()) {
            #[cfg(feature = "defmt")]
            defmt::warn!("attach: cannot register {}", name);
            release_lines(provider, sequencer);
            return Err(AttachError::Registration { name, source });
        }

        #[cfg(feature = "defmt")]
        defmt::info!("attach: {} ready ({})", DEVICE_NAME, config);

        Ok(Self { config, sequencer })
    }

    /// Unregisters the endpoints and the reset contract, then releases both
    /// lines.
    pub fn detach<P, R>(self, provider: &mut P, registrar: &mut R)
    where
        P: LineProvider<Line = L>,
        R: Registrar,
    {
        for endpoint in CONTROL_ENDPOINTS.iter().rev() {
            registrar.unregister_endpoint(endpoint);
        }
        registrar.unregister_reset_controller(self.sequencer.handle());
        release_lines(provider, self.sequencer);

        #[cfg(feature = "defmt")]
        defmt::info!("detach: {} released", DEVICE_NAME);
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn handle(&self) -> &ResetControllerHandle {
        self.sequencer.handle()
    }

    /// Shared sequencer; also the [`crate::contract::ResetControl`] entry point.
    pub fn sequencer(&self) -> &ResetSequencer<M, L, D> {
        &self.sequencer
    }

    /// Handler for the `reset` and `isp` control endpoints.
    pub fn endpoints(&self) -> ControlSurface<'_, M, L, D> {
        ControlSurface::new(&self.sequencer)
    }
}

fn acquire_output<P, RE>(
    provider: &mut P,
    line_id: LineId,
    initial_high: bool,
) -> Result<P::Line, AttachError<P::Error, LineError<P>, RE>>
where
    P: LineProvider,
{
    let line = match provider.acquire(line_id.name(), initial_high) {
        Ok(line) => line,
        Err(source) => {
            return Err(AttachError::Acquisition {
                line: line_id,
                source,
            });
        }
    };

    if let Err(source) = line.set_output(initial_high) {
        provider.release(line);
        return Err(AttachError::Configuration {
            line: line_id,
            source,
        });
    }

    Ok(line)
}

fn register_all<R: Registrar>(
    registrar: &mut R,
    handle: &ResetControllerHandle,
) -> Result<(), (&'static str, R::Error)> {
    registrar
        .register_reset_controller(handle)
        .map_err(|source| (handle.name, source))?;

    for (index, endpoint) in CONTROL_ENDPOINTS.iter().enumerate() {
        if let Err(source) = registrar.register_endpoint(endpoint) {
            for registered in CONTROL_ENDPOINTS[..index].iter().rev() {
                registrar.unregister_endpoint(registered);
            }
            registrar.unregister_reset_controller(handle);
            return Err((endpoint.name, source));
        }
    }

    Ok(())
}

fn release_lines<M, P, D>(provider: &mut P, sequencer: ResetSequencer<M, P::Line, D>)
where
    M: RawMutex,
    P: LineProvider,
    D: DelayNs,
{
    let (reset, mode) = sequencer.into_lines();
    provider.release(mode);
    provider.release(reset);
}
