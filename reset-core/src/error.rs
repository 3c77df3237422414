//! Error types surfaced by the reset controller.

use core::fmt;

use crate::contract::ResetId;
use crate::line::LineId;

/// Failure while operating an attached device.
///
/// Runtime errors never tear the device down; the caller may simply retry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResetError<E> {
    /// A line read or write failed.
    Hardware { line: LineId, source: E },
    /// Reset was asserted but could not be released; the target may still be
    /// held in reset.
    PartialSequence { source: E },
    /// The reset contract was invoked with an id this controller does not own.
    UnknownResetId(ResetId),
}

impl<E> ResetError<E> {
    pub(crate) fn hardware(line: LineId) -> impl FnOnce(E) -> Self {
        move |source| Self::Hardware { line, source }
    }
}

impl<E: fmt::Debug> fmt::Display for ResetError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetError::Hardware { line, source } => {
                write!(f, "{line} line I/O failed: {source:?}")
            }
            ResetError::PartialSequence { source } => {
                write!(f, "reset asserted but release failed: {source:?}")
            }
            ResetError::UnknownResetId(id) => write!(f, "unknown reset id {id}"),
        }
    }
}

/// Failure while attaching a device. All acquired resources have already been
/// released by the time this is returned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttachError<A, E, R> {
    /// The provider could not hand out the named line.
    Acquisition { line: LineId, source: A },
    /// The line was acquired but could not be configured as an output.
    Configuration { line: LineId, source: E },
    /// The reset pulse requested by the `auto` property failed.
    AutoReset(ResetError<E>),
    /// Registering the reset contract or a control endpoint failed.
    Registration { name: &'static str, source: R },
}

impl<A, E, R> fmt::Display for AttachError<A, E, R>
where
    A: fmt::Debug,
    E: fmt::Debug,
    R: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachError::Acquisition { line, source } => {
                write!(f, "cannot acquire {line} line: {source:?}")
            }
            AttachError::Configuration { line, source } => {
                write!(f, "cannot configure {line} line as output: {source:?}")
            }
            AttachError::AutoReset(error) => write!(f, "auto reset failed: {error}"),
            AttachError::Registration { name, source } => {
                write!(f, "cannot register `{name}`: {source:?}")
            }
        }
    }
}

/// Failure reported through a control endpoint.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EndpointError<E> {
    UnknownEndpoint,
    NotReadable,
    /// The written payload does not name an action for this endpoint.
    InvalidInput,
    Reset(ResetError<E>),
}

impl<E> From<ResetError<E>> for EndpointError<E> {
    fn from(error: ResetError<E>) -> Self {
        Self::Reset(error)
    }
}

impl<E: fmt::Debug> fmt::Display for EndpointError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointError::UnknownEndpoint => f.write_str("no such endpoint"),
            EndpointError::NotReadable => f.write_str("endpoint is write-only"),
            EndpointError::InvalidInput => f.write_str("invalid value"),
            EndpointError::Reset(error) => write!(f, "{error}"),
        }
    }
}
