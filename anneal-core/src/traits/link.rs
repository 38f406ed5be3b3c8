//! Errors shared by both instrument links

use core::fmt;

/// What was wrong with a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolFault {
    /// Reply did not parse
    Malformed,
    /// Instrument answered with an error code
    Rejected(u8),
    /// Reply parsed but carried an unexpected value
    UnexpectedValue,
}

/// Failure of a single link transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// No reply within the link's timeout
    Timeout,
    /// Reply was malformed or an error code
    Protocol(ProtocolFault),
    /// Serial peripheral error
    Bus,
    /// Flow setpoint exceeds the selected range, or no range selected yet
    Range,
}

impl LinkError {
    /// Whether trying the same transaction again can help
    pub fn is_retryable(&self) -> bool {
        matches!(self, LinkError::Timeout | LinkError::Protocol(_) | LinkError::Bus)
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Timeout => write!(f, "no reply before timeout"),
            LinkError::Protocol(ProtocolFault::Malformed) => write!(f, "malformed reply"),
            LinkError::Protocol(ProtocolFault::Rejected(code)) => {
                write!(f, "instrument error code {}", code)
            }
            LinkError::Protocol(ProtocolFault::UnexpectedValue) => {
                write!(f, "unexpected value in reply")
            }
            LinkError::Bus => write!(f, "serial bus error"),
            LinkError::Range => write!(f, "flow outside selected range"),
        }
    }
}
