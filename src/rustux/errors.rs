// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Common error types used throughout the kernel

use crate::rustux::types::*;
use core::fmt;

/// Result type for operations that can fail
pub type Result<T = ()> = core::result::Result<T, Error>;

/// Kernel status codes
///
/// Values are part of the syscall ABI and never change.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    Internal = -1,
    NotSupported = -2,
    NoResources = -3,
    NoMemory = -4,
    InvalidArgs = -10,
    BadHandle = -11,
    OutOfRange = -14,
    BadState = -20,
    TimedOut = -21,
    ShouldWait = -22,
    Canceled = -23,
    PeerClosed = -24,
    NotFound = -25,
    AccessDenied = -30,
}

impl Error {
    /// Convert error to status code
    pub const fn to_status(self) -> Status {
        self as Status
    }

    /// Convert status code to error
    ///
    /// Unknown codes map to `Internal`.
    pub fn from_status(status: Status) -> Self {
        match status {
            -1 => Error::Internal,
            -2 => Error::NotSupported,
            -3 => Error::NoResources,
            -4 => Error::NoMemory,
            -10 => Error::InvalidArgs,
            -11 => Error::BadHandle,
            -14 => Error::OutOfRange,
            -20 => Error::BadState,
            -21 => Error::TimedOut,
            -22 => Error::ShouldWait,
            -23 => Error::Canceled,
            -24 => Error::PeerClosed,
            -25 => Error::NotFound,
            -30 => Error::AccessDenied,
            _ => Error::Internal,
        }
    }

    /// Symbolic name, as printed by diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            Error::Internal => "ERR_INTERNAL",
            Error::NotSupported => "ERR_NOT_SUPPORTED",
            Error::NoResources => "ERR_NO_RESOURCES",
            Error::NoMemory => "ERR_NO_MEMORY",
            Error::InvalidArgs => "ERR_INVALID_ARGS",
            Error::BadHandle => "ERR_BAD_HANDLE",
            Error::OutOfRange => "ERR_OUT_OF_RANGE",
            Error::BadState => "ERR_BAD_STATE",
            Error::TimedOut => "ERR_TIMED_OUT",
            Error::ShouldWait => "ERR_SHOULD_WAIT",
            Error::Canceled => "ERR_CANCELED",
            Error::PeerClosed => "ERR_PEER_CLOSED",
            Error::NotFound => "ERR_NOT_FOUND",
            Error::AccessDenied => "ERR_ACCESS_DENIED",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.to_status())
    }
}

impl std::error::Error for Error {}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Self::from_status(status)
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        err.to_status()
    }
}

/// Success status code
pub const OK: Status = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for err in [Error::BadHandle, Error::AccessDenied, Error::PeerClosed, Error::NoResources] {
            assert_eq!(Error::from_status(err.to_status()), err);
        }
        assert_eq!(Error::from_status(-9999), Error::Internal);
    }

    #[test]
    fn test_display() {
        assert_eq!(Error::TimedOut.to_string(), "ERR_TIMED_OUT (-21)");
    }
}
