//! C-compatible status codes for the checked entry points.
//!
//! [`NlStatus`] is a `repr(i32)` enum. Conversions from the runtime's
//! [`AllocError`] and [`ConfigError`] are provided.

use nl_runtime::{AllocError, ConfigError};

/// C-compatible status code returned by the `nl_try_*` functions.
///
/// `Ok` = 0, all errors are negative. Values are ABI-stable.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NlStatus {
    /// Success.
    Ok = 0,
    /// The heap could not satisfy the request.
    OutOfMemory = -1,
    /// The requested block size does not fit in the address space.
    CapacityOverflow = -2,
    /// Released a block the caller does not own, or with the wrong size.
    InvalidRelease = -3,
    /// An argument is null or otherwise invalid.
    InvalidArgument = -4,
    /// Runtime configuration was rejected.
    ConfigError = -5,
    /// `nl_runtime_init` called after the runtime was already in use.
    AlreadyInitialized = -6,
    /// Statistics requested but allocation tracking is off.
    NotTracked = -7,
    /// A Rust panic was caught at the FFI boundary.
    Panicked = -128,
}

impl From<&AllocError> for NlStatus {
    fn from(e: &AllocError) -> Self {
        match e {
            AllocError::OutOfMemory { .. } => NlStatus::OutOfMemory,
            AllocError::CapacityOverflow { .. } => NlStatus::CapacityOverflow,
            AllocError::InvalidRelease { .. } => NlStatus::InvalidRelease,
        }
    }
}

impl From<&ConfigError> for NlStatus {
    fn from(_e: &ConfigError) -> Self {
        NlStatus::ConfigError
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nl_runtime::ReleaseFault;

    #[test]
    fn status_code_values_are_stable() {
        assert_eq!(NlStatus::Ok as i32, 0);
        assert_eq!(NlStatus::OutOfMemory as i32, -1);
        assert_eq!(NlStatus::CapacityOverflow as i32, -2);
        assert_eq!(NlStatus::InvalidRelease as i32, -3);
        assert_eq!(NlStatus::InvalidArgument as i32, -4);
        assert_eq!(NlStatus::ConfigError as i32, -5);
        assert_eq!(NlStatus::AlreadyInitialized as i32, -6);
        assert_eq!(NlStatus::NotTracked as i32, -7);
        assert_eq!(NlStatus::Panicked as i32, -128);
    }

    #[test]
    fn alloc_error_to_status() {
        assert_eq!(
            NlStatus::from(&AllocError::OutOfMemory { requested: 1 }),
            NlStatus::OutOfMemory
        );
        assert_eq!(
            NlStatus::from(&AllocError::CapacityOverflow {
                length: 2,
                element_size: usize::MAX
            }),
            NlStatus::CapacityOverflow
        );
        assert_eq!(
            NlStatus::from(&AllocError::InvalidRelease {
                address: 0x10,
                fault: ReleaseFault::NotLive
            }),
            NlStatus::InvalidRelease
        );
    }

    #[test]
    fn config_error_to_status() {
        assert_eq!(
            NlStatus::from(&ConfigError::AlignmentNotPowerOfTwo { alignment: 3 }),
            NlStatus::ConfigError
        );
    }
}
