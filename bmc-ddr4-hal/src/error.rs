//! Error types of the calibration driver.

/// Hardware operation a bounded polling loop was waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTarget {
    ZqCalibration,
    DllLock,
    WriteLeveling,
    BitLeveling,
    Scl,
    ModeRegisterSet,
    MemoryInit,
    ControllerInit,
}

/// Calibration phase which failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ControllerInit,
    WriteLeveling,
    BitLeveling,
    Scl,
    /// Mutually exclusive options were both enabled.
    Misconfiguration,
    Geometry,
    Validation,
    EccInit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("parameter out of range")]
    ParameterOutOfRange,
    #[error("timeout waiting for {0:?}")]
    Timeout(PollTarget),
    /// No valid training window was found and a default was used instead.
    #[error("hardware error, no valid window found")]
    HardwareError,
    #[error("calibration phase {0:?} failed")]
    Fail(Phase),
    #[error("calibration session is not initialized")]
    NotInitialized,
    #[error("DDR is already initialized")]
    AlreadyInitialized,
    #[error("PHY calibration incomplete (ZQ timeout: {zq}, DLL lock timeout: {dll_lock})")]
    CalibrationIncomplete { zq: bool, dll_lock: bool },
    /// The DRAM stopped responding during a diagnostic sweep. The memory subsystem is unusable
    /// and the caller should reset or halt.
    #[error("DRAM became unresponsive")]
    DramUnresponsive,
}

impl Error {
    /// Fatal errors must not be retried within the same boot.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Error::DramUnresponsive)
    }

    /// Whether a new calibration attempt could resolve the error.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Error::Fail(Phase::Misconfiguration) => false,
            Error::Fail(_) | Error::Timeout(_) | Error::CalibrationIncomplete { .. } => true,
            Error::HardwareError => true,
            Error::ParameterOutOfRange
            | Error::NotInitialized
            | Error::AlreadyInitialized
            | Error::DramUnresponsive => false,
        }
    }
}
