//! Error types for the simulator binary.
//!
//! [`AppError`] wraps every failure mode of startup and shutdown so
//! `main` can propagate with `?`.

/// Top-level error for the simulator binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: gpsim_core::config::ConfigError,
    },

    /// The control API failed to start.
    #[error("server error: {source}")]
    Startup {
        /// The underlying startup error.
        #[from]
        source: gpsim_observer::StartupError,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal error: {source}")]
    Signal {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Closing the serial port on shutdown failed.
    #[error("shutdown error: {source}")]
    Shutdown {
        /// The underlying session error.
        #[from]
        source: gpsim_core::session::SessionError,
    },
}
