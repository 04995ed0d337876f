//! Serial output transport.
//!
//! The engine writes sentences through the [`SerialPort`] trait. Two
//! implementations ship with the crate:
//!
//! - [`DevicePort`] -- a serial device such as `/dev/ttyUSB0`, opened
//!   through the `serialport` crate with the requested baud rate and 8N1
//!   framing applied to the line.
//! - [`MemoryPort`] -- an in-memory buffer for tests and dry runs.
//!
//! Writing to a closed port returns [`SerialError::Closed`] rather than
//! panicking, so a late tick racing a close is harmless.

use std::io::Write as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serialport::{DataBits, Parity, SerialPortInfo, StopBits};

/// Upper bound on a single blocking write to a device.
///
/// A device held off by flow control returns a timeout error instead of
/// stalling its writer indefinitely.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors from the serial transport.
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    /// The device could not be opened or configured.
    #[error("failed to open {path}: {source}")]
    Open {
        /// Device path that was requested.
        path: String,
        /// The underlying serial error.
        source: serialport::Error,
    },

    /// A write was attempted on a closed port.
    #[error("port is closed")]
    Closed,

    /// The device rejected a write.
    #[error("write failed: {source}")]
    Write {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Enumerating available devices failed.
    #[error("failed to list ports: {0}")]
    List(String),
}

/// Line settings applied when a port is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSettings {
    /// Baud rate.
    pub baud_rate: u32,
    /// Data bits per character.
    pub data_bits: DataBits,
    /// Parity checking.
    pub parity: Parity,
    /// Stop bits.
    pub stop_bits: StopBits,
}

impl PortSettings {
    /// 8N1 at the given baud rate.
    pub const fn with_baud(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// A writable serial output.
pub trait SerialPort: Send {
    /// Path or name of the underlying device.
    fn path(&self) -> &str;

    /// Whether the port accepts writes.
    fn is_open(&self) -> bool;

    /// Write `bytes` to the device.
    fn write(&mut self, bytes: &[u8]) -> Result<(), SerialError>;

    /// Close the port. Closing twice is a no-op.
    fn close(&mut self) -> Result<(), SerialError>;
}

// ---------------------------------------------------------------------------
// DevicePort
// ---------------------------------------------------------------------------

/// A serial device with its line configured.
pub struct DevicePort {
    path: String,
    settings: PortSettings,
    device: Option<Box<dyn serialport::SerialPort>>,
}

impl std::fmt::Debug for DevicePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePort")
            .field("path", &self.path)
            .field("settings", &self.settings)
            .field("open", &self.device.is_some())
            .finish()
    }
}

impl DevicePort {
    /// Open `path` and configure the line per `settings`.
    ///
    /// Fails for anything that is not a serial device, including regular
    /// files.
    pub fn open(path: &str, settings: PortSettings) -> Result<Self, SerialError> {
        let device = serialport::new(path, settings.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .timeout(WRITE_TIMEOUT)
            .open()
            .map_err(|source| SerialError::Open {
                path: path.to_owned(),
                source,
            })?;
        tracing::info!(
            path,
            baud_rate = settings.baud_rate,
            "Serial device opened"
        );
        Ok(Self::from_device(path, settings, device))
    }

    /// Wrap an already-open device.
    pub fn from_device(
        path: &str,
        settings: PortSettings,
        device: Box<dyn serialport::SerialPort>,
    ) -> Self {
        Self {
            path: path.to_owned(),
            settings,
            device: Some(device),
        }
    }

    /// Line settings the port was opened with.
    pub const fn settings(&self) -> PortSettings {
        self.settings
    }
}

impl SerialPort for DevicePort {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        let device = self.device.as_mut().ok_or(SerialError::Closed)?;
        device.write_all(bytes)?;
        device.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SerialError> {
        if let Some(mut device) = self.device.take() {
            device.flush()?;
            tracing::info!(path = %self.path, "Serial device closed");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryPort
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryInner {
    written: Vec<u8>,
    open: bool,
    fail_writes: bool,
}

/// In-memory serial port.
///
/// Clones share the same buffer, so a test can keep one clone for
/// inspection while the session owns another.
#[derive(Debug, Clone)]
pub struct MemoryPort {
    path: String,
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryPort {
    /// Create an open in-memory port with the given display name.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_owned(),
            inner: Arc::new(Mutex::new(MemoryInner {
                open: true,
                ..MemoryInner::default()
            })),
        }
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        self.inner
            .lock()
            .map(|inner| String::from_utf8_lossy(&inner.written).into_owned())
            .unwrap_or_default()
    }

    /// Written data split into lines, terminators removed.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_writes = fail;
        }
    }
}

impl SerialPort for MemoryPort {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.inner.lock().is_ok_and(|inner| inner.open)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        let mut inner = self.inner.lock().map_err(|e| SerialError::Write {
            source: std::io::Error::other(e.to_string()),
        })?;
        if !inner.open {
            return Err(SerialError::Closed);
        }
        if inner.fail_writes {
            return Err(SerialError::Write {
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "device unplugged"),
            });
        }
        inner.written.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SerialError> {
        if let Ok(mut inner) = self.inner.lock() {
            inner.open = false;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Port listing
// ---------------------------------------------------------------------------

/// List serial devices present on this machine, sorted by path.
pub fn list_ports() -> Result<Vec<String>, SerialError> {
    let ports = serialport::available_ports().map_err(|e| SerialError::List(e.to_string()))?;
    Ok(port_names(ports))
}

fn port_names(ports: Vec<SerialPortInfo>) -> Vec<String> {
    let mut names: Vec<String> = ports.into_iter().map(|info| info.port_name).collect();
    names.sort();
    names.dedup();
    names
}
