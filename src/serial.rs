//! Serial input stream.
//!
//! The sensor streams ASCII lines at a fixed baud rate, 8N1, no flow control.
//! The returned [`SerialStream`] implements `AsyncRead` and is handed straight
//! to the coordinator.

use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

use crate::config::SerialSettings;
use crate::error::{AppResult, IngestError};

/// Open the serial device described by `settings`.
pub fn open(settings: &SerialSettings) -> AppResult<SerialStream> {
    let stream = tokio_serial::new(&settings.port, settings.baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|source| IngestError::SerialOpen {
            port: settings.port.clone(),
            source,
        })?;

    info!(port = %settings.port, baud = settings.baud_rate, "serial port open");
    Ok(stream)
}
