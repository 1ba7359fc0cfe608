//! Line oriented transports.
//!
//! A [`Transport`] writes one command line and reads reply lines. Reads wait
//! until a full line is available; the channel worker bounds them with its
//! timeout.

use std::{fmt, io, str::FromStr, time::Duration};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::mock::DeviceMock;
use crate::codec::DeviceFamily;
use crate::error::{MtsError, Result};

/// Wait used by [`StreamTransport::discard_pending`] to decide the line is quiet.
const DRAIN_QUIET: Duration = Duration::from_millis(20);

/// Line oriented link to a device.
#[async_trait]
pub trait Transport: Send {
    /// Writes `line` followed by a newline.
    async fn write_line(&mut self, line: &str) -> Result<()>;

    /// Next reply line without its line ending.
    async fn read_line(&mut self) -> Result<String>;

    /// Throws away input that arrived after a failed exchange.
    async fn discard_pending(&mut self) -> Result<()>;
}

/// Transport over any async byte stream, e.g. a serial port or TCP socket.
pub struct StreamTransport<S> {
    stream: BufStream<S>,
    partial: Vec<u8>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Buffers `stream` in both directions.
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
            partial: Vec::new(),
        }
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        // `partial` survives a cancelled read so no bytes are lost.
        let read = self.stream.read_until(b'\n', &mut self.partial).await?;
        if read == 0 && !self.partial.ends_with(b"\n") {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed").into());
        }
        let bytes = std::mem::take(&mut self.partial);
        let line = String::from_utf8_lossy(&bytes);
        Ok(line.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string())
    }

    async fn discard_pending(&mut self) -> Result<()> {
        let mut dropped = self.partial.len();
        self.partial.clear();
        loop {
            match tokio::time::timeout(DRAIN_QUIET, self.stream.fill_buf()).await {
                Ok(Ok(buf)) if !buf.is_empty() => {
                    let len = buf.len();
                    dropped += len;
                    self.stream.consume(len);
                }
                Ok(Ok(_)) | Err(_) => break,
                Ok(Err(e)) => return Err(e.into()),
            }
        }
        if dropped > 0 {
            debug!(bytes = dropped, "discarded stale input");
        }
        Ok(())
    }
}

/// Which mock device stands in for hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockType {
    /// Emulated MT768.
    Mt,
    /// Emulated FG30x.
    Fg,
}

impl MockType {
    /// Family the mock speaks.
    pub fn family(self) -> DeviceFamily {
        match self {
            MockType::Mt => DeviceFamily::Mt,
            MockType::Fg => DeviceFamily::Fg,
        }
    }
}

impl FromStr for MockType {
    type Err = MtsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mt" | "mt768" => Ok(MockType::Mt),
            "fg" | "fg30x" => Ok(MockType::Fg),
            other => Err(MtsError::Configuration(format!("unknown mock type '{other}'"))),
        }
    }
}

/// Where the link to the device goes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TransportSelection {
    /// Local serial port.
    Serial { port: String, baud_rate: u32 },
    /// `host:port`
    Network { address: String },
    /// In-process device emulation.
    Mock(MockType),
}

impl fmt::Display for TransportSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportSelection::Serial { port, baud_rate } => write!(f, "serial {port} @ {baud_rate}"),
            TransportSelection::Network { address } => write!(f, "tcp {address}"),
            TransportSelection::Mock(kind) => write!(f, "mock {kind:?}"),
        }
    }
}

/// Opens the transport described by `selection`.
///
/// # Errors
///
/// `Configuration` if the serial port cannot be opened or serial support is
/// not compiled in, `Io` if the network endpoint refuses the connection.
pub async fn open_transport(selection: &TransportSelection) -> Result<Box<dyn Transport>> {
    info!(transport = %selection, "opening device link");
    match selection {
        TransportSelection::Serial { port, baud_rate } => open_serial(port, *baud_rate),
        TransportSelection::Network { address } => {
            let stream = TcpStream::connect(address.as_str()).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(StreamTransport::new(stream)))
        }
        TransportSelection::Mock(kind) => Ok(Box::new(DeviceMock::new(kind.family()))),
    }
}

#[cfg(feature = "tokio_serial")]
fn open_serial(port: &str, baud_rate: u32) -> Result<Box<dyn Transport>> {
    use tokio_serial::SerialPortBuilderExt;

    let stream = tokio_serial::new(port, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| MtsError::Configuration(format!("failed to open serial port '{port}': {e}")))?;
    Ok(Box::new(StreamTransport::new(stream)))
}

#[cfg(not(feature = "tokio_serial"))]
fn open_serial(port: &str, _baud_rate: u32) -> Result<Box<dyn Transport>> {
    Err(MtsError::Configuration(format!(
        "serial port '{port}' requested but serial support is not enabled. Rebuild with --features tokio_serial"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn stream_transport_reads_and_writes_lines() {
        let (client, mut device) = duplex(256);
        let mut transport = StreamTransport::new(client);

        transport.write_line("AAV").await.unwrap();
        let mut buf = [0u8; 4];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"AAV\n");

        device.write_all(b"MT786V06.08\r\nAAVACK\n").await.unwrap();
        assert_eq!(transport.read_line().await.unwrap(), "MT786V06.08");
        assert_eq!(transport.read_line().await.unwrap(), "AAVACK");
    }

    #[tokio::test]
    async fn discard_drops_stale_input() {
        let (client, mut device) = duplex(256);
        let mut transport = StreamTransport::new(client);

        device.write_all(b"late reply\nSOKFR\n").await.unwrap();
        transport.discard_pending().await.unwrap();

        device.write_all(b"fresh\n").await.unwrap();
        assert_eq!(transport.read_line().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn closed_stream_is_io_error() {
        let (client, device) = duplex(16);
        drop(device);
        let mut transport = StreamTransport::new(client);
        assert!(matches!(transport.read_line().await, Err(MtsError::Io(_))));
    }

    #[test]
    fn mock_type_parsing() {
        assert_eq!("MT".parse::<MockType>().unwrap(), MockType::Mt);
        assert_eq!("fg30x".parse::<MockType>().unwrap(), MockType::Fg);
        assert!("xyz".parse::<MockType>().is_err());
    }
}
