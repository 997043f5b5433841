//! Fieldbus transport seam and its tokio-modbus implementation.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::error::Elapsed;
use tokio_modbus::client::{Context, Reader, Writer};
use tokio_modbus::prelude::*;
use tracing::{debug, info};

use crate::config::{ConnectionConfig, ModbusConfig};

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("{op} timed out after {timeout_ms} ms")]
    Timeout { op: &'static str, timeout_ms: u64 },
    #[error("{op} failed: {message}")]
    Io { op: &'static str, message: String },
    #[error("{op} at address {address} rejected by device: {code}")]
    Exception {
        op: &'static str,
        address: u16,
        code: String,
    },
}

/// Register/coil addressed device memory.
///
/// Implementations are not required to be usable concurrently; the gateway
/// owns its transport and serializes every call.
pub trait Transport: Send {
    /// Read `count` coils starting at `address`.
    fn read_bits(
        &mut self,
        address: u16,
        count: u16,
    ) -> impl Future<Output = Result<Vec<bool>, TransportError>> + Send;

    /// Read `count` holding registers starting at `address`.
    fn read_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> impl Future<Output = Result<Vec<u16>, TransportError>> + Send;

    /// Write consecutive coils starting at `address`.
    fn write_bits(
        &mut self,
        address: u16,
        values: &[bool],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Write consecutive holding registers starting at `address`.
    fn write_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Modbus TCP/RTU transport.
///
/// Connects on first use and forgets the connection after any I/O error or
/// timeout, so the next call reconnects.
pub struct ModbusTransport {
    config: ModbusConfig,
    ctx: Option<Context>,
}

impl ModbusTransport {
    /// Create a transport; no connection is opened yet.
    pub fn new(config: ModbusConfig) -> Self {
        Self { config, ctx: None }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    async fn context(&mut self) -> Result<&mut Context, TransportError> {
        if self.ctx.is_none() {
            let ctx = connect(&self.config).await?;
            info!(
                connection = ?self.config.connection,
                unit_id = self.config.unit_id,
                "Connected to Modbus device"
            );
            self.ctx = Some(ctx);
        }
        self.ctx
            .as_mut()
            .ok_or_else(|| TransportError::Connection("not connected".to_string()))
    }

    /// Flatten a timed call, dropping the connection when it cannot be trusted.
    fn settle<T>(
        &mut self,
        op: &'static str,
        address: u16,
        outcome: Result<tokio_modbus::Result<T>, Elapsed>,
    ) -> Result<T, TransportError> {
        match outcome {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(code))) => Err(TransportError::Exception {
                op,
                address,
                code: format!("{:?}", code),
            }),
            Ok(Err(e)) => {
                self.ctx = None;
                Err(TransportError::Io {
                    op,
                    message: e.to_string(),
                })
            }
            Err(_) => {
                self.ctx = None;
                Err(TransportError::Timeout {
                    op,
                    timeout_ms: self.config.timeout_ms,
                })
            }
        }
    }
}

impl Transport for ModbusTransport {
    async fn read_bits(&mut self, address: u16, count: u16) -> Result<Vec<bool>, TransportError> {
        let timeout = self.timeout();
        let ctx = self.context().await?;
        let outcome = tokio::time::timeout(timeout, ctx.read_coils(address, count)).await;
        let mut bits = self.settle("read_coils", address, outcome)?;
        // Coils arrive packed in bytes; drop the padding bits.
        bits.truncate(usize::from(count));
        Ok(bits)
    }

    async fn read_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let timeout = self.timeout();
        let ctx = self.context().await?;
        let outcome =
            tokio::time::timeout(timeout, ctx.read_holding_registers(address, count)).await;
        self.settle("read_holding_registers", address, outcome)
    }

    async fn write_bits(&mut self, address: u16, values: &[bool]) -> Result<(), TransportError> {
        debug!(address, values = ?values, "Writing coils");
        let timeout = self.timeout();
        let ctx = self.context().await?;
        let outcome = match values {
            [value] => tokio::time::timeout(timeout, ctx.write_single_coil(address, *value)).await,
            _ => tokio::time::timeout(timeout, ctx.write_multiple_coils(address, values)).await,
        };
        self.settle("write_coils", address, outcome)
    }

    async fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<(), TransportError> {
        debug!(address, values = ?values, "Writing registers");
        let timeout = self.timeout();
        let ctx = self.context().await?;
        let outcome = match values {
            [value] => {
                tokio::time::timeout(timeout, ctx.write_single_register(address, *value)).await
            }
            _ => tokio::time::timeout(timeout, ctx.write_multiple_registers(address, values)).await,
        };
        self.settle("write_registers", address, outcome)
    }
}

/// Open a connection to the Modbus device.
async fn connect(config: &ModbusConfig) -> Result<Context, TransportError> {
    let slave = Slave(config.unit_id);

    match &config.connection {
        ConnectionConfig::Tcp { host, port } => {
            let timeout = Duration::from_millis(config.timeout_ms);
            connect_tcp(host, *port, slave, timeout).await
        }
        ConnectionConfig::Rtu {
            port,
            baud_rate,
            data_bits,
            parity,
            stop_bits,
        } => {
            let line = SerialLine::parse(parity, *data_bits, *stop_bits)
                .map_err(TransportError::Connection)?;
            let serial = line.open(port, *baud_rate).map_err(|e| {
                TransportError::Connection(format!("Serial open failed on {}: {}", port, e))
            })?;
            Ok(rtu::attach_slave(serial, slave))
        }
    }
}

async fn connect_tcp(
    host: &str,
    port: u16,
    slave: Slave,
    timeout: Duration,
) -> Result<Context, TransportError> {
    let addr = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| TransportError::Connection(format!("Cannot resolve {}: {}", host, e)))?
        .next()
        .ok_or_else(|| TransportError::Connection(format!("No address found for {}", host)))?;

    tokio::time::timeout(timeout, tcp::connect_slave(addr, slave))
        .await
        .map_err(|_| TransportError::Connection(format!("Connecting to {} timed out", addr)))?
        .map_err(|e| TransportError::Connection(e.to_string()))
}

/// Character framing of an RTU serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SerialLine {
    parity: tokio_serial::Parity,
    data_bits: tokio_serial::DataBits,
    stop_bits: tokio_serial::StopBits,
}

impl SerialLine {
    /// Map configured framing onto what a UART supports.
    pub(crate) fn parse(parity: &str, data_bits: u8, stop_bits: u8) -> Result<Self, String> {
        use tokio_serial::{DataBits, Parity, StopBits};

        let parity = match parity.to_ascii_lowercase().as_str() {
            "none" => Parity::None,
            "even" => Parity::Even,
            "odd" => Parity::Odd,
            other => return Err(format!("invalid parity '{}' (use none, even, or odd)", other)),
        };
        let data_bits = match data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            n => return Err(format!("invalid data_bits {} (use 5 to 8)", n)),
        };
        let stop_bits = match stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            n => return Err(format!("invalid stop_bits {} (use 1 or 2)", n)),
        };

        Ok(Self {
            parity,
            data_bits,
            stop_bits,
        })
    }

    fn open(self, port: &str, baud_rate: u32) -> tokio_serial::Result<tokio_serial::SerialStream> {
        let builder = tokio_serial::new(port, baud_rate)
            .parity(self.parity)
            .data_bits(self.data_bits)
            .stop_bits(self.stop_bits);
        tokio_serial::SerialStream::open(&builder)
    }
}
