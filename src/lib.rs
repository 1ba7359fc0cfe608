//! Command protocol and execution layer for electrical meter test systems.
//!
//! This library drives the three-phase power sources used to test energy
//! meters (MT768 meter test systems and FG30x frequency generators). It
//! contains the physical unit types, the amplifier capability catalog, the
//! loadpoint validator, the per-family wire codecs, the serial channel that
//! serializes commands to one device link, and the session objects built on
//! top of them. Dosage and reference meter sessions come with simulated
//! implementations driven by a source loadpoint.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use rust_mts::channel::{MockType, SerialChannel, TransportSelection};
//! use rust_mts::codec::DeviceFamily;
//! use rust_mts::source::{SerialPortSource, Source};
//!
//! #[tokio::main]
//! async fn main() -> rust_mts::Result<()> {
//!     let channel =
//!         SerialChannel::open(&TransportSelection::Mock(MockType::Mt), Duration::from_secs(5)).await?;
//!     let source = SerialPortSource::new(channel, DeviceFamily::Mt);
//!     println!("{:?}", source.firmware_version().await?);
//!     Ok(())
//! }
//! ```

pub mod capabilities;
pub mod channel;
pub mod coalesce;
pub mod codec;
pub mod config;
pub mod dosage;
pub mod error;
pub mod error_calculator;
pub mod loadpoint;
pub mod logging;
pub mod metering_system;
pub mod ref_meter;
pub mod retry;
pub mod source;
pub mod units;
pub mod validation;

pub use error::{MtsError, Rejection, Result};
pub use loadpoint::Loadpoint;
pub use source::Source;
