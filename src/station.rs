//! Modbus station addressing.

use std::{fmt, num::ParseIntError, str::FromStr};

/// Station identifier, a single byte on the wire.
pub type StationId = u8;

/// A single byte for addressing Modbus devices on a serial bus
/// or via the TCP unit identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Station(pub StationId);

impl Station {
    /// The special address for sending a broadcast message to all
    /// connected Modbus devices at once. Broadcast messages are
    /// one-way and sent from the client to all servers, i.e.
    /// a request without a response.
    #[must_use]
    pub const fn broadcast() -> Self {
        Station(0)
    }

    /// The minimum address of a single Modbus device.
    #[must_use]
    pub const fn min_device() -> Self {
        Station(1)
    }

    /// The maximum address of a single Modbus device.
    #[must_use]
    pub const fn max_device() -> Self {
        Station(247)
    }

    /// The reserved address for sending a message to a directly
    /// connected Modbus TCP device, i.e. if not forwarded through
    /// a TCP/RTU gateway according to the unit identifier.
    ///
    /// [Modbus Messaging on TCP/IP Implementation Guide](http://www.modbus.org/docs/Modbus_Messaging_Implementation_Guide_V1_0b.pdf), page 23
    /// "On TCP/IP, the Modbus server is addressed using its IP address; therefore,
    /// the Modbus Unit Identifier is useless. The value 0xFF has to be used."
    #[must_use]
    pub const fn tcp_device() -> Self {
        Station(255)
    }

    /// Check if this address is the broadcast address.
    #[must_use]
    pub fn is_broadcast(self) -> bool {
        self == Self::broadcast()
    }

    /// Check if this address addresses a single device.
    #[must_use]
    pub fn is_single_device(self) -> bool {
        self >= Self::min_device() && self <= Self::max_device()
    }

    /// Check if this address is reserved.
    #[must_use]
    pub fn is_reserved(self) -> bool {
        self > Self::max_device()
    }
}

impl From<StationId> for Station {
    fn from(from: StationId) -> Self {
        Station(from)
    }
}

impl From<Station> for StationId {
    fn from(from: Station) -> Self {
        from.0
    }
}

impl FromStr for Station {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let station_id = match s.parse::<u8>() {
            Ok(station_id) => Ok(station_id),
            Err(err) => {
                if let Some(stripped) = s.strip_prefix("0x") {
                    u8::from_str_radix(stripped, 16)
                } else {
                    Err(err)
                }
            }
        }?;
        Ok(Station(station_id))
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:0>2X})", self.0, self.0)
    }
}

/// Stateful management of the currently addressed station.
///
/// Serial devices are addressed by their assigned station address.
///
/// TCP devices are either addressed directly (= implicitly) by using the
/// reserved *unit id* `Station::tcp_device() = 0xFF` (default) or indirectly
/// through a TCP/RTU gateway by setting the *unit id* to the desired
/// station address.
pub trait StationContext {
    /// Select a station for all subsequent outgoing requests.
    fn set_station(&mut self, station: Station);
}
