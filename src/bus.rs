//! Bus capability injected into device drivers.
//!
//! The controller core never touches electrical timing itself: a port
//! implementation (external to this crate) owns the wire protocol and exposes
//! whole-frame transfers. When no port library is present the bus is the
//! explicit `Simulated` state and every driver reports deterministic zeros.

use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
pub enum BusError {
    Io(std::io::Error),
    /// The handle was released before the transfer.
    Closed,
    /// Free-form failure reported by the port implementation.
    Port(String),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Io(e) => write!(f, "i/o error: {}", e),
            BusError::Closed => write!(f, "bus handle already closed"),
            BusError::Port(s) => write!(f, "port error: {}", s),
        }
    }
}

impl std::error::Error for BusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BusError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BusError {
    fn from(value: std::io::Error) -> Self {
        BusError::Io(value)
    }
}

/// Opaque handle to one open slave line, owned by exactly one driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiHandle(pub u32);

/// Byte-level transfer capability over the board's I/O bus.
///
/// `transfer` returns the bytes received during the exchange; their length is
/// the received count.
pub trait SpiPort: Send + Sync {
    fn open(&self, channel: u8, baud: u32, flags: u32) -> Result<SpiHandle, BusError>;
    fn transfer(&self, handle: SpiHandle, tx: &[u8]) -> Result<Vec<u8>, BusError>;
    fn close(&self, handle: SpiHandle) -> Result<(), BusError>;
}

/// Two-state bus: a live port, or none at all. Absence is a typed state every
/// driver matches on, not an error path.
#[derive(Clone)]
pub enum Bus {
    Live(Arc<dyn SpiPort>),
    Simulated,
}

impl Bus {
    pub fn is_simulated(&self) -> bool {
        matches!(self, Bus::Simulated)
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bus::Live(_) => f.write_str("Bus::Live"),
            Bus::Simulated => f.write_str("Bus::Simulated"),
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted in-memory port: records opens and transmitted frames, replays
    /// canned responses in order.
    #[derive(Default)]
    pub struct ScriptedPort {
        pub responses: Mutex<VecDeque<Vec<u8>>>,
        pub opened: Mutex<Vec<(u8, u32, u32)>>,
        pub sent: Mutex<Vec<Vec<u8>>>,
        pub closed: Mutex<Vec<SpiHandle>>,
    }

    impl ScriptedPort {
        pub fn with_responses(responses: Vec<Vec<u8>>) -> Arc<Self> {
            let port = Self::default();
            *port.responses.lock().unwrap() = responses.into();
            Arc::new(port)
        }
    }

    impl SpiPort for ScriptedPort {
        fn open(&self, channel: u8, baud: u32, flags: u32) -> Result<SpiHandle, BusError> {
            let mut opened = self.opened.lock().unwrap();
            opened.push((channel, baud, flags));
            Ok(SpiHandle(opened.len() as u32 - 1))
        }

        fn transfer(&self, _handle: SpiHandle, tx: &[u8]) -> Result<Vec<u8>, BusError> {
            self.sent.lock().unwrap().push(tx.to_vec());
            let scripted = self.responses.lock().unwrap().pop_front();
            Ok(scripted.unwrap_or_else(|| vec![0; tx.len()]))
        }

        fn close(&self, handle: SpiHandle) -> Result<(), BusError> {
            self.closed.lock().unwrap().push(handle);
            Ok(())
        }
    }
}
