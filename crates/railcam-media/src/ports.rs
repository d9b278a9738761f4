//! UDP port pool for segment workers.

use std::collections::BTreeSet;

use crate::error::{MediaError, MediaResult};

/// Fixed set of UDP ports; each live segment worker holds exactly one.
#[derive(Debug, Clone)]
pub struct PortPool {
    configured: BTreeSet<u16>,
    free: BTreeSet<u16>,
}

impl PortPool {
    pub fn new(ports: impl IntoIterator<Item = u16>) -> Self {
        let configured: BTreeSet<u16> = ports.into_iter().collect();
        Self {
            free: configured.clone(),
            configured,
        }
    }

    /// Parse a comma separated list such as `5001,5002,5003`.
    pub fn parse(list: &str) -> MediaResult<Self> {
        let ports = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u16>()
                    .map_err(|_| MediaError::InvalidPortList(format!("not a port: {s}")))
            })
            .collect::<MediaResult<Vec<_>>>()?;
        if ports.is_empty() {
            return Err(MediaError::InvalidPortList("no ports configured".to_string()));
        }
        Ok(Self::new(ports))
    }

    /// Take any free port.
    pub fn allocate(&mut self) -> MediaResult<u16> {
        self.free.pop_first().ok_or(MediaError::PortPoolExhausted {
            pool_size: self.configured.len(),
        })
    }

    /// Return a port to the pool. Ports outside the pool are ignored.
    pub fn release(&mut self, port: u16) {
        if self.configured.contains(&port) {
            self.free.insert(port);
        }
    }

    /// Number of configured ports.
    pub fn len(&self) -> usize {
        self.configured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configured.is_empty()
    }

    /// Number of free ports.
    pub fn available(&self) -> usize {
        self.free.len()
    }
}
