use std::net::Ipv4Addr;

/// Largest datagram a single receive can return.
pub const MAX_DATAGRAM_LEN: usize = 65535;

/// Settings for one capture session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Local address the raw socket is bound to
    pub bind_address: Ipv4Addr,
    /// Receive buffer size in bytes
    pub buffer_size: usize,
    /// Recognized filters. They are carried with the session but the
    /// capture loop reports every packet regardless.
    pub filters: MonitorFilters,
}

impl CaptureConfig {
    pub fn new(bind_address: Ipv4Addr) -> Self {
        Self {
            bind_address,
            buffer_size: MAX_DATAGRAM_LEN,
            filters: MonitorFilters::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorFilters {
    pub protocols: Vec<String>,
    pub sources: Vec<Ipv4Addr>,
    pub destinations: Vec<Ipv4Addr>,
    pub source_ports: Vec<u16>,
    pub destination_ports: Vec<u16>,
}

impl Default for MonitorFilters {
    fn default() -> Self {
        Self {
            protocols: vec!["ICMP".to_string(), "TCP".to_string(), "UDP".to_string()],
            sources: Vec::new(),
            destinations: Vec::new(),
            source_ports: Vec::new(),
            destination_ports: Vec::new(),
        }
    }
}

impl MonitorFilters {
    /// True when any option differs from the defaults.
    pub fn is_customized(&self) -> bool {
        *self != MonitorFilters::default()
    }
}
