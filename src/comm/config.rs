use crate::comm::error::CommInitError;
use std::net::SocketAddr;

/// Comm module configuration
#[derive(Debug, Clone)]
pub struct CommConfig {
    /// Listen address (default: 127.0.0.1)
    pub listen_addr: String,
    /// Listen port (default: 9710)
    pub listen_port: u16,
    /// Maximum payload size in bytes (default: 65536)
    pub max_payload_bytes: usize,
    /// Deduplication table capacity per client (default: 256)
    pub dedup_capacity: usize,
    /// Deduplication entry TTL in seconds (default: 300)
    pub dedup_ttl_secs: u64,
    /// How long to wait for the console's reply (default: 600)
    pub response_timeout_secs: u64,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1".to_string(),
            listen_port: 9710,
            max_payload_bytes: 65536,
            dedup_capacity: 256,
            dedup_ttl_secs: 300,
            response_timeout_secs: 600,
        }
    }
}

impl CommConfig {
    /// Returns the socket address to bind to
    pub fn bind_addr(&self) -> Result<SocketAddr, CommInitError> {
        format!("{}:{}", self.listen_addr, self.listen_port)
            .parse()
            .map_err(|e| CommInitError::InvalidAddress(format!("{}:{} ({})", self.listen_addr, self.listen_port, e)))
    }
}
