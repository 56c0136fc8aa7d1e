use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for a broker instance.
///
/// The lease duration applies to every claim; a worker that has not reported
/// a terminal result within `lease_secs` of claiming loses its claim and the
/// job becomes eligible for other workers again.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Address the HTTP API listens on.
    pub listen_addr: SocketAddr,

    /// Lease duration granted to each claim, in seconds.
    pub lease_secs: u64,

    /// Interval between active lease sweeps, in seconds. Zero disables the
    /// sweep; expired leases are then only reclaimed lazily at claim time.
    pub sweep_interval_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:7171"
                .parse()
                .expect("default listen address is valid"),
            lease_secs: 60,
            sweep_interval_secs: 10,
        }
    }
}

impl BrokerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_lease_secs(mut self, lease_secs: u64) -> Self {
        self.lease_secs = lease_secs;
        self
    }

    pub fn with_sweep_interval_secs(mut self, sweep_interval_secs: u64) -> Self {
        self.sweep_interval_secs = sweep_interval_secs;
        self
    }

    /// Lease duration as a chrono duration, for arithmetic on job timestamps.
    pub fn lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_secs as i64)
    }

    /// Sweep interval, or `None` when the active sweep is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        if self.sweep_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.sweep_interval_secs))
        }
    }
}
