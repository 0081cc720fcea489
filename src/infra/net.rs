//! Port allocation and TCP readiness probing.

use std::net::TcpListener;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

use crate::application::ports::{PortAllocator, ReadinessGate, ReadinessWaiter};
use crate::infra::config::Settings;

/// Allocates ports by binding to port zero and taking what the OS hands out.
pub struct OsPortAllocator;

impl PortAllocator for OsPortAllocator {
    fn allocate_port(&self) -> Result<u16> {
        let listener =
            TcpListener::bind(("127.0.0.1", 0)).context("binding a probe socket")?;
        let port = listener
            .local_addr()
            .context("reading the probe socket address")?
            .port();
        Ok(port)
    }
}

/// Readiness gate that polls the instance's TCP port until it accepts a
/// connection or the deadline passes.
pub struct TcpReadinessGate {
    timeout: Duration,
    poll_interval: Duration,
}

impl TcpReadinessGate {
    #[must_use]
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.ready_timeout(), settings.ready_poll_interval())
    }
}

impl ReadinessGate for TcpReadinessGate {
    type Waiter = TcpWaiter;

    fn acquire(&self, name: &str, port: u16) -> Result<TcpWaiter> {
        Ok(TcpWaiter {
            name: name.to_owned(),
            port,
            timeout: self.timeout,
            poll_interval: self.poll_interval,
        })
    }
}

/// Scoped waiter for one start attempt. Holds only its deadline parameters,
/// so release on drop is trivial.
pub struct TcpWaiter {
    name: String,
    port: u16,
    timeout: Duration,
    poll_interval: Duration,
}

impl ReadinessWaiter for TcpWaiter {
    async fn wait_ready(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match TcpStream::connect(("127.0.0.1", self.port)).await {
                Ok(_) => {
                    debug!(app = %self.name, port = self.port, "port answered");
                    return Ok(());
                }
                Err(_) if Instant::now() < deadline => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => {
                    return Err(anyhow::anyhow!(
                        "app '{}' did not answer on port {} within {:?}: {e}",
                        self.name,
                        self.port,
                        self.timeout
                    ));
                }
            }
        }
    }
}
