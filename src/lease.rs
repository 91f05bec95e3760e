//! Leadership leases.
//!
//! Leadership is delegated to an external lease service behind the
//! [`Leaser`] trait; the store itself carries no consensus logic. Any CP
//! backend can implement the trait. [`StaticLeaser`] covers single-node and
//! fixed-topology deployments where the primary never moves.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::Error;

/// Connection details for the current primary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryInfo {
    pub hostname: String,
    #[serde(rename = "advertise-url")]
    pub advertise_url: String,
}

/// A held primary lease. Must be renewed before its TTL elapses.
pub trait Lease: Send {
    fn ttl(&self) -> Duration;

    /// When the lease was last successfully renewed.
    fn renewed_at(&self) -> Instant;

    /// Renews the lease. `Error::LeaseExpired` is terminal; any other error
    /// is treated as transient and retried by the caller.
    fn renew(&mut self, ctx: &Context) -> Result<(), Error>;

    /// Releases the lease so another candidate can acquire it.
    fn close(&mut self) -> Result<(), Error>;
}

/// Lease management for primary election.
pub trait Leaser: Send + Sync {
    /// URL other nodes use to reach this node when it is primary.
    fn advertise_url(&self) -> String;

    /// Attempts to acquire the primary lease. Returns
    /// `Error::PrimaryExists` if another node already holds it.
    fn acquire(&self, ctx: &Context) -> Result<Box<dyn Lease>, Error>;

    /// Fetches info about the current primary. Returns `Error::NoPrimary`
    /// if no node currently holds the lease.
    fn primary_info(&self, ctx: &Context) -> Result<PrimaryInfo, Error>;
}

/// A leaser with a fixed, pre-configured primary. The designated primary
/// node always acquires; every other node always sees the static primary.
pub struct StaticLeaser {
    primary: bool,
    hostname: String,
    advertise_url: String,
}

const STATIC_LEASE_TTL: Duration = Duration::from_secs(30);

impl StaticLeaser {
    pub fn new(primary: bool, hostname: impl Into<String>, advertise_url: impl Into<String>) -> Self {
        Self {
            primary,
            hostname: hostname.into(),
            advertise_url: advertise_url.into(),
        }
    }
}

impl Leaser for StaticLeaser {
    fn advertise_url(&self) -> String {
        self.advertise_url.clone()
    }

    fn acquire(&self, _ctx: &Context) -> Result<Box<dyn Lease>, Error> {
        if self.primary {
            Ok(Box::new(StaticLease {
                renewed_at: Instant::now(),
            }))
        } else {
            Err(Error::PrimaryExists)
        }
    }

    fn primary_info(&self, _ctx: &Context) -> Result<PrimaryInfo, Error> {
        // The static primary has no one to learn about; everyone else is
        // pointed at it.
        if self.primary {
            Err(Error::NoPrimary)
        } else {
            Ok(PrimaryInfo {
                hostname: self.hostname.clone(),
                advertise_url: self.advertise_url.clone(),
            })
        }
    }
}

struct StaticLease {
    renewed_at: Instant,
}

impl Lease for StaticLease {
    fn ttl(&self) -> Duration {
        STATIC_LEASE_TTL
    }

    fn renewed_at(&self) -> Instant {
        self.renewed_at
    }

    fn renew(&mut self, _ctx: &Context) -> Result<(), Error> {
        self.renewed_at = Instant::now();
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
