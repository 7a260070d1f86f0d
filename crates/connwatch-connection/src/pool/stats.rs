//! Pool statistics types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Point-in-time counters of a connection pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PoolStats {
    /// Connections that exist right now (idle + active)
    total: usize,
    idle: usize,
    /// Connections checked out by callers
    active: usize,
    /// Callers blocked waiting for a slot
    waiting: usize,
    max_size: usize,
}

impl PoolStats {
    pub fn new(total: usize, idle: usize, active: usize, waiting: usize, max_size: usize) -> Self {
        Self {
            total,
            idle,
            active,
            waiting,
            max_size,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn idle(&self) -> usize {
        self.idle
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn waiting(&self) -> usize {
        self.waiting
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Fraction of the pool's max-total currently checked out (0.0 to 1.0)
    ///
    /// Returns 0.0 for a pool without capacity.
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.active as f64 / self.max_size as f64
        }
    }

    /// Every slot is checked out; the next caller has to wait
    pub fn is_exhausted(&self) -> bool {
        self.max_size > 0 && self.active >= self.max_size
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "active={} idle={} waiting={} max={}",
            self.active, self.idle, self.waiting, self.max_size
        )
    }
}
