//! Nullable gas oracle: a settable price that can be made to fail.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use keel_scheduler::{GasOracle, OracleError, GWEI};

pub struct NullGasOracle {
    price: Mutex<u128>,
    unavailable: AtomicBool,
    queries: AtomicU64,
}

impl NullGasOracle {
    pub fn new(price_wei: u128) -> Self {
        Self {
            price: Mutex::new(price_wei),
            unavailable: AtomicBool::new(false),
            queries: AtomicU64::new(0),
        }
    }

    pub fn gwei(gwei: u64) -> Self {
        Self::new(u128::from(gwei) * GWEI)
    }

    pub fn set_price(&self, price_wei: u128) {
        if let Ok(mut price) = self.price.lock() {
            *price = price_wei;
        }
    }

    /// Make every query fail until called again with `false`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// How many times the price was asked for.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GasOracle for NullGasOracle {
    async fn gas_price(&self) -> Result<u128, OracleError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OracleError::Unreachable("null oracle offline".into()));
        }
        self.price
            .lock()
            .map(|price| *price)
            .map_err(|e| OracleError::Unreachable(e.to_string()))
    }
}
