//! # Router Configuration
//!
//! Tunables for a [`Router`](crate::Router), loadable from the environment or
//! embedded in an application's own config file through `serde`.
//!
//! ## Environment Variables
//!
//! ### `NIMBUS_STRICT_PARAMS`
//!
//! `true` rejects registrations whose parameter name differs from the one
//! already occupying the same tree position (`/items/:id` vs
//! `/items/:slug/reviews`). Default `false`: the newer name replaces the old
//! one and a warning is logged.
//!
//! ### `NIMBUS_POOL_CAPACITY`
//!
//! Idle request contexts kept per dispatching thread. `0` disables pooling.
//! Default `64`.
//!
//! ### `NIMBUS_MAX_POOLED_MAP_CAPACITY`
//!
//! Collections inside a released context that grew beyond this many entries
//! are reallocated instead of cleared. Default `32`.
//!
//! ### `NIMBUS_SLOW_MATCH_US`
//!
//! Route resolution slower than this many microseconds is logged at `warn`.
//! Accepts decimal or `0x` hexadecimal. Default `1000`.
//!
//! ## Usage
//!
//! ```rust
//! use nimbus::runtime_config::RouterConfig;
//!
//! let config = RouterConfig::from_env();
//! let router = nimbus::Router::with_config(config);
//! ```

use std::env;

use serde::Deserialize;

use crate::router::ParamPolicy;

const DEFAULT_POOL_CAPACITY: usize = 64;
const DEFAULT_MAX_POOLED_MAP_CAPACITY: usize = 32;
const DEFAULT_SLOW_MATCH_US: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub strict_params: bool,
    pub pool_capacity: usize,
    pub max_pooled_map_capacity: usize,
    pub slow_match_threshold_us: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strict_params: false,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            max_pooled_map_capacity: DEFAULT_MAX_POOLED_MAP_CAPACITY,
            slow_match_threshold_us: DEFAULT_SLOW_MATCH_US,
        }
    }
}

impl RouterConfig {
    /// Load configuration from `NIMBUS_*` environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            strict_params: get("NIMBUS_STRICT_PARAMS")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.strict_params),
            pool_capacity: get("NIMBUS_POOL_CAPACITY")
                .and_then(|v| parse_number(&v))
                .unwrap_or(defaults.pool_capacity as u64) as usize,
            max_pooled_map_capacity: get("NIMBUS_MAX_POOLED_MAP_CAPACITY")
                .and_then(|v| parse_number(&v))
                .unwrap_or(defaults.max_pooled_map_capacity as u64)
                as usize,
            slow_match_threshold_us: get("NIMBUS_SLOW_MATCH_US")
                .and_then(|v| parse_number(&v))
                .unwrap_or(defaults.slow_match_threshold_us),
        }
    }

    #[must_use]
    pub fn param_policy(&self) -> ParamPolicy {
        if self.strict_params {
            ParamPolicy::Reject
        } else {
            ParamPolicy::LastWriteWins
        }
    }
}

fn parse_number(val: &str) -> Option<u64> {
    let val = val.trim();
    match val.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
