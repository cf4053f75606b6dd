//! Static catalogs: regions, hardware tiers and failover strategies.
//!
//! Everything here is immutable process-wide data; lookups are pure.

pub mod regions;
pub mod strategies;
pub mod tiers;

pub use regions::{
    find_country, find_region, locations_to_region_codes, region_for_country, CountryDef,
    Location, RegionDef, COUNTRIES, REGIONS,
};
pub use strategies::{recommended_strategy, FailoverStrategy, StrategyKind, STRATEGIES};
pub use tiers::{PerformanceTier, TierKind, TIERS};

/// Ports opened on a new machine unless the user overrides them (SSH, Jupyter).
pub const DEFAULT_PORTS: &[u16] = &[22, 8888];
