use std::env;
use std::fmt::Display;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::packer::{PackStrategy, Packer};

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub repack: RepackConfig,
    pub driver: DriverConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(env_string)
    }

    /// Creates a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            repack: RepackConfig::from_lookup(&lookup),
            driver: DriverConfig::from_lookup(&lookup),
        }
    }
}

/// Tuning knobs of the repacking pipeline.
///
/// Pallet dimensions are fixed; everything else has a compile-time default
/// that the environment may override.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepackConfig {
    /// Number of pack lines; `None` means one per logical CPU.
    pub workers: Option<usize>,
    /// A batch is repacked as soon as it holds more boxes than this.
    pub max_box_count: usize,
    /// Percentage of trucks parked until shutdown (0 to 100).
    pub restposten_factor: u8,
    /// Channel slots per pack line.
    pub truck_factor: usize,
    pub strategy: PackStrategy,
    /// Seed for the deferral decision; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl RepackConfig {
    pub const DEFAULT_MAX_BOX_COUNT: usize = 200;
    pub const DEFAULT_RESTPOSTEN_FACTOR: u8 = 50;
    pub const DEFAULT_TRUCK_FACTOR: usize = 4;

    const WORKERS_VAR: &'static str = "TRUCK_REPACKER_WORKERS";
    const MAX_BOX_COUNT_VAR: &'static str = "TRUCK_REPACKER_MAX_BOX_COUNT";
    const RESTPOSTEN_FACTOR_VAR: &'static str = "TRUCK_REPACKER_RESTPOSTEN_FACTOR";
    const TRUCK_FACTOR_VAR: &'static str = "TRUCK_REPACKER_TRUCK_FACTOR";
    const STRATEGY_VAR: &'static str = "TRUCK_REPACKER_STRATEGY";
    const SEED_VAR: &'static str = "TRUCK_REPACKER_SEED";

    /// Creates a builder for a custom configuration.
    pub fn builder() -> RepackConfigBuilder {
        RepackConfigBuilder::default()
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let workers = load_optional(lookup, Self::WORKERS_VAR, |v: &usize| *v > 0, "must be greater than 0");

        let max_box_count = load_with_warning(
            lookup,
            Self::MAX_BOX_COUNT_VAR,
            Self::DEFAULT_MAX_BOX_COUNT,
            |_| true,
            "must be a non-negative integer",
        );

        let restposten_factor = load_with_warning(
            lookup,
            Self::RESTPOSTEN_FACTOR_VAR,
            Self::DEFAULT_RESTPOSTEN_FACTOR,
            |v| *v <= 100,
            "must be between 0 and 100",
        );

        let truck_factor = load_with_warning(
            lookup,
            Self::TRUCK_FACTOR_VAR,
            Self::DEFAULT_TRUCK_FACTOR,
            |v| *v > 0,
            "must be greater than 0",
        );

        let strategy = load_with_warning(
            lookup,
            Self::STRATEGY_VAR,
            PackStrategy::default(),
            |_| true,
            "must be 'ffd' or 'mffd'",
        );

        let seed = load_optional(lookup, Self::SEED_VAR, |_: &u64| true, "must be an unsigned integer");

        if max_box_count != Self::DEFAULT_MAX_BOX_COUNT {
            info!(
                max_box_count,
                "adjusted batch threshold changes packing density and latency"
            );
        }

        Self::builder()
            .workers(workers)
            .max_box_count(max_box_count)
            .restposten_factor(restposten_factor)
            .truck_factor(truck_factor)
            .strategy(strategy)
            .seed(seed)
            .build()
    }

    /// Number of pack lines to spawn.
    pub fn worker_count(&self) -> usize {
        self.workers
            .filter(|n| *n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1)
            })
    }

    /// Suggested capacity for the input and output channels.
    pub fn channel_capacity(&self) -> usize {
        self.worker_count() * self.truck_factor.max(1)
    }

    pub fn packer(&self) -> Arc<dyn Packer> {
        self.strategy.packer()
    }
}

impl Default for RepackConfig {
    fn default() -> Self {
        Self {
            workers: None,
            max_box_count: Self::DEFAULT_MAX_BOX_COUNT,
            restposten_factor: Self::DEFAULT_RESTPOSTEN_FACTOR,
            truck_factor: Self::DEFAULT_TRUCK_FACTOR,
            strategy: PackStrategy::default(),
            seed: None,
        }
    }
}

/// Builder for RepackConfig.
#[derive(Clone, Debug, Default)]
pub struct RepackConfigBuilder {
    config: RepackConfig,
}

impl RepackConfigBuilder {
    pub fn workers(mut self, workers: Option<usize>) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn max_box_count(mut self, count: usize) -> Self {
        self.config.max_box_count = count;
        self
    }

    /// Sets the deferral percentage, clamped to 100.
    pub fn restposten_factor(mut self, factor: u8) -> Self {
        self.config.restposten_factor = factor.min(100);
        self
    }

    pub fn truck_factor(mut self, factor: usize) -> Self {
        self.config.truck_factor = factor;
        self
    }

    pub fn strategy(mut self, strategy: PackStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn build(self) -> RepackConfig {
        self.config
    }
}

/// Settings of the demo driver: how much synthetic traffic to generate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    pub trucks: usize,
    pub generator_seed: u64,
    /// Upper bound of occupied cells per generated pallet.
    pub pallet_fill: u8,
    pub json_summary: bool,
}

impl DriverConfig {
    pub const DEFAULT_TRUCKS: usize = 100;
    pub const DEFAULT_GENERATOR_SEED: u64 = 1337;
    pub const DEFAULT_PALLET_FILL: u8 = 12;

    const TRUCKS_VAR: &'static str = "TRUCK_REPACKER_GENERATE";
    const GENERATOR_SEED_VAR: &'static str = "TRUCK_REPACKER_GENERATOR_SEED";
    const PALLET_FILL_VAR: &'static str = "TRUCK_REPACKER_PALLET_FILL";
    const JSON_SUMMARY_VAR: &'static str = "TRUCK_REPACKER_JSON_SUMMARY";

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            trucks: load_with_warning(
                lookup,
                Self::TRUCKS_VAR,
                Self::DEFAULT_TRUCKS,
                |_| true,
                "must be a non-negative integer",
            ),
            generator_seed: load_with_warning(
                lookup,
                Self::GENERATOR_SEED_VAR,
                Self::DEFAULT_GENERATOR_SEED,
                |_| true,
                "must be an unsigned integer",
            ),
            pallet_fill: load_with_warning(
                lookup,
                Self::PALLET_FILL_VAR,
                Self::DEFAULT_PALLET_FILL,
                |v| (1..=16).contains(v),
                "must be between 1 and 16",
            ),
            json_summary: lookup(Self::JSON_SUMMARY_VAR)
                .and_then(|raw| parse_bool(&raw, Self::JSON_SUMMARY_VAR))
                .unwrap_or(false),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            trucks: Self::DEFAULT_TRUCKS,
            generator_seed: Self::DEFAULT_GENERATOR_SEED,
            pallet_fill: Self::DEFAULT_PALLET_FILL,
            json_summary: false,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!("access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

fn load_with_warning<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    default: T,
    validator: impl Fn(&T) -> bool,
    invalid_hint: &str,
) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(var_name) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) if validator(&value) => value,
            Ok(_) => {
                warn!(
                    "{} contains invalid value '{}': {}. Using {}.",
                    var_name, raw, invalid_hint, default
                );
                default
            }
            Err(err) => {
                warn!(
                    "could not parse {} ('{}'): {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}

fn load_optional<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    validator: impl Fn(&T) -> bool,
    invalid_hint: &str,
) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(var_name)?;
    match raw.trim().parse::<T>() {
        Ok(value) if validator(&value) => Some(value),
        Ok(_) => {
            warn!("{} contains invalid value '{}': {}. Ignoring it.", var_name, raw, invalid_hint);
            None
        }
        Err(err) => {
            warn!("could not parse {} ('{}'): {}. Ignoring it.", var_name, raw, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_parse_bool_values() {
        assert_eq!(parse_bool("1", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool(" Yes ", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("ON", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("0", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("off", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("maybe", "TEST_VAR"), None);
        assert_eq!(parse_bool("", "TEST_VAR"), None);
    }

    #[test]
    fn test_defaults_without_variables() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config.repack, RepackConfig::default());
        assert_eq!(config.driver, DriverConfig::default());
        assert_eq!(config.repack.strategy, PackStrategy::Mffd);
        assert_eq!(config.repack.restposten_factor, 50);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("TRUCK_REPACKER_WORKERS", "3"),
            ("TRUCK_REPACKER_MAX_BOX_COUNT", "40"),
            ("TRUCK_REPACKER_RESTPOSTEN_FACTOR", "0"),
            ("TRUCK_REPACKER_STRATEGY", "ffd"),
            ("TRUCK_REPACKER_SEED", "99"),
            ("TRUCK_REPACKER_GENERATE", "12"),
            ("TRUCK_REPACKER_JSON_SUMMARY", "true"),
        ]));
        assert_eq!(config.repack.worker_count(), 3);
        assert_eq!(config.repack.max_box_count, 40);
        assert_eq!(config.repack.restposten_factor, 0);
        assert_eq!(config.repack.strategy, PackStrategy::Ffd);
        assert_eq!(config.repack.seed, Some(99));
        assert_eq!(config.repack.channel_capacity(), 12);
        assert_eq!(config.driver.trucks, 12);
        assert!(config.driver.json_summary);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("TRUCK_REPACKER_WORKERS", "0"),
            ("TRUCK_REPACKER_RESTPOSTEN_FACTOR", "150"),
            ("TRUCK_REPACKER_TRUCK_FACTOR", "zero"),
            ("TRUCK_REPACKER_STRATEGY", "best-fit"),
            ("TRUCK_REPACKER_PALLET_FILL", "17"),
        ]));
        assert_eq!(config.repack.workers, None);
        assert_eq!(config.repack.restposten_factor, RepackConfig::DEFAULT_RESTPOSTEN_FACTOR);
        assert_eq!(config.repack.truck_factor, RepackConfig::DEFAULT_TRUCK_FACTOR);
        assert_eq!(config.repack.strategy, PackStrategy::Mffd);
        assert_eq!(config.driver.pallet_fill, DriverConfig::DEFAULT_PALLET_FILL);
    }

    #[test]
    fn test_builder_clamps_restposten_factor() {
        let config = RepackConfig::builder()
            .restposten_factor(250)
            .workers(Some(2))
            .build();
        assert_eq!(config.restposten_factor, 100);
        assert_eq!(config.worker_count(), 2);
        assert!(RepackConfig::default().worker_count() >= 1);
    }
}
