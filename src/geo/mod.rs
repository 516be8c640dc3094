//! Postal code geolocation and travel time estimation
//!
//! # Overview
//!
//! Crews drive between jobs, so every slot has to leave room for the trip in
//! from the previous location and the trip out to the next one. This module
//! turns location codes into coordinates and coordinates into drive time.
//!
//! ```text
//! ┌─────────────┐   coordinates_for   ┌──────────────┐
//! │ "78701"     │ ──────────────────▶ │ (lat, lon)   │
//! └─────────────┘  exact / prefix /   └──────┬───────┘
//!                  default fallback          │ haversine
//!                                            ▼
//!                                   ┌──────────────────┐
//!                                   │ miles / mph      │
//!                                   │ → minutes (≥12)  │
//!                                   └──────────────────┘
//! ```
//!
//! The estimate is a fixed-speed great-circle approximation. It is cheap and
//! deterministic, which is what the slot search needs: it runs many times per
//! request and must give the same answer on every call.

use std::collections::BTreeMap;
use std::ops::Bound;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GeoConfig;
use crate::utils::normalize_location_code;

/// Mean Earth radius in statute miles
const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Default average driving speed
pub const DEFAULT_SPEED_MPH: f64 = 30.0;

/// Default lower bound for any single trip
pub const DEFAULT_MINIMUM_TRAVEL_MINUTES: u32 = 12;

/// Latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in miles
    pub fn distance_miles(&self, other: &Coordinates) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_MILES * a.sqrt().min(1.0).asin()
    }
}

/// Estimated drive between two locations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelEstimate {
    pub minutes: u32,
    pub miles: f64,
}

/// How a location code was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The code is in the table
    Exact,
    /// Nearest code sharing the longest prefix
    Prefix(String),
    /// Nothing matched; the configured default was used
    Default,
}

/// Source of travel times for the slot search
pub trait TravelModel: Send + Sync {
    /// Estimate the drive from one location code to another
    fn estimate(&self, from: &str, to: &str) -> TravelEstimate;
}

/// Table-driven estimator using haversine distance at a fixed average speed
#[derive(Debug, Clone)]
pub struct GeoEstimator {
    locations: BTreeMap<String, Coordinates>,
    default: Coordinates,
    average_speed_mph: f64,
    minimum_minutes: u32,
}

impl Default for GeoEstimator {
    fn default() -> Self {
        Self::from_config(&GeoConfig::default())
    }
}

impl GeoEstimator {
    /// Create an empty estimator; unknown codes resolve to `default`
    pub fn new(default: Coordinates) -> Self {
        Self {
            locations: BTreeMap::new(),
            default,
            average_speed_mph: DEFAULT_SPEED_MPH,
            minimum_minutes: DEFAULT_MINIMUM_TRAVEL_MINUTES,
        }
    }

    /// Build from the `[geo]` configuration section
    pub fn from_config(config: &GeoConfig) -> Self {
        let mut estimator = Self::new(Coordinates::new(config.default_lat, config.default_lon))
            .with_speed(config.average_speed_mph)
            .with_minimum_minutes(config.minimum_travel_minutes);
        for entry in &config.locations {
            estimator.insert(&entry.code, Coordinates::new(entry.lat, entry.lon));
        }
        estimator
    }

    pub fn with_location(mut self, code: &str, coordinates: Coordinates) -> Self {
        self.insert(code, coordinates);
        self
    }

    pub fn with_speed(mut self, mph: f64) -> Self {
        self.average_speed_mph = mph;
        self
    }

    pub fn with_minimum_minutes(mut self, minutes: u32) -> Self {
        self.minimum_minutes = minutes;
        self
    }

    pub fn insert(&mut self, code: &str, coordinates: Coordinates) {
        self.locations
            .insert(normalize_location_code(code), coordinates);
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Coordinates for a location code, never failing
    pub fn coordinates_for(&self, code: &str) -> Coordinates {
        self.resolve(code).0
    }

    /// Coordinates plus how they were found
    pub fn resolve(&self, code: &str) -> (Coordinates, Resolution) {
        let key = normalize_location_code(code);

        if let Some(coords) = self.locations.get(&key) {
            return (*coords, Resolution::Exact);
        }

        let char_len = key.chars().count();
        for prefix_len in (1..char_len).rev() {
            let prefix: String = key.chars().take(prefix_len).collect();
            if let Some((nearest, coords)) = self.nearest_with_prefix(&key, &prefix) {
                debug!(code = %key, matched = %nearest, "Resolved location by prefix");
                return (coords, Resolution::Prefix(nearest));
            }
        }

        debug!(code = %key, "Unknown location code, using default coordinates");
        (self.default, Resolution::Default)
    }

    /// Pick among codes starting with `prefix`: numerically closest for digit
    /// codes, otherwise the lexicographically smallest.
    fn nearest_with_prefix(&self, key: &str, prefix: &str) -> Option<(String, Coordinates)> {
        let mut candidates = self
            .locations
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(code, _)| code.starts_with(prefix))
            .peekable();

        let (first_code, first_coords) = candidates.peek().copied()?;

        let Some(target) = parse_digits(key) else {
            return Some((first_code.clone(), *first_coords));
        };

        let mut best: Option<(&String, &Coordinates, u64)> = None;
        for (code, coords) in candidates {
            let Some(value) = parse_digits(code) else {
                continue;
            };
            let diff = value.abs_diff(target);
            if best.map_or(true, |(_, _, d)| diff < d) {
                best = Some((code, coords, diff));
            }
        }

        let (code, coords) = best.map_or((first_code, first_coords), |(c, xy, _)| (c, xy));
        Some((code.clone(), *coords))
    }

    /// Drive estimate between two location codes
    pub fn travel_estimate(&self, from: &str, to: &str) -> TravelEstimate {
        let miles = self
            .coordinates_for(from)
            .distance_miles(&self.coordinates_for(to));
        self.estimate_for_distance(miles)
    }

    /// Convert a distance into drive time, applying the floor
    pub fn estimate_for_distance(&self, miles: f64) -> TravelEstimate {
        let raw = if self.average_speed_mph > 0.0 {
            (miles / self.average_speed_mph * 60.0).round()
        } else {
            0.0
        };
        let minutes = (raw as u32).max(self.minimum_minutes);

        TravelEstimate {
            minutes,
            miles: (miles * 10.0).round() / 10.0,
        }
    }
}

impl TravelModel for GeoEstimator {
    fn estimate(&self, from: &str, to: &str) -> TravelEstimate {
        self.travel_estimate(from, to)
    }
}

fn parse_digits(code: &str) -> Option<u64> {
    if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    code.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GeoEstimator {
        GeoEstimator::new(Coordinates::new(40.0, -75.0))
            .with_location("Z1", Coordinates::new(40.0, -75.0))
            .with_location("Z2", Coordinates::new(40.1085, -75.0))
            .with_location("Z3", Coordinates::new(39.8915, -75.0))
    }

    #[test]
    fn test_exact_lookup_is_normalized() {
        let geo = grid();
        assert_eq!(geo.resolve(" z2 ").1, Resolution::Exact);
        assert_eq!(geo.coordinates_for("z2"), Coordinates::new(40.1085, -75.0));
    }

    #[test]
    fn test_travel_minutes_at_thirty_mph() {
        let geo = grid();
        assert_eq!(geo.travel_estimate("Z1", "Z2").minutes, 15);
        assert_eq!(geo.travel_estimate("Z3", "Z1").minutes, 15);
        assert_eq!(geo.travel_estimate("Z2", "Z3").minutes, 30);
        assert!((geo.travel_estimate("Z1", "Z2").miles - 7.5).abs() < 0.11);
    }

    #[test]
    fn test_travel_floor_applies_to_short_trips() {
        let geo = grid();
        let same = geo.travel_estimate("Z1", "Z1");
        assert_eq!(same.minutes, DEFAULT_MINIMUM_TRAVEL_MINUTES);
        assert_eq!(same.miles, 0.0);
    }

    #[test]
    fn test_numeric_prefix_picks_closest() {
        let geo = GeoEstimator::new(Coordinates::new(0.0, 0.0))
            .with_location("78701", Coordinates::new(30.27, -97.74))
            .with_location("78745", Coordinates::new(30.21, -97.80))
            .with_location("78660", Coordinates::new(30.44, -97.62));

        let (coords, how) = geo.resolve("78741");
        assert_eq!(how, Resolution::Prefix("78745".to_string()));
        assert_eq!(coords, Coordinates::new(30.21, -97.80));

        let (_, how) = geo.resolve("78699");
        assert_eq!(how, Resolution::Prefix("78660".to_string()));
    }

    #[test]
    fn test_alphanumeric_prefix_picks_smallest() {
        let geo = GeoEstimator::new(Coordinates::new(0.0, 0.0))
            .with_location("SW1A1AA", Coordinates::new(51.50, -0.14))
            .with_location("SW1P3BU", Coordinates::new(51.49, -0.13));

        assert_eq!(
            geo.resolve("sw1x 9zz").1,
            Resolution::Prefix("SW1A1AA".to_string())
        );
    }

    #[test]
    fn test_unknown_code_uses_default() {
        let geo = grid();
        let (coords, how) = geo.resolve("99999");
        assert_eq!(how, Resolution::Default);
        assert_eq!(coords, Coordinates::new(40.0, -75.0));
    }

    #[test]
    fn test_zero_speed_falls_back_to_floor() {
        let geo = grid().with_speed(0.0);
        assert_eq!(geo.travel_estimate("Z1", "Z3").minutes, 12);
    }
}
