//! # Location Directory
//!
//! City/region-level generalization of raw location references, plus the
//! centroid and population data the clusterer and recommender need.
//!
//! - Loads from JSON (`config/locations.json`), empty directory on error.
//! - Resolution order: explicit id → "…, city, region" address → nearest
//!   centroid to raw coordinates (within `SNAP_RADIUS_KM`).
//! - Raw coordinates and street detail never leave this module.

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

use crate::error::PipelineError;
use crate::records::LocationRef;

pub const DEFAULT_LOCATIONS_PATH: &str = "config/locations.json";

/// Raw coordinates further than this from every known centroid are rejected.
pub const SNAP_RADIUS_KM: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Great-circle distance in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let pa = Point::new(a.lon, a.lat);
    let pb = Point::new(b.lon, b.lat);
    Haversine.distance(pa, pb) / 1000.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationEntry {
    pub id: String,
    /// City name, e.g. "Springfield".
    pub name: String,
    /// State/province code, e.g. "IL".
    #[serde(default)]
    pub region: String,
    pub centroid: GeoPoint,
    #[serde(default)]
    pub population: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    locations: Vec<LocationEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct LocationDirectory {
    by_id: BTreeMap<String, LocationEntry>,
}

impl LocationDirectory {
    pub fn new(entries: impl IntoIterator<Item = LocationEntry>) -> Self {
        let by_id = entries.into_iter().map(|e| (e.id.clone(), e)).collect();
        Self { by_id }
    }

    /// Load from a JSON file. Falls back to an empty directory on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(s) => match serde_json::from_str::<DirectoryFile>(&s) {
                Ok(f) => Self::new(f.locations),
                Err(e) => {
                    tracing::warn!(target: "config", path = %path.display(), error = %e, "locations file invalid; using empty directory");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&LocationEntry> {
        self.by_id.get(id)
    }

    pub fn centroid(&self, id: &str) -> Option<GeoPoint> {
        self.by_id.get(id).map(|e| e.centroid)
    }

    pub fn population(&self, id: &str) -> u64 {
        self.by_id.get(id).map(|e| e.population).unwrap_or(0)
    }

    pub fn display_name(&self, id: &str) -> String {
        match self.by_id.get(id) {
            Some(e) if !e.region.is_empty() => format!("{}, {}", e.name, e.region),
            Some(e) => e.name.clone(),
            None => id.to_string(),
        }
    }

    /// Generalize a raw reference to a directory id.
    pub fn resolve(&self, loc: &LocationRef) -> Result<String, PipelineError> {
        if let Some(id) = loc.location_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if self.by_id.contains_key(id) {
                return Ok(id.to_string());
            }
            return Err(PipelineError::Validation(format!("unknown location id `{id}`")));
        }

        if let Some(addr) = loc.address.as_deref() {
            if let Some(id) = self.match_address(addr) {
                return Ok(id);
            }
        }

        if let (Some(lat), Some(lon)) = (loc.lat, loc.lon) {
            let p = GeoPoint::new(lat, lon);
            if !p.is_valid() {
                return Err(PipelineError::Validation("coordinates out of range".into()));
            }
            if let Some((id, d)) = self.nearest(p) {
                if d <= SNAP_RADIUS_KM {
                    return Ok(id);
                }
            }
        }

        Err(PipelineError::Validation(
            "location reference could not be generalized".into(),
        ))
    }

    /// Match the trailing "city, region" (or just "city") of an address.
    fn match_address(&self, addr: &str) -> Option<String> {
        let parts: Vec<String> = addr
            .split(',')
            .map(normalize)
            .filter(|p| !p.is_empty())
            .collect();
        let n = parts.len();
        if n >= 2 {
            let (city, region) = (&parts[n - 2], &parts[n - 1]);
            let hit = self
                .by_id
                .values()
                .find(|e| &normalize(&e.name) == city && &normalize(&e.region) == region);
            if let Some(e) = hit {
                return Some(e.id.clone());
            }
        }
        let last = parts.last()?;
        let mut hits = self.by_id.values().filter(|e| &normalize(&e.name) == last);
        match (hits.next(), hits.next()) {
            (Some(e), None) => Some(e.id.clone()),
            _ => None,
        }
    }

    fn nearest(&self, p: GeoPoint) -> Option<(String, f64)> {
        self.by_id
            .values()
            .map(|e| (e.id.clone(), haversine_km(p, e.centroid)))
            .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
    }
}

/// Lowercase, strip punctuation, collapse whitespace.
fn normalize(s: &str) -> String {
    let out = s.trim().to_ascii_lowercase().replace(['.', '-', '_'], " ");
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_directory() -> LocationDirectory {
        LocationDirectory::new([
            LocationEntry {
                id: "springfield-il".into(),
                name: "Springfield".into(),
                region: "IL".into(),
                centroid: GeoPoint::new(39.7817, -89.6501),
                population: 114_000,
            },
            LocationEntry {
                id: "chatham-il".into(),
                name: "Chatham".into(),
                region: "IL".into(),
                centroid: GeoPoint::new(39.6761, -89.7045),
                population: 14_000,
            },
            LocationEntry {
                id: "peoria-il".into(),
                name: "Peoria".into(),
                region: "IL".into(),
                centroid: GeoPoint::new(40.6936, -89.5890),
                population: 113_000,
            },
        ])
    }

    #[test]
    fn haversine_is_roughly_right() {
        // Springfield → Peoria is about 101 km.
        let d = haversine_km(GeoPoint::new(39.7817, -89.6501), GeoPoint::new(40.6936, -89.5890));
        assert!((95.0..110.0).contains(&d), "got {d}");
    }

    #[test]
    fn resolves_explicit_id_address_and_coordinates() {
        let dir = sample_directory();
        let by_id = LocationRef {
            location_id: Some("peoria-il".into()),
            ..Default::default()
        };
        assert_eq!(dir.resolve(&by_id).unwrap(), "peoria-il");

        let by_addr = LocationRef {
            address: Some("1200 S. Main St, Springfield, IL".into()),
            ..Default::default()
        };
        assert_eq!(dir.resolve(&by_addr).unwrap(), "springfield-il");

        let by_coord = LocationRef {
            lat: Some(39.70),
            lon: Some(-89.70),
            ..Default::default()
        };
        assert_eq!(dir.resolve(&by_coord).unwrap(), "chatham-il");
    }

    #[test]
    fn rejects_unknown_and_far_references() {
        let dir = sample_directory();
        let unknown = LocationRef {
            location_id: Some("atlantis".into()),
            ..Default::default()
        };
        assert!(dir.resolve(&unknown).is_err());

        let far = LocationRef {
            lat: Some(47.6),
            lon: Some(-122.3),
            ..Default::default()
        };
        assert!(dir.resolve(&far).is_err());
        assert!(dir.resolve(&LocationRef::default()).is_err());
    }
}
