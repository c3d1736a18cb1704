//! Zone catalog
//!
//! Zones are loaded once at startup from a TOML catalog. Malformed entries
//! are skipped with a warning rather than failing the whole catalog, and
//! hotspots lying outside their zone's bounding rectangle are dropped at
//! load time so generation never has to re-check them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

/// Bounding rectangle of a zone. Invariant: min ≤ max on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Southern edge.
    pub min_lat: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Western edge.
    pub min_lng: f64,
    /// Eastern edge.
    pub max_lng: f64,
}

impl Bounds {
    /// Whether a point lies inside the rectangle (edges inclusive).
    #[must_use]
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lng..=self.max_lng).contains(&lng)
    }

    /// Center point of the rectangle.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// A weighted point of interest inside a zone.
#[derive(Debug, Clone, PartialEq)]
pub struct Hotspot {
    /// Display name, used as the coordinate source label.
    pub name: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Reported accuracy in meters.
    pub accuracy: f64,
    /// Relative pick weight. Always positive after load.
    pub weight: u32,
}

/// A named area with a bounding rectangle and optional weighted hotspots.
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    /// Stable short code, `z` followed by five digits.
    pub id: String,
    /// Display address.
    pub address: String,
    /// Bounding rectangle.
    pub bounds: Bounds,
    /// Hotspots, all guaranteed inside `bounds`.
    pub hotspots: Vec<Hotspot>,
}

/// Immutable catalog of zones, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct ZoneCatalog {
    zones: Vec<Zone>,
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default, rename = "zone")]
    zones: Vec<toml::Value>,
}

#[derive(Debug, Deserialize)]
struct RawZone {
    id: Option<String>,
    address: Option<String>,
    bounds: Option<Vec<f64>>,
    #[serde(default)]
    hotspots: Vec<RawHotspot>,
}

#[derive(Debug, Deserialize)]
struct RawHotspot {
    name: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
    #[serde(default = "default_hotspot_accuracy")]
    accuracy: f64,
    #[serde(default = "default_hotspot_weight")]
    weight: i64,
}

const fn default_hotspot_accuracy() -> f64 {
    20.0
}

const fn default_hotspot_weight() -> i64 {
    1
}

impl ZoneCatalog {
    /// Load a catalog from a TOML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read zone catalog: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse catalog content. Invalid entries are skipped with a warning.
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawCatalog = toml::from_str(content).context("Failed to parse zone catalog")?;

        let mut zones = Vec::new();
        let mut seen_ids = HashSet::new();
        for (index, value) in raw.zones.into_iter().enumerate() {
            let entry = index + 1;
            let raw_zone: RawZone = match value.try_into() {
                Ok(z) => z,
                Err(e) => {
                    warn!(entry, error = %e, "skipping malformed zone entry");
                    continue;
                }
            };
            match validate_zone(raw_zone) {
                Ok(zone) => {
                    if !seen_ids.insert(zone.id.clone()) {
                        warn!(entry, id = %zone.id, "skipping duplicate zone id");
                        continue;
                    }
                    zones.push(zone);
                }
                Err(reason) => warn!(entry, %reason, "skipping invalid zone entry"),
            }
        }

        Ok(Self { zones })
    }

    /// Look up a zone by id (case-insensitive).
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Zone> {
        let id = id.trim().to_lowercase();
        self.zones.iter().find(|z| z.id == id)
    }

    /// Search zones by exact id or address substring (case-insensitive).
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&Zone> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.zones
            .iter()
            .filter(|z| z.id == query || z.address.to_lowercase().contains(&query))
            .collect()
    }

    /// All zones in catalog order.
    #[must_use]
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Number of zones in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

fn validate_zone(raw: RawZone) -> std::result::Result<Zone, String> {
    let id = raw
        .id
        .map(|s| s.trim().to_lowercase())
        .ok_or("missing id")?;
    if !is_valid_zone_id(&id) {
        return Err(format!("id '{id}' must be 'z' followed by five digits"));
    }

    let address = raw.address.map(|s| s.trim().to_string()).unwrap_or_default();
    if address.is_empty() {
        return Err("missing address".to_string());
    }

    let bounds_raw = raw.bounds.ok_or("missing bounds")?;
    if bounds_raw.len() != 4 {
        return Err("bounds must be [min_lat, max_lat, min_lng, max_lng]".to_string());
    }
    let bounds = Bounds {
        min_lat: bounds_raw[0],
        max_lat: bounds_raw[1],
        min_lng: bounds_raw[2],
        max_lng: bounds_raw[3],
    };
    if !(-90.0..=90.0).contains(&bounds.min_lat)
        || !(-90.0..=90.0).contains(&bounds.max_lat)
        || !(-180.0..=180.0).contains(&bounds.min_lng)
        || !(-180.0..=180.0).contains(&bounds.max_lng)
        || bounds.min_lat > bounds.max_lat
        || bounds.min_lng > bounds.max_lng
    {
        return Err("bounds out of range or min > max".to_string());
    }

    let mut hotspots = Vec::new();
    for (hs_index, hs) in raw.hotspots.into_iter().enumerate() {
        match validate_hotspot(hs, &bounds) {
            Ok(Some(hotspot)) => hotspots.push(hotspot),
            Ok(None) => warn!(
                zone = %id,
                hotspot = hs_index + 1,
                "dropping hotspot outside zone bounds"
            ),
            Err(reason) => warn!(
                zone = %id,
                hotspot = hs_index + 1,
                %reason,
                "dropping invalid hotspot"
            ),
        }
    }

    Ok(Zone {
        id,
        address,
        bounds,
        hotspots,
    })
}

fn validate_hotspot(
    raw: RawHotspot,
    bounds: &Bounds,
) -> std::result::Result<Option<Hotspot>, String> {
    let name = raw.name.map(|s| s.trim().to_string()).unwrap_or_default();
    if name.is_empty() {
        return Err("missing name".to_string());
    }
    let lat = raw.lat.ok_or("missing lat")?;
    let lng = raw.lng.ok_or("missing lng")?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err("coordinates out of range".to_string());
    }
    if raw.accuracy <= 0.0 {
        return Err("accuracy must be positive".to_string());
    }
    if !bounds.contains(lat, lng) {
        return Ok(None);
    }
    // Non-positive weights are floored to 1 rather than rejected.
    let weight = u32::try_from(raw.weight.max(1)).unwrap_or(1);
    Ok(Some(Hotspot {
        name,
        lat,
        lng,
        accuracy: raw.accuracy,
        weight,
    }))
}

fn is_valid_zone_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == 6 && bytes[0] == b'z' && bytes[1..].iter().all(u8::is_ascii_digit)
}
