//! Geolocation simulation
//!
//! This module owns the zone catalog and the coordinate simulator that
//! produces plausible readings inside a zone's bounding rectangle.

pub mod simulator;
pub mod zone;

pub use simulator::{CoordinateSimulator, GeneratedCoordinate, DEFAULT_ACCURACY_M};
pub use zone::{Bounds, Hotspot, Zone, ZoneCatalog};
