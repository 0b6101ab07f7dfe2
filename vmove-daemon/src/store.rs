use std::path::PathBuf;

use log::{debug, warn};
use serde_json::{Map, Value};
use vmove_logic::GeoPoint;

use crate::prelude::*;

const KEY_LAST_LAT: &str = "last_lat";
const KEY_LAST_LNG: &str = "last_lng";

/// Where we start if nothing was saved yet
pub const DEFAULT_POINT: (f64, f64) = (39.904989, 116.405285);

/// Keeps the last known point in a small JSON file
pub struct LastPointStore {
    path: PathBuf,
}

impl LastPointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_map(&self) -> Option<Map<String, Value>> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) | Err(_) => {
                warn!("Ignoring malformed point store {}", self.path.display());
                None
            }
        }
    }

    /// Load the last point, each coordinate falls back to [DEFAULT_POINT] on its own
    pub fn load(&self) -> GeoPoint {
        let map = self.read_map().unwrap_or_default();
        let get = |key: &str, default: f64| map.get(key).and_then(Value::as_f64).unwrap_or(default);

        let lat = get(KEY_LAST_LAT, DEFAULT_POINT.0);
        let lng = get(KEY_LAST_LNG, DEFAULT_POINT.1);

        GeoPoint::new(lat, lng).unwrap_or_else(|why| {
            warn!("Stored point is invalid ({why}), using default");
            Self::default_point()
        })
    }

    pub fn save(&self, point: GeoPoint) -> Result {
        let mut map = Map::new();
        map.insert(KEY_LAST_LAT.to_string(), Value::from(point.lat()));
        map.insert(KEY_LAST_LNG.to_string(), Value::from(point.lng()));

        let encoded = serde_json::to_vec_pretty(&Value::Object(map)).context("Failed to encode point")?;
        std::fs::write(&self.path, encoded)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        debug!("Saved last point {point}");
        Ok(())
    }

    fn default_point() -> GeoPoint {
        // Known to be in range
        GeoPoint::new(DEFAULT_POINT.0, DEFAULT_POINT.1).unwrap_or_else(|_| unreachable!())
    }
}
