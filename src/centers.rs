//! Static roster of emergency centers, read from a JSON document of the form
//! `{"fire": {"Station Name": {"lat": 25.1, "lng": 55.4}}, ...}`.
//!
//! The registry keeps the file's key order so that anything iterating it
//! (the aggregation routine in particular) sees stations in a stable order.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Fire,
    Police,
    Hospital,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Fire, Category::Police, Category::Hospital];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Fire => "fire",
            Category::Police => "police",
            Category::Hospital => "hospital",
        }
    }

    /// Parses a category as written by a client. Case-insensitive, and
    /// "ambulance" is treated as a request for the nearest hospital.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "fire" => Some(Category::Fire),
            "police" => Some(Category::Police),
            "hospital" | "ambulance" => Some(Category::Hospital),
            _ => None,
        }
    }

    // Registry keys are matched exactly, no aliases.
    fn from_key(key: &str) -> Option<Self> {
        Category::ALL.into_iter().find(|c| c.as_str() == key)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Renders as `lat,lng`, the form routing APIs take for a waypoint.
impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyCenter {
    pub name: String,
    pub location: LatLng,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Configuration file missing: {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file malformed: {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    categories: Vec<(Category, Vec<EmergencyCenter>)>,
}

impl Registry {
    /// Reads and parses the registry file. Either the whole file loads or
    /// nothing does.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&text).map_err(|reason| RegistryError::Malformed {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn parse(text: &str) -> Result<Self, String> {
        let root: Map<String, Value> = serde_json::from_str(text).map_err(|e| e.to_string())?;

        let mut categories = Vec::new();
        for (key, stations) in root {
            let Some(category) = Category::from_key(&key) else {
                warn!(category = %key, "ignoring unknown category in registry");
                continue;
            };

            let Value::Object(stations) = stations else {
                return Err(format!("category '{}' must map station names to coordinates", key));
            };

            let mut centers = Vec::with_capacity(stations.len());
            for (name, coords) in stations {
                let location: LatLng = serde_json::from_value(coords)
                    .map_err(|e| format!("station '{}' in '{}': {}", name, key, e))?;
                centers.push(EmergencyCenter { name, location });
            }
            categories.push((category, centers));
        }

        Ok(Self { categories })
    }

    /// Centers registered for `category`, in file order. Empty when the
    /// category is absent.
    pub fn centers(&self, category: Category) -> &[EmergencyCenter] {
        self.categories
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, centers)| centers.as_slice())
            .unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.categories.iter().map(|(_, centers)| centers.len()).sum()
    }

    /// `{name: {lat, lng}}` for one category.
    pub fn category_json(&self, category: Category) -> Value {
        let stations = self
            .centers(category)
            .iter()
            .map(|center| {
                let coords = serde_json::json!({
                    "lat": center.location.lat,
                    "lng": center.location.lng,
                });
                (center.name.clone(), coords)
            })
            .collect::<Map<_, _>>();
        Value::Object(stations)
    }

    /// The whole registry in the same shape it was read in.
    pub fn to_json(&self) -> Value {
        let all = self
            .categories
            .iter()
            .map(|(category, _)| (category.as_str().to_string(), self.category_json(*category)))
            .collect::<Map<_, _>>();
        Value::Object(all)
    }
}
