// Vehicle identity lookup
//
// Shared memory only names the vehicle entry. Car model, manufacturer, team
// and class come from the game's vehicle list, fetched once per session and
// cached here.

use std::{collections::HashMap, fs, path::PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::LapLoggerError;

/// Human readable classes, preferred over technical class ids.
const READABLE_CLASSES: [&str; 6] = ["Hypercar", "LMP2", "LMP3", "GTE", "GT3", "LMGT3"];

/// Identity of a vehicle entry.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct VehicleMetadata {
    pub car_model: String,
    pub manufacturer: String,
    pub team: String,
    pub class: String,
    pub full_path_tree: String,
}

/// One element of the vehicle list payload.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct VehicleEntry {
    pub vehicle: String,
    #[serde(rename = "fullPathTree")]
    pub full_path_tree: String,
    pub manufacturer: String,
    pub team: String,
    pub classes: Vec<String>,
}

impl VehicleEntry {
    pub fn to_metadata(&self) -> VehicleMetadata {
        VehicleMetadata {
            car_model: extract_car_model(&self.full_path_tree),
            manufacturer: self.manufacturer.clone(),
            team: self.team.clone(),
            class: extract_vehicle_class(&self.classes),
            full_path_tree: self.full_path_tree.clone(),
        }
    }
}

/// `"WEC 2023, Hypercar, Cadillac V-Series.R"` -> `"Cadillac V-Series.R"`.
///
/// Paths with fewer than three components are returned unchanged.
pub fn extract_car_model(full_path_tree: &str) -> String {
    let parts: Vec<&str> = full_path_tree.split(',').map(str::trim).collect();
    match parts.last() {
        Some(last) if parts.len() >= 3 => last.to_string(),
        _ => full_path_tree.to_string(),
    }
}

/// First readable class, else the second entry, else the first.
pub fn extract_vehicle_class(classes: &[String]) -> String {
    classes
        .iter()
        .find(|c| READABLE_CLASSES.contains(&c.as_str()))
        .or_else(|| classes.get(1))
        .or_else(|| classes.first())
        .cloned()
        .unwrap_or_default()
}

/// Read-only vehicle metadata lookup. A miss is `None`, never an error.
pub trait VehicleLookup {
    fn lookup(&mut self, vehicle_name: &str) -> Option<VehicleMetadata>;
}

/// Where the vehicle list comes from.
pub trait VehicleSource {
    fn fetch_vehicles(&mut self) -> Result<Vec<VehicleEntry>, LapLoggerError>;
}

/// Lookup that never knows anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoVehicleMetadata;

impl VehicleLookup for NoVehicleMetadata {
    fn lookup(&mut self, _vehicle_name: &str) -> Option<VehicleMetadata> {
        None
    }
}

/// Vehicle list stored as a JSON array on disk, in the `getAllVehicles` shape.
pub struct JsonFileVehicleSource {
    path: PathBuf,
}

impl JsonFileVehicleSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl VehicleSource for JsonFileVehicleSource {
    fn fetch_vehicles(&mut self) -> Result<Vec<VehicleEntry>, LapLoggerError> {
        let content =
            fs::read_to_string(&self.path).map_err(|e| LapLoggerError::VehicleCatalogIOError {
                path: self.path.clone(),
                source: e,
            })?;
        serde_json::from_str(&content)
            .map_err(|e| LapLoggerError::VehicleCatalogParseError { source: e })
    }
}

impl VehicleSource for Vec<VehicleEntry> {
    fn fetch_vehicles(&mut self) -> Result<Vec<VehicleEntry>, LapLoggerError> {
        Ok(self.clone())
    }
}

/// Caching lookup over a [`VehicleSource`].
///
/// The list is fetched lazily on the first lookup and kept until
/// [`clear_cache`](Self::clear_cache) or a forced refresh. A failing source
/// behaves like an empty list.
pub struct VehicleCatalog<S: VehicleSource> {
    source: S,
    cache: Option<HashMap<String, VehicleMetadata>>,
    fresh: bool,
}

impl<S: VehicleSource> VehicleCatalog<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: None,
            fresh: false,
        }
    }

    /// Fetch the vehicle list, using the cache unless `force_refresh` is set.
    pub fn fetch(&mut self, force_refresh: bool) -> &HashMap<String, VehicleMetadata> {
        if force_refresh || self.cache.is_none() {
            let vehicles = match self.source.fetch_vehicles() {
                Ok(entries) => {
                    self.fresh = true;
                    entries
                        .iter()
                        .filter(|entry| !entry.vehicle.is_empty())
                        .map(|entry| (entry.vehicle.clone(), entry.to_metadata()))
                        .collect()
                }
                Err(e) => {
                    warn!("Vehicle metadata unavailable: {}", e);
                    self.fresh = false;
                    HashMap::new()
                }
            };
            debug!("Vehicle catalog holds {} entries", vehicles.len());
            self.cache = Some(vehicles);
        }
        self.cache.get_or_insert_with(HashMap::new)
    }

    /// Whether the cache holds a successful fetch that has not been cleared.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn clear_cache(&mut self) {
        self.cache = None;
        self.fresh = false;
    }
}

impl<S: VehicleSource> VehicleLookup for VehicleCatalog<S> {
    /// Exact match first, then an entry named `"<vehicle_name> <suffix>"`
    /// (the vehicle list appends a version to shared memory names).
    fn lookup(&mut self, vehicle_name: &str) -> Option<VehicleMetadata> {
        if vehicle_name.is_empty() {
            return None;
        }
        let vehicles = self.fetch(false);
        if let Some(metadata) = vehicles.get(vehicle_name) {
            return Some(metadata.clone());
        }
        let prefix = format!("{vehicle_name} ");
        vehicles
            .iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, metadata)| metadata.clone())
    }
}
