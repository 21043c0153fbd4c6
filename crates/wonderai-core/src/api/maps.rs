use serde::{Deserialize, Serialize};

use crate::client::ChatClient;
use crate::error::{Result, WonderError};
use crate::message::{Coordinates, MapMarker, MapWidget};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationQuery {
    pub query: String,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl LocationQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: 5,
            user_id: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let len = self.query.trim().chars().count();
        if len == 0 || len > 200 {
            return Err(WonderError::Validation(
                "query must be 1-200 characters".to_string(),
            ));
        }
        if !(1..=20).contains(&self.limit) {
            return Err(WonderError::Validation("limit must be 1-20".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub place_type: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocationResults {
    pub id: String,
    pub query: String,
    pub locations: Vec<Location>,
    #[serde(default)]
    pub total_results: u32,
    #[serde(default)]
    pub processing_time: f64,
}

impl LocationResults {
    /// Map widget centred on the best hit with a marker per location.
    pub fn to_widget(&self, zoom: u8) -> Option<MapWidget> {
        let first = self.locations.first()?;
        Some(MapWidget {
            center: first.coordinates,
            zoom,
            markers: self
                .locations
                .iter()
                .map(|loc| MapMarker {
                    coordinates: loc.coordinates,
                    label: Some(loc.name.clone()),
                })
                .collect(),
            map_url: None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Driving,
    Walking,
    Cycling,
    Transit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRequest {
    pub start: Coordinates,
    pub end: Coordinates,
    pub mode: TravelMode,
    pub optimize: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RouteStep {
    pub instruction: String,
    pub distance: f64,
    pub duration: f64,
    pub start_location: Coordinates,
    pub end_location: Coordinates,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Route {
    pub total_distance: f64,
    pub total_duration: f64,
    pub steps: Vec<RouteStep>,
    #[serde(default)]
    pub polyline: String,
    pub mode: TravelMode,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RouteResult {
    pub id: String,
    pub route: Route,
    #[serde(default)]
    pub start_address: String,
    #[serde(default)]
    pub end_address: String,
    #[serde(default)]
    pub processing_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapStyle {
    Streets,
    Satellite,
    Terrain,
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapRequest {
    pub center: Coordinates,
    pub zoom: u8,
    pub width: u32,
    pub height: u32,
    pub markers: Vec<MapMarker>,
    pub style: MapStyle,
}

impl MapRequest {
    pub fn new(center: Coordinates) -> Self {
        Self {
            center,
            zoom: 12,
            width: 800,
            height: 600,
            markers: Vec::new(),
            style: MapStyle::Streets,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_coordinates(&self.center)?;
        if !(1..=20).contains(&self.zoom) {
            return Err(WonderError::Validation("zoom must be 1-20".to_string()));
        }
        if !(100..=2048).contains(&self.width) || !(100..=2048).contains(&self.height) {
            return Err(WonderError::Validation(
                "width and height must be 100-2048".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MapResult {
    pub id: String,
    pub map_url: String,
    pub center: Coordinates,
    pub zoom: u8,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub markers_count: u32,
}

impl MapResult {
    pub fn to_widget(&self, markers: Vec<MapMarker>) -> MapWidget {
        MapWidget {
            center: self.center,
            zoom: self.zoom,
            markers,
            map_url: Some(self.map_url.clone()),
        }
    }
}

fn validate_coordinates(c: &Coordinates) -> Result<()> {
    if !(-90.0..=90.0).contains(&c.latitude) || !(-180.0..=180.0).contains(&c.longitude) {
        return Err(WonderError::Validation(format!(
            "coordinates out of range: {}, {}",
            c.latitude, c.longitude
        )));
    }
    Ok(())
}

impl ChatClient {
    pub async fn search_locations(&self, query: &LocationQuery) -> Result<LocationResults> {
        query.validate()?;
        let url = self.endpoint(&["api", "maps", "search"])?;
        self.post_json(url, &[], query).await
    }

    pub async fn plan_route(&self, request: &RouteRequest) -> Result<RouteResult> {
        validate_coordinates(&request.start)?;
        validate_coordinates(&request.end)?;
        let url = self.endpoint(&["api", "maps", "route"])?;
        self.post_json(url, &[], request).await
    }

    pub async fn generate_map(&self, request: &MapRequest) -> Result<MapResult> {
        request.validate()?;
        let url = self.endpoint(&["api", "maps", "generate"])?;
        self.post_json(url, &[], request).await
    }
}
