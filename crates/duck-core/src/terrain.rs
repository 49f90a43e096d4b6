//! Coarse terrain classification for route cost and cruise altitude.
//!
//! The default classifier is a static list of bounding boxes. It is only
//! meant to make oceans cheaper to cross than mountain ranges; anything
//! needing real geography should implement [`TerrainClassifier`] instead.

use serde::{Deserialize, Serialize};

use crate::models::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerrainKind {
    Ocean,
    Land,
    Mountain,
    Desert,
    Forest,
    Urban,
}

impl TerrainKind {
    /// Relative speed over this terrain; higher means cheaper edges.
    pub fn speed_modifier(self) -> f64 {
        match self {
            TerrainKind::Ocean => 1.2,
            TerrainKind::Land => 1.0,
            TerrainKind::Mountain => 0.7,
            TerrainKind::Desert => 1.1,
            TerrainKind::Forest => 0.9,
            TerrainKind::Urban => 0.8,
        }
    }

    /// Nominal cruising altitude in metres.
    pub fn altitude_m(self) -> f64 {
        match self {
            TerrainKind::Ocean => 100.0,
            TerrainKind::Land => 300.0,
            TerrainKind::Mountain => 3000.0,
            TerrainKind::Desert => 500.0,
            TerrainKind::Forest => 400.0,
            TerrainKind::Urban => 200.0,
        }
    }
}

/// Maps a coordinate to a terrain category.
pub trait TerrainClassifier: Send + Sync {
    fn classify(&self, location: &Location) -> TerrainKind;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainBox {
    pub name: String,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    pub kind: TerrainKind,
}

impl TerrainBox {
    pub fn new(
        name: &str,
        (min_lat, max_lat): (f64, f64),
        (min_lon, max_lon): (f64, f64),
        kind: TerrainKind,
    ) -> Self {
        Self {
            name: name.to_string(),
            min_lat,
            max_lat,
            min_lon,
            max_lon,
            kind,
        }
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// First matching box wins; unmatched points are ocean.
#[derive(Debug, Clone)]
pub struct BoundingBoxClassifier {
    boxes: Vec<TerrainBox>,
    fallback: TerrainKind,
}

impl BoundingBoxClassifier {
    pub fn new(boxes: Vec<TerrainBox>, fallback: TerrainKind) -> Self {
        Self { boxes, fallback }
    }
}

impl Default for BoundingBoxClassifier {
    fn default() -> Self {
        use TerrainKind::*;

        let boxes = vec![
            // Metro areas first so they win over the surrounding land.
            TerrainBox::new("New York", (40.4, 41.0), (-74.3, -73.6), Urban),
            TerrainBox::new("London", (51.3, 51.7), (-0.5, 0.3), Urban),
            TerrainBox::new("Paris", (48.7, 49.0), (2.1, 2.6), Urban),
            TerrainBox::new("Tokyo", (35.5, 35.9), (139.5, 140.0), Urban),
            TerrainBox::new("Los Angeles", (33.7, 34.3), (-118.7, -117.9), Urban),
            TerrainBox::new("Sao Paulo", (-23.8, -23.3), (-46.9, -46.4), Urban),
            TerrainBox::new("Mumbai", (18.9, 19.3), (72.7, 73.1), Urban),
            // Mountain ranges.
            TerrainBox::new("Himalaya", (27.0, 36.0), (70.0, 97.0), Mountain),
            TerrainBox::new("Alps", (44.0, 47.8), (5.5, 16.0), Mountain),
            TerrainBox::new("Rockies", (35.0, 60.0), (-125.0, -105.0), Mountain),
            TerrainBox::new("Andes", (-50.0, 10.0), (-78.0, -66.0), Mountain),
            // Deserts.
            TerrainBox::new("Sahara", (15.0, 32.0), (-15.0, 35.0), Desert),
            TerrainBox::new("Arabian", (15.0, 30.0), (35.0, 60.0), Desert),
            TerrainBox::new("Gobi", (38.0, 46.0), (90.0, 112.0), Desert),
            TerrainBox::new("Outback", (-32.0, -20.0), (120.0, 145.0), Desert),
            // Forests.
            TerrainBox::new("Amazon", (-15.0, 5.0), (-75.0, -45.0), Forest),
            TerrainBox::new("Congo", (-5.0, 5.0), (12.0, 30.0), Forest),
            TerrainBox::new("Taiga", (55.0, 68.0), (60.0, 140.0), Forest),
            TerrainBox::new("Boreal Canada", (50.0, 60.0), (-100.0, -60.0), Forest),
            // Continents.
            TerrainBox::new("North America", (15.0, 72.0), (-168.0, -52.0), Land),
            TerrainBox::new("South America", (-56.0, 13.0), (-82.0, -34.0), Land),
            TerrainBox::new("Europe", (36.0, 71.0), (-10.0, 40.0), Land),
            TerrainBox::new("Africa", (-35.0, 37.0), (-18.0, 52.0), Land),
            TerrainBox::new("Asia", (5.0, 77.0), (40.0, 180.0), Land),
            TerrainBox::new("Australia", (-44.0, -10.0), (112.0, 154.0), Land),
        ];
        Self::new(boxes, Ocean)
    }
}

impl TerrainClassifier for BoundingBoxClassifier {
    fn classify(&self, location: &Location) -> TerrainKind {
        let (lat, lon) = (location.latitude(), location.longitude());
        self.boxes
            .iter()
            .find(|b| b.contains(lat, lon))
            .map(|b| b.kind)
            .unwrap_or(self.fallback)
    }
}

/// Classifies every point as the same terrain.
#[derive(Debug, Clone, Copy)]
pub struct UniformTerrain(pub TerrainKind);

impl TerrainClassifier for UniformTerrain {
    fn classify(&self, _location: &Location) -> TerrainKind {
        self.0
    }
}
