//! Static reference data for the monitored districts.

use serde::Serialize;

/// A monitored district together with the land-use attributes used by the synthetic provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct District {
    pub id: i32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub population: u32,
    /// Share of the district covered by trees, 0-100.
    pub tree_coverage_percent: f64,
    /// Relative traffic intensity, 0-100.
    pub traffic_level: f64,
    pub industrial_zones: u32,
}

impl District {
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: i32,
        name: &str,
        latitude: f64,
        longitude: f64,
        population: u32,
        tree_coverage_percent: f64,
        traffic_level: f64,
        industrial_zones: u32,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            latitude,
            longitude,
            population,
            tree_coverage_percent,
            traffic_level,
            industrial_zones,
        }
    }
}

/// The six districts of Lviv.
pub fn lviv_districts() -> Vec<District> {
    vec![
        District::new(1, "Halytskyi", 49.8403, 24.0323, 115_000, 40.0, 82.0, 1),
        District::new(2, "Frankivskyi", 49.8176, 23.9888, 142_000, 35.0, 88.0, 4),
        District::new(3, "Zaliznychnyi", 49.8356, 23.9305, 108_000, 25.0, 95.0, 5),
        District::new(4, "Shevchenkivskyi", 49.8662, 24.0348, 98_000, 20.0, 98.0, 3),
        District::new(5, "Lychakivskyi", 49.8193, 24.0684, 135_000, 45.0, 85.0, 1),
        District::new(6, "Sykhivskyi", 49.8107, 24.0457, 125_000, 55.0, 70.0, 2),
    ]
}

/// Looks up a district by id in the given registry.
pub fn find_district(districts: &[District], id: i32) -> Option<&District> {
    districts.iter().find(|d| d.id == id)
}
