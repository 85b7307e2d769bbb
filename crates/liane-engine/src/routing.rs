use anyhow::{Context, Result, bail};
use liane_types::models::LatLng;
use serde::Deserialize;

/// A computed road route through an ordered list of coordinates.
#[derive(Debug, Clone)]
pub struct Route {
    pub geometry: Vec<LatLng>,
    /// Meters.
    pub distance: f64,
    /// Seconds.
    pub duration: f64,
}

/// Road routing backend. Implementations are called from blocking context.
pub trait Routing: Send + Sync {
    fn route(&self, coordinates: &[LatLng]) -> Result<Route>;
}

/// OSRM HTTP client. All routes must come from the same backend so that
/// overlapping trips produce identical geometry vertices.
pub struct OsrmRouting {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl OsrmRouting {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
    distance: f64,
    duration: f64,
}

#[derive(Deserialize)]
struct OsrmGeometry {
    /// GeoJSON order: [lng, lat].
    coordinates: Vec<[f64; 2]>,
}

impl Routing for OsrmRouting {
    fn route(&self, coordinates: &[LatLng]) -> Result<Route> {
        let path = coordinates
            .iter()
            .map(|c| format!("{},{}", c.lng, c.lat))
            .collect::<Vec<_>>()
            .join(";");
        let url = format!(
            "{}/route/v1/driving/{}?overview=full&geometries=geojson",
            self.base_url, path
        );

        let response: OsrmResponse = self
            .client
            .get(&url)
            .send()
            .context("routing request failed")?
            .error_for_status()
            .context("routing service rejected the request")?
            .json()
            .context("routing response was not valid JSON")?;

        if response.code != "Ok" {
            bail!("routing service returned code {}", response.code);
        }
        let route = response
            .routes
            .into_iter()
            .next()
            .context("routing service returned no route")?;

        Ok(Route {
            geometry: route
                .geometry
                .coordinates
                .into_iter()
                .map(|[lng, lat]| LatLng::new(lat, lng))
                .collect(),
            distance: route.distance,
            duration: route.duration,
        })
    }
}
