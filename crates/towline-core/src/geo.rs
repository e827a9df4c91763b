//! Coordinates and places.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Mean Earth radius in meters, used for great-circle distances.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 latitude/longitude pair, as reported by client GPS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Creates coordinates, rejecting values outside the valid range.
    pub fn new(latitude: f64, longitude: f64) -> DomainResult<Self> {
        let coords = Self {
            latitude,
            longitude,
        };
        if coords.is_valid() {
            Ok(coords)
        } else {
            Err(DomainError::InvalidCoordinates {
                latitude,
                longitude,
            })
        }
    }

    /// Returns true if latitude and longitude are finite and in range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle (haversine) distance to `other`, in meters.
    pub fn distance_m(&self, other: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// A point with an optional human-readable address (ride origin/destination).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(
        default,
        alias = "formatted_address",
        skip_serializing_if = "Option::is_none"
    )]
    pub formatted_address: Option<String>,
}

impl Place {
    /// Returns the coordinates of this place.
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// Returns the address if known, otherwise a "lat, lon" rendering.
    pub fn label(&self) -> String {
        match &self.formatted_address {
            Some(address) => address.clone(),
            None => format!("{:.5}, {:.5}", self.latitude, self.longitude),
        }
    }
}
