use serde::{Deserialize, Serialize};

use crate::error::AppError;

const MAX_LAT: f64 = 90.0;
const MAX_LON: f64 = 180.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Range-checked constructor. NaN and infinities never get past here.
    pub fn new(lat: f64, lon: f64) -> Result<Self, AppError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(AppError::Validation(
                "coordinates must be finite numbers".to_string(),
            ));
        }

        if !(-MAX_LAT..=MAX_LAT).contains(&lat) {
            return Err(AppError::Validation(format!(
                "latitude {lat} is outside [-90, 90]"
            )));
        }

        if !(-MAX_LON..=MAX_LON).contains(&lon) {
            return Err(AppError::Validation(format!(
                "longitude {lon} is outside [-180, 180]"
            )));
        }

        Ok(Self { lat, lon })
    }
}
