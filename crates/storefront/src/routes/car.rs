//! Selected car route handlers.

use axum::{Json, http::StatusCode};
use exaltride_core::{Compatibility, Fitment, SelectedCar};
use serde::Deserialize;

use crate::error::Result;
use crate::middleware::Device;

/// Car selection request body.
#[derive(Debug, Deserialize)]
pub struct SelectCarInput {
    pub make: String,
    pub model: String,
    pub year: u16,
    #[serde(default)]
    pub variant: String,
}

/// Fitments of the product being annotated.
#[derive(Debug, Deserialize)]
pub struct CompatibilityInput {
    #[serde(default)]
    pub fitments: Vec<Fitment>,
}

/// Show the selected car.
///
/// # Route
///
/// `GET /car`
pub async fn show(device: Device) -> Json<Option<SelectedCar>> {
    Json(device.storefront.car().current())
}

/// Select a car.
///
/// # Route
///
/// `PUT /car`
pub async fn select(device: Device, Json(input): Json<SelectCarInput>) -> Result<Json<SelectedCar>> {
    let car = SelectedCar::new(input.make, input.model, input.year, input.variant);
    Ok(Json(device.storefront.car().select(car)?))
}

/// Forget the selected car.
///
/// # Route
///
/// `DELETE /car`
pub async fn clear(device: Device) -> StatusCode {
    device.storefront.car().clear();
    StatusCode::NO_CONTENT
}

/// Whether a product fits the selected car.
///
/// # Route
///
/// `POST /car/compatibility`
pub async fn compatibility(device: Device, Json(input): Json<CompatibilityInput>) -> Json<Compatibility> {
    Json(device.storefront.car().annotate(&input.fitments))
}
