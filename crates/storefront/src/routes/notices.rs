//! Sync failure notices.

use axum::Json;

use crate::middleware::Device;
use crate::sync::Notice;

/// Drain the device's undelivered failure notices, oldest first.
///
/// # Route
///
/// `GET /notices`
pub async fn drain(device: Device) -> Json<Vec<Notice>> {
    Json(device.storefront.notices().take_pending())
}
