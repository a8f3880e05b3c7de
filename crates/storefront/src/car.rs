//! Selected car, persisted under `user_car`.

use exaltride_core::{Compatibility, Fitment, SelectedCar};

use crate::guest::{SharedStorage, StorageError, keys, read_json, write_json};

/// The shopper's selected car.
///
/// Selection is independent of login state and survives logout.
#[derive(Clone)]
pub struct CarSelector {
    storage: SharedStorage,
}

impl CarSelector {
    #[must_use]
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// The selected car, if any. Corrupt values read as no selection.
    #[must_use]
    pub fn current(&self) -> Option<SelectedCar> {
        read_json::<SelectedCar>(self.storage.as_ref(), keys::USER_CAR).map(|mut car| {
            if car.id.is_empty() {
                car.id = car.derive_id();
            }
            car
        })
    }

    /// Select a car, replacing any previous selection.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium refuses the write.
    pub fn select(&self, mut car: SelectedCar) -> Result<SelectedCar, StorageError> {
        car.id = car.derive_id();
        write_json(self.storage.as_ref(), keys::USER_CAR, &car)?;
        tracing::debug!(car = %car.id, "Selected car");
        Ok(car)
    }

    /// Forget the selected car.
    pub fn clear(&self) {
        self.storage.remove(keys::USER_CAR);
    }

    /// Compatibility of a product with the selected car.
    #[must_use]
    pub fn annotate(&self, fitments: &[Fitment]) -> Compatibility {
        Compatibility::of(self.current().as_ref(), fitments)
    }
}
