//! Selected car, used only to annotate product compatibility.

use serde::{Deserialize, Serialize};

/// The shopper's car as picked in the car selector.
///
/// The `id` is derived from the other fields; it is stored alongside them so
/// that persisted values stay readable without re-deriving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedCar {
    pub make: String,
    pub model: String,
    pub year: u16,
    #[serde(default)]
    pub variant: String,
    #[serde(default)]
    pub id: String,
}

impl SelectedCar {
    /// Create a selected car and derive its ID.
    #[must_use]
    pub fn new(
        make: impl Into<String>,
        model: impl Into<String>,
        year: u16,
        variant: impl Into<String>,
    ) -> Self {
        let mut car = Self {
            make: make.into(),
            model: model.into(),
            year,
            variant: variant.into(),
            id: String::new(),
        };
        car.id = car.derive_id();
        car
    }

    /// Slug of make, model, year and variant (e.g. `maruti-suzuki-swift-2021-vxi`).
    #[must_use]
    pub fn derive_id(&self) -> String {
        let year = self.year.to_string();
        [self.make.as_str(), self.model.as_str(), year.as_str(), self.variant.as_str()]
            .iter()
            .map(|part| slugify(part))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Human readable label (e.g. "Hyundai Creta 2022 SX").
    #[must_use]
    pub fn label(&self) -> String {
        let base = format!("{} {} {}", self.make, self.model, self.year);
        if self.variant.is_empty() {
            base
        } else {
            format!("{base} {}", self.variant)
        }
    }
}

/// A product's declared fit for a range of cars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fitment {
    pub make: String,
    pub model: String,
    /// First model year (inclusive). `None` means no lower bound.
    #[serde(default)]
    pub year_from: Option<u16>,
    /// Last model year (inclusive). `None` means no upper bound.
    #[serde(default)]
    pub year_to: Option<u16>,
}

impl Fitment {
    /// Whether this fitment covers the given car.
    #[must_use]
    pub fn covers(&self, car: &SelectedCar) -> bool {
        self.make.eq_ignore_ascii_case(&car.make)
            && self.model.eq_ignore_ascii_case(&car.model)
            && self.year_from.is_none_or(|from| car.year >= from)
            && self.year_to.is_none_or(|to| car.year <= to)
    }
}

/// Compatibility annotation for a product card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compatibility {
    /// The selected car is covered by one of the product's fitments.
    Fits,
    /// The product declares fitments and none covers the selected car.
    DoesNotFit,
    /// No car selected, or the product declares no fitments (universal).
    Unknown,
}

impl Compatibility {
    /// Annotate a product given its fitments and the selected car.
    #[must_use]
    pub fn of(car: Option<&SelectedCar>, fitments: &[Fitment]) -> Self {
        match car {
            None => Self::Unknown,
            Some(_) if fitments.is_empty() => Self::Unknown,
            Some(car) if fitments.iter().any(|f| f.covers(car)) => Self::Fits,
            Some(_) => Self::DoesNotFit,
        }
    }
}

fn slugify(s: &str) -> String {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}
