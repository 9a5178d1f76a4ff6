use serde::Serialize;

/// Coordinates plus the provider's place id when one was returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceMatch {
    pub lat: f64,
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
}

impl PlaceMatch {
    pub fn new(lat: f64, lng: f64, place_id: Option<String>) -> Self {
        Self {
            lat,
            lng,
            place_id: place_id.filter(|id| !id.trim().is_empty()),
        }
    }

    pub fn has_place_id(&self) -> bool {
        self.place_id.is_some()
    }
}

/// Result of resolving one record. `NotFound` is a normal, cacheable answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Found(PlaceMatch),
    NotFound,
}

impl Outcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Outcome::Found(_))
    }

    pub fn place(&self) -> Option<&PlaceMatch> {
        match self {
            Outcome::Found(place) => Some(place),
            Outcome::NotFound => None,
        }
    }
}

impl From<Option<PlaceMatch>> for Outcome {
    fn from(value: Option<PlaceMatch>) -> Self {
        match value {
            Some(place) => Outcome::Found(place),
            None => Outcome::NotFound,
        }
    }
}
