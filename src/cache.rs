use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::outcome::{Outcome, PlaceMatch};

pub const PLACE_KEY_PREFIX: &str = "place:";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LookupKey(String);

impl LookupKey {
    pub fn address(address: &str) -> Self {
        Self(address.to_string())
    }

    pub fn place(query: &str) -> Self {
        Self(format!("{PLACE_KEY_PREFIX}{query}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_place(&self) -> bool {
        self.0.starts_with(PLACE_KEY_PREFIX)
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lookup results keyed by address, or by `place:`-prefixed query for place
/// search. Saved as one sorted JSON object where `null` means nothing was found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeocodeCache {
    entries: BTreeMap<String, Option<PlaceMatch>>,
}

impl GeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the cache file. A missing file yields an empty cache; anything
    /// unreadable as a cache is an error so a bad file never gets overwritten.
    pub fn load(path: &Path) -> AppResult<Self> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cache file yet; starting empty");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };

        let raw: Value =
            serde_json::from_str(&data).map_err(|err| corrupt(path, err.to_string()))?;
        let Value::Object(map) = raw else {
            return Err(corrupt(path, "top-level value is not an object".into()));
        };

        let mut entries = BTreeMap::new();
        for (key, value) in map {
            let entry = coerce_entry(&value)
                .map_err(|reason| corrupt(path, format!("entry {key:?}: {reason}")))?;
            entries.insert(key, entry);
        }

        debug!(path = %path.display(), entries = entries.len(), "loaded lookup cache");
        Ok(Self { entries })
    }

    /// Writes the whole mapping next to `path` and renames it into place.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let parent = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut file = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut file, &self.entries)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|err| AppError::Io(err.error))?;

        debug!(path = %path.display(), entries = self.entries.len(), "saved lookup cache");
        Ok(())
    }

    /// `None` means the key was never attempted.
    pub fn get(&self, key: &LookupKey) -> Option<Outcome> {
        self.entries
            .get(key.as_str())
            .map(|entry| Outcome::from(entry.clone()))
    }

    pub fn insert(&mut self, key: LookupKey, outcome: &Outcome) {
        self.entries.insert(key.0, outcome.place().cloned());
    }

    pub fn contains(&self, key: &LookupKey) -> bool {
        self.entries.contains_key(key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn corrupt(path: &Path, reason: String) -> AppError {
    AppError::CacheCorrupt {
        path: path.to_path_buf(),
        reason,
    }
}

fn coerce_entry(value: &Value) -> Result<Option<PlaceMatch>, String> {
    let map = match value {
        Value::Null => return Ok(None),
        Value::Object(map) if map.is_empty() => return Ok(None),
        Value::Object(map) => map,
        other => return Err(format!("expected an object or null, found {other}")),
    };

    let lat = coerce_coordinate(map.get("lat"), "lat")?;
    let lng = coerce_coordinate(map.get("lng"), "lng")?;
    let place_id = match map.get("place_id") {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) => Some(id.clone()),
        Some(other) => return Err(format!("place_id must be a string, found {other}")),
    };

    Ok(Some(PlaceMatch::new(lat, lng, place_id)))
}

fn coerce_coordinate(value: Option<&Value>, field: &str) -> Result<f64, String> {
    let parsed = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        Some(_) => None,
        None => return Err(format!("missing {field}")),
    };
    match parsed {
        Some(coordinate) if coordinate.is_finite() => Ok(coordinate),
        _ => Err(format!("{field} is not a finite number")),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn found(lat: f64, lng: f64, place_id: Option<&str>) -> Outcome {
        Outcome::Found(PlaceMatch::new(lat, lng, place_id.map(str::to_string)))
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let cache = GeocodeCache::load(&dir.path().join("absent.json")).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn place_and_address_keys_do_not_collide() {
        let mut cache = GeocodeCache::new();
        cache.insert(LookupKey::address("Shibuya"), &Outcome::NotFound);
        cache.insert(LookupKey::place("Shibuya"), &found(35.66, 139.7, Some("abc")));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&LookupKey::address("Shibuya")), Some(Outcome::NotFound));
        assert!(cache.get(&LookupKey::place("Shibuya")).unwrap().is_found());
        assert!(LookupKey::place("Shibuya").is_place());
        assert!(!LookupKey::address("Shibuya").is_place());
    }

    #[test]
    fn saves_sorted_keys_and_null_markers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let mut cache = GeocodeCache::new();
        cache.insert(LookupKey::address("b street"), &Outcome::NotFound);
        cache.insert(LookupKey::address("a street"), &found(1.5, 2.5, None));
        cache.insert(LookupKey::place("cafe"), &found(3.0, 4.0, Some("xyz")));
        cache.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let a = text.find("\"a street\"").unwrap();
        let b = text.find("\"b street\"").unwrap();
        let place = text.find("\"place:cafe\"").unwrap();
        assert!(a < b && b < place);
        assert!(text.contains("\"b street\": null"));
        assert!(!text.contains("\"place_id\": null"));
        assert!(text.ends_with('\n'));

        let reloaded = GeocodeCache::load(&path).unwrap();
        assert_eq!(reloaded, cache);
    }

    #[test]
    fn keeps_non_ascii_keys_readable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = GeocodeCache::new();
        cache.insert(LookupKey::address("東京都渋谷区"), &found(35.66, 139.7, Some("abc123")));
        cache.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("東京都渋谷区"));
    }

    #[test]
    fn coerces_numeric_strings_and_empty_objects() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{"x": {"lat": "35.5", "lng": 139}, "y": {}, "z": null}"#,
        )
        .unwrap();

        let cache = GeocodeCache::load(&path).unwrap();
        assert_eq!(cache.get(&LookupKey::address("x")), Some(found(35.5, 139.0, None)));
        assert_eq!(cache.get(&LookupKey::address("y")), Some(Outcome::NotFound));
        assert_eq!(cache.get(&LookupKey::address("z")), Some(Outcome::NotFound));
    }

    #[test]
    fn rejects_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();

        let err = GeocodeCache::load(&path).unwrap_err();
        assert!(matches!(err, AppError::CacheCorrupt { .. }));
    }

    #[test]
    fn rejects_entries_missing_coordinates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, r#"{"addr": {"lat": 35.0}}"#).unwrap();

        let err = GeocodeCache::load(&path).unwrap_err();
        match err {
            AppError::CacheCorrupt { reason, .. } => assert!(reason.contains("missing lng")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_non_object_top_level_and_bad_place_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            GeocodeCache::load(&path),
            Err(AppError::CacheCorrupt { .. })
        ));

        fs::write(&path, r#"{"addr": {"lat": 1, "lng": 2, "place_id": 7}}"#).unwrap();
        assert!(matches!(
            GeocodeCache::load(&path),
            Err(AppError::CacheCorrupt { .. })
        ));
    }
}
