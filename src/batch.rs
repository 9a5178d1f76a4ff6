use std::path::PathBuf;

use tracing::{error, info};

use crate::cache::GeocodeCache;
use crate::errors::AppResult;
use crate::outcome::Outcome;
use crate::resolver::{PlaceResolver, ResolutionStats};

const PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupRequest {
    /// Free-text place queries, tried in order.
    pub candidates: Vec<String>,
    pub address: Option<String>,
}

pub trait QueryBuilder<R> {
    fn lookup_request(&self, record: &R) -> LookupRequest;
}

pub trait ResultMerger<R> {
    fn merge(&self, record: &mut R, outcome: &Outcome);
}

/// Resolves `records` in order, merging each outcome back. Stops at the first
/// batch-fatal error; records before it keep their merged results.
pub async fn enrich<R, A>(
    resolver: &mut PlaceResolver<'_>,
    records: &mut [R],
    adapter: &A,
) -> AppResult<ResolutionStats>
where
    A: QueryBuilder<R> + ResultMerger<R>,
{
    let total = records.len();
    for (index, record) in records.iter_mut().enumerate() {
        let request = adapter.lookup_request(record);
        let address = request.address.as_deref().unwrap_or_default();
        let outcome = resolver.resolve(&request.candidates, address).await?;
        adapter.merge(record, &outcome);

        let processed = index + 1;
        if processed % PROGRESS_EVERY == 0 || processed == total {
            let stats = resolver.stats();
            info!(
                processed,
                total,
                resolved = stats.resolved,
                live_calls = stats.live_calls,
                "resolution progress"
            );
        }
    }
    Ok(resolver.stats().clone())
}

/// Owns the cache for one run and writes it back exactly once: on `close`,
/// or on drop if the run ended some other way.
pub struct CacheSession {
    path: PathBuf,
    cache: GeocodeCache,
    closed: bool,
}

impl CacheSession {
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let cache = GeocodeCache::load(&path)?;
        info!(path = %path.display(), entries = cache.len(), "opened lookup cache");
        Ok(Self {
            path,
            cache,
            closed: false,
        })
    }

    pub fn cache_mut(&mut self) -> &mut GeocodeCache {
        &mut self.cache
    }

    /// Saves the cache regardless of `result`, then returns `result`. A save
    /// failure only replaces a successful result; an earlier error wins.
    pub fn close<T>(mut self, result: AppResult<T>) -> AppResult<T> {
        self.closed = true;
        match (self.cache.save(&self.path), result) {
            (Ok(()), result) => result,
            (Err(save_err), Ok(_)) => Err(save_err),
            (Err(save_err), Err(err)) => {
                error!(?save_err, "failed to save lookup cache after batch error");
                Err(err)
            }
        }
    }
}

impl Drop for CacheSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.cache.save(&self.path) {
            error!(?err, path = %self.path.display(), "failed to save lookup cache on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::tempdir;

    use super::*;
    use crate::cache::LookupKey;
    use crate::errors::AppError;
    use crate::geocode::Geocoder;
    use crate::outcome::PlaceMatch;
    use crate::throttle::Throttle;

    #[derive(Debug, Default)]
    struct Shop {
        address: String,
        coords: Option<(f64, f64)>,
    }

    struct ShopAdapter;

    impl QueryBuilder<Shop> for ShopAdapter {
        fn lookup_request(&self, record: &Shop) -> LookupRequest {
            LookupRequest {
                candidates: Vec::new(),
                address: Some(record.address.clone()),
            }
        }
    }

    impl ResultMerger<Shop> for ShopAdapter {
        fn merge(&self, record: &mut Shop, outcome: &Outcome) {
            record.coords = outcome.place().map(|place| (place.lat, place.lng));
        }
    }

    /// Answers every address until it sees `quota_after`, then reports quota exhaustion.
    struct ScriptedGeocoder {
        quota_after: Option<&'static str>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Geocoder for ScriptedGeocoder {
        async fn geocode(&self, address: &str) -> AppResult<Outcome> {
            *self.calls.lock() += 1;
            if Some(address) == self.quota_after {
                return Err(AppError::QuotaOrPermission {
                    status: "OVER_QUERY_LIMIT".into(),
                    message: String::new(),
                });
            }
            Ok(Outcome::Found(PlaceMatch::new(1.0, 2.0, Some(address.into()))))
        }
    }

    fn shops(addresses: &[&str]) -> Vec<Shop> {
        addresses
            .iter()
            .map(|address| Shop {
                address: address.to_string(),
                coords: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn merges_outcomes_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let geocoder = Arc::new(ScriptedGeocoder {
            quota_after: None,
            calls: Mutex::new(0),
        });
        let mut records = shops(&["one", "", "one"]);

        let mut session = CacheSession::open(&path).unwrap();
        let result = {
            let mut resolver = PlaceResolver::new(
                session.cache_mut(),
                Vec::new(),
                geocoder.clone(),
                Throttle::disabled(),
            );
            enrich(&mut resolver, &mut records, &ShopAdapter).await
        };
        let stats = session.close(result).unwrap();

        assert_eq!(stats.records, 3);
        assert_eq!(stats.resolved, 2);
        assert_eq!(stats.unresolved, 1);
        assert_eq!(stats.live_calls, 1);
        assert_eq!(records[0].coords, Some((1.0, 2.0)));
        assert_eq!(records[1].coords, None);
        assert_eq!(*geocoder.calls.lock(), 1);
        assert_eq!(GeocodeCache::load(&path).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn saves_partial_progress_when_batch_aborts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let geocoder = Arc::new(ScriptedGeocoder {
            quota_after: Some("two"),
            calls: Mutex::new(0),
        });
        let mut records = shops(&["one", "two", "three"]);

        let mut session = CacheSession::open(&path).unwrap();
        let result = {
            let mut resolver = PlaceResolver::new(
                session.cache_mut(),
                Vec::new(),
                geocoder.clone(),
                Throttle::disabled(),
            );
            enrich(&mut resolver, &mut records, &ShopAdapter).await
        };
        let err = session.close(result).unwrap_err();

        assert!(err.is_batch_fatal());
        assert_eq!(records[0].coords, Some((1.0, 2.0)));
        assert_eq!(records[2].coords, None);

        let saved = GeocodeCache::load(&path).unwrap();
        assert!(saved.contains(&LookupKey::address("one")));
        assert!(!saved.contains(&LookupKey::address("two")));
        assert!(!saved.contains(&LookupKey::address("three")));
    }

    #[test]
    fn drop_saves_unclosed_session() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        {
            let mut session = CacheSession::open(&path).unwrap();
            session.cache_mut().insert(LookupKey::address("x"), &Outcome::NotFound);
        }

        let saved = GeocodeCache::load(&path).unwrap();
        assert_eq!(saved.get(&LookupKey::address("x")), Some(Outcome::NotFound));
    }

    #[test]
    fn corrupt_cache_stops_before_the_batch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json").unwrap();

        let err = CacheSession::open(&path).err().unwrap();
        assert!(matches!(err, AppError::CacheCorrupt { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");
    }
}
