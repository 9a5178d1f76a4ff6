use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::cache::{GeocodeCache, LookupKey};
use crate::errors::AppResult;
use crate::geocode::Geocoder;
use crate::outcome::{Outcome, PlaceMatch};
use crate::places::{PlaceSearch, TierResult};
use crate::throttle::Throttle;

/// What to do with a cached match that has coordinates but no place id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    /// Return it as-is without a live call.
    Reuse,
    /// Re-run the lookup once per run; keep the old entry if that finds nothing.
    #[default]
    Upgrade,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    pub records: usize,
    pub cache_hits: usize,
    pub live_calls: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

enum Cached {
    Hit(Outcome),
    Stale(PlaceMatch),
    Miss,
}

/// Per record: each query candidate goes cache, then every place search
/// strategy in order; if none matched, the address goes cache, then geocode.
pub struct PlaceResolver<'c> {
    cache: &'c mut GeocodeCache,
    strategies: Vec<Arc<dyn PlaceSearch>>,
    geocoder: Arc<dyn Geocoder>,
    throttle: Throttle,
    stale_policy: StalePolicy,
    upgraded: HashSet<LookupKey>,
    /// Place keys whose lookups all failed this run; kept out of the cache.
    unanswered: HashSet<LookupKey>,
    stats: ResolutionStats,
}

impl<'c> PlaceResolver<'c> {
    pub fn new(
        cache: &'c mut GeocodeCache,
        strategies: Vec<Arc<dyn PlaceSearch>>,
        geocoder: Arc<dyn Geocoder>,
        throttle: Throttle,
    ) -> Self {
        Self {
            cache,
            strategies,
            geocoder,
            throttle,
            stale_policy: StalePolicy::default(),
            upgraded: HashSet::new(),
            unanswered: HashSet::new(),
            stats: ResolutionStats::default(),
        }
    }

    pub fn with_stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    pub fn stats(&self) -> &ResolutionStats {
        &self.stats
    }

    /// Resolves one record. Only geocoding errors are returned; place search
    /// problems degrade to the next candidate or tier.
    pub async fn resolve(&mut self, candidates: &[String], address: &str) -> AppResult<Outcome> {
        self.stats.records += 1;
        let outcome = self.resolve_record(candidates, address).await?;
        if outcome.is_found() {
            self.stats.resolved += 1;
        } else {
            self.stats.unresolved += 1;
        }
        Ok(outcome)
    }

    async fn resolve_record(&mut self, candidates: &[String], address: &str) -> AppResult<Outcome> {
        if !self.strategies.is_empty() {
            let queries = candidates
                .iter()
                .map(|candidate| candidate.trim())
                .filter(|candidate| !candidate.is_empty());
            for query in queries {
                if let Some(place) = self.resolve_place(query).await {
                    return Ok(Outcome::Found(place));
                }
            }
        }

        let address = address.trim();
        if address.is_empty() {
            return Ok(Outcome::NotFound);
        }
        self.resolve_address(address).await
    }

    async fn resolve_place(&mut self, query: &str) -> Option<PlaceMatch> {
        let key = LookupKey::place(query);
        if self.unanswered.contains(&key) {
            trace!(%key, "place lookups already failed this run");
            return None;
        }
        let stale = match self.check_cache(&key) {
            Cached::Hit(outcome) => return outcome.place().cloned(),
            Cached::Stale(place) => Some(place),
            Cached::Miss => None,
        };

        let strategies = self.strategies.clone();
        let mut answered = false;
        for strategy in strategies {
            let result = strategy.search(query).await;
            self.stats.live_calls += 1;
            self.throttle.pause().await;

            match result {
                TierResult::Hit(place) => {
                    debug!(strategy = strategy.name(), query, "place search matched");
                    self.cache.insert(key, &Outcome::Found(place.clone()));
                    return Some(place);
                }
                TierResult::Miss(reason) if reason.is_failure() => {
                    warn!(
                        strategy = strategy.name(),
                        query,
                        %reason,
                        "place search failed; treating as no result"
                    );
                }
                TierResult::Miss(reason) => {
                    answered = true;
                    debug!(strategy = strategy.name(), query, %reason, "place search missed");
                }
            }
        }

        if stale.is_some() {
            debug!(query, "no better match; keeping cached place without id");
        } else if !answered {
            debug!(query, "leaving place key uncached after failed lookups");
            self.unanswered.insert(key);
        } else {
            self.cache.insert(key, &Outcome::NotFound);
        }
        stale
    }

    async fn resolve_address(&mut self, address: &str) -> AppResult<Outcome> {
        let key = LookupKey::address(address);
        let stale = match self.check_cache(&key) {
            Cached::Hit(outcome) => return Ok(outcome),
            Cached::Stale(place) => Some(place),
            Cached::Miss => None,
        };

        let result = self.geocoder.geocode(address).await;
        self.stats.live_calls += 1;
        let outcome = result?;
        self.throttle.pause().await;

        match (outcome, stale) {
            (Outcome::NotFound, Some(place)) => {
                debug!(address, "geocode found nothing; keeping cached match without id");
                Ok(Outcome::Found(place))
            }
            (outcome, _) => {
                debug!(address, found = outcome.is_found(), "geocoded address");
                self.cache.insert(key, &outcome);
                Ok(outcome)
            }
        }
    }

    fn check_cache(&mut self, key: &LookupKey) -> Cached {
        match self.cache.get(key) {
            None => Cached::Miss,
            Some(Outcome::Found(place))
                if !place.has_place_id()
                    && self.stale_policy == StalePolicy::Upgrade
                    && self.upgraded.insert(key.clone()) =>
            {
                trace!(%key, "cached match lacks a place id; refreshing");
                Cached::Stale(place)
            }
            Some(outcome) => {
                trace!(%key, found = outcome.is_found(), "cache hit");
                self.stats.cache_hits += 1;
                Cached::Hit(outcome)
            }
        }
    }
}
