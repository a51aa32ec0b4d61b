// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TTL-aware cache of services collected from responses.

use crate::types::{Response, Service};
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// A cached service and the moment it was (re)cached.
#[derive(Debug, Clone)]
pub struct ExpiringService {
    pub service: Service,
    pub cache_start: Instant,
}

impl ExpiringService {
    pub fn new(service: Service, cache_start: Instant) -> Self {
        Self {
            service,
            cache_start,
        }
    }

    /// A `ttl` of 0 never expires; otherwise the entry lives `ttl` minutes.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.service.ttl {
            0 => false,
            minutes => {
                let lifetime = Duration::from_secs(u64::from(minutes) * 60);
                now.saturating_duration_since(self.cache_start) > lifetime
            }
        }
    }
}

/// Services keyed by service id. A newer copy replaces the older one and
/// restarts its TTL.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<String, ExpiringService>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self, service: Service) {
        self.cache_at(service, Instant::now());
    }

    pub fn cache_at(&self, service: Service, now: Instant) {
        log::debug!("[CACHE] caching service {}", service.id);
        self.entries
            .insert(service.id.clone(), ExpiringService::new(service, now));
    }

    /// Cache every service of `response`.
    pub fn cache_all(&self, response: &Response) {
        let now = Instant::now();
        for service in &response.services {
            self.cache_at(service.clone(), now);
        }
    }

    /// Evict expired entries, then return the live services.
    pub fn snapshot(&self) -> Vec<Service> {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> Vec<Service> {
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        let mut services: Vec<Service> = self
            .entries
            .iter()
            .map(|entry| entry.value().service.clone())
            .collect();
        services.sort_by(|a, b| a.id.cmp(&b.id));
        services
    }

    pub fn get(&self, id: &str) -> Option<Service> {
        self.entries.get(id).map(|entry| entry.service.clone())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_one_minute() {
        let start = Instant::now();
        let entry = ExpiringService::new(Service::new("a", "c", "A").with_ttl(1), start);
        assert!(!entry.is_expired_at(start + Duration::from_secs(59)));
        assert!(!entry.is_expired_at(start + Duration::from_secs(60)));
        assert!(entry.is_expired_at(start + Duration::from_secs(61)));
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let start = Instant::now();
        let entry = ExpiringService::new(Service::new("a", "c", "A").with_ttl(0), start);
        assert!(!entry.is_expired_at(start + Duration::from_secs(365 * 24 * 3600)));
    }

    #[test]
    fn test_snapshot_evicts_expired() {
        let cache = ResponseCache::new();
        let start = Instant::now();
        cache.cache_at(Service::new("short", "c", "Short").with_ttl(1), start);
        cache.cache_at(Service::new("forever", "c", "Forever").with_ttl(0), start);
        assert_eq!(cache.snapshot_at(start + Duration::from_secs(59)).len(), 2);

        let live = cache.snapshot_at(start + Duration::from_secs(61));
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, "forever");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_recache_replaces_and_restarts() {
        let cache = ResponseCache::new();
        let start = Instant::now();
        cache.cache_at(Service::new("a", "c", "Old").with_ttl(1), start);
        cache.cache_at(
            Service::new("a", "c", "New").with_ttl(1),
            start + Duration::from_secs(50),
        );
        assert_eq!(cache.len(), 1);
        let live = cache.snapshot_at(start + Duration::from_secs(100));
        assert_eq!(live[0].service_name, "New");
    }

    #[test]
    fn test_cache_all_and_clear() {
        let mut response = Response::new("p");
        response.add_service(Service::new("a", "c", "A"));
        response.add_service(Service::new("b", "c", "B"));
        let cache = ResponseCache::new();
        cache.cache_all(&response);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_some());
        cache.clear();
        assert!(cache.is_empty());
    }
}
