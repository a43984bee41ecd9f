// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Byte-budgeted image cache with priority + recency eviction.
//!
//! When the resident byte count exceeds the budget, entries are ordered by
//! `(priority ascending, last access ascending)` and the first third of that
//! ordering is evicted in one pass. The byte count always equals the sum of
//! the resident entries' sizes; every mutation re-checks this in debug builds.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Default cache budget: 50 MB.
pub const DEFAULT_MAX_CACHE_BYTES: usize = 50 * 1024 * 1024;

/// An image cache shared between the resource manager and the view layer.
pub type SharedImageCache = Arc<Mutex<ImageCache>>;

/// Eviction priority of a cache entry. Lower priorities are evicted first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum ImagePriority {
    /// Decorative or easily re-fetched images.
    Low,
    /// Ordinary content.
    #[default]
    Normal,
    /// Images the UI cannot do without (e.g. the current avatar).
    High,
}

/// A decoded image held by the cache. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct CachedImage(Arc<DynamicImage>);

impl CachedImage {
    /// The decoded image.
    pub fn image(&self) -> &DynamicImage {
        &self.0
    }

    /// Number of bytes the decoded pixels occupy.
    pub fn size_bytes(&self) -> usize {
        self.0.as_bytes().len()
    }
}

impl From<DynamicImage> for CachedImage {
    fn from(image: DynamicImage) -> Self {
        Self(Arc::new(image))
    }
}

impl From<Arc<DynamicImage>> for CachedImage {
    fn from(image: Arc<DynamicImage>) -> Self {
        Self(image)
    }
}

#[derive(Debug)]
struct CacheEntry {
    image: CachedImage,
    size_bytes: usize,
    priority: ImagePriority,
    last_accessed: Instant,
    /// Tie-breaker for entries touched within the same clock tick.
    access_seq: u64,
}

/// Configuration for the [`ImageCache`].
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Byte budget above which a cleanup pass runs.
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_CACHE_BYTES,
        }
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// Number of resident entries.
    pub entry_count: usize,
    /// Bytes held by resident entries.
    pub size_bytes: usize,
    /// Configured budget.
    pub max_bytes: usize,
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries removed by budget or pressure cleanup.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Byte-budgeted cache of decoded images.
#[derive(Debug, Default)]
pub struct ImageCache {
    entries: HashMap<String, CacheEntry>,
    current_size_bytes: usize,
    config: CacheConfig,
    next_seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl ImageCache {
    /// Creates an empty cache with the given budget.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Wraps the cache for sharing with the resource manager.
    pub fn into_shared(self) -> SharedImageCache {
        Arc::new(Mutex::new(self))
    }

    /// Inserts or replaces the image stored under `key`, then enforces the budget.
    pub fn cache_image(
        &mut self,
        key: impl Into<String>,
        image: impl Into<CachedImage>,
        priority: ImagePriority,
    ) {
        let image = image.into();
        let size_bytes = image.size_bytes();
        let entry = CacheEntry {
            image,
            size_bytes,
            priority,
            last_accessed: Instant::now(),
            access_seq: self.bump_seq(),
        };

        let previous = self.entries.insert(key.into(), entry);
        let previous_size = previous.map_or(0, |entry| entry.size_bytes);
        self.current_size_bytes = self.current_size_bytes - previous_size + size_bytes;
        self.check_invariants();

        self.cleanup_if_needed();
    }

    /// Returns the image stored under `key` and marks it as recently used.
    pub fn get_image(&mut self, key: &str) -> Option<CachedImage> {
        let seq = self.bump_seq();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed = Instant::now();
                entry.access_seq = seq;
                self.hits += 1;
                Some(entry.image.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Removes the entry stored under `key`, if any.
    pub fn remove(&mut self, key: &str) -> Option<CachedImage> {
        let entry = self.entries.remove(key)?;
        self.current_size_bytes -= entry.size_bytes;
        self.check_invariants();
        Some(entry.image)
    }

    /// Evicts the lowest-ranked third of the entries if the budget is exceeded.
    ///
    /// At least one entry is evicted per pass. Returns the number evicted.
    pub fn cleanup_if_needed(&mut self) -> usize {
        if self.current_size_bytes <= self.config.max_bytes {
            return 0;
        }

        let mut ranked: Vec<(ImagePriority, Instant, u64, String)> = self
            .entries
            .iter()
            .map(|(key, entry)| {
                (
                    entry.priority,
                    entry.last_accessed,
                    entry.access_seq,
                    key.clone(),
                )
            })
            .collect();
        ranked.sort();

        let evict_count = (ranked.len() / 3).max(1);
        let before = self.current_size_bytes;
        for (_, _, _, key) in ranked.into_iter().take(evict_count) {
            self.evict(&key);
        }

        log::debug!(
            "ImageCache over budget ({} > {} bytes): evicted {} entries, now {} bytes.",
            before,
            self.config.max_bytes,
            evict_count,
            self.current_size_bytes
        );
        evict_count
    }

    /// Removes every entry tagged [`ImagePriority::Low`]. Returns the number removed.
    pub fn clear_low_priority_images(&mut self) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.priority == ImagePriority::Low)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            self.evict(key);
        }
        if !keys.is_empty() {
            log::debug!("ImageCache: cleared {} low-priority images.", keys.len());
        }
        keys.len()
    }

    /// Empties the cache. Returns the number of entries removed.
    pub fn clear_all(&mut self) -> usize {
        let removed = self.entries.len();
        self.evictions += removed as u64;
        self.entries.clear();
        self.current_size_bytes = 0;
        self.check_invariants();
        if removed > 0 {
            log::debug!("ImageCache: cleared all {} images.", removed);
        }
        removed
    }

    /// Bytes held by resident entries.
    pub fn current_size_bytes(&self) -> usize {
        self.current_size_bytes
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if an entry is stored under `key`. Does not touch recency.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// The configured byte budget.
    pub fn max_bytes(&self) -> usize {
        self.config.max_bytes
    }

    /// Returns the cache's counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entries.len(),
            size_bytes: self.current_size_bytes,
            max_bytes: self.config.max_bytes,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    fn evict(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.current_size_bytes -= entry.size_bytes;
            self.evictions += 1;
        }
        self.check_invariants();
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn check_invariants(&self) {
        debug_assert_eq!(
            self.current_size_bytes,
            self.entries.values().map(|entry| entry.size_bytes).sum::<usize>(),
            "cache byte count drifted from resident entries"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: usize = 1024 * 1024;

    /// A single-row grayscale image occupying exactly `bytes` bytes.
    fn image_of(bytes: usize) -> DynamicImage {
        DynamicImage::new_luma8(bytes as u32, 1)
    }

    #[test]
    fn test_size_matches_decoded_bytes() {
        let image = CachedImage::from(DynamicImage::new_rgba8(8, 4));
        assert_eq!(image.size_bytes(), 8 * 4 * 4);
    }

    #[test]
    fn test_replacing_an_entry_adjusts_size() {
        let mut cache = ImageCache::new(CacheConfig::default());
        cache.cache_image("avatar", image_of(1000), ImagePriority::Normal);
        cache.cache_image("banner", image_of(500), ImagePriority::Normal);
        assert_eq!(cache.current_size_bytes(), 1500);

        cache.cache_image("avatar", image_of(200), ImagePriority::High);
        assert_eq!(cache.current_size_bytes(), 700);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_get_image_hits_and_misses() {
        let mut cache = ImageCache::new(CacheConfig::default());
        cache.cache_image("a", image_of(10), ImagePriority::Normal);

        assert!(cache.get_image("a").is_some());
        assert!(cache.get_image("missing").is_none());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clear_low_priority_images_empties_low_entries() {
        let mut cache = ImageCache::new(CacheConfig { max_bytes: 100 * MB });
        cache.cache_image("a", image_of(10 * MB), ImagePriority::Low);
        cache.cache_image("b", image_of(20 * MB), ImagePriority::Low);
        cache.cache_image("c", image_of(30 * MB), ImagePriority::Low);
        assert_eq!(cache.current_size_bytes(), 60 * MB);

        assert_eq!(cache.clear_low_priority_images(), 3);
        assert!(cache.is_empty());
        assert_eq!(cache.current_size_bytes(), 0);
    }

    #[test]
    fn test_clear_low_priority_keeps_other_priorities() {
        let mut cache = ImageCache::new(CacheConfig::default());
        cache.cache_image("low", image_of(10), ImagePriority::Low);
        cache.cache_image("normal", image_of(20), ImagePriority::Normal);
        cache.cache_image("high", image_of(30), ImagePriority::High);

        assert_eq!(cache.clear_low_priority_images(), 1);
        assert!(!cache.contains("low"));
        assert_eq!(cache.current_size_bytes(), 50);
    }

    #[test]
    fn test_over_budget_evicts_lowest_third() {
        let mut cache = ImageCache::new(CacheConfig { max_bytes: 1000 });
        // Six entries, 100 bytes each: exactly at budget after the sixth.
        cache.cache_image("high-old", image_of(100), ImagePriority::High);
        cache.cache_image("normal-old", image_of(100), ImagePriority::Normal);
        cache.cache_image("low-old", image_of(100), ImagePriority::Low);
        cache.cache_image("normal-new", image_of(100), ImagePriority::Normal);
        cache.cache_image("low-new", image_of(100), ImagePriority::Low);
        cache.cache_image("high-new", image_of(100), ImagePriority::High);
        assert_eq!(cache.len(), 6);

        // Touch the oldest low entry so it ranks after the newer one.
        assert!(cache.get_image("low-old").is_some());

        // 1100 bytes > 1000: ranks low-new, low-old, normal-old, ... and
        // evicts the first third of seven entries (two).
        cache.cache_image("big", image_of(500), ImagePriority::Normal);
        assert!(!cache.contains("low-new"));
        assert!(!cache.contains("low-old"));
        assert!(cache.contains("normal-old"));
        assert!(cache.contains("big"));
        assert_eq!(cache.current_size_bytes(), 900);
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_single_oversized_entry_is_evicted() {
        let mut cache = ImageCache::new(CacheConfig { max_bytes: 100 });
        cache.cache_image("huge", image_of(101), ImagePriority::High);
        assert!(cache.is_empty());
        assert_eq!(cache.current_size_bytes(), 0);
    }

    #[test]
    fn test_size_accounting_survives_mixed_operations() {
        let mut cache = ImageCache::new(CacheConfig { max_bytes: 4096 });
        let priorities = [ImagePriority::Low, ImagePriority::Normal, ImagePriority::High];

        for step in 0..300usize {
            let key = format!("img-{}", step % 23);
            match step % 5 {
                0 | 1 | 2 => cache.cache_image(
                    key,
                    image_of(64 + (step * 37) % 700),
                    priorities[step % 3],
                ),
                3 => {
                    cache.get_image(&key);
                }
                _ => {
                    cache.remove(&key);
                }
            }
            if step % 97 == 0 {
                cache.clear_low_priority_images();
            }

            let resident: usize = cache
                .entries
                .values()
                .map(|entry| entry.size_bytes)
                .sum();
            assert_eq!(cache.current_size_bytes(), resident);
        }

        cache.clear_all();
        assert_eq!(cache.current_size_bytes(), 0);
    }
}
