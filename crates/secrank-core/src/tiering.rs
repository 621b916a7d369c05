//! Font-size tiering
//!
//! Groups the distinct font sizes of a document into at most `clusters`
//! prominence tiers. Tier 0 holds the largest sizes and maps to H1, tiers 1-3
//! map to H2-H4. Any further tiers carry no level and are left for the
//! fallback classifier.
//!
//! Two strategies are provided:
//! - [`KMeansTiers`]: seeded 1-D k-means (k-means++ initialization)
//! - [`GapTiers`]: cut the sorted sizes at the widest gaps
//!
//! Both are deterministic and monotone: a larger size never lands in a
//! numerically larger tier than a smaller one.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of size clusters
pub const DEFAULT_CLUSTERS: usize = 4;

/// Default k-means iteration cap
const DEFAULT_MAX_ITERATIONS: usize = 300;

/// Default number of k-means initializations
const DEFAULT_RESTARTS: usize = 10;

/// Centroid shift below which k-means is considered converged
const CONVERGENCE_THRESHOLD: f64 = 1e-9;

/// Heading level, H1 being the most prominent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HeadingLevel {
    H1,
    H2,
    H3,
    H4,
}

impl HeadingLevel {
    /// Level for a tier rank, if the rank maps onto one.
    pub const fn from_tier(tier: usize) -> Option<Self> {
        match tier {
            0 => Some(Self::H1),
            1 => Some(Self::H2),
            2 => Some(Self::H3),
            3 => Some(Self::H4),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::H1 => "H1",
            Self::H2 => "H2",
            Self::H3 => "H3",
            Self::H4 => "H4",
        }
    }
}

impl std::fmt::Display for HeadingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HeadingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "H1" => Ok(Self::H1),
            "H2" => Ok(Self::H2),
            "H3" => Ok(Self::H3),
            "H4" => Ok(Self::H4),
            _ => Err(format!("Unknown heading level '{s}'. Expected: H1, H2, H3, H4")),
        }
    }
}

/// Map key for a size rounded to one decimal.
#[inline]
fn size_key(size: f32) -> i64 {
    (f64::from(size) * 10.0).round() as i64
}

/// Distinct sizes, ascending, compared at one-decimal precision.
fn distinct_sizes(sizes: &[f32]) -> Vec<f64> {
    let mut keys: Vec<i64> = sizes
        .iter()
        .filter(|s| s.is_finite())
        .map(|s| size_key(*s))
        .collect();
    keys.sort_unstable();
    keys.dedup();
    keys.into_iter().map(|k| k as f64 / 10.0).collect()
}

/// Size-to-tier assignment for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierMap {
    tiers: BTreeMap<i64, usize>,
    tier_count: usize,
}

impl TierMap {
    /// Every size in one tier.
    fn single(sizes: &[f64]) -> Self {
        let tiers: BTreeMap<i64, usize> = sizes.iter().map(|s| (size_key(*s as f32), 0)).collect();
        let tier_count = usize::from(!tiers.is_empty());
        Self { tiers, tier_count }
    }

    /// Build from `(size, tier)` pairs.
    fn from_pairs(pairs: impl IntoIterator<Item = (f64, usize)>) -> Self {
        let tiers: BTreeMap<i64, usize> = pairs
            .into_iter()
            .map(|(size, tier)| (size_key(size as f32), tier))
            .collect();
        let tier_count = tiers.values().max().map_or(0, |max| max + 1);
        Self { tiers, tier_count }
    }

    /// Tier rank of a size, `None` if the size was not seen.
    pub fn tier_of(&self, size: f32) -> Option<usize> {
        self.tiers.get(&size_key(size)).copied()
    }

    /// Heading level of a size. `None` for unseen sizes and for tiers
    /// beyond H4.
    pub fn level_of(&self, size: f32) -> Option<HeadingLevel> {
        self.tier_of(size).and_then(HeadingLevel::from_tier)
    }

    /// Number of tiers in use.
    pub fn tier_count(&self) -> usize {
        self.tier_count
    }

    /// `(size, tier)` pairs, ascending by size.
    pub fn iter(&self) -> impl Iterator<Item = (f32, usize)> + '_ {
        self.tiers.iter().map(|(k, t)| (*k as f32 / 10.0, *t))
    }
}

/// Strategy for grouping font sizes into tiers.
pub trait TierStrategy: Send + Sync {
    /// Assign every distinct size in `sizes` to a tier.
    ///
    /// Must be deterministic and monotone in size. Degenerate input (zero
    /// or one distinct size) yields a single tier and never fails.
    fn assign(&self, sizes: &[f32]) -> TierMap;

    /// Strategy name for logging
    fn name(&self) -> &str;
}

/// Which tiering strategy to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierStrategyKind {
    #[default]
    Kmeans,
    Gaps,
}

impl std::str::FromStr for TierStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kmeans" | "k-means" => Ok(Self::Kmeans),
            "gaps" | "gap" => Ok(Self::Gaps),
            _ => Err(format!("Unknown tier strategy '{s}'. Expected: kmeans, gaps")),
        }
    }
}

impl TierStrategyKind {
    /// Instantiate the strategy.
    pub fn build(self, clusters: usize, seed: u64) -> Box<dyn TierStrategy> {
        match self {
            Self::Kmeans => Box::new(KMeansTiers {
                clusters,
                seed,
                ..KMeansTiers::default()
            }),
            Self::Gaps => Box::new(GapTiers { clusters }),
        }
    }
}

/// Seeded one-dimensional k-means over the distinct sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeansTiers {
    /// Upper bound on the number of clusters
    pub clusters: usize,
    /// RNG seed for centroid initialization
    pub seed: u64,
    pub max_iterations: usize,
    /// Independent initializations; the run with the lowest inertia wins
    pub restarts: usize,
}

impl Default for KMeansTiers {
    fn default() -> Self {
        Self {
            clusters: DEFAULT_CLUSTERS,
            seed: 0,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            restarts: DEFAULT_RESTARTS,
        }
    }
}

impl TierStrategy for KMeansTiers {
    fn assign(&self, sizes: &[f32]) -> TierMap {
        let points = distinct_sizes(sizes);
        if points.len() <= 1 || self.clusters <= 1 {
            return TierMap::single(&points);
        }

        let k = self.clusters.min(points.len());
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut best: Option<(Vec<f64>, f64)> = None;
        for _run in 0..self.restarts.max(1) {
            let (centroids, inertia) = self.lloyd(&points, k, &mut rng);
            if best.as_ref().map_or(true, |(_, b)| inertia < *b) {
                best = Some((centroids, inertia));
            }
        }
        let Some((mut centroids, _)) = best else {
            return TierMap::single(&points);
        };

        // Final assignment against centroids in ascending order so ties
        // resolve the same way for every point.
        centroids.sort_by(f64::total_cmp);
        let assignments = nearest_centroids(&points, &centroids);

        // Rank non-empty clusters by centroid, largest first
        let mut used: Vec<usize> = assignments.clone();
        used.sort_unstable();
        used.dedup();
        let rank: BTreeMap<usize, usize> = used
            .iter()
            .rev()
            .enumerate()
            .map(|(rank, &cluster)| (cluster, rank))
            .collect();

        TierMap::from_pairs(
            points
                .iter()
                .zip(assignments.iter())
                .map(|(&size, cluster)| (size, rank[cluster])),
        )
    }

    fn name(&self) -> &str {
        "kmeans"
    }
}

impl KMeansTiers {
    /// One k-means run: k-means++ seeding followed by Lloyd iterations.
    /// Returns the centroids and their inertia.
    fn lloyd(&self, points: &[f64], k: usize, rng: &mut StdRng) -> (Vec<f64>, f64) {
        let mut centroids = initialize_centroids(points, k, rng);

        for _iter in 0..self.max_iterations {
            let assignments = nearest_centroids(points, &centroids);

            let mut sums = vec![0.0f64; k];
            let mut counts = vec![0usize; k];
            for (point, &cluster) in points.iter().zip(assignments.iter()) {
                sums[cluster] += point;
                counts[cluster] += 1;
            }

            let mut shift = 0.0f64;
            for (c, centroid) in centroids.iter_mut().enumerate() {
                let updated = if counts[c] > 0 {
                    sums[c] / counts[c] as f64
                } else {
                    // Empty cluster: reseed from a random point
                    points[rng.random_range(0..points.len())]
                };
                shift = shift.max((updated - *centroid).abs());
                *centroid = updated;
            }

            if shift < CONVERGENCE_THRESHOLD {
                break;
            }
        }

        let inertia = points
            .iter()
            .zip(nearest_centroids(points, &centroids))
            .map(|(p, c)| (p - centroids[c]) * (p - centroids[c]))
            .sum();
        (centroids, inertia)
    }
}

/// Index of the nearest centroid for every point; ties go to the lower index.
fn nearest_centroids(points: &[f64], centroids: &[f64]) -> Vec<usize> {
    points
        .iter()
        .map(|&p| {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (i, &c) in centroids.iter().enumerate() {
                let dist = (p - c).abs();
                if dist < best_dist {
                    best = i;
                    best_dist = dist;
                }
            }
            best
        })
        .collect()
}

/// k-means++ initialization: first centroid uniformly, the rest with
/// probability proportional to squared distance from the chosen ones.
fn initialize_centroids(points: &[f64], k: usize, rng: &mut StdRng) -> Vec<f64> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.random_range(0..points.len())]);

    while centroids.len() < k {
        let distances: Vec<f64> = points
            .iter()
            .map(|p| {
                centroids
                    .iter()
                    .map(|c| (p - c) * (p - c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();

        let total: f64 = distances.iter().sum();
        if total <= 0.0 {
            centroids.push(points[rng.random_range(0..points.len())]);
            continue;
        }

        let threshold = rng.random::<f64>() * total;
        let mut cumulative = 0.0;
        let mut chosen = points.len() - 1;
        for (i, d) in distances.iter().enumerate() {
            cumulative += d;
            if cumulative >= threshold && *d > 0.0 {
                chosen = i;
                break;
            }
        }
        centroids.push(points[chosen]);
    }

    centroids
}

/// Cut the descending size list at its widest gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapTiers {
    /// Upper bound on the number of tiers
    pub clusters: usize,
}

impl Default for GapTiers {
    fn default() -> Self {
        Self {
            clusters: DEFAULT_CLUSTERS,
        }
    }
}

impl TierStrategy for GapTiers {
    fn assign(&self, sizes: &[f32]) -> TierMap {
        let mut points = distinct_sizes(sizes);
        if points.len() <= 1 || self.clusters <= 1 {
            return TierMap::single(&points);
        }
        points.reverse();

        let k = self.clusters.min(points.len());
        // gaps[i] sits between points[i] and points[i + 1]
        let mut gaps: Vec<(usize, f64)> = points
            .windows(2)
            .enumerate()
            .map(|(i, w)| (i, w[0] - w[1]))
            .collect();
        gaps.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut cuts: Vec<usize> = gaps.iter().take(k - 1).map(|(i, _)| *i).collect();
        cuts.sort_unstable();

        let mut tier = 0;
        let mut next_cut = cuts.iter().peekable();
        let mut pairs = Vec::with_capacity(points.len());
        for (i, &size) in points.iter().enumerate() {
            pairs.push((size, tier));
            if next_cut.peek() == Some(&&i) {
                next_cut.next();
                tier += 1;
            }
        }

        TierMap::from_pairs(pairs)
    }

    fn name(&self) -> &str {
        "gaps"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_monotone(map: &TierMap) {
        let pairs: Vec<(f32, usize)> = map.iter().collect();
        for w in pairs.windows(2) {
            // ascending sizes => non-increasing tiers
            assert!(
                w[1].1 <= w[0].1,
                "size {} tier {} vs size {} tier {}",
                w[0].0,
                w[0].1,
                w[1].0,
                w[1].1
            );
        }
    }

    #[test]
    fn test_heading_level_round_trip_names() {
        for level in [HeadingLevel::H1, HeadingLevel::H2, HeadingLevel::H3, HeadingLevel::H4] {
            assert_eq!(level.to_string().parse::<HeadingLevel>(), Ok(level));
        }
        assert!("H5".parse::<HeadingLevel>().is_err());
        assert_eq!(HeadingLevel::from_tier(4), None);
    }

    #[test]
    fn test_kmeans_four_clear_groups() {
        let sizes = [24.0, 24.0, 18.0, 14.1, 14.0, 10.0, 10.0, 9.9];
        let map = KMeansTiers::default().assign(&sizes);
        assert_eq!(map.tier_count(), 4);
        assert_eq!(map.level_of(24.0), Some(HeadingLevel::H1));
        assert_eq!(map.level_of(18.0), Some(HeadingLevel::H2));
        assert_eq!(map.level_of(14.1), Some(HeadingLevel::H3));
        assert_eq!(map.level_of(14.0), Some(HeadingLevel::H3));
        assert_eq!(map.level_of(10.0), Some(HeadingLevel::H4));
        assert_eq!(map.level_of(9.9), Some(HeadingLevel::H4));
    }

    #[test]
    fn test_kmeans_fewer_sizes_than_clusters() {
        let map = KMeansTiers::default().assign(&[12.0, 16.0]);
        assert_eq!(map.tier_count(), 2);
        assert_eq!(map.tier_of(16.0), Some(0));
        assert_eq!(map.tier_of(12.0), Some(1));
    }

    #[test]
    fn test_single_size_is_one_tier() {
        for strategy in [TierStrategyKind::Kmeans, TierStrategyKind::Gaps] {
            let map = strategy.build(4, 0).assign(&[11.0, 11.0, 11.0]);
            assert_eq!(map.tier_count(), 1);
            assert_eq!(map.level_of(11.0), Some(HeadingLevel::H1));
        }
    }

    #[test]
    fn test_empty_input() {
        let map = KMeansTiers::default().assign(&[]);
        assert_eq!(map.tier_count(), 0);
        assert_eq!(map.tier_of(12.0), None);
        let map = GapTiers::default().assign(&[]);
        assert_eq!(map.tier_count(), 0);
    }

    #[test]
    fn test_kmeans_is_deterministic() {
        let sizes = [8.0, 9.0, 9.5, 10.0, 11.0, 12.0, 14.0, 16.0, 18.0, 20.0, 22.0, 28.0];
        let a = KMeansTiers::default().assign(&sizes);
        let b = KMeansTiers::default().assign(&sizes);
        assert_eq!(a, b);
    }

    #[test]
    fn test_extra_clusters_leave_sizes_without_level() {
        let sizes = [30.0, 24.0, 18.0, 14.0, 10.0, 8.0];
        let map = KMeansTiers {
            clusters: 6,
            ..KMeansTiers::default()
        }
        .assign(&sizes);
        assert_eq!(map.tier_count(), 6);
        assert_eq!(map.level_of(30.0), Some(HeadingLevel::H1));
        assert_eq!(map.level_of(10.0), None);
        assert_eq!(map.level_of(8.0), None);
    }

    #[test]
    fn test_gaps_cut_at_widest_gaps() {
        // gaps: 24->23 (1), 23->16 (7), 16->15 (1), 15->10 (5), 10->9 (1)
        let map = GapTiers { clusters: 3 }.assign(&[24.0, 23.0, 16.0, 15.0, 10.0, 9.0]);
        assert_eq!(map.tier_of(24.0), Some(0));
        assert_eq!(map.tier_of(23.0), Some(0));
        assert_eq!(map.tier_of(16.0), Some(1));
        assert_eq!(map.tier_of(15.0), Some(1));
        assert_eq!(map.tier_of(10.0), Some(2));
        assert_eq!(map.tier_of(9.0), Some(2));
    }

    #[test]
    fn test_sizes_compared_at_one_decimal() {
        let map = KMeansTiers::default().assign(&[12.04, 20.0]);
        assert_eq!(map.tier_of(12.0), Some(1));
    }

    proptest! {
        #[test]
        fn prop_kmeans_monotone(sizes in prop::collection::vec(4.0f32..72.0, 1..40), clusters in 1usize..8, seed in 0u64..16) {
            let map = KMeansTiers { clusters, seed, ..KMeansTiers::default() }.assign(&sizes);
            assert_monotone(&map);
            for s in &sizes {
                prop_assert!(map.tier_of(*s).is_some());
            }
        }

        #[test]
        fn prop_gaps_monotone(sizes in prop::collection::vec(4.0f32..72.0, 1..40), clusters in 1usize..8) {
            let map = GapTiers { clusters }.assign(&sizes);
            assert_monotone(&map);
            prop_assert!(map.tier_count() <= clusters.max(1));
        }

        #[test]
        fn prop_kmeans_deterministic(sizes in prop::collection::vec(4.0f32..72.0, 1..30)) {
            let strategy = KMeansTiers::default();
            prop_assert_eq!(strategy.assign(&sizes), strategy.assign(&sizes));
        }
    }
}
