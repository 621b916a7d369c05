//! Relevance scoring and diversity-capped selection
//!
//! `score = cosine(query, section) + keyword_weight * matched_keywords`,
//! followed by a per-document cap and a top-K cut.

use crate::segmenter::Section;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Ranking options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankOptions {
    /// Number of sections returned
    pub top_k: usize,
    /// Maximum sections kept per document
    pub per_document_cap: usize,
    /// Query words shorter than this are not keywords
    pub keyword_min_len: usize,
    /// Boost per keyword found in a section's content
    pub keyword_weight: f32,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            per_document_cap: 1,
            keyword_min_len: 5,
            keyword_weight: 0.05,
        }
    }
}

/// A section with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSection {
    #[serde(flatten)]
    pub section: Section,
    pub similarity: f32,
    pub keyword_boost: f32,
    pub score: f32,
}

/// Distinct lowercase query words of at least `min_len` characters, in
/// first-seen order.
pub fn query_keywords(query: &str, min_len: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() >= min_len)
        .filter(|w| seen.insert(w.to_string()))
        .map(str::to_string)
        .collect()
}

/// `weight` times the number of keywords occurring in `content`
/// (case-insensitive substring match).
pub fn keyword_boost(keywords: &[String], content: &str, weight: f32) -> f32 {
    let content = content.to_lowercase();
    let matched = keywords
        .iter()
        .filter(|k| content.contains(k.as_str()))
        .count();
    weight * matched as f32
}

/// Score one section given its precomputed similarity to the query.
pub fn score_section(
    section: Section,
    similarity: f32,
    keywords: &[String],
    options: &RankOptions,
) -> ScoredSection {
    let boost = keyword_boost(keywords, &section.content, options.keyword_weight);
    ScoredSection {
        section,
        similarity,
        keyword_boost: boost,
        score: similarity + boost,
    }
}

fn by_score_desc(a: &ScoredSection, b: &ScoredSection) -> Ordering {
    b.score.total_cmp(&a.score)
}

/// Keep the best `per_document_cap` sections of each document, then the
/// `top_k` best overall. Ties keep input order.
pub fn select_diverse(mut scored: Vec<ScoredSection>, options: &RankOptions) -> Vec<ScoredSection> {
    scored.sort_by(by_score_desc);

    let mut per_document: HashMap<String, usize> = HashMap::new();
    let mut selected: Vec<ScoredSection> = scored
        .into_iter()
        .filter(|s| {
            let count = per_document
                .entry(s.section.document_id.clone())
                .or_insert(0);
            *count += 1;
            *count <= options.per_document_cap
        })
        .collect();

    selected.sort_by(by_score_desc);
    selected.truncate(options.top_k);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(doc: &str, title: &str, content: &str) -> Section {
        Section {
            document_id: doc.to_string(),
            title: title.to_string(),
            start_page: 1,
            end_page: 1,
            content: content.to_string(),
        }
    }

    fn scored(doc: &str, title: &str, score: f32) -> ScoredSection {
        ScoredSection {
            section: section(doc, title, ""),
            similarity: score,
            keyword_boost: 0.0,
            score,
        }
    }

    fn summary(selected: &[ScoredSection]) -> Vec<(&str, f32)> {
        selected
            .iter()
            .map(|s| (s.section.document_id.as_str(), s.score))
            .collect()
    }

    #[test]
    fn test_query_keywords() {
        let keywords = query_keywords("Travel Planner  Plan a trip of 4 days for college friends travel", 5);
        assert_eq!(keywords, vec!["travel", "planner", "college", "friends"]);
    }

    #[test]
    fn test_keyword_boost() {
        let keywords = vec!["beach".to_string(), "nightlife".to_string(), "museum".to_string()];
        let boost = keyword_boost(&keywords, "The BEACH clubs and nightlife of Nice", 0.05);
        assert!((boost - 0.10).abs() < 1e-6);
        assert_eq!(keyword_boost(&[], "anything", 0.05), 0.0);
    }

    #[test]
    fn test_score_adds_boost() {
        let keywords = vec!["coastal".to_string()];
        let s = score_section(section("a", "T", "coastal towns"), 0.5, &keywords, &RankOptions::default());
        assert!((s.score - 0.55).abs() < 1e-6);
        assert!((s.keyword_boost - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_diversity_cap() {
        let input = vec![
            scored("A", "a1", 0.9),
            scored("A", "a2", 0.8),
            scored("A", "a3", 0.7),
            scored("B", "b1", 0.6),
        ];
        let options = RankOptions {
            top_k: 2,
            ..RankOptions::default()
        };
        let selected = select_diverse(input, &options);
        assert_eq!(summary(&selected), vec![("A", 0.9), ("B", 0.6)]);
    }

    #[test]
    fn test_fewer_than_k_returns_all() {
        let selected = select_diverse(vec![scored("A", "a", 0.3), scored("B", "b", 0.4)], &RankOptions::default());
        assert_eq!(summary(&selected), vec![("B", 0.4), ("A", 0.3)]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let selected = select_diverse(
            vec![scored("A", "first", 0.5), scored("A", "second", 0.5), scored("B", "b", 0.5)],
            &RankOptions::default(),
        );
        let titles: Vec<&str> = selected.iter().map(|s| s.section.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "b"]);
    }

    #[test]
    fn test_higher_cap() {
        let options = RankOptions {
            per_document_cap: 2,
            ..RankOptions::default()
        };
        let selected = select_diverse(
            vec![scored("A", "a1", 0.9), scored("A", "a2", 0.8), scored("A", "a3", 0.7)],
            &options,
        );
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(select_diverse(Vec::new(), &RankOptions::default()).is_empty());
    }
}
