use std::{collections::HashSet, sync::Arc};

use serde::Serialize;

use crate::directory::Place;

/// 0–100 similarity between two already-normalized strings.
pub trait Similarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> u8;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityKind {
    Levenshtein,
    JaroWinkler,
}

impl SimilarityKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "levenshtein" => Some(SimilarityKind::Levenshtein),
            "jaro-winkler" | "jaro_winkler" | "jarowinkler" => Some(SimilarityKind::JaroWinkler),
            _ => None,
        }
    }

    pub fn scorer(&self) -> Arc<dyn Similarity> {
        match self {
            SimilarityKind::Levenshtein => Arc::new(LevenshteinRatio),
            SimilarityKind::JaroWinkler => Arc::new(JaroWinkler),
        }
    }
}

/// Levenshtein ratio where a substitution costs two edits, so the distance is
/// `len(a) + len(b) - 2 * lcs(a, b)` and the ratio is `2 * lcs / (len(a) + len(b))`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LevenshteinRatio;

impl Similarity for LevenshteinRatio {
    fn score(&self, a: &str, b: &str) -> u8 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        if a.is_empty() || b.is_empty() {
            return 0;
        }
        let mut prev = vec![0usize; b.len() + 1];
        let mut curr = vec![0usize; b.len() + 1];
        for ca in &a {
            for (j, cb) in b.iter().enumerate() {
                curr[j + 1] = if ca == cb {
                    prev[j] + 1
                } else {
                    prev[j + 1].max(curr[j])
                };
            }
            std::mem::swap(&mut prev, &mut curr);
        }
        let lcs = prev[b.len()];
        let ratio = (2 * lcs) as f64 / (a.len() + b.len()) as f64;
        (ratio * 100.0).round() as u8
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JaroWinkler;

impl JaroWinkler {
    fn jaro(a: &[char], b: &[char]) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let window = (a.len().max(b.len()) / 2).saturating_sub(1);
        let mut a_matched = vec![false; a.len()];
        let mut b_matched = vec![false; b.len()];
        let mut matches = 0usize;
        for (i, ca) in a.iter().enumerate() {
            let lo = i.saturating_sub(window);
            let hi = (i + window + 1).min(b.len());
            for j in lo..hi {
                if !b_matched[j] && b[j] == *ca {
                    a_matched[i] = true;
                    b_matched[j] = true;
                    matches += 1;
                    break;
                }
            }
        }
        if matches == 0 {
            return 0.0;
        }
        let a_seq = a.iter().zip(&a_matched).filter(|(_, m)| **m).map(|(c, _)| c);
        let b_seq = b.iter().zip(&b_matched).filter(|(_, m)| **m).map(|(c, _)| c);
        let transpositions = a_seq.zip(b_seq).filter(|(x, y)| x != y).count() / 2;
        let m = matches as f64;
        (m / a.len() as f64 + m / b.len() as f64 + (m - transpositions as f64) / m) / 3.0
    }
}

impl Similarity for JaroWinkler {
    fn score(&self, a: &str, b: &str) -> u8 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let jaro = Self::jaro(&a, &b);
        let prefix = a
            .iter()
            .zip(&b)
            .take(4)
            .take_while(|(x, y)| x == y)
            .count() as f64;
        let similarity = jaro + prefix * 0.1 * (1.0 - jaro);
        (similarity * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Capitalizes the first letter of every alphabetic run and lowercases the rest.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for ch in value.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

fn comparison_key(value: &str) -> String {
    value.replace(' ', "").to_lowercase()
}

/// The user's query after trimming and case normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    /// Upper-cased code or title-cased name, for display.
    pub display: String,
    /// Space-free, lower-cased form used for scoring and as the cache key.
    pub key: String,
    /// Three characters or fewer: treated as a country code.
    pub is_code: bool,
}

impl NormalizedQuery {
    /// `None` for a blank query.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let is_code = trimmed.chars().count() <= 3;
        let display = if is_code {
            trimmed.to_uppercase()
        } else {
            title_case(trimmed)
        };
        let key = comparison_key(&display);
        Some(Self {
            display,
            key,
            is_code,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCandidate {
    pub place: Place,
    pub score: u8,
}

/// Label used for stations found through `place`.
pub fn country_label(place: &Place) -> String {
    title_case(place.country_name.trim())
}

#[derive(Clone)]
pub struct PlaceMatcher {
    similarity: Arc<dyn Similarity>,
    threshold: u8,
}

impl PlaceMatcher {
    pub fn new(similarity: Arc<dyn Similarity>, threshold: u8) -> Self {
        Self {
            similarity,
            threshold,
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Code-style queries keep a strong code score even when the name scores
    /// higher; otherwise the better of the two wins.
    pub fn score(&self, place: &Place, query: &NormalizedQuery) -> u8 {
        let code = place.country_code.trim();
        let code_score = if code.is_empty() {
            0
        } else {
            self.similarity.score(&query.key, &code.to_lowercase())
        };
        let name = comparison_key(&title_case(place.country_name.trim()));
        let name_score = if name.is_empty() {
            0
        } else {
            self.similarity.score(&query.key, &name)
        };
        if query.is_code && code_score > self.threshold {
            code_score
        } else {
            code_score.max(name_score)
        }
    }

    /// Candidates scoring above the threshold, best first. Places repeated
    /// under the same id are scored once; ties keep upstream order.
    pub fn match_places(&self, places: &[Place], query: &NormalizedQuery) -> Vec<MatchCandidate> {
        let mut seen = HashSet::new();
        let mut candidates: Vec<MatchCandidate> = places
            .iter()
            .filter(|place| seen.insert(place.id.as_str()))
            .filter_map(|place| {
                let score = self.score(place, query);
                (score > self.threshold).then(|| MatchCandidate {
                    place: place.clone(),
                    score,
                })
            })
            .collect();
        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(id: &str, country: &str, code: &str) -> Place {
        Place {
            id: id.into(),
            title: None,
            country_name: country.into(),
            country_code: code.into(),
        }
    }

    fn matcher() -> PlaceMatcher {
        PlaceMatcher::new(Arc::new(LevenshteinRatio), 70)
    }

    #[test]
    fn levenshtein_ratio_values() {
        let ratio = LevenshteinRatio;
        assert_eq!(ratio.score("us", "us"), 100);
        assert_eq!(ratio.score("usa", "us"), 80);
        assert_eq!(ratio.score("us", "us-something"), 29);
        assert_eq!(ratio.score("", "us"), 0);
        assert_eq!(ratio.score("abc", "xyz"), 0);
    }

    #[test]
    fn jaro_winkler_values() {
        let jw = JaroWinkler;
        assert_eq!(jw.score("martha", "marhta"), 96);
        assert_eq!(jw.score("unitedstates", "unitedstates"), 100);
        assert_eq!(jw.score("", "x"), 0);
    }

    #[test]
    fn short_queries_are_codes() {
        let query = NormalizedQuery::parse("  us ").unwrap();
        assert!(query.is_code);
        assert_eq!(query.display, "US");
        assert_eq!(query.key, "us");
    }

    #[test]
    fn long_queries_are_title_cased_names() {
        let query = NormalizedQuery::parse("south  AFRICA").unwrap();
        assert!(!query.is_code);
        assert_eq!(query.display, "South  Africa");
        assert_eq!(query.key, "southafrica");
        assert!(NormalizedQuery::parse("   ").is_none());
    }

    #[test]
    fn title_case_follows_word_boundaries() {
        assert_eq!(title_case("côte d'ivoire"), "Côte D'Ivoire");
        assert_eq!(title_case("GUINEA-BISSAU"), "Guinea-Bissau");
    }

    #[test]
    fn code_query_prefers_code_score() {
        let query = NormalizedQuery::parse("USA").unwrap();
        let usa = place("p1", "Usa", "US");
        assert_eq!(matcher().score(&usa, &query), 80);

        let query = NormalizedQuery::parse("US").unwrap();
        let us = place("p2", "United States", "US");
        let lookalike = place("p3", "Us-Something", "XS");
        assert_eq!(matcher().score(&us, &query), 100);
        assert!(matcher().score(&lookalike, &query) <= 70);
    }

    #[test]
    fn name_query_uses_name_similarity() {
        let query = NormalizedQuery::parse("United States").unwrap();
        let us = place("p1", "united states", "US");
        assert_eq!(matcher().score(&us, &query), 100);
        let uk = place("p2", "United Kingdom", "GB");
        assert!(matcher().score(&uk, &query) <= 70);
    }

    #[test]
    fn match_filters_dedupes_and_sorts() {
        let places = vec![
            place("a", "Germany", "DE"),
            place("b", "Nigeria", "NG"),
            place("c", "Niger", "NE"),
            place("b", "Nigeria", "NG"),
        ];
        let query = NormalizedQuery::parse("Nigeria").unwrap();
        let candidates = matcher().match_places(&places, &query);
        let ids: Vec<&str> = candidates.iter().map(|c| c.place.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(candidates[0].score, 100);
        assert_eq!(candidates[1].score, 83);
    }

    #[test]
    fn nothing_above_threshold_is_empty() {
        let places = vec![place("a", "Germany", "DE")];
        let query = NormalizedQuery::parse("Peru").unwrap();
        assert!(matcher().match_places(&places, &query).is_empty());
    }

    #[test]
    fn similarity_kind_parses_config_values() {
        assert_eq!(
            SimilarityKind::parse("Jaro-Winkler"),
            Some(SimilarityKind::JaroWinkler)
        );
        assert_eq!(
            SimilarityKind::parse("levenshtein"),
            Some(SimilarityKind::Levenshtein)
        );
        assert_eq!(SimilarityKind::parse("soundex"), None);
    }
}
