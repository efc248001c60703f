use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectCandidate {
    pub id: String,
    pub key: String,
    compact: String,
}

impl SubjectCandidate {
    pub fn new(id: impl Into<String>, key: impl Into<String>) -> Self {
        let key = key.into();
        let compact = compact(&key);
        Self {
            id: id.into(),
            key,
            compact,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzyMatch {
    pub id: String,
    pub distance: usize,
    /// Candidates sharing the winning distance, including the winner.
    pub ties: usize,
}

pub trait SubjectMatcher: Send + Sync {
    fn best_match(&self, query: &str, candidates: &[SubjectCandidate]) -> Option<FuzzyMatch>;
}

/// Default threshold 0 accepts spacing differences only, never misspellings.
#[derive(Debug, Clone, Default)]
pub struct LevenshteinMatcher {
    max_distance: usize,
}

impl LevenshteinMatcher {
    pub fn with_max_distance(max_distance: usize) -> Self {
        Self { max_distance }
    }
}

impl SubjectMatcher for LevenshteinMatcher {
    fn best_match(&self, query: &str, candidates: &[SubjectCandidate]) -> Option<FuzzyMatch> {
        let query = compact(query);
        if query.is_empty() {
            return None;
        }

        let mut best: Option<(usize, usize)> = None;
        let mut ties = 0usize;
        for (idx, candidate) in candidates.iter().enumerate() {
            // Length gap is a lower bound on the distance.
            if candidate.compact.len().abs_diff(query.len()) > self.max_distance {
                continue;
            }
            let distance = strsim::levenshtein(&query, &candidate.compact);
            match best {
                Some((_, best_distance)) if distance > best_distance => {}
                Some((_, best_distance)) if distance == best_distance => ties += 1,
                _ => {
                    best = Some((idx, distance));
                    ties = 1;
                }
            }
        }

        let (idx, distance) = best?;
        if distance > self.max_distance {
            return None;
        }
        let winner = &candidates[idx];
        if ties > 1 {
            warn!(
                query = %query,
                picked = %winner.id,
                ties,
                "ambiguous fuzzy subject match, picking first candidate"
            );
        }
        Some(FuzzyMatch {
            id: winner.id.clone(),
            distance,
            ties,
        })
    }
}

fn compact(key: &str) -> String {
    key.chars().filter(|c| !c.is_whitespace()).collect()
}
