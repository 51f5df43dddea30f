//! TF-IDF matching against a file of reference analysis questions.

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w\w+\b").unwrap());

fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Reference questions vectorised with smoothed IDF weights and L2 norms.
#[derive(Debug, Default)]
pub struct ReferenceQuestions {
    idf: HashMap<String, f64>,
    vectors: Vec<HashMap<String, f64>>,
}

impl ReferenceQuestions {
    /// Loads one question per line; a missing or unreadable file yields an empty set.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let set = Self::from_questions(text.lines());
                info!("Loaded {} reference questions from {}", set.len(), path.display());
                set
            }
            Err(e) => {
                warn!("Reference questions unavailable at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn from_questions<'a>(questions: impl IntoIterator<Item = &'a str>) -> Self {
        let docs: Vec<Vec<String>> = questions
            .into_iter()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(tokenize)
            .collect();

        let n = docs.len() as f64;
        let mut df: HashMap<String, usize> = HashMap::new();
        for doc in &docs {
            let mut seen: Vec<&String> = doc.iter().collect();
            seen.sort();
            seen.dedup();
            for term in seen {
                *df.entry(term.clone()).or_default() += 1;
            }
        }

        let idf: HashMap<String, f64> = df
            .into_iter()
            .map(|(term, count)| (term, ((1.0 + n) / (1.0 + count as f64)).ln() + 1.0))
            .collect();

        let vectors = docs.iter().map(|doc| weigh(doc, &idf)).collect();
        Self { idf, vectors }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Highest cosine similarity between `question` and any reference question.
    pub fn best_score(&self, question: &str) -> f64 {
        if self.vectors.is_empty() {
            return 0.0;
        }
        let query = weigh(&tokenize(question), &self.idf);
        if query.is_empty() {
            return 0.0;
        }

        self.vectors
            .iter()
            .map(|doc| {
                query
                    .iter()
                    .map(|(term, w)| w * doc.get(term).copied().unwrap_or(0.0))
                    .sum::<f64>()
            })
            .fold(0.0, f64::max)
    }

    pub fn is_similar(&self, question: &str, threshold: f64) -> bool {
        let score = self.best_score(question);
        debug!("Reference similarity {:.3} for {:?}", score, question);
        score >= threshold
    }
}

/// Raw term counts times IDF, L2-normalised. Terms outside the vocabulary are dropped.
fn weigh(tokens: &[String], idf: &HashMap<String, f64>) -> HashMap<String, f64> {
    let mut weights: HashMap<String, f64> = HashMap::new();
    for token in tokens {
        if let Some(w) = idf.get(token) {
            *weights.entry(token.clone()).or_default() += w;
        }
    }

    let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for w in weights.values_mut() {
            *w /= norm;
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> ReferenceQuestions {
        ReferenceQuestions::from_questions([
            "Which distribution center has the most items in stock?",
            "",
            "Show the customers with the most returned orders",
            "Which product category generates the most profit?",
        ])
    }

    #[test]
    fn identical_question_scores_one() {
        let set = reference();
        assert_eq!(set.len(), 3);
        let score = set.best_score("which product category generates the most profit");
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unrelated_question_is_not_similar() {
        let set = reference();
        assert!(!set.is_similar("How do I reset my password?", 0.5));
        assert_eq!(set.best_score("zzz qqq"), 0.0);
    }

    #[test]
    fn single_character_tokens_are_ignored() {
        assert_eq!(tokenize("A b cd EF"), vec!["cd", "ef"]);
    }

    #[test]
    fn missing_file_never_matches() {
        let set = ReferenceQuestions::load("/nonexistent/analysis_quest.txt");
        assert!(set.is_empty());
        assert!(!set.is_similar("Which product category generates the most profit?", 0.5));
    }
}
