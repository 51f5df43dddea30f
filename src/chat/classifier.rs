use super::similarity::ReferenceQuestions;
use crate::config::RouterConfig;
use tracing::debug;

/// Decides whether a question should go to the SQL pipeline.
pub struct QuestionClassifier {
    keywords: Vec<String>,
    reference: ReferenceQuestions,
    threshold: f64,
}

impl QuestionClassifier {
    pub fn new(keywords: Vec<String>, reference: ReferenceQuestions, threshold: f64) -> Self {
        let keywords = keywords.into_iter().map(|k| k.to_lowercase()).collect();
        Self {
            keywords,
            reference,
            threshold,
        }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(
            config.keywords.clone(),
            ReferenceQuestions::load(&config.reference_questions),
            config.similarity_threshold,
        )
    }

    /// Keyword substring match OR reference-question similarity.
    pub fn is_data_question(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        if let Some(keyword) = self.keywords.iter().find(|k| lowered.contains(k.as_str())) {
            debug!("Data question by keyword {:?}", keyword);
            return true;
        }
        self.reference.is_similar(text, self.threshold)
    }
}
