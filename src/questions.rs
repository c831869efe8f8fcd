use std::{fmt, path::Path};

use rand::Rng;
use serde::Deserialize;

use crate::{database::records::QUIZ_LENGTH, error::QuestionBankError};

const OPTION_LABELS: [&str; 4] = ["A", "B", "C", "D"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Question {
    #[serde(rename = "question")]
    text: String,
    options: Vec<String>,
    answer: usize,
}

impl Question {
    pub fn new(text: impl Into<String>, options: Vec<String>, answer: usize) -> Self {
        Self {
            text: text.into(),
            options,
            answer,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn answer(&self) -> usize {
        self.answer
    }

    pub fn is_correct(&self, option: usize) -> bool {
        option == self.answer
    }

    /// `A`, `B`, ... for each option, in order.
    pub fn labels(&self) -> &'static [&'static str] {
        &OPTION_LABELS[..self.options.len().min(OPTION_LABELS.len())]
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}\n", self.text)?;
        for (label, option) in self.labels().iter().zip(&self.options) {
            writeln!(f, "/{label} {option}")?;
        }
        Ok(())
    }
}

/// Read-only list of questions loaded at startup.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, QuestionBankError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, QuestionBankError> {
        let questions: Vec<Question> = serde_json::from_str(raw)?;
        Self::new(questions)
    }

    pub fn new(questions: Vec<Question>) -> Result<Self, QuestionBankError> {
        if questions.len() < QUIZ_LENGTH {
            return Err(QuestionBankError::TooFew {
                needed: QUIZ_LENGTH,
                found: questions.len(),
            });
        }
        for (index, question) in questions.iter().enumerate() {
            let count = question.options.len();
            if !(2..=OPTION_LABELS.len()).contains(&count) {
                return Err(QuestionBankError::OptionCount { index, count });
            }
            if question.answer >= count {
                return Err(QuestionBankError::AnswerOutOfRange {
                    index,
                    answer: question.answer,
                    count,
                });
            }
        }
        Ok(Self { questions })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    /// Draws `QUIZ_LENGTH` distinct question indices, uniformly, without replacement.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        rand::seq::index::sample(rng, self.questions.len(), QUIZ_LENGTH).into_vec()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashSet;

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    /// Ten questions; question `i` has four options except every third one,
    /// which has two, and its correct option is `i % option count`.
    pub(crate) fn sample_bank() -> QuestionBank {
        let questions = (0..10)
            .map(|i| {
                let count = if i % 3 == 0 { 2 } else { 4 };
                let options = (0..count).map(|o| format!("option {o}")).collect();
                Question::new(format!("Question {i}?"), options, i % count)
            })
            .collect();
        QuestionBank::new(questions).unwrap()
    }

    #[test]
    fn parses_question_file() {
        let raw = r#"[
            {"question": "Q1", "options": ["a", "b"], "answer": 1},
            {"question": "Q2", "options": ["a", "b", "c", "d"], "answer": 3},
            {"question": "Q3", "options": ["a", "b"], "answer": 0},
            {"question": "Q4", "options": ["a", "b"], "answer": 0},
            {"question": "Q5", "options": ["a", "b"], "answer": 0}
        ]"#;
        let bank = QuestionBank::from_json(raw).unwrap();
        assert_eq!(bank.len(), 5);
        let second = bank.get(1).unwrap();
        assert!(second.is_correct(3));
        assert_eq!(second.labels(), &["A", "B", "C", "D"]);
        assert_eq!(bank.get(0).unwrap().labels(), &["A", "B"]);
        assert_eq!(
            bank.get(0).unwrap().to_string(),
            "Q1\n\n/A a\n/B b\n"
        );
    }

    #[test]
    fn rejects_malformed_banks() {
        let too_few = r#"[{"question": "Q", "options": ["a", "b"], "answer": 0}]"#;
        assert!(matches!(
            QuestionBank::from_json(too_few),
            Err(QuestionBankError::TooFew { found: 1, .. })
        ));

        let mut questions: Vec<_> = (0..5)
            .map(|_| Question::new("Q", vec!["a".into(), "b".into()], 0))
            .collect();
        questions[2] = Question::new("Q", vec!["a".into(), "b".into()], 2);
        assert!(matches!(
            QuestionBank::new(questions.clone()),
            Err(QuestionBankError::AnswerOutOfRange { index: 2, .. })
        ));

        questions[2] = Question::new("Q", vec!["a".into()], 0);
        assert!(matches!(
            QuestionBank::new(questions),
            Err(QuestionBankError::OptionCount { index: 2, count: 1 })
        ));
    }

    #[test]
    fn draws_distinct_indices_within_bank() {
        let bank = sample_bank();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let drawn = bank.draw(&mut rng);
            assert_eq!(drawn.len(), QUIZ_LENGTH);
            assert!(drawn.iter().all(|&i| i < bank.len()));
            assert_eq!(drawn.iter().collect::<HashSet<_>>().len(), QUIZ_LENGTH);
        }
    }
}
