use thiserror::Error;

/// Failure of the record store. A missing record is never an error; lookups
/// return `Option` for that.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("the current question has no such option")]
    InvalidOption,
    #[error("no quiz is running in this chat")]
    NoActiveQuiz,
    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} should be set")]
    Missing(&'static str),
    #[error("{name} can't be parsed: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum QuestionBankError {
    #[error("failed to read question file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse question file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("question bank needs at least {needed} questions, found {found}")]
    TooFew { needed: usize, found: usize },
    #[error("question #{index} has {count} options, expected 2 to 4")]
    OptionCount { index: usize, count: usize },
    #[error("question #{index} marks option {answer} as correct but has {count} options")]
    AnswerOutOfRange {
        index: usize,
        answer: usize,
        count: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a 4-digit number")]
pub struct InvalidLuckyNumber(pub String);
