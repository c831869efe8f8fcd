use rand::Rng;

use crate::{
    database::{
        records::{Participant, QuizProgress, Score, QUIZ_LENGTH},
        ProgressStore, ScoreStore,
    },
    error::QuizError,
    questions::{Question, QuestionBank},
    state::{SessionKey, SessionRegistry, SessionState},
};

/// Where a chat's quiz stands after an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<'a> {
    /// `cursor` questions are answered; `question` is the next one.
    InProgress {
        cursor: usize,
        question: &'a Question,
    },
    Finished {
        correct: u8,
        qualified: bool,
    },
}

/// Sequential five-question quiz kept per chat.
pub struct QuizEngine<'a, S> {
    store: &'a S,
    bank: &'a QuestionBank,
    sessions: &'a SessionRegistry,
}

impl<'a, S: ProgressStore + ScoreStore> QuizEngine<'a, S> {
    pub fn new(store: &'a S, bank: &'a QuestionBank, sessions: &'a SessionRegistry) -> Self {
        Self {
            store,
            bank,
            sessions,
        }
    }

    /// Throws away any quiz of the chat, draws a new question sequence,
    /// resets the participant's score and asks the first question.
    pub async fn start<R: Rng + Send>(
        &self,
        chat_id: i64,
        participant: &Participant,
        mut rng: R,
    ) -> Result<Step<'a>, QuizError> {
        let sequence = self.bank.draw(&mut rng);
        log::debug!("Chat {} draws questions {:?}", chat_id, sequence);

        self.store.remove_progress(chat_id).await?;
        self.store
            .save_progress(&QuizProgress::new(chat_id, sequence))
            .await?;
        self.store.save_score(&Score::fresh(participant)).await?;
        self.sessions
            .clear(SessionKey::new(chat_id, participant.id));

        self.advance(chat_id, participant.id).await
    }

    pub async fn advance(&self, chat_id: i64, user_id: i64) -> Result<Step<'a>, QuizError> {
        let progress = self
            .store
            .progress(chat_id)
            .await?
            .ok_or(QuizError::NoActiveQuiz)?;

        match progress.current() {
            Some(index) => {
                // A bank edited between runs can orphan an index; a restart fixes it.
                let question = self.bank.get(index).ok_or(QuizError::NoActiveQuiz)?;
                Ok(Step::InProgress {
                    cursor: progress.cursor(),
                    question,
                })
            }
            None => self.finish(chat_id, user_id).await,
        }
    }

    /// Scores `option` against the current question and moves on.
    /// Nothing is written when the option does not exist.
    pub async fn submit_answer(
        &self,
        chat_id: i64,
        participant: &Participant,
        option: usize,
    ) -> Result<Step<'a>, QuizError> {
        let progress = self
            .store
            .progress(chat_id)
            .await?
            .ok_or(QuizError::NoActiveQuiz)?;
        let question = progress
            .current()
            .and_then(|index| self.bank.get(index))
            .ok_or(QuizError::NoActiveQuiz)?;

        if option >= question.options().len() {
            return Err(QuizError::InvalidOption);
        }

        let score = self
            .store
            .score(participant.id)
            .await?
            .unwrap_or_else(|| Score::fresh(participant));
        let score = if question.is_correct(option) {
            score.with_correct_answer()
        } else {
            score
        };
        log::info!(
            "User {} answers question #{} in chat {}: correct so far {}",
            participant.id,
            progress.cursor() + 1,
            chat_id,
            score.correct()
        );
        self.store.save_score(&score).await?;
        self.store.save_progress(&progress.advanced()).await?;

        self.advance(chat_id, participant.id).await
    }

    async fn finish(&self, chat_id: i64, user_id: i64) -> Result<Step<'a>, QuizError> {
        let correct = self
            .store
            .score(user_id)
            .await?
            .map_or(0, |score| score.correct());
        let qualified = usize::from(correct) == QUIZ_LENGTH;

        if qualified {
            self.sessions.set(
                SessionKey::new(chat_id, user_id),
                SessionState::AwaitingLuckyNumber,
            );
        }

        Ok(Step::Finished { correct, qualified })
    }
}
