use std::{fmt, str::FromStr};

use teloxide::types::User;

use crate::error::InvalidLuckyNumber;

pub const QUIZ_LENGTH: usize = 5;

/// A drawing ticket: exactly four ASCII digits, leading zeros kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LuckyNumber(String);

impl LuckyNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn value(&self) -> u16 {
        self.0
            .bytes()
            .fold(0, |acc, digit| acc * 10 + u16::from(digit - b'0'))
    }
}

impl FromStr for LuckyNumber {
    type Err = InvalidLuckyNumber;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() == 4 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(trimmed.to_owned()))
        } else {
            Err(InvalidLuckyNumber(trimmed.to_owned()))
        }
    }
}

impl fmt::Display for LuckyNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The Telegram user behind an event, reduced to what the records keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl Participant {
    pub fn display_name(&self) -> String {
        full_name(&self.first_name, self.last_name.as_deref())
    }
}

impl From<&User> for Participant {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.0 as i64,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

fn full_name(first: &str, last: Option<&str>) -> String {
    match last {
        Some(last) if !last.is_empty() => format!("{first} {last}"),
        _ => first.to_owned(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizProgress {
    chat_id: i64,
    sequence: Vec<usize>,
    cursor: usize,
}

impl QuizProgress {
    pub fn new(chat_id: i64, sequence: Vec<usize>) -> Self {
        Self {
            chat_id,
            sequence,
            cursor: 0,
        }
    }

    /// Rebuilds a stored snapshot. The cursor is clamped to the sequence.
    pub fn retreive(chat_id: i64, sequence: Vec<usize>, cursor: usize) -> Self {
        let cursor = cursor.min(sequence.len());
        Self {
            chat_id,
            sequence,
            cursor,
        }
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub fn sequence(&self) -> &[usize] {
        &self.sequence
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bank index of the question waiting for an answer.
    pub fn current(&self) -> Option<usize> {
        self.sequence.get(self.cursor).copied()
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.sequence.len()
    }

    pub fn advanced(&self) -> Self {
        Self {
            cursor: (self.cursor + 1).min(self.sequence.len()),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Score {
    user_id: i64,
    correct: u8,
    username: Option<String>,
    first_name: String,
    last_name: Option<String>,
    lucky_number: Option<LuckyNumber>,
    active: bool,
}

impl Score {
    /// Zero correct answers, no ticket, active.
    pub fn fresh(participant: &Participant) -> Self {
        Self {
            user_id: participant.id,
            correct: 0,
            username: participant.username.clone(),
            first_name: participant.first_name.clone(),
            last_name: participant.last_name.clone(),
            lucky_number: None,
            active: true,
        }
    }

    pub fn retreive(
        user_id: i64,
        correct: u8,
        username: Option<String>,
        first_name: String,
        last_name: Option<String>,
        lucky_number: Option<LuckyNumber>,
        active: bool,
    ) -> Self {
        Self {
            user_id,
            correct,
            username,
            first_name,
            last_name,
            lucky_number,
            active,
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn correct(&self) -> u8 {
        self.correct
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }

    pub fn lucky_number(&self) -> Option<&LuckyNumber> {
        self.lucky_number.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn display_name(&self) -> String {
        full_name(&self.first_name, self.last_name.as_deref())
    }

    pub fn is_perfect(&self) -> bool {
        usize::from(self.correct) == QUIZ_LENGTH
    }

    /// A perfect score whose ticket has not been picked yet.
    pub fn has_open_ticket(&self) -> bool {
        self.is_perfect() && self.lucky_number.is_none()
    }

    pub fn with_correct_answer(&self) -> Self {
        let correct = (usize::from(self.correct) + 1).min(QUIZ_LENGTH);
        Self {
            correct: u8::try_from(correct).unwrap_or(self.correct),
            ..self.clone()
        }
    }

    pub fn with_lucky_number(&self, lucky_number: LuckyNumber) -> Self {
        Self {
            lucky_number: Some(lucky_number),
            ..self.clone()
        }
    }

    pub fn with_active(&self, active: bool) -> Self {
        Self {
            active,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referral {
    id: i64,
    referrer_id: i64,
    invitee_id: i64,
    lucky_number: Option<LuckyNumber>,
    referrer_username: Option<String>,
    invitee_username: Option<String>,
    referrer_name: String,
    invitee_name: String,
    active: bool,
}

impl Referral {
    #[allow(clippy::too_many_arguments)]
    pub fn retreive(
        id: i64,
        referrer_id: i64,
        invitee_id: i64,
        lucky_number: Option<LuckyNumber>,
        referrer_username: Option<String>,
        invitee_username: Option<String>,
        referrer_name: String,
        invitee_name: String,
        active: bool,
    ) -> Self {
        Self {
            id,
            referrer_id,
            invitee_id,
            lucky_number,
            referrer_username,
            invitee_username,
            referrer_name,
            invitee_name,
            active,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn referrer_id(&self) -> i64 {
        self.referrer_id
    }

    pub fn invitee_id(&self) -> i64 {
        self.invitee_id
    }

    pub fn lucky_number(&self) -> Option<&LuckyNumber> {
        self.lucky_number.as_ref()
    }

    pub fn referrer_username(&self) -> Option<&str> {
        self.referrer_username.as_deref()
    }

    pub fn invitee_username(&self) -> Option<&str> {
        self.invitee_username.as_deref()
    }

    pub fn referrer_name(&self) -> &str {
        &self.referrer_name
    }

    pub fn invitee_name(&self) -> &str {
        &self.invitee_name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn with_lucky_number(&self, lucky_number: LuckyNumber) -> Self {
        Self {
            lucky_number: Some(lucky_number),
            ..self.clone()
        }
    }

    pub fn with_active(&self, active: bool) -> Self {
        Self {
            active,
            ..self.clone()
        }
    }
}

/// Referral about to be inserted; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewReferral {
    pub referrer: Participant,
    pub invitee: Participant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    user_id: i64,
    points: i64,
    name: String,
    active: bool,
}

impl LeaderboardEntry {
    pub fn retreive(user_id: i64, points: i64, name: String, active: bool) -> Self {
        Self {
            user_id,
            points,
            name,
            active,
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn points(&self) -> i64 {
        self.points
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn with_active(&self, active: bool) -> Self {
        Self {
            active,
            ..self.clone()
        }
    }
}
