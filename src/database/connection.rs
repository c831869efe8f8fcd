use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use super::records::{LeaderboardEntry, LuckyNumber, NewReferral, QuizProgress, Referral, Score};
use crate::error::{StoreError, StoreResult};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS quiz_progress (
        chat_id INTEGER PRIMARY KEY,
        sequence TEXT NOT NULL,
        answered INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS scores (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL UNIQUE,
        correct INTEGER NOT NULL DEFAULT 0,
        username TEXT,
        first_name TEXT NOT NULL,
        last_name TEXT,
        lucky_number TEXT,
        active BOOLEAN NOT NULL DEFAULT 1
    )",
    "CREATE INDEX IF NOT EXISTS scores_lucky_number ON scores (lucky_number)",
    "CREATE TABLE IF NOT EXISTS referrals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        referrer_id INTEGER NOT NULL,
        invitee_id INTEGER NOT NULL UNIQUE,
        lucky_number TEXT,
        referrer_username TEXT,
        invitee_username TEXT,
        referrer_name TEXT NOT NULL,
        invitee_name TEXT NOT NULL,
        active BOOLEAN NOT NULL DEFAULT 1
    )",
    "CREATE INDEX IF NOT EXISTS referrals_referrer ON referrals (referrer_id)",
    "CREATE INDEX IF NOT EXISTS referrals_lucky_number ON referrals (lucky_number)",
    "CREATE TABLE IF NOT EXISTS leaderboard (
        user_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        points INTEGER NOT NULL DEFAULT 0,
        active BOOLEAN NOT NULL DEFAULT 1
    )",
];

const SCORE_COLUMNS: &str =
    "user_id, correct, username, first_name, last_name, lucky_number, active";
const REFERRAL_COLUMNS: &str = "id, referrer_id, invitee_id, lucky_number, referrer_username, \
     invitee_username, referrer_name, invitee_name, active";

pub struct Connection {
    pool: SqlitePool,
}

impl Connection {
    /// Opens (creating if missing) the database behind `connection_string`.
    /// An in-memory database is pinned to a single pooled connection so every
    /// query sees the same data.
    pub async fn connect(connection_string: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(connection_string)?.create_if_missing(true);
        let in_memory = connection_string.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        log::debug!("Database schema is up to date");
        Ok(())
    }
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn progress(&self, chat_id: i64) -> StoreResult<Option<QuizProgress>>;

    /// Inserts or replaces the progress of `progress.chat_id()`.
    async fn save_progress(&self, progress: &QuizProgress) -> StoreResult<()>;

    async fn remove_progress(&self, chat_id: i64) -> StoreResult<()>;
}

#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn score(&self, user_id: i64) -> StoreResult<Option<Score>>;

    /// Inserts or replaces the score of `score.user_id()`.
    async fn save_score(&self, score: &Score) -> StoreResult<()>;

    async fn scores_with_lucky_number(&self, lucky_number: &LuckyNumber)
        -> StoreResult<Vec<Score>>;

    /// Every score holding a ticket, ascending by lucky number.
    async fn scores_by_lucky_number(&self) -> StoreResult<Vec<Score>>;

    async fn all_scores(&self) -> StoreResult<Vec<Score>>;
}

#[async_trait]
pub trait ReferralStore: Send + Sync {
    async fn insert_referral(&self, referral: &NewReferral) -> StoreResult<Referral>;

    async fn update_referral(&self, referral: &Referral) -> StoreResult<()>;

    async fn remove_referral(&self, invitee_id: i64) -> StoreResult<()>;

    async fn referral_by_invitee(&self, invitee_id: i64) -> StoreResult<Option<Referral>>;

    /// Referrals made by `referrer_id`, oldest first.
    async fn referrals_by_referrer(&self, referrer_id: i64) -> StoreResult<Vec<Referral>>;

    /// Referrals made by `referrer_id` whose ticket is still unpicked, oldest first.
    async fn open_referrals(&self, referrer_id: i64) -> StoreResult<Vec<Referral>>;

    async fn referrals_with_lucky_number(
        &self,
        lucky_number: &LuckyNumber,
    ) -> StoreResult<Vec<Referral>>;

    /// Every referral holding a ticket, ascending by lucky number.
    async fn referrals_by_lucky_number(&self) -> StoreResult<Vec<Referral>>;

    async fn all_referrals(&self) -> StoreResult<Vec<Referral>>;
}

#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    async fn leaderboard_entry(&self, user_id: i64) -> StoreResult<Option<LeaderboardEntry>>;

    /// Adds `delta` to the total of `user_id`, creating an active entry named
    /// `name` on first contact.
    async fn add_points(&self, user_id: i64, name: &str, delta: i64)
        -> StoreResult<LeaderboardEntry>;

    async fn update_leaderboard_entry(&self, entry: &LeaderboardEntry) -> StoreResult<()>;

    /// Active entries, highest total first.
    async fn top(&self, limit: usize) -> StoreResult<Vec<LeaderboardEntry>>;
}

/// Everything the bot reads and writes.
pub trait Store: ProgressStore + ScoreStore + ReferralStore + LeaderboardStore {}

impl<T: ProgressStore + ScoreStore + ReferralStore + LeaderboardStore> Store for T {}

#[derive(sqlx::FromRow)]
struct ProgressRow {
    chat_id: i64,
    sequence: String,
    answered: i64,
}

impl TryFrom<ProgressRow> for QuizProgress {
    type Error = StoreError;

    fn try_from(row: ProgressRow) -> Result<Self, Self::Error> {
        let sequence: Vec<usize> = serde_json::from_str(&row.sequence).map_err(|e| {
            StoreError::Corrupt(format!("question sequence of chat {}: {e}", row.chat_id))
        })?;
        let cursor = usize::try_from(row.answered).map_err(|_| {
            StoreError::Corrupt(format!("answered count of chat {}", row.chat_id))
        })?;
        Ok(QuizProgress::retreive(row.chat_id, sequence, cursor))
    }
}

#[derive(sqlx::FromRow)]
struct ScoreRow {
    user_id: i64,
    correct: i64,
    username: Option<String>,
    first_name: String,
    last_name: Option<String>,
    lucky_number: Option<String>,
    active: bool,
}

impl TryFrom<ScoreRow> for Score {
    type Error = StoreError;

    fn try_from(row: ScoreRow) -> Result<Self, Self::Error> {
        let correct = u8::try_from(row.correct)
            .map_err(|_| StoreError::Corrupt(format!("score of user {}", row.user_id)))?;
        Ok(Score::retreive(
            row.user_id,
            correct,
            row.username,
            row.first_name,
            row.last_name,
            parse_lucky_number(row.lucky_number)?,
            row.active,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct ReferralRow {
    id: i64,
    referrer_id: i64,
    invitee_id: i64,
    lucky_number: Option<String>,
    referrer_username: Option<String>,
    invitee_username: Option<String>,
    referrer_name: String,
    invitee_name: String,
    active: bool,
}

impl TryFrom<ReferralRow> for Referral {
    type Error = StoreError;

    fn try_from(row: ReferralRow) -> Result<Self, Self::Error> {
        Ok(Referral::retreive(
            row.id,
            row.referrer_id,
            row.invitee_id,
            parse_lucky_number(row.lucky_number)?,
            row.referrer_username,
            row.invitee_username,
            row.referrer_name,
            row.invitee_name,
            row.active,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct LeaderboardRow {
    user_id: i64,
    points: i64,
    name: String,
    active: bool,
}

impl From<LeaderboardRow> for LeaderboardEntry {
    fn from(row: LeaderboardRow) -> Self {
        LeaderboardEntry::retreive(row.user_id, row.points, row.name, row.active)
    }
}

fn parse_lucky_number(raw: Option<String>) -> StoreResult<Option<LuckyNumber>> {
    raw.map(|raw| {
        raw.parse()
            .map_err(|e| StoreError::Corrupt(format!("lucky number: {e}")))
    })
    .transpose()
}

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl ProgressStore for Connection {
    async fn progress(&self, chat_id: i64) -> StoreResult<Option<QuizProgress>> {
        let row = sqlx::query_as::<_, ProgressRow>(
            "SELECT chat_id, sequence, answered FROM quiz_progress WHERE chat_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(QuizProgress::try_from).transpose()
    }

    async fn save_progress(&self, progress: &QuizProgress) -> StoreResult<()> {
        let sequence = serde_json::to_string(progress.sequence())
            .map_err(|e| StoreError::Corrupt(format!("question sequence: {e}")))?;
        let answered = i64::try_from(progress.cursor())
            .map_err(|_| StoreError::Corrupt("answered count overflow".into()))?;

        sqlx::query(
            "INSERT INTO quiz_progress (chat_id, sequence, answered) VALUES (?, ?, ?)
             ON CONFLICT(chat_id) DO UPDATE SET sequence = excluded.sequence, answered = excluded.answered",
        )
        .bind(progress.chat_id())
        .bind(sequence)
        .bind(answered)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_progress(&self, chat_id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM quiz_progress WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ScoreStore for Connection {
    async fn score(&self, user_id: i64) -> StoreResult<Option<Score>> {
        let row = sqlx::query_as::<_, ScoreRow>(&format!(
            "SELECT {SCORE_COLUMNS} FROM scores WHERE user_id = ?"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Score::try_from).transpose()
    }

    async fn save_score(&self, score: &Score) -> StoreResult<()> {
        log::debug!("Saving score {:?}", score);
        sqlx::query(
            "INSERT INTO scores (user_id, correct, username, first_name, last_name, lucky_number, active)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                correct = excluded.correct,
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                lucky_number = excluded.lucky_number,
                active = excluded.active",
        )
        .bind(score.user_id())
        .bind(i64::from(score.correct()))
        .bind(score.username())
        .bind(score.first_name())
        .bind(score.last_name())
        .bind(score.lucky_number().map(LuckyNumber::as_str))
        .bind(score.is_active())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn scores_with_lucky_number(
        &self,
        lucky_number: &LuckyNumber,
    ) -> StoreResult<Vec<Score>> {
        let rows = sqlx::query_as::<_, ScoreRow>(&format!(
            "SELECT {SCORE_COLUMNS} FROM scores WHERE lucky_number = ? ORDER BY id"
        ))
        .bind(lucky_number.as_str())
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn scores_by_lucky_number(&self) -> StoreResult<Vec<Score>> {
        let rows = sqlx::query_as::<_, ScoreRow>(&format!(
            "SELECT {SCORE_COLUMNS} FROM scores WHERE lucky_number IS NOT NULL ORDER BY lucky_number, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn all_scores(&self) -> StoreResult<Vec<Score>> {
        let rows = sqlx::query_as::<_, ScoreRow>(&format!(
            "SELECT {SCORE_COLUMNS} FROM scores ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }
}

#[async_trait]
impl ReferralStore for Connection {
    async fn insert_referral(&self, referral: &NewReferral) -> StoreResult<Referral> {
        let id = sqlx::query(
            "INSERT INTO referrals (referrer_id, invitee_id, referrer_username, invitee_username, referrer_name, invitee_name)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(referral.referrer.id)
        .bind(referral.invitee.id)
        .bind(referral.referrer.username.as_deref())
        .bind(referral.invitee.username.as_deref())
        .bind(referral.referrer.display_name())
        .bind(referral.invitee.display_name())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Referral::retreive(
            id,
            referral.referrer.id,
            referral.invitee.id,
            None,
            referral.referrer.username.clone(),
            referral.invitee.username.clone(),
            referral.referrer.display_name(),
            referral.invitee.display_name(),
            true,
        ))
    }

    async fn update_referral(&self, referral: &Referral) -> StoreResult<()> {
        sqlx::query(
            "UPDATE referrals SET lucky_number = ?, referrer_username = ?, invitee_username = ?,
                referrer_name = ?, invitee_name = ?, active = ?
             WHERE id = ?",
        )
        .bind(referral.lucky_number().map(LuckyNumber::as_str))
        .bind(referral.referrer_username())
        .bind(referral.invitee_username())
        .bind(referral.referrer_name())
        .bind(referral.invitee_name())
        .bind(referral.is_active())
        .bind(referral.id())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_referral(&self, invitee_id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM referrals WHERE invitee_id = ?")
            .bind(invitee_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn referral_by_invitee(&self, invitee_id: i64) -> StoreResult<Option<Referral>> {
        let row = sqlx::query_as::<_, ReferralRow>(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals WHERE invitee_id = ?"
        ))
        .bind(invitee_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Referral::try_from).transpose()
    }

    async fn referrals_by_referrer(&self, referrer_id: i64) -> StoreResult<Vec<Referral>> {
        let rows = sqlx::query_as::<_, ReferralRow>(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals WHERE referrer_id = ? ORDER BY id"
        ))
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn open_referrals(&self, referrer_id: i64) -> StoreResult<Vec<Referral>> {
        let rows = sqlx::query_as::<_, ReferralRow>(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals
             WHERE referrer_id = ? AND lucky_number IS NULL ORDER BY id"
        ))
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn referrals_with_lucky_number(
        &self,
        lucky_number: &LuckyNumber,
    ) -> StoreResult<Vec<Referral>> {
        let rows = sqlx::query_as::<_, ReferralRow>(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals WHERE lucky_number = ? ORDER BY id"
        ))
        .bind(lucky_number.as_str())
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn referrals_by_lucky_number(&self) -> StoreResult<Vec<Referral>> {
        let rows = sqlx::query_as::<_, ReferralRow>(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals
             WHERE lucky_number IS NOT NULL ORDER BY lucky_number, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn all_referrals(&self) -> StoreResult<Vec<Referral>> {
        let rows = sqlx::query_as::<_, ReferralRow>(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }
}

#[async_trait]
impl LeaderboardStore for Connection {
    async fn leaderboard_entry(&self, user_id: i64) -> StoreResult<Option<LeaderboardEntry>> {
        let row = sqlx::query_as::<_, LeaderboardRow>(
            "SELECT user_id, points, name, active FROM leaderboard WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(LeaderboardEntry::from))
    }

    async fn add_points(
        &self,
        user_id: i64,
        name: &str,
        delta: i64,
    ) -> StoreResult<LeaderboardEntry> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO leaderboard (user_id, name, points, active) VALUES (?, ?, ?, 1)
             ON CONFLICT(user_id) DO UPDATE SET points = points + excluded.points",
        )
        .bind(user_id)
        .bind(name)
        .bind(delta)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, LeaderboardRow>(
            "SELECT user_id, points, name, active FROM leaderboard WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let entry = LeaderboardEntry::from(row);
        log::debug!("Leaderboard entry is now {:?}", entry);
        Ok(entry)
    }

    async fn update_leaderboard_entry(&self, entry: &LeaderboardEntry) -> StoreResult<()> {
        sqlx::query("UPDATE leaderboard SET points = ?, name = ?, active = ? WHERE user_id = ?")
            .bind(entry.points())
            .bind(entry.name())
            .bind(entry.is_active())
            .bind(entry.user_id())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn top(&self, limit: usize) -> StoreResult<Vec<LeaderboardEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, LeaderboardRow>(
            "SELECT user_id, points, name, active FROM leaderboard
             WHERE active = 1 ORDER BY points DESC, user_id LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LeaderboardEntry::from).collect())
    }
}
