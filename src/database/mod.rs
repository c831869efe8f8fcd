pub mod connection;
pub mod records;

pub use connection::{Connection, LeaderboardStore, ProgressStore, ReferralStore, ScoreStore, Store};
