use config::Config;
use locks::UserLocks;
use questions::QuestionBank;
use state::SessionRegistry;

pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod keyboard;
pub mod locks;
pub mod membership;
pub mod picker;
pub mod questions;
pub mod quiz;
pub mod referrals;
mod replies;
pub mod resolver;
pub mod runner;
pub mod schema;
pub mod state;
pub mod tickets;

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;

/// Process-wide state injected into every handler next to the store.
#[derive(Debug)]
pub struct BotContext {
    pub config: Config,
    pub questions: QuestionBank,
    pub sessions: SessionRegistry,
    pub locks: UserLocks,
}

impl BotContext {
    pub fn new(config: Config, questions: QuestionBank) -> Self {
        Self {
            config,
            questions,
            sessions: SessionRegistry::new(),
            locks: UserLocks::new(),
        }
    }
}
