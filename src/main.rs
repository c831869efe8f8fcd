use std::sync::Arc;

use dotenvy::dotenv;
use luckyquizbot::{
    config::Config, database::Connection, questions::QuestionBank, schema::schema, BotContext,
};
use teloxide::error_handlers::IgnoringErrorHandlerSafe;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks::{self, Options};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

type MainResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;

#[tokio::main]
async fn main() -> MainResult {
    dotenv().ok();
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level)?)
        .json()
        .with_span_events(FmtSpan::ENTER)
        .log_internal_errors(true)
        .with_line_number(true)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    let connection = Arc::new(Connection::connect(&config.database_url).await?);
    connection.migrate().await?;

    let questions = QuestionBank::load(&config.questions_path)?;
    log::info!(
        "Loaded {} questions from {}",
        questions.len(),
        config.questions_path.display()
    );

    let bot = Bot::new(&config.token);
    let webhook = config.webhook.clone();
    let context = Arc::new(BotContext::new(config, questions));
    log::info!("Starting bot...");

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![connection, context])
        .enable_ctrlc_handler()
        .build();

    match webhook {
        Some(webhook) => {
            log::info!("Listening for updates on {}", webhook.addr);
            let listener = webhooks::axum(bot, Options::new(webhook.addr, webhook.url)).await?;
            dispatcher
                .dispatch_with_listener(listener, Arc::new(IgnoringErrorHandlerSafe))
                .await
        }
        None => dispatcher.dispatch().await,
    }
    Ok(())
}
