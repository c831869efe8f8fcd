use std::sync::Arc;

use teloxide::{
    payloads::SendMessageSetters,
    prelude::Requester,
    types::{ChatId, Message, ParseMode},
    utils::command::BotCommands,
    Bot,
};
use tracing::instrument;

use crate::{database::Store, error::StoreResult, replies, tickets, BotContext, HandlerResult};

const TOP_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, BotCommands)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "display this text.")]
    Help,
    #[command(description = "answer the quiz and win a lucky number.")]
    Start,
    #[command(rename = "A", hide)]
    A,
    #[command(rename = "B", hide)]
    B,
    #[command(rename = "C", hide)]
    C,
    #[command(rename = "D", hide)]
    D,
    #[command(description = "see who picked a lucky number, e.g. /who 1234.")]
    Who(String),
    #[command(description = "show your score, invites and lucky numbers.")]
    Me,
    #[command(description = "pick lucky numbers for the friends you invited.")]
    Add,
    #[command(description = "top inviters.")]
    Top,
    #[command(description = "prizes of the campaign.")]
    Prize,
    #[command(description = "keep a lucky number you already picked.")]
    Yes,
    #[command(description = "drop it and pick another number.")]
    No,
    #[command(hide)]
    Close,
}

impl Command {
    /// Option index chosen by the `/A`..`/D` commands.
    pub fn answer_option(&self) -> Option<usize> {
        match self {
            Command::A => Some(0),
            Command::B => Some(1),
            Command::C => Some(2),
            Command::D => Some(3),
            _ => None,
        }
    }
}

pub(crate) async fn help(bot: Bot, msg: Message, context: Arc<BotContext>) -> HandlerResult {
    let descriptions = Command::descriptions().to_string();
    bot.send_message(
        msg.chat.id,
        replies::help(&descriptions, &context.config.chat_group),
    )
    .await?;
    Ok(())
}

pub(crate) async fn prize(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, replies::PRIZES).await?;
    Ok(())
}

#[instrument(level = "info", skip_all, fields(chat = %msg.chat.id))]
pub(crate) async fn top<S: Store>(bot: Bot, msg: Message, connection: Arc<S>) -> HandlerResult {
    let entries = match connection.top(TOP_SIZE).await {
        Ok(entries) => entries,
        Err(e) => {
            log::error!("Failed to read the leaderboard: {}", e);
            bot.send_message(msg.chat.id, replies::GENERIC_FAILURE).await?;
            return Ok(());
        }
    };

    bot.send_message(msg.chat.id, replies::render_top(&entries))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

#[instrument(level = "info", skip_all, fields(chat = %msg.chat.id))]
pub(crate) async fn me<S: Store>(
    bot: Bot,
    msg: Message,
    context: Arc<BotContext>,
    connection: Arc<S>,
) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;

    // Group requests are answered in private.
    let reply_to = if msg.chat.is_private() {
        msg.chat.id
    } else {
        bot.send_message(msg.chat.id, replies::ANSWERING_PRIVATELY)
            .await?;
        ChatId(user_id)
    };

    match summary(&*connection, user_id, &context.config.chat_group).await {
        Ok(Some(summary)) => {
            bot.send_message(reply_to, summary)
                .parse_mode(ParseMode::Html)
                .await?;
        }
        Ok(None) => {
            bot.send_message(reply_to, replies::not_started()).await?;
        }
        Err(e) => {
            log::error!("Failed to read the records of {}: {}", user_id, e);
            bot.send_message(msg.chat.id, replies::GENERIC_FAILURE).await?;
        }
    }
    Ok(())
}

async fn summary<S: Store>(
    store: &S,
    user_id: i64,
    chat_group: &str,
) -> StoreResult<Option<String>> {
    let Some(score) = store.score(user_id).await? else {
        return Ok(None);
    };
    let referrals = store.referrals_by_referrer(user_id).await?;
    let tickets = tickets::available(store, user_id).await?;
    Ok(Some(replies::render_summary(
        &score, &referrals, tickets, chat_group,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Command {
        Command::parse(text, "luckyquizbot").unwrap()
    }

    #[test]
    fn answer_commands_keep_their_case() {
        assert_eq!(parse("/A"), Command::A);
        assert_eq!(parse("/D").answer_option(), Some(3));
        assert_eq!(parse("/start").answer_option(), None);
    }

    #[test]
    fn who_takes_an_optional_argument() {
        assert_eq!(parse("/who 1234"), Command::Who("1234".into()));
        assert_eq!(parse("/who"), Command::Who(String::new()));
        assert_eq!(parse("/who@luckyquizbot 0042"), Command::Who("0042".into()));
    }

    #[test]
    fn hidden_commands_stay_out_of_help() {
        let help = Command::descriptions().to_string();
        assert!(help.contains("/who"));
        assert!(!help.contains("/close"));
        assert!(!help.contains("/A"));
    }

    #[tokio::test]
    async fn summary_needs_a_started_quiz() {
        use crate::database::{
            connection::tests::{memory_store, participant},
            records::Score,
            ScoreStore,
        };

        let store = memory_store().await;
        assert_eq!(summary(&store, 1, "campaign").await.unwrap(), None);

        store.save_score(&Score::fresh(&participant(1, "Ann"))).await.unwrap();
        let text = summary(&store, 1, "campaign").await.unwrap().unwrap();
        assert!(text.contains("0/5"));
        assert!(text.contains("Invite friends to @campaign"));
    }
}
