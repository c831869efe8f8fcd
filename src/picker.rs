use std::sync::Arc;

use teloxide::{
    payloads::SendMessageSetters,
    prelude::Requester,
    types::{Message, ParseMode, ReplyMarkup},
    Bot,
};
use tracing::instrument;

use crate::{
    database::{records::LuckyNumber, ReferralStore, ScoreStore, Store},
    error::StoreResult,
    keyboard::yes_no_keyboard,
    replies, resolver,
    state::{SessionKey, SessionRegistry, SessionState},
    tickets::{self, Claim},
    BotContext, HandlerResult,
};

fn session_key(msg: &Message) -> Option<SessionKey> {
    msg.from
        .as_ref()
        .map(|user| SessionKey::new(msg.chat.id.0, user.id.0 as i64))
}

fn lucky_number(msg: &Message) -> Option<LuckyNumber> {
    msg.text()?.parse().ok()
}

/// Text sent while a ticket waits for its number, after a perfect quiz or
/// after `/add`.
#[instrument(level = "info", skip_all, fields(chat = %msg.chat.id))]
pub(crate) async fn receive_lucky_number<S: Store>(
    bot: Bot,
    msg: Message,
    context: Arc<BotContext>,
    connection: Arc<S>,
) -> HandlerResult {
    let Some(key) = session_key(&msg) else {
        return Ok(());
    };
    if !context.config.is_open() {
        context.sessions.clear(key);
        bot.send_message(msg.chat.id, replies::CAMPAIGN_CLOSED).await?;
        return Ok(());
    }
    let Some(number) = lucky_number(&msg) else {
        log::info!("{}: '{:?}' is not a lucky number", key.user_id, msg.text());
        bot.send_message(msg.chat.id, replies::NOT_FOUR_DIGITS).await?;
        return Ok(());
    };

    let _guard = context.locks.acquire(key.user_id).await;
    match pick(&*connection, &context.sessions, key, number.clone()).await {
        Ok(Pick::Duplicate) => {
            bot.send_message(msg.chat.id, replies::DUPLICATE_NUMBER)
                .reply_markup(yes_no_keyboard())
                .await?;
            Ok(())
        }
        Ok(Pick::Claimed(claim)) => {
            reply_claimed(&bot, &msg, key, &number, Ok(claim), &context).await
        }
        Err(e) => reply_claimed(&bot, &msg, key, &number, Err(e), &context).await,
    }
}

/// Outcome of a lucky number sent for an open ticket.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Pick {
    /// The user already holds this number, so it waits for `/yes` or `/no`.
    Duplicate,
    Claimed(Claim),
}

/// Claims `number` for the next open ticket of the user, or parks it as
/// pending when it repeats one of their numbers. The session ends either way
/// unless the duplicate check itself fails.
pub(crate) async fn pick<S: ScoreStore + ReferralStore>(
    store: &S,
    sessions: &SessionRegistry,
    key: SessionKey,
    number: LuckyNumber,
) -> StoreResult<Pick> {
    if tickets::is_duplicate(store, key.user_id, &number).await? {
        sessions.set_pending(key, number);
        sessions.clear(key);
        return Ok(Pick::Duplicate);
    }
    let claimed = tickets::claim(store, key.user_id, number).await;
    sessions.clear(key);
    claimed.map(Pick::Claimed)
}

/// Claims the pending duplicate, if any. A number is only ever claimed once.
pub(crate) async fn confirm_pending<S: ScoreStore + ReferralStore>(
    store: &S,
    sessions: &SessionRegistry,
    key: SessionKey,
) -> StoreResult<Option<(LuckyNumber, Claim)>> {
    let Some(number) = sessions.take_pending(key) else {
        return Ok(None);
    };
    let claimed = tickets::claim(store, key.user_id, number.clone()).await;
    sessions.clear(key);
    Ok(Some((number, claimed?)))
}

/// Drops the pending duplicate and waits for another number. `false` when
/// nothing was pending.
pub(crate) fn reject_pending(sessions: &SessionRegistry, key: SessionKey) -> bool {
    if sessions.take_pending(key).is_none() {
        return false;
    }
    sessions.set(key, SessionState::AwaitingReferralNumber);
    true
}

async fn reply_claimed(
    bot: &Bot,
    msg: &Message,
    key: SessionKey,
    number: &LuckyNumber,
    claimed: StoreResult<Claim>,
    context: &BotContext,
) -> HandlerResult {
    let text = match claimed {
        Ok(Claim::Quiz { remaining } | Claim::Referral { remaining }) => {
            log::info!("{} picked {}", key.user_id, number);
            replies::picked(number, remaining, &context.config.chat_group)
        }
        Ok(Claim::NoTicket) => replies::NO_TICKETS.to_owned(),
        Err(e) => {
            log::error!("Failed to store the lucky number of {}: {}", key.user_id, e);
            replies::GENERIC_FAILURE.to_owned()
        }
    };
    bot.send_message(msg.chat.id, text)
        .reply_markup(ReplyMarkup::kb_remove())
        .await?;
    Ok(())
}

/// `/add`: asks for a number for the next ticket earned by an invite.
#[instrument(level = "info", skip_all, fields(chat = %msg.chat.id))]
pub(crate) async fn add<S: Store>(
    bot: Bot,
    msg: Message,
    context: Arc<BotContext>,
    connection: Arc<S>,
) -> HandlerResult {
    if !context.config.is_open() {
        bot.send_message(msg.chat.id, replies::CAMPAIGN_CLOSED).await?;
        return Ok(());
    }
    if !msg.chat.is_private() {
        bot.send_message(msg.chat.id, replies::ADD_PRIVATELY).await?;
        return Ok(());
    }
    let Some(key) = session_key(&msg) else {
        return Ok(());
    };

    match tickets::available(&*connection, key.user_id).await {
        Ok(0) => {
            bot.send_message(msg.chat.id, replies::NO_TICKETS).await?;
        }
        Ok(count) => {
            log::info!("{} has {} ticket(s) to fill", key.user_id, count);
            context
                .sessions
                .set(key, SessionState::AwaitingReferralNumber);
            bot.send_message(msg.chat.id, replies::ASK_LUCKY_NUMBER)
                .reply_markup(ReplyMarkup::kb_remove())
                .await?;
        }
        Err(e) => {
            log::error!("Failed to count the tickets of {}: {}", key.user_id, e);
            bot.send_message(msg.chat.id, replies::GENERIC_FAILURE).await?;
        }
    }
    Ok(())
}

/// `/yes`: keeps the duplicate number that is waiting for confirmation.
#[instrument(level = "info", skip_all, fields(chat = %msg.chat.id))]
pub(crate) async fn confirm<S: Store>(
    bot: Bot,
    msg: Message,
    context: Arc<BotContext>,
    connection: Arc<S>,
) -> HandlerResult {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(key) = session_key(&msg) else {
        return Ok(());
    };
    let _guard = context.locks.acquire(key.user_id).await;
    match confirm_pending(&*connection, &context.sessions, key).await {
        Ok(Some((number, claim))) => {
            reply_claimed(&bot, &msg, key, &number, Ok(claim), &context).await
        }
        Ok(None) => Ok(()),
        Err(e) => {
            log::error!("Failed to store the lucky number of {}: {}", key.user_id, e);
            bot.send_message(msg.chat.id, replies::GENERIC_FAILURE)
                .reply_markup(ReplyMarkup::kb_remove())
                .await?;
            Ok(())
        }
    }
}

/// `/no`: drops the pending duplicate and asks again.
#[instrument(level = "info", skip_all, fields(chat = %msg.chat.id))]
pub(crate) async fn reject(bot: Bot, msg: Message, context: Arc<BotContext>) -> HandlerResult {
    let Some(key) = session_key(&msg) else {
        return Ok(());
    };
    if !reject_pending(&context.sessions, key) {
        return Ok(());
    }

    bot.send_message(msg.chat.id, replies::NUMBER_DROPPED)
        .reply_markup(ReplyMarkup::kb_remove())
        .await?;
    Ok(())
}

/// `/who [number]`. Without a number the next text message is the query.
#[instrument(level = "info", skip_all, fields(chat = %msg.chat.id))]
pub(crate) async fn who<S: Store>(
    bot: Bot,
    msg: Message,
    query: String,
    context: Arc<BotContext>,
    connection: Arc<S>,
) -> HandlerResult {
    let query = query.trim();
    if query.is_empty() {
        match session_key(&msg) {
            Some(key) if msg.chat.is_private() => {
                context.sessions.set(key, SessionState::AwaitingWhoQuery);
                bot.send_message(msg.chat.id, replies::WHO_PROMPT).await?;
            }
            _ => {
                bot.send_message(msg.chat.id, replies::WHO_USAGE).await?;
            }
        }
        return Ok(());
    }

    match query.parse::<LuckyNumber>() {
        Ok(number) => answer_who(&bot, &msg, &number, &*connection).await,
        Err(_) => {
            bot.send_message(msg.chat.id, replies::NOT_FOUR_DIGITS).await?;
            Ok(())
        }
    }
}

#[instrument(level = "info", skip_all, fields(chat = %msg.chat.id))]
pub(crate) async fn receive_who_query<S: Store>(
    bot: Bot,
    msg: Message,
    context: Arc<BotContext>,
    connection: Arc<S>,
) -> HandlerResult {
    let Some(number) = lucky_number(&msg) else {
        bot.send_message(msg.chat.id, replies::NOT_FOUR_DIGITS).await?;
        return Ok(());
    };
    if let Some(key) = session_key(&msg) {
        context.sessions.clear(key);
    }
    answer_who(&bot, &msg, &number, &*connection).await
}

async fn answer_who<S: Store>(
    bot: &Bot,
    msg: &Message,
    number: &LuckyNumber,
    connection: &S,
) -> HandlerResult {
    match resolver::who(connection, number).await {
        Ok(lookup) => {
            log::info!("Lookup of {} found {} holder(s)", number, lookup.matches().len());
            bot.send_message(msg.chat.id, replies::render_lookup(number, &lookup))
                .parse_mode(ParseMode::Html)
                .await?;
        }
        Err(e) => {
            log::error!("Lookup of {} failed: {}", number, e);
            bot.send_message(msg.chat.id, replies::GENERIC_FAILURE).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        database::{
            connection::tests::{memory_store, participant},
            records::{NewReferral, Score},
            Connection,
        },
        tickets::available,
    };

    const KEY: SessionKey = SessionKey {
        chat_id: 1,
        user_id: 1,
    };

    fn number(raw: &str) -> LuckyNumber {
        raw.parse().unwrap()
    }

    /// User 1 picked 1111 for a perfect quiz and has one invite to fill.
    async fn one_ticket_left() -> Connection {
        let store = memory_store().await;
        let mut score = Score::fresh(&participant(1, "Ann"));
        for _ in 0..5 {
            score = score.with_correct_answer();
        }
        store
            .save_score(&score.with_lucky_number(number("1111")))
            .await
            .unwrap();
        store
            .insert_referral(&NewReferral {
                referrer: participant(1, "Ann"),
                invitee: participant(2, "Friend"),
            })
            .await
            .unwrap();
        store
    }

    async fn invite_number(store: &Connection) -> Option<String> {
        store
            .referral_by_invitee(2)
            .await
            .unwrap()
            .and_then(|referral| referral.lucky_number().map(|n| n.as_str().to_owned()))
    }

    #[tokio::test]
    async fn repeated_number_waits_for_confirmation() {
        let store = one_ticket_left().await;
        let sessions = SessionRegistry::new();
        sessions.set(KEY, SessionState::AwaitingReferralNumber);

        let picked = pick(&store, &sessions, KEY, number("1111")).await.unwrap();

        assert_eq!(picked, Pick::Duplicate);
        assert_eq!(sessions.get(KEY), SessionState::Idle);
        assert_eq!(invite_number(&store).await, None);
        assert_eq!(available(&store, 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fresh_number_is_claimed_right_away() {
        let store = one_ticket_left().await;
        let sessions = SessionRegistry::new();
        sessions.set(KEY, SessionState::AwaitingReferralNumber);

        let picked = pick(&store, &sessions, KEY, number("2222")).await.unwrap();

        assert_eq!(picked, Pick::Claimed(Claim::Referral { remaining: 0 }));
        assert_eq!(sessions.get(KEY), SessionState::Idle);
        assert_eq!(invite_number(&store).await.as_deref(), Some("2222"));
        assert!(!reject_pending(&sessions, KEY));
    }

    #[tokio::test]
    async fn confirmed_duplicate_fills_the_slot_once() {
        let store = one_ticket_left().await;
        let sessions = SessionRegistry::new();
        pick(&store, &sessions, KEY, number("1111")).await.unwrap();

        let confirmed = confirm_pending(&store, &sessions, KEY).await.unwrap();

        assert_eq!(
            confirmed,
            Some((number("1111"), Claim::Referral { remaining: 0 }))
        );
        assert_eq!(invite_number(&store).await.as_deref(), Some("1111"));
        assert_eq!(confirm_pending(&store, &sessions, KEY).await.unwrap(), None);
        assert_eq!(available(&store, 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejected_duplicate_asks_again_without_writing() {
        let store = one_ticket_left().await;
        let sessions = SessionRegistry::new();
        pick(&store, &sessions, KEY, number("1111")).await.unwrap();

        assert!(reject_pending(&sessions, KEY));

        assert_eq!(sessions.get(KEY), SessionState::AwaitingReferralNumber);
        assert_eq!(invite_number(&store).await, None);
        assert_eq!(confirm_pending(&store, &sessions, KEY).await.unwrap(), None);
        assert!(!reject_pending(&sessions, KEY));
    }
}
