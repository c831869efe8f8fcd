use std::sync::Arc;

use rand::{rngs::StdRng, SeedableRng};
use teloxide::{
    payloads::SendMessageSetters,
    prelude::Requester,
    types::{ChatId, Me, Message, ReplyMarkup},
    Bot,
};
use tracing::instrument;

use crate::{
    database::{records::Participant, Store},
    error::QuizError,
    keyboard::answers_keyboard,
    membership::GroupMembership,
    quiz::{QuizEngine, Step},
    referrals::Membership,
    replies, BotContext, HandlerResult,
};

#[instrument(level = "info", skip_all, fields(chat = %msg.chat.id))]
pub(crate) async fn start<S: Store>(
    bot: Bot,
    msg: Message,
    me: Me,
    context: Arc<BotContext>,
    connection: Arc<S>,
) -> HandlerResult {
    if !context.config.is_open() {
        bot.send_message(msg.chat.id, replies::CAMPAIGN_CLOSED).await?;
        return Ok(());
    }
    if !msg.chat.is_private() {
        bot.send_message(msg.chat.id, replies::start_privately(me.username()))
            .await?;
        return Ok(());
    }
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let participant = Participant::from(user);

    let group = GroupMembership::new(bot.clone(), &context.config.chat_group);
    let membership = group.is_member(participant.id).await;
    if let Some(refusal) = refuse_start(membership, &context.config.chat_group) {
        log::info!("{} can't start: membership {:?}", participant.id, membership);
        bot.send_message(msg.chat.id, refusal).await?;
        return Ok(());
    }

    bot.send_message(msg.chat.id, replies::intro()).await?;

    let _guard = context.locks.acquire(participant.id).await;
    let engine = QuizEngine::new(&*connection, &context.questions, &context.sessions);
    let step = engine
        .start(msg.chat.id.0, &participant, StdRng::from_entropy())
        .await;
    log::info!("{} started the quiz", participant.display_name());
    send_step(&bot, msg.chat.id, step).await
}

/// Reply turning a user away from the quiz, given their group membership.
/// A failed lookup (`None`) gets the generic failure reply.
fn refuse_start(membership: Option<bool>, chat_group: &str) -> Option<String> {
    match membership {
        Some(true) => None,
        Some(false) => Some(replies::join_group_first(chat_group)),
        None => Some(replies::GENERIC_FAILURE.to_owned()),
    }
}

#[instrument(level = "info", skip_all, fields(chat = %msg.chat.id, option = option))]
pub(crate) async fn answer<S: Store>(
    bot: Bot,
    msg: Message,
    option: usize,
    context: Arc<BotContext>,
    connection: Arc<S>,
) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let participant = Participant::from(user);

    let _guard = context.locks.acquire(participant.id).await;
    let engine = QuizEngine::new(&*connection, &context.questions, &context.sessions);
    let step = engine
        .submit_answer(msg.chat.id.0, &participant, option)
        .await;
    send_step(&bot, msg.chat.id, step).await
}

async fn send_step(bot: &Bot, chat_id: ChatId, step: Result<Step<'_>, QuizError>) -> HandlerResult {
    match step {
        Ok(Step::InProgress { cursor, question }) => {
            bot.send_message(chat_id, format!("{}. {}", cursor + 1, question))
                .reply_markup(answers_keyboard(question.labels()))
                .await?;
        }
        Ok(Step::Finished { correct, qualified }) => {
            log::info!(
                "Chat {} finished the quiz with {} correct answers",
                chat_id,
                correct
            );
            bot.send_message(chat_id, replies::quiz_finished(correct, qualified))
                .reply_markup(ReplyMarkup::kb_remove())
                .await?;
        }
        Err(QuizError::InvalidOption) => {
            bot.send_message(chat_id, replies::NO_SUCH_OPTION).await?;
        }
        Err(QuizError::NoActiveQuiz) => {
            bot.send_message(chat_id, replies::NO_ACTIVE_QUIZ)
                .reply_markup(ReplyMarkup::kb_remove())
                .await?;
        }
        Err(QuizError::Storage(e)) => {
            log::error!("Quiz storage failed in chat {}: {}", chat_id, e);
            bot.send_message(chat_id, replies::GENERIC_FAILURE).await?;
        }
    }
    Ok(())
}
