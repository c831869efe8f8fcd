use std::sync::Arc;

use async_trait::async_trait;
use teloxide::{
    payloads::SendMessageSetters,
    prelude::Requester,
    types::{ChatId, ChatMember, Message, ParseMode, Recipient, User, UserId},
    Bot,
};
use tracing::instrument;

use crate::{
    database::{records::Participant, Store},
    referrals::{self, Membership},
    replies, BotContext, HandlerResult,
};

/// Membership of the campaign group as Telegram reports it.
pub struct GroupMembership {
    bot: Bot,
    group: Recipient,
}

impl GroupMembership {
    pub fn new(bot: Bot, chat_group: &str) -> Self {
        Self {
            bot,
            group: Recipient::ChannelUsername(format!("@{chat_group}")),
        }
    }

    async fn member(&self, user_id: i64) -> Option<ChatMember> {
        match self
            .bot
            .get_chat_member(self.group.clone(), UserId(user_id as u64))
            .await
        {
            Ok(member) => Some(member),
            Err(e) => {
                log::warn!("Failed to look up {} in {:?}: {}", user_id, self.group, e);
                None
            }
        }
    }

    /// Owners and administrators of the group.
    pub async fn is_privileged(&self, user_id: i64) -> bool {
        self.member(user_id)
            .await
            .is_some_and(|member| member.kind.is_privileged())
    }
}

#[async_trait]
impl Membership for GroupMembership {
    async fn is_member(&self, user_id: i64) -> Option<bool> {
        self.member(user_id)
            .await
            .map(|member| member.kind.is_present())
    }
}

fn is_campaign_group(username: Option<&str>, chat_group: &str) -> bool {
    username.is_some_and(|username| username.eq_ignore_ascii_case(chat_group))
}

/// Private notices may fail when the user never opened a chat with the bot.
async fn notify(bot: &Bot, user_id: i64, text: String) {
    if let Err(e) = bot
        .send_message(ChatId(user_id), text)
        .parse_mode(ParseMode::Html)
        .await
    {
        log::warn!("Failed to notify {}: {}", user_id, e);
    }
}

#[instrument(level = "info", skip_all, fields(chat = %msg.chat.id))]
pub(crate) async fn members_joined<S: Store>(
    bot: Bot,
    msg: Message,
    joined: Vec<User>,
    context: Arc<BotContext>,
    connection: Arc<S>,
) -> HandlerResult {
    let chat_group = &context.config.chat_group;
    if !context.config.is_open() || !is_campaign_group(msg.chat.username(), chat_group) {
        return Ok(());
    }
    let Some(inviter) = msg.from.as_ref() else {
        return Ok(());
    };
    let referrer = Participant::from(inviter);
    let joined: Vec<Participant> = joined
        .iter()
        .filter(|user| !user.is_bot)
        .map(Participant::from)
        .collect();

    let report =
        referrals::record_joins(&*connection, &context.locks, &referrer, &joined).await;
    for old in &report.superseded {
        notify(&bot, old.referrer_id(), replies::invite_superseded(old)).await;
    }

    let invited: Vec<String> = report.invited.iter().map(html_name).collect();
    if !invited.is_empty() {
        notify(&bot, referrer.id, replies::invited(&invited, chat_group)).await;
    }
    Ok(())
}

#[instrument(level = "info", skip_all, fields(chat = %msg.chat.id))]
pub(crate) async fn member_left<S: Store>(
    bot: Bot,
    msg: Message,
    left: User,
    context: Arc<BotContext>,
    connection: Arc<S>,
) -> HandlerResult {
    let chat_group = &context.config.chat_group;
    if left.is_bot || !is_campaign_group(msg.chat.username(), chat_group) {
        return Ok(());
    }
    let member_id = left.id.0 as i64;

    let reverted = {
        let _guard = context.locks.acquire(member_id).await;
        referrals::record_departure(&*connection, member_id).await?
    };
    log::info!("{} left {}", member_id, chat_group);

    if let Some(referral) = reverted {
        notify(
            &bot,
            referral.referrer_id(),
            replies::invitee_left(&referral, chat_group),
        )
        .await;
    }
    if msg.from.as_ref().is_some_and(|user| user.id == left.id) {
        notify(&bot, member_id, replies::you_left(chat_group)).await;
    }
    Ok(())
}

/// `/close`: drops everyone who is no longer in the group. Owners and
/// administrators only; anybody else is ignored.
#[instrument(level = "info", skip_all, fields(chat = %msg.chat.id))]
pub(crate) async fn close<S: Store>(
    bot: Bot,
    msg: Message,
    context: Arc<BotContext>,
    connection: Arc<S>,
) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let group = GroupMembership::new(bot.clone(), &context.config.chat_group);
    if !group.is_privileged(user.id.0 as i64).await {
        log::info!("{} is not allowed to close the campaign", user.id.0);
        return Ok(());
    }

    match referrals::sweep(&*connection, &group, &context.locks).await {
        Ok(report) => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "Campaign closed: {} player(s) and {} invite(s) no longer count.",
                    report.deactivated.len(),
                    report.removed.len()
                ),
            )
            .await?;
        }
        Err(e) => {
            log::error!("Closing sweep failed: {}", e);
            bot.send_message(msg.chat.id, replies::GENERIC_FAILURE).await?;
        }
    }
    Ok(())
}

fn html_name(participant: &Participant) -> String {
    replies::mention(participant.id, &participant.display_name())
}
