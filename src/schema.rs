use std::sync::Arc;

use teloxide::{
    dispatching::{UpdateFilterExt, UpdateHandler},
    dptree,
    prelude::Requester,
    types::{Message, Update, User},
    Bot,
};
use tracing::instrument;

use crate::{
    commands::{self, Command},
    database::Connection,
    membership, picker, replies, runner,
    state::{SessionKey, SessionState},
    BotContext, HandlerResult,
};

pub fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use dptree::case;

    let answer_handler = dptree::filter_map(|command: Command| command.answer_option())
        .endpoint(runner::answer::<Connection>);

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Help].endpoint(commands::help))
        .branch(case![Command::Start].endpoint(runner::start::<Connection>))
        .branch(answer_handler)
        .branch(case![Command::Who(query)].endpoint(picker::who::<Connection>))
        .branch(case![Command::Me].endpoint(commands::me::<Connection>))
        .branch(case![Command::Add].endpoint(picker::add::<Connection>))
        .branch(case![Command::Top].endpoint(commands::top::<Connection>))
        .branch(case![Command::Prize].endpoint(commands::prize))
        .branch(case![Command::Yes].endpoint(picker::confirm::<Connection>))
        .branch(case![Command::No].endpoint(picker::reject))
        .branch(case![Command::Close].endpoint(membership::close::<Connection>));

    let membership_handler = dptree::entry()
        .branch(
            dptree::filter_map(|msg: Message| msg.new_chat_members().map(<[User]>::to_vec))
                .endpoint(membership::members_joined::<Connection>),
        )
        .branch(
            dptree::filter_map(|msg: Message| msg.left_chat_member().cloned())
                .endpoint(membership::member_left::<Connection>),
        );

    let session_handler = dptree::filter_map(|msg: Message, context: Arc<BotContext>| {
        let user = msg.from.as_ref()?;
        Some(
            context
                .sessions
                .get(SessionKey::new(msg.chat.id.0, user.id.0 as i64)),
        )
    })
    .branch(
        case![SessionState::AwaitingLuckyNumber]
            .endpoint(picker::receive_lucky_number::<Connection>),
    )
    .branch(
        case![SessionState::AwaitingReferralNumber]
            .endpoint(picker::receive_lucky_number::<Connection>),
    )
    .branch(
        case![SessionState::AwaitingWhoQuery].endpoint(picker::receive_who_query::<Connection>),
    );

    Update::filter_message()
        .branch(command_handler)
        .branch(membership_handler)
        .branch(session_handler)
        .endpoint(invalid_input)
}

#[instrument(level = "info", skip_all, fields(chat = %msg.chat.id))]
async fn invalid_input(bot: Bot, msg: Message) -> HandlerResult {
    if !msg.chat.is_private() {
        return Ok(());
    }
    log::info!("{}: invalid input '{:?}'", msg.chat.id, msg.text());
    bot.send_message(msg.chat.id, replies::UNKNOWN_INPUT).await?;
    Ok(())
}
