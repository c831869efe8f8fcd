use teloxide::utils::html;

use crate::{
    database::records::{LeaderboardEntry, LuckyNumber, Referral, Score, QUIZ_LENGTH},
    resolver::Lookup,
};

pub(crate) const CAMPAIGN_CLOSED: &str = "Sorry, the campaign is over.";
pub(crate) const GENERIC_FAILURE: &str = "Something went wrong on our side. Please try again later.";
pub(crate) const NOT_FOUR_DIGITS: &str = "Please send exactly 4 digits, e.g. 0427.";
pub(crate) const ASK_LUCKY_NUMBER: &str = "Send me your 4-digit lucky number:";
pub(crate) const NO_TICKETS: &str = "You have no tickets left to pick a lucky number for.";
pub(crate) const NO_SUCH_OPTION: &str = "This question has no such option.";
pub(crate) const NO_ACTIVE_QUIZ: &str = "You have no quiz running. Send /start to begin.";
pub(crate) const ADD_PRIVATELY: &str = "Send /add to me in a private chat to pick your lucky numbers.";
pub(crate) const WHO_PROMPT: &str = "Which lucky number do you want to look up?";
pub(crate) const WHO_USAGE: &str = "Use /who 1234 to see who picked a lucky number.";
pub(crate) const DUPLICATE_NUMBER: &str =
    "You already picked this number. Pick it again anyway? /yes to keep it, /no to choose another one.";
pub(crate) const NUMBER_DROPPED: &str = "Number dropped. Send me a new 4-digit lucky number:";
pub(crate) const ANSWERING_PRIVATELY: &str = "I'll answer you in a private chat.";
pub(crate) const UNKNOWN_INPUT: &str = "Sorry, I didn't get that. Send /help to see what I can do.";
pub(crate) const PRIZES: &str = "Prizes of the campaign:\n\n\
    ⭐ 15 prizes for lucky-number tickets drawn at the end:\n\
    \u{20}   💰 5 grand prizes\n\
    \u{20}   💰 10 runner-up prizes\n\n\
    ⭐ 5 more prizes for the members who invited the most friends.\n\n\
    Good luck 😉";

pub(crate) fn mention(user_id: i64, name: &str) -> String {
    format!(
        "<a href=\"tg://user?id={user_id}\">{}</a>",
        html::escape(name.trim())
    )
}

pub(crate) fn help(descriptions: &str, chat_group: &str) -> String {
    format!(
        "Answer all {QUIZ_LENGTH} questions correctly and you get a ticket to pick a lucky number.\n\
         Invite friends to @{chat_group} for one more ticket per friend.\n\n{descriptions}"
    )
}

pub(crate) fn start_privately(bot_username: &str) -> String {
    format!("Chat with @{bot_username} privately to answer the questions and join the drawing.")
}

pub(crate) fn join_group_first(chat_group: &str) -> String {
    format!("Join @{chat_group} first to take part in the campaign.")
}

pub(crate) fn intro() -> String {
    format!("Answer {QUIZ_LENGTH} simple questions correctly to enter the lucky draw.")
}

pub(crate) fn quiz_finished(correct: u8, qualified: bool) -> String {
    let mut text = format!("You answered {correct}/{QUIZ_LENGTH} questions correctly.\n");
    if qualified {
        text.push_str("Brilliant! Now send me 4 digits for your lucky number.");
    } else {
        text.push_str("So close! Send /start to try again.");
    }
    text
}

pub(crate) fn picked(lucky_number: &LuckyNumber, remaining: usize, chat_group: &str) -> String {
    let mut text = format!(
        "Your lucky number is {lucky_number}. The winners are drawn when the campaign ends."
    );
    if remaining > 0 {
        text.push_str(&format!(
            "\nYou have {remaining} more ticket(s), send /add to pick them."
        ));
    } else {
        text.push_str(&format!(
            "\nInvite friends to @{chat_group} to get more tickets 🤗"
        ));
    }
    text
}

pub(crate) fn invited(names: &[String], chat_group: &str) -> String {
    format!(
        "You added {} to @{chat_group} and earned {} more lucky-number ticket(s). Send /add to pick them.",
        names.join(", "),
        names.len()
    )
}

pub(crate) fn invite_superseded(invitee: &Referral) -> String {
    format!(
        "{} left the group and was invited again by someone else. The lucky number you picked for them no longer counts.",
        mention(invitee.invitee_id(), invitee.invitee_name())
    )
}

pub(crate) fn invitee_left(invitee: &Referral, chat_group: &str) -> String {
    format!(
        "{} left @{chat_group}. The lucky number you picked for them no longer counts.",
        mention(invitee.invitee_id(), invitee.invitee_name())
    )
}

pub(crate) fn you_left(chat_group: &str) -> String {
    format!("You left @{chat_group}, so your tickets no longer count in the drawing 😢")
}

pub(crate) fn not_started() -> &'static str {
    "You haven't taken the quiz yet. Send /start to me in a private chat to join."
}

pub(crate) fn render_lookup(query: &LuckyNumber, lookup: &Lookup) -> String {
    let mut text = match lookup {
        Lookup::Exact(_) => format!("Members who picked {query}:\n\n"),
        Lookup::Nearest(_) => format!("Nobody picked {query} yet. The closest pick is:\n\n"),
        Lookup::Nobody => return "Nobody has picked a lucky number yet.".to_owned(),
    };
    for found in lookup.matches() {
        text.push_str(&format!(
            "{} - {}\n",
            mention(found.user_id, &found.display_name),
            found.lucky_number
        ));
    }
    text
}

pub(crate) fn render_top(entries: &[LeaderboardEntry]) -> String {
    let mut text = String::from("Top inviters:\n");
    if entries.is_empty() {
        text.push_str("Nobody on the list yet.");
    }
    for (rank, entry) in entries.iter().enumerate() {
        text.push_str(&format!(
            "{}. {} - {} friend(s)\n",
            rank + 1,
            mention(entry.user_id(), entry.name()),
            entry.points()
        ));
    }
    text
}

pub(crate) fn render_summary(
    score: &Score,
    referrals: &[Referral],
    tickets: usize,
    chat_group: &str,
) -> String {
    let mut text = String::new();
    if !score.is_active() || referrals.iter().any(|r| !r.is_active()) {
        text.push_str(&format!(
            "You left @{chat_group}, so the results below don't count.\n"
        ));
    }

    match score.lucky_number() {
        Some(lucky_number) => text.push_str(&format!(
            "You answered {}/{QUIZ_LENGTH} correctly and picked {lucky_number}.\n",
            score.correct()
        )),
        None => text.push_str(&format!(
            "You answered {}/{QUIZ_LENGTH} correctly and have no quiz lucky number.\n",
            score.correct()
        )),
    }

    if referrals.is_empty() {
        text.push_str(&format!(
            "Invite friends to @{chat_group} to get more tickets 🤗\n"
        ));
    } else {
        text.push_str("You invited:\n");
        for referral in referrals {
            let number = referral
                .lucky_number()
                .map_or_else(|| "not picked".to_owned(), ToString::to_string);
            text.push_str(&format!(
                "{}, lucky number: {number}\n",
                mention(referral.invitee_id(), referral.invitee_name())
            ));
        }
    }

    if tickets > 0 {
        text.push_str("Send /add to pick your remaining lucky numbers.");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        database::records::{Participant, Score},
        resolver::Match,
    };

    fn holder(user_id: i64, name: &str, number: &str) -> Match {
        Match {
            user_id,
            display_name: name.into(),
            lucky_number: number.parse().unwrap(),
        }
    }

    #[test]
    fn mentions_escape_names() {
        assert_eq!(
            mention(5, " <b>Ann</b> "),
            "<a href=\"tg://user?id=5\">&lt;b&gt;Ann&lt;/b&gt;</a>"
        );
    }

    #[test]
    fn lookup_header_tells_exact_from_nearest() {
        let query = "1500".parse().unwrap();
        let exact = render_lookup(&query, &Lookup::Exact(vec![holder(1, "Ann", "1500")]));
        assert!(exact.starts_with("Members who picked 1500"));
        assert!(exact.contains("tg://user?id=1"));

        let nearest = render_lookup(&query, &Lookup::Nearest(holder(2, "Bo", "1800")));
        assert!(nearest.starts_with("Nobody picked 1500 yet"));
        assert!(nearest.contains("- 1800"));

        assert_eq!(
            render_lookup(&query, &Lookup::Nobody),
            "Nobody has picked a lucky number yet."
        );
    }

    #[test]
    fn summary_flags_inactive_players() {
        let player = Participant {
            id: 1,
            username: None,
            first_name: "Ann".into(),
            last_name: None,
        };
        let score = Score::fresh(&player);
        let summary = render_summary(&score, &[], 0, "campaign");
        assert!(!summary.contains("don't count"));
        assert!(summary.contains("0/5"));

        let summary = render_summary(&score.with_active(false), &[], 1, "campaign");
        assert!(summary.starts_with("You left @campaign"));
        assert!(summary.ends_with("/add to pick your remaining lucky numbers."));
    }

    #[test]
    fn empty_leaderboard() {
        assert_eq!(render_top(&[]), "Top inviters:\nNobody on the list yet.");
    }
}
