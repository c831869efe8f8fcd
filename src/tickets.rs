use crate::{
    database::{records::LuckyNumber, ReferralStore, ScoreStore},
    error::StoreResult,
};

/// Which slot a lucky number went into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The ticket earned by a perfect quiz.
    Quiz { remaining: usize },
    /// A ticket earned by inviting a friend.
    Referral { remaining: usize },
    NoTicket,
}

/// Tickets the user can still pick a number for.
pub async fn available<S: ScoreStore + ReferralStore>(store: &S, user_id: i64) -> StoreResult<usize> {
    let quiz_ticket = store
        .score(user_id)
        .await?
        .is_some_and(|score| score.has_open_ticket());
    let open = store.open_referrals(user_id).await?.len();
    Ok(usize::from(quiz_ticket) + open)
}

/// True when the user already holds `lucky_number` on any of their tickets.
pub async fn is_duplicate<S: ScoreStore + ReferralStore>(
    store: &S,
    user_id: i64,
    lucky_number: &LuckyNumber,
) -> StoreResult<bool> {
    let own = store
        .score(user_id)
        .await?
        .is_some_and(|score| score.lucky_number() == Some(lucky_number));
    if own {
        return Ok(true);
    }
    Ok(store
        .referrals_by_referrer(user_id)
        .await?
        .iter()
        .any(|referral| referral.lucky_number() == Some(lucky_number)))
}

/// Writes `lucky_number` into the first empty slot: the quiz ticket if it is
/// open, otherwise the oldest invite ticket. Filled slots are never rewritten.
pub async fn claim<S: ScoreStore + ReferralStore>(
    store: &S,
    user_id: i64,
    lucky_number: LuckyNumber,
) -> StoreResult<Claim> {
    let open = store.open_referrals(user_id).await?;

    if let Some(score) = store.score(user_id).await? {
        if score.has_open_ticket() {
            store
                .save_score(&score.with_lucky_number(lucky_number))
                .await?;
            return Ok(Claim::Quiz {
                remaining: open.len(),
            });
        }
    }

    match open.split_first() {
        Some((referral, rest)) => {
            store
                .update_referral(&referral.with_lucky_number(lucky_number))
                .await?;
            Ok(Claim::Referral {
                remaining: rest.len(),
            })
        }
        None => Ok(Claim::NoTicket),
    }
}
