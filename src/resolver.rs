use crate::{
    database::{
        records::{LuckyNumber, Referral, Score},
        ReferralStore, ScoreStore,
    },
    error::StoreResult,
};

/// A ticket holder. For tickets earned by invites this is the referrer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub user_id: i64,
    pub display_name: String,
    pub lucky_number: LuckyNumber,
}

impl Match {
    fn from_score(score: &Score) -> Option<Self> {
        Some(Self {
            user_id: score.user_id(),
            display_name: score.display_name(),
            lucky_number: score.lucky_number()?.clone(),
        })
    }

    fn from_referral(referral: &Referral) -> Option<Self> {
        Some(Self {
            user_id: referral.referrer_id(),
            display_name: referral.referrer_name().to_owned(),
            lucky_number: referral.lucky_number()?.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Everyone holding exactly the queried number.
    Exact(Vec<Match>),
    /// Nobody holds the number; the closest ticket instead.
    Nearest(Match),
    Nobody,
}

impl Lookup {
    pub fn matches(&self) -> &[Match] {
        match self {
            Lookup::Exact(matches) => matches,
            Lookup::Nearest(found) => std::slice::from_ref(found),
            Lookup::Nobody => &[],
        }
    }
}

/// Who holds `query`, falling back to the closest active ticket.
pub async fn who<S: ScoreStore + ReferralStore>(
    store: &S,
    query: &LuckyNumber,
) -> StoreResult<Lookup> {
    let scores = store.scores_with_lucky_number(query).await?;
    let referrals = store.referrals_with_lucky_number(query).await?;
    let exact: Vec<Match> = active_matches(&scores, &referrals).collect();
    if !exact.is_empty() {
        return Ok(Lookup::Exact(exact));
    }

    let scores = store.scores_by_lucky_number().await?;
    let referrals = store.referrals_by_lucky_number().await?;
    Ok(nearest(query, active_matches(&scores, &referrals))
        .map_or(Lookup::Nobody, Lookup::Nearest))
}

fn active_matches<'a>(
    scores: &'a [Score],
    referrals: &'a [Referral],
) -> impl Iterator<Item = Match> + 'a {
    scores
        .iter()
        .filter(|score| score.is_active())
        .filter_map(Match::from_score)
        .chain(
            referrals
                .iter()
                .filter(|referral| referral.is_active())
                .filter_map(Match::from_referral),
        )
}

/// Picks the closer of the smallest ticket above `query` and the largest
/// below it. Equal distance goes to the ticket above. Among equal numbers
/// the first candidate wins.
pub fn nearest(query: &LuckyNumber, candidates: impl IntoIterator<Item = Match>) -> Option<Match> {
    let target = query.value();
    let mut above: Option<Match> = None;
    let mut below: Option<Match> = None;

    for candidate in candidates {
        let value = candidate.lucky_number.value();
        if value > target && above.as_ref().map_or(true, |a| value < a.lucky_number.value()) {
            above = Some(candidate);
        } else if value < target
            && below.as_ref().map_or(true, |b| value > b.lucky_number.value())
        {
            below = Some(candidate);
        }
    }

    match (above, below) {
        (Some(above), Some(below)) => {
            let up = above.lucky_number.value() - target;
            let down = target - below.lucky_number.value();
            if up <= down {
                Some(above)
            } else {
                Some(below)
            }
        }
        (above, below) => above.or(below),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{
        connection::tests::{memory_store, participant},
        records::NewReferral,
        Connection,
    };

    fn candidate(user_id: i64, number: &str) -> Match {
        Match {
            user_id,
            display_name: format!("user {user_id}"),
            lucky_number: number.parse().unwrap(),
        }
    }

    fn query(number: &str) -> LuckyNumber {
        number.parse().unwrap()
    }

    async fn ticket(store: &Connection, user_id: i64, number: &str, active: bool) {
        let score = Score::fresh(&participant(user_id, "Holder"))
            .with_lucky_number(number.parse().unwrap())
            .with_active(active);
        store.save_score(&score).await.unwrap();
    }

    #[test]
    fn equal_distance_prefers_the_ticket_above() {
        let found = nearest(&query("1500"), [candidate(1, "1200"), candidate(2, "1800")]);
        assert_eq!(found.unwrap().user_id, 2);
    }

    #[test]
    fn closer_ticket_wins() {
        let found = nearest(&query("1500"), [candidate(1, "1200"), candidate(2, "1900")]);
        assert_eq!(found.unwrap().user_id, 1);

        let found = nearest(&query("1500"), [candidate(1, "1100"), candidate(2, "1600")]);
        assert_eq!(found.unwrap().user_id, 2);
    }

    #[test]
    fn one_sided_and_empty_candidates() {
        assert_eq!(
            nearest(&query("0000"), [candidate(1, "0003"), candidate(2, "0001")])
                .unwrap()
                .user_id,
            2
        );
        assert_eq!(
            nearest(&query("9999"), [candidate(1, "9000"), candidate(2, "9990")])
                .unwrap()
                .user_id,
            2
        );
        assert_eq!(nearest(&query("5000"), Vec::new()), None);
    }

    #[test]
    fn first_of_equal_numbers_wins() {
        let found = nearest(
            &query("0100"),
            [candidate(1, "0200"), candidate(2, "0200"), candidate(3, "0150")],
        );
        assert_eq!(found.unwrap().user_id, 3);

        let found = nearest(&query("0100"), [candidate(1, "0200"), candidate(2, "0200")]);
        assert_eq!(found.unwrap().user_id, 1);
    }

    #[tokio::test]
    async fn exact_matches_never_fall_through() {
        let store = memory_store().await;
        ticket(&store, 1, "1500", true).await;
        ticket(&store, 2, "1501", true).await;
        ticket(&store, 3, "1500", false).await;
        let invite = store
            .insert_referral(&NewReferral {
                referrer: participant(4, "Referrer"),
                invitee: participant(5, "Friend"),
            })
            .await
            .unwrap();
        store
            .update_referral(&invite.with_lucky_number(query("1500")))
            .await
            .unwrap();

        let lookup = who(&store, &query("1500")).await.unwrap();
        let Lookup::Exact(matches) = &lookup else {
            panic!("expected exact matches, got {lookup:?}");
        };
        assert_eq!(
            matches.iter().map(|m| m.user_id).collect::<Vec<_>>(),
            vec![1, 4]
        );
        assert_eq!(matches[1].display_name, "Referrer");
    }

    #[tokio::test]
    async fn falls_back_to_nearest_active_ticket() {
        let store = memory_store().await;
        ticket(&store, 1, "1200", true).await;
        ticket(&store, 2, "1800", true).await;
        ticket(&store, 3, "1450", false).await;

        let lookup = who(&store, &query("1500")).await.unwrap();
        assert_eq!(lookup, Lookup::Nearest(Match {
            user_id: 2,
            display_name: "Holder".into(),
            lucky_number: query("1800"),
        }));
        assert_eq!(lookup.matches().len(), 1);
    }

    #[tokio::test]
    async fn only_inactive_tickets_means_nobody() {
        let store = memory_store().await;
        assert_eq!(who(&store, &query("4242")).await.unwrap(), Lookup::Nobody);

        ticket(&store, 1, "4242", false).await;
        store.save_score(&Score::fresh(&participant(2, "NoTicket"))).await.unwrap();
        let lookup = who(&store, &query("4242")).await.unwrap();
        assert_eq!(lookup, Lookup::Nobody);
        assert!(lookup.matches().is_empty());
    }
}
