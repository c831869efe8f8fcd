use async_trait::async_trait;

use crate::{
    database::{
        records::{NewReferral, Participant, Referral, Score},
        LeaderboardStore, ReferralStore, ScoreStore,
    },
    error::StoreResult,
    locks::UserLocks,
};

/// Answers whether a user is still in the campaign group.
#[async_trait]
pub trait Membership: Send + Sync {
    /// `None` when the lookup itself failed.
    async fn is_member(&self, user_id: i64) -> Option<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invite {
    Recorded {
        /// Referral of the same invitee by someone else, now deleted.
        superseded: Option<Referral>,
    },
    /// The inviter already has this invitee on record.
    AlreadyRecorded,
}

/// Records that `referrer` brought `invitee` into the group.
pub async fn record_invite<S: ReferralStore + LeaderboardStore>(
    store: &S,
    referrer: &Participant,
    invitee: &Participant,
) -> StoreResult<Invite> {
    let superseded = match store.referral_by_invitee(invitee.id).await? {
        Some(existing) if existing.referrer_id() == referrer.id => {
            return Ok(Invite::AlreadyRecorded);
        }
        Some(existing) => {
            log::info!(
                "User {} was invited again by {}, dropping the invite by {}",
                invitee.id,
                referrer.id,
                existing.referrer_id()
            );
            store.remove_referral(invitee.id).await?;
            store
                .add_points(existing.referrer_id(), existing.referrer_name(), -1)
                .await?;
            Some(existing)
        }
        None => None,
    };

    store
        .insert_referral(&NewReferral {
            referrer: referrer.clone(),
            invitee: invitee.clone(),
        })
        .await?;
    store
        .add_points(referrer.id, &referrer.display_name(), 1)
        .await?;

    Ok(Invite::Recorded { superseded })
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JoinReport {
    /// Members newly credited to the referrer.
    pub invited: Vec<Participant>,
    /// Invites of other referrers that the new ones replaced.
    pub superseded: Vec<Referral>,
}

/// `referrer` added `joined` to the group: credits the invites and
/// reactivates everyone who joined. A member whose records fail to update is
/// logged and skipped.
pub async fn record_joins<S: ScoreStore + ReferralStore + LeaderboardStore>(
    store: &S,
    locks: &UserLocks,
    referrer: &Participant,
    joined: &[Participant],
) -> JoinReport {
    let mut report = JoinReport::default();

    for member in joined.iter().filter(|member| member.id != referrer.id) {
        let invite = {
            let _guard = locks.acquire(referrer.id).await;
            record_invite(store, referrer, member).await
        };
        match invite {
            Ok(Invite::Recorded { superseded }) => {
                log::info!("{} invited {}", referrer.id, member.id);
                report.superseded.extend(superseded);
                report.invited.push(member.clone());
            }
            Ok(Invite::AlreadyRecorded) => {
                log::info!("{} invited {} again", referrer.id, member.id);
            }
            Err(e) => {
                log::error!(
                    "Failed to record the invite of {} by {}: {}",
                    member.id,
                    referrer.id,
                    e
                );
            }
        }
    }

    for member in joined {
        let _guard = locks.acquire(member.id).await;
        if let Err(e) = set_active(store, member.id, true).await {
            log::error!("Failed to reactivate {}: {}", member.id, e);
        }
    }

    report
}

/// Flips the active flag on the user's score, their invite tickets and their
/// leaderboard entry.
pub async fn set_active<S: ScoreStore + ReferralStore + LeaderboardStore>(
    store: &S,
    user_id: i64,
    active: bool,
) -> StoreResult<()> {
    if let Some(score) = store.score(user_id).await? {
        store.save_score(&score.with_active(active)).await?;
    }
    for referral in store.referrals_by_referrer(user_id).await? {
        store.update_referral(&referral.with_active(active)).await?;
    }
    if let Some(entry) = store.leaderboard_entry(user_id).await? {
        store
            .update_leaderboard_entry(&entry.with_active(active))
            .await?;
    }
    Ok(())
}

/// A member left the group: their own records stop counting, and the invite
/// that brought them in is reverted. Returns that invite.
pub async fn record_departure<S: ScoreStore + ReferralStore + LeaderboardStore>(
    store: &S,
    member_id: i64,
) -> StoreResult<Option<Referral>> {
    set_active(store, member_id, false).await?;

    let Some(referral) = store.referral_by_invitee(member_id).await? else {
        return Ok(None);
    };
    store.remove_referral(member_id).await?;
    store
        .add_points(referral.referrer_id(), referral.referrer_name(), -1)
        .await?;
    Ok(Some(referral))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub deactivated: Vec<i64>,
    pub removed: Vec<Referral>,
}

/// Closing pass over the campaign: players who left lose their score and
/// leaderboard standing, invites of people who left are reverted. Users whose
/// membership can't be looked up are left alone.
///
/// Membership lookups run unlocked; each write happens under the user's lock
/// on a freshly read row.
pub async fn sweep<S, M>(store: &S, membership: &M, locks: &UserLocks) -> StoreResult<SweepReport>
where
    S: ScoreStore + ReferralStore + LeaderboardStore,
    M: Membership,
{
    let mut report = SweepReport::default();

    for user_id in store.all_scores().await?.iter().map(Score::user_id) {
        if membership.is_member(user_id).await != Some(false) {
            continue;
        }
        let _guard = locks.acquire(user_id).await;
        let Some(score) = store.score(user_id).await? else {
            continue;
        };
        store.save_score(&score.with_active(false)).await?;
        if let Some(entry) = store.leaderboard_entry(user_id).await? {
            store
                .update_leaderboard_entry(&entry.with_active(false))
                .await?;
        }
        report.deactivated.push(user_id);
    }

    for listed in store.all_referrals().await? {
        if membership.is_member(listed.invitee_id()).await != Some(false) {
            continue;
        }
        // Invite tickets belong to the referrer, so their lock guards the row.
        let _guard = locks.acquire(listed.referrer_id()).await;
        let Some(referral) = store.referral_by_invitee(listed.invitee_id()).await? else {
            continue;
        };
        if referral.id() != listed.id() {
            continue;
        }
        store.remove_referral(referral.invitee_id()).await?;
        store
            .add_points(referral.referrer_id(), referral.referrer_name(), -1)
            .await?;
        report.removed.push(referral);
    }

    log::info!(
        "Sweep deactivated {} scores and removed {} invites",
        report.deactivated.len(),
        report.removed.len()
    );
    Ok(report)
}
