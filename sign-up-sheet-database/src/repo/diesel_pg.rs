use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::scoped_futures::ScopedFutureExt as _;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::debug;

use super::{
    AssignmentsRepo, BidsRepo, DueDatesRepo, ParticipantsRepo, SignUpsRepo, TeamsRepo, TopicsRepo,
    UsersRepo,
};
use crate::error::{DatabaseError, Result};
use crate::models::{
    Assignment, AssignmentDueDate, AssignmentId, Bid, DeadlineTypeId, DueDateUpsert, NewBid,
    NewSignedUpTeam, NewTeam, NewTopic, NewTopicDueDate, Participant, ParticipantId, Release,
    SignedUpTeam, SlotCount, Team, TeamId, Topic, TopicAttributes, TopicDueDate, TopicId,
    TopicSwitch, TopicUpdate, User, UserId,
};
use crate::schema::{
    assignment_due_dates, assignments, bids, participants, sign_up_topics, signed_up_teams, teams,
    topic_due_dates, users,
};
use crate::slots::{self, Overflow, Reservation, ReservationPlan};

/// Postgres backed repository. Operations touching slots lock the team row and then
/// the topic row (always in that order) for the duration of their transaction.
/// Promotion locks the rows of the waiting teams too, but skips the ones it would
/// have to wait for.
pub struct DieselRepo {
    pool: Pool<AsyncPgConnection>,
}

impl std::fmt::Debug for DieselRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("DieselRepo").finish()
    }
}

impl DieselRepo {
    #[must_use]
    pub const fn new(pool: Pool<AsyncPgConnection>) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<Object<AsyncPgConnection>> {
        Ok(self.pool.get().await?)
    }
}

async fn lock_team(conn: &mut AsyncPgConnection, team_id: TeamId) -> Result<()> {
    teams::table
        .find(team_id)
        .select(teams::id)
        .for_update()
        .first::<TeamId>(conn)
        .await
        .optional()?
        .ok_or(DatabaseError::Missing {
            entity: "team",
            id: team_id,
        })?;
    Ok(())
}

async fn lock_topic(conn: &mut AsyncPgConnection, topic_id: TopicId) -> Result<Option<Topic>> {
    Ok(sign_up_topics::table
        .find(topic_id)
        .select(Topic::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?)
}

async fn active_on_topic(conn: &mut AsyncPgConnection, topic_id: TopicId) -> Result<i64> {
    Ok(signed_up_teams::table
        .filter(signed_up_teams::topic_id.eq(topic_id))
        .filter(signed_up_teams::is_waitlisted.eq(false))
        .count()
        .get_result(conn)
        .await?)
}

async fn drop_waitlist_of_team(
    conn: &mut AsyncPgConnection,
    team_id: TeamId,
    keep: Option<i32>,
) -> Result<()> {
    let dropped = diesel::delete(
        signed_up_teams::table
            .filter(signed_up_teams::team_id.eq(team_id))
            .filter(signed_up_teams::is_waitlisted.eq(true))
            .filter(signed_up_teams::id.ne(keep.unwrap_or(-1))),
    )
    .execute(conn)
    .await?;
    if dropped > 0 {
        debug!(team_id, dropped, "dropped waitlist entries");
    }
    Ok(())
}

/// Fills the open slots of a topic from its waitlist. The caller holds the topic lock.
/// A waiting team whose row another transaction holds is busy changing its own
/// signups. It is passed over and the next team in line gets the slot.
async fn promote_waitlisted(
    conn: &mut AsyncPgConnection,
    topic_id: TopicId,
) -> Result<Vec<SignedUpTeam>> {
    let Some(topic) = sign_up_topics::table
        .find(topic_id)
        .select(Topic::as_select())
        .first(conn)
        .await
        .optional()?
    else {
        return Ok(Vec::new());
    };
    let active = active_on_topic(conn, topic_id).await?;
    let open = usize::try_from(slots::open_slots(&topic, active)).unwrap_or(0);
    let topic_signups: Vec<SignedUpTeam> = signed_up_teams::table
        .filter(signed_up_teams::topic_id.eq(topic_id))
        .select(SignedUpTeam::as_select())
        .load(conn)
        .await?;
    let mut promoted = Vec::with_capacity(open);
    for waiting in slots::waitlist(&topic_signups) {
        if promoted.len() == open {
            break;
        }
        // never wait for a team lock while holding the topic lock
        let locked = teams::table
            .find(waiting.team_id)
            .select(teams::id)
            .for_update()
            .skip_locked()
            .first::<TeamId>(conn)
            .await
            .optional()?;
        if locked.is_none() {
            debug!(team_id = waiting.team_id, topic_id, "waiting team is busy, passed over");
            continue;
        }
        let team_signups: Vec<SignedUpTeam> = signed_up_teams::table
            .filter(signed_up_teams::team_id.eq(waiting.team_id))
            .select(SignedUpTeam::as_select())
            .load(conn)
            .await?;
        if !slots::may_promote(waiting, &team_signups) {
            continue;
        }
        drop_waitlist_of_team(conn, waiting.team_id, Some(waiting.id)).await?;
        let signup = diesel::update(signed_up_teams::table.find(waiting.id))
            .set(signed_up_teams::is_waitlisted.eq(false))
            .returning(SignedUpTeam::as_returning())
            .get_result(conn)
            .await?;
        promoted.push(signup);
    }
    Ok(promoted)
}

async fn reserve(
    conn: &mut AsyncPgConnection,
    team_id: TeamId,
    topic_id: TopicId,
    overflow: Overflow,
) -> Result<Reservation> {
    lock_team(conn, team_id).await?;
    let topic = lock_topic(conn, topic_id)
        .await?
        .ok_or(DatabaseError::Missing {
            entity: "topic",
            id: topic_id,
        })?;
    let team_signups: Vec<SignedUpTeam> = signed_up_teams::table
        .filter(signed_up_teams::team_id.eq(team_id))
        .select(SignedUpTeam::as_select())
        .load(conn)
        .await?;
    let active = active_on_topic(conn, topic_id).await?;
    match slots::plan_reservation(&topic, &team_signups, active, overflow) {
        ReservationPlan::AlreadySignedUp => Ok(Reservation::AlreadySignedUp),
        ReservationPlan::AlreadyListed => Ok(Reservation::AlreadyListed),
        ReservationPlan::Full => Ok(Reservation::Full),
        ReservationPlan::Insert { waitlisted } => {
            if !waitlisted {
                drop_waitlist_of_team(conn, team_id, None).await?;
            }
            let signup = diesel::insert_into(signed_up_teams::table)
                .values(NewSignedUpTeam {
                    topic_id,
                    team_id,
                    is_waitlisted: waitlisted,
                })
                .returning(SignedUpTeam::as_returning())
                .get_result(conn)
                .await?;
            Ok(Reservation::Reserved(signup))
        }
    }
}

async fn release(
    conn: &mut AsyncPgConnection,
    team_id: TeamId,
    topic_id: TopicId,
) -> Result<Option<Release>> {
    lock_team(conn, team_id).await?;
    if lock_topic(conn, topic_id).await?.is_none() {
        return Ok(None);
    }
    let Some(removed) = diesel::delete(
        signed_up_teams::table
            .filter(signed_up_teams::team_id.eq(team_id))
            .filter(signed_up_teams::topic_id.eq(topic_id)),
    )
    .returning(SignedUpTeam::as_returning())
    .get_result(conn)
    .await
    .optional()?
    else {
        return Ok(None);
    };
    let promoted = if removed.is_waitlisted {
        None
    } else {
        promote_waitlisted(conn, topic_id).await?.into_iter().next()
    };
    Ok(Some(Release { removed, promoted }))
}

async fn switch_topic(
    conn: &mut AsyncPgConnection,
    team_id: TeamId,
    topic_id: TopicId,
) -> Result<Option<TopicSwitch>> {
    lock_team(conn, team_id).await?;
    let Some(topic) = diesel::update(
        sign_up_topics::table
            .find(topic_id)
            .filter(sign_up_topics::private_to.eq(team_id)),
    )
    .set(sign_up_topics::private_to.eq(None::<TeamId>))
    .returning(Topic::as_returning())
    .get_result(conn)
    .await
    .optional()?
    else {
        return Ok(None);
    };
    // also clears a waitlist entry on the suggested topic itself
    drop_waitlist_of_team(conn, team_id, None).await?;
    let active: Option<SignedUpTeam> = signed_up_teams::table
        .filter(signed_up_teams::team_id.eq(team_id))
        .filter(signed_up_teams::is_waitlisted.eq(false))
        .select(SignedUpTeam::as_select())
        .first(conn)
        .await
        .optional()?;
    let (signup, original_topic) = if let Some(active) = active {
        lock_topic(conn, active.topic_id).await?;
        let signup = diesel::update(signed_up_teams::table.find(active.id))
            .set(signed_up_teams::topic_id.eq(topic_id))
            .returning(SignedUpTeam::as_returning())
            .get_result(conn)
            .await?;
        (signup, Some(active.topic_id))
    } else {
        let signup = diesel::insert_into(signed_up_teams::table)
            .values(NewSignedUpTeam {
                topic_id,
                team_id,
                is_waitlisted: false,
            })
            .returning(SignedUpTeam::as_returning())
            .get_result(conn)
            .await?;
        (signup, None)
    };
    let promoted = match original_topic {
        Some(original) if original != topic_id => {
            promote_waitlisted(conn, original).await?.into_iter().next()
        }
        _ => None,
    };
    Ok(Some(TopicSwitch {
        topic,
        signup,
        promoted,
    }))
}

#[async_trait]
impl UsersRepo for DieselRepo {
    async fn user_try_load(&self, user_id: UserId) -> Result<Option<User>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        Ok(users::table
            .find(user_id)
            .select(User::as_select())
            .first(conn)
            .await
            .optional()?)
    }

    async fn user_try_load_by_name(&self, name: &str) -> Result<Option<User>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        Ok(users::table
            .filter(users::name.eq(name))
            .select(User::as_select())
            .first(conn)
            .await
            .optional()?)
    }
}

#[async_trait]
impl AssignmentsRepo for DieselRepo {
    async fn assignment_try_load(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<Option<Assignment>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        Ok(assignments::table
            .find(assignment_id)
            .select(Assignment::as_select())
            .first(conn)
            .await
            .optional()?)
    }

    async fn assignment_due_date(
        &self,
        assignment_id: AssignmentId,
        deadline_type_id: DeadlineTypeId,
    ) -> Result<Option<AssignmentDueDate>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        Ok(assignment_due_dates::table
            .filter(assignment_due_dates::assignment_id.eq(assignment_id))
            .filter(assignment_due_dates::deadline_type_id.eq(deadline_type_id))
            .order_by(assignment_due_dates::id)
            .select(AssignmentDueDate::as_select())
            .first(conn)
            .await
            .optional()?)
    }
}

#[async_trait]
impl ParticipantsRepo for DieselRepo {
    async fn participant_find(
        &self,
        assignment_id: AssignmentId,
        user_id: UserId,
    ) -> Result<Option<Participant>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        Ok(participants::table
            .filter(participants::assignment_id.eq(assignment_id))
            .filter(participants::user_id.eq(user_id))
            .select(Participant::as_select())
            .first(conn)
            .await
            .optional()?)
    }

    async fn team_members(&self, team_id: TeamId) -> Result<Vec<(Participant, User)>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        Ok(participants::table
            .inner_join(users::table)
            .filter(participants::team_id.eq(team_id))
            .order_by(participants::id)
            .select((Participant::as_select(), User::as_select()))
            .load(conn)
            .await?)
    }
}

#[async_trait]
impl TeamsRepo for DieselRepo {
    async fn team_try_load(&self, team_id: TeamId) -> Result<Option<Team>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        Ok(teams::table
            .find(team_id)
            .select(Team::as_select())
            .first(conn)
            .await
            .optional()?)
    }

    async fn team_create_for(&self, participant_id: ParticipantId, name: &str) -> Result<Team> {
        let name = name.to_owned();
        let mut conn = self.conn().await?;
        conn.transaction::<_, DatabaseError, _>(|conn| {
            async move {
                let participant: Participant = participants::table
                    .find(participant_id)
                    .select(Participant::as_select())
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?
                    .ok_or(DatabaseError::Missing {
                        entity: "participant",
                        id: participant_id,
                    })?;
                if let Some(team_id) = participant.team_id {
                    return Ok(teams::table
                        .find(team_id)
                        .select(Team::as_select())
                        .first(conn)
                        .await?);
                }
                let team = diesel::insert_into(teams::table)
                    .values(NewTeam {
                        assignment_id: participant.assignment_id,
                        name,
                        submitted_files: Vec::new(),
                        submitted_hyperlinks: Vec::new(),
                    })
                    .returning(Team::as_returning())
                    .get_result(conn)
                    .await?;
                diesel::update(participants::table.find(participant_id))
                    .set(participants::team_id.eq(team.id))
                    .execute(conn)
                    .await?;
                Ok(team)
            }
            .scope_boxed()
        })
        .await
    }
}

#[async_trait]
impl TopicsRepo for DieselRepo {
    async fn topic_try_load(&self, topic_id: TopicId) -> Result<Option<Topic>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        Ok(sign_up_topics::table
            .find(topic_id)
            .select(Topic::as_select())
            .first(conn)
            .await
            .optional()?)
    }

    async fn topic_find_by_name(
        &self,
        assignment_id: AssignmentId,
        topic_name: &str,
    ) -> Result<Option<Topic>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        Ok(sign_up_topics::table
            .filter(sign_up_topics::assignment_id.eq(assignment_id))
            .filter(sign_up_topics::topic_name.eq(topic_name))
            .order_by(sign_up_topics::id)
            .select(Topic::as_select())
            .first(conn)
            .await
            .optional()?)
    }

    async fn topics_for_assignment(&self, assignment_id: AssignmentId) -> Result<Vec<Topic>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        Ok(sign_up_topics::table
            .filter(sign_up_topics::assignment_id.eq(assignment_id))
            .order_by(sign_up_topics::id)
            .select(Topic::as_select())
            .load(conn)
            .await?)
    }

    async fn topic_create(&self, topic: NewTopic) -> Result<Topic> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        Ok(diesel::insert_into(sign_up_topics::table)
            .values(&topic)
            .returning(Topic::as_returning())
            .get_result(conn)
            .await?)
    }

    async fn topic_update(
        &self,
        topic_id: TopicId,
        attributes: TopicAttributes,
    ) -> Result<Option<TopicUpdate>> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, DatabaseError, _>(|conn| {
            async move {
                if lock_topic(conn, topic_id).await?.is_none() {
                    return Ok(None);
                }
                let topic = diesel::update(sign_up_topics::table.find(topic_id))
                    .set(&attributes)
                    .returning(Topic::as_returning())
                    .get_result(conn)
                    .await?;
                let promoted = promote_waitlisted(conn, topic_id).await?;
                Ok(Some(TopicUpdate { topic, promoted }))
            }
            .scope_boxed()
        })
        .await
    }

    async fn topic_delete(&self, topic_id: TopicId) -> Result<Option<Topic>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        // signups, bids and due dates go with it (ON DELETE CASCADE)
        Ok(diesel::delete(sign_up_topics::table.find(topic_id))
            .returning(Topic::as_returning())
            .get_result(conn)
            .await
            .optional()?)
    }

    async fn slot_counts(&self, assignment_id: AssignmentId) -> Result<Vec<SlotCount>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        let rows: Vec<(TopicId, bool)> = signed_up_teams::table
            .inner_join(sign_up_topics::table)
            .filter(sign_up_topics::assignment_id.eq(assignment_id))
            .select((signed_up_teams::topic_id, signed_up_teams::is_waitlisted))
            .load(conn)
            .await?;
        Ok(slots::count_slots(rows))
    }
}

#[async_trait]
impl SignUpsRepo for DieselRepo {
    async fn signups_for_team(&self, team_id: TeamId) -> Result<Vec<SignedUpTeam>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        Ok(signed_up_teams::table
            .filter(signed_up_teams::team_id.eq(team_id))
            .order_by(signed_up_teams::id)
            .select(SignedUpTeam::as_select())
            .load(conn)
            .await?)
    }

    async fn reserve_slot(
        &self,
        team_id: TeamId,
        topic_id: TopicId,
        overflow: Overflow,
    ) -> Result<Reservation> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, DatabaseError, _>(|conn| {
            async move { reserve(conn, team_id, topic_id, overflow).await }.scope_boxed()
        })
        .await
    }

    async fn release_signup(&self, team_id: TeamId, topic_id: TopicId) -> Result<Option<Release>> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, DatabaseError, _>(|conn| {
            async move { release(conn, team_id, topic_id).await }.scope_boxed()
        })
        .await
    }

    async fn switch_to_suggested_topic(
        &self,
        team_id: TeamId,
        topic_id: TopicId,
    ) -> Result<Option<TopicSwitch>> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, DatabaseError, _>(|conn| {
            async move { switch_topic(conn, team_id, topic_id).await }.scope_boxed()
        })
        .await
    }
}

#[async_trait]
impl BidsRepo for DieselRepo {
    async fn bids_for_team(&self, team_id: TeamId) -> Result<Vec<Bid>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        Ok(bids::table
            .filter(bids::team_id.eq(team_id))
            .order_by((bids::priority, bids::id))
            .select(Bid::as_select())
            .load(conn)
            .await?)
    }

    async fn bid_set_priority(
        &self,
        team_id: TeamId,
        topic_id: TopicId,
        priority: Option<i32>,
    ) -> Result<Vec<Bid>> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, DatabaseError, _>(|conn| {
            async move {
                lock_team(conn, team_id).await?;
                let current: Vec<Bid> = bids::table
                    .filter(bids::team_id.eq(team_id))
                    .select(Bid::as_select())
                    .load(conn)
                    .await?;
                let ordering: Vec<NewBid> = slots::reorder_bids(&current, topic_id, priority)
                    .into_iter()
                    .map(|(topic_id, priority)| NewBid {
                        topic_id,
                        team_id,
                        priority,
                    })
                    .collect();
                diesel::delete(bids::table.filter(bids::team_id.eq(team_id)))
                    .execute(conn)
                    .await?;
                let mut inserted: Vec<Bid> = diesel::insert_into(bids::table)
                    .values(&ordering)
                    .returning(Bid::as_returning())
                    .get_results(conn)
                    .await?;
                inserted.sort_by_key(|bid| bid.priority);
                Ok(inserted)
            }
            .scope_boxed()
        })
        .await
    }
}

#[async_trait]
impl DueDatesRepo for DieselRepo {
    async fn topic_due_dates_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<Vec<TopicDueDate>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        Ok(topic_due_dates::table
            .inner_join(sign_up_topics::table)
            .filter(sign_up_topics::assignment_id.eq(assignment_id))
            .order_by(topic_due_dates::id)
            .select(TopicDueDate::as_select())
            .load(conn)
            .await?)
    }

    async fn topic_due_date(
        &self,
        topic_id: TopicId,
        deadline_type_id: DeadlineTypeId,
        round: i32,
    ) -> Result<Option<TopicDueDate>> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        Ok(topic_due_dates::table
            .filter(topic_due_dates::topic_id.eq(topic_id))
            .filter(topic_due_dates::deadline_type_id.eq(deadline_type_id))
            .filter(topic_due_dates::round.eq(round))
            .select(TopicDueDate::as_select())
            .first(conn)
            .await
            .optional()?)
    }

    async fn topic_due_date_upsert(&self, due_date: NewTopicDueDate) -> Result<DueDateUpsert> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, DatabaseError, _>(|conn| {
            async move {
                let existing: Option<TopicDueDate> = topic_due_dates::table
                    .filter(topic_due_dates::topic_id.eq(due_date.topic_id))
                    .filter(topic_due_dates::deadline_type_id.eq(due_date.deadline_type_id))
                    .filter(topic_due_dates::round.eq(due_date.round))
                    .select(TopicDueDate::as_select())
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?;
                let stored = diesel::insert_into(topic_due_dates::table)
                    .values(&due_date)
                    .on_conflict((
                        topic_due_dates::topic_id,
                        topic_due_dates::deadline_type_id,
                        topic_due_dates::round,
                    ))
                    .do_update()
                    .set(topic_due_dates::due_at.eq(excluded(topic_due_dates::due_at)))
                    .returning(TopicDueDate::as_returning())
                    .get_result(conn)
                    .await?;
                Ok(DueDateUpsert {
                    due_date: stored,
                    created: existing.is_none(),
                })
            }
            .scope_boxed()
        })
        .await
    }
}
