//! Assigns a topic to a team of an intelligent assignment from its bids once bidding
//! is closed.

use chrono::{DateTime, Utc};
use sign_up_sheet_database::error::DatabaseError;
use sign_up_sheet_database::models::{
    deadline_type, Assignment, AssignmentDueDate, Bid, SignedUpTeam, TeamId, Topic,
    TopicDueDate, TopicId,
};
use sign_up_sheet_database::repo::{Repo, SignUpsRepo as _};
use sign_up_sheet_database::slots::{Overflow, Reservation};
use tracing::{debug, info};

/// The resolver runs for a team without a topic, while actions are allowed, after the
/// topic choice (sign-up) deadline has passed.
#[must_use]
pub fn should_resolve(
    team_signups: &[SignedUpTeam],
    show_actions: bool,
    sign_up_deadline: Option<&AssignmentDueDate>,
    now: DateTime<Utc>,
) -> bool {
    let holds_topic = team_signups.iter().any(|signup| !signup.is_waitlisted);
    let bidding_closed = sign_up_deadline.is_some_and(|deadline| deadline.has_passed(now));
    !holds_topic && show_actions && bidding_closed
}

/// Topics worth trying, most preferred first. A bid only counts for a topic of the
/// assignment the team can see; in staggered assignments the topic must also still be
/// open for submissions.
#[must_use]
pub fn candidates(
    assignment: &Assignment,
    team_id: TeamId,
    bids: &[Bid],
    topics: &[Topic],
    topic_due_dates: &[TopicDueDate],
    now: DateTime<Utc>,
) -> Vec<TopicId> {
    let mut ordered: Vec<&Bid> = bids.iter().filter(|bid| bid.team_id == team_id).collect();
    ordered.sort_by_key(|bid| (bid.priority, bid.id));
    ordered
        .into_iter()
        .filter_map(|bid| topics.iter().find(|topic| topic.id == bid.topic_id))
        .filter(|topic| topic.assignment_id == assignment.id && topic.visible_to(Some(team_id)))
        .filter(|topic| {
            !assignment.staggered_deadline
                || !topic_due_dates.iter().any(|due_date| {
                    due_date.topic_id == topic.id
                        && due_date.deadline_type_id == deadline_type::SUBMISSION
                        && due_date.round == 1
                        && due_date.has_passed(now)
                })
        })
        .map(|topic| topic.id)
        .collect()
}

/// Tries the candidates in order and stops at the first free slot.
pub async fn resolve(
    repo: &dyn Repo,
    team_id: TeamId,
    candidates: &[TopicId],
) -> Result<Option<SignedUpTeam>, DatabaseError> {
    for &topic_id in candidates {
        match repo.reserve_slot(team_id, topic_id, Overflow::Reject).await? {
            Reservation::Reserved(signup) => {
                info!(team_id, topic_id, "assigned topic from bids");
                return Ok(Some(signup));
            }
            Reservation::Full => debug!(team_id, topic_id, "bidded topic is full"),
            Reservation::AlreadyListed => {
                debug!(team_id, topic_id, "team already waits for bidded topic");
            }
            Reservation::AlreadySignedUp => {
                debug!(team_id, "team got a topic in the meantime");
                return Ok(None);
            }
        }
    }
    Ok(None)
}
