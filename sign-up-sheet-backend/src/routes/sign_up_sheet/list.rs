use serde::Serialize;
use sign_up_sheet_database::models::{
    deadline_type, Assignment, AssignmentDueDate, Bid, Participant, SignedUpTeam, SlotCount,
    TeamId, Topic,
};
use sign_up_sheet_database::repo::{
    AssignmentsRepo as _, BidsRepo as _, DueDatesRepo as _, Repo, SignUpsRepo as _,
    TopicsRepo as _,
};
use tracing::{debug, info, instrument};

use super::{load_assignment, participant_of};
use crate::bidding;
use crate::context::{Actor, RequestContext};
use crate::error::{AppError, SignUpSheetError};
use crate::flash::Flash;
use crate::forms::AssignmentParams;
use crate::outcome::Outcome;

#[derive(Serialize)]
struct TopicRow<'a> {
    topic: &'a Topic,
    filled: i64,
    waitlisted: i64,
    available: i64,
}

#[derive(Serialize)]
struct ListPage<'a> {
    assignment: &'a Assignment,
    participant: Option<&'a Participant>,
    topics: Vec<TopicRow<'a>>,
    selected_topics: &'a [SignedUpTeam],
    show_actions: bool,
    sign_up_deadline: Option<&'a AssignmentDueDate>,
    drop_deadline: Option<&'a AssignmentDueDate>,
}

#[derive(Serialize)]
struct IntelligentPage<'a> {
    #[serde(flatten)]
    list: ListPage<'a>,
    bids: &'a [Bid],
    bidded_topics: Vec<&'a Topic>,
    unbidded_topics: Vec<&'a Topic>,
    assigned_by_bid: Option<&'a SignedUpTeam>,
}

fn topic_rows<'a>(topics: &'a [Topic], counts: &[SlotCount]) -> Vec<TopicRow<'a>> {
    topics
        .iter()
        .map(|topic| {
            let count = counts
                .iter()
                .find(|count| count.topic_id == topic.id)
                .copied()
                .unwrap_or_default();
            TopicRow {
                topic,
                filled: count.filled,
                waitlisted: count.waitlisted,
                available: sign_up_sheet_database::slots::open_slots(topic, count.filled),
            }
        })
        .collect()
}

/// The sign-up sheet of an assignment as seen by the current user. Intelligent
/// assignments show the bidding page and hand out topics once bidding is closed.
#[instrument(skip(repo, ctx))]
pub async fn list(
    repo: &dyn Repo,
    ctx: &RequestContext,
    params: AssignmentParams,
) -> Result<Outcome, AppError> {
    let assignment = load_assignment(repo, params.id).await?;
    let participant = participant_of(repo, assignment.id, &ctx.user).await?;
    let flash = match participant {
        None if !ctx.role().is_staff() => Some(Flash::error(
            SignUpSheetError::NotParticipant.message(Actor::Student),
        )),
        _ => None,
    };
    let team_id: Option<TeamId> = participant.as_ref().and_then(|participant| participant.team_id);

    let topics: Vec<Topic> = repo
        .topics_for_assignment(assignment.id)
        .await?
        .into_iter()
        .filter(|topic| topic.visible_to(team_id))
        .collect();
    let submission_deadline = repo
        .assignment_due_date(assignment.id, deadline_type::SUBMISSION)
        .await?;
    let sign_up_deadline = repo
        .assignment_due_date(assignment.id, deadline_type::SIGN_UP)
        .await?;
    let drop_deadline = repo
        .assignment_due_date(assignment.id, deadline_type::DROP_TOPIC)
        .await?;
    let submission_closed = !assignment.staggered_deadline
        && submission_deadline
            .as_ref()
            .is_some_and(|deadline| deadline.has_passed(ctx.now));
    let show_actions = participant.is_some() && !submission_closed;

    let mut selected_topics = match team_id {
        Some(team_id) => repo.signups_for_team(team_id).await?,
        None => Vec::new(),
    };

    if !assignment.is_intelligent {
        let counts = repo.slot_counts(assignment.id).await?;
        let page = ListPage {
            assignment: &assignment,
            participant: participant.as_ref(),
            topics: topic_rows(&topics, &counts),
            selected_topics: &selected_topics,
            show_actions,
            sign_up_deadline: sign_up_deadline.as_ref(),
            drop_deadline: drop_deadline.as_ref(),
        };
        return Ok(with_optional_flash(Outcome::render("list", &page)?, flash));
    }

    let bids = match team_id {
        Some(team_id) => repo.bids_for_team(team_id).await?,
        None => Vec::new(),
    };

    let mut assigned_by_bid = None;
    if let Some(team_id) = team_id {
        if bidding::should_resolve(
            &selected_topics,
            show_actions,
            sign_up_deadline.as_ref(),
            ctx.now,
        ) {
            let topic_due_dates = if assignment.staggered_deadline {
                repo.topic_due_dates_for_assignment(assignment.id).await?
            } else {
                Vec::new()
            };
            let candidates = bidding::candidates(
                &assignment,
                team_id,
                &bids,
                &topics,
                &topic_due_dates,
                ctx.now,
            );
            debug!(team_id, candidates = candidates.len(), "resolving bids");
            assigned_by_bid = bidding::resolve(repo, team_id, &candidates).await?;
            if assigned_by_bid.is_some() {
                selected_topics = repo.signups_for_team(team_id).await?;
            } else {
                info!(team_id, "no bidded topic had a free slot");
            }
        }
    }

    let counts = repo.slot_counts(assignment.id).await?;
    let bidded_topics: Vec<&Topic> = bids
        .iter()
        .filter_map(|bid| topics.iter().find(|topic| topic.id == bid.topic_id))
        .collect();
    let unbidded_topics: Vec<&Topic> = topics
        .iter()
        .filter(|topic| !bids.iter().any(|bid| bid.topic_id == topic.id))
        .collect();
    let page = IntelligentPage {
        list: ListPage {
            assignment: &assignment,
            participant: participant.as_ref(),
            topics: topic_rows(&topics, &counts),
            selected_topics: &selected_topics,
            show_actions,
            sign_up_deadline: sign_up_deadline.as_ref(),
            drop_deadline: drop_deadline.as_ref(),
        },
        bids: &bids,
        bidded_topics,
        unbidded_topics,
        assigned_by_bid: assigned_by_bid.as_ref(),
    };
    Ok(with_optional_flash(
        Outcome::render("intelligent_topic_selection", &page)?,
        flash,
    ))
}

fn with_optional_flash(outcome: Outcome, flash: Option<Flash>) -> Outcome {
    match flash {
        Some(flash) => outcome.with_flash(flash),
        None => outcome,
    }
}
