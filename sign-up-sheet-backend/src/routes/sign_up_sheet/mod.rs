pub mod bids;
pub mod deadlines;
pub mod list;
pub mod signups;
pub mod teams;
pub mod topics;

use sign_up_sheet_database::models::{
    Assignment, AssignmentId, Participant, TeamId, Topic, TopicId, User,
};
use sign_up_sheet_database::repo::{
    AssignmentsRepo as _, ParticipantsRepo as _, Repo, TeamsRepo as _, TopicsRepo as _,
};
use tracing::warn;

use crate::context::Actor;
use crate::error::{AppError, SignUpSheetError};
use crate::flash::Flash;
use crate::outcome::Outcome;

async fn load_assignment(
    repo: &dyn Repo,
    assignment_id: AssignmentId,
) -> Result<Assignment, AppError> {
    repo.assignment_try_load(assignment_id)
        .await?
        .ok_or(AppError::NotFound {
            entity: "assignment",
            id: assignment_id,
        })
}

/// The topic, if it exists and belongs to the assignment.
async fn topic_of_assignment(
    repo: &dyn Repo,
    assignment_id: AssignmentId,
    topic_id: TopicId,
) -> Result<Option<Topic>, AppError> {
    Ok(repo
        .topic_try_load(topic_id)
        .await?
        .filter(|topic| topic.assignment_id == assignment_id))
}

async fn participant_of(
    repo: &dyn Repo,
    assignment_id: AssignmentId,
    user: &User,
) -> Result<Option<Participant>, AppError> {
    Ok(repo.participant_find(assignment_id, user.id).await?)
}

/// The participant's team, formed on the spot for someone who has none yet.
async fn ensure_team(
    repo: &dyn Repo,
    participant: &Participant,
    user: &User,
) -> Result<TeamId, AppError> {
    if let Some(team_id) = participant.team_id {
        return Ok(team_id);
    }
    let team = repo
        .team_create_for(participant.id, &format!("{} Team", user.name))
        .await?;
    Ok(team.id)
}

fn refuse(refusal: &SignUpSheetError, actor: Actor, location: String) -> Outcome {
    warn!("refused: {refusal}");
    Outcome::redirect(location).with_flash(Flash::error(refusal.message(actor)))
}
