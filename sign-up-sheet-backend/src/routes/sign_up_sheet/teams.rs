use serde::Serialize;
use sign_up_sheet_database::models::{SignedUpTeam, Team, Topic};
use sign_up_sheet_database::repo::{
    ParticipantsRepo as _, Repo, SignUpsRepo as _, TeamsRepo as _, TopicsRepo as _,
};
use tracing::{info, instrument};

use super::{load_assignment, participant_of, refuse, topic_of_assignment};
use crate::context::{Actor, RequestContext};
use crate::error::{AppError, SignUpSheetError};
use crate::flash::Flash;
use crate::forms::{SignUpParams, TeamParams};
use crate::outcome::{list_path, Outcome};

#[derive(Serialize)]
struct TeamSignup<'a> {
    topic_id: i32,
    topic_name: Option<&'a str>,
    is_waitlisted: bool,
}

#[derive(Serialize)]
struct TeamPage<'a> {
    team: &'a Team,
    members: Vec<&'a str>,
    signups: Vec<TeamSignup<'a>>,
}

/// Read-only view of a team and its topics, for staff and the team's members.
#[instrument(skip(repo, ctx))]
pub async fn show_team(
    repo: &dyn Repo,
    ctx: &RequestContext,
    params: TeamParams,
) -> Result<Outcome, AppError> {
    let team = repo
        .team_try_load(params.id)
        .await?
        .ok_or(AppError::NotFound {
            entity: "team",
            id: params.id,
        })?;
    let members = repo.team_members(team.id).await?;
    let is_member = members.iter().any(|(_, user)| user.id == ctx.user.id);
    if !is_member {
        ctx.require_staff()?;
    }

    let signups: Vec<SignedUpTeam> = repo.signups_for_team(team.id).await?;
    let topics: Vec<Topic> = repo.topics_for_assignment(team.assignment_id).await?;
    Outcome::render(
        "show_team",
        &TeamPage {
            team: &team,
            members: members.iter().map(|(_, user)| user.name.as_str()).collect(),
            signups: signups
                .iter()
                .map(|signup| TeamSignup {
                    topic_id: signup.topic_id,
                    topic_name: topics
                        .iter()
                        .find(|topic| topic.id == signup.topic_id)
                        .map(|topic| topic.topic_name.as_str()),
                    is_waitlisted: signup.is_waitlisted,
                })
                .collect(),
        },
    )
}

/// Moves the current user's team onto the topic it suggested once staff approved it.
#[instrument(skip(repo, ctx))]
pub async fn switch_original_topic_to_approved_suggested_topic(
    repo: &dyn Repo,
    ctx: &RequestContext,
    params: SignUpParams,
) -> Result<Outcome, AppError> {
    let assignment = load_assignment(repo, params.id).await?;
    let location = list_path(assignment.id);
    let team_id = participant_of(repo, assignment.id, &ctx.user)
        .await?
        .and_then(|participant| participant.team_id);
    let topic = topic_of_assignment(repo, assignment.id, params.topic_id).await?;
    let switch = match (team_id, topic) {
        (Some(team_id), Some(topic)) => repo.switch_to_suggested_topic(team_id, topic.id).await?,
        _ => None,
    };
    let Some(switch) = switch else {
        return Ok(refuse(
            &SignUpSheetError::NotSuggestedTopic,
            Actor::Student,
            location,
        ));
    };
    info!(
        team_id = switch.signup.team_id,
        topic_id = switch.topic.id,
        promoted = ?switch.promoted.as_ref().map(|signup| signup.team_id),
        "switched to suggested topic"
    );
    Ok(Outcome::redirect(location).with_flash(Flash::success(format!(
        "Your team is now signed up for \"{}\".",
        switch.topic.topic_name
    ))))
}
