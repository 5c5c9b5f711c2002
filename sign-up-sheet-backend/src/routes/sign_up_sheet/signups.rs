use sign_up_sheet_database::models::{deadline_type, Assignment, TeamId, TopicId};
use sign_up_sheet_database::repo::{
    AssignmentsRepo as _, DueDatesRepo as _, Repo, SignUpsRepo as _, TeamsRepo as _,
    UsersRepo as _,
};
use sign_up_sheet_database::slots::{Overflow, Reservation};
use tracing::{info, instrument};

use super::{ensure_team, load_assignment, participant_of, refuse, topic_of_assignment};
use crate::context::{Actor, RequestContext};
use crate::error::{AppError, SignUpSheetError};
use crate::flash::Flash;
use crate::forms::{InstructorDropParams, InstructorSignUpParams, SignUpParams};
use crate::outcome::{assignment_edit_path, list_path, Outcome};

fn topic_missing(topic_id: TopicId) -> SignUpSheetError {
    SignUpSheetError::NotFound {
        entity: "topic",
        id: topic_id,
    }
}

/// Signs the current user's team up for a topic, onto the waitlist when it is full.
#[instrument(skip(repo, ctx))]
pub async fn sign_up(
    repo: &dyn Repo,
    ctx: &RequestContext,
    params: SignUpParams,
) -> Result<Outcome, AppError> {
    let assignment = load_assignment(repo, params.id).await?;
    let location = list_path(assignment.id);
    let Some(participant) = participant_of(repo, assignment.id, &ctx.user).await? else {
        return Ok(refuse(
            &SignUpSheetError::NotParticipant,
            Actor::Student,
            location,
        ));
    };
    let team_id = ensure_team(repo, &participant, &ctx.user).await?;
    let visible = topic_of_assignment(repo, assignment.id, params.topic_id)
        .await?
        .filter(|topic| topic.visible_to(Some(team_id)));
    let Some(topic) = visible else {
        return Ok(refuse(
            &topic_missing(params.topic_id),
            Actor::Student,
            location,
        ));
    };

    Ok(
        match repo
            .reserve_slot(team_id, topic.id, Overflow::Waitlist)
            .await?
        {
            Reservation::Reserved(signup) if signup.is_waitlisted => {
                info!(team_id, topic_id = topic.id, "team waitlisted");
                Outcome::redirect(location).with_flash(Flash::notice(
                    "The topic is full, your team has been added to the waitlist.",
                ))
            }
            Reservation::Reserved(_) => {
                info!(team_id, topic_id = topic.id, "team signed up");
                Outcome::redirect(location)
            }
            Reservation::AlreadySignedUp | Reservation::AlreadyListed | Reservation::Full => {
                refuse(&SignUpSheetError::AlreadySignedUp, Actor::Student, location)
            }
        },
    )
}

/// Signs a student up on their behalf, looked up by user name.
#[instrument(skip(repo, ctx))]
pub async fn signup_as_instructor_action(
    repo: &dyn Repo,
    ctx: &RequestContext,
    params: InstructorSignUpParams,
) -> Result<Outcome, AppError> {
    ctx.require_staff()?;
    let location = assignment_edit_path(params.assignment_id);
    let Some(user) = repo.user_try_load_by_name(params.username.trim()).await? else {
        return Ok(refuse(
            &SignUpSheetError::UserNotFound(params.username),
            Actor::Instructor,
            location,
        ));
    };
    let assignment = load_assignment(repo, params.assignment_id).await?;
    let Some(participant) = participant_of(repo, assignment.id, &user).await? else {
        return Ok(refuse(
            &SignUpSheetError::NotParticipant,
            Actor::Instructor,
            location,
        ));
    };
    let team_id = ensure_team(repo, &participant, &user).await?;
    let visible = topic_of_assignment(repo, assignment.id, params.topic_id)
        .await?
        .filter(|topic| topic.visible_to(Some(team_id)));
    let Some(topic) = visible else {
        return Ok(refuse(
            &topic_missing(params.topic_id),
            Actor::Instructor,
            location,
        ));
    };

    Ok(
        match repo
            .reserve_slot(team_id, topic.id, Overflow::Waitlist)
            .await?
        {
            Reservation::Reserved(signup) => {
                info!(
                    team_id,
                    topic_id = topic.id,
                    waitlisted = signup.is_waitlisted,
                    instructor = ctx.user.id,
                    "student signed up by staff"
                );
                Outcome::redirect(location).with_flash(Flash::success(
                    "You have successfully signed up the student for the topic!",
                ))
            }
            Reservation::AlreadySignedUp | Reservation::AlreadyListed | Reservation::Full => {
                refuse(&SignUpSheetError::AlreadySignedUp, Actor::Instructor, location)
            }
        },
    )
}

/// The current user's team leaves the topic.
#[instrument(skip(repo, ctx))]
pub async fn delete_signup(
    repo: &dyn Repo,
    ctx: &RequestContext,
    params: SignUpParams,
) -> Result<Outcome, AppError> {
    let assignment = load_assignment(repo, params.id).await?;
    let team_id = participant_of(repo, assignment.id, &ctx.user)
        .await?
        .and_then(|participant| participant.team_id);
    let Some(team_id) = team_id else {
        return Ok(refuse(
            &SignUpSheetError::NotSignedUp,
            Actor::Student,
            Actor::Student.redirect_path(assignment.id),
        ));
    };
    drop_signup(
        repo,
        ctx,
        Actor::Student,
        &assignment,
        team_id,
        params.topic_id,
    )
    .await
}

#[instrument(skip(repo, ctx))]
pub async fn delete_signup_as_instructor(
    repo: &dyn Repo,
    ctx: &RequestContext,
    params: InstructorDropParams,
) -> Result<Outcome, AppError> {
    ctx.require_staff()?;
    let assignment = load_assignment(repo, params.assignment_id).await?;
    drop_signup(
        repo,
        ctx,
        Actor::Instructor,
        &assignment,
        params.team_id,
        params.topic_id,
    )
    .await
}

/// Removes a signup unless the team has submitted work or the drop deadline is over.
/// Wording and redirect target follow the actor.
async fn drop_signup(
    repo: &dyn Repo,
    ctx: &RequestContext,
    actor: Actor,
    assignment: &Assignment,
    team_id: TeamId,
    topic_id: TopicId,
) -> Result<Outcome, AppError> {
    let location = actor.redirect_path(assignment.id);
    let Some(team) = repo
        .team_try_load(team_id)
        .await?
        .filter(|team| team.assignment_id == assignment.id)
    else {
        return Ok(refuse(
            &SignUpSheetError::NotFound {
                entity: "team",
                id: team_id,
            },
            actor,
            location,
        ));
    };
    if team.has_submissions() {
        return Ok(refuse(&SignUpSheetError::HasSubmission, actor, location));
    }

    let topic_deadline = if assignment.staggered_deadline {
        repo.topic_due_date(topic_id, deadline_type::DROP_TOPIC, 1)
            .await?
            .map(|due_date| due_date.due_at)
    } else {
        None
    };
    let drop_deadline = match topic_deadline {
        Some(due_at) => Some(due_at),
        None => repo
            .assignment_due_date(assignment.id, deadline_type::DROP_TOPIC)
            .await?
            .map(|due_date| due_date.due_at),
    };
    if drop_deadline.is_some_and(|due_at| due_at < ctx.now) {
        return Ok(refuse(&SignUpSheetError::DeadlinePassed, actor, location));
    }

    let Some(release) = repo.release_signup(team.id, topic_id).await? else {
        return Ok(refuse(&SignUpSheetError::NotSignedUp, actor, location));
    };
    info!(
        team_id = team.id,
        topic_id,
        promoted = ?release.promoted.as_ref().map(|signup| signup.team_id),
        "dropped signup"
    );
    let message = match actor {
        Actor::Student => "You have successfully dropped your topic!",
        Actor::Instructor => "You have successfully dropped the student from the topic!",
    };
    Ok(Outcome::redirect(location).with_flash(Flash::success(message)))
}
