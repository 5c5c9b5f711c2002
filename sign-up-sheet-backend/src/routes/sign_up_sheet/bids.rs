use sign_up_sheet_database::repo::{BidsRepo as _, Repo};
use tracing::{info, instrument};

use super::{ensure_team, load_assignment, participant_of, refuse, topic_of_assignment};
use crate::context::{Actor, RequestContext};
use crate::error::{AppError, SignUpSheetError};
use crate::forms::PriorityParams;
use crate::outcome::{list_path, Outcome};

#[instrument(skip(repo, ctx))]
pub async fn set_priority(
    repo: &dyn Repo,
    ctx: &RequestContext,
    params: PriorityParams,
) -> Result<Outcome, AppError> {
    let assignment = load_assignment(repo, params.id).await?;
    let location = list_path(assignment.id);
    if params.priority.is_some_and(|priority| priority < 1) {
        return Ok(refuse(
            &SignUpSheetError::ValidationFailure("Priority must be a positive number.".to_owned()),
            Actor::Student,
            location,
        ));
    }
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
    if visible.is_none() {
        return Ok(refuse(
            &SignUpSheetError::NotFound {
                entity: "topic",
                id: params.topic_id,
            },
            Actor::Student,
            location,
        ));
    }

    let bids = repo
        .bid_set_priority(team_id, params.topic_id, params.priority)
        .await?;
    info!(team_id, bids = bids.len(), "bids reordered");
    Ok(Outcome::redirect(location))
}
