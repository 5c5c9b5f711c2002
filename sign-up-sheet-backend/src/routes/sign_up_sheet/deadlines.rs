use sign_up_sheet_database::models::NewTopicDueDate;
use sign_up_sheet_database::repo::{DueDatesRepo as _, Repo, TopicsRepo as _};
use tracing::{info, instrument};

use super::refuse;
use crate::context::{Actor, RequestContext};
use crate::error::{AppError, SignUpSheetError};
use crate::forms::{parse_due_at, TopicDeadlineParams};
use crate::outcome::{assignment_edit_path, Outcome};

/// Sets the due date of one deadline type of a topic, round 1 unless given.
#[instrument(skip(repo, ctx))]
pub async fn save_topic_deadlines(
    repo: &dyn Repo,
    ctx: &RequestContext,
    params: TopicDeadlineParams,
) -> Result<Outcome, AppError> {
    ctx.require_staff()?;
    let topic = repo
        .topic_try_load(params.topic_id)
        .await?
        .ok_or(AppError::NotFound {
            entity: "topic",
            id: params.topic_id,
        })?;
    let location = assignment_edit_path(topic.assignment_id);
    let Some(due_at) = parse_due_at(&params.due_at) else {
        return Ok(refuse(
            &SignUpSheetError::ValidationFailure(format!(
                "\"{}\" is not a valid date.",
                params.due_at
            )),
            Actor::Instructor,
            location,
        ));
    };

    let upsert = repo
        .topic_due_date_upsert(NewTopicDueDate {
            topic_id: topic.id,
            deadline_type_id: params.deadline_type_id,
            round: params.round.unwrap_or(1),
            due_at,
        })
        .await?;
    info!(
        topic_id = topic.id,
        deadline_type_id = params.deadline_type_id,
        created = upsert.created,
        "saved topic deadline"
    );
    Ok(Outcome::redirect(location))
}
