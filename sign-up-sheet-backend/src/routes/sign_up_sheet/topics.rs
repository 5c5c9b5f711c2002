use serde::Serialize;
use sign_up_sheet_database::models::{Assignment, NewTopic, Topic, TopicDueDate};
use sign_up_sheet_database::repo::{DueDatesRepo as _, Repo, TopicsRepo as _};
use tracing::{info, instrument};

use super::{load_assignment, refuse, topic_of_assignment};
use crate::context::{Actor, RequestContext};
use crate::error::{AppError, SignUpSheetError};
use crate::flash::Flash;
use crate::forms::{
    AssignmentParams, ChangeTopicParams, CreateTopicParams, FieldError, TopicForm, TopicParams,
};
use crate::outcome::{assignment_edit_path, staggered_path, Outcome};

#[derive(Serialize)]
struct TopicFormPage<'a> {
    assignment: &'a Assignment,
    topic: &'a TopicForm,
    errors: &'a [FieldError],
}

#[derive(Serialize)]
struct EditPage<'a> {
    assignment_id: i32,
    topic: &'a Topic,
    form: TopicForm,
}

#[derive(Serialize)]
struct StaggeredTopic<'a> {
    topic: &'a Topic,
    due_dates: Vec<&'a TopicDueDate>,
}

#[derive(Serialize)]
struct StaggeredPage<'a> {
    assignment: &'a Assignment,
    topics: Vec<StaggeredTopic<'a>>,
}

#[instrument(skip(repo, ctx))]
pub async fn new(
    repo: &dyn Repo,
    ctx: &RequestContext,
    params: AssignmentParams,
) -> Result<Outcome, AppError> {
    ctx.require_staff()?;
    let assignment = load_assignment(repo, params.id).await?;
    Outcome::render(
        "new",
        &TopicFormPage {
            assignment: &assignment,
            topic: &TopicForm::default(),
            errors: &[],
        },
    )
}

/// Creates the topic, or updates the topic of the assignment with the given id (or,
/// without an id, the same name).
#[instrument(skip(repo, ctx, form))]
pub async fn create(
    repo: &dyn Repo,
    ctx: &RequestContext,
    params: CreateTopicParams,
    form: TopicForm,
) -> Result<Outcome, AppError> {
    ctx.require_staff()?;
    let assignment = load_assignment(repo, params.id).await?;
    let attributes = match form.validate() {
        Ok(attributes) => attributes,
        Err(errors) => {
            info!(assignment_id = assignment.id, "invalid topic form");
            let first = errors
                .first()
                .map_or_else(String::new, |error| error.message.clone());
            return Ok(Outcome::render(
                "new",
                &TopicFormPage {
                    assignment: &assignment,
                    topic: &form,
                    errors: &errors,
                },
            )?
            .with_flash(Flash::error(first)));
        }
    };

    let existing = match params.topic_id {
        Some(topic_id) => topic_of_assignment(repo, assignment.id, topic_id).await?,
        None => {
            repo.topic_find_by_name(assignment.id, &attributes.topic_name)
                .await?
        }
    };

    if let Some(existing) = existing {
        return Ok(match repo.topic_update(existing.id, attributes).await? {
            Some(update) => {
                info!(
                    topic_id = update.topic.id,
                    promoted = update.promoted.len(),
                    "updated existing topic"
                );
                Outcome::redirect(staggered_path(assignment.id)).with_flash(Flash::success(
                    format!(
                        "The topic: \"{}\" has been successfully updated.",
                        update.topic.topic_name
                    ),
                ))
            }
            None => Outcome::redirect(assignment_edit_path(assignment.id))
                .with_flash(Flash::error("The topic could not be updated.")),
        });
    }

    let topic = repo
        .topic_create(NewTopic {
            assignment_id: assignment.id,
            attributes,
            private_to: None,
        })
        .await?;
    info!(topic_id = topic.id, "created topic");
    Ok(
        Outcome::redirect(assignment_edit_path(assignment.id)).with_flash(Flash::success(
            format!(
                "The topic: \"{}\" has been created successfully.",
                topic.topic_name
            ),
        )),
    )
}

#[instrument(skip(repo, ctx))]
pub async fn destroy(
    repo: &dyn Repo,
    ctx: &RequestContext,
    params: ChangeTopicParams,
) -> Result<Outcome, AppError> {
    ctx.require_staff()?;
    let location = assignment_edit_path(params.assignment_id);
    let deleted = match topic_of_assignment(repo, params.assignment_id, params.id).await? {
        Some(topic) => repo.topic_delete(topic.id).await?,
        None => None,
    };
    Ok(match deleted {
        Some(topic) => {
            info!(topic_id = topic.id, "deleted topic");
            Outcome::redirect(location).with_flash(Flash::success(format!(
                "The topic: \"{}\" has been successfully deleted.",
                topic.topic_name
            )))
        }
        None => Outcome::redirect(location)
            .with_flash(Flash::error("The topic could not be deleted.")),
    })
}

#[instrument(skip(repo, ctx))]
pub async fn edit(
    repo: &dyn Repo,
    ctx: &RequestContext,
    params: TopicParams,
) -> Result<Outcome, AppError> {
    ctx.require_staff()?;
    let topic = repo
        .topic_try_load(params.id)
        .await?
        .ok_or(AppError::NotFound {
            entity: "topic",
            id: params.id,
        })?;
    let form = TopicForm::from(&topic);
    Outcome::render(
        "edit",
        &EditPage {
            assignment_id: topic.assignment_id,
            topic: &topic,
            form,
        },
    )
}

#[instrument(skip(repo, ctx, form))]
pub async fn update(
    repo: &dyn Repo,
    ctx: &RequestContext,
    params: ChangeTopicParams,
    form: TopicForm,
) -> Result<Outcome, AppError> {
    ctx.require_staff()?;
    let location = assignment_edit_path(params.assignment_id);
    let attributes = match form.validate() {
        Ok(attributes) => attributes,
        Err(errors) => {
            let message = errors
                .into_iter()
                .next()
                .map_or_else(String::new, |error| error.message);
            return Ok(refuse(
                &SignUpSheetError::ValidationFailure(message),
                Actor::Instructor,
                location,
            ));
        }
    };
    let updated = match topic_of_assignment(repo, params.assignment_id, params.id).await? {
        Some(topic) => repo.topic_update(topic.id, attributes).await?,
        None => None,
    };
    Ok(match updated {
        Some(update) => {
            info!(
                topic_id = update.topic.id,
                promoted = update.promoted.len(),
                "updated topic"
            );
            Outcome::redirect(location).with_flash(Flash::success(format!(
                "The topic: \"{}\" has been successfully updated.",
                update.topic.topic_name
            )))
        }
        None => Outcome::redirect(location)
            .with_flash(Flash::error("The topic could not be updated.")),
    })
}

/// The topics of an assignment next to their own deadlines.
#[instrument(skip(repo, ctx))]
pub async fn add_signup_topics_staggered(
    repo: &dyn Repo,
    ctx: &RequestContext,
    params: AssignmentParams,
) -> Result<Outcome, AppError> {
    ctx.require_staff()?;
    let assignment = load_assignment(repo, params.id).await?;
    let topics = repo.topics_for_assignment(assignment.id).await?;
    let due_dates = repo.topic_due_dates_for_assignment(assignment.id).await?;
    Outcome::render(
        "add_signup_topics_staggered",
        &StaggeredPage {
            assignment: &assignment,
            topics: topics
                .iter()
                .map(|topic| StaggeredTopic {
                    topic,
                    due_dates: due_dates
                        .iter()
                        .filter(|due_date| due_date.topic_id == topic.id)
                        .collect(),
                })
                .collect(),
        },
    )
}
