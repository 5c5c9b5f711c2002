pub mod sign_up_sheet;

use http::Method;
use serde::de::DeserializeOwned;
use sign_up_sheet_database::repo::Repo;

use self::sign_up_sheet::{bids, deadlines, list, signups, teams, topics};
use crate::context::RequestContext;
use crate::error::AppError;
use crate::forms::{CsrfSafeForm, Params, TopicForm};
use crate::outcome::Outcome;
use crate::session::Session;

pub const PREFIX: &str = "/sign_up_sheet/";

/// Every action of the sign-up sheet, reachable at `/sign_up_sheet/<action>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    New,
    Create,
    Destroy,
    Edit,
    Update,
    List,
    SignUp,
    SignupAsInstructor,
    DeleteSignup,
    DeleteSignupAsInstructor,
    SetPriority,
    SaveTopicDeadlines,
    ShowTeam,
    SwitchToSuggestedTopic,
    AddSignupTopicsStaggered,
}

impl Route {
    pub const ALL: [Self; 15] = [
        Self::New,
        Self::Create,
        Self::Destroy,
        Self::Edit,
        Self::Update,
        Self::List,
        Self::SignUp,
        Self::SignupAsInstructor,
        Self::DeleteSignup,
        Self::DeleteSignupAsInstructor,
        Self::SetPriority,
        Self::SaveTopicDeadlines,
        Self::ShowTeam,
        Self::SwitchToSuggestedTopic,
        Self::AddSignupTopicsStaggered,
    ];

    #[must_use]
    pub const fn action(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Create => "create",
            Self::Destroy => "destroy",
            Self::Edit => "edit",
            Self::Update => "update",
            Self::List => "list",
            Self::SignUp => "sign_up",
            Self::SignupAsInstructor => "signup_as_instructor_action",
            Self::DeleteSignup => "delete_signup",
            Self::DeleteSignupAsInstructor => "delete_signup_as_instructor",
            Self::SetPriority => "set_priority",
            Self::SaveTopicDeadlines => "save_topic_deadlines",
            Self::ShowTeam => "show_team",
            Self::SwitchToSuggestedTopic => "switch_original_topic_to_approved_suggested_topic",
            Self::AddSignupTopicsStaggered => "add_signup_topics_staggered",
        }
    }

    /// Pages are `GET`, everything that changes state is a `POST`.
    #[must_use]
    pub fn method(self) -> Method {
        match self {
            Self::New | Self::Edit | Self::List | Self::ShowTeam | Self::AddSignupTopicsStaggered => {
                Method::GET
            }
            _ => Method::POST,
        }
    }

    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let action = path.strip_prefix(PREFIX)?;
        Self::ALL.into_iter().find(|route| route.action() == action)
    }

    #[must_use]
    pub fn accepts(self, method: &Method) -> bool {
        let expected = self.method();
        *method == expected || (expected == Method::GET && *method == Method::HEAD)
    }
}

fn form<T: DeserializeOwned>(params: &Params, session: &Session) -> Result<T, AppError> {
    Ok(CsrfSafeForm::from_params(params, session)?.value)
}

pub async fn dispatch(
    repo: &dyn Repo,
    ctx: &RequestContext,
    session: &Session,
    route: Route,
    params: &Params,
) -> Result<Outcome, AppError> {
    match route {
        Route::New => topics::new(repo, ctx, form(params, session)?).await,
        Route::Create => {
            let create = form(params, session)?;
            topics::create(repo, ctx, create, params.decode::<TopicForm>()?).await
        }
        Route::Destroy => topics::destroy(repo, ctx, form(params, session)?).await,
        Route::Edit => topics::edit(repo, ctx, form(params, session)?).await,
        Route::Update => {
            let update = form(params, session)?;
            topics::update(repo, ctx, update, params.decode::<TopicForm>()?).await
        }
        Route::List => list::list(repo, ctx, form(params, session)?).await,
        Route::SignUp => signups::sign_up(repo, ctx, form(params, session)?).await,
        Route::SignupAsInstructor => {
            signups::signup_as_instructor_action(repo, ctx, form(params, session)?).await
        }
        Route::DeleteSignup => signups::delete_signup(repo, ctx, form(params, session)?).await,
        Route::DeleteSignupAsInstructor => {
            signups::delete_signup_as_instructor(repo, ctx, form(params, session)?).await
        }
        Route::SetPriority => bids::set_priority(repo, ctx, form(params, session)?).await,
        Route::SaveTopicDeadlines => {
            deadlines::save_topic_deadlines(repo, ctx, form(params, session)?).await
        }
        Route::ShowTeam => teams::show_team(repo, ctx, form(params, session)?).await,
        Route::SwitchToSuggestedTopic => {
            teams::switch_original_topic_to_approved_suggested_topic(
                repo,
                ctx,
                form(params, session)?,
            )
            .await
        }
        Route::AddSignupTopicsStaggered => {
            topics::add_signup_topics_staggered(repo, ctx, form(params, session)?).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_action_resolves_to_its_route() {
        for route in Route::ALL {
            assert_eq!(
                Route::from_path(&format!("/sign_up_sheet/{}", route.action())),
                Some(route)
            );
        }
        assert_eq!(Route::from_path("/sign_up_sheet/nope"), None);
        assert_eq!(Route::from_path("/list"), None);
    }

    #[test]
    fn pages_also_answer_head() {
        assert!(Route::List.accepts(&Method::HEAD));
        assert!(!Route::List.accepts(&Method::POST));
        assert!(Route::SignUp.accepts(&Method::POST));
        assert!(!Route::SignUp.accepts(&Method::GET));
    }
}
