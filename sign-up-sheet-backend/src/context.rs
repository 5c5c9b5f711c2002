use chrono::{DateTime, Utc};
use sign_up_sheet_database::models::{AssignmentId, Role, User};

use crate::error::AppError;
use crate::outcome::{assignment_edit_path, list_path};

/// Everything an action knows about the request it serves.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: User,
    /// Captured once per request, every deadline check compares against it.
    pub now: DateTime<Utc>,
}

impl RequestContext {
    #[must_use]
    pub const fn new(user: User, now: DateTime<Utc>) -> Self {
        Self { user, now }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.user.role()
    }

    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.role().is_staff() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

/// Who triggered a sign-up change. Decides the wording of messages and where the
/// user is sent afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Student,
    Instructor,
}

impl Actor {
    #[must_use]
    pub fn redirect_path(self, assignment_id: AssignmentId) -> String {
        match self {
            Self::Student => list_path(assignment_id),
            Self::Instructor => assignment_edit_path(assignment_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(role: Role) -> RequestContext {
        RequestContext::new(
            User {
                id: 1,
                name: "someone".to_owned(),
                role: role.as_str().to_owned(),
            },
            Utc::now(),
        )
    }

    #[test]
    fn only_staff_passes_the_staff_gate() {
        assert!(context(Role::Student).require_staff().is_err());
        assert!(context(Role::TeachingAssistant).require_staff().is_ok());
        assert!(context(Role::Instructor).require_staff().is_ok());
        assert!(context(Role::Administrator).require_staff().is_ok());
    }

    #[test]
    fn actors_return_to_their_own_page() {
        assert_eq!(Actor::Student.redirect_path(4), "/sign_up_sheet/list?id=4");
        assert_eq!(Actor::Instructor.redirect_path(4), "/assignments/4/edit");
    }
}
