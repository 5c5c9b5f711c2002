use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{
    assignment_due_dates, assignments, bids, participants, sign_up_topics, signed_up_teams, teams,
    topic_due_dates, users,
};

pub type UserId = i32;
pub type AssignmentId = i32;
pub type TopicId = i32;
pub type TeamId = i32;
pub type ParticipantId = i32;
pub type SignUpId = i32;
pub type BidId = i32;
pub type DueDateId = i32;
pub type DeadlineTypeId = i32;

/// Well-known `deadline_type_id` values.
pub mod deadline_type {
    use super::DeadlineTypeId;

    pub const SUBMISSION: DeadlineTypeId = 1;
    pub const REVIEW: DeadlineTypeId = 2;
    pub const METAREVIEW: DeadlineTypeId = 5;
    pub const DROP_TOPIC: DeadlineTypeId = 6;
    pub const SIGN_UP: DeadlineTypeId = 7;
    pub const TEAM_FORMATION: DeadlineTypeId = 8;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    TeachingAssistant,
    Instructor,
    Administrator,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::TeachingAssistant => "teaching_assistant",
            Self::Instructor => "instructor",
            Self::Administrator => "administrator",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "student" => Some(Self::Student),
            "teaching_assistant" => Some(Self::TeachingAssistant),
            "instructor" => Some(Self::Instructor),
            "administrator" => Some(Self::Administrator),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_staff(self) -> bool {
        !matches!(self, Self::Student)
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: String,
}

impl User {
    /// Unknown role strings get the least privileged role.
    #[must_use]
    pub fn role(&self) -> Role {
        Role::parse(&self.role).unwrap_or(Role::Student)
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = assignments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Assignment {
    pub id: AssignmentId,
    pub name: String,
    pub instructor_id: UserId,
    pub is_intelligent: bool,
    pub staggered_deadline: bool,
    pub microtask: bool,
    pub max_team_size: i32,
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = assignments)]
pub struct NewAssignment {
    pub name: String,
    pub instructor_id: UserId,
    pub is_intelligent: bool,
    pub staggered_deadline: bool,
    pub microtask: bool,
    pub max_team_size: i32,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = assignment_due_dates)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AssignmentDueDate {
    pub id: DueDateId,
    pub assignment_id: AssignmentId,
    pub deadline_type_id: DeadlineTypeId,
    pub due_at: DateTime<Utc>,
}

impl AssignmentDueDate {
    #[must_use]
    pub fn has_passed(&self, now: DateTime<Utc>) -> bool {
        self.due_at < now
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = sign_up_topics)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Topic {
    pub id: TopicId,
    pub assignment_id: AssignmentId,
    pub topic_identifier: String,
    pub topic_name: String,
    pub category: Option<String>,
    pub max_choosers: i32,
    pub description: Option<String>,
    pub link: Option<String>,
    pub micropayment: i32,
    /// Set for a topic suggested by a team that has not been approved for everyone yet.
    pub private_to: Option<TeamId>,
}

impl Topic {
    #[must_use]
    pub fn visible_to(&self, team_id: Option<TeamId>) -> bool {
        self.private_to.is_none() || self.private_to == team_id
    }
}

/// The user editable part of a topic.
#[derive(Insertable, AsChangeset, Debug, Clone, PartialEq, Eq, Default)]
#[diesel(table_name = sign_up_topics)]
#[diesel(treat_none_as_null = true)]
pub struct TopicAttributes {
    pub topic_identifier: String,
    pub topic_name: String,
    pub category: Option<String>,
    pub max_choosers: i32,
    pub description: Option<String>,
    pub link: Option<String>,
    pub micropayment: i32,
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = sign_up_topics)]
pub struct NewTopic {
    pub assignment_id: AssignmentId,
    #[diesel(embed)]
    pub attributes: TopicAttributes,
    pub private_to: Option<TeamId>,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = teams)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Team {
    pub id: TeamId,
    pub assignment_id: AssignmentId,
    pub name: String,
    pub submitted_files: Vec<String>,
    pub submitted_hyperlinks: Vec<String>,
}

impl Team {
    #[must_use]
    pub fn has_submissions(&self) -> bool {
        !self.submitted_files.is_empty() || !self.submitted_hyperlinks.is_empty()
    }
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = teams)]
pub struct NewTeam {
    pub assignment_id: AssignmentId,
    pub name: String,
    pub submitted_files: Vec<String>,
    pub submitted_hyperlinks: Vec<String>,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = participants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Participant {
    pub id: ParticipantId,
    pub user_id: UserId,
    pub assignment_id: AssignmentId,
    pub team_id: Option<TeamId>,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = signed_up_teams)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SignedUpTeam {
    pub id: SignUpId,
    pub topic_id: TopicId,
    pub team_id: TeamId,
    pub is_waitlisted: bool,
}

#[derive(Insertable, Debug, Clone, Copy, PartialEq, Eq)]
#[diesel(table_name = signed_up_teams)]
pub struct NewSignedUpTeam {
    pub topic_id: TopicId,
    pub team_id: TeamId,
    pub is_waitlisted: bool,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = bids)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Bid {
    pub id: BidId,
    pub topic_id: TopicId,
    pub team_id: TeamId,
    /// Lower is more preferred, starting at 1.
    pub priority: i32,
}

#[derive(Insertable, Debug, Clone, Copy, PartialEq, Eq)]
#[diesel(table_name = bids)]
pub struct NewBid {
    pub topic_id: TopicId,
    pub team_id: TeamId,
    pub priority: i32,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = topic_due_dates)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TopicDueDate {
    pub id: DueDateId,
    pub topic_id: TopicId,
    pub deadline_type_id: DeadlineTypeId,
    pub round: i32,
    pub due_at: DateTime<Utc>,
}

impl TopicDueDate {
    #[must_use]
    pub fn has_passed(&self, now: DateTime<Utc>) -> bool {
        self.due_at < now
    }
}

#[derive(Insertable, Debug, Clone, Copy, PartialEq, Eq)]
#[diesel(table_name = topic_due_dates)]
pub struct NewTopicDueDate {
    pub topic_id: TopicId,
    pub deadline_type_id: DeadlineTypeId,
    pub round: i32,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SlotCount {
    pub topic_id: TopicId,
    pub filled: i64,
    pub waitlisted: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicUpdate {
    pub topic: Topic,
    pub promoted: Vec<SignedUpTeam>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub removed: SignedUpTeam,
    pub promoted: Option<SignedUpTeam>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSwitch {
    pub topic: Topic,
    pub signup: SignedUpTeam,
    /// The team that got the slot the switching team left behind.
    pub promoted: Option<SignedUpTeam>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueDateUpsert {
    pub due_date: TopicDueDate,
    pub created: bool,
}
