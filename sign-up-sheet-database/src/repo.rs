mod diesel_pg;
mod memory;

use async_trait::async_trait;

pub use self::diesel_pg::DieselRepo;
pub use self::memory::MemoryRepo;
use crate::error::Result;
use crate::models::{
    Assignment, AssignmentDueDate, AssignmentId, Bid, DeadlineTypeId, DueDateUpsert, NewTopic,
    NewTopicDueDate, Participant, ParticipantId, Release, SignedUpTeam, SlotCount, Team, TeamId,
    Topic, TopicAttributes, TopicDueDate, TopicId, TopicSwitch, TopicUpdate, User, UserId,
};
use crate::slots::{Overflow, Reservation};

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn user_try_load(&self, user_id: UserId) -> Result<Option<User>>;
    async fn user_try_load_by_name(&self, name: &str) -> Result<Option<User>>;
}

#[async_trait]
pub trait AssignmentsRepo: Send + Sync {
    async fn assignment_try_load(&self, assignment_id: AssignmentId)
        -> Result<Option<Assignment>>;
    async fn assignment_due_date(
        &self,
        assignment_id: AssignmentId,
        deadline_type_id: DeadlineTypeId,
    ) -> Result<Option<AssignmentDueDate>>;
}

#[async_trait]
pub trait ParticipantsRepo: Send + Sync {
    async fn participant_find(
        &self,
        assignment_id: AssignmentId,
        user_id: UserId,
    ) -> Result<Option<Participant>>;
    async fn team_members(&self, team_id: TeamId) -> Result<Vec<(Participant, User)>>;
}

#[async_trait]
pub trait TeamsRepo: Send + Sync {
    async fn team_try_load(&self, team_id: TeamId) -> Result<Option<Team>>;
    /// Returns the participant's team, creating a single member team first if needed.
    async fn team_create_for(&self, participant_id: ParticipantId, name: &str) -> Result<Team>;
}

#[async_trait]
pub trait TopicsRepo: Send + Sync {
    async fn topic_try_load(&self, topic_id: TopicId) -> Result<Option<Topic>>;
    async fn topic_find_by_name(
        &self,
        assignment_id: AssignmentId,
        topic_name: &str,
    ) -> Result<Option<Topic>>;
    /// All topics of the assignment, including private ones, ordered by id.
    async fn topics_for_assignment(&self, assignment_id: AssignmentId) -> Result<Vec<Topic>>;
    async fn topic_create(&self, topic: NewTopic) -> Result<Topic>;
    /// Waitlisted teams are promoted when the new capacity leaves slots open.
    async fn topic_update(
        &self,
        topic_id: TopicId,
        attributes: TopicAttributes,
    ) -> Result<Option<TopicUpdate>>;
    /// Also removes the signups, bids and due dates of the topic.
    async fn topic_delete(&self, topic_id: TopicId) -> Result<Option<Topic>>;
    async fn slot_counts(&self, assignment_id: AssignmentId) -> Result<Vec<SlotCount>>;
}

#[async_trait]
pub trait SignUpsRepo: Send + Sync {
    async fn signups_for_team(&self, team_id: TeamId) -> Result<Vec<SignedUpTeam>>;
    /// Atomic check-and-reserve of a slot, see [`crate::slots::plan_reservation`].
    async fn reserve_slot(
        &self,
        team_id: TeamId,
        topic_id: TopicId,
        overflow: Overflow,
    ) -> Result<Reservation>;
    /// Removes the signup and hands a freed slot to the first waitlisted team.
    async fn release_signup(&self, team_id: TeamId, topic_id: TopicId) -> Result<Option<Release>>;
    /// Makes a topic suggested by the team public and moves the team onto it.
    /// `None` when the topic is missing or not private to the team.
    async fn switch_to_suggested_topic(
        &self,
        team_id: TeamId,
        topic_id: TopicId,
    ) -> Result<Option<TopicSwitch>>;
}

#[async_trait]
pub trait BidsRepo: Send + Sync {
    /// Ordered by ascending priority.
    async fn bids_for_team(&self, team_id: TeamId) -> Result<Vec<Bid>>;
    async fn bid_set_priority(
        &self,
        team_id: TeamId,
        topic_id: TopicId,
        priority: Option<i32>,
    ) -> Result<Vec<Bid>>;
}

#[async_trait]
pub trait DueDatesRepo: Send + Sync {
    async fn topic_due_dates_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<Vec<TopicDueDate>>;
    async fn topic_due_date(
        &self,
        topic_id: TopicId,
        deadline_type_id: DeadlineTypeId,
        round: i32,
    ) -> Result<Option<TopicDueDate>>;
    async fn topic_due_date_upsert(&self, due_date: NewTopicDueDate) -> Result<DueDateUpsert>;
}

pub trait Repo:
    UsersRepo
    + AssignmentsRepo
    + ParticipantsRepo
    + TeamsRepo
    + TopicsRepo
    + SignUpsRepo
    + BidsRepo
    + DueDatesRepo
    + std::fmt::Debug
{
}

impl<T> Repo for T where
    T: UsersRepo
        + AssignmentsRepo
        + ParticipantsRepo
        + TeamsRepo
        + TopicsRepo
        + SignUpsRepo
        + BidsRepo
        + DueDatesRepo
        + std::fmt::Debug
{
}
