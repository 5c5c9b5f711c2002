use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    AssignmentsRepo, BidsRepo, DueDatesRepo, ParticipantsRepo, SignUpsRepo, TeamsRepo, TopicsRepo,
    UsersRepo,
};
use crate::error::{DatabaseError, Result};
use crate::models::{
    Assignment, AssignmentDueDate, AssignmentId, Bid, DeadlineTypeId, DueDateUpsert,
    NewAssignment, NewTopic, NewTopicDueDate, Participant, ParticipantId, Release, Role,
    SignedUpTeam, SlotCount, Team, TeamId, Topic, TopicAttributes, TopicDueDate, TopicId,
    TopicSwitch, TopicUpdate, User, UserId,
};
use crate::slots::{self, Overflow, Reservation, ReservationPlan};

#[derive(Debug, Default)]
struct Data {
    last_id: i32,
    users: Vec<User>,
    assignments: Vec<Assignment>,
    assignment_due_dates: Vec<AssignmentDueDate>,
    topics: Vec<Topic>,
    teams: Vec<Team>,
    participants: Vec<Participant>,
    signed_up_teams: Vec<SignedUpTeam>,
    bids: Vec<Bid>,
    topic_due_dates: Vec<TopicDueDate>,
}

impl Data {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn topic(&self, topic_id: TopicId) -> Option<&Topic> {
        self.topics.iter().find(|topic| topic.id == topic_id)
    }

    fn active_on_topic(&self, topic_id: TopicId) -> i64 {
        let count = self
            .signed_up_teams
            .iter()
            .filter(|signup| signup.topic_id == topic_id && !signup.is_waitlisted)
            .count();
        i64::try_from(count).unwrap_or(i64::MAX)
    }

    fn drop_waitlist_of_team(&mut self, team_id: TeamId) {
        self.signed_up_teams
            .retain(|signup| !(signup.team_id == team_id && signup.is_waitlisted));
    }

    /// Fills the open slots of a topic from its waitlist.
    fn promote_waitlisted(&mut self, topic_id: TopicId) -> Vec<SignedUpTeam> {
        let Some(topic) = self.topic(topic_id) else {
            return Vec::new();
        };
        let open =
            usize::try_from(slots::open_slots(topic, self.active_on_topic(topic_id))).unwrap_or(0);
        let topic_signups: Vec<SignedUpTeam> = self
            .signed_up_teams
            .iter()
            .filter(|signup| signup.topic_id == topic_id)
            .cloned()
            .collect();
        let mut promoted = Vec::with_capacity(open);
        for waiting in slots::waitlist(&topic_signups) {
            if promoted.len() == open {
                break;
            }
            let team_signups: Vec<SignedUpTeam> = self
                .signed_up_teams
                .iter()
                .filter(|signup| signup.team_id == waiting.team_id)
                .cloned()
                .collect();
            if !slots::may_promote(waiting, &team_signups) {
                continue;
            }
            self.signed_up_teams.retain(|signup| {
                !(signup.team_id == waiting.team_id
                    && signup.is_waitlisted
                    && signup.id != waiting.id)
            });
            if let Some(signup) = self
                .signed_up_teams
                .iter_mut()
                .find(|signup| signup.id == waiting.id)
            {
                signup.is_waitlisted = false;
                promoted.push(signup.clone());
            }
        }
        promoted
    }
}

/// Repository kept in process memory. Every operation runs in a single critical
/// section, which makes the slot reservation atomic.
#[derive(Clone, Debug, Default)]
pub struct MemoryRepo {
    conn: Arc<Mutex<Data>>,
}

impl MemoryRepo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository with one assignment to try things out: an instructor, three
    /// students without a team and a few topics. Also returns the users to log in as.
    pub async fn with_demo_data() -> Result<(Self, Assignment, Vec<User>)> {
        let repo = Self::new();
        let instructor = repo.user_insert("instructor6", Role::Instructor)?;
        let assignment = repo.assignment_insert(NewAssignment {
            name: "OSS project".to_owned(),
            instructor_id: instructor.id,
            is_intelligent: false,
            staggered_deadline: false,
            microtask: false,
            max_team_size: 3,
        })?;
        for (identifier, name, max_choosers) in [
            ("E1", "Refactor the mailer", 1),
            ("E2", "Speed up search", 2),
            ("E3", "Fix the importer", 1),
        ] {
            repo.topic_create(NewTopic {
                assignment_id: assignment.id,
                attributes: TopicAttributes {
                    topic_identifier: identifier.to_owned(),
                    topic_name: name.to_owned(),
                    max_choosers,
                    ..TopicAttributes::default()
                },
                private_to: None,
            })
            .await?;
        }
        let mut users = vec![instructor];
        for name in ["alice", "bob", "carol"] {
            let student = repo.user_insert(name, Role::Student)?;
            repo.participant_insert(assignment.id, student.id)?;
            users.push(student);
        }
        Ok((repo, assignment, users))
    }

    fn data(&self) -> Result<MutexGuard<'_, Data>> {
        self.conn.lock().map_err(|_| DatabaseError::Poisoned)
    }

    // The records below are owned by other parts of the course management system,
    // these helpers exist to seed the in-memory repository.

    pub fn user_insert(&self, name: &str, role: Role) -> Result<User> {
        let mut data = self.data()?;
        let user = User {
            id: data.next_id(),
            name: name.to_owned(),
            role: role.as_str().to_owned(),
        };
        data.users.push(user.clone());
        Ok(user)
    }

    pub fn assignment_insert(&self, assignment: NewAssignment) -> Result<Assignment> {
        let mut data = self.data()?;
        let assignment = Assignment {
            id: data.next_id(),
            name: assignment.name,
            instructor_id: assignment.instructor_id,
            is_intelligent: assignment.is_intelligent,
            staggered_deadline: assignment.staggered_deadline,
            microtask: assignment.microtask,
            max_team_size: assignment.max_team_size,
        };
        data.assignments.push(assignment.clone());
        Ok(assignment)
    }

    pub fn assignment_due_date_insert(
        &self,
        assignment_id: AssignmentId,
        deadline_type_id: DeadlineTypeId,
        due_at: DateTime<Utc>,
    ) -> Result<AssignmentDueDate> {
        let mut data = self.data()?;
        let due_date = AssignmentDueDate {
            id: data.next_id(),
            assignment_id,
            deadline_type_id,
            due_at,
        };
        data.assignment_due_dates.push(due_date.clone());
        Ok(due_date)
    }

    pub fn participant_insert(
        &self,
        assignment_id: AssignmentId,
        user_id: UserId,
    ) -> Result<Participant> {
        let mut data = self.data()?;
        let participant = Participant {
            id: data.next_id(),
            user_id,
            assignment_id,
            team_id: None,
        };
        data.participants.push(participant.clone());
        Ok(participant)
    }

    pub fn team_add_member(&self, team_id: TeamId, participant_id: ParticipantId) -> Result<()> {
        let mut data = self.data()?;
        let participant = data
            .participants
            .iter_mut()
            .find(|participant| participant.id == participant_id)
            .ok_or(DatabaseError::Missing {
                entity: "participant",
                id: participant_id,
            })?;
        participant.team_id = Some(team_id);
        Ok(())
    }

    pub fn team_add_submission(
        &self,
        team_id: TeamId,
        file: Option<&str>,
        hyperlink: Option<&str>,
    ) -> Result<Team> {
        let mut data = self.data()?;
        let team = data
            .teams
            .iter_mut()
            .find(|team| team.id == team_id)
            .ok_or(DatabaseError::Missing {
                entity: "team",
                id: team_id,
            })?;
        team.submitted_files.extend(file.map(str::to_owned));
        team.submitted_hyperlinks.extend(hyperlink.map(str::to_owned));
        Ok(team.clone())
    }

    pub fn signups_for_topic(&self, topic_id: TopicId) -> Result<Vec<SignedUpTeam>> {
        let data = self.data()?;
        Ok(data
            .signed_up_teams
            .iter()
            .filter(|signup| signup.topic_id == topic_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UsersRepo for MemoryRepo {
    async fn user_try_load(&self, user_id: UserId) -> Result<Option<User>> {
        let data = self.data()?;
        Ok(data.users.iter().find(|user| user.id == user_id).cloned())
    }

    async fn user_try_load_by_name(&self, name: &str) -> Result<Option<User>> {
        let data = self.data()?;
        Ok(data.users.iter().find(|user| user.name == name).cloned())
    }
}

#[async_trait]
impl AssignmentsRepo for MemoryRepo {
    async fn assignment_try_load(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<Option<Assignment>> {
        let data = self.data()?;
        Ok(data
            .assignments
            .iter()
            .find(|assignment| assignment.id == assignment_id)
            .cloned())
    }

    async fn assignment_due_date(
        &self,
        assignment_id: AssignmentId,
        deadline_type_id: DeadlineTypeId,
    ) -> Result<Option<AssignmentDueDate>> {
        let data = self.data()?;
        Ok(data
            .assignment_due_dates
            .iter()
            .find(|due_date| {
                due_date.assignment_id == assignment_id
                    && due_date.deadline_type_id == deadline_type_id
            })
            .cloned())
    }
}

#[async_trait]
impl ParticipantsRepo for MemoryRepo {
    async fn participant_find(
        &self,
        assignment_id: AssignmentId,
        user_id: UserId,
    ) -> Result<Option<Participant>> {
        let data = self.data()?;
        Ok(data
            .participants
            .iter()
            .find(|participant| {
                participant.assignment_id == assignment_id && participant.user_id == user_id
            })
            .cloned())
    }

    async fn team_members(&self, team_id: TeamId) -> Result<Vec<(Participant, User)>> {
        let data = self.data()?;
        Ok(data
            .participants
            .iter()
            .filter(|participant| participant.team_id == Some(team_id))
            .filter_map(|participant| {
                data.users
                    .iter()
                    .find(|user| user.id == participant.user_id)
                    .map(|user| (participant.clone(), user.clone()))
            })
            .collect())
    }
}

#[async_trait]
impl TeamsRepo for MemoryRepo {
    async fn team_try_load(&self, team_id: TeamId) -> Result<Option<Team>> {
        let data = self.data()?;
        Ok(data.teams.iter().find(|team| team.id == team_id).cloned())
    }

    async fn team_create_for(&self, participant_id: ParticipantId, name: &str) -> Result<Team> {
        let mut data = self.data()?;
        let participant = data
            .participants
            .iter()
            .find(|participant| participant.id == participant_id)
            .cloned()
            .ok_or(DatabaseError::Missing {
                entity: "participant",
                id: participant_id,
            })?;
        if let Some(team_id) = participant.team_id {
            return data
                .teams
                .iter()
                .find(|team| team.id == team_id)
                .cloned()
                .ok_or(DatabaseError::Missing {
                    entity: "team",
                    id: team_id,
                });
        }
        let team = Team {
            id: data.next_id(),
            assignment_id: participant.assignment_id,
            name: name.to_owned(),
            submitted_files: Vec::new(),
            submitted_hyperlinks: Vec::new(),
        };
        data.teams.push(team.clone());
        if let Some(participant) = data
            .participants
            .iter_mut()
            .find(|participant| participant.id == participant_id)
        {
            participant.team_id = Some(team.id);
        }
        Ok(team)
    }
}

#[async_trait]
impl TopicsRepo for MemoryRepo {
    async fn topic_try_load(&self, topic_id: TopicId) -> Result<Option<Topic>> {
        let data = self.data()?;
        Ok(data.topic(topic_id).cloned())
    }

    async fn topic_find_by_name(
        &self,
        assignment_id: AssignmentId,
        topic_name: &str,
    ) -> Result<Option<Topic>> {
        let data = self.data()?;
        Ok(data
            .topics
            .iter()
            .find(|topic| topic.assignment_id == assignment_id && topic.topic_name == topic_name)
            .cloned())
    }

    async fn topics_for_assignment(&self, assignment_id: AssignmentId) -> Result<Vec<Topic>> {
        let data = self.data()?;
        Ok(data
            .topics
            .iter()
            .filter(|topic| topic.assignment_id == assignment_id)
            .cloned()
            .collect())
    }

    async fn topic_create(&self, topic: NewTopic) -> Result<Topic> {
        let mut data = self.data()?;
        let NewTopic {
            assignment_id,
            attributes,
            private_to,
        } = topic;
        let topic = Topic {
            id: data.next_id(),
            assignment_id,
            topic_identifier: attributes.topic_identifier,
            topic_name: attributes.topic_name,
            category: attributes.category,
            max_choosers: attributes.max_choosers,
            description: attributes.description,
            link: attributes.link,
            micropayment: attributes.micropayment,
            private_to,
        };
        data.topics.push(topic.clone());
        Ok(topic)
    }

    async fn topic_update(
        &self,
        topic_id: TopicId,
        attributes: TopicAttributes,
    ) -> Result<Option<TopicUpdate>> {
        let mut data = self.data()?;
        let Some(topic) = data.topics.iter_mut().find(|topic| topic.id == topic_id) else {
            return Ok(None);
        };
        topic.topic_identifier = attributes.topic_identifier;
        topic.topic_name = attributes.topic_name;
        topic.category = attributes.category;
        topic.max_choosers = attributes.max_choosers;
        topic.description = attributes.description;
        topic.link = attributes.link;
        topic.micropayment = attributes.micropayment;
        let topic = topic.clone();
        let promoted = data.promote_waitlisted(topic_id);
        Ok(Some(TopicUpdate { topic, promoted }))
    }

    async fn topic_delete(&self, topic_id: TopicId) -> Result<Option<Topic>> {
        let mut data = self.data()?;
        let Some(index) = data.topics.iter().position(|topic| topic.id == topic_id) else {
            return Ok(None);
        };
        let topic = data.topics.remove(index);
        data.signed_up_teams
            .retain(|signup| signup.topic_id != topic_id);
        data.bids.retain(|bid| bid.topic_id != topic_id);
        data.topic_due_dates
            .retain(|due_date| due_date.topic_id != topic_id);
        Ok(Some(topic))
    }

    async fn slot_counts(&self, assignment_id: AssignmentId) -> Result<Vec<SlotCount>> {
        let data = self.data()?;
        Ok(slots::count_slots(
            data.signed_up_teams
                .iter()
                .filter(|signup| {
                    data.topic(signup.topic_id)
                        .is_some_and(|topic| topic.assignment_id == assignment_id)
                })
                .map(|signup| (signup.topic_id, signup.is_waitlisted)),
        ))
    }
}

#[async_trait]
impl SignUpsRepo for MemoryRepo {
    async fn signups_for_team(&self, team_id: TeamId) -> Result<Vec<SignedUpTeam>> {
        let data = self.data()?;
        Ok(data
            .signed_up_teams
            .iter()
            .filter(|signup| signup.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn reserve_slot(
        &self,
        team_id: TeamId,
        topic_id: TopicId,
        overflow: Overflow,
    ) -> Result<Reservation> {
        let mut data = self.data()?;
        let topic = data.topic(topic_id).cloned().ok_or(DatabaseError::Missing {
            entity: "topic",
            id: topic_id,
        })?;
        let team_signups: Vec<SignedUpTeam> = data
            .signed_up_teams
            .iter()
            .filter(|signup| signup.team_id == team_id)
            .cloned()
            .collect();
        let active = data.active_on_topic(topic_id);
        match slots::plan_reservation(&topic, &team_signups, active, overflow) {
            ReservationPlan::AlreadySignedUp => Ok(Reservation::AlreadySignedUp),
            ReservationPlan::AlreadyListed => Ok(Reservation::AlreadyListed),
            ReservationPlan::Full => Ok(Reservation::Full),
            ReservationPlan::Insert { waitlisted } => {
                if !waitlisted {
                    data.drop_waitlist_of_team(team_id);
                }
                let signup = SignedUpTeam {
                    id: data.next_id(),
                    topic_id,
                    team_id,
                    is_waitlisted: waitlisted,
                };
                data.signed_up_teams.push(signup.clone());
                Ok(Reservation::Reserved(signup))
            }
        }
    }

    async fn release_signup(&self, team_id: TeamId, topic_id: TopicId) -> Result<Option<Release>> {
        let mut data = self.data()?;
        let Some(index) = data
            .signed_up_teams
            .iter()
            .position(|signup| signup.team_id == team_id && signup.topic_id == topic_id)
        else {
            return Ok(None);
        };
        let removed = data.signed_up_teams.remove(index);
        let promoted = if removed.is_waitlisted {
            None
        } else {
            data.promote_waitlisted(topic_id).into_iter().next()
        };
        Ok(Some(Release { removed, promoted }))
    }

    async fn switch_to_suggested_topic(
        &self,
        team_id: TeamId,
        topic_id: TopicId,
    ) -> Result<Option<TopicSwitch>> {
        let mut data = self.data()?;
        let Some(topic) = data
            .topics
            .iter_mut()
            .find(|topic| topic.id == topic_id && topic.private_to == Some(team_id))
        else {
            return Ok(None);
        };
        topic.private_to = None;
        let topic = topic.clone();

        data.drop_waitlist_of_team(team_id);
        let active = data
            .signed_up_teams
            .iter_mut()
            .find(|signup| signup.team_id == team_id && !signup.is_waitlisted);
        let (signup, original_topic) = if let Some(active) = active {
            let original_topic = active.topic_id;
            active.topic_id = topic_id;
            (active.clone(), Some(original_topic))
        } else {
            let signup = SignedUpTeam {
                id: data.next_id(),
                topic_id,
                team_id,
                is_waitlisted: false,
            };
            data.signed_up_teams.push(signup.clone());
            (signup, None)
        };
        let promoted = original_topic
            .filter(|original| *original != topic_id)
            .and_then(|original| data.promote_waitlisted(original).into_iter().next());
        Ok(Some(TopicSwitch {
            topic,
            signup,
            promoted,
        }))
    }
}

#[async_trait]
impl BidsRepo for MemoryRepo {
    async fn bids_for_team(&self, team_id: TeamId) -> Result<Vec<Bid>> {
        let data = self.data()?;
        let mut bids: Vec<Bid> = data
            .bids
            .iter()
            .filter(|bid| bid.team_id == team_id)
            .cloned()
            .collect();
        bids.sort_by_key(|bid| (bid.priority, bid.id));
        Ok(bids)
    }

    async fn bid_set_priority(
        &self,
        team_id: TeamId,
        topic_id: TopicId,
        priority: Option<i32>,
    ) -> Result<Vec<Bid>> {
        let mut data = self.data()?;
        let current: Vec<Bid> = data
            .bids
            .iter()
            .filter(|bid| bid.team_id == team_id)
            .cloned()
            .collect();
        let ordering = slots::reorder_bids(&current, topic_id, priority);
        data.bids.retain(|bid| bid.team_id != team_id);
        let mut bids = Vec::with_capacity(ordering.len());
        for (topic_id, priority) in ordering {
            let id = current
                .iter()
                .find(|bid| bid.topic_id == topic_id)
                .map_or_else(|| data.next_id(), |bid| bid.id);
            let bid = Bid {
                id,
                topic_id,
                team_id,
                priority,
            };
            data.bids.push(bid.clone());
            bids.push(bid);
        }
        Ok(bids)
    }
}

#[async_trait]
impl DueDatesRepo for MemoryRepo {
    async fn topic_due_dates_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<Vec<TopicDueDate>> {
        let data = self.data()?;
        Ok(data
            .topic_due_dates
            .iter()
            .filter(|due_date| {
                data.topic(due_date.topic_id)
                    .is_some_and(|topic| topic.assignment_id == assignment_id)
            })
            .cloned()
            .collect())
    }

    async fn topic_due_date(
        &self,
        topic_id: TopicId,
        deadline_type_id: DeadlineTypeId,
        round: i32,
    ) -> Result<Option<TopicDueDate>> {
        let data = self.data()?;
        Ok(data
            .topic_due_dates
            .iter()
            .find(|due_date| {
                due_date.topic_id == topic_id
                    && due_date.deadline_type_id == deadline_type_id
                    && due_date.round == round
            })
            .cloned())
    }

    async fn topic_due_date_upsert(&self, due_date: NewTopicDueDate) -> Result<DueDateUpsert> {
        let mut data = self.data()?;
        if let Some(existing) = data.topic_due_dates.iter_mut().find(|existing| {
            existing.topic_id == due_date.topic_id
                && existing.deadline_type_id == due_date.deadline_type_id
                && existing.round == due_date.round
        }) {
            existing.due_at = due_date.due_at;
            return Ok(DueDateUpsert {
                due_date: existing.clone(),
                created: false,
            });
        }
        let created = TopicDueDate {
            id: data.next_id(),
            topic_id: due_date.topic_id,
            deadline_type_id: due_date.deadline_type_id,
            round: due_date.round,
            due_at: due_date.due_at,
        };
        data.topic_due_dates.push(created.clone());
        Ok(DueDateUpsert {
            due_date: created,
            created: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;
    use crate::models::deadline_type;

    struct Fixture {
        repo: MemoryRepo,
        assignment: Assignment,
    }

    impl Fixture {
        fn new() -> Self {
            let repo = MemoryRepo::new();
            let instructor = repo.user_insert("instructor6", Role::Instructor).unwrap();
            let assignment = repo
                .assignment_insert(NewAssignment {
                    name: "OSS project".to_owned(),
                    instructor_id: instructor.id,
                    is_intelligent: false,
                    staggered_deadline: false,
                    microtask: false,
                    max_team_size: 3,
                })
                .unwrap();
            Self { repo, assignment }
        }

        async fn topic(&self, name: &str, max_choosers: i32) -> Topic {
            self.repo
                .topic_create(NewTopic {
                    assignment_id: self.assignment.id,
                    attributes: TopicAttributes {
                        topic_identifier: name.chars().take(3).collect(),
                        topic_name: name.to_owned(),
                        max_choosers,
                        ..TopicAttributes::default()
                    },
                    private_to: None,
                })
                .await
                .unwrap()
        }

        async fn team(&self, name: &str) -> Team {
            let user = self.repo.user_insert(name, Role::Student).unwrap();
            let participant = self
                .repo
                .participant_insert(self.assignment.id, user.id)
                .unwrap();
            self.repo
                .team_create_for(participant.id, &format!("{name} Team"))
                .await
                .unwrap()
        }
    }

    fn reserved(reservation: Reservation) -> SignedUpTeam {
        match reservation {
            Reservation::Reserved(signup) => signup,
            other => panic!("expected a reservation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn last_slot_goes_to_one_team_and_the_next_is_waitlisted() {
        let fixture = Fixture::new();
        let topic = fixture.topic("Refactoring", 1).await;
        let first = fixture.team("alice").await;
        let second = fixture.team("bob").await;

        let first_signup = reserved(
            fixture
                .repo
                .reserve_slot(first.id, topic.id, Overflow::Waitlist)
                .await
                .unwrap(),
        );
        let second_signup = reserved(
            fixture
                .repo
                .reserve_slot(second.id, topic.id, Overflow::Waitlist)
                .await
                .unwrap(),
        );
        assert!(!first_signup.is_waitlisted);
        assert!(second_signup.is_waitlisted);

        let counts = fixture.repo.slot_counts(fixture.assignment.id).await.unwrap();
        assert_eq!(
            counts,
            vec![SlotCount {
                topic_id: topic.id,
                filled: 1,
                waitlisted: 1
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_teams_race_for_the_last_slot() {
        let fixture = Fixture::new();
        let topic = fixture.topic("Caching", 1).await;
        let mut teams = Vec::new();
        for name in ["fay", "gus", "hal", "ida", "jon", "kim", "lou", "max"] {
            teams.push(fixture.team(name).await);
        }

        let tasks: Vec<_> = teams
            .iter()
            .map(|team| {
                let repo = fixture.repo.clone();
                let team_id = team.id;
                let topic_id = topic.id;
                tokio::spawn(async move {
                    repo.reserve_slot(team_id, topic_id, Overflow::Reject).await
                })
            })
            .collect();
        let mut reserved_count = 0;
        for task in tasks {
            match task.await.unwrap().unwrap() {
                Reservation::Reserved(signup) => {
                    assert!(!signup.is_waitlisted);
                    reserved_count += 1;
                }
                other => assert_eq!(other, Reservation::Full),
            }
        }
        assert_eq!(reserved_count, 1);

        let counts = fixture.repo.slot_counts(fixture.assignment.id).await.unwrap();
        assert_eq!(
            counts,
            vec![SlotCount {
                topic_id: topic.id,
                filled: 1,
                waitlisted: 0
            }]
        );
    }

    #[tokio::test]
    async fn second_sign_up_of_an_assigned_team_is_refused() {
        let fixture = Fixture::new();
        let one = fixture.topic("One", 2).await;
        let two = fixture.topic("Two", 2).await;
        let team = fixture.team("carol").await;

        reserved(
            fixture
                .repo
                .reserve_slot(team.id, one.id, Overflow::Waitlist)
                .await
                .unwrap(),
        );
        let again = fixture
            .repo
            .reserve_slot(team.id, two.id, Overflow::Waitlist)
            .await
            .unwrap();
        assert_eq!(again, Reservation::AlreadySignedUp);
        assert_eq!(fixture.repo.signups_for_team(team.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn getting_a_slot_drops_the_other_waitlist_entries() {
        let fixture = Fixture::new();
        let full = fixture.topic("Full", 1).await;
        let open = fixture.topic("Open", 1).await;
        let holder = fixture.team("dave").await;
        let team = fixture.team("erin").await;

        reserved(
            fixture
                .repo
                .reserve_slot(holder.id, full.id, Overflow::Waitlist)
                .await
                .unwrap(),
        );
        assert!(
            reserved(
                fixture
                    .repo
                    .reserve_slot(team.id, full.id, Overflow::Waitlist)
                    .await
                    .unwrap()
            )
            .is_waitlisted
        );
        assert!(
            !reserved(
                fixture
                    .repo
                    .reserve_slot(team.id, open.id, Overflow::Waitlist)
                    .await
                    .unwrap()
            )
            .is_waitlisted
        );

        let signups = fixture.repo.signups_for_team(team.id).await.unwrap();
        assert_eq!(signups.len(), 1);
        assert_eq!(signups[0].topic_id, open.id);
    }

    #[tokio::test]
    async fn releasing_an_active_slot_promotes_the_first_waitlisted_team() {
        let fixture = Fixture::new();
        let topic = fixture.topic("Caching", 1).await;
        let holder = fixture.team("frank").await;
        let first_waiting = fixture.team("grace").await;
        let second_waiting = fixture.team("heidi").await;
        for team in [&holder, &first_waiting, &second_waiting] {
            fixture
                .repo
                .reserve_slot(team.id, topic.id, Overflow::Waitlist)
                .await
                .unwrap();
        }

        let release = fixture
            .repo
            .release_signup(holder.id, topic.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!release.removed.is_waitlisted);
        let promoted = release.promoted.unwrap();
        assert_eq!(promoted.team_id, first_waiting.id);
        assert!(!promoted.is_waitlisted);

        let waiting = fixture.repo.signups_for_topic(topic.id).unwrap();
        assert!(waiting
            .iter()
            .any(|signup| signup.team_id == second_waiting.id && signup.is_waitlisted));
        assert!(fixture
            .repo
            .release_signup(holder.id, topic.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn raising_capacity_promotes_waitlisted_teams() {
        let fixture = Fixture::new();
        let topic = fixture.topic("Search", 1).await;
        let holder = fixture.team("ivan").await;
        let waiting = fixture.team("judy").await;
        for team in [&holder, &waiting] {
            fixture
                .repo
                .reserve_slot(team.id, topic.id, Overflow::Waitlist)
                .await
                .unwrap();
        }

        let update = fixture
            .repo
            .topic_update(
                topic.id,
                TopicAttributes {
                    topic_identifier: "S".to_owned(),
                    topic_name: "Search".to_owned(),
                    max_choosers: 2,
                    ..TopicAttributes::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.topic.max_choosers, 2);
        assert_eq!(update.promoted.len(), 1);
        assert_eq!(update.promoted[0].team_id, waiting.id);
    }

    #[tokio::test]
    async fn deleting_a_topic_removes_its_signups_and_bids() {
        let fixture = Fixture::new();
        let topic = fixture.topic("Legacy", 1).await;
        let team = fixture.team("mallory").await;
        fixture
            .repo
            .reserve_slot(team.id, topic.id, Overflow::Waitlist)
            .await
            .unwrap();
        fixture
            .repo
            .bid_set_priority(team.id, topic.id, Some(1))
            .await
            .unwrap();

        assert!(fixture.repo.topic_delete(topic.id).await.unwrap().is_some());
        assert!(fixture.repo.signups_for_team(team.id).await.unwrap().is_empty());
        assert!(fixture.repo.bids_for_team(team.id).await.unwrap().is_empty());
        assert!(fixture.repo.topic_delete(topic.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn due_date_upsert_never_duplicates() {
        let fixture = Fixture::new();
        let topic = fixture.topic("Deadlines", 1).await;
        let first_due = Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 0).unwrap();
        let second_due = Utc.with_ymd_and_hms(2026, 3, 8, 23, 59, 0).unwrap();
        let new = |due_at| NewTopicDueDate {
            topic_id: topic.id,
            deadline_type_id: deadline_type::SUBMISSION,
            round: 1,
            due_at,
        };

        let created = fixture.repo.topic_due_date_upsert(new(first_due)).await.unwrap();
        let updated = fixture.repo.topic_due_date_upsert(new(second_due)).await.unwrap();
        assert!(created.created);
        assert!(!updated.created);
        assert_eq!(created.due_date.id, updated.due_date.id);

        let all = fixture
            .repo
            .topic_due_dates_for_assignment(fixture.assignment.id)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].due_at, second_due);
    }

    #[tokio::test]
    async fn switching_to_a_suggested_topic_frees_the_original_slot() {
        let fixture = Fixture::new();
        let original = fixture.topic("Original", 1).await;
        let team = fixture.team("niaj").await;
        let waiting = fixture.team("olivia").await;
        for signing_up in [&team, &waiting] {
            fixture
                .repo
                .reserve_slot(signing_up.id, original.id, Overflow::Waitlist)
                .await
                .unwrap();
        }
        let suggested = fixture
            .repo
            .topic_create(NewTopic {
                assignment_id: fixture.assignment.id,
                attributes: TopicAttributes {
                    topic_identifier: "SUG".to_owned(),
                    topic_name: "Suggested".to_owned(),
                    max_choosers: 1,
                    ..TopicAttributes::default()
                },
                private_to: Some(team.id),
            })
            .await
            .unwrap();

        assert!(fixture
            .repo
            .switch_to_suggested_topic(waiting.id, suggested.id)
            .await
            .unwrap()
            .is_none());

        let switch = fixture
            .repo
            .switch_to_suggested_topic(team.id, suggested.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(switch.topic.private_to, None);
        assert_eq!(switch.signup.topic_id, suggested.id);
        assert_eq!(switch.promoted.unwrap().team_id, waiting.id);
    }

    #[tokio::test]
    async fn switching_replaces_a_waitlist_entry_on_the_suggested_topic() {
        let fixture = Fixture::new();
        let team = fixture.team("peggy").await;
        let suggested = fixture
            .repo
            .topic_create(NewTopic {
                assignment_id: fixture.assignment.id,
                attributes: TopicAttributes {
                    topic_identifier: "SUG".to_owned(),
                    topic_name: "Suggested".to_owned(),
                    max_choosers: 0,
                    ..TopicAttributes::default()
                },
                private_to: Some(team.id),
            })
            .await
            .unwrap();
        let queued = reserved(
            fixture
                .repo
                .reserve_slot(team.id, suggested.id, Overflow::Waitlist)
                .await
                .unwrap(),
        );
        assert!(queued.is_waitlisted);

        let switch = fixture
            .repo
            .switch_to_suggested_topic(team.id, suggested.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!switch.signup.is_waitlisted);
        assert_eq!(switch.promoted, None);
        let signups = fixture.repo.signups_for_team(team.id).await.unwrap();
        assert_eq!(signups, vec![switch.signup]);
    }

    #[tokio::test]
    async fn demo_data_has_an_assignment_to_sign_up_for() {
        let (repo, assignment, users) = MemoryRepo::with_demo_data().await.unwrap();
        assert_eq!(users.len(), 4);
        assert_eq!(users[0].id, assignment.instructor_id);
        for student in &users[1..] {
            let participant = repo
                .participant_find(assignment.id, student.id)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(participant.team_id, None);
        }
        let topics = repo.topics_for_assignment(assignment.id).await.unwrap();
        assert_eq!(topics.len(), 3);
    }
}
