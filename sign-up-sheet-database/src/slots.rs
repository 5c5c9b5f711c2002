//! Decisions shared by every repository implementation. The repositories load the
//! rows under a lock (or inside a transaction) and let these functions decide what
//! to write, so the in-memory and the postgres repository cannot drift apart.

use std::collections::BTreeMap;

use crate::models::{Bid, SignedUpTeam, SlotCount, Topic, TopicId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Put the team on the waitlist when every slot is taken.
    Waitlist,
    /// Give up when every slot is taken.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    Reserved(SignedUpTeam),
    /// The team holds an active signup.
    AlreadySignedUp,
    /// The team is already on the waitlist of this topic.
    AlreadyListed,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationPlan {
    AlreadySignedUp,
    AlreadyListed,
    Full,
    /// Insert a signup. An active (not waitlisted) insert also drops every waitlist
    /// entry the team holds elsewhere.
    Insert { waitlisted: bool },
}

#[must_use]
pub fn open_slots(topic: &Topic, active_on_topic: i64) -> i64 {
    (i64::from(topic.max_choosers) - active_on_topic).max(0)
}

/// `team_signups` are all signups of the team, `active_on_topic` is the number of
/// non-waitlisted signups the topic currently has.
#[must_use]
pub fn plan_reservation(
    topic: &Topic,
    team_signups: &[SignedUpTeam],
    active_on_topic: i64,
    overflow: Overflow,
) -> ReservationPlan {
    let holds_topic = team_signups.iter().any(|signup| !signup.is_waitlisted);
    let listed_here = team_signups
        .iter()
        .any(|signup| signup.topic_id == topic.id);
    if holds_topic {
        return ReservationPlan::AlreadySignedUp;
    }
    if listed_here {
        return ReservationPlan::AlreadyListed;
    }
    if open_slots(topic, active_on_topic) > 0 {
        ReservationPlan::Insert { waitlisted: false }
    } else {
        match overflow {
            Overflow::Waitlist => ReservationPlan::Insert { waitlisted: true },
            Overflow::Reject => ReservationPlan::Full,
        }
    }
}

/// Waitlisted signups of a topic in the order they get promoted (first come, first served).
#[must_use]
pub fn waitlist(topic_signups: &[SignedUpTeam]) -> Vec<&SignedUpTeam> {
    let mut waiting: Vec<&SignedUpTeam> = topic_signups
        .iter()
        .filter(|signup| signup.is_waitlisted)
        .collect();
    waiting.sort_by_key(|signup| signup.id);
    waiting
}

/// A waiting signup is promoted only while it is still on the waitlist and its team
/// holds no topic. `team_signups` are read after the team is locked.
#[must_use]
pub fn may_promote(waiting: &SignedUpTeam, team_signups: &[SignedUpTeam]) -> bool {
    let still_waiting = team_signups
        .iter()
        .any(|signup| signup.id == waiting.id && signup.is_waitlisted);
    let holds_topic = team_signups.iter().any(|signup| !signup.is_waitlisted);
    still_waiting && !holds_topic
}

/// Counts `(topic_id, is_waitlisted)` rows per topic.
#[must_use]
pub fn count_slots(rows: impl IntoIterator<Item = (TopicId, bool)>) -> Vec<SlotCount> {
    rows.into_iter()
        .fold(BTreeMap::<TopicId, SlotCount>::new(), |mut acc, (topic_id, waitlisted)| {
            let count = acc.entry(topic_id).or_insert(SlotCount {
                topic_id,
                ..SlotCount::default()
            });
            if waitlisted {
                count.waitlisted += 1;
            } else {
                count.filled += 1;
            }
            acc
        })
        .into_values()
        .collect()
}

/// Computes the `(topic_id, priority)` list of a team after moving `topic_id` to
/// `priority`, or removing it when `priority` is `None`. The result is numbered 1..n.
#[must_use]
pub fn reorder_bids(
    current: &[Bid],
    topic_id: TopicId,
    priority: Option<i32>,
) -> Vec<(TopicId, i32)> {
    let mut ordered: Vec<&Bid> = current.iter().collect();
    ordered.sort_by_key(|bid| (bid.priority, bid.id));
    let mut topics: Vec<TopicId> = ordered
        .into_iter()
        .map(|bid| bid.topic_id)
        .filter(|existing| *existing != topic_id)
        .collect();
    if let Some(priority) = priority {
        let index = usize::try_from(priority.saturating_sub(1))
            .unwrap_or(0)
            .min(topics.len());
        topics.insert(index, topic_id);
    }
    topics
        .into_iter()
        .zip(1..)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(id: TopicId, max_choosers: i32) -> Topic {
        Topic {
            id,
            assignment_id: 1,
            topic_identifier: format!("T{id}"),
            topic_name: format!("Topic {id}"),
            category: None,
            max_choosers,
            description: None,
            link: None,
            micropayment: 0,
            private_to: None,
        }
    }

    fn signup(id: i32, topic_id: TopicId, team_id: i32, is_waitlisted: bool) -> SignedUpTeam {
        SignedUpTeam {
            id,
            topic_id,
            team_id,
            is_waitlisted,
        }
    }

    fn bid(id: i32, topic_id: TopicId, priority: i32) -> Bid {
        Bid {
            id,
            topic_id,
            team_id: 1,
            priority,
        }
    }

    #[test]
    fn team_with_active_topic_cannot_reserve_again() {
        let plan = plan_reservation(
            &topic(2, 5),
            &[signup(1, 1, 7, false)],
            0,
            Overflow::Waitlist,
        );
        assert_eq!(plan, ReservationPlan::AlreadySignedUp);
    }

    #[test]
    fn waitlisted_team_may_try_another_topic() {
        let plan = plan_reservation(&topic(2, 1), &[signup(1, 1, 7, true)], 0, Overflow::Waitlist);
        assert_eq!(plan, ReservationPlan::Insert { waitlisted: false });
    }

    #[test]
    fn waitlisted_team_cannot_queue_twice_for_the_same_topic() {
        let plan = plan_reservation(&topic(1, 1), &[signup(1, 1, 7, true)], 1, Overflow::Waitlist);
        assert_eq!(plan, ReservationPlan::AlreadyListed);
    }

    #[test]
    fn team_that_got_a_topic_meanwhile_is_not_promoted() {
        let waiting = signup(4, 1, 7, true);
        assert!(may_promote(&waiting, &[waiting.clone(), signup(5, 2, 7, true)]));
        assert!(!may_promote(&waiting, &[waiting.clone(), signup(5, 2, 7, false)]));
        // gone or already promoted
        assert!(!may_promote(&waiting, &[signup(5, 2, 7, true)]));
        assert!(!may_promote(&waiting, &[signup(4, 1, 7, false)]));
    }

    #[test]
    fn full_topic_waitlists_or_rejects() {
        assert_eq!(
            plan_reservation(&topic(1, 2), &[], 2, Overflow::Waitlist),
            ReservationPlan::Insert { waitlisted: true }
        );
        assert_eq!(
            plan_reservation(&topic(1, 2), &[], 2, Overflow::Reject),
            ReservationPlan::Full
        );
    }

    #[test]
    fn zero_capacity_topic_never_has_open_slots() {
        assert_eq!(open_slots(&topic(1, 0), 0), 0);
        assert_eq!(open_slots(&topic(1, 1), 3), 0);
        assert_eq!(open_slots(&topic(1, 3), 1), 2);
    }

    #[test]
    fn waitlist_is_first_come_first_served() {
        let signups = [
            signup(9, 1, 3, true),
            signup(4, 1, 2, false),
            signup(5, 1, 4, true),
        ];
        let order: Vec<i32> = waitlist(&signups).iter().map(|s| s.team_id).collect();
        assert_eq!(order, vec![4, 3]);
    }

    #[test]
    fn slot_counts_split_filled_and_waitlisted() {
        let counts = count_slots([(2, false), (1, true), (2, false), (2, true)]);
        assert_eq!(
            counts,
            vec![
                SlotCount {
                    topic_id: 1,
                    filled: 0,
                    waitlisted: 1
                },
                SlotCount {
                    topic_id: 2,
                    filled: 2,
                    waitlisted: 1
                },
            ]
        );
    }

    #[test]
    fn new_bid_is_inserted_at_its_priority() {
        let current = [bid(1, 10, 1), bid(2, 11, 2)];
        assert_eq!(
            reorder_bids(&current, 12, Some(1)),
            vec![(12, 1), (10, 2), (11, 3)]
        );
    }

    #[test]
    fn moved_bid_keeps_priorities_dense() {
        let current = [bid(1, 10, 1), bid(2, 11, 2), bid(3, 12, 3)];
        assert_eq!(
            reorder_bids(&current, 10, Some(3)),
            vec![(11, 1), (12, 2), (10, 3)]
        );
        assert_eq!(
            reorder_bids(&current, 12, Some(99)),
            vec![(10, 1), (11, 2), (12, 3)]
        );
    }

    #[test]
    fn removing_a_bid_renumbers_the_rest() {
        let current = [bid(1, 10, 1), bid(2, 11, 2), bid(3, 12, 3)];
        assert_eq!(reorder_bids(&current, 11, None), vec![(10, 1), (12, 2)]);
    }
}
