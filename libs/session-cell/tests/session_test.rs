use assert_matches::assert_matches;

use session_cell::{
    DomainError, MediaState, Participant, ParticipantId, ParticipantRole, SessionId,
    SessionStatus, VideoSession,
};

fn session(capacity: usize) -> VideoSession {
    VideoSession::new(
        SessionId::new("morning-hiit").unwrap(),
        "Morning HIIT",
        capacity,
        true,
    )
}

fn coach(id: &str, name: &str) -> Participant {
    Participant::new(ParticipantId::new(id).unwrap(), name, ParticipantRole::Coach)
}

fn student(id: &str, name: &str) -> Participant {
    Participant::new(ParticipantId::new(id).unwrap(), name, ParticipantRole::Student)
}

#[test]
fn first_coach_join_activates_session() {
    let s = session(10);
    assert_eq!(s.status(), SessionStatus::Waiting);

    let s = s.add_participant(coach("c1", "Sarah")).unwrap();
    assert_eq!(s.status(), SessionStatus::Active);
    assert!(s.started_at().is_some());
    assert_eq!(s.coach().unwrap().name(), "Sarah");
}

#[test]
fn second_coach_is_rejected() {
    let s = session(10).add_participant(coach("c1", "Sarah")).unwrap();
    let err = s.add_participant(coach("c2", "Maya")).unwrap_err();
    assert_matches!(err, DomainError::CoachAlreadyPresent);
}

#[test]
fn capacity_rejection_leaves_aggregate_untouched() {
    let s = session(2)
        .add_participant(coach("c1", "Sarah"))
        .unwrap()
        .add_participant(student("s1", "Alex"))
        .unwrap();

    let err = s.add_participant(student("s2", "Kim")).unwrap_err();
    assert_matches!(err, DomainError::SessionFull { capacity: 2 });
    assert_eq!(s.participant_count(), 2);
}

#[test]
fn capacity_and_coach_invariants_hold_under_add_remove_sequences() {
    let mut s = session(5).add_participant(coach("c1", "Sarah")).unwrap();

    for i in 0..20 {
        let id = format!("s{}", i);
        match s.add_participant(student(&id, "Student")) {
            Ok(next) => s = next,
            Err(_) => {
                // Evict the oldest student to make room.
                let victim = s
                    .participants_by_arrival()
                    .iter()
                    .find(|p| !p.is_coach())
                    .map(|p| p.id().clone());
                if let Some(victim) = victim {
                    s = s.remove_participant(&victim).unwrap();
                }
            }
        }

        assert!(s.participant_count() <= 5);
        let coaches = s
            .participants_by_arrival()
            .iter()
            .filter(|p| p.is_coach())
            .count();
        assert!(coaches <= 1);
    }
}

#[test]
fn duplicate_participant_is_rejected() {
    let s = session(10).add_participant(student("s1", "Alex")).unwrap();
    assert_matches!(
        s.add_participant(student("s1", "Alex")),
        Err(DomainError::DuplicateParticipant(_))
    );
}

#[test]
fn late_join_policy_is_enforced_for_students() {
    let s = VideoSession::new(SessionId::new("strict").unwrap(), "Strict", 10, false)
        .add_participant(coach("c1", "Sarah"))
        .unwrap();

    assert_matches!(
        s.add_participant(student("s1", "Alex")),
        Err(DomainError::LateJoinNotAllowed)
    );
}

#[test]
fn coach_departure_ends_session() {
    let s = session(10)
        .add_participant(coach("c1", "Sarah"))
        .unwrap()
        .add_participant(student("s1", "Alex"))
        .unwrap()
        .add_participant(student("s2", "Kim"))
        .unwrap();

    let s = s.remove_participant(&ParticipantId::new("c1").unwrap()).unwrap();

    assert_eq!(s.status(), SessionStatus::Ended);
    assert!(s.coach().is_none());
    assert!(s.coach_id().is_none());
    assert!(s.ended_at().is_some());
    assert_eq!(s.participant_count(), 2);
}

#[test]
fn removing_spotlighted_participant_clears_spotlight() {
    let alex = ParticipantId::new("s1").unwrap();
    let s = session(10)
        .add_participant(coach("c1", "Sarah"))
        .unwrap()
        .add_participant(student("s1", "Alex"))
        .unwrap()
        .spotlight_participant(&alex)
        .unwrap();

    let s = s.remove_participant(&alex).unwrap();
    assert!(s.spotlighted_participant_id().is_none());
}

#[test]
fn spotlight_requires_presence() {
    let s = session(10).add_participant(coach("c1", "Sarah")).unwrap();
    assert_matches!(
        s.spotlight_participant(&ParticipantId::new("ghost").unwrap()),
        Err(DomainError::ParticipantNotFound(_))
    );
}

#[test]
fn clear_spotlight_is_idempotent() {
    let alex = ParticipantId::new("s1").unwrap();
    let s = session(10)
        .add_participant(coach("c1", "Sarah"))
        .unwrap()
        .add_participant(student("s1", "Alex"))
        .unwrap()
        .spotlight_participant(&alex)
        .unwrap();

    let once = s.clear_spotlight();
    let twice = once.clear_spotlight();
    assert_eq!(
        once.spotlighted_participant_id(),
        twice.spotlighted_participant_id()
    );
    assert!(twice.spotlighted_participant_id().is_none());
}

#[test]
fn disable_video_when_disabled_is_a_no_op() {
    let alex = ParticipantId::new("s1").unwrap();
    let s = session(10).add_participant(student("s1", "Alex")).unwrap();

    let folded = s
        .update_participant(&alex, |p| p.with_video(MediaState::Disabled))
        .unwrap();

    assert_eq!(
        folded.participant(&alex).unwrap().video_state(),
        MediaState::Disabled
    );
}

#[test]
fn ended_session_rejects_joins() {
    let s = session(10).add_participant(coach("c1", "Sarah")).unwrap().end();
    assert_matches!(
        s.add_participant(student("s1", "Alex")),
        Err(DomainError::SessionEnded)
    );
    // Ending twice is absorbing.
    assert_eq!(s.end().status(), SessionStatus::Ended);
}

#[test]
fn priority_selection_orders_coach_speakers_hands_before_filler() {
    let mut s = session(64).add_participant(coach("c1", "Sarah")).unwrap();

    for i in 0..2 {
        let id = format!("spk{}", i);
        s = s.add_participant(student(&id, "Speaker")).unwrap();
        let pid = ParticipantId::new(id).unwrap();
        s = s
            .update_participant(&pid, |p| p.with_active_speaker(true))
            .unwrap();
    }
    for i in 0..3 {
        let id = format!("hand{}", i);
        s = s.add_participant(student(&id, "Hand")).unwrap();
        let pid = ParticipantId::new(id).unwrap();
        s = s
            .update_participant(&pid, |p| p.with_raised_hand(true))
            .unwrap();
    }
    for i in 0..30 {
        let id = format!("filler{}", i);
        s = s.add_participant(student(&id, "Filler")).unwrap();
    }

    let selected = s.select_high_priority(9);
    assert_eq!(selected.len(), 9);

    let as_strings: Vec<&str> = selected.iter().map(|id| id.as_str()).collect();
    assert_eq!(as_strings[0], "c1");
    assert!(as_strings.contains(&"spk0"));
    assert!(as_strings.contains(&"spk1"));
    assert!(as_strings.contains(&"hand0"));
    assert!(as_strings.contains(&"hand1"));
    assert!(as_strings.contains(&"hand2"));

    // Speakers and raised hands come before any filler.
    let first_filler = as_strings.iter().position(|id| id.starts_with("filler"));
    let last_hand = as_strings.iter().rposition(|id| id.starts_with("hand")).unwrap();
    if let Some(first_filler) = first_filler {
        assert!(last_hand < first_filler);
    }
}

#[test]
fn stream_plan_sets_are_disjoint_and_cover_everyone() {
    let mut s = session(64).add_participant(coach("c1", "Sarah")).unwrap();
    for i in 0..40 {
        let id = format!("s{}", i);
        s = s.add_participant(student(&id, "Student")).unwrap();
    }

    let plan = s.stream_plan(9, 16);
    assert_eq!(plan.active.len(), 9);
    assert_eq!(plan.thumbnail.len(), 16);
    assert_eq!(plan.audio_only.len(), 41 - 9 - 16);

    let mut all: Vec<&str> = plan
        .active
        .iter()
        .chain(&plan.thumbnail)
        .chain(&plan.audio_only)
        .map(|id| id.as_str())
        .collect();
    let total = all.len();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), total);
}

#[test]
fn pagination_covers_priority_order() {
    let mut s = session(64).add_participant(coach("c1", "Sarah")).unwrap();
    for i in 0..24 {
        let id = format!("s{}", i);
        s = s.add_participant(student(&id, "Student")).unwrap();
    }

    assert_eq!(s.page_count(9), 3);
    assert_eq!(s.page(0, 9).len(), 9);
    assert_eq!(s.page(2, 9).len(), 7);
    assert!(s.page(3, 9).is_empty());
    assert_eq!(s.page(0, 9)[0].id().as_str(), "c1");
}

#[test]
fn end_to_end_scenario() {
    let s = session_with_capacity_three();

    let s = s.add_participant(coach("a", "Sarah")).unwrap();
    assert_eq!(s.status(), SessionStatus::Active);
    assert_eq!(s.coach().unwrap().name(), "Sarah");

    let s = s.add_participant(student("b", "Alex")).unwrap();
    assert_eq!(s.participant_count(), 2);

    let b = ParticipantId::new("b").unwrap();
    let s = s.spotlight_participant(&b).unwrap();
    assert_eq!(s.spotlighted_participant().unwrap().id(), &b);

    let a = ParticipantId::new("a").unwrap();
    let s = s.remove_participant(&a).unwrap();
    assert_eq!(s.status(), SessionStatus::Ended);
    assert!(s.coach().is_none());
}

fn session_with_capacity_three() -> VideoSession {
    VideoSession::new(SessionId::new("e2e").unwrap(), "End to end", 3, true)
}
