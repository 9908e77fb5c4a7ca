mod common;

use std::collections::HashSet;

use common::*;
use raffle_backend::entities::ActivityState;
use raffle_backend::models::*;
use raffle_backend::services::DrawOutcome;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_user_joins_once_under_contention() {
    let h = Harness::memory();
    let activity = seed_active(&h.store, in_minutes(10), vec![PrizeLine::new("Gold", "", 1)]).await;

    let mut handles = Vec::new();
    for _ in 0..32 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service.join(activity.id, "same-user", "Same").await.unwrap()
        }));
    }

    let mut joined = 0;
    for handle in handles {
        match handle.await.unwrap() {
            JoinResult::Joined => joined += 1,
            JoinResult::AlreadyJoined => {}
            other => panic!("unexpected join result {other:?}"),
        }
    }
    assert_eq!(joined, 1);

    let detail = h.store.get_activity(activity.id).await.unwrap().unwrap();
    assert_eq!(detail.participants.len(), 1);
    assert_eq!(detail.activity.participant_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_join_racing_draw_is_either_counted_or_refused() {
    let h = Harness::memory();
    let activity = seed_active(
        &h.store,
        minutes_ago(1),
        vec![PrizeLine::new("Gold", "", 2), PrizeLine::new("Silver", "", 5)],
    )
    .await;
    for i in 0..5 {
        h.store
            .append_participant(activity.id, &format!("early-{i}"), "Early")
            .await
            .unwrap();
    }

    let mut joins = Vec::new();
    for i in 0..40 {
        let service = h.service.clone();
        joins.push(tokio::spawn(async move {
            let user = format!("late-{i}");
            let result = service.join(activity.id, &user, "Late").await.unwrap();
            (user, result)
        }));
    }
    let scheduler = h.scheduler.clone();
    let draw = tokio::spawn(async move { scheduler.run_draw(activity.id).await.unwrap() });

    let mut accepted: HashSet<String> = (0..5).map(|i| format!("early-{i}")).collect();
    for join in joins {
        let (user, result) = join.await.unwrap();
        match result {
            JoinResult::Joined => {
                accepted.insert(user);
            }
            JoinResult::ActivityNotOpen {
                state: ActivityState::Drawn,
            } => {}
            other => panic!("unexpected join result {other:?}"),
        }
    }
    assert!(matches!(draw.await.unwrap(), DrawOutcome::Drawn { .. }));

    let detail = h.store.get_activity(activity.id).await.unwrap().unwrap();
    let participants: HashSet<String> =
        detail.participants.iter().map(|p| p.user_id.clone()).collect();

    // 每个成功报名的人都参与了开奖，被拒绝的人没有留下记录
    assert_eq!(participants, accepted);
    assert_eq!(detail.activity.participant_count as usize, participants.len());

    let winners: HashSet<&String> = detail.winners.iter().map(|w| &w.user_id).collect();
    assert_eq!(winners.len(), detail.winners.len());
    assert_eq!(detail.winners.len(), participants.len().min(7));
    assert!(winners.iter().all(|w| participants.contains(*w)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_draw_requests_record_once() {
    let h = Harness::memory();
    let activity = seed_active(&h.store, minutes_ago(1), vec![PrizeLine::new("Gold", "", 1)]).await;
    h.store.append_participant(activity.id, "u1", "One").await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let scheduler = h.scheduler.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_draw(activity.id).await.unwrap()
        }));
    }

    let mut drawn = 0;
    for handle in handles {
        match handle.await.unwrap() {
            DrawOutcome::Drawn { .. } => drawn += 1,
            DrawOutcome::InProgress
            | DrawOutcome::Skipped {
                state: ActivityState::Drawn,
            } => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(drawn, 1);
    assert_eq!(h.notifier.kinds().await, vec!["drawn"]);
}
