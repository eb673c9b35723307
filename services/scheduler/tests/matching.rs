//! End-to-end offer matching scenarios.
//!
//! These tests drive the manager through its public handle with scripted
//! matchers and recording task sources, under a paused tokio clock so
//! deadlines are deterministic.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keel_clock::{Instant, SystemClock};
use keel_id::AppId;
use keel_offers::{Offer, Resource, ResourceValue};
use keel_scheduler::actors::ActorRef;
use keel_scheduler::matcher::manager::{ManagerConfig, ManagerHandle, OfferMatcherManager};
use keel_scheduler::matcher::{
    MatchError, MatchedTasks, MatcherId, OfferMatcher, TaskInfo, TaskSource, TaskWithSource,
};

// =============================================================================
// Test Doubles
// =============================================================================

/// Task source that counts rejections.
#[derive(Default)]
struct RecordingSource {
    rejections: AtomicUsize,
}

impl RecordingSource {
    fn rejections(&self) -> usize {
        self.rejections.load(Ordering::SeqCst)
    }
}

impl TaskSource for RecordingSource {
    fn reject(&self) {
        self.rejections.fetch_add(1, Ordering::SeqCst);
    }
}

/// A matcher that replies from a script, one entry per consultation, and
/// records every offer it was shown.
struct ScriptedMatcher {
    id: MatcherId,
    delay: Option<Duration>,
    replies: Mutex<VecDeque<Vec<TaskWithSource>>>,
    seen: Mutex<Vec<Offer>>,
    calls: AtomicUsize,
}

impl ScriptedMatcher {
    fn new(id: &str, replies: Vec<Vec<TaskWithSource>>) -> Arc<Self> {
        Arc::new(Self {
            id: MatcherId::new(id),
            delay: None,
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn with_delay(id: &str, delay: Duration, replies: Vec<Vec<TaskWithSource>>) -> Arc<Self> {
        Arc::new(Self {
            id: MatcherId::new(id),
            delay: Some(delay),
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen(&self) -> Vec<Offer> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl OfferMatcher for ScriptedMatcher {
    fn id(&self) -> MatcherId {
        self.id.clone()
    }

    async fn match_offer(
        &self,
        _deadline: Instant,
        offer: Offer,
    ) -> Result<MatchedTasks, MatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(offer.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let tasks = self.replies.lock().unwrap().pop_front().unwrap_or_default();
        Ok(MatchedTasks {
            offer_id: offer.id,
            tasks,
        })
    }
}

/// A matcher whose query always fails.
struct FailingMatcher {
    id: MatcherId,
}

#[async_trait]
impl OfferMatcher for FailingMatcher {
    fn id(&self) -> MatcherId {
        self.id.clone()
    }

    async fn match_offer(
        &self,
        _deadline: Instant,
        _offer: Offer,
    ) -> Result<MatchedTasks, MatchError> {
        Err(MatchError::Unavailable("connection refused".to_string()))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn spawn_manager(max_tasks_per_offer: usize) -> (ManagerHandle, ActorRef) {
    OfferMatcherManager::spawn(
        ManagerConfig {
            max_tasks_per_offer,
            mailbox_size: 64,
        },
        Arc::new(SystemClock),
    )
}

fn placement(cpus: f64, source: &Arc<RecordingSource>) -> TaskWithSource {
    TaskWithSource::new(
        TaskInfo {
            name: "web".to_string(),
            app_id: AppId::new(),
            resources: vec![Resource::scalar("cpus", "*", cpus)],
        },
        source.clone(),
    )
}

fn cpu_offer(id: &str, cpus: f64) -> Offer {
    Offer::new(id, vec![Resource::scalar("cpus", "*", cpus)])
}

fn cpus_of(offer: &Offer) -> f64 {
    offer
        .resources
        .iter()
        .find(|r| r.name == "cpus")
        .map(|r| match r.value {
            ResourceValue::Scalar(v) => v,
            _ => 0.0,
        })
        .unwrap_or(0.0)
}

fn in_five_seconds() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn single_matcher_with_abundant_resources() {
    let (manager, _actor) = spawn_manager(5);
    manager.set_launch_tokens(10).await.unwrap();

    let source = Arc::new(RecordingSource::default());
    let matcher = ScriptedMatcher::new(
        "app/web",
        vec![vec![
            placement(1.0, &source),
            placement(1.0, &source),
            placement(1.0, &source),
        ]],
    );
    manager.add_matcher(matcher.clone()).await.unwrap();

    let reply = manager
        .match_offer(in_five_seconds(), cpu_offer("offer-1", 10.0))
        .await
        .unwrap();

    assert_eq!(reply.tasks.len(), 3);
    assert_eq!(source.rejections(), 0);
    assert_eq!(manager.status().await.unwrap().launch_tokens, 7);

    // The producing matcher was consulted again, on the reduced offer.
    let seen = matcher.seen();
    assert_eq!(seen.len(), 2);
    assert!((cpus_of(&seen[1]) - 7.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn token_exhaustion_rejects_the_suffix() {
    let (manager, _actor) = spawn_manager(5);
    manager.set_launch_tokens(2).await.unwrap();

    let source = Arc::new(RecordingSource::default());
    let matcher = ScriptedMatcher::new(
        "app/web",
        vec![(0..5).map(|_| placement(1.0, &source)).collect()],
    );
    manager.add_matcher(matcher).await.unwrap();

    let reply = manager
        .match_offer(in_five_seconds(), cpu_offer("offer-1", 10.0))
        .await
        .unwrap();

    assert_eq!(reply.tasks.len(), 2);
    assert_eq!(source.rejections(), 3);

    let status = manager.status().await.unwrap();
    assert_eq!(status.launch_tokens, 0);
    assert!(!status.offers_wanted);
    assert!(!*manager.offers_wanted().borrow());
}

#[tokio::test(start_paused = true)]
async fn task_cap_rejects_the_overflow() {
    let (manager, _actor) = spawn_manager(4);
    manager.set_launch_tokens(100).await.unwrap();

    let source = Arc::new(RecordingSource::default());
    let matcher = ScriptedMatcher::new(
        "app/web",
        vec![(0..10).map(|_| placement(0.5, &source)).collect()],
    );
    manager.add_matcher(matcher).await.unwrap();

    let reply = manager
        .match_offer(in_five_seconds(), cpu_offer("offer-1", 10.0))
        .await
        .unwrap();

    assert_eq!(reply.tasks.len(), 4);
    assert_eq!(source.rejections(), 6);
    assert_eq!(manager.status().await.unwrap().launch_tokens, 96);
}

#[tokio::test(start_paused = true)]
async fn deadline_expiry_returns_what_accumulated() {
    let (manager, _actor) = spawn_manager(5);
    manager.set_launch_tokens(10).await.unwrap();

    let source = Arc::new(RecordingSource::default());
    let slow_a = ScriptedMatcher::with_delay(
        "app/a",
        Duration::from_secs(2),
        vec![vec![placement(1.0, &source)]],
    );
    let slow_b = ScriptedMatcher::with_delay(
        "app/b",
        Duration::from_secs(2),
        vec![vec![placement(1.0, &source)]],
    );
    manager.add_matcher(slow_a.clone()).await.unwrap();
    manager.add_matcher(slow_b.clone()).await.unwrap();

    let started = Instant::now();
    let reply = manager
        .match_offer(started + Duration::from_secs(1), cpu_offer("offer-1", 10.0))
        .await
        .unwrap();
    let elapsed = Instant::now() - started;

    // The reply arrives at the deadline, empty; the matcher still sleeping
    // is never awaited and the second matcher is never consulted.
    assert!(reply.tasks.is_empty());
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(1100));
    assert_eq!(slow_a.calls() + slow_b.calls(), 1);

    // Let the late reply arrive; it is dropped without reject being called.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let status = manager.status().await.unwrap();
    assert_eq!(status.offers_in_flight, 0);
    assert_eq!(status.launch_tokens, 10);
    assert_eq!(source.rejections(), 0);
}

#[tokio::test(start_paused = true)]
async fn matcher_added_mid_flight_joins_the_round() {
    let (manager, _actor) = spawn_manager(10);
    manager.set_launch_tokens(10).await.unwrap();

    let source = Arc::new(RecordingSource::default());
    let first = ScriptedMatcher::with_delay(
        "app/a",
        Duration::from_millis(100),
        vec![vec![placement(1.0, &source)]],
    );
    manager.add_matcher(first.clone()).await.unwrap();

    let match_task = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .match_offer(in_five_seconds(), cpu_offer("offer-1", 10.0))
                .await
                .unwrap()
        })
    };

    // Let the offer enter processing and the first query go out.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let late = ScriptedMatcher::new("app/b", vec![vec![placement(2.0, &source)]]);
    manager.add_matcher(late.clone()).await.unwrap();

    let reply = match_task.await.unwrap();

    assert_eq!(reply.tasks.len(), 2);
    assert!(late.calls() >= 1);
    assert_eq!(source.rejections(), 0);
    assert_eq!(manager.status().await.unwrap().launch_tokens, 8);
}

#[tokio::test(start_paused = true)]
async fn concurrent_offers_race_for_the_last_token() {
    let (manager, _actor) = spawn_manager(5);
    manager.set_launch_tokens(1).await.unwrap();

    let source = Arc::new(RecordingSource::default());
    let matcher = ScriptedMatcher::new(
        "app/web",
        vec![
            vec![placement(1.0, &source)],
            vec![placement(1.0, &source)],
        ],
    );
    manager.add_matcher(matcher).await.unwrap();

    let offer_a = manager.match_offer(in_five_seconds(), cpu_offer("offer-a", 4.0));
    let offer_b = manager.match_offer(in_five_seconds(), cpu_offer("offer-b", 4.0));
    let (reply_a, reply_b) = tokio::join!(offer_a, offer_b);
    let (reply_a, reply_b) = (reply_a.unwrap(), reply_b.unwrap());

    // Whichever reply is processed first takes the token; the other finds
    // none left and its placement is rejected.
    assert_eq!(reply_a.tasks.len() + reply_b.tasks.len(), 1);
    assert_eq!(source.rejections(), 1);
    assert_eq!(manager.status().await.unwrap().launch_tokens, 0);
}

#[tokio::test(start_paused = true)]
async fn matcher_failure_is_an_empty_reply() {
    let (manager, _actor) = spawn_manager(5);
    manager.set_launch_tokens(10).await.unwrap();

    manager
        .add_matcher(Arc::new(FailingMatcher {
            id: MatcherId::new("app/broken"),
        }))
        .await
        .unwrap();

    let reply = manager
        .match_offer(in_five_seconds(), cpu_offer("offer-1", 10.0))
        .await
        .unwrap();

    assert!(reply.tasks.is_empty());
    assert_eq!(manager.status().await.unwrap().launch_tokens, 10);
}

#[tokio::test(start_paused = true)]
async fn failing_matcher_does_not_starve_the_others() {
    let (manager, _actor) = spawn_manager(5);
    manager.set_launch_tokens(10).await.unwrap();

    let source = Arc::new(RecordingSource::default());
    let healthy = ScriptedMatcher::new("app/web", vec![vec![placement(1.0, &source)]]);
    manager
        .add_matcher(Arc::new(FailingMatcher {
            id: MatcherId::new("app/broken"),
        }))
        .await
        .unwrap();
    manager.add_matcher(healthy.clone()).await.unwrap();

    let reply = manager
        .match_offer(in_five_seconds(), cpu_offer("offer-1", 10.0))
        .await
        .unwrap();

    assert_eq!(reply.tasks.len(), 1);
    assert_eq!(healthy.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn removed_matcher_is_out_of_future_rotations() {
    let (manager, _actor) = spawn_manager(5);
    manager.set_launch_tokens(10).await.unwrap();

    let source = Arc::new(RecordingSource::default());
    let matcher = ScriptedMatcher::new("app/web", vec![vec![placement(1.0, &source)]]);
    manager.add_matcher(matcher.clone()).await.unwrap();
    manager.remove_matcher(MatcherId::new("app/web")).await.unwrap();

    // No matchers left: offers are unwanted and the reply is empty.
    let reply = manager
        .match_offer(in_five_seconds(), cpu_offer("offer-1", 10.0))
        .await
        .unwrap();

    assert!(reply.tasks.is_empty());
    assert_eq!(matcher.calls(), 0);
    assert!(!*manager.offers_wanted().borrow());
}

#[tokio::test(start_paused = true)]
async fn resources_are_conserved_across_a_round() {
    let (manager, _actor) = spawn_manager(10);
    manager.set_launch_tokens(10).await.unwrap();

    let source = Arc::new(RecordingSource::default());
    let matcher = ScriptedMatcher::new(
        "app/web",
        vec![
            vec![placement(2.0, &source), placement(1.5, &source)],
            vec![placement(0.5, &source)],
        ],
    );
    manager.add_matcher(matcher.clone()).await.unwrap();

    let reply = manager
        .match_offer(in_five_seconds(), cpu_offer("offer-1", 8.0))
        .await
        .unwrap();

    assert_eq!(reply.tasks.len(), 3);

    // 8 - (2 + 1.5) = 4.5 on the second consultation, 4.5 - 0.5 = 4 on the
    // third.
    let seen = matcher.seen();
    assert_eq!(seen.len(), 3);
    assert!((cpus_of(&seen[1]) - 4.5).abs() < 1e-9);
    assert!((cpus_of(&seen[2]) - 4.0).abs() < 1e-9);

    let consumed: f64 = reply
        .tasks
        .iter()
        .flat_map(|t| t.task.resources.iter())
        .map(|r| match r.value {
            ResourceValue::Scalar(v) => v,
            _ => 0.0,
        })
        .sum();
    assert!((consumed - 4.0).abs() < 1e-9);
    assert_eq!(manager.status().await.unwrap().launch_tokens, 7);
}
