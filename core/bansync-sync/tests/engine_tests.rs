use bansync_sync::platform::mock::{MockPlatform, PlatformCall};
use bansync_sync::{Actor, Outcome, ReconcileEngine, SyncError};
use bansync_types::{GuildId, Operation, UserId};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::io;
use std::sync::{Arc, Mutex};

const A: GuildId = GuildId::new(1);
const B: GuildId = GuildId::new(2);
const REASON: &str = "Manual Ban Sync issued by alice (100)";

fn u(id: u64) -> UserId {
    UserId::new(id)
}

fn actor() -> Actor {
    Actor::new(u(100), A, "alice")
}

/// A has {u1, u2}, B has {u2, u3}.
fn setup() -> (Arc<MockPlatform>, ReconcileEngine) {
    let platform = Arc::new(MockPlatform::new());
    platform.add_guild(A, "Alpha");
    platform.add_guild(B, "Beta");
    platform.add_ban(A, u(1), Some("spam"));
    platform.add_ban(A, u(2), None);
    platform.add_ban(B, u(2), None);
    platform.add_ban(B, u(3), Some("raid"));
    let engine = ReconcileEngine::new(platform.clone(), 1);
    (platform, engine)
}

fn set(ids: &[u64]) -> BTreeSet<UserId> {
    ids.iter().copied().map(UserId::new).collect()
}

// ── Directions ──────────────────────────────────────────────────

#[tokio::test]
async fn pull_bans_missing_users_into_source() {
    let (platform, engine) = setup();
    let stats = engine.reconcile(Operation::Pull, &actor(), B, REASON).await.unwrap();

    assert_eq!(stats.get(Outcome::Pulled), 1);
    assert_eq!(stats.total(), 1);
    assert_eq!(platform.banned_users(A), set(&[1, 2, 3]));
    assert_eq!(platform.banned_users(B), set(&[2, 3]));
    assert_eq!(platform.ban_reason(A, u(3)).as_deref(), Some(REASON));
}

#[tokio::test]
async fn push_bans_missing_users_into_target() {
    let (platform, engine) = setup();
    let stats = engine.reconcile(Operation::Push, &actor(), B, REASON).await.unwrap();

    assert_eq!(stats.get(Outcome::Pushed), 1);
    assert_eq!(platform.banned_users(A), set(&[1, 2]));
    assert_eq!(platform.banned_users(B), set(&[1, 2, 3]));
    assert_eq!(
        platform.mutations(),
        vec![PlatformCall::Ban {
            guild: B,
            user: u(1),
            reason: REASON.to_string(),
            delete_message_days: 1,
        }]
    );
}

#[tokio::test]
async fn sync_converges_both_sides() {
    let (platform, engine) = setup();
    let stats = engine.reconcile(Operation::Sync, &actor(), B, REASON).await.unwrap();

    assert_eq!(stats.get(Outcome::Pulled), 1);
    assert_eq!(stats.get(Outcome::Pushed), 1);
    assert_eq!(platform.banned_users(A), set(&[1, 2, 3]));
    assert_eq!(platform.banned_users(B), set(&[1, 2, 3]));
}

#[tokio::test]
async fn sync_pulls_before_pushing() {
    let (platform, engine) = setup();
    engine.reconcile(Operation::Sync, &actor(), B, REASON).await.unwrap();

    let guilds: Vec<GuildId> = platform
        .mutations()
        .into_iter()
        .map(|call| match call {
            PlatformCall::Ban { guild, .. } => guild,
            other => panic!("unexpected mutation {other:?}"),
        })
        .collect();
    assert_eq!(guilds, vec![A, B]);
}

#[tokio::test]
async fn sync_does_not_push_pulled_bans_back() {
    let (platform, engine) = setup();
    engine.reconcile(Operation::Sync, &actor(), B, REASON).await.unwrap();

    // u3 came from B; it must not be re-banned in B.
    assert!(!platform.mutations().contains(&PlatformCall::Ban {
        guild: B,
        user: u(3),
        reason: REASON.to_string(),
        delete_message_days: 1,
    }));
}

// ── Idempotence ─────────────────────────────────────────────────

#[tokio::test]
async fn second_run_does_nothing() {
    let (platform, engine) = setup();
    engine.reconcile(Operation::Push, &actor(), B, REASON).await.unwrap();
    platform.clear_calls();

    let stats = engine.reconcile(Operation::Push, &actor(), B, REASON).await.unwrap();
    assert!(stats.is_empty());
    assert!(platform.mutations().is_empty());
}

#[tokio::test]
async fn identical_lists_report_empty_stats() {
    let platform = Arc::new(MockPlatform::new());
    platform.add_guild(A, "Alpha");
    platform.add_guild(B, "Beta");
    platform.add_ban(A, u(5), None);
    platform.add_ban(B, u(5), None);
    let engine = ReconcileEngine::new(platform.clone(), 0);

    let stats = engine.reconcile(Operation::Sync, &actor(), B, REASON).await.unwrap();
    assert!(stats.is_empty());
}

// ── Failures ────────────────────────────────────────────────────

#[tokio::test]
async fn missing_ban_permission_aborts_before_any_mutation() {
    let (platform, engine) = setup();
    platform.set_bot_can_ban(B, false);

    let err = engine
        .reconcile(Operation::Sync, &actor(), B, REASON)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::MissingBanPermission { guild } if guild == B));
    assert!(platform.mutations().is_empty());
    assert!(!platform.calls().contains(&PlatformCall::Bans(A)));
    assert_eq!(platform.banned_users(A), set(&[1, 2]));
}

#[tokio::test]
async fn rejected_entries_are_counted_and_run_continues() {
    let (platform, engine) = setup();
    platform.add_ban(A, u(4), None);
    platform.reject(B, u(1), 403);

    let stats = engine.reconcile(Operation::Push, &actor(), B, REASON).await.unwrap();

    assert_eq!(stats.get(Outcome::Pushed), 1);
    assert_eq!(stats.get(Outcome::FailedPush), 1);
    assert_eq!(stats.failures(), 1);
    assert_eq!(platform.banned_users(B), set(&[2, 3, 4]));
}

#[tokio::test]
async fn failed_pull_counted_separately() {
    let (platform, engine) = setup();
    platform.reject(A, u(3), 500);

    let stats = engine.reconcile(Operation::Sync, &actor(), B, REASON).await.unwrap();
    assert_eq!(stats.get(Outcome::FailedPull), 1);
    assert_eq!(stats.get(Outcome::Pushed), 1);
}

#[tokio::test]
async fn unknown_target_is_an_error() {
    let (_platform, engine) = setup();
    let err = engine
        .reconcile(Operation::Pull, &actor(), GuildId::new(99), REASON)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::GuildNotFound(_)));
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn hard_error_mid_run_keeps_applied_bans_and_logs_partial_totals() {
    let (platform, engine) = setup();
    platform.add_ban(A, u(4), None);
    platform.reject(B, u(4), 401);

    let capture = LogCapture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _log = tracing::subscriber::set_default(subscriber);

    let err = engine
        .reconcile(Operation::Push, &actor(), B, REASON)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Auth(_)));
    assert_eq!(platform.banned_users(B), set(&[1, 2, 3]));
    assert!(capture
        .contents()
        .contains("Stopping bans into 2 after 1 attempted, 0 failed"));
}

// ── Concurrency ─────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_runs_on_a_pair_ban_each_user_once() {
    let (platform, engine) = setup();
    let engine = Arc::new(engine);

    let a = tokio::spawn({
        let engine = engine.clone();
        async move { engine.reconcile(Operation::Push, &actor(), B, REASON).await }
    });
    let b = tokio::spawn({
        let engine = engine.clone();
        async move { engine.reconcile(Operation::Push, &actor(), B, REASON).await }
    });

    let first = a.await.unwrap().unwrap();
    let second = b.await.unwrap().unwrap();
    assert_eq!(first.total() + second.total(), 1);
    assert_eq!(platform.mutations().len(), 1);
    assert_eq!(engine.active_pairs(), 0);
}

#[tokio::test]
async fn pair_locks_are_released_after_each_run() {
    let (platform, engine) = setup();
    platform.add_guild(GuildId::new(3), "Gamma");

    engine.reconcile(Operation::Push, &actor(), B, REASON).await.unwrap();
    engine
        .reconcile(Operation::Pull, &actor(), GuildId::new(3), REASON)
        .await
        .unwrap();
    assert_eq!(engine.active_pairs(), 0);

    platform.set_bot_can_ban(B, false);
    engine
        .reconcile(Operation::Push, &actor(), B, REASON)
        .await
        .unwrap_err();
    assert_eq!(engine.active_pairs(), 0);
}

// ── Properties ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn sync_yields_the_union(
        left in prop::collection::btree_set(1u64..50, 0..20),
        right in prop::collection::btree_set(1u64..50, 0..20),
        rejected in prop::collection::btree_set(1u64..50, 0..10),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let platform = Arc::new(MockPlatform::new());
        platform.add_guild(A, "Alpha");
        platform.add_guild(B, "Beta");
        for id in &left {
            platform.add_ban(A, u(*id), None);
        }
        for id in &right {
            platform.add_ban(B, u(*id), None);
        }
        for id in &rejected {
            platform.reject(B, u(*id), 500);
        }
        let engine = ReconcileEngine::new(platform.clone(), 0);

        let stats = rt
            .block_on(engine.reconcile(Operation::Sync, &actor(), B, REASON))
            .unwrap();

        let union: BTreeSet<UserId> = left.union(&right).copied().map(UserId::new).collect();
        let to_push: BTreeSet<u64> = left.difference(&right).copied().collect();
        let failed_push = to_push.intersection(&rejected).count();

        // A only receives bans, and nothing was rejected there.
        prop_assert_eq!(platform.banned_users(A), union);

        // Every source ban is in B or accounted for as a failed push.
        let mut covered = platform.banned_users(B);
        covered.extend(rejected.iter().copied().map(UserId::new));
        for id in &left {
            prop_assert!(covered.contains(&u(*id)));
        }

        prop_assert_eq!(stats.get(Outcome::Pulled), right.difference(&left).count());
        prop_assert_eq!(stats.get(Outcome::Pushed), to_push.len() - failed_push);
        prop_assert_eq!(stats.get(Outcome::FailedPush), failed_push);
        prop_assert_eq!(engine.active_pairs(), 0);
    }
}
