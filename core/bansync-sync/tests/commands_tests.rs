use bansync_sync::platform::mock::MockPlatform;
use bansync_sync::{
    BanSyncConfig, BanSyncService, Command, CommandContext, MemberPermissions, PeerList,
    PolicyStore, SyncError,
};
use bansync_types::{ChannelId, GuildId, Operation, UserId};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const HOME: GuildId = GuildId::new(1);
const TARGET: GuildId = GuildId::new(2);
const OTHER: GuildId = GuildId::new(3);
const CHANNEL: ChannelId = ChannelId::new(10);
const ADMIN: UserId = UserId::new(100);

fn setup() -> (Arc<MockPlatform>, BanSyncService) {
    let platform = Arc::new(MockPlatform::new());
    platform.add_guild(HOME, "Home");
    platform.add_guild(TARGET, "Target");
    platform.add_guild(OTHER, "Other");
    platform.set_member(HOME, ADMIN, MemberPermissions::ADMIN);
    let store = PolicyStore::open_in_memory().unwrap();
    let service = BanSyncService::new(platform.clone(), store, &BanSyncConfig::new(ChannelId::new(1)));
    (platform, service)
}

fn ctx() -> CommandContext {
    CommandContext {
        guild: HOME,
        channel: CHANNEL,
        author: ADMIN,
        author_name: "alice".to_string(),
    }
}

async fn run(service: &BanSyncService, line: &str) -> Vec<String> {
    let command: Command = line.parse().unwrap();
    service.execute(&ctx(), command).await.unwrap()
}

// ── Parsing ─────────────────────────────────────────────────────

#[test]
fn parses_reconcile_commands() {
    assert_eq!(
        "pull 2".parse::<Command>().unwrap(),
        Command::Reconcile {
            operation: Operation::Pull,
            target: TARGET
        }
    );
    assert_eq!(
        "SYNC  3 ".parse::<Command>().unwrap(),
        Command::Reconcile {
            operation: Operation::Sync,
            target: OTHER
        }
    );
}

#[test]
fn parses_settings_commands() {
    assert_eq!(
        "addpush 2".parse::<Command>().unwrap(),
        Command::AddPeer {
            list: PeerList::AllowPushTo,
            peer: TARGET
        }
    );
    assert_eq!(
        "removepull 3".parse::<Command>().unwrap(),
        Command::RemovePeer {
            list: PeerList::AllowPullFrom,
            peer: OTHER
        }
    );
    assert_eq!(
        "clearpush".parse::<Command>().unwrap(),
        Command::ClearPeers {
            list: PeerList::AllowPushTo
        }
    );
    assert_eq!("showsettings".parse::<Command>().unwrap(), Command::ShowLists);
    assert_eq!("pushall".parse::<Command>().unwrap(), Command::PushAll);
    assert_eq!("syncall".parse::<Command>().unwrap(), Command::SyncAll);
}

#[test]
fn rejects_malformed_commands() {
    for line in ["", "pull", "pull abc", "push 1 2", "frobnicate 1"] {
        let err = line.parse::<Command>().unwrap_err();
        assert!(matches!(err, SyncError::InvalidCommand(_)), "{line:?}");
    }
}

// ── Invoker checks ──────────────────────────────────────────────

#[tokio::test]
async fn non_admin_is_refused() {
    let (platform, service) = setup();
    let mut c = ctx();
    c.author = UserId::new(555);

    let replies = service.execute(&c, Command::ShowLists).await.unwrap();
    assert_eq!(
        replies,
        vec!["You need to be an administrator of this server to use ban sync commands."]
    );
    assert_eq!(platform.messages_to(CHANNEL), replies);
}

#[tokio::test]
async fn admin_without_ban_rights_is_refused() {
    let (platform, service) = setup();
    platform.set_member(
        HOME,
        ADMIN,
        MemberPermissions {
            is_admin: true,
            ban_members: false,
        },
    );

    let replies = run(&service, "pull 2").await;
    assert_eq!(replies.len(), 1);
    assert!(replies[0].starts_with("It seems that you have a role that is considered admin"));
    assert!(platform.mutations().is_empty());
}

#[tokio::test]
async fn bot_without_ban_rights_in_home_cannot_reconcile() {
    let (platform, service) = setup();
    platform.set_bot_can_ban(HOME, false);

    assert_eq!(
        run(&service, "push 2").await,
        vec!["I need the `Ban Members` permission in this server to do that."]
    );
    // Settings still work.
    assert_eq!(run(&service, "showlists").await, vec!["Pull: None\nPush: None"]);
}

// ── Single-target reconcile ─────────────────────────────────────

#[tokio::test]
async fn unknown_target() {
    let (_platform, service) = setup();
    assert_eq!(run(&service, "pull 99").await, vec!["Server `99` not found."]);
}

#[tokio::test]
async fn unauthorized_target_names_the_missing_list() {
    let (_platform, service) = setup();
    assert_eq!(
        run(&service, "pull 2").await,
        vec!["This server is not in that server's pull list."]
    );
    assert_eq!(
        run(&service, "push 2").await,
        vec!["This server is not in that server's push list."]
    );
    assert_eq!(
        run(&service, "sync 2").await,
        vec!["This server is not in that server's push and/or pull list."]
    );
}

#[tokio::test]
async fn whitelisted_push_reports_stats() {
    let (platform, service) = setup();
    platform.add_ban(HOME, UserId::new(7), None);
    platform.add_ban(HOME, UserId::new(8), None);
    service
        .store()
        .add(TARGET, PeerList::AllowPushTo, HOME)
        .unwrap();

    assert_eq!(
        run(&service, "push 2").await,
        vec![":ballot_box_with_check: Pushed bans: 2"]
    );
    assert_eq!(
        platform.ban_reason(TARGET, UserId::new(7)).as_deref(),
        Some("Manual Ban Sync issued by alice (100)")
    );
}

#[tokio::test]
async fn admin_in_target_can_sync() {
    let (platform, service) = setup();
    platform.set_member(TARGET, ADMIN, MemberPermissions::ADMIN);
    platform.add_ban(HOME, UserId::new(7), None);
    platform.add_ban(TARGET, UserId::new(8), None);
    platform.reject(TARGET, UserId::new(7), 500);

    assert_eq!(
        run(&service, "sync 2").await,
        vec![":ballot_box_with_check: Pulled bans: 1\n:stop_sign: Failed pushes: 1"]
    );
}

#[tokio::test]
async fn nothing_to_do() {
    let (platform, service) = setup();
    platform.set_member(TARGET, ADMIN, MemberPermissions::ADMIN);
    assert_eq!(run(&service, "sync 2").await, vec!["No bans to sync."]);
}

#[tokio::test]
async fn missing_ban_rights_in_target() {
    let (platform, service) = setup();
    platform.set_member(TARGET, ADMIN, MemberPermissions::ADMIN);
    platform.add_ban(HOME, UserId::new(7), None);
    platform.set_bot_can_ban(TARGET, false);

    assert_eq!(
        run(&service, "push 2").await,
        vec![":stop_sign: I do not have ban members permissions in the target server (2)."]
    );
    assert!(platform.mutations().is_empty());
}

// ── Batch commands ──────────────────────────────────────────────

#[tokio::test]
async fn pushall_reports_per_target() {
    let (platform, service) = setup();
    platform.add_ban(HOME, UserId::new(7), None);
    platform.add_ban(OTHER, UserId::new(7), None);
    let store = service.store();
    store.add(HOME, PeerList::AllowPushTo, TARGET).unwrap();
    store.add(HOME, PeerList::AllowPushTo, GuildId::new(99)).unwrap();
    store.add(HOME, PeerList::AllowPushTo, OTHER).unwrap();

    let replies = run(&service, "pushall").await;
    assert_eq!(
        replies,
        vec![
            ":warning: Commencing global ban push.",
            ":outbox_tray: Pushing new bans to server: Target (2)",
            ":ballot_box_with_check: Pushed bans: 1",
            ":grey_question: Skipping unknown server (99).",
            ":outbox_tray: Pushing new bans to server: Other (3)",
            ":ballot_box_with_check: No new bans to push to Other (3).",
            ":white_check_mark: Global ban push complete!",
        ]
    );
    assert_eq!(platform.messages_to(CHANNEL), replies);
}

#[tokio::test]
async fn syncall_pulls_then_pushes() {
    let (platform, service) = setup();
    platform.add_ban(TARGET, UserId::new(8), None);
    let store = service.store();
    store.add(HOME, PeerList::AllowPullFrom, TARGET).unwrap();
    store.add(HOME, PeerList::AllowPushTo, OTHER).unwrap();

    assert_eq!(
        run(&service, "syncall").await,
        vec![
            ":warning: Commencing global sync.",
            ":warning: Pulling all global bans from servers...",
            ":inbox_tray: Pulling new bans from server: Target (2)",
            ":ballot_box_with_check: Pulled bans: 1",
            ":warning: Pushing all global bans to servers...",
            ":outbox_tray: Pushing new bans to server: Other (3)",
            ":ballot_box_with_check: Pushed bans: 1",
            ":white_check_mark: Global ban sync complete!",
        ]
    );
    assert!(platform.banned_users(OTHER).contains(&UserId::new(8)));
}

#[tokio::test]
async fn batch_stops_on_missing_ban_rights() {
    let (platform, service) = setup();
    platform.set_bot_can_ban(TARGET, false);
    platform.add_ban(HOME, UserId::new(7), None);
    let store = service.store();
    store.add(HOME, PeerList::AllowPushTo, TARGET).unwrap();
    store.add(HOME, PeerList::AllowPushTo, OTHER).unwrap();

    assert_eq!(
        run(&service, "pushall").await,
        vec![
            ":warning: Commencing global ban push.",
            ":outbox_tray: Pushing new bans to server: Target (2)",
            ":stop_sign: I do not have ban members permissions in the target server (2).",
        ]
    );
    assert!(platform.banned_users(OTHER).is_empty());
}

// ── Settings ────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_show_peers() {
    let (_platform, service) = setup();

    assert_eq!(
        run(&service, "addpush 2").await,
        vec!["`Target` will now be allowed to **push** bans to this server."]
    );
    assert_eq!(
        run(&service, "addpull 3").await,
        vec!["`Other` will now be allowed to **pull** bans from this server."]
    );
    assert_eq!(
        run(&service, "addpull 2").await,
        vec!["`Target` will now be allowed to **pull** bans from this server."]
    );
    assert_eq!(
        run(&service, "showlists").await,
        vec!["Pull: `Other`, `Target`\nPush: `Target`"]
    );
}

#[tokio::test]
async fn add_unknown_peer_is_refused() {
    let (_platform, service) = setup();
    assert_eq!(run(&service, "addpush 99").await, vec!["Server `99` not found."]);
    assert!(service
        .store()
        .list(HOME, PeerList::AllowPushTo)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn remove_vanished_peer_by_id() {
    let (platform, service) = setup();
    run(&service, "addpush 3").await;
    platform.remove_guild(OTHER);

    assert_eq!(run(&service, "showlists").await, vec!["Pull: None\nPush: None"]);
    assert_eq!(
        run(&service, "removepush 3").await,
        vec!["`3` has been removed from the list of servers allowed to **push** bans to this server."]
    );
    assert!(service
        .store()
        .list(HOME, PeerList::AllowPushTo)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn clear_lists() {
    let (_platform, service) = setup();
    run(&service, "addpull 2").await;
    run(&service, "addpush 2").await;

    assert_eq!(
        run(&service, "clearpull").await,
        vec!["Pull list cleared. Only local admins are now allowed to pull bans from this server from elsewhere."]
    );
    assert_eq!(
        run(&service, "showlists").await,
        vec!["Pull: None\nPush: `Target`"]
    );
}
