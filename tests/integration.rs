#![cfg(test)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use beebot::{
    base::{
        config::{Config, ConfigInner},
        types::{Aggregate, Res, RunMode, Void, exit_code_for},
    },
    runtime::{ConnectionState, Runtime, Supervisor},
    service::{
        chat::{ChatClient, GenericChatClient},
        db::DbClient,
        directory::{DirectoryCache, DirectoryClient, GenericDirectoryClient},
    },
};
use mockall::{Sequence, mock};
use serde_json::{Value, json};

// Mocks.

// Mock chat client for testing.

mock! {
    pub Chat {}

    #[async_trait]
    impl GenericChatClient for Chat {
        fn bot_user_id(&self) -> &str;
        async fn connect(&self) -> Void;
        async fn next_event(&self) -> Res<Option<Value>>;
        async fn send_message(&self, channel_id: &str, text: &str) -> Void;
    }
}

// Mock directory service for testing.

mock! {
    pub Directory {}

    #[async_trait]
    impl GenericDirectoryClient for Directory {
        async fn list_users(&self) -> Res<HashMap<String, String>>;
        async fn list_channels(&self) -> Res<HashMap<String, String>>;
        async fn list_direct_messages(&self) -> Res<HashMap<String, String>>;
        async fn list_emoji_aliases(&self) -> Res<HashMap<String, String>>;
    }
}

/// Replies captured by the mock chat client, as `(channel, text)`.
type Sent = Arc<Mutex<Vec<(String, String)>>>;

fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn get_mock_directory() -> MockDirectory {
    let mut mock = MockDirectory::new();

    mock.expect_list_users()
        .returning(|| Ok(map(&[("U1", "alice"), ("U2", "bob"), ("U3", "carol"), ("UBOT", "beebot")])));
    mock.expect_list_channels().returning(|| Ok(map(&[("C1", "general")])));
    mock.expect_list_direct_messages().returning(|| Ok(map(&[("D1", "U1")])));
    mock.expect_list_emoji_aliases().returning(|| Ok(map(&[("thumbsup", "+1")])));

    mock
}

/// A chat client that records every reply and never connects.
fn get_mock_chat(sent: Sent) -> MockChat {
    let mut mock = MockChat::new();

    mock.expect_bot_user_id().return_const("UBOT".to_string());
    mock.expect_send_message().returning(move |channel, text| {
        sent.lock().unwrap().push((channel.to_string(), text.to_string()));
        Ok(())
    });

    mock
}

fn test_config(mode: RunMode) -> Config {
    Config::from(ConfigInner {
        slack_app_token: "xapp-test".to_string(),
        slack_bot_token: "xoxb-test".to_string(),
        mode,
        revision: "abc1234".to_string(),
        ..Default::default()
    })
}

/// Helper function to setup the test environment.
async fn setup_test_environment(mode: RunMode, chat: MockChat, db: DbClient) -> Runtime {
    let config = test_config(mode);

    let directory = DirectoryCache::new(DirectoryClient::new(Arc::new(get_mock_directory())));
    directory.refresh().await.expect("Failed to load the directory");

    let chat = ChatClient::new(Arc::new(chat));

    Runtime { config, db, directory, chat }
}

async fn setup_with_replies(mode: RunMode) -> (Runtime, Sent) {
    let sent = Sent::default();
    let db = DbClient::surreal_memory().await.expect("Failed to create DB client");
    let runtime = setup_test_environment(mode, get_mock_chat(sent.clone()), db).await;

    (runtime, sent)
}

fn reaction_added(from: &str, to: &str, reaction: &str) -> Value {
    json!({ "type": "reaction_added", "user": from, "item_user": to, "reaction": reaction })
}

fn reaction_removed(from: &str, to: &str, reaction: &str) -> Value {
    json!({ "type": "reaction_removed", "user": from, "item_user": to, "reaction": reaction })
}

fn message(user: &str, channel: &str, text: &str) -> Value {
    json!({ "type": "message", "user": user, "channel": channel, "text": text })
}

// Tests.

#[tokio::test]
async fn test_reactions_are_counted_per_recipient() {
    let (runtime, _) = setup_with_replies(RunMode::Dm).await;
    let pipeline = runtime.pipeline();

    pipeline.handle(&reaction_added("U1", "U2", "+1")).await.unwrap();
    pipeline.handle(&reaction_added("U3", "U2", "+1")).await.unwrap();
    pipeline.handle(&reaction_removed("U1", "U2", "+1")).await.unwrap();

    let totals = runtime.db.sum_by_recipient(Some("+1")).await.unwrap();

    assert_eq!(totals.len(), 1);
    assert_eq!(totals[0].subject, "U2");
    assert_eq!(totals[0].total, 1);
}

#[tokio::test]
async fn test_withdrawn_reaction_nets_to_zero_everywhere() {
    let (runtime, _) = setup_with_replies(RunMode::Dm).await;
    let pipeline = runtime.pipeline();

    pipeline.handle(&reaction_added("U1", "U2", "fire")).await.unwrap();
    pipeline.handle(&reaction_removed("U1", "U2", "fire::skin-tone-2")).await.unwrap();

    let totals = |rows: Vec<Aggregate>| rows.into_iter().map(|r| (r.subject, r.total)).collect::<Vec<_>>();

    assert_eq!(totals(runtime.db.sum_by_reaction().await.unwrap()), [("fire".to_string(), 0)]);
    assert_eq!(totals(runtime.db.sum_by_recipient(None).await.unwrap()), [("U2".to_string(), 0)]);
    assert_eq!(totals(runtime.db.sum_by_giver(None).await.unwrap()), [("U1".to_string(), 0)]);
    assert_eq!(totals(runtime.db.top_for_reaction("fire", None).await.unwrap()), [("U2".to_string(), 0)]);
}

#[tokio::test]
async fn test_skin_tones_share_one_bucket() {
    let (runtime, _) = setup_with_replies(RunMode::Dm).await;
    let pipeline = runtime.pipeline();

    pipeline.handle(&reaction_added("U1", "U2", "thumbsup::skin-tone-3")).await.unwrap();
    pipeline.handle(&reaction_added("U3", "U2", "thumbsup")).await.unwrap();

    let totals = runtime.db.sum_by_reaction().await.unwrap();

    assert_eq!(totals.len(), 1);
    assert_eq!(totals[0].subject, "thumbsup");
    assert_eq!(totals[0].total, 2);
}

#[tokio::test]
async fn test_self_reactions_and_unknown_users_are_not_recorded() {
    let (runtime, _) = setup_with_replies(RunMode::Dm).await;
    let pipeline = runtime.pipeline();

    pipeline.handle(&reaction_added("U1", "U1", "tada")).await.unwrap();
    pipeline.handle(&reaction_removed("U1", "U1", "tada")).await.unwrap();
    pipeline.handle(&reaction_removed("U2", "U2", "tada::skin-tone-4")).await.unwrap();
    pipeline.handle(&reaction_added("U1", "U404", "tada")).await.unwrap();
    pipeline.handle(&json!({ "type": "reaction_added", "user": "U1", "reaction": "tada" })).await.unwrap();

    assert!(runtime.db.sum_by_reaction().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_quiet_mode_records_but_never_replies() {
    let mut chat = MockChat::new();
    chat.expect_bot_user_id().return_const("UBOT".to_string());
    chat.expect_send_message().never();

    let db = DbClient::surreal_memory().await.unwrap();
    let runtime = setup_test_environment(RunMode::Quiet, chat, db).await;
    let pipeline = runtime.pipeline();

    pipeline.handle(&message("U1", "C1", "showme reactions")).await.unwrap();
    pipeline.handle(&reaction_added("U1", "U2", "tada")).await.unwrap();

    let totals = runtime.db.sum_by_recipient(None).await.unwrap();
    assert_eq!(totals.len(), 1);
    assert_eq!(totals[0].total, 1);
}

#[tokio::test]
async fn test_empty_store_reports_no_reactions() {
    let (runtime, sent) = setup_with_replies(RunMode::Dm).await;

    runtime.pipeline().handle(&message("U1", "C1", "showme reactions")).await.unwrap();

    let sent = sent.lock().unwrap();
    assert_eq!(*sent, vec![("U1".to_string(), "```no reactions found```".to_string())]);
}

#[tokio::test]
async fn test_reply_goes_to_the_requester_in_dm_mode() {
    let (runtime, sent) = setup_with_replies(RunMode::Dm).await;
    let pipeline = runtime.pipeline();

    pipeline.handle(&reaction_added("U1", "U2", "tada")).await.unwrap();
    pipeline.handle(&message("U3", "C1", "showme received")).await.unwrap();

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "U3");
    assert_eq!(sent[0].1, "```bob  1\n```");
}

#[tokio::test]
async fn test_reply_goes_to_the_channel_in_channel_mode() {
    let (runtime, sent) = setup_with_replies(RunMode::Channel).await;
    let pipeline = runtime.pipeline();

    pipeline.handle(&reaction_added("U1", "U2", "tada")).await.unwrap();
    pipeline.handle(&reaction_added("U3", "U2", "tada")).await.unwrap();
    pipeline.handle(&reaction_added("U2", "U1", "tada")).await.unwrap();
    pipeline.handle(&message("U3", "C1", "showme top tada")).await.unwrap();

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "C1");
    assert_eq!(sent[0].1, "```bob    2\nalice  1\n```");
}

#[tokio::test]
async fn test_emoji_aliases_resolve_before_querying() {
    let (runtime, sent) = setup_with_replies(RunMode::Dm).await;
    let pipeline = runtime.pipeline();

    pipeline.handle(&reaction_added("U1", "U2", "+1")).await.unwrap();
    pipeline.handle(&message("U3", "D1", "showme clicked thumbsup")).await.unwrap();

    let sent = sent.lock().unwrap();
    assert_eq!(sent[0].1, "```alice  1\n```");
}

#[tokio::test]
async fn test_unknown_reaction_reports_its_name() {
    let (runtime, sent) = setup_with_replies(RunMode::Dm).await;

    runtime.pipeline().handle(&message("U1", "C1", "showme all rocket")).await.unwrap();

    let sent = sent.lock().unwrap();
    assert_eq!(sent[0].1, "```no 'rocket' reactions found```");
}

#[tokio::test]
async fn test_invalid_emoji_gets_the_usage_text() {
    let (runtime, sent) = setup_with_replies(RunMode::Dm).await;

    runtime.pipeline().handle(&message("U1", "C1", "showme top a/b")).await.unwrap();

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("usage:"));
    assert!(sent[0].1.contains("showme  [top|all|clicked] <reaction>"));
}

#[tokio::test]
async fn test_bot_and_chatter_messages_are_ignored() {
    let (runtime, sent) = setup_with_replies(RunMode::Channel).await;
    let pipeline = runtime.pipeline();

    pipeline.handle(&message("UBOT", "C1", "showme version")).await.unwrap();
    pipeline.handle(&message("U1", "C1", "good morning")).await.unwrap();
    pipeline.handle(&json!({ "type": "user_typing", "user": "U1" })).await.unwrap();

    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_version_reports_the_revision() {
    let (runtime, sent) = setup_with_replies(RunMode::Dm).await;

    runtime.pipeline().handle(&message("U1", "C1", "showme version")).await.unwrap();

    let sent = sent.lock().unwrap();
    assert!(sent[0].1.contains("head:          abc1234"));
}

// Supervisor.

#[tokio::test(start_paused = true)]
async fn test_supervisor_backs_off_linearly_and_resets_on_connect() {
    let mut chat = MockChat::new();
    let mut seq = Sequence::new();

    chat.expect_bot_user_id().return_const("UBOT".to_string());
    chat.expect_connect()
        .times(2)
        .in_sequence(&mut seq)
        .returning(|| Err(anyhow::anyhow!("connection refused")));
    chat.expect_connect().times(1).in_sequence(&mut seq).returning(|| Ok(()));
    chat.expect_next_event()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(Some(json!({ "type": "user_typing", "user": "U1" }))));
    chat.expect_next_event()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Err(anyhow::anyhow!("socket closed")));

    let db = DbClient::surreal_memory().await.unwrap();
    let runtime = setup_test_environment(RunMode::Dm, chat, db).await;
    let mut supervisor = Supervisor::new(&runtime);

    let start = tokio::time::Instant::now();

    // First failure retries immediately, the second waits one step.
    supervisor.step().await.unwrap();
    assert_eq!(supervisor.backoff().retries(), 1);
    supervisor.step().await.unwrap();
    assert_eq!(supervisor.backoff().retries(), 2);
    assert_eq!(start.elapsed(), Duration::from_secs(2));

    // A successful connection resets the counter; losing it starts over.
    supervisor.step().await.unwrap();
    assert_eq!(supervisor.backoff().retries(), 1);
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}

#[tokio::test]
async fn test_supervisor_records_streamed_reactions() {
    let mut chat = MockChat::new();
    let mut seq = Sequence::new();

    chat.expect_bot_user_id().return_const("UBOT".to_string());
    chat.expect_connect().times(1).returning(|| Ok(()));
    chat.expect_next_event()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(Some(reaction_added("U1", "U2", "tada"))));
    chat.expect_next_event()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Err(anyhow::anyhow!("socket closed")));

    let db = DbClient::surreal_memory().await.unwrap();
    let runtime = setup_test_environment(RunMode::Dm, chat, db).await;

    Supervisor::new(&runtime).step().await.unwrap();

    let totals = runtime.db.sum_by_recipient(Some("tada")).await.unwrap();
    assert_eq!(totals.len(), 1);
    assert_eq!(totals[0].total, 1);
}

#[tokio::test]
async fn test_supervisor_stops_when_the_store_is_unavailable() {
    let sent = Sent::default();
    let mut chat = get_mock_chat(sent.clone());

    chat.expect_connect().times(1).returning(|| Ok(()));
    chat.expect_next_event()
        .times(1)
        .returning(|| Ok(Some(message("U1", "C1", "showme reactions"))));

    let db = DbClient::surreal_memory_uninitialized().await.unwrap();
    let runtime = setup_test_environment(RunMode::Dm, chat, db).await;

    let err = Supervisor::new(&runtime).run().await.unwrap_err();

    assert_eq!(exit_code_for(&err), 2);
    assert!(sent.lock().unwrap().is_empty());
}
