// End-to-end exchanges through RouterService backed by a real SQLite store

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::config::{CacheConfig, DatabaseConfig, Settings};
use crate::database::{ContextStore, DbPool, SessionRepository};
use crate::models::chat::{ChatEvent, ChatRequest, Role, Topic};
use crate::services::conversation::SessionCache;
use crate::services::llm_service::{Fragment, FragmentStream, MockGenerationClient};
use crate::services::RouterService;
use crate::utils::clock::ManualClock;
use crate::utils::error::RouterError;

struct Harness {
    router: RouterService,
    cache: Arc<SessionCache>,
    store: Arc<SessionRepository>,
    clock: Arc<ManualClock>,
}

async fn harness(client: MockGenerationClient) -> Harness {
    let pool = DbPool::new(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        pool_max_size: 1,
        pool_timeout_seconds: 5,
    })
    .await
    .unwrap();
    let store = Arc::new(SessionRepository::new(pool));
    store.init_schema().await.unwrap();

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let cache = Arc::new(SessionCache::new(
        store.clone(),
        clock.clone(),
        CacheConfig::default(),
    ));

    let settings = Settings::defaults().unwrap();
    let router = RouterService::from_settings(&settings, cache.clone(), Arc::new(client));

    Harness {
        router,
        cache,
        store,
        clock,
    }
}

fn request(query: &str, session_id: &str) -> ChatRequest {
    ChatRequest {
        query: query.to_string(),
        session_id: session_id.to_string(),
        model: None,
        stream: None,
    }
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_one_shot_coding_exchange() {
    let mut client = MockGenerationClient::new();
    client
        .expect_generate()
        .times(1)
        .returning(|model: &str, prompt: &str| {
            assert_eq!(model, "codellama:7b-instruct");
            assert!(prompt.starts_with("You are an expert TypeScript/JavaScript developer."));
            assert!(prompt.ends_with("User: debug this function\nAssistant:"));
            Ok("Sure, add a breakpoint first.".to_string())
        });
    let h = harness(client).await;

    let session = h.router.create_session(None).await.unwrap();
    let resp = h
        .router
        .chat(&request("debug this function", &session.id))
        .await
        .unwrap();
    assert_eq!(resp.model, "codellama:7b-instruct");

    let session = h.router.get_session(&session.id).await.unwrap();
    assert_eq!(session.topic, Some(Topic::Coding));
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[0].role, Role::User);
    assert_eq!(session.messages[1].role, Role::Assistant);
    assert_eq!(session.messages[1].model.as_deref(), Some("codellama:7b-instruct"));
    assert_eq!(session.messages[1].topic, Some(Topic::Coding));

    // durable copy catches up on flush
    assert_eq!(h.cache.flush_dirty().await, 1);
    let durable = h.store.load(&session.id).await.unwrap().unwrap();
    assert_eq!(durable, session);
}

#[tokio::test]
async fn test_streaming_exchange() {
    let mut client = MockGenerationClient::new();
    client.expect_generate_stream().times(1).returning(|_, _| {
        let fragments: FragmentStream = Box::pin(futures::stream::iter(vec![
            Ok(Fragment::new("Sure", false)),
            Ok(Fragment::new(", ", false)),
            Ok(Fragment::new("here", false)),
            Ok(Fragment::new(" you go", true)),
        ]));
        Ok(fragments)
    });
    let h = harness(client).await;

    let rx = h
        .router
        .chat_stream(&request("a recipe for soup", "kitchen"))
        .await
        .unwrap();
    let events = drain(rx).await;

    let chunks: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Chunk { chunk, .. } => Some(chunk.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec!["Sure", ", ", "here", " you go"]);
    assert_eq!(
        events.first(),
        Some(&ChatEvent::Started {
            session_id: "kitchen".into(),
            model: "llama3.2:3b".into()
        })
    );
    assert_eq!(events.last(), Some(&ChatEvent::completed("kitchen")));
    assert_eq!(events.len(), 6);

    let session = h.router.get_session("kitchen").await.unwrap();
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[1].content, "Sure, here you go");
}

#[tokio::test]
async fn test_backend_failure_after_started() {
    let mut client = MockGenerationClient::new();
    client
        .expect_generate_stream()
        .returning(|_, _| Err(RouterError::Backend("connection refused".into())));
    let h = harness(client).await;

    let events = drain(
        h.router
            .chat_stream(&request("hello", "s1"))
            .await
            .unwrap(),
    )
    .await;

    let kinds: Vec<_> = events.iter().map(ChatEvent::kind).collect();
    assert_eq!(kinds, vec!["started", "error"]);

    let session = h.router.get_session("s1").await.unwrap();
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].role, Role::User);
}

#[tokio::test]
async fn test_history_survives_eviction() {
    let mut client = MockGenerationClient::new();
    client
        .expect_generate()
        .returning(|_, _| Ok("Swings and goblet squats.".to_string()));
    let h = harness(client).await;

    h.router
        .chat(&request("a kettlebell workout", "s1"))
        .await
        .unwrap();
    h.cache.run_maintenance().await;
    let before = h.router.get_session("s1").await.unwrap();

    h.clock.advance(Duration::minutes(31));
    h.cache.run_maintenance().await;
    assert!(h.cache.is_empty());

    // ambiguous follow-up keeps the stored topic and sees the stored history
    let prepared = h
        .router
        .process_request(&request("how many sets?", "s1"))
        .await
        .unwrap();

    assert_eq!(prepared.topic, Topic::Fitness);
    assert_eq!(prepared.session.messages[..2], before.messages[..]);
    assert!(prepared.prompt.contains("assistant: Swings and goblet squats."));
}
