use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use labs_portal::{
    connection::{ChatConnection, ClientMessage, ServerMessage},
    ChatRequest, CompletionBackend, CompletionDriver, CompletionError, Credential, FragmentStream,
    Role, Turn,
};
use tokio::sync::mpsc;

/// Replays the same fragments for every request; an `Err` entry fails the
/// stream at that point.
struct FakeBackend {
    script: Vec<Result<&'static str, &'static str>>,
    calls: AtomicUsize,
}

impl FakeBackend {
    fn new(script: Vec<Result<&'static str, &'static str>>) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CompletionBackend for FakeBackend {
    async fn open_stream(
        &self,
        _request: &ChatRequest,
        _credential: &Credential,
    ) -> Result<FragmentStream, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let items: Vec<_> = self
            .script
            .iter()
            .map(|item| match item {
                Ok(text) => Ok(text.to_string()),
                Err(message) => Err(CompletionError::Remote(message.to_string())),
            })
            .collect();
        Ok(stream::iter(items).boxed())
    }
}

fn submit(text: &str, api_key: Option<&str>) -> ClientMessage {
    ClientMessage::Submit {
        text: text.to_string(),
        model: "GPT-4.1".to_string(),
        temperature: 0.7,
        system_prompt: "You are helpful.".to_string(),
        api_key: api_key.map(str::to_string),
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        messages.push(msg);
    }
    messages
}

fn connection(backend: Arc<FakeBackend>) -> ChatConnection {
    ChatConnection::new(CompletionDriver::new(backend))
}

#[test_log::test(tokio::test)]
async fn test_submission_streams_then_commits() {
    let mut conn = connection(FakeBackend::new(vec![Ok("Hi"), Ok(" there"), Ok("!")]));
    let (tx, mut rx) = mpsc::unbounded_channel();

    conn.handle(submit("Hello", Some("sk-test")), &tx).await;

    assert_eq!(
        drain(&mut rx),
        vec![
            ServerMessage::UserTurn { content: "Hello".to_string() },
            ServerMessage::AssistantStarted,
            ServerMessage::Fragment { text: "Hi".to_string() },
            ServerMessage::Fragment { text: " there".to_string() },
            ServerMessage::Fragment { text: "!".to_string() },
            ServerMessage::AssistantCommitted { content: "Hi there!".to_string() },
        ]
    );
    assert_eq!(
        conn.session().all(),
        &[Turn::user("Hello"), Turn::assistant("Hi there!")]
    );
}

#[test_log::test(tokio::test)]
async fn test_missing_key_prompts_and_stores_nothing() {
    let backend = FakeBackend::new(vec![Ok("never")]);
    let mut conn = connection(backend.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    conn.handle(submit("Hello", None), &tx).await;
    conn.handle(submit("Hello", Some("")), &tx).await;

    assert_eq!(
        drain(&mut rx),
        vec![
            ServerMessage::CredentialRequired {
                message: "Please add your OpenAI API key to continue.".to_string()
            };
            2
        ]
    );
    assert!(conn.session().is_empty());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[test_log::test(tokio::test)]
async fn test_failed_cycle_reports_error_and_stays_usable() {
    let backend = FakeBackend::new(vec![
        Ok("one"),
        Ok("two"),
        Err("connection reset"),
        Ok("four"),
        Ok("five"),
    ]);
    let mut conn = connection(backend.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    conn.handle(submit("first", Some("sk-test")), &tx).await;
    let messages = drain(&mut rx);

    let fragments = messages
        .iter()
        .filter(|m| matches!(m, ServerMessage::Fragment { .. }))
        .count();
    assert_eq!(fragments, 2);
    match messages.last().unwrap() {
        ServerMessage::Error { message, hint } => {
            assert!(message.starts_with("Error: "));
            assert!(message.contains("connection reset"));
            assert_eq!(hint.as_deref(), Some("Please check your API key and try again."));
        }
        other => panic!("expected error, got {:?}", other),
    }
    // Only the user turn survives the failed cycle.
    assert_eq!(conn.session().all(), &[Turn::user("first")]);

    // The user resubmits; consecutive user turns are tolerated.
    conn.handle(submit("second", Some("sk-test")), &tx).await;
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    assert_eq!(conn.session().all(), &[Turn::user("first"), Turn::user("second")]);
}

#[test_log::test(tokio::test)]
async fn test_system_prompt_never_enters_history() {
    let mut conn = connection(FakeBackend::new(vec![Ok("ok")]));
    let (tx, _rx) = mpsc::unbounded_channel();

    for text in ["a", "b", "c"] {
        conn.handle(submit(text, Some("sk-test")), &tx).await;
    }

    assert_eq!(conn.session().len(), 6);
    assert!(conn.session().all().iter().all(|t| t.role != Role::System));
}

#[test_log::test(tokio::test)]
async fn test_new_chat_resets_history() {
    let mut conn = connection(FakeBackend::new(vec![Ok("ok")]));
    let (tx, mut rx) = mpsc::unbounded_channel();

    conn.handle(submit("Hello", Some("sk-test")), &tx).await;
    drain(&mut rx);
    conn.handle(ClientMessage::NewChat, &tx).await;

    assert_eq!(drain(&mut rx), vec![ServerMessage::History { turns: Vec::new() }]);
    assert!(conn.session().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_invalid_temperature_is_rejected_before_storing() {
    let backend = FakeBackend::new(vec![Ok("ok")]);
    let mut conn = connection(backend.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    conn.handle(
        ClientMessage::Submit {
            text: "Hello".to_string(),
            model: "GPT-4".to_string(),
            temperature: 2.5,
            system_prompt: String::new(),
            api_key: Some("sk-test".to_string()),
        },
        &tx,
    )
    .await;

    let messages = drain(&mut rx);
    assert!(matches!(messages.as_slice(), [ServerMessage::Error { .. }]));
    assert!(conn.session().is_empty());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[test_log::test(tokio::test)]
async fn test_blank_submission_is_ignored() {
    let mut conn = connection(FakeBackend::new(vec![Ok("ok")]));
    let (tx, mut rx) = mpsc::unbounded_channel();

    conn.handle(submit("   ", Some("sk-test")), &tx).await;

    assert!(drain(&mut rx).is_empty());
    assert!(conn.session().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_sidebar_actions_only_acknowledge() {
    let mut conn = connection(FakeBackend::new(vec![Ok("ok")]));
    let (tx, mut rx) = mpsc::unbounded_channel();

    conn.handle(ClientMessage::AddKnowledgeBase, &tx).await;
    conn.handle(ClientMessage::BuildRag, &tx).await;
    conn.handle(
        ClientMessage::OpenRecent {
            title: "Ad Copy Generation".to_string(),
        },
        &tx,
    )
    .await;
    conn.handle(
        ClientMessage::SelectKnowledgeBase {
            name: "Playbooks".to_string(),
        },
        &tx,
    )
    .await;
    conn.handle(
        ClientMessage::Attach {
            file_name: "brief.pdf".to_string(),
        },
        &tx,
    )
    .await;
    conn.handle(
        ClientMessage::Attach {
            file_name: "photo.jpg".to_string(),
        },
        &tx,
    )
    .await;

    let messages = drain(&mut rx);
    assert_eq!(
        messages[..4],
        [
            ServerMessage::Info { message: "Upload documents to knowledge base".to_string() },
            ServerMessage::Info { message: "RAG system building...".to_string() },
            ServerMessage::Info { message: "Loading Ad Copy Generation...".to_string() },
            ServerMessage::Info {
                message: "Playbooks: Marketing Playbook, Sales Process, Brand Guidelines".to_string()
            },
        ]
    );
    assert_eq!(
        messages[4],
        ServerMessage::Success { message: "File uploaded: brief.pdf".to_string() }
    );
    assert!(matches!(messages[5], ServerMessage::Error { .. }));
    assert!(conn.session().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_unreadable_frame_is_reported() {
    let mut conn = connection(FakeBackend::new(vec![Ok("ok")]));
    let (tx, mut rx) = mpsc::unbounded_channel();

    conn.handle_text("{\"type\":\"launch_rockets\"}", &tx).await;

    let messages = drain(&mut rx);
    assert!(matches!(
        messages.as_slice(),
        [ServerMessage::Error { message, .. }] if message.starts_with("Unreadable message")
    ));
}

#[tokio::test]
async fn test_greeting_announces_empty_session() {
    let conn = connection(FakeBackend::new(vec![]));

    let greeting = conn.greeting();

    assert_eq!(
        greeting,
        vec![
            ServerMessage::Ready { session_id: conn.session().id() },
            ServerMessage::History { turns: Vec::new() },
        ]
    );
}
