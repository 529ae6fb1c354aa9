use async_trait::async_trait;
use gitlab_assistant::agent::{ Assistant, FinishReason };
use gitlab_assistant::gitlab::{ GitLabClient, GitLabConfig };
use gitlab_assistant::history::{ HistoryStore, SqliteHistoryStore };
use gitlab_assistant::llm::chat::{
    ChatClient,
    CompletionRequest,
    LlmError,
    ModelMessage,
    ModelToolCall,
    StepEvent,
    StepStream,
};
use gitlab_assistant::models::chat::{ ChatMessage, Role, ToolCallRecord };
use gitlab_assistant::models::stream::StreamEvent;
use gitlab_assistant::tools::ToolRegistry;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{ Arc, Mutex };
use tokio::sync::mpsc;

/// Plays back canned steps and records every request it receives.
struct ScriptedClient {
    steps: Mutex<VecDeque<Result<Vec<StepEvent>, u16>>>,
    repeat: Option<Vec<StepEvent>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    fn new(steps: Vec<Vec<StepEvent>>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().map(Ok).collect()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn always(step: Vec<StepEvent>) -> Self {
        Self { repeat: Some(step), ..Self::new(Vec::new()) }
    }

    fn failing(status: u16) -> Self {
        Self {
            steps: Mutex::new(VecDeque::from(vec![Err(status)])),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn stream_step(&self, request: &CompletionRequest) -> Result<StepStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.steps.lock().unwrap().pop_front();
        let events = match next {
            Some(Ok(events)) => events,
            Some(Err(status)) => {
                return Err(LlmError::Status { status, body: "provider down".into() });
            }
            None => self.repeat.clone().unwrap_or_else(|| vec![StepEvent::Finish { reason: None }]),
        };
        Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
    }

    fn get_model(&self) -> String {
        "scripted".into()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}

fn text(delta: &str) -> StepEvent {
    StepEvent::TextDelta(delta.into())
}

fn tool_call(id: &str, name: &str, args: &str) -> StepEvent {
    StepEvent::ToolCall(ModelToolCall::function(id, name, args))
}

fn finish() -> StepEvent {
    StepEvent::Finish { reason: Some("stop".into()) }
}

async fn setup(client: ScriptedClient) -> (Assistant, Arc<ScriptedClient>, Arc<dyn HistoryStore>) {
    let client = Arc::new(client);
    let store: Arc<dyn HistoryStore> = Arc::new(
        SqliteHistoryStore::connect("sqlite::memory:").await.unwrap()
    );
    let tools = ToolRegistry::new(
        GitLabClient::new(GitLabConfig {
            base_url: "http://127.0.0.1:9/api/v4".into(),
            token: None,
            max_pages: 1,
        })
    );
    let assistant = Assistant::from_parts(
        client.clone(),
        store.clone(),
        tools,
        "You are a GitLab assistant.".into(),
        5
    );
    (assistant, client, store)
}

fn drain(rx: &mut mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn plain_reply_creates_chat_streams_and_persists() {
    let (assistant, _, store) = setup(ScriptedClient::new(vec![vec![text("Hel"), text("lo"), finish()]])).await;
    let (tx, mut rx) = mpsc::channel(64);

    let outcome = assistant
        .process_turn(None, vec![ChatMessage::user("u1", "Say hello")], &tx).await
        .unwrap();

    assert_eq!(outcome.steps, 1);
    assert_eq!(outcome.finish_reason, FinishReason::Stop);
    assert!(outcome.persisted);

    let events = drain(&mut rx);
    assert!(matches!(&events[0], StreamEvent::Start { chat_id } if *chat_id == outcome.chat_id));
    assert!(matches!(&events[1], StreamEvent::TextDelta { delta } if delta == "Hel"));
    assert!(matches!(&events[2], StreamEvent::TextDelta { delta } if delta == "lo"));
    assert!(matches!(events.last(), Some(StreamEvent::Finish { messages, .. }) if messages.len() == 2));

    let stored = store.load_chat(&outcome.chat_id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].role, Role::Assistant);
    assert_eq!(stored[1].content, "Hello");
    assert_eq!(stored[1].metadata.as_ref().unwrap()["finishReason"], "stop");

    let page = store.list_chats(10, 0).await.unwrap();
    assert_eq!(page.chats[0].title, "Say hello");
}

#[tokio::test]
async fn model_that_always_calls_tools_stops_after_five_steps() {
    let (assistant, client, store) = setup(
        ScriptedClient::always(vec![tool_call("call", "listAllGroups", "{}"), finish()])
    ).await;
    let (tx, mut rx) = mpsc::channel(256);

    let outcome = assistant
        .process_turn(None, vec![ChatMessage::user("u1", "loop forever")], &tx).await
        .unwrap();

    assert_eq!(client.requests().len(), 5);
    assert_eq!(outcome.steps, 5);
    assert_eq!(outcome.finish_reason, FinishReason::StepLimit);

    let tool_events = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, StreamEvent::ToolCall { .. }))
        .count();
    assert_eq!(tool_events, 5);

    let stored = store.load_chat(&outcome.chat_id).await.unwrap();
    let reply = &stored[1];
    assert_eq!(reply.tool_calls.as_ref().unwrap().len(), 5);
    assert_eq!(reply.metadata.as_ref().unwrap()["steps"], 5);
    assert_eq!(reply.metadata.as_ref().unwrap()["finishReason"], "step-limit");
}

#[tokio::test]
async fn tool_results_feed_the_next_step() {
    let (assistant, client, store) = setup(
        ScriptedClient::new(
            vec![
                vec![tool_call("call_1", "listAllGroups", ""), finish()],
                vec![text("Your token is missing."), finish()]
            ]
        )
    ).await;
    let (tx, mut rx) = mpsc::channel(64);

    let outcome = assistant
        .process_turn(None, vec![ChatMessage::user("u1", "list groups")], &tx).await
        .unwrap();
    assert_eq!(outcome.steps, 2);

    let second = &client.requests()[1];
    let expected = "Configuration error: GITLAB_TOKEN environment variable is not set.";
    assert!(
        second.messages
            .iter()
            .any(
                |m| matches!(m, ModelMessage::Tool { tool_call_id, content } if tool_call_id == "call_1" && content == expected)
            )
    );

    let events = drain(&mut rx);
    let call_at = events
        .iter()
        .position(|e| matches!(e, StreamEvent::ToolCall { tool_name, .. } if tool_name == "listAllGroups"))
        .unwrap();
    assert!(
        matches!(&events[call_at + 1], StreamEvent::ToolResult { output, .. } if output == expected)
    );

    let stored = store.load_chat(&outcome.chat_id).await.unwrap();
    let record = &stored[1].tool_calls.as_ref().unwrap()[0];
    assert_eq!(record.input, json!({}));
    assert_eq!(record.output.as_deref(), Some(expected));
    assert_eq!(stored[1].content, "Your token is missing.");
}

#[tokio::test]
async fn rejected_tool_calls_are_streamed_but_not_stored() {
    let (assistant, _, store) = setup(
        ScriptedClient::new(
            vec![
                vec![tool_call("bad", "deleteProject", "{}"), finish()],
                vec![text("Which project?"), finish()]
            ]
        )
    ).await;
    let (tx, mut rx) = mpsc::channel(64);

    let outcome = assistant
        .process_turn(None, vec![ChatMessage::user("u1", "delete it")], &tx).await
        .unwrap();

    assert!(
        drain(&mut rx)
            .iter()
            .any(|e| matches!(e, StreamEvent::ToolResult { tool_call_id, .. } if tool_call_id == "bad"))
    );
    let stored = store.load_chat(&outcome.chat_id).await.unwrap();
    assert!(stored[1].tool_calls.is_none());

    // The stored transcript must still validate on the next turn.
    assert!(assistant.validate(&stored).is_ok());
}

#[tokio::test]
async fn previous_history_is_replayed() {
    let (assistant, client, store) = setup(
        ScriptedClient::new(vec![vec![text("one"), finish()], vec![text("two"), finish()]])
    ).await;
    let (tx, _rx) = mpsc::channel(64);

    let first = assistant
        .process_turn(None, vec![ChatMessage::user("u1", "first")], &tx).await
        .unwrap();
    let second = assistant
        .process_turn(
            Some(first.chat_id.clone()),
            vec![ChatMessage::user("u2", "second")],
            &tx
        ).await
        .unwrap();

    assert_eq!(second.chat_id, first.chat_id);
    assert_eq!(client.requests()[1].messages.len(), 3);
    assert_eq!(store.load_chat(&first.chat_id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn invalid_history_falls_back_to_new_messages() {
    let (assistant, client, store) = setup(ScriptedClient::new(vec![vec![text("ok"), finish()]])).await;
    let chat_id = store.create_chat().await.unwrap();
    store.save_chat(
        &chat_id,
        &[
            ChatMessage::user("old-u", "old question"),
            ChatMessage {
                tool_calls: Some(
                    vec![ToolCallRecord {
                        id: "legacy".into(),
                        name: "removedTool".into(),
                        input: json!({}),
                        output: Some("done".into()),
                    }]
                ),
                ..ChatMessage::assistant("old-a", "")
            },
        ]
    ).await.unwrap();
    let (tx, _rx) = mpsc::channel(64);

    let outcome = assistant
        .process_turn(Some(chat_id.clone()), vec![ChatMessage::user("u1", "fresh")], &tx).await
        .unwrap();

    let request = &client.requests()[0];
    assert_eq!(request.messages, vec![ModelMessage::User { content: "fresh".into() }]);
    assert_eq!(outcome.messages.len(), 2);

    // Stored rows are upserted, not replaced, so the old ones remain.
    assert_eq!(store.load_chat(&chat_id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn unknown_chat_id_runs_with_empty_history() {
    let (assistant, client, _) = setup(ScriptedClient::new(vec![vec![text("hi"), finish()]])).await;
    let (tx, _rx) = mpsc::channel(64);

    let outcome = assistant
        .process_turn(Some("missing".into()), vec![ChatMessage::user("u1", "hello")], &tx).await
        .unwrap();

    assert_eq!(client.requests()[0].messages.len(), 1);
    assert_eq!(outcome.messages.len(), 2);
    assert!(!outcome.persisted);
}

#[tokio::test]
async fn provider_failure_emits_error_and_persists_nothing() {
    let (assistant, _, store) = setup(ScriptedClient::failing(503)).await;
    let chat_id = store.create_chat().await.unwrap();
    let (tx, mut rx) = mpsc::channel(64);

    let result = assistant.process_turn(
        Some(chat_id.clone()),
        vec![ChatMessage::user("u1", "hello")],
        &tx
    ).await;

    assert!(result.is_err());
    let events = drain(&mut rx);
    assert!(matches!(events.last(), Some(StreamEvent::Error { message }) if message.contains("503")));
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Finish { .. })));
    assert!(store.load_chat(&chat_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn turn_survives_a_closed_event_channel() {
    let (assistant, _, store) = setup(ScriptedClient::new(vec![vec![text("late"), finish()]])).await;
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let outcome = assistant
        .process_turn(None, vec![ChatMessage::user("u1", "bye")], &tx).await
        .unwrap();

    assert!(outcome.persisted);
    assert_eq!(store.load_chat(&outcome.chat_id).await.unwrap().len(), 2);
}
