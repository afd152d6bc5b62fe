use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::json;

use colloquy::{
    BufferRenderer, ChunkStream, ConversationSession, CorpusRetriever, Error, History,
    InferenceTransport, LanguageDirective, OcrEngine, Payload, ProviderCatalog, ProviderSpec,
    RequestAdapter, Result, Role, SessionState, StreamChunk,
};

type Script = Result<Vec<Result<StreamChunk>>>;

/// Replays canned chunk sequences and records every payload it is asked to send.
#[derive(Default)]
struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    payloads: Mutex<Vec<Payload>>,
}

impl ScriptedTransport {
    fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    fn payloads(&self) -> Vec<Payload> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl InferenceTransport for ScriptedTransport {
    async fn open_stream(&self, _: &ProviderSpec, payload: &Payload) -> Result<ChunkStream> {
        self.payloads.lock().unwrap().push(payload.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()));
        Ok(Box::pin(futures::stream::iter(script?)))
    }
}

fn spec(model_id: &str) -> ProviderSpec {
    ProviderCatalog::bedrock().lookup(model_id).unwrap().clone()
}

fn session(model_id: &str) -> (ConversationSession, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::default());
    let session = ConversationSession::new(spec(model_id), transport.clone());
    (session, transport)
}

fn chunk(value: serde_json::Value) -> Result<StreamChunk> {
    Ok(StreamChunk::new(serde_json::to_vec(&value).unwrap()))
}

fn titan(text: &str) -> Result<StreamChunk> {
    chunk(json!({ "outputText": text }))
}

#[tokio::test]
async fn anthropic_messages_round_trip() {
    let (mut session, transport) = session("anthropic.claude-3-sonnet-20240229-v1:0");
    transport.push(Ok(vec![
        chunk(json!({"type": "message_start", "message": {"role": "assistant"}})),
        chunk(json!({"type": "content_block_start", "index": 0})),
        chunk(json!({"type": "content_block_delta", "delta": {"type": "text_delta", "text": "床前"}})),
        chunk(json!({"type": "ping"})),
        chunk(json!({"type": "content_block_delta", "delta": {"type": "text_delta", "text": "明月光"}})),
        chunk(json!({"type": "content_block_stop", "index": 0})),
        chunk(json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}})),
        chunk(json!({"type": "message_stop"})),
    ]));

    let mut renderer = BufferRenderer::new();
    let outcome = session.process_turn("背一首诗", &mut renderer).await.unwrap();

    assert_eq!(outcome.chunk_count, 8);
    assert_eq!(outcome.reply, "床前明月光");
    assert_eq!(renderer.text(), outcome.reply);
    assert_eq!(renderer.fragments.len(), 2);
    let turns = session.history().turns();
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[1].content, outcome.reply);

    let payload = &transport.payloads()[0];
    assert_eq!(
        payload.get("messages"),
        Some(&json!([{"role": "user", "content": "背一首诗"}]))
    );
}

#[tokio::test]
async fn every_family_streams_and_records() {
    let cases = [
        ("amazon.titan-text-express-v1", json!({"outputText": "ok"})),
        ("meta.llama2-70b-chat-v1", json!({"generation": "ok"})),
        ("meta.llama3-8b-instruct-v1:0", json!({"generation": "ok"})),
        ("anthropic.claude-v2", json!({"completion": "ok"})),
        ("cohere.command-text-v14", json!({"generations": [{"text": "ok"}]})),
        ("mistral.mistral-7b-instruct-v0:2", json!({"outputs": [{"text": "ok"}]})),
    ];
    for (model_id, reply) in cases {
        let (mut session, transport) = session(model_id);
        transport.push(Ok(vec![chunk(reply)]));
        let outcome = session
            .process_turn("hello", &mut BufferRenderer::new())
            .await
            .unwrap();
        assert_eq!(outcome.reply, "ok", "{model_id}");
        assert_eq!(session.history().len(), 2, "{model_id}");
    }
}

#[tokio::test]
async fn user_text_is_sent_exactly_once() {
    for spec in ProviderCatalog::global().iter() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut session = ConversationSession::new(spec.clone(), transport.clone());
        let _ = session
            .process_turn("marker-7f3a", &mut BufferRenderer::new())
            .await;
        let payload = transport.payloads().remove(0);
        let body = String::from_utf8(payload.to_bytes().unwrap()).unwrap();
        assert_eq!(
            body.matches("marker-7f3a").count(),
            1,
            "{}: {body}",
            spec.model_id()
        );
    }
}

#[tokio::test]
async fn amazon_empty_history_sends_bare_text() {
    let (mut session, transport) = session("amazon.titan-text-express-v1");
    transport.push(Ok(vec![titan("你好！")]));
    session
        .process_turn("你好", &mut BufferRenderer::new())
        .await
        .unwrap();
    assert_eq!(transport.payloads()[0].get_str("inputText"), Some("你好"));

    transport.push(Ok(vec![titan("好的")]));
    session
        .process_turn("再见", &mut BufferRenderer::new())
        .await
        .unwrap();
    assert_eq!(
        transport.payloads()[1].get_str("inputText"),
        Some("User: 你好\nAssistant: 你好！\n再见")
    );
}

#[tokio::test]
async fn history_window_is_bounded() {
    let (session, transport) = session("cohere.command-light-text-v14");
    let mut session = session
        .with_history(History::with_pairs(5))
        .with_system("answer briefly");
    for i in 0..6 {
        transport.push(Ok(vec![chunk(json!({"generations": [{"text": format!("a{i}")}]}))]));
        session
            .process_turn(&format!("q{i}"), &mut BufferRenderer::new())
            .await
            .unwrap();
    }
    let history = session.history();
    assert_eq!(history.dialogue_len(), 10);
    assert_eq!(history.system(), Some("answer briefly"));
    assert!(history.turns().iter().all(|t| t.content != "q0" && t.content != "a0"));
    assert_eq!(history.dialogue()[0].content, "q1");
    assert_eq!(history.dialogue()[9].content, "a5");

    let last = transport.payloads().pop().unwrap();
    let prompt = last.get_str("prompt").unwrap();
    assert!(prompt.starts_with("System: answer briefly\nUser: q0\nAssistant: a0\n"));
    assert!(prompt.ends_with("User: q5"));
}

#[tokio::test]
async fn decode_error_keeps_partial_text_and_session_recovers() {
    let (mut session, transport) = session("amazon.titan-text-express-v1");
    transport.push(Ok(vec![
        titan("part"),
        Ok(StreamChunk::from("{not json")),
        titan("never shown"),
    ]));
    let mut renderer = BufferRenderer::new();
    let err = session.process_turn("q", &mut renderer).await.unwrap_err();
    assert!(err.is_decode());
    assert!(!err.is_fatal());
    assert_eq!(renderer.text(), "part");
    assert_eq!(renderer.finished, 0);
    let turns = session.history().turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].content, "part");

    transport.push(Ok(vec![titan("fine")]));
    let outcome = session
        .process_turn("again", &mut BufferRenderer::new())
        .await
        .unwrap();
    assert_eq!(outcome.reply, "fine");
    assert_eq!(session.history().len(), 4);
}

#[tokio::test]
async fn failure_before_any_text_discards_turn() {
    let (mut session, transport) = session("meta.llama3-70b-instruct-v1:0");
    transport.push(Ok(vec![Err(Error::streaming("connection reset", None))]));
    let err = session
        .process_turn("q", &mut BufferRenderer::new())
        .await
        .unwrap_err();
    assert!(err.is_transport());
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn payload_template_is_never_mutated() {
    let (mut session, transport) = session("meta.llama3-70b-instruct-v1:0");
    let before = session.spec().template().clone();
    transport.push(Ok(vec![chunk(json!({"generation": "x"}))]));
    session
        .process_turn("q", &mut BufferRenderer::new())
        .await
        .unwrap();
    assert_eq!(session.spec().template(), &before);
    assert!(!before.contains_key("prompt"));
    assert!(transport.payloads()[0].get("prompt").is_some());
}

#[tokio::test]
async fn language_directive_follows_input() {
    let transport = Arc::new(ScriptedTransport::default());
    let mut session = ConversationSession::new(spec("mistral.mixtral-8x7b-instruct-v0:1"), transport.clone())
        .with_adapter(RequestAdapter::new(LanguageDirective::new("Chinese")));
    session
        .process_turn("红楼梦的作者是谁", &mut BufferRenderer::new())
        .await
        .unwrap();
    assert_eq!(
        transport.payloads()[0].get_str("prompt"),
        Some("<s>[INST] 红楼梦的作者是谁, please output in Chinese. [/INST]")
    );

    let transport = Arc::new(ScriptedTransport::default());
    let mut session = ConversationSession::new(spec("mistral.mixtral-8x7b-instruct-v0:1"), transport.clone())
        .with_adapter(RequestAdapter::new(LanguageDirective::disabled()));
    session
        .process_turn("hi", &mut BufferRenderer::new())
        .await
        .unwrap();
    assert_eq!(
        transport.payloads()[0].get_str("prompt"),
        Some("<s>[INST] hi [/INST]")
    );
}

#[tokio::test]
async fn retrieved_passages_frame_the_question() {
    let corpus = "贾宝玉 衔玉而诞 林黛玉 寄居贾府 \
                  薛宝钗 金锁 王熙凤 协理宁国府";
    let embedder = |text: &str| -> Vec<f32> {
        ["宝玉", "王熙凤", "宁国府"]
            .iter()
            .map(|name| text.matches(name).count() as f32)
            .collect()
    };
    let retriever = CorpusRetriever::from_text(corpus, 4, Arc::new(embedder))
        .await
        .unwrap();
    let (session, transport) = session("amazon.titan-text-express-v1");
    let mut session = session.with_retriever(Arc::new(retriever), 1);
    transport.push(Ok(vec![titan("王熙凤")]));
    session
        .process_turn("谁协理宁国府", &mut BufferRenderer::new())
        .await
        .unwrap();
    assert_eq!(
        transport.payloads()[0].get_str("inputText"),
        Some("Context:\n薛宝钗 金锁 王熙凤 协理宁国府\n\nQuestion:\n谁协理宁国府")
    );
    assert_eq!(session.history().turns()[0].content, "谁协理宁国府");
}

#[test]
fn unknown_model_is_rejected_with_choices() {
    let err = ProviderCatalog::bedrock().lookup("openai.gpt-4").unwrap_err();
    assert!(err.is_unknown_model());
    assert!(err.is_fatal());
    match err {
        Error::UnknownModel { valid, .. } => {
            assert_eq!(valid, ProviderCatalog::bedrock().model_ids());
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn completed_turn_is_recorded() {
    let (mut session, transport) = session("amazon.titan-text-express-v1");
    transport.push(Ok(vec![titan("你"), titan(""), titan("好")]));
    let mut renderer = BufferRenderer::new();

    let outcome = session.process_turn("hi", &mut renderer).await.unwrap();
    assert_eq!(outcome.reply, "你好");
    assert_eq!(outcome.chunk_count, 3);
    assert!(!outcome.interrupted);
    assert_eq!(renderer.fragments, vec!["你", "好"]);
    assert_eq!(renderer.started, 1);
    assert_eq!(renderer.finished, 1);
    assert_eq!(session.state(), SessionState::Idle);

    let turns = session.history().turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].content, "hi");
    assert_eq!(turns[1].content, "你好");
}

#[tokio::test]
async fn reply_without_text_is_not_recorded() {
    let (mut session, transport) = session("anthropic.claude-3-haiku-20240307-v1:0");
    let silent = || {
        Ok(vec![
            chunk(json!({"type": "message_start", "message": {"role": "assistant"}})),
            chunk(json!({"type": "message_stop"})),
        ])
    };
    transport.push(silent());
    transport.push(silent());

    let mut renderer = BufferRenderer::new();
    let outcome = session.process_turn("q1", &mut renderer).await.unwrap();
    assert_eq!(outcome.reply, "");
    assert_eq!(renderer.finished, 1);
    assert!(session.history().is_empty());

    session
        .process_turn("q2", &mut BufferRenderer::new())
        .await
        .unwrap();
    assert_eq!(
        transport.payloads()[1].get("messages"),
        Some(&json!([{"role": "user", "content": "q2"}]))
    );
}

#[tokio::test]
async fn open_failure_leaves_history_alone() {
    let (mut session, transport) = session("amazon.titan-text-express-v1");
    transport.push(Err(Error::rate_limit("slow down", None)));
    let err = session
        .process_turn("hi", &mut BufferRenderer::new())
        .await
        .unwrap_err();
    assert!(err.is_transport());
    assert!(session.history().is_empty());
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn interrupt_keeps_partial_reply() {
    let (mut session, transport) = session("amazon.titan-text-express-v1");
    transport.push(Ok(vec![titan("a"), titan("b"), titan("c")]));
    let mut renderer = BufferRenderer::interrupt_after(2);
    let outcome = session.process_turn("q", &mut renderer).await.unwrap();
    assert!(outcome.interrupted);
    assert_eq!(outcome.reply, "ab");
    assert_eq!(renderer.interrupted, 1);
    assert_eq!(renderer.finished, 0);
    assert_eq!(session.history().turns()[1].content, "ab");
}

#[tokio::test]
async fn interrupt_before_any_text_discards_turn() {
    let (mut session, transport) = session("amazon.titan-text-express-v1");
    transport.push(Ok(vec![titan("a")]));
    let mut renderer = BufferRenderer::interrupt_after(0);
    let outcome = session.process_turn("q", &mut renderer).await.unwrap();
    assert!(outcome.interrupted);
    assert_eq!(outcome.chunk_count, 0);
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn stale_ctrl_c_does_not_cancel_the_next_reply() {
    use std::sync::atomic::{AtomicBool, Ordering};

    let (mut session, transport) = session("amazon.titan-text-express-v1");
    transport.push(Ok(vec![titan("still "), titan("here")]));
    // set while a slow /voice or /image step was running
    let flag = Arc::new(AtomicBool::new(true));
    let mut renderer =
        colloquy::PlainTextRenderer::with_color(false).with_interrupt(flag.clone());
    let outcome = session.process_turn("q", &mut renderer).await.unwrap();
    assert!(!outcome.interrupted);
    assert_eq!(outcome.reply, "still here");
    assert!(!flag.load(Ordering::Relaxed));
}

#[tokio::test]
async fn system_prompt_survives_clear() {
    let (session, transport) = session("amazon.titan-text-lite-v1");
    let mut session = session.with_system("be brief");
    transport.push(Ok(vec![titan("x")]));
    session
        .process_turn("q", &mut BufferRenderer::new())
        .await
        .unwrap();
    assert_eq!(session.history().len(), 3);
    session.clear();
    assert_eq!(session.history().system(), Some("be brief"));
    assert_eq!(session.history().len(), 1);
    session.set_system(None);
    assert!(session.history().is_empty());
}

struct FixedOcr(&'static str);

#[async_trait::async_trait]
impl OcrEngine for FixedOcr {
    async fn extract_text(&self, _: &Path) -> Result<String> {
        Ok(self.0.to_string())
    }
}

#[tokio::test]
async fn image_input_prepends_recognized_text() {
    let (session, _) = session("amazon.titan-text-express-v1");
    let path = PathBuf::from("scan.png");
    let err = session.image_input(&path, None).await.unwrap_err();
    assert!(err.is_input());

    let session = session.with_ocr(Arc::new(FixedOcr("第一题")));
    assert!(session.has_ocr());
    assert_eq!(
        session.image_input(&path, Some(" 请解答 ")).await.unwrap(),
        "第一题\n请解答"
    );
    assert_eq!(session.image_input(&path, Some("")).await.unwrap(), "第一题");

    let (blank, _) = self::session("amazon.titan-text-express-v1");
    let blank = blank.with_ocr(Arc::new(FixedOcr("  ")));
    assert!(blank.image_input(&path, None).await.unwrap_err().is_input());
}

#[tokio::test]
async fn voice_input_requires_transcriber() {
    let (session, _) = session("amazon.titan-text-express-v1");
    assert!(!session.has_transcriber());
    let err = session.voice_input(Path::new("a.wav")).await.unwrap_err();
    assert!(matches!(err, Error::Transcription { .. }));
}
