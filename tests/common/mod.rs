#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use botcall_client::media::{LocalAudio, MediaBackend, PeerConnection};
use botcall_client::prefs::PreferenceStore;
use botcall_client::presenter::{Presenter, Severity};
use botcall_client::speech::{RecognitionSink, Recognizer, Synthesizer};
use botcall_client::types::{Phase, Sender};
use botcall_client::{Client, ClientBuilder, Config, MediaError, SpeechError};
use serde_json::{json, Value};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A discovery server, call endpoint and signaling channel in one process.
pub struct FakeBot {
    pub addr: SocketAddr,
    pub state: Arc<BotState>,
}

pub struct BotState {
    lookup_status: u16,
    status: String,
    mode: Option<String>,
    advertise_endpoint: bool,
    greeting: Option<String>,
    call_status: u16,
    push_on_connect: Vec<String>,
    endpoint: Mutex<Option<String>>,

    pub lookups: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<Value>>,
    pub agents: Mutex<Vec<String>>,
    pub received: Mutex<Vec<String>>,
    pub disconnects: AtomicUsize,
}

pub struct FakeBotBuilder {
    state: BotState,
}

impl FakeBot {
    pub fn builder() -> FakeBotBuilder {
        FakeBotBuilder {
            state: BotState {
                lookup_status: 200,
                status: "online".to_string(),
                mode: Some("direct".to_string()),
                advertise_endpoint: true,
                greeting: None,
                call_status: 200,
                push_on_connect: Vec::new(),
                endpoint: Mutex::new(None),
                lookups: Mutex::default(),
                calls: Mutex::default(),
                agents: Mutex::default(),
                received: Mutex::default(),
                disconnects: AtomicUsize::new(0),
            },
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn lookups(&self) -> Vec<String> {
        self.state.lookups.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<Value> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn agents(&self) -> Vec<String> {
        self.state.agents.lock().unwrap().clone()
    }

    /// Envelopes the bot received, parsed.
    pub fn received(&self) -> Vec<Value> {
        self.state
            .received
            .lock()
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect()
    }

    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }
}

impl FakeBotBuilder {
    pub fn lookup_status(mut self, status: u16) -> Self {
        self.state.lookup_status = status;
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.state.status = status.to_string();
        self
    }

    pub fn mode(mut self, mode: Option<&str>) -> Self {
        self.state.mode = mode.map(str::to_string);
        self
    }

    /// Without an advertised endpoint the client calls `{discovery}/call`.
    pub fn advertise_endpoint(mut self, advertise: bool) -> Self {
        self.state.advertise_endpoint = advertise;
        self
    }

    /// Advertises `endpoint` instead of this server's own address.
    pub fn endpoint(self, endpoint: &str) -> Self {
        *self.state.endpoint.lock().unwrap() = Some(endpoint.to_string());
        self
    }

    pub fn greeting(mut self, greeting: &str) -> Self {
        self.state.greeting = Some(greeting.to_string());
        self
    }

    pub fn call_status(mut self, status: u16) -> Self {
        self.state.call_status = status;
        self
    }

    /// A raw frame sent as soon as a channel connects.
    pub fn push_on_connect(mut self, frame: &str) -> Self {
        self.state.push_on_connect.push(frame.to_string());
        self
    }

    pub async fn start(self) -> FakeBot {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Bare host:port, the way bots register themselves.
        self.state
            .endpoint
            .lock()
            .unwrap()
            .get_or_insert_with(|| addr.to_string());

        let state = Arc::new(self.state);
        let app = Router::new()
            .route("/v1/lookup/{bot}", get(lookup))
            .route("/call", post(call))
            .route("/", get(channel))
            .with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        FakeBot { addr, state }
    }
}

async fn lookup(State(state): State<Arc<BotState>>, Path(bot): Path<String>) -> Response {
    state.lookups.lock().unwrap().push(bot);
    if state.lookup_status != 200 {
        return StatusCode::from_u16(state.lookup_status)
            .unwrap()
            .into_response();
    }
    let endpoint = if state.advertise_endpoint {
        state.endpoint.lock().unwrap().clone()
    } else {
        None
    };
    Json(json!({
        "status": state.status,
        "endpoint": endpoint,
        "mode": state.mode,
        "attestation_valid": true,
    }))
    .into_response()
}

async fn call(State(state): State<Arc<BotState>>, Json(body): Json<Value>) -> Response {
    state.calls.lock().unwrap().push(body);
    if state.call_status != 200 {
        return StatusCode::from_u16(state.call_status)
            .unwrap()
            .into_response();
    }
    Json(json!({
        "status": "accepted",
        "call_id": "call-1",
        "message": state.greeting,
        "webrtc": true,
    }))
    .into_response()
}

async fn channel(
    ws: WebSocketUpgrade,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<Arc<BotState>>,
) -> Response {
    if let Some(agent) = query.get("agent") {
        state.agents.lock().unwrap().push(agent.clone());
    }
    ws.on_upgrade(move |socket| echo(socket, state))
}

/// Answers every text envelope with `You said: <text>`.
async fn echo(mut socket: WebSocket, state: Arc<BotState>) {
    for frame in &state.push_on_connect {
        if socket.send(Message::Text(frame.clone().into())).await.is_err() {
            return;
        }
    }
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(raw) => {
                let raw = raw.as_str().to_string();
                state.received.lock().unwrap().push(raw.clone());
                let Ok(value) = serde_json::from_str::<Value>(&raw) else {
                    continue;
                };
                if let Some(text) = value.get("text").and_then(Value::as_str) {
                    let reply = json!({"type": "text", "text": format!("You said: {}", text)});
                    if socket
                        .send(Message::Text(reply.to_string().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    state.disconnects.fetch_add(1, Ordering::SeqCst);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Status(Phase, String),
    Entry(Sender, String),
    Notice(String, Severity),
    Interim(String),
    Voice(String),
}

/// Keeps everything the session rendered, in order. Elapsed ticks are counted only.
#[derive(Default)]
pub struct RecordingPresenter {
    rendered: Mutex<Vec<Rendered>>,
    ticks: AtomicUsize,
}

impl RecordingPresenter {
    pub fn rendered(&self) -> Vec<Rendered> {
        self.rendered.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<(Phase, String)> {
        self.rendered()
            .into_iter()
            .filter_map(|r| match r {
                Rendered::Status(phase, label) => Some((phase, label)),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<(String, Severity)> {
        self.rendered()
            .into_iter()
            .filter_map(|r| match r {
                Rendered::Notice(message, severity) => Some((message, severity)),
                _ => None,
            })
            .collect()
    }

    pub fn ticks(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }

    fn push(&self, rendered: Rendered) {
        self.rendered.lock().unwrap().push(rendered);
    }
}

impl Presenter for RecordingPresenter {
    fn render_status(&self, phase: Phase, label: &str) {
        self.push(Rendered::Status(phase, label.to_string()));
    }

    fn append_transcript_entry(&self, sender: Sender, text: &str) {
        self.push(Rendered::Entry(sender, text.to_string()));
    }

    fn render_elapsed(&self, _elapsed: Duration) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }

    fn notify(&self, message: &str, severity: Severity) {
        self.push(Rendered::Notice(message.to_string(), severity));
    }

    fn render_interim(&self, text: &str) {
        self.push(Rendered::Interim(text.to_string()));
    }

    fn render_voice_status(&self, text: &str) {
        self.push(Rendered::Voice(text.to_string()));
    }
}

/// Media that never touches a device. Counts what the session did with it.
#[derive(Default)]
pub struct FakeMedia {
    pub fail_capture: bool,
    pub acquired: Arc<AtomicUsize>,
    pub stopped: Arc<AtomicUsize>,
    pub peers: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    pub enabled: Arc<Mutex<Vec<bool>>>,
    pub ice_servers: Arc<Mutex<Vec<String>>>,
}

impl FakeMedia {
    pub fn failing() -> Self {
        Self {
            fail_capture: true,
            ..Self::default()
        }
    }

    pub fn live(&self) -> bool {
        self.acquired.load(Ordering::SeqCst) > self.stopped.load(Ordering::SeqCst)
    }
}

struct FakeTrack {
    stopped: Arc<AtomicUsize>,
    enabled: Arc<Mutex<Vec<bool>>>,
}

impl LocalAudio for FakeTrack {
    fn track_id(&self) -> String {
        "fake-mic".to_string()
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled.lock().unwrap().push(enabled);
    }

    fn stop(&mut self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakePeer {
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl PeerConnection for FakePeer {
    fn local_offer(&self) -> String {
        "v=0".to_string()
    }

    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaBackend for FakeMedia {
    fn is_available(&self) -> bool {
        !self.fail_capture
    }

    async fn acquire_audio(&self) -> Result<Box<dyn LocalAudio>, MediaError> {
        if self.fail_capture {
            return Err(MediaError::Capture("permission denied".to_string()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTrack {
            stopped: self.stopped.clone(),
            enabled: self.enabled.clone(),
        }))
    }

    async fn connect_peer(
        &self,
        ice_servers: &[String],
        _track_id: &str,
    ) -> Result<Box<dyn PeerConnection>, MediaError> {
        self.ice_servers
            .lock()
            .unwrap()
            .extend(ice_servers.iter().cloned());
        self.peers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePeer {
            closed: self.closed.clone(),
        }))
    }
}

/// Hands its sink back to the test so results can be injected.
#[derive(Default)]
pub struct FakeRecognizer {
    pub sink: Mutex<Option<RecognitionSink>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl FakeRecognizer {
    pub fn sink(&self) -> RecognitionSink {
        self.sink.lock().unwrap().clone().expect("recognizer not started")
    }
}

impl Recognizer for FakeRecognizer {
    fn start(&self, _language: &str, sink: RecognitionSink) -> Result<(), SpeechError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock().unwrap() = None;
    }
}

#[derive(Default)]
pub struct FakeSynthesizer {
    pub spoken: Mutex<Vec<String>>,
}

impl FakeSynthesizer {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl Synthesizer for FakeSynthesizer {
    fn speak(&self, text: &str, _rate: f32) -> Result<(), SpeechError> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

pub fn config() -> Config {
    Config::builder()
        .with_http_timeout(Duration::from_secs(3))
        .build()
}

pub fn client_builder(presenter: Arc<RecordingPresenter>, media: Arc<FakeMedia>) -> ClientBuilder {
    Client::builder(config(), presenter)
        .with_preferences(PreferenceStore::in_memory())
        .with_media(media)
}

/// Feeds session events back in until `done` holds. False on timeout.
pub async fn pump_until(client: &mut Client, mut done: impl FnMut(&Client) -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done(client) {
        match tokio::time::timeout_at(deadline, client.next_event()).await {
            Ok(Some(event)) => client.handle_event(event).await,
            _ => return false,
        }
    }
    true
}

/// Polls `done` until it holds. False on timeout.
pub async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    true
}
