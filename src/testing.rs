// Test doubles for the backend seams.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::input::InputBackend;
use crate::executor::safety::OperatorHooks;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};
use crate::perception::traits::ScreenBackend;
use crate::perception::types::Screenshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InputCall {
    Click(i32, i32),
    DoubleClick(i32, i32),
    PressAndHold(i32, i32),
    Drag((i32, i32), (i32, i32)),
    Back,
    Home,
    TypeText(String),
    ClearField,
    Launch(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Input(InputCall),
    Confirm(String),
    TakeOver(String),
}

/// Shared, ordered log of everything the fakes observed.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    fn record(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }
}

pub(crate) struct RecordingInput {
    journal: Journal,
    launch_result: bool,
    failure: Option<String>,
}

impl RecordingInput {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            journal,
            launch_result: true,
            failure: None,
        }
    }

    pub(crate) fn launch_result(mut self, result: bool) -> Self {
        self.launch_result = result;
        self
    }

    /// Every primitive fails with this message and records nothing.
    pub(crate) fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    fn call(&self, call: InputCall) -> DeskPilotResult<()> {
        if let Some(message) = &self.failure {
            return Err(DeskPilotError::Executor(message.clone()));
        }
        self.journal.record(Event::Input(call));
        Ok(())
    }
}

impl InputBackend for RecordingInput {
    fn click(&self, x: i32, y: i32) -> DeskPilotResult<()> {
        self.call(InputCall::Click(x, y))
    }

    fn double_click(&self, x: i32, y: i32) -> DeskPilotResult<()> {
        self.call(InputCall::DoubleClick(x, y))
    }

    fn press_and_hold(&self, x: i32, y: i32, _hold: Duration) -> DeskPilotResult<()> {
        self.call(InputCall::PressAndHold(x, y))
    }

    fn drag(&self, from: (i32, i32), to: (i32, i32), _duration: Duration) -> DeskPilotResult<()> {
        self.call(InputCall::Drag(from, to))
    }

    fn press_back_shortcut(&self) -> DeskPilotResult<()> {
        self.call(InputCall::Back)
    }

    fn press_home_shortcut(&self) -> DeskPilotResult<()> {
        self.call(InputCall::Home)
    }

    fn type_text(&self, text: &str) -> DeskPilotResult<()> {
        self.call(InputCall::TypeText(text.to_string()))
    }

    fn clear_focused_field(&self) -> DeskPilotResult<()> {
        self.call(InputCall::ClearField)
    }

    fn launch_by_identifier(&self, identifier: &str) -> bool {
        self.call(InputCall::Launch(identifier.to_string())).is_ok() && self.launch_result
    }
}

pub(crate) struct ScriptedHooks {
    journal: Journal,
    approve: bool,
}

impl ScriptedHooks {
    pub(crate) fn new(journal: Journal, approve: bool) -> Self {
        Self { journal, approve }
    }

    pub(crate) fn answering(approve: bool) -> Self {
        Self::new(Journal::default(), approve)
    }

    pub(crate) fn confirmations(&self) -> Vec<String> {
        self.journal
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Confirm(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn takeovers(&self) -> Vec<String> {
        self.journal
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::TakeOver(m) => Some(m),
                _ => None,
            })
            .collect()
    }
}

impl OperatorHooks for ScriptedHooks {
    fn confirm(&self, message: &str) -> bool {
        self.journal.record(Event::Confirm(message.to_string()));
        self.approve
    }

    fn take_over(&self, message: &str) {
        self.journal.record(Event::TakeOver(message.to_string()));
    }
}

pub(crate) struct ScriptedScreen {
    frame: Result<(u32, u32), String>,
    app: String,
    captures: AtomicUsize,
}

impl ScriptedScreen {
    pub(crate) fn new(width: u32, height: u32, app: &str) -> Self {
        Self {
            frame: Ok((width, height)),
            app: app.to_string(),
            captures: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            frame: Err(message.to_string()),
            app: String::new(),
            captures: AtomicUsize::new(0),
        }
    }

    pub(crate) fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScreenBackend for ScriptedScreen {
    async fn capture_screen(&self) -> DeskPilotResult<Screenshot> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        let (width, height) = self.frame.clone().map_err(DeskPilotError::Perception)?;
        Ok(Screenshot {
            png: b"\x89PNG".to_vec(),
            pixel_width: width * 2,
            pixel_height: height * 2,
            logical_width: width,
            logical_height: height,
            is_fallback: false,
        })
    }

    async fn current_foreground_app(&self) -> DeskPilotResult<String> {
        Ok(self.app.clone())
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Fail(String),
    Hang,
}

/// Replays a fixed script of model replies and records every request.
pub(crate) struct ScriptedProvider {
    script: Mutex<VecDeque<Scripted>>,
    /// Replayed forever once the script runs out.
    repeat: Option<Scripted>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    request_times: Mutex<Vec<tokio::time::Instant>>,
}

impl ScriptedProvider {
    fn with(script: Vec<Scripted>, repeat: Option<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat,
            requests: Mutex::new(Vec::new()),
            request_times: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying<'a>(replies: impl IntoIterator<Item = &'a str>) -> Self {
        let script = replies
            .into_iter()
            .map(|r| Scripted::Reply(r.to_string()))
            .collect();
        Self::with(script, None)
    }

    pub(crate) fn repeating(reply: &str) -> Self {
        Self::with(Vec::new(), Some(Scripted::Reply(reply.to_string())))
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self::with(Vec::new(), Some(Scripted::Fail(message.to_string())))
    }

    pub(crate) fn hanging() -> Self {
        Self::with(Vec::new(), Some(Scripted::Hang))
    }

    pub(crate) fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_times(&self) -> Vec<tokio::time::Instant> {
        self.request_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: Vec<ChatMessage>, _cfg: &CallConfig) -> DeskPilotResult<LlmResponse> {
        self.requests.lock().unwrap().push(messages);
        self.request_times.lock().unwrap().push(tokio::time::Instant::now());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.repeat.clone());
        match next {
            Some(Scripted::Reply(content)) => Ok(LlmResponse {
                content,
                reasoning: String::new(),
            }),
            Some(Scripted::Fail(message)) => Err(DeskPilotError::LlmProvider(message)),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Err(DeskPilotError::LlmProvider("script exhausted".into())),
        }
    }
}
