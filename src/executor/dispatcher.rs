// Action dispatcher: maps a decoded action onto input primitives.
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;

use crate::agent_engine::state::{Action, ActionOutcome, ParamValue};
use crate::apps::{AppRegistry, Platform};
use crate::config::TimingConfig;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::coordinator::normalize;
use crate::executor::input::InputBackend;
use crate::executor::safety::{confirmation_message, OperatorHooks};

const DEFAULT_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionKind {
    Launch,
    Tap,
    DoubleTap,
    LongPress,
    Type,
    Swipe,
    Back,
    Home,
    Wait,
    TakeOver,
    Note,
    CallApi,
    Interact,
}

impl ActionKind {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Launch" => ActionKind::Launch,
            "Tap" => ActionKind::Tap,
            "Double Tap" => ActionKind::DoubleTap,
            "Long Press" => ActionKind::LongPress,
            "Type" | "Type_Name" => ActionKind::Type,
            "Swipe" => ActionKind::Swipe,
            "Back" => ActionKind::Back,
            "Home" => ActionKind::Home,
            "Wait" => ActionKind::Wait,
            "Take_over" => ActionKind::TakeOver,
            "Note" => ActionKind::Note,
            "Call_API" => ActionKind::CallApi,
            "Interact" => ActionKind::Interact,
            _ => return None,
        })
    }
}

/// Executes actions against the input backend. Holds no per-step state.
pub struct ActionDispatcher {
    input: Arc<dyn InputBackend>,
    hooks: Arc<dyn OperatorHooks>,
    apps: AppRegistry,
    platform: Platform,
    timing: TimingConfig,
}

impl ActionDispatcher {
    pub fn new(
        input: Arc<dyn InputBackend>,
        hooks: Arc<dyn OperatorHooks>,
        apps: AppRegistry,
        platform: Platform,
        timing: TimingConfig,
    ) -> Self {
        Self {
            input,
            hooks,
            apps,
            platform,
            timing,
        }
    }

    /// Runs `action` on a `width`×`height` screen. Never fails: backend faults are
    /// reported as an unsuccessful outcome.
    pub async fn dispatch(&self, action: &Action, width: u32, height: u32) -> ActionOutcome {
        let name = match action {
            Action::Finish { message } => return ActionOutcome::finished(message.clone()),
            Action::Do { name, .. } => name,
        };
        let Some(kind) = ActionKind::from_name(name) else {
            tracing::warn!(name = %name, "unknown action");
            return ActionOutcome::failed(format!("Unknown action: {name}"));
        };
        tracing::debug!(?kind, width, height, "dispatching action");
        match self.handle(kind, action, width, height).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(?kind, error = %e, "action handler failed");
                ActionOutcome::failed(format!("Action failed: {e}"))
            }
        }
    }

    async fn handle(
        &self,
        kind: ActionKind,
        action: &Action,
        width: u32,
        height: u32,
    ) -> DeskPilotResult<ActionOutcome> {
        match kind {
            ActionKind::Launch => self.launch(action).await,
            ActionKind::Tap | ActionKind::DoubleTap | ActionKind::LongPress => {
                self.pointer(kind, action, width, height).await
            }
            ActionKind::Type => self.type_text(action).await,
            ActionKind::Swipe => self.swipe(action, width, height).await,
            ActionKind::Back => {
                self.on_input(|input| input.press_back_shortcut()).await??;
                self.settle(self.timing.after_input()).await;
                Ok(ActionOutcome::ok())
            }
            ActionKind::Home => {
                self.on_input(|input| input.press_home_shortcut()).await??;
                self.settle(self.timing.after_input()).await;
                Ok(ActionOutcome::ok())
            }
            ActionKind::Wait => {
                let duration = wait_duration(action.param("duration"));
                tracing::info!(secs = duration.as_secs_f64(), "waiting");
                tokio::time::sleep(duration).await;
                Ok(ActionOutcome::ok())
            }
            ActionKind::TakeOver => {
                let message = action
                    .text_param("message")
                    .unwrap_or("User intervention required")
                    .to_string();
                self.on_operator(move |hooks| hooks.take_over(&message)).await?;
                Ok(ActionOutcome::ok())
            }
            ActionKind::Note | ActionKind::CallApi => {
                tracing::debug!(?kind, action = %action, "recording action accepted without effect");
                Ok(ActionOutcome::ok())
            }
            ActionKind::Interact => Ok(ActionOutcome::ok_with("User interaction required")),
        }
    }

    async fn launch(&self, action: &Action) -> DeskPilotResult<ActionOutcome> {
        let Some(app) = action.text_param("app").map(str::trim).filter(|a| !a.is_empty()) else {
            return Ok(ActionOutcome::failed("No app name specified"));
        };
        let Some(identifier) = self.apps.resolve(app, self.platform) else {
            return Ok(ActionOutcome::failed(format!("App not found: {app}")));
        };
        tracing::info!(app, identifier = %identifier, "launching application");
        if !self
            .on_input(move |input| input.launch_by_identifier(&identifier))
            .await?
        {
            return Ok(ActionOutcome::failed(format!("Failed to launch app: {app}")));
        }
        self.settle(self.timing.after_launch()).await;
        Ok(ActionOutcome::ok())
    }

    async fn pointer(
        &self,
        kind: ActionKind,
        action: &Action,
        width: u32,
        height: u32,
    ) -> DeskPilotResult<ActionOutcome> {
        let Some(element) = present(action.param("element")) else {
            return Ok(ActionOutcome::failed("No element coordinates"));
        };
        let (x, y) = normalize(element, width, height)?;

        let gated = match confirmation_message(action) {
            Some(prompt) => {
                let asked = prompt.clone();
                if !self.on_operator(move |hooks| hooks.confirm(&asked)).await? {
                    tracing::info!(prompt = %prompt, "sensitive operation declined");
                    return Ok(ActionOutcome::declined());
                }
                true
            }
            None => false,
        };

        tracing::info!(?kind, x, y, "pointer action");
        let hold = self.timing.long_press_hold();
        self.on_input(move |input| match kind {
            ActionKind::DoubleTap => input.double_click(x, y),
            ActionKind::LongPress => input.press_and_hold(x, y, hold),
            _ => input.click(x, y),
        })
        .await??;
        self.settle(self.timing.after_input()).await;

        let outcome = ActionOutcome::ok();
        Ok(if gated { outcome.confirmed() } else { outcome })
    }

    async fn type_text(&self, action: &Action) -> DeskPilotResult<ActionOutcome> {
        let text = action.text_param("text").unwrap_or_default().to_string();
        self.on_input(|input| input.clear_focused_field()).await??;
        self.settle(self.timing.type_settle()).await;
        self.on_input(move |input| input.type_text(&text)).await??;
        self.settle(self.timing.type_settle()).await;
        Ok(ActionOutcome::ok())
    }

    async fn swipe(&self, action: &Action, width: u32, height: u32) -> DeskPilotResult<ActionOutcome> {
        let (Some(start), Some(end)) = (present(action.param("start")), present(action.param("end")))
        else {
            return Ok(ActionOutcome::failed("Missing swipe coordinates"));
        };
        let from = normalize(start, width, height)?;
        let to = normalize(end, width, height)?;
        tracing::info!(?from, ?to, "swipe");
        let duration = self.timing.swipe_duration();
        self.on_input(move |input| input.drag(from, to, duration)).await??;
        self.settle(self.timing.after_input()).await;
        Ok(ActionOutcome::ok())
    }

    /// Input primitives sleep and block on the OS, so they run off the runtime.
    async fn on_input<T, F>(&self, op: F) -> DeskPilotResult<T>
    where
        F: FnOnce(&dyn InputBackend) -> T + Send + 'static,
        T: Send + 'static,
    {
        let input = Arc::clone(&self.input);
        tokio::task::spawn_blocking(move || op(input.as_ref()))
            .await
            .map_err(|e| DeskPilotError::Executor(format!("input task failed: {e}")))
    }

    /// Operator prompts wait on stdin for as long as the operator takes.
    async fn on_operator<T, F>(&self, op: F) -> DeskPilotResult<T>
    where
        F: FnOnce(&dyn OperatorHooks) -> T + Send + 'static,
        T: Send + 'static,
    {
        let hooks = Arc::clone(&self.hooks);
        tokio::task::spawn_blocking(move || op(hooks.as_ref()))
            .await
            .map_err(|e| DeskPilotError::Executor(format!("operator prompt failed: {e}")))
    }

    async fn settle(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn present(value: Option<&ParamValue>) -> Option<&ParamValue> {
    value.filter(|v| !v.is_absent())
}

/// Parses `"<number> seconds"`; anything unparsable yields one second.
fn wait_duration(value: Option<&ParamValue>) -> Duration {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d+(?:\.\d+)?|\.\d+)\s*(?:seconds?|secs?|s)?\s*$").ok()
    });
    value
        .and_then(ParamValue::as_text)
        .zip(pattern.as_ref())
        .and_then(|(text, re)| re.captures(text))
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(DEFAULT_WAIT)
}
