use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent_engine::history::{AgentSession, ConversationEntry};
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::state::{ActionOutcome, TaskOutcome};
use crate::config::AgentConfig;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::dispatcher::ActionDispatcher;
use crate::executor::parser::parse_action;
use crate::llm::client::ModelClient;
use crate::perception::traits::ScreenBackend;
use crate::perception::types::ScreenContext;
use crate::prompts::{self, message, Msg};

/// What a single perception → plan → act iteration decided.
enum StepResult {
    Continue,
    Done(TaskOutcome),
}

/// Perception → plan → act loop for one task at a time.
pub struct AgentEngine {
    config: AgentConfig,
    screen: Arc<dyn ScreenBackend>,
    model: ModelClient,
    dispatcher: ActionDispatcher,
    cancel: CancellationToken,
}

impl AgentEngine {
    pub fn new(
        config: AgentConfig,
        screen: Arc<dyn ScreenBackend>,
        model: ModelClient,
        dispatcher: ActionDispatcher,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            screen,
            model,
            dispatcher,
            cancel,
        }
    }

    pub async fn run(&self, task: &str) -> TaskOutcome {
        let lang = self.config.lang;
        let mut session = AgentSession::new(prompts::system_prompt(lang), self.config.max_steps);
        tracing::info!(
            session_id = %session.session_id,
            max_steps = self.config.max_steps,
            task,
            "task started"
        );
        println!("\n{}: {task}", message(lang, Msg::StartingTask));
        session.push(ConversationEntry::user(prompts::task_entry(lang, task)));

        let mut ctl = LoopController::new(self.config.max_steps, self.cancel.clone());
        while let Some(step) = ctl.begin_step() {
            session.step = step;
            println!("\n--- {} {step} ---", message(lang, Msg::Step));

            match self.step(&mut session, &ctl).await {
                Ok(StepResult::Continue) => {
                    ctl.advance();
                    if step < self.config.max_steps {
                        ctl.settle(self.config.step_settle).await;
                    }
                }
                Ok(StepResult::Done(outcome)) => ctl.finish(outcome),
                Err(DeskPilotError::Cancelled) => ctl.finish(TaskOutcome::Stopped),
                Err(e) => {
                    tracing::error!(step, error = %e, "step failed");
                    ctl.finish(TaskOutcome::Fatal {
                        error: e.to_string(),
                    });
                }
            }
        }

        session.terminated = true;
        let outcome = ctl.into_outcome();
        tracing::info!(
            session_id = %session.session_id,
            steps = session.step,
            ?outcome,
            "task ended"
        );
        self.report(&outcome);
        outcome
    }

    async fn step(&self, session: &mut AgentSession, ctl: &LoopController) -> DeskPilotResult<StepResult> {
        let lang = self.config.lang;

        let shot = self.screen.capture_screen().await?;
        let app = self.screen.current_foreground_app().await?;
        let ctx = ScreenContext::from_screenshot(&shot, app);
        tracing::debug!(
            step = session.step,
            app = %ctx.current_app_name,
            width = ctx.width,
            height = ctx.height,
            fallback = shot.is_fallback,
            "screen state"
        );

        let state = ConversationEntry::user_with_image(prompts::state_entry(lang, &ctx), shot.png);
        let request = session.request(&state);

        if self.config.verbose {
            println!("{}...", message(lang, Msg::Thinking));
        }
        let reply = ctl
            .race(self.model.send(&request))
            .await
            .ok_or(DeskPilotError::Cancelled)??;

        if self.config.verbose {
            if let Some(reasoning) = &reply.reasoning {
                println!("{reasoning}");
            }
        }
        println!("{}: {}", message(lang, Msg::Action), reply.action);
        session.record_exchange(&state, reply.raw.as_str());

        let action = parse_action(&reply.action);
        tracing::info!(step = session.step, action = %action, "dispatching");
        let outcome = self.dispatcher.dispatch(&action, ctx.width, ctx.height).await;
        self.absorb(session, &outcome);

        if outcome.should_terminate {
            let msg = outcome.message;
            return Ok(StepResult::Done(if outcome.success {
                TaskOutcome::Finished { message: msg }
            } else {
                TaskOutcome::Declined { message: msg }
            }));
        }
        Ok(StepResult::Continue)
    }

    /// Surfaces a non-terminal outcome to the operator and, on failure, to the model.
    fn absorb(&self, session: &mut AgentSession, outcome: &ActionOutcome) {
        let Some(msg) = outcome.message.as_deref() else {
            return;
        };
        if !outcome.success {
            tracing::warn!(step = session.step, reason = msg, "action failed");
            println!("{}: {msg}", message(self.config.lang, Msg::Error));
            if !outcome.should_terminate {
                session.push(ConversationEntry::user(prompts::failure_entry(msg)));
            }
        } else if !outcome.should_terminate {
            println!("{}", message(self.config.lang, Msg::InteractionRequired));
        }
    }

    fn report(&self, outcome: &TaskOutcome) {
        let lang = self.config.lang;
        match outcome {
            TaskOutcome::Finished { message: msg } => {
                println!("\n{}", message(lang, Msg::TaskCompleted));
                if let Some(msg) = msg {
                    println!("{}: {msg}", message(lang, Msg::FinalResult));
                }
            }
            TaskOutcome::Declined { .. } => println!("\n{}", message(lang, Msg::Declined)),
            TaskOutcome::BudgetExhausted { max_steps } => {
                println!("\n{} ({max_steps})", message(lang, Msg::BudgetExceeded));
            }
            TaskOutcome::Stopped => println!("\n{}", message(lang, Msg::StoppedByUser)),
            TaskOutcome::Fatal { error } => println!("\n{}: {error}", message(lang, Msg::Error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::apps::{AppRegistry, Platform};
    use crate::config::{Lang, ModelConfig, TimingConfig};
    use crate::llm::types::{CallConfig, MessageContent};
    use crate::testing::{
        Event, InputCall, Journal, RecordingInput, ScriptedHooks, ScriptedProvider, ScriptedScreen,
    };

    struct Harness {
        journal: Journal,
        provider: Arc<ScriptedProvider>,
        screen: Arc<ScriptedScreen>,
        cancel: CancellationToken,
        engine: AgentEngine,
    }

    fn harness(provider: ScriptedProvider, screen: ScriptedScreen, max_steps: u32, approve: bool) -> Harness {
        let journal = Journal::default();
        let provider = Arc::new(provider);
        let screen = Arc::new(screen);
        let cancel = CancellationToken::new();
        let dispatcher = ActionDispatcher::new(
            Arc::new(RecordingInput::new(journal.clone())),
            Arc::new(ScriptedHooks::new(journal.clone(), approve)),
            AppRegistry::builtin(),
            Platform::Windows,
            TimingConfig::immediate(),
        );
        let config = AgentConfig {
            max_steps,
            lang: Lang::En,
            verbose: false,
            step_settle: Duration::from_secs(1),
        };
        let model = ModelClient::new(provider.clone(), CallConfig::from(&ModelConfig::default()));
        let engine = AgentEngine::new(config, screen.clone(), model, dispatcher, cancel.clone());
        Harness {
            journal,
            provider,
            screen,
            cancel,
            engine,
        }
    }

    fn text_of(content: &MessageContent) -> String {
        match content {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(_) => "<multimodal>".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn finish_on_first_step() {
        let h = harness(
            ScriptedProvider::replying(["<think>nothing to do</think><answer>finish(message=\"all set\")</answer>"]),
            ScriptedScreen::new(1440, 900, "Finder"),
            5,
            true,
        );
        let outcome = h.engine.run("check the desktop").await;
        assert_eq!(outcome, TaskOutcome::Finished { message: Some("all set".into()) });

        let requests = h.provider.requests();
        assert_eq!(requests.len(), 1);
        let roles: Vec<&str> = requests[0].iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "user"]);
        assert_eq!(text_of(&requests[0][1].content), "Task: check the desktop");
        assert!(matches!(requests[0][2].content, MessageContent::Parts(_)));
        assert!(h.journal.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn taps_in_logical_coordinates() {
        let h = harness(
            ScriptedProvider::replying([
                r#"do(action="Tap", element=[500,500])"#,
                r#"finish(message="done")"#,
            ]),
            ScriptedScreen::new(1440, 900, "Chrome"),
            5,
            true,
        );
        assert!(h.engine.run("click the middle").await.is_success());
        assert_eq!(h.journal.events(), vec![Event::Input(InputCall::Click(720, 450))]);
        assert_eq!(h.screen.captures(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_fed_back_and_history_stays_text_only() {
        let h = harness(
            ScriptedProvider::replying([
                r#"do(action="Launch", app="NoSuchApp")"#,
                r#"finish(message="gave up")"#,
            ]),
            ScriptedScreen::new(1920, 1080, "Desktop"),
            5,
            true,
        );
        let outcome = h.engine.run("open it").await;
        assert_eq!(outcome, TaskOutcome::Finished { message: Some("gave up".into()) });

        let requests = h.provider.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        // system, task, state(text), reply, failure, state(image)
        assert_eq!(second.len(), 6);
        assert_eq!(second[3].role, "assistant");
        assert_eq!(text_of(&second[3].content), r#"do(action="Launch", app="NoSuchApp")"#);
        assert_eq!(text_of(&second[4].content), "Action failed: App not found: NoSuchApp");
        let images = second
            .iter()
            .filter(|m| matches!(m.content, MessageContent::Parts(_)))
            .count();
        assert_eq!(images, 1);
        assert!(matches!(second[5].content, MessageContent::Parts(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_is_not_success() {
        let h = harness(
            ScriptedProvider::repeating(r#"do(action="Back")"#),
            ScriptedScreen::new(800, 600, "Desktop"),
            3,
            true,
        );
        let outcome = h.engine.run("loop forever").await;
        assert_eq!(outcome, TaskOutcome::BudgetExhausted { max_steps: 3 });
        assert!(!outcome.is_success());
        assert_eq!(h.provider.requests().len(), 3);
        assert_eq!(h.journal.events().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn steps_are_separated_by_settle_delay() {
        let h = harness(
            ScriptedProvider::replying([r#"do(action="Back")"#, r#"finish(message="ok")"#]),
            ScriptedScreen::new(800, 600, "Desktop"),
            5,
            true,
        );
        assert!(h.engine.run("go back").await.is_success());
        let times = h.provider.request_times();
        assert_eq!(times.len(), 2);
        assert_eq!(times[1] - times[0], Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn no_settle_after_the_last_budgeted_step() {
        let h = harness(
            ScriptedProvider::repeating(r#"do(action="Home")"#),
            ScriptedScreen::new(800, 600, "Desktop"),
            3,
            true,
        );
        let started = tokio::time::Instant::now();
        let outcome = h.engine.run("spin").await;
        assert_eq!(outcome, TaskOutcome::BudgetExhausted { max_steps: 3 });
        // Two gaps between three steps; nothing after the third.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_replies_degrade_to_wait_and_continue() {
        let h = harness(
            ScriptedProvider::replying(["I think I should click somewhere", r#"finish()"#]),
            ScriptedScreen::new(800, 600, "Desktop"),
            5,
            true,
        );
        assert_eq!(h.engine.run("task").await, TaskOutcome::Finished { message: None });
        assert_eq!(h.provider.requests().len(), 2);
        assert!(h.journal.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn declined_confirmation_ends_task() {
        let h = harness(
            ScriptedProvider::repeating(r#"do(action="Tap", element=[10,10], message="pay 100")"#),
            ScriptedScreen::new(1000, 1000, "Alipay"),
            5,
            false,
        );
        let outcome = h.engine.run("pay").await;
        assert_eq!(
            outcome,
            TaskOutcome::Declined {
                message: Some("User cancelled sensitive operation".into())
            }
        );
        assert_eq!(h.journal.events(), vec![Event::Confirm("pay 100".into())]);
        assert_eq!(h.provider.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn model_failure_is_fatal() {
        let h = harness(
            ScriptedProvider::failing("503 Service Unavailable"),
            ScriptedScreen::new(800, 600, "Desktop"),
            5,
            true,
        );
        let outcome = h.engine.run("task").await;
        let TaskOutcome::Fatal { error } = outcome else {
            panic!("expected fatal, got {outcome:?}");
        };
        assert!(error.contains("503"));
    }

    #[tokio::test(start_paused = true)]
    async fn perception_failure_is_fatal() {
        let h = harness(
            ScriptedProvider::repeating("finish()"),
            ScriptedScreen::failing("no display"),
            5,
            true,
        );
        assert!(matches!(h.engine.run("task").await, TaskOutcome::Fatal { .. }));
        assert!(h.provider.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_runs_nothing() {
        let h = harness(
            ScriptedProvider::repeating("finish()"),
            ScriptedScreen::new(800, 600, "Desktop"),
            5,
            true,
        );
        h.cancel.cancel();
        assert_eq!(h.engine.run("task").await, TaskOutcome::Stopped);
        assert_eq!(h.screen.captures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_pending_model_call() {
        let h = harness(
            ScriptedProvider::hanging(),
            ScriptedScreen::new(800, 600, "Desktop"),
            5,
            true,
        );
        let canceller = h.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });
        assert_eq!(h.engine.run("task").await, TaskOutcome::Stopped);
        assert!(h.journal.events().is_empty());
    }
}
