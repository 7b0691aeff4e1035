// Human-in-the-loop gates for sensitive actions and takeovers.
use std::io::{self, BufRead, Write};

use crate::agent_engine::state::Action;

/// Actions that honour a `message` parameter as a confirmation request.
const GATED_ACTIONS: [&str; 3] = ["Tap", "Double Tap", "Long Press"];

/// Operator-facing hooks. Both calls block until the human answers.
pub trait OperatorHooks: Send + Sync {
    /// Returns true to proceed with the sensitive action.
    fn confirm(&self, message: &str) -> bool;
    /// Returns once the operator has finished the manual step.
    fn take_over(&self, message: &str);
}

/// Returns the confirmation message if this action must be approved before it runs.
pub fn confirmation_message(action: &Action) -> Option<String> {
    let Action::Do { name, params } = action else {
        return None;
    };
    if !GATED_ACTIONS.contains(&name.as_str()) {
        return None;
    }
    params.get("message").map(|value| match value.as_text() {
        Some(text) => text.to_string(),
        None => format!("{name} ({value})"),
    })
}

/// Prompts on stdin/stdout.
pub struct ConsoleHooks;

impl ConsoleHooks {
    fn read_line(prompt: &str) -> Option<String> {
        print!("{prompt}");
        if io::stdout().flush().is_err() {
            return None;
        }
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    }
}

impl OperatorHooks for ConsoleHooks {
    fn confirm(&self, message: &str) -> bool {
        let answer = Self::read_line(&format!("Sensitive operation: {message}\nConfirm? (Y/N): "));
        let approved = answer.is_some_and(|a| a.trim().eq_ignore_ascii_case("y"));
        tracing::info!(approved, prompt = message, "sensitive operation answered");
        approved
    }

    fn take_over(&self, message: &str) {
        tracing::info!(prompt = message, "waiting for manual takeover");
        let _ = Self::read_line(&format!(
            "{message}\nPress Enter after completing the manual operation..."
        ));
    }
}

/// Approves every sensitive action without asking; takeovers still reach `inner`.
pub struct AutoApprove<H> {
    inner: H,
}

impl<H> AutoApprove<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H: OperatorHooks> OperatorHooks for AutoApprove<H> {
    fn confirm(&self, message: &str) -> bool {
        tracing::warn!(prompt = message, "sensitive operation auto-approved");
        true
    }

    fn take_over(&self, message: &str) {
        self.inner.take_over(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::parser::parse_action;
    use crate::testing::ScriptedHooks;

    #[test]
    fn gated_actions_with_message_need_confirmation() {
        let tap = parse_action(r#"do(action="Tap", element=[1,1], message="confirm payment")"#);
        assert_eq!(confirmation_message(&tap).as_deref(), Some("confirm payment"));

        let press = parse_action(r#"do(action="Long Press", element=[1,1], message="delete")"#);
        assert_eq!(confirmation_message(&press).as_deref(), Some("delete"));
    }

    #[test]
    fn plain_or_ungated_actions_pass_through() {
        for raw in [
            r#"do(action="Tap", element=[1,1])"#,
            r#"do(action="Take_over", message="log in")"#,
            r#"do(action="Note", message="True")"#,
            r#"finish(message="done")"#,
        ] {
            assert_eq!(confirmation_message(&parse_action(raw)), None, "input: {raw}");
        }
    }

    #[test]
    fn non_text_message_still_gates() {
        let tap = parse_action(r#"do(action="Tap", element=[1,1], message=None)"#);
        assert_eq!(confirmation_message(&tap).as_deref(), Some("Tap (None)"));
    }

    #[test]
    fn auto_approve_skips_confirmation_but_forwards_takeover() {
        let hooks = AutoApprove::new(ScriptedHooks::answering(false));
        assert!(hooks.confirm("pay"));
        hooks.take_over("solve captcha");
        assert_eq!(hooks.inner.confirmations(), Vec::<String>::new());
        assert_eq!(hooks.inner.takeovers(), vec!["solve captcha".to_string()]);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn auto_approval_log_labels_the_prompt() {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            AutoApprove::new(ScriptedHooks::answering(false)).confirm("confirm payment");
        });
        let logged = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("sensitive operation auto-approved"), "{logged}");
        assert!(logged.contains(r#"prompt="confirm payment""#), "{logged}");
    }
}
