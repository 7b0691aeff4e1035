use std::collections::BTreeMap;
use std::fmt;

/// Keyword-argument value of a `do(...)` call.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    /// `[x, y]` literal, usually a 0-1000 relative screen position.
    Point(f64, f64),
    /// Literal `None`.
    Absent,
}

impl ParamValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ParamValue::Absent)
    }
}

/// One instruction decoded from a model action line.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Do {
        name: String,
        params: BTreeMap<String, ParamValue>,
    },
    Finish {
        message: Option<String>,
    },
}

impl Action {
    pub fn wait(duration: &str, message: impl Into<String>) -> Self {
        let mut params = BTreeMap::new();
        params.insert("duration".to_string(), ParamValue::Text(duration.to_string()));
        params.insert("message".to_string(), ParamValue::Text(message.into()));
        Action::Do {
            name: "Wait".to_string(),
            params,
        }
    }

    pub fn is_wait(&self) -> bool {
        matches!(self, Action::Do { name, .. } if name == "Wait")
    }

    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        match self {
            Action::Do { params, .. } => params.get(key),
            Action::Finish { .. } => None,
        }
    }

    pub fn text_param(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(ParamValue::as_text)
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            other => write!(f, "{other}")?,
        }
    }
    f.write_str("\"")
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(s) => write_quoted(f, s),
            ParamValue::Point(x, y) => write!(f, "[{x}, {y}]"),
            ParamValue::Absent => f.write_str("None"),
        }
    }
}

/// Renders the canonical call syntax accepted by the action parser.
impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Do { name, params } => {
                f.write_str("do(action=")?;
                write_quoted(f, name)?;
                for (key, value) in params {
                    write!(f, ", {key}={value}")?;
                }
                f.write_str(")")
            }
            Action::Finish { message: Some(m) } => {
                f.write_str("finish(message=")?;
                write_quoted(f, m)?;
                f.write_str(")")
            }
            Action::Finish { message: None } => f.write_str("finish()"),
        }
    }
}

/// Result of dispatching one action. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub success: bool,
    pub should_terminate: bool,
    pub message: Option<String>,
    pub needs_confirmation: bool,
}

impl ActionOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            should_terminate: false,
            message: None,
            needs_confirmation: false,
        }
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            should_terminate: false,
            message: Some(message.into()),
            needs_confirmation: false,
        }
    }

    pub fn finished(message: Option<String>) -> Self {
        Self {
            success: true,
            should_terminate: true,
            message,
            needs_confirmation: false,
        }
    }

    pub fn declined() -> Self {
        Self {
            success: false,
            should_terminate: true,
            message: Some("User cancelled sensitive operation".into()),
            needs_confirmation: true,
        }
    }

    pub(crate) fn confirmed(self) -> Self {
        Self {
            needs_confirmation: true,
            ..self
        }
    }
}

/// How a task run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The model issued `finish(...)`.
    Finished { message: Option<String> },
    /// The operator declined a sensitive action.
    Declined { message: Option<String> },
    BudgetExhausted { max_steps: u32 },
    /// External interrupt observed by the loop.
    Stopped,
    /// Perception or model backend failure.
    Fatal { error: String },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Finished { .. })
    }
}

/// Loop controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Running { step: u32 },
    Done(TaskOutcome),
}
