// System prompts and operator-facing strings, per language.
use chrono::NaiveDate;

use crate::config::Lang;
use crate::perception::types::ScreenContext;

const SYSTEM_CN: &str = include_str!("../prompts/system_cn.md");
const SYSTEM_EN: &str = include_str!("../prompts/system_en.md");

/// System prompt dated today.
pub fn system_prompt(lang: Lang) -> String {
    system_prompt_on(lang, chrono::Local::now().date_naive())
}

pub fn system_prompt_on(lang: Lang, date: NaiveDate) -> String {
    match lang {
        Lang::Cn => format!("今天的日期是: {}\n{SYSTEM_CN}", date.format("%Y年%m月%d日")),
        Lang::En => format!("Today's date is: {}\n{SYSTEM_EN}", date.format("%Y-%m-%d, %A")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Msg {
    StartingTask,
    Step,
    Thinking,
    Action,
    TaskCompleted,
    FinalResult,
    Error,
    BudgetExceeded,
    StoppedByUser,
    Declined,
    InteractionRequired,
}

pub fn message(lang: Lang, msg: Msg) -> &'static str {
    match (lang, msg) {
        (Lang::Cn, Msg::StartingTask) => "开始执行任务",
        (Lang::Cn, Msg::Step) => "步骤",
        (Lang::Cn, Msg::Thinking) => "思考中",
        (Lang::Cn, Msg::Action) => "执行动作",
        (Lang::Cn, Msg::TaskCompleted) => "任务完成",
        (Lang::Cn, Msg::FinalResult) => "最终结果",
        (Lang::Cn, Msg::Error) => "错误",
        (Lang::Cn, Msg::BudgetExceeded) => "已达到最大步数",
        (Lang::Cn, Msg::StoppedByUser) => "任务已被用户中止",
        (Lang::Cn, Msg::Declined) => "用户取消了敏感操作",
        (Lang::Cn, Msg::InteractionRequired) => "需要用户交互",
        (Lang::En, Msg::StartingTask) => "Starting task",
        (Lang::En, Msg::Step) => "Step",
        (Lang::En, Msg::Thinking) => "Thinking",
        (Lang::En, Msg::Action) => "Action",
        (Lang::En, Msg::TaskCompleted) => "Task completed",
        (Lang::En, Msg::FinalResult) => "Final result",
        (Lang::En, Msg::Error) => "Error",
        (Lang::En, Msg::BudgetExceeded) => "Reached max steps",
        (Lang::En, Msg::StoppedByUser) => "Agent stopped by user",
        (Lang::En, Msg::Declined) => "User cancelled sensitive operation",
        (Lang::En, Msg::InteractionRequired) => "User interaction required",
    }
}

/// First user entry, carrying the task description.
pub fn task_entry(lang: Lang, task: &str) -> String {
    match lang {
        Lang::Cn => format!("任务目标: {task}"),
        Lang::En => format!("Task: {task}"),
    }
}

/// Per-step state entry sent with the screenshot.
pub fn state_entry(lang: Lang, ctx: &ScreenContext) -> String {
    match lang {
        Lang::Cn => format!("当前状态: {}", ctx.describe()),
        Lang::En => format!("Current state: {}", ctx.describe()),
    }
}

/// Synthetic user entry reporting a failed action back to the model.
pub fn failure_entry(message: &str) -> String {
    format!("Action failed: {message}")
}
