use async_trait::async_trait;

use crate::errors::DeskPilotResult;
use crate::perception::types::Screenshot;

/// Source of screen state for the agent loop.
#[async_trait]
pub trait ScreenBackend: Send + Sync {
    async fn capture_screen(&self) -> DeskPilotResult<Screenshot>;

    /// Display name of the foreground application, or `"Desktop"`.
    async fn current_foreground_app(&self) -> DeskPilotResult<String>;
}
