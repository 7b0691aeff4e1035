/// One captured frame of the primary display.
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// PNG-encoded image bytes.
    pub png: Vec<u8>,
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// Size in the coordinate space used by the input backend (pixels / scale factor).
    pub logical_width: u32,
    pub logical_height: u32,
    /// True when capture failed and this is a synthetic black frame.
    pub is_fallback: bool,
}

/// Textual screen state sent to the model alongside the screenshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenContext {
    pub width: u32,
    pub height: u32,
    pub current_app_name: String,
}

impl ScreenContext {
    pub fn from_screenshot(shot: &Screenshot, current_app_name: String) -> Self {
        Self {
            width: shot.logical_width,
            height: shot.logical_height,
            current_app_name,
        }
    }

    /// JSON rendering embedded in the state entry, e.g.
    /// `{"current_app":"Chrome","screen_width":1440,"screen_height":900}`.
    pub fn describe(&self) -> String {
        serde_json::json!({
            "current_app": self.current_app_name,
            "screen_width": self.width,
            "screen_height": self.height,
        })
        .to_string()
    }
}
