// Primary-monitor capture via xcap, plus foreground application lookup.
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::apps::AppRegistry;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::perception::traits::ScreenBackend;
use crate::perception::types::Screenshot;

const DEFAULT_FRAME: (u32, u32) = (1920, 1080);
const DESKTOP: &str = "Desktop";

/// [`ScreenBackend`] for the local display.
pub struct XcapScreen {
    apps: AppRegistry,
    /// Pixel size of the last successful capture, reused for fallback frames.
    last_size: Mutex<Option<(u32, u32)>>,
}

impl XcapScreen {
    pub fn new(apps: AppRegistry) -> Self {
        Self {
            apps,
            last_size: Mutex::new(None),
        }
    }

    fn remember(&self, size: (u32, u32)) {
        if let Ok(mut last) = self.last_size.lock() {
            *last = Some(size);
        }
    }

    fn fallback_size(&self) -> (u32, u32) {
        self.last_size
            .lock()
            .ok()
            .and_then(|last| *last)
            .unwrap_or(DEFAULT_FRAME)
    }
}

#[async_trait]
impl ScreenBackend for XcapScreen {
    async fn capture_screen(&self) -> DeskPilotResult<Screenshot> {
        let captured = tokio::task::spawn_blocking(capture_primary)
            .await
            .map_err(|e| DeskPilotError::Perception(format!("join: {e}")))?;

        match captured {
            Ok(shot) => {
                self.remember((shot.pixel_width, shot.pixel_height));
                tracing::debug!(
                    width = shot.pixel_width,
                    height = shot.pixel_height,
                    logical_width = shot.logical_width,
                    logical_height = shot.logical_height,
                    "screen captured"
                );
                Ok(shot)
            }
            Err(e) => {
                let (width, height) = self.fallback_size();
                tracing::warn!(error = %e, width, height, "screen capture failed, using black frame");
                black_frame(width, height)
            }
        }
    }

    async fn current_foreground_app(&self) -> DeskPilotResult<String> {
        let raw = foreground_window_name().await;
        let name = match raw {
            Some(raw) if !raw.trim().is_empty() => {
                let raw = raw.trim();
                self.apps
                    .display_name_for(raw)
                    .unwrap_or_else(|| raw.to_string())
            }
            _ => DESKTOP.to_string(),
        };
        tracing::debug!(app = %name, "foreground application");
        Ok(name)
    }
}

fn capture_primary() -> DeskPilotResult<Screenshot> {
    let monitors = xcap::Monitor::all().map_err(|e| DeskPilotError::Perception(e.to_string()))?;
    let monitor = monitors
        .iter()
        .find(|m| m.is_primary())
        .or_else(|| monitors.first())
        .ok_or_else(|| DeskPilotError::Perception("no monitor found".into()))?;

    let scale = f64::from(monitor.scale_factor());
    let captured = monitor
        .capture_image()
        .map_err(|e| DeskPilotError::Perception(e.to_string()))?;
    let (width, height) = captured.dimensions();
    // Move the raw buffer across so only our own image version is used from here on.
    let frame = image::RgbaImage::from_raw(width, height, captured.into_raw())
        .ok_or_else(|| DeskPilotError::Perception("captured buffer has wrong size".into()))?;

    let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
    Ok(Screenshot {
        png: encode_png(frame)?,
        pixel_width: width,
        pixel_height: height,
        logical_width: (f64::from(width) / scale).round() as u32,
        logical_height: (f64::from(height) / scale).round() as u32,
        is_fallback: false,
    })
}

fn black_frame(width: u32, height: u32) -> DeskPilotResult<Screenshot> {
    let frame = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));
    Ok(Screenshot {
        png: encode_png(frame)?,
        pixel_width: width,
        pixel_height: height,
        logical_width: width,
        logical_height: height,
        is_fallback: true,
    })
}

fn encode_png(frame: image::RgbaImage) -> DeskPilotResult<Vec<u8>> {
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(frame)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| DeskPilotError::Perception(format!("png encode: {e}")))?;
    Ok(out)
}

#[cfg(target_os = "macos")]
async fn foreground_window_name() -> Option<String> {
    let output = tokio::process::Command::new("osascript")
        .args([
            "-e",
            r#"tell application "System Events" to get name of first application process whose frontmost is true"#,
        ])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        tracing::debug!(code = ?output.status.code(), "osascript failed");
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(target_os = "windows")]
async fn foreground_window_name() -> Option<String> {
    use windows::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowTextW};

    tokio::task::spawn_blocking(|| {
        let mut buf = [0u16; 512];
        let len = unsafe {
            let hwnd = GetForegroundWindow();
            GetWindowTextW(hwnd, &mut buf)
        };
        let len = usize::try_from(len).ok().filter(|&l| l > 0)?;
        Some(String::from_utf16_lossy(&buf[..len]))
    })
    .await
    .ok()
    .flatten()
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
async fn foreground_window_name() -> Option<String> {
    None
}
