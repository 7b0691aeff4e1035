// Physical input simulation.
use std::process::Command;
use std::time::Duration;

use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::apps::Platform;
use crate::config::TimingConfig;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::text_input::{typing_strategy, TypingStrategy};

const DRAG_STEPS: u32 = 20;

/// Mouse, keyboard and launcher primitives. Coordinates are absolute pixels in the
/// coordinate space of the screen dimensions handed to the dispatcher.
pub trait InputBackend: Send + Sync {
    fn click(&self, x: i32, y: i32) -> DeskPilotResult<()>;
    fn double_click(&self, x: i32, y: i32) -> DeskPilotResult<()>;
    fn press_and_hold(&self, x: i32, y: i32, hold: Duration) -> DeskPilotResult<()>;
    fn drag(&self, from: (i32, i32), to: (i32, i32), duration: Duration) -> DeskPilotResult<()>;
    fn press_back_shortcut(&self) -> DeskPilotResult<()>;
    fn press_home_shortcut(&self) -> DeskPilotResult<()>;
    fn type_text(&self, text: &str) -> DeskPilotResult<()>;
    fn clear_focused_field(&self) -> DeskPilotResult<()>;
    /// Starts the application; false if the launcher could not be started.
    fn launch_by_identifier(&self, identifier: &str) -> bool;
}

/// [`InputBackend`] driving the real mouse and keyboard through enigo.
pub struct EnigoInput {
    platform: Platform,
    keystroke_interval: Duration,
}

impl EnigoInput {
    pub fn new(platform: Platform, timing: &TimingConfig) -> Self {
        Self {
            platform,
            keystroke_interval: timing.keystroke_interval(),
        }
    }

    fn enigo(&self) -> DeskPilotResult<Enigo> {
        Enigo::new(&Settings::default())
            .map_err(|e| DeskPilotError::Executor(format!("input backend unavailable: {e}")))
    }

    fn modifier(&self) -> Key {
        match self.platform {
            Platform::MacOs => Key::Meta,
            _ => Key::Control,
        }
    }

    fn chord(&self, modifier: Key, key: Key) -> DeskPilotResult<()> {
        let mut enigo = self.enigo()?;
        enigo.key(modifier, Direction::Press).map_err(input_err)?;
        let pressed = enigo.key(key, Direction::Click).map_err(input_err);
        // Always release the modifier, even when the key press failed.
        enigo.key(modifier, Direction::Release).map_err(input_err)?;
        pressed
    }
}

fn input_err(e: enigo::InputError) -> DeskPilotError {
    DeskPilotError::Executor(e.to_string())
}

impl InputBackend for EnigoInput {
    fn click(&self, x: i32, y: i32) -> DeskPilotResult<()> {
        tracing::debug!(x, y, "click");
        let mut enigo = self.enigo()?;
        enigo.move_mouse(x, y, Coordinate::Abs).map_err(input_err)?;
        enigo.button(Button::Left, Direction::Click).map_err(input_err)
    }

    fn double_click(&self, x: i32, y: i32) -> DeskPilotResult<()> {
        tracing::debug!(x, y, "double click");
        let mut enigo = self.enigo()?;
        enigo.move_mouse(x, y, Coordinate::Abs).map_err(input_err)?;
        enigo.button(Button::Left, Direction::Click).map_err(input_err)?;
        std::thread::sleep(Duration::from_millis(50));
        enigo.button(Button::Left, Direction::Click).map_err(input_err)
    }

    fn press_and_hold(&self, x: i32, y: i32, hold: Duration) -> DeskPilotResult<()> {
        tracing::debug!(x, y, hold_ms = hold.as_millis() as u64, "press and hold");
        let mut enigo = self.enigo()?;
        enigo.move_mouse(x, y, Coordinate::Abs).map_err(input_err)?;
        enigo.button(Button::Left, Direction::Press).map_err(input_err)?;
        std::thread::sleep(hold);
        enigo.button(Button::Left, Direction::Release).map_err(input_err)
    }

    fn drag(&self, from: (i32, i32), to: (i32, i32), duration: Duration) -> DeskPilotResult<()> {
        tracing::debug!(?from, ?to, "drag");
        let mut enigo = self.enigo()?;
        enigo.move_mouse(from.0, from.1, Coordinate::Abs).map_err(input_err)?;
        enigo.button(Button::Left, Direction::Press).map_err(input_err)?;
        let pause = duration / DRAG_STEPS;
        for step in 1..=DRAG_STEPS {
            let t = f64::from(step) / f64::from(DRAG_STEPS);
            let x = from.0 + (f64::from(to.0 - from.0) * t).round() as i32;
            let y = from.1 + (f64::from(to.1 - from.1) * t).round() as i32;
            if let Err(e) = enigo.move_mouse(x, y, Coordinate::Abs) {
                let _ = enigo.button(Button::Left, Direction::Release);
                return Err(input_err(e));
            }
            std::thread::sleep(pause);
        }
        enigo.button(Button::Left, Direction::Release).map_err(input_err)
    }

    fn press_back_shortcut(&self) -> DeskPilotResult<()> {
        match self.platform {
            Platform::MacOs => self.chord(Key::Meta, Key::Unicode('[')),
            _ => self.chord(Key::Alt, Key::LeftArrow),
        }
    }

    fn press_home_shortcut(&self) -> DeskPilotResult<()> {
        match self.platform {
            Platform::MacOs => self.chord(Key::Meta, Key::F3),
            _ => self.chord(Key::Meta, Key::Unicode('d')),
        }
    }

    fn type_text(&self, text: &str) -> DeskPilotResult<()> {
        let strategy = typing_strategy(text);
        tracing::debug!(chars = text.chars().count(), ?strategy, "type text");
        let mut enigo = self.enigo()?;
        match strategy {
            TypingStrategy::Burst => enigo.text(text).map_err(input_err),
            TypingStrategy::PerKey => {
                let mut buf = [0u8; 4];
                for c in text.chars() {
                    enigo.text(c.encode_utf8(&mut buf)).map_err(input_err)?;
                    if !self.keystroke_interval.is_zero() {
                        std::thread::sleep(self.keystroke_interval);
                    }
                }
                Ok(())
            }
        }
    }

    fn clear_focused_field(&self) -> DeskPilotResult<()> {
        self.chord(self.modifier(), Key::Unicode('a'))?;
        let mut enigo = self.enigo()?;
        enigo.key(Key::Backspace, Direction::Click).map_err(input_err)
    }

    fn launch_by_identifier(&self, identifier: &str) -> bool {
        let mut command = match self.platform {
            Platform::MacOs => {
                let mut c = Command::new("open");
                c.args(["-b", identifier]);
                c
            }
            Platform::Windows => {
                let mut c = Command::new("cmd");
                c.args(["/C", "start", "", identifier]);
                c
            }
            Platform::Linux => {
                let mut c = Command::new("gtk-launch");
                c.arg(identifier);
                c
            }
        };
        match command.status() {
            Ok(status) if status.success() => {
                tracing::info!(identifier, "application launched");
                true
            }
            Ok(status) => {
                tracing::warn!(identifier, code = ?status.code(), "launcher exited with failure");
                false
            }
            Err(e) => {
                tracing::warn!(identifier, error = %e, "failed to start launcher");
                false
            }
        }
    }
}
