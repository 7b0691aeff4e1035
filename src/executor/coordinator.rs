// Relative (0-1000) to absolute pixel coordinate mapping.
use crate::agent_engine::state::ParamValue;
use crate::errors::{DeskPilotError, DeskPilotResult};

/// Extent of the relative coordinate space on both axes.
pub const RELATIVE_EXTENT: f64 = 1000.0;

/// Converts a relative point to absolute pixels for a `width`×`height` screen.
///
/// Accepts a literal pair or a string such as `"[495, 109]"` / `"(495, 109)"`.
/// Values outside 0-1000 are not clamped and map outside the visible screen.
pub fn normalize(value: &ParamValue, width: u32, height: u32) -> DeskPilotResult<(i32, i32)> {
    let (rx, ry) = match value {
        ParamValue::Point(x, y) => (*x, *y),
        ParamValue::Text(s) => parse_point_text(s)?,
        ParamValue::Absent => {
            return Err(DeskPilotError::InvalidCoordinate("None".into()));
        }
    };
    Ok((scale(rx, width), scale(ry, height)))
}

fn scale(relative: f64, extent: u32) -> i32 {
    (relative * f64::from(extent) / RELATIVE_EXTENT).floor() as i32
}

fn parse_point_text(text: &str) -> DeskPilotResult<(f64, f64)> {
    let values = match serde_json::from_str::<Vec<f64>>(text.trim()) {
        Ok(values) => values,
        Err(_) => split_point_text(text)
            .ok_or_else(|| DeskPilotError::InvalidCoordinate(text.to_string()))?,
    };
    match values.as_slice() {
        [x, y, ..] => Ok((*x, *y)),
        _ => Err(DeskPilotError::InvalidCoordinate(format!(
            "expected at least 2 numbers, got: {text}"
        ))),
    }
}

fn split_point_text(text: &str) -> Option<Vec<f64>> {
    text.trim_matches(|c: char| matches!(c, '[' | ']' | '(' | ')') || c.is_whitespace())
        .split(',')
        .map(|part| part.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect()
}
