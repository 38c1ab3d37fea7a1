//! Computer tool implementation.
//!
//! Keyboard and mouse control over a host-provided `InputDriver`. Only the
//! contract ships here; the facade validates coordinates, durations and
//! directions before anything reaches the driver.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::action::{decode, ActionSet, ActionSpec, ParamKind, ParamSpec};
use super::dispatch::Dispatcher;
use super::Tool;
use crate::error::{ActionFailure, ToolError};

/// Longest accepted `wait` / `hold_key` duration, in seconds.
pub const MAX_DURATION_SECS: f64 = 100.0;

/// Screen position, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct Coordinate {
    pub x: u32,
    pub y: u32,
}

impl From<[u32; 2]> for Coordinate {
    fn from([x, y]: [u32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Coordinate> for [u32; 2] {
    fn from(c: Coordinate) -> Self {
        [c.x, c.y]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Capability contract for OS input backends.
#[async_trait]
pub trait InputDriver: Send + Sync {
    /// Press and release a key or chord, e.g. `ctrl+s`.
    async fn key(&self, keys: &str) -> Result<()>;

    async fn hold_key(&self, keys: &str, duration: Duration) -> Result<()>;

    async fn type_text(&self, text: &str) -> Result<()>;

    async fn mouse_position(&self) -> Result<Coordinate>;

    async fn mouse_move(&self, to: Coordinate) -> Result<()>;

    /// Click `clicks` times, at `at` if given, otherwise where the cursor is.
    async fn mouse_click(
        &self,
        button: MouseButton,
        at: Option<Coordinate>,
        clicks: u8,
    ) -> Result<()>;

    async fn mouse_down(&self, button: MouseButton) -> Result<()>;

    async fn mouse_up(&self, button: MouseButton) -> Result<()>;

    async fn mouse_drag(&self, from: Coordinate, to: Coordinate) -> Result<()>;

    async fn scroll(
        &self,
        direction: ScrollDirection,
        amount: u32,
        at: Option<Coordinate>,
    ) -> Result<()>;

    async fn wait(&self, duration: Duration) -> Result<()> {
        tokio::time::sleep(duration).await;
        Ok(())
    }
}

pub static COMPUTER_ACTIONS: ActionSet = ActionSet {
    tool: "computer",
    params: &[
        ParamSpec {
            name: "text",
            kind: ParamKind::String,
            description: "Key chord (key, hold_key) or text to type (type)",
        },
        ParamSpec {
            name: "coordinate",
            kind: ParamKind::Coordinate,
            description: "Target [x, y] position in pixels",
        },
        ParamSpec {
            name: "start_coordinate",
            kind: ParamKind::Coordinate,
            description: "Drag start [x, y] position in pixels",
        },
        ParamSpec {
            name: "scroll_direction",
            kind: ParamKind::String,
            description: "One of up, down, left, right",
        },
        ParamSpec {
            name: "scroll_amount",
            kind: ParamKind::Integer,
            description: "Number of scroll steps",
        },
        ParamSpec {
            name: "duration",
            kind: ParamKind::Number,
            description: "Seconds, between 0 and 100 and below the call timeout",
        },
    ],
    actions: &[
        ActionSpec {
            name: "key",
            description: "Press a key or chord",
            required: &["text"],
            optional: &[],
        },
        ActionSpec {
            name: "hold_key",
            description: "Hold a key for a duration",
            required: &["text", "duration"],
            optional: &[],
        },
        ActionSpec {
            name: "type",
            description: "Type a string",
            required: &["text"],
            optional: &[],
        },
        ActionSpec {
            name: "cursor_position",
            description: "Report the cursor position",
            required: &[],
            optional: &[],
        },
        ActionSpec {
            name: "mouse_move",
            description: "Move the cursor",
            required: &["coordinate"],
            optional: &[],
        },
        ActionSpec {
            name: "left_click",
            description: "Left click",
            required: &[],
            optional: &["coordinate"],
        },
        ActionSpec {
            name: "right_click",
            description: "Right click",
            required: &[],
            optional: &["coordinate"],
        },
        ActionSpec {
            name: "middle_click",
            description: "Middle click",
            required: &[],
            optional: &["coordinate"],
        },
        ActionSpec {
            name: "double_click",
            description: "Double left click",
            required: &[],
            optional: &["coordinate"],
        },
        ActionSpec {
            name: "left_mouse_down",
            description: "Press the left button",
            required: &[],
            optional: &[],
        },
        ActionSpec {
            name: "left_mouse_up",
            description: "Release the left button",
            required: &[],
            optional: &[],
        },
        ActionSpec {
            name: "left_click_drag",
            description: "Drag with the left button",
            required: &["start_coordinate", "coordinate"],
            optional: &[],
        },
        ActionSpec {
            name: "scroll",
            description: "Scroll the view",
            required: &["scroll_direction", "scroll_amount"],
            optional: &["coordinate"],
        },
        ActionSpec {
            name: "wait",
            description: "Pause for a duration",
            required: &["duration"],
            optional: &[],
        },
    ],
};

#[derive(Debug, Deserialize)]
struct TextParams {
    text: String,
}

#[derive(Debug, Deserialize)]
struct HoldKeyParams {
    text: String,
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct MoveParams {
    coordinate: Coordinate,
}

#[derive(Debug, Deserialize)]
struct ClickParams {
    #[serde(default)]
    coordinate: Option<Coordinate>,
}

#[derive(Debug, Deserialize)]
struct DragParams {
    start_coordinate: Coordinate,
    coordinate: Coordinate,
}

#[derive(Debug, Deserialize)]
struct ScrollParams {
    scroll_direction: ScrollDirection,
    scroll_amount: u32,
    #[serde(default)]
    coordinate: Option<Coordinate>,
}

#[derive(Debug, Deserialize)]
struct WaitParams {
    duration: f64,
}

pub struct ComputerTool {
    driver: Arc<dyn InputDriver>,
    dispatcher: Dispatcher,
}

impl ComputerTool {
    pub fn new(driver: Arc<dyn InputDriver>, dispatcher: Dispatcher) -> Self {
        Self { driver, dispatcher }
    }

    /// Durations must also end before the dispatcher timeout, or the call
    /// could only ever fail with `timeout`.
    fn checked_duration(&self, secs: f64) -> Result<Duration, ActionFailure> {
        if !secs.is_finite() || !(0.0..=MAX_DURATION_SECS).contains(&secs) {
            return Err(ActionFailure::invalid_parameter(format!(
                "'duration' must be between 0 and {} seconds, got {}",
                MAX_DURATION_SECS, secs
            )));
        }
        if let Some(limit) = self.dispatcher.timeout() {
            if secs >= limit.as_secs_f64() {
                return Err(ActionFailure::invalid_parameter(format!(
                    "'duration' must be shorter than the {}s call timeout, got {}",
                    limit.as_secs_f64(),
                    secs
                )));
            }
        }
        Ok(Duration::from_secs_f64(secs))
    }

    async fn click(
        &self,
        button: MouseButton,
        params: Value,
        clicks: u8,
        action: &str,
    ) -> Result<Value, ToolError> {
        let p: ClickParams = decode(action, params)?;
        self.driver.mouse_click(button, p.coordinate, clicks).await?;
        Ok(json!({ "button": button, "clicks": clicks, "coordinate": p.coordinate }))
    }
}

#[async_trait]
impl Tool for ComputerTool {
    fn description(&self) -> &str {
        "Control the keyboard and mouse: press keys, type text, move and click \
         the mouse, drag, scroll, and wait. Coordinates are [x, y] in pixels."
    }

    fn actions(&self) -> &'static ActionSet {
        &COMPUTER_ACTIONS
    }

    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    async fn perform(&self, action: &'static str, params: Value) -> Result<Value, ToolError> {
        match action {
            "key" => {
                let p: TextParams = decode(action, params)?;
                self.driver.key(&p.text).await?;
                Ok(json!({ "key": p.text }))
            }
            "hold_key" => {
                let p: HoldKeyParams = decode(action, params)?;
                let duration = self.checked_duration(p.duration)?;
                self.driver.hold_key(&p.text, duration).await?;
                Ok(json!({ "key": p.text, "duration": p.duration }))
            }
            "type" => {
                let p: TextParams = decode(action, params)?;
                self.driver.type_text(&p.text).await?;
                Ok(json!({ "typed": p.text.chars().count() }))
            }
            "cursor_position" => {
                let at = self.driver.mouse_position().await?;
                Ok(json!({ "coordinate": at }))
            }
            "mouse_move" => {
                let p: MoveParams = decode(action, params)?;
                self.driver.mouse_move(p.coordinate).await?;
                Ok(json!({ "coordinate": p.coordinate }))
            }
            "left_click" => self.click(MouseButton::Left, params, 1, action).await,
            "right_click" => self.click(MouseButton::Right, params, 1, action).await,
            "middle_click" => self.click(MouseButton::Middle, params, 1, action).await,
            "double_click" => self.click(MouseButton::Left, params, 2, action).await,
            "left_mouse_down" => {
                self.driver.mouse_down(MouseButton::Left).await?;
                Ok(json!({ "button": MouseButton::Left, "state": "down" }))
            }
            "left_mouse_up" => {
                self.driver.mouse_up(MouseButton::Left).await?;
                Ok(json!({ "button": MouseButton::Left, "state": "up" }))
            }
            "left_click_drag" => {
                let p: DragParams = decode(action, params)?;
                self.driver.mouse_drag(p.start_coordinate, p.coordinate).await?;
                Ok(json!({ "from": p.start_coordinate, "to": p.coordinate }))
            }
            "scroll" => {
                let p: ScrollParams = decode(action, params)?;
                if p.scroll_amount == 0 {
                    let failure =
                        ActionFailure::invalid_parameter("'scroll_amount' must be at least 1");
                    return Err(failure.into());
                }
                self.driver
                    .scroll(p.scroll_direction, p.scroll_amount, p.coordinate)
                    .await?;
                Ok(json!({
                    "scroll_direction": p.scroll_direction,
                    "scroll_amount": p.scroll_amount,
                    "coordinate": p.coordinate,
                }))
            }
            "wait" => {
                let p: WaitParams = decode(action, params)?;
                let duration = self.checked_duration(p.duration)?;
                self.driver.wait(duration).await?;
                Ok(json!({ "waited": p.duration }))
            }
            other => Err(ActionFailure::unsupported_action(
                self.name(),
                other,
                &COMPUTER_ACTIONS.names(),
            )
            .into()),
        }
    }
}
