//! Keyboard and mouse state, fed by window events and read by components.

use std::collections::HashSet;

use winit::{
    dpi::PhysicalPosition,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

/// Pixels per scroll line when a device reports pixel deltas.
const PIXELS_PER_LINE: f64 = 20.0;

/// A snapshot of held keys, held mouse buttons and cursor movement.
///
/// Owned by the render loop and handed to every `update` by reference.
#[derive(Clone, Debug, Default)]
pub struct InputState {
    keys: HashSet<KeyCode>,
    /// Left, right, middle.
    buttons: [bool; 3],
    cursor: (f64, f64),
    last_cursor: (f64, f64),
    scroll: (f64, f64),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        button_index(button).is_some_and(|i| self.buttons[i])
    }

    pub fn cursor_position(&self) -> (f64, f64) {
        self.cursor
    }

    pub fn last_cursor_position(&self) -> (f64, f64) {
        self.last_cursor
    }

    /// Cursor movement since the previous position.
    pub fn cursor_delta(&self) -> (f64, f64) {
        (
            self.cursor.0 - self.last_cursor.0,
            self.cursor.1 - self.last_cursor.1,
        )
    }

    /// Scroll accumulated this frame, in lines.
    pub fn scroll(&self) -> (f64, f64) {
        self.scroll
    }

    pub fn press_key(&mut self, key: KeyCode) {
        self.keys.insert(key);
    }

    pub fn release_key(&mut self, key: KeyCode) {
        self.keys.remove(&key);
    }

    /// Buttons other than left, right and middle are ignored.
    pub fn set_mouse_button(&mut self, button: MouseButton, down: bool) {
        if let Some(i) = button_index(button) {
            self.buttons[i] = down;
        }
    }

    pub fn move_cursor(&mut self, x: f64, y: f64) {
        self.last_cursor = self.cursor;
        self.cursor = (x, y);
    }

    pub fn add_scroll(&mut self, x: f64, y: f64) {
        self.scroll.0 += x;
        self.scroll.1 += y;
    }

    /// Applies one window event. Returns whether it changed the input state.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return false;
                };
                match event.state {
                    ElementState::Pressed => self.press_key(code),
                    ElementState::Released => self.release_key(code),
                }
                true
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.set_mouse_button(*button, state.is_pressed());
                true
            }
            WindowEvent::CursorMoved {
                position: PhysicalPosition { x, y },
                ..
            } => {
                self.move_cursor(*x, *y);
                true
            }
            WindowEvent::MouseWheel { delta, .. } => {
                match delta {
                    MouseScrollDelta::LineDelta(x, y) => self.add_scroll(*x as f64, *y as f64),
                    MouseScrollDelta::PixelDelta(p) => {
                        self.add_scroll(p.x / PIXELS_PER_LINE, p.y / PIXELS_PER_LINE)
                    }
                }
                true
            }
            WindowEvent::Focused(false) => {
                // Releases are not delivered to unfocused windows.
                self.keys.clear();
                self.buttons = [false; 3];
                true
            }
            _ => false,
        }
    }

    /// Clears scroll and settles the previous cursor position. Called once
    /// at the end of every frame.
    pub fn end_frame(&mut self) {
        self.scroll = (0.0, 0.0);
        self.last_cursor = self.cursor;
    }
}

fn button_index(button: MouseButton) -> Option<usize> {
    match button {
        MouseButton::Left => Some(0),
        MouseButton::Right => Some(1),
        MouseButton::Middle => Some(2),
        _ => None,
    }
}
