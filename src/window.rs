//! The winit window the render loop drives.
//!
//! winit normally owns the main loop through `run_app`. The render loop here
//! owns it instead and asks winit for pending events once per frame with
//! `pump_app_events`, which keeps the poll/clear/update/present order of a
//! classic game loop.

use std::sync::Arc;

use instant::Duration;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

use crate::{config::WindowConfig, error::RenderError, flow, input::InputState};

struct Handler {
    attributes: WindowAttributes,
    window: Option<Arc<Window>>,
    error: Option<String>,
    close_requested: bool,
    resize: Option<(u32, u32)>,
    /// Swapped with the caller's state for the duration of a pump.
    input: InputState,
}

impl ApplicationHandler for Handler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                log::info!("opened window {:?}", window.id());
                self.window = Some(Arc::new(window));
            }
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                log::debug!("close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => self.resize = Some((size.width, size.height)),
            event => {
                self.input.handle_window_event(&event);
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.close_requested = true;
    }
}

/// A desktop window plus the event loop feeding it.
pub struct WinitWindow {
    event_loop: EventLoop<()>,
    handler: Handler,
}

impl std::fmt::Debug for WinitWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WinitWindow")
            .field("window", &self.handler.window.as_ref().map(|w| w.id()))
            .field("close_requested", &self.handler.close_requested)
            .finish()
    }
}

impl WinitWindow {
    /// Opens the window and pumps the event loop until it exists.
    pub fn open(config: &WindowConfig) -> Result<Self, RenderError> {
        let mut event_loop = EventLoop::new().map_err(|e| RenderError::Window(e.to_string()))?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let attributes = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.width, config.height));
        let mut handler = Handler {
            attributes,
            window: None,
            error: None,
            close_requested: false,
            resize: None,
            input: InputState::new(),
        };

        while handler.window.is_none() {
            let status = event_loop.pump_app_events(Some(Duration::ZERO), &mut handler);
            if let Some(error) = handler.error.take() {
                return Err(RenderError::Window(error));
            }
            if let PumpStatus::Exit(code) = status {
                return Err(RenderError::Window(format!(
                    "event loop exited with code {code} before the window opened"
                )));
            }
        }
        Ok(Self {
            event_loop,
            handler,
        })
    }

    /// The underlying winit window, shared with the wgpu surface.
    pub fn handle(&self) -> Option<Arc<Window>> {
        self.handler.window.clone()
    }
}

impl flow::Window for WinitWindow {
    fn should_close(&self) -> bool {
        self.handler.close_requested
    }

    fn poll_events(&mut self, input: &mut InputState) {
        std::mem::swap(input, &mut self.handler.input);
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.handler);
        std::mem::swap(input, &mut self.handler.input);
        if let PumpStatus::Exit(code) = status {
            log::info!("event loop exited with code {code}");
            self.handler.close_requested = true;
        }
    }

    fn take_resize(&mut self) -> Option<(u32, u32)> {
        self.handler.resize.take()
    }
}
