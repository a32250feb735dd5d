//! The render loop and application entry point.
//!
//! # Lifecycle Flow
//!
//! [`RenderLoop::run`] starts the scene once, then repeats until the window
//! asks to close:
//! 1. Capture the start timestamp
//! 2. Poll window events into the [`InputState`]
//! 3. Forward a pending resize to the device
//! 4. Clear the colour buffer
//! 5. [`Scene::update`] with the `dt` of the previous iteration
//! 6. Present the frame
//! 7. Capture the end timestamp; `end - start` is the next iteration's `dt`
//!
//! `dt` is never clamped or smoothed. The first frame sees exactly `0.0` and a
//! stall shows up as one large `dt`, so `update` code has to tolerate both.

use instant::Instant;

use crate::{
    config::EngineConfig,
    context::Context,
    device::RenderDevice,
    error::RenderError,
    input::InputState,
    scene::Scene,
    window::WinitWindow,
};

/// The windowing collaborator the loop polls.
pub trait Window {
    fn should_close(&self) -> bool;

    /// Applies all pending events to `input`.
    fn poll_events(&mut self, input: &mut InputState);

    /// The latest size reported since the last call, if any.
    fn take_resize(&mut self) -> Option<(u32, u32)>;
}

/// Wall-clock time of one loop iteration.
#[derive(Debug, Default)]
pub struct FrameTimer {
    frame_start: Option<Instant>,
    dt: f32,
    frames: u64,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_frame(&mut self) {
        self.frame_start = Some(Instant::now());
    }

    /// Stores the duration since [`FrameTimer::begin_frame`] as the `dt` of
    /// the next frame and returns it.
    pub fn end_frame(&mut self) -> f32 {
        if let Some(start) = self.frame_start.take() {
            self.dt = Instant::now().duration_since(start).as_secs_f32();
        }
        self.frames += 1;
        self.dt
    }

    /// Seconds the previous iteration took; `0.0` before the first one ends.
    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// Completed iterations.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[derive(Debug)]
pub struct RenderLoop {
    clear_colour: wgpu::Color,
    timer: FrameTimer,
    input: InputState,
}

impl RenderLoop {
    pub fn new(clear_colour: wgpu::Color) -> Self {
        Self {
            clear_colour,
            timer: FrameTimer::new(),
            input: InputState::new(),
        }
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    /// Starts `scene` unless it already is, then renders frames until the
    /// window asks to close. The first error ends the loop.
    pub fn run(
        &mut self,
        window: &mut dyn Window,
        device: &mut dyn RenderDevice,
        scene: &mut Scene,
    ) -> Result<(), RenderError> {
        if !scene.is_started() {
            scene.start(device)?;
        }
        while !window.should_close() {
            self.frame(window, device, scene)?;
        }
        log::info!("render loop finished after {} frames", self.timer.frames());
        Ok(())
    }

    /// Runs a single iteration.
    pub fn frame(
        &mut self,
        window: &mut dyn Window,
        device: &mut dyn RenderDevice,
        scene: &mut Scene,
    ) -> Result<(), RenderError> {
        let dt = self.timer.dt();
        self.timer.begin_frame();

        window.poll_events(&mut self.input);
        if let Some((width, height)) = window.take_resize() {
            device.resize(width, height);
        }

        device.clear(self.clear_colour)?;
        scene.update(device, dt, &self.input)?;
        device.present()?;

        self.input.end_frame();
        let next = self.timer.end_frame();
        log::trace!("frame {} took {next:.4}s", self.timer.frames());
        Ok(())
    }
}

/// Opens a window, builds the scene on the new GPU context and renders it
/// until the window is closed.
///
/// `build_scene` receives the device so it can load textures. The scene is
/// released before returning, also when the loop fails.
pub fn run<F>(config: EngineConfig, build_scene: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut dyn RenderDevice, &EngineConfig) -> Result<Scene, RenderError>,
{
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    };

    let mut window = WinitWindow::open(&config.window)?;
    let handle = window
        .handle()
        .ok_or_else(|| RenderError::Window("window closed during start-up".into()))?;
    let mut context = futures::executor::block_on(Context::new(handle, config.window.vsync))?;

    let mut scene = build_scene(&mut context, &config)?;
    let mut render_loop = RenderLoop::new(config.clear_colour);
    let result = render_loop.run(&mut window, &mut context, &mut scene);
    if let Err(e) = &result {
        log::error!("render loop failed in {}: {e}", e.stage());
    }
    scene.release(&mut context);

    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_has_zero_dt() {
        let timer = FrameTimer::new();
        assert_eq!(timer.dt(), 0.0);
        assert_eq!(timer.frames(), 0);
    }

    #[test]
    fn dt_is_the_previous_iteration_unclamped() {
        let mut timer = FrameTimer::new();
        timer.begin_frame();
        std::thread::sleep(std::time::Duration::from_millis(30));
        let dt = timer.end_frame();
        assert!(dt >= 0.03, "{dt}");
        assert_eq!(timer.dt(), dt);
        assert_eq!(timer.frames(), 1);
    }

    #[test]
    fn end_without_begin_keeps_the_last_dt() {
        let mut timer = FrameTimer::new();
        timer.begin_frame();
        let first = timer.end_frame();
        assert_eq!(timer.end_frame(), first);
        assert_eq!(timer.frames(), 2);
    }
}
