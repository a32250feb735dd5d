#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::VecDeque,
    path::{Path, PathBuf},
    rc::Rc,
};

use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use pixel_ngin::{
    KeyCode,
    camera::Camera,
    data_structures::{
        entity::{Component, EntityId},
        texture::Texture,
    },
    device::RenderDevice,
    flow::Window,
    input::InputState,
    pipelines::shader::ShaderSource,
    scene::Scene,
};

/// A window that stays open for a fixed number of frames.
pub(crate) struct ScriptedWindow {
    frames_left: u32,
    polls: u32,
    resizes: VecDeque<(u32, (u32, u32))>,
    key_presses: VecDeque<(u32, KeyCode)>,
    pending_resize: Option<(u32, u32)>,
}

impl ScriptedWindow {
    pub fn new(frames: u32) -> Self {
        Self {
            frames_left: frames,
            polls: 0,
            resizes: VecDeque::new(),
            key_presses: VecDeque::new(),
            pending_resize: None,
        }
    }

    /// Reports a resize while polling frame `frame` (zero based).
    pub fn resize_on(mut self, frame: u32, size: (u32, u32)) -> Self {
        self.resizes.push_back((frame, size));
        self
    }

    /// Holds `key` down from frame `frame` on.
    pub fn press_on(mut self, frame: u32, key: KeyCode) -> Self {
        self.key_presses.push_back((frame, key));
        self
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }
}

impl Window for ScriptedWindow {
    fn should_close(&self) -> bool {
        self.frames_left == 0
    }

    fn poll_events(&mut self, input: &mut InputState) {
        let frame = self.polls;
        while let Some(&(at, size)) = self.resizes.front() {
            if at != frame {
                break;
            }
            self.pending_resize = Some(size);
            self.resizes.pop_front();
        }
        while let Some(&(at, key)) = self.key_presses.front() {
            if at != frame {
                break;
            }
            input.press_key(key);
            self.key_presses.pop_front();
        }
        self.polls += 1;
        self.frames_left = self.frames_left.saturating_sub(1);
    }

    fn take_resize(&mut self) -> Option<(u32, u32)> {
        self.pending_resize.take()
    }
}

/// What a [`Recorder`] saw.
#[derive(Debug, Default)]
pub(crate) struct RecorderLog {
    pub owner: Option<EntityId>,
    pub starts: u32,
    pub updates: Vec<f32>,
    pub space_held: Vec<bool>,
}

/// A component that records its lifecycle calls.
pub(crate) struct Recorder {
    log: Rc<RefCell<RecorderLog>>,
}

impl Recorder {
    pub fn new() -> (Self, Rc<RefCell<RecorderLog>>) {
        let log = Rc::new(RefCell::new(RecorderLog::default()));
        (Self { log: log.clone() }, log)
    }
}

impl Component for Recorder {
    fn on_attach(&mut self, owner: EntityId) {
        self.log.borrow_mut().owner = Some(owner);
    }

    fn start(&mut self) {
        self.log.borrow_mut().starts += 1;
    }

    fn update(&mut self, dt: f32, input: &InputState) {
        let mut log = self.log.borrow_mut();
        log.updates.push(dt);
        log.space_held.push(input.is_key_pressed(KeyCode::Space));
    }
}

pub(crate) fn write_rgb_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 128]))
        .save(&path)
        .unwrap();
    path
}

pub(crate) fn write_rgba_png(dir: &Path, name: &str, width: u32, height: u32, colour: [u8; 4]) -> PathBuf {
    let path = dir.join(name);
    RgbaImage::from_pixel(width, height, Rgba(colour))
        .save(&path)
        .unwrap();
    path
}

pub(crate) fn write_gray_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    GrayImage::from_pixel(width, height, Luma([200]))
        .save(&path)
        .unwrap();
    path
}

/// The sprite program drawing a solid-coloured texture through the default
/// camera.
pub(crate) fn sprite_scene(device: &mut dyn RenderDevice, dir: &Path, colour: [u8; 4]) -> Scene {
    let path = write_rgba_png(dir, "sprite.png", 4, 4, colour);
    let texture = Texture::load(device, path).unwrap();
    Scene::new(ShaderSource::sprite(), texture, Camera::default())
}
