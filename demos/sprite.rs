//! Opens a window and draws a checkerboard sprite in the bottom-left corner.
//!
//! Hold the arrow keys to see the `walker` entity's position in the log
//! (`RUST_LOG=info cargo run --example sprite`). Close the window to quit.

use pixel_ngin::{
    KeyCode, Vector2,
    camera::Camera,
    config::EngineConfig,
    data_structures::{
        entity::{Component, Entity},
        texture::Texture,
    },
    input::InputState,
    pipelines::shader::ShaderSource,
    scene::Scene,
};

const SPEED: f32 = 60.0;

struct Walker {
    position: Vector2<f32>,
    logged: f32,
}

impl Walker {
    fn new() -> Self {
        Self {
            position: Vector2::new(0.0, 0.0),
            logged: 0.0,
        }
    }
}

impl Component for Walker {
    fn start(&mut self) {
        log::info!("walker starts at ({}, {})", self.position.x, self.position.y);
    }

    fn update(&mut self, dt: f32, input: &InputState) {
        let mut step = Vector2::new(0.0, 0.0);
        if input.is_key_pressed(KeyCode::ArrowLeft) {
            step.x -= 1.0;
        }
        if input.is_key_pressed(KeyCode::ArrowRight) {
            step.x += 1.0;
        }
        if input.is_key_pressed(KeyCode::ArrowDown) {
            step.y -= 1.0;
        }
        if input.is_key_pressed(KeyCode::ArrowUp) {
            step.y += 1.0;
        }
        self.position += step * SPEED * dt;

        self.logged += dt;
        if self.logged >= 1.0 {
            self.logged = 0.0;
            log::info!("walker at ({:.1}, {:.1})", self.position.x, self.position.y);
        }
    }
}

fn checkerboard(path: &std::path::Path) -> anyhow::Result<()> {
    let image = image::RgbaImage::from_fn(16, 16, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 {
            image::Rgba([230, 80, 60, 255])
        } else {
            image::Rgba([250, 230, 200, 255])
        }
    });
    image.save(path)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join("pixel-ngin-sprite.png");
    checkerboard(&path)?;

    let config = EngineConfig::default().with_title("pixel-ngin sprite");
    pixel_ngin::flow::run(config, |device, config| {
        let texture = Texture::load(device, &path)?;
        let camera = Camera::with_config(Vector2::new(0.0, 0.0), config.camera);
        let mut scene = Scene::new(ShaderSource::sprite(), texture, camera);

        let mut walker = Entity::new("walker");
        walker.add_component(Walker::new());
        scene.add_entity(walker);
        Ok(scene)
    })
}
