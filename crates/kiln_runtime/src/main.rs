//! Kiln Runtime
//!
//! Boots logging, builds a demo scene and round-trips it through the scene
//! stream, reporting storage counters and timings.

mod settings;

use anyhow::{ensure, Context, Result};
use kiln_core::components::{register_builtin, Material, Tag, Transform};
use kiln_core::ecs::Scene;
use kiln_core::glam::{Vec3, Vec4};
use kiln_metrics::SystemProfiler;
use settings::RuntimeSettings;
use std::path::PathBuf;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    tracing::info!("Kiln v{}", kiln_core::VERSION);

    let settings_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = RuntimeSettings::load(settings_path.as_deref())?;
    register_builtin();

    let mut profiler = SystemProfiler::new();
    let scene = profiler.time_system("populate", || build_demo_scene(&settings));

    let mut bytes = Vec::new();
    profiler.time_system("serialize", || scene.serialize(&mut bytes))?;
    if let Some(path) = &settings.output {
        std::fs::write(path, &bytes)
            .with_context(|| format!("writing scene to {}", path.display()))?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "scene written");
    }

    let loaded =
        profiler.time_system("deserialize", || Scene::from_reader(&mut bytes.as_slice()))?;
    ensure!(
        loaded.entity_count() == scene.entity_count(),
        "reloaded scene has {} entities, expected {}",
        loaded.entity_count(),
        scene.entity_count()
    );
    ensure!(
        loaded.component_count::<Tag>() == scene.component_count::<Tag>(),
        "reloaded scene lost tags"
    );

    for (name, value) in scene.stats().snapshot() {
        tracing::info!(counter = %name, value, "storage");
    }
    for (name, timing) in profiler.snapshot() {
        tracing::info!(
            op = %name,
            micros = timing.total.as_micros() as u64,
            calls = timing.calls,
            "timing"
        );
    }

    tracing::info!(
        entities = loaded.entity_count(),
        bytes = bytes.len(),
        "scene round trip complete"
    );
    Ok(())
}

/// Entities in a row along +X, each tagged; every third one is lit with a
/// material, and every ninth loses it again.
fn build_demo_scene(settings: &RuntimeSettings) -> Scene {
    let mut scene = Scene::with_config(settings.scene.clone());

    for i in 0..settings.demo_entities {
        let entity = scene.create_entity();
        scene.add_component(entity, Transform::from_translation(Vec3::new(i as f32, 0.0, 0.0)));
        scene.add_component(entity, Tag::new(format!("entity-{i}")));
        if i % 3 == 0 {
            let shade = (i % 7) as f32 / 7.0;
            scene.add_component(entity, Material::from_albedo(Vec4::new(shade, 0.2, 0.8, 1.0)));
        }
        if i % 9 == 0 {
            scene.remove_component::<Material>(entity);
        }
    }

    scene.each_component::<Transform, _>(|_, transform| {
        transform.rotation.y = transform.translation.x * 0.1;
    });

    tracing::debug!(
        entities = scene.entity_count(),
        materials = scene.component_count::<Material>(),
        "demo scene built"
    );
    scene
}
