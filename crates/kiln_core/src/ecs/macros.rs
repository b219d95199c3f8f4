//! Convenience macros for entity spawning

/// Create an entity and attach each listed component to it.
///
/// # Examples
///
/// ```ignore
/// let entity = spawn!(scene,
///     Transform::IDENTITY,
///     Tag::new("player"),
/// );
/// ```
#[macro_export]
macro_rules! spawn {
    ($scene:expr $(, $component:expr)+ $(,)?) => {{
        let entity = $scene.create_entity();
        $(
            $scene.add_component(entity, $component);
        )+
        entity
    }};
}
