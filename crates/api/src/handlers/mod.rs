pub mod group_executor;
pub mod presets;
