pub mod clip;
pub mod compositor;
pub mod level;
pub mod portal;
pub mod raycast;
pub mod settings;
pub mod view;
