pub mod camera;
pub mod client;
pub mod config;
pub mod hud;
pub mod landmark;
pub mod overlay;
pub mod pump;
pub mod session;
pub mod speech;
