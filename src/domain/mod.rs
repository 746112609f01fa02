pub mod joystick;
pub mod models;
