pub mod dlhd_controller;
pub mod health_controller;
