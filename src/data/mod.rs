//! Data structures for drinks and measurements.
//!
//! This module contains the drink profile type with its built-in defaults,
//! timestamped temperature readings, and the status classification used to
//! compare a reading against a drink's target.

pub mod drinks;
pub mod reading;
pub mod status;

pub use drinks::{default_drinks, DrinkProfile, DEFAULT_TARGET_TEMPERATURE};
pub use reading::{TemperatureReading, READING_DISPLAY_WINDOW};
pub use status::{classify, Status};
