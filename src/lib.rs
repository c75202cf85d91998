//! Small habit tracker for the terminal. Habits, completion logs and settings are kept in JSON
//! files, and a background daemon sends a daily reminder for every habit that is due.

pub mod cli;
pub mod daemon;
pub mod fs;
pub mod notification;
pub mod tracker;
pub mod utils;
