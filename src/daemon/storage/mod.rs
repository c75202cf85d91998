//!  Storage is organized through [habit_storage::HabitStorage].
//!  The basic idea is:
//!   - There are three collections: habits, completion logs and settings.
//!   - A completion log exists only for days a habit was done. Un-marking a day deletes it.
//!   - Logs are grouped per habit, so month lookups never scan other habits.

pub mod entities;
pub mod habit_storage;
