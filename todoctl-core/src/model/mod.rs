//! Domain models with validation at construction
//!
//! All user input is validated when creating these types.
//! Invalid input returns ValidationError, not panic.

use chrono::{DateTime, SubsecRound, Utc};

pub mod validation;
pub mod user;
pub mod task;

pub use validation::ValidationError;
pub use user::{NewUser, User, UserPatch, Username};
pub use task::{NewTask, Task, TaskNote, TaskPatch, TaskTitle};

/// Current time at the precision PostgreSQL `TIMESTAMPTZ` stores (microseconds).
///
/// Timestamps built here survive a database round trip unchanged, so a
/// returned row compares equal to the same row read back later.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn now_has_microsecond_precision() {
        for _ in 0..100 {
            assert_eq!(now().nanosecond() % 1_000, 0);
        }
    }

    #[test]
    fn new_records_are_stamped_at_microsecond_precision() {
        let task = NewTask::new(1, TaskTitle::new("t").unwrap(), TaskNote::default());
        assert_eq!(task.created_at.nanosecond() % 1_000, 0);
        assert_eq!(task.created_at, task.updated_at);

        let user = NewUser::new(Username::new("u").unwrap());
        assert_eq!(user.created_at.nanosecond() % 1_000, 0);
    }
}
