//! Named failure points for tests.
//!
//! With the `failure-points` feature, [`fail_point!`] returns a
//! [`ErrorCode::Debug`](crate::error::ErrorCode::Debug) query error while its
//! name is armed. Without the feature the macro expands to nothing.

#[cfg(feature = "failure-points")]
use std::collections::HashSet;
#[cfg(feature = "failure-points")]
use std::sync::OnceLock;

#[cfg(feature = "failure-points")]
use parking_lot::Mutex;

#[cfg(feature = "failure-points")]
static FAILURE_POINTS: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

#[cfg(feature = "failure-points")]
fn points() -> &'static Mutex<HashSet<String>> {
    FAILURE_POINTS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Arms the failure point `name`.
#[cfg(feature = "failure-points")]
pub fn set_failure_point(name: &str) {
    points().lock().insert(name.to_owned());
}

/// Disarms the failure point `name`.
#[cfg(feature = "failure-points")]
pub fn clear_failure_point(name: &str) {
    points().lock().remove(name);
}

/// Disarms every failure point.
#[cfg(feature = "failure-points")]
pub fn clear_all_failure_points() {
    points().lock().clear();
}

/// True while `name` is armed.
#[cfg(feature = "failure-points")]
pub fn should_fail(name: &str) -> bool {
    points().lock().contains(name)
}

macro_rules! fail_point {
    ($name:expr) => {
        #[cfg(feature = "failure-points")]
        {
            if $crate::exec::fault::should_fail($name) {
                return Err($crate::error::ExecError::query(
                    $crate::error::ErrorCode::Debug,
                    format!("intentional failure at {}", $name),
                ));
            }
        }
    };
}

pub(crate) use fail_point;
