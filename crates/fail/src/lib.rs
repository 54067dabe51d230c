//! Named fault-injection points for debug builds.
//!
//! A point is declared inline with [`fail!`] or [`fail_err!`] and is inert
//! until switched on with [`set_fail`] or a [`FailGuard`]. In release builds
//! the macros expand to nothing.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::LazyLock;

#[derive(Debug)]
pub struct Fail {
    pub name: &'static str,
}

inventory::collect!(Fail);

static FAILS: LazyLock<RwLock<BTreeMap<String, bool>>> = LazyLock::new(|| {
    RwLock::new(if cfg!(debug_assertions) {
        inventory::iter::<Fail>()
            .map(|fail| (fail.name.to_string(), false))
            .collect()
    } else {
        BTreeMap::new()
    })
});

/// Panics at this point when enabled.
#[macro_export]
macro_rules! fail {
    ($name:literal) => {
        #[cfg(debug_assertions)]
        {
            const NAME: &'static str = concat!(env!("CARGO_PKG_NAME"), "::", $name);

            $crate::private::inventory::submit! {
                $crate::Fail { name: NAME }
            }

            if $crate::private::should_fail(NAME) {
                panic!("Purposely panicked at '{NAME}'")
            }
        }
    };
}

/// Returns `Err($value)` from the enclosing function when enabled.
#[macro_export]
macro_rules! fail_err {
    ($name:literal, $value:expr) => {
        #[cfg(debug_assertions)]
        {
            const NAME: &'static str = concat!(env!("CARGO_PKG_NAME"), "::", $name);

            $crate::private::inventory::submit! {
                $crate::Fail { name: NAME }
            }

            if $crate::private::should_fail(NAME) {
                $crate::private::tracing::warn!("Purposely Err'd at '{NAME}'");
                return Err($value.into());
            }
        }
    };
}

#[doc(hidden)]
pub mod private {
    use super::*;

    pub use inventory;
    pub use tracing;

    pub fn should_fail(name: &str) -> bool {
        FAILS.read().get(name).copied().unwrap_or_default()
    }
}

/// Every known point and whether it is currently enabled.
pub fn get_state() -> BTreeMap<String, bool> {
    FAILS.read().clone()
}

pub fn set_fail(name: impl Into<String>, should_fail: bool) {
    FAILS.write().insert(name.into(), should_fail);
}

/// Enables a point until dropped.
#[must_use = "the point is disabled again as soon as the guard is dropped"]
pub struct FailGuard {
    name: String,
}

impl FailGuard {
    pub fn enable(name: impl Into<String>) -> Self {
        let name = name.into();
        set_fail(name.clone(), true);
        Self { name }
    }
}

impl Drop for FailGuard {
    fn drop(&mut self) {
        set_fail(std::mem::take(&mut self.name), false);
    }
}
