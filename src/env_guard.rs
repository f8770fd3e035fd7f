//! Scoped ownership of the install-namespace environment variable.
//!
//! The namespace override is process-wide state. A run acquires it once: an
//! externally supplied value is adopted untouched, otherwise the default is
//! written and later removed again. Only one run per process may hold a given
//! key at a time; this is a precondition, not something the guard enforces.

use tracing::debug;

/// Default environment key holding the install namespace
pub const INSTALL_NAMESPACE_ENV: &str = "INSTALL_NAMESPACE";

/// Record of one acquisition of an environment variable.
#[derive(Debug)]
pub struct EnvGuard {
    name: String,
    value: String,
    predefined: bool,
    released: bool,
}

impl EnvGuard {
    /// Adopt the variable if it is present, otherwise set it to `default`.
    ///
    /// Presence is what counts: a variable set to the empty string is treated
    /// as externally defined and left alone.
    pub fn acquire(name: &str, default: &str) -> Self {
        match std::env::var_os(name) {
            Some(existing) => {
                let value = existing.to_string_lossy().into_owned();
                debug!(env = %name, value = %value, "Using predefined environment value");
                Self {
                    name: name.to_string(),
                    value,
                    predefined: true,
                    released: false,
                }
            }
            None => {
                // SAFETY: the caller must ensure no other thread touches the
                // environment concurrently. The orchestrator acquires the guard
                // before any collaborator is called or spawns work.
                unsafe {
                    std::env::set_var(name, default);
                }
                debug!(env = %name, value = %default, "Set environment default");
                Self {
                    name: name.to_string(),
                    value: default.to_string(),
                    predefined: false,
                    released: false,
                }
            }
        }
    }

    /// Environment key this guard holds
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective value for the run
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether the value was supplied from outside the run
    pub fn was_predefined(&self) -> bool {
        self.predefined
    }

    /// Whether `release` has already run
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Undo the acquisition. Idempotent; never touches a predefined value.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.predefined {
            return;
        }
        // SAFETY: same precondition as `acquire`. Teardown restores the key
        // last, after every other cleanup action has finished.
        unsafe {
            std::env::remove_var(&self.name);
        }
        debug!(env = %self.name, "Removed environment default");
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        self.release();
    }
}
