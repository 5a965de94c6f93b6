use std::collections::HashMap;
use std::fmt;

use stagegate_core::errors::ConfigError;
use stagegate_core::traits::CustomCheck;

/// Name → strategy table for `custom_check` requirements, filled at startup.
#[derive(Default)]
pub struct CustomCheckRegistry {
    checks: HashMap<String, Box<dyn CustomCheck>>,
}

impl CustomCheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Names are unique; re-registering is an error.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        check: impl CustomCheck + 'static,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        if self.checks.contains_key(&name) {
            return Err(ConfigError::DuplicateCustomCheck(name));
        }
        self.checks.insert(name, Box::new(check));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn CustomCheck> {
        self.checks.get(name).map(|c| c.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.checks.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.checks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for CustomCheckRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomCheckRegistry")
            .field("checks", &self.names())
            .finish()
    }
}
