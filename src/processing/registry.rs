//! Name-to-constructor directory for processors.
//!
//! The registry is an ordinary value: build it once at startup (usually with
//! [`ProcessorRegistry::with_builtin`] plus any custom registrations), then pass it by
//! reference to [`crate::execution::Pipeline::build`]. After that it is only read.

use std::collections::HashMap;
use std::fmt;

use crate::config::ProcessorConfig;
use crate::error::{PipelineError, PipelineResult};

use super::{image_format, longest_explanation, Processor};

/// Builds a processor instance from its config.
pub type Constructor =
    Box<dyn Fn(&ProcessorConfig) -> PipelineResult<Box<dyn Processor>> + Send + Sync>;

/// Maps processor names to constructors.
#[derive(Default)]
pub struct ProcessorRegistry {
    constructors: HashMap<String, Constructor>,
}

impl ProcessorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every bundled processor.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.insert(longest_explanation::NAME, longest_explanation::create);
        registry.insert(image_format::NAME, image_format::create);
        registry
    }

    /// Register a constructor under `name`.
    ///
    /// Fails with [`PipelineError::DuplicateProcessor`] if `name` is taken; use
    /// [`Self::register_or_replace`] to overwrite deliberately.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> PipelineResult<()>
    where
        F: Fn(&ProcessorConfig) -> PipelineResult<Box<dyn Processor>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.constructors.contains_key(&name) {
            return Err(PipelineError::DuplicateProcessor { name });
        }
        self.insert(name, constructor);
        Ok(())
    }

    /// Register a constructor under `name`, replacing any previous one.
    ///
    /// Returns `true` if an existing registration was replaced.
    pub fn register_or_replace<F>(&mut self, name: impl Into<String>, constructor: F) -> bool
    where
        F: Fn(&ProcessorConfig) -> PipelineResult<Box<dyn Processor>> + Send + Sync + 'static,
    {
        let name = name.into();
        let replaced = self.insert(name.clone(), constructor);
        if replaced {
            tracing::warn!(processor = %name, "replaced existing processor registration");
        }
        replaced
    }

    fn insert<F>(&mut self, name: impl Into<String>, constructor: F) -> bool
    where
        F: Fn(&ProcessorConfig) -> PipelineResult<Box<dyn Processor>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(name.into(), Box::new(constructor))
            .is_some()
    }

    /// Construct the processor registered under `name`.
    pub fn create(&self, name: &str, config: &ProcessorConfig) -> PipelineResult<Box<dyn Processor>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| PipelineError::UnknownProcessor {
                name: name.to_string(),
            })?;
        constructor(config)
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::ProcessorRegistry;
    use crate::config::ProcessorConfig;
    use crate::error::{PipelineError, PipelineResult};
    use crate::processing::{Outcome, Processor};
    use crate::types::Record;

    struct Tagged(&'static str);

    impl Processor for Tagged {
        fn name(&self) -> &str {
            self.0
        }

        fn required_columns(&self) -> Vec<String> {
            Vec::new()
        }

        fn process_example(&self, record: &Record) -> PipelineResult<Outcome> {
            Ok(Outcome::Keep(record.clone()))
        }
    }

    fn first(_: &ProcessorConfig) -> PipelineResult<Box<dyn Processor>> {
        Ok(Box::new(Tagged("first")))
    }

    fn second(_: &ProcessorConfig) -> PipelineResult<Box<dyn Processor>> {
        Ok(Box::new(Tagged("second")))
    }

    #[test]
    fn builtin_registry_lists_bundled_processors() {
        let registry = ProcessorRegistry::with_builtin();
        assert_eq!(
            registry.names(),
            vec!["image_format_converter", "longest_explanation_mapping"]
        );
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = ProcessorRegistry::new();
        let err = registry.create("nope", &ProcessorConfig::new()).err().unwrap();
        assert!(matches!(err, PipelineError::UnknownProcessor { ref name } if name == "nope"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ProcessorRegistry::new();
        registry.register("tag", first).unwrap();
        let err = registry.register("tag", second).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateProcessor { .. }));

        let p = registry.create("tag", &ProcessorConfig::new()).unwrap();
        assert_eq!(p.name(), "first");
    }

    #[test]
    fn explicit_replace_overwrites() {
        let mut registry = ProcessorRegistry::new();
        assert!(!registry.register_or_replace("tag", first));
        assert!(registry.register_or_replace("tag", second));

        let p = registry.create("tag", &ProcessorConfig::new()).unwrap();
        assert_eq!(p.name(), "second");
    }
}
