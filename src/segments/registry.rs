use super::{Segment, SegmentOptions};
use crate::{error::FlowPipeError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Builds a configured segment instance from its options.
pub type SegmentFactory = Arc<dyn Fn(&SegmentOptions) -> Result<Box<dyn Segment>> + Send + Sync>;

/// Maps segment names to their factories.
///
/// Registration happens while the process starts up; afterwards the registry
/// is only read while pipelines are assembled.
#[derive(Default, Clone)]
pub struct SegmentRegistry {
    factories: HashMap<String, SegmentFactory>,
}

impl SegmentRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every segment type shipped with this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        super::addcid::register(&mut registry);
        super::flowfilter::register(&mut registry);
        super::pass::register(&mut registry);
        super::printflowdump::register(&mut registry);
        super::remote_address::register(&mut registry);
        super::stdin::register(&mut registry);
        super::stdout::register(&mut registry);
        registry
    }

    /// Register `factory` under `name`. A later registration replaces an earlier one.
    pub fn register<S, F>(&mut self, name: &str, factory: F)
    where
        S: Segment + 'static,
        F: Fn(&SegmentOptions) -> Result<S> + Send + Sync + 'static,
    {
        let factory: SegmentFactory = Arc::new(move |options: &SegmentOptions| {
            Ok(Box::new(factory(options)?) as Box<dyn Segment>)
        });
        if self.factories.insert(name.to_string(), factory).is_some() {
            warn!(segment = name, "segment registered twice, replacing previous factory");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Look up `name` and construct a segment from `options`.
    pub fn build(&self, name: &str, options: &SegmentOptions) -> Result<Box<dyn Segment>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| FlowPipeError::UnknownSegment(name.to_string()))?;
        factory(options)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
