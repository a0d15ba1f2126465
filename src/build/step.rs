//! Pipeline steps: read sources, apply transforms, write outputs.

use std::fs;
use std::sync::Arc;

use super::discovery::{DiscoveryError, SourceSet};
use super::error::StepError;
use super::result::StepOutput;
use super::target::DestinationTarget;
use crate::asset::{Asset, Bundle};
use crate::transforms::Transform;

/// A named unit of work.
///
/// Built at configuration time and immutable afterwards; the source set is
/// re-globbed on every run.
#[derive(Debug, Clone)]
pub struct PipelineStep {
    name: String,
    sources: SourceSet,
    transforms: Vec<Arc<dyn Transform>>,
    dest: DestinationTarget,
}

impl PipelineStep {
    /// Create a step that copies its sources unchanged.
    pub fn new(name: impl Into<String>, sources: SourceSet, dest: DestinationTarget) -> Self {
        Self { name: name.into(), sources, transforms: vec![], dest }
    }

    /// Append a transform to the chain.
    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Append several transforms, in order.
    pub fn with_transforms(mut self, transforms: impl IntoIterator<Item = Arc<dyn Transform>>) -> Self {
        self.transforms.extend(transforms);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    pub fn dest(&self) -> &DestinationTarget {
        &self.dest
    }

    /// Transform identifiers, in order.
    pub fn transform_names(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    fn pattern_error(&self, err: DiscoveryError) -> StepError {
        let DiscoveryError::InvalidPattern { pattern, message } = err;
        StepError::Pattern { step: self.name.clone(), pattern, message }
    }

    /// Glob and read every source file.
    pub fn read_sources(&self) -> Result<Bundle, StepError> {
        let files = self.sources.discover().map_err(|e| self.pattern_error(e))?;
        let mut bundle = Bundle::new();
        for file in files {
            let contents = fs::read(&file.path).map_err(|source| StepError::Source {
                step: self.name.clone(),
                path: file.path.clone(),
                source,
            })?;
            bundle.push(Asset::from_source(file.relative, contents, file.path));
        }
        Ok(bundle)
    }

    /// Run the step once.
    ///
    /// No matching sources is a success that writes nothing.
    pub fn run(&self) -> Result<StepOutput, StepError> {
        let bundle = self.read_sources()?;
        let sources = bundle.len();
        if sources == 0 {
            tracing::debug!(step = %self.name, "no sources matched");
            return Ok(StepOutput::default());
        }

        let mut bundle = bundle;
        for transform in &self.transforms {
            tracing::trace!(step = %self.name, transform = transform.name(), "applying");
            bundle = transform
                .apply(bundle)
                .map_err(|e| StepError::Transform { step: self.name.clone(), errors: vec![e] })?;
        }

        let written = self.dest.write(&bundle).map_err(|failure| StepError::Destination {
            step: self.name.clone(),
            path: failure.path,
            source: failure.source,
        })?;
        tracing::debug!(step = %self.name, sources, written = written.len(), "step finished");

        Ok(StepOutput { sources, written })
    }
}
