/// What batch extraction does when a sample image (other than the first)
/// cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingSamplePolicy {
    /// Log a warning, fill the sample's row with zeros and keep going.
    #[default]
    ZeroFill,
    /// Abort the whole batch with an error.
    Abort,
}

/// Settings for batch feature extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionConfig {
    pub missing_sample_policy: MissingSamplePolicy,
    /// Log a progress line every this many samples. 0 disables it.
    pub progress_interval: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            missing_sample_policy: MissingSamplePolicy::ZeroFill,
            progress_interval: 1000,
        }
    }
}

impl ExtractionConfig {
    pub fn with_missing_sample_policy(mut self, policy: MissingSamplePolicy) -> Self {
        self.missing_sample_policy = policy;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }
}
