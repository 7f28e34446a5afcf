use crate::config::LoadConfig;

/// Deterministic range of zero-padded identifiers, `load-test-001` through
/// `load-test-200` for the defaults. Purely arithmetic, so a restarted run
/// regenerates exactly the same names.
#[derive(Debug, Clone)]
pub struct IdRange {
    prefix: String,
    start: u32,
    count: u32,
    width: usize,
}

impl IdRange {
    pub fn new(prefix: &str, start: u32, count: u32, width: usize) -> Self {
        Self {
            prefix: prefix.to_string(),
            start,
            count,
            width,
        }
    }

    pub fn from_config(config: &LoadConfig) -> Self {
        Self::new(&config.prefix, config.start, config.count, config.width)
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Zero-padded numeric suffix. Numbers wider than `width` are printed
    /// in full, never truncated.
    pub fn sequence(&self, index: u32) -> String {
        format!("{:0width$}", index, width = self.width)
    }

    pub fn name(&self, index: u32) -> String {
        format!("{}-{}", self.prefix, self.sequence(index))
    }

    /// Truncates at `u32::MAX` rather than overflowing on extreme configs.
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.start..self.start.saturating_add(self.count)
    }

    pub fn names(&self) -> impl Iterator<Item = String> + '_ {
        self.indices().map(|i| self.name(i))
    }

    /// Contiguous batches of at most `size` names; the last one may be
    /// short. `ceil(count / size)` batches overall. A zero size is clamped
    /// to 1 rather than panicking.
    pub fn batches(&self, size: u32) -> Vec<Vec<String>> {
        let size = size.max(1);
        let names: Vec<String> = self.names().collect();
        names
            .chunks(size as usize)
            .map(|chunk| chunk.to_vec())
            .collect()
    }
}
