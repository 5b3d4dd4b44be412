use crate::virtual_machine::isa::{OP_CATEGORY_COUNT, OpCategory};

/// Instruction counts for the last frame, per [`OpCategory`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExecProfile {
    counts: [u64; OP_CATEGORY_COUNT],
    slices: u64,
}

impl ExecProfile {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn record(&mut self, category: OpCategory) {
        let slot = &mut self.counts[category as usize];
        *slot = slot.saturating_add(1);
    }

    pub fn record_slice(&mut self) {
        self.slices += 1;
    }

    pub fn count(&self, category: OpCategory) -> u64 {
        self.counts[category as usize]
    }

    /// Instructions executed, all categories.
    pub fn total(&self) -> u64 {
        self.counts.iter().fold(0u64, |acc, &v| acc.saturating_add(v))
    }

    /// Thread slices run.
    pub fn slices(&self) -> u64 {
        self.slices
    }

    pub fn iter(&self) -> impl Iterator<Item = (OpCategory, u64)> {
        OpCategory::ALL.into_iter().zip(self.counts)
    }

    pub fn merge(&mut self, other: &ExecProfile) {
        for (slot, v) in self.counts.iter_mut().zip(other.counts) {
            *slot = slot.saturating_add(v);
        }
        self.slices += other.slices;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_by_category() {
        let mut profile = ExecProfile::new();
        profile.record(OpCategory::Data);
        profile.record(OpCategory::Data);
        profile.record(OpCategory::Polygon);
        profile.record_slice();
        assert_eq!(profile.count(OpCategory::Data), 2);
        assert_eq!(profile.count(OpCategory::Polygon), 1);
        assert_eq!(profile.total(), 3);
        assert_eq!(profile.slices(), 1);
        assert_eq!(profile.iter().count(), OP_CATEGORY_COUNT);
    }

    #[test]
    fn merge_accumulates() {
        let mut a = ExecProfile::new();
        a.record(OpCategory::Flow);
        let mut b = ExecProfile::new();
        b.record(OpCategory::Flow);
        b.record_slice();
        a.merge(&b);
        assert_eq!(a.count(OpCategory::Flow), 2);
        assert_eq!(a.slices(), 1);
    }
}
