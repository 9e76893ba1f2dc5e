/// Issues identity ids for newly minted identities.
///
/// `catalog_max` is the largest id currently in the catalog (including
/// records inserted earlier in the same batch). Implementations must return
/// an id strictly greater than it.
pub trait IdAllocator: Send {
    fn next_id(&mut self, catalog_max: Option<u64>) -> u64;
}

/// Monotonic allocator. Never reissues an id it handed out, even if the
/// record was later deleted from the catalog.
#[derive(Debug, Default, Clone)]
pub struct MonotonicIds {
    high_water: u64,
}

impl MonotonicIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts after `last`, e.g. a high-water mark persisted elsewhere.
    pub fn starting_after(last: u64) -> Self {
        Self { high_water: last }
    }

    /// Highest id issued so far (0 if none).
    pub fn high_water(&self) -> u64 {
        self.high_water
    }
}

impl IdAllocator for MonotonicIds {
    fn next_id(&mut self, catalog_max: Option<u64>) -> u64 {
        let base = self.high_water.max(catalog_max.unwrap_or(0));
        self.high_water = base + 1;
        self.high_water
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_one() {
        let mut ids = MonotonicIds::new();
        assert_eq!(ids.next_id(None), 1);
        assert_eq!(ids.next_id(None), 2);
    }

    #[test]
    fn follows_catalog_max() {
        let mut ids = MonotonicIds::new();
        assert_eq!(ids.next_id(Some(41)), 42);
        assert_eq!(ids.next_id(Some(42)), 43);
    }

    #[test]
    fn never_reuses_after_deletion() {
        let mut ids = MonotonicIds::new();
        assert_eq!(ids.next_id(Some(10)), 11);
        // Record 11 and 10 deleted externally; catalog max dropped to 5.
        assert_eq!(ids.next_id(Some(5)), 12);
        assert_eq!(ids.high_water(), 12);
    }

    #[test]
    fn starting_after() {
        let mut ids = MonotonicIds::starting_after(100);
        assert_eq!(ids.next_id(Some(3)), 101);
    }
}
