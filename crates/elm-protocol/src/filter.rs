//! Three-Tier Frame Filter
//!
//! A frame is shown to a session only if it passes the single AT filter, then
//! matches the pass list (when the list is non-empty), and matches no entry of
//! the block list. The block list always runs last and wins.

use crate::error::CommandError;
use serde::{Deserialize, Serialize};

/// Entries per pass or block list
pub const FILTER_CAPACITY: usize = 100;

/// Pattern and mask over the identifier space
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub pattern: u32,
    pub mask: u32,
}

impl FilterRule {
    /// Rule with mask zero: matches every identifier
    pub const MATCH_ALL: FilterRule = FilterRule { pattern: 0, mask: 0 };

    pub fn new(pattern: u32, mask: u32) -> Self {
        Self { pattern, mask }
    }

    pub fn matches(&self, id: u32) -> bool {
        (id & self.mask) == (self.pattern & self.mask)
    }
}

/// Bounded, append-only list of rules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterList {
    rules: Vec<FilterRule>,
}

impl FilterList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule, failing once the list holds [`FILTER_CAPACITY`] entries
    pub fn push(&mut self, rule: FilterRule) -> Result<(), CommandError> {
        if self.rules.len() >= FILTER_CAPACITY {
            return Err(CommandError::FilterFull);
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterRule> {
        self.rules.iter()
    }

    /// True if any rule matches
    pub fn any_match(&self, id: u32) -> bool {
        self.rules.iter().any(|rule| rule.matches(id))
    }
}

/// AT filter plus ST pass and block lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain {
    pub at_filter: FilterRule,
    pub pass: FilterList,
    pub block: FilterList,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a frame with this identifier is shown.
    ///
    /// Identifier zero is reserved and never passes.
    pub fn accept(&self, id: u32) -> bool {
        if id == 0 || !self.at_filter.matches(id) {
            return false;
        }
        if !self.pass.is_empty() && !self.pass.any_match(id) {
            return false;
        }
        !self.block.any_match(id)
    }

    /// One line per configured rule, as listed by `STF`
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(1 + self.pass.len() + self.block.len());
        if self.at_filter != FilterRule::MATCH_ALL {
            lines.push(format!(
                "FILTER {:03X},{:03X}",
                self.at_filter.pattern, self.at_filter.mask
            ));
        }
        for rule in self.pass.iter() {
            lines.push(format!("PASS {:03X},{:03X}", rule.pattern, rule.mask));
        }
        for rule in self.block.iter() {
            lines.push(format!("BLOCK {:03X},{:03X}", rule.pattern, rule.mask));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_at_filter() {
        let mut chain = FilterChain::new();
        chain.at_filter = FilterRule::new(0x100, 0x700);
        assert!(chain.accept(0x123));
        assert!(!chain.accept(0x200));
    }

    #[test]
    fn test_default_chain_passes_all_but_zero() {
        let chain = FilterChain::new();
        assert!(chain.accept(0x132));
        assert!(chain.accept(0x7FF));
        assert!(!chain.accept(0));
    }

    #[test]
    fn test_pass_list_excludes_unmatched() {
        let mut chain = FilterChain::new();
        chain.pass.push(FilterRule::new(0x257, 0x7FF)).unwrap();
        assert!(chain.accept(0x257));
        assert!(!chain.accept(0x132));
    }

    #[test]
    fn test_block_wins_over_pass() {
        let mut chain = FilterChain::new();
        chain.pass.push(FilterRule::new(0x200, 0x700)).unwrap();
        chain.block.push(FilterRule::new(0x257, 0x7FF)).unwrap();
        assert!(chain.accept(0x201));
        assert!(!chain.accept(0x257));
    }

    #[test]
    fn test_list_capacity() {
        let mut list = FilterList::new();
        for i in 0..FILTER_CAPACITY as u32 {
            list.push(FilterRule::new(i, 0x7FF)).unwrap();
        }
        assert_eq!(
            list.push(FilterRule::new(0x7FF, 0x7FF)),
            Err(CommandError::FilterFull)
        );
        assert_eq!(list.len(), FILTER_CAPACITY);
        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn test_describe() {
        let mut chain = FilterChain::new();
        assert!(chain.describe().is_empty());

        chain.at_filter = FilterRule::new(0x100, 0x700);
        chain.pass.push(FilterRule::new(0x257, 0x7FF)).unwrap();
        chain.block.push(FilterRule::new(0x3E9, 0x7FF)).unwrap();
        assert_eq!(
            chain.describe(),
            vec!["FILTER 100,700", "PASS 257,7FF", "BLOCK 3E9,7FF"]
        );
    }

    proptest! {
        #[test]
        fn prop_block_match_always_rejects(id in 1u32..0x800, pass_mask in 0u32..0x800) {
            let mut chain = FilterChain::new();
            chain.pass.push(FilterRule::new(id, pass_mask)).unwrap();
            chain.block.push(FilterRule::new(id, 0x7FF)).unwrap();
            prop_assert!(!chain.accept(id));
        }

        #[test]
        fn prop_empty_lists_follow_at_filter(id in 1u32..0x2000_0000, pattern: u32, mask: u32) {
            let mut chain = FilterChain::new();
            chain.at_filter = FilterRule::new(pattern, mask);
            prop_assert_eq!(chain.accept(id), FilterRule::new(pattern, mask).matches(id));
        }

        #[test]
        fn prop_zero_never_passes(pattern: u32, mask: u32) {
            let mut chain = FilterChain::new();
            chain.at_filter = FilterRule::new(pattern, mask);
            chain.pass.push(FilterRule::MATCH_ALL).unwrap();
            prop_assert!(!chain.accept(0));
        }
    }
}
