//! Negation with an incrementally maintained known range.
//!
//! Repeated NOT evaluation over advancing ranges would be O(range) per
//! call if each call re-scanned. Instead the node remembers one contiguous
//! range it has already classified, `[start, end)` plus the first match
//! inside it, and classifies every new query range into one of five
//! geometric relations to the cached range, each with its own incremental
//! update rule. Monotone callers amortize to near-constant work per call.
//!
//! The case analysis lives in [`advance_known_range`], a function of the
//! old state, the new range and a scan probe, so it is unit-testable
//! without the tree-walking driver.

use lodestore_store::GroupData;
use lodestore_types::TableKey;

use crate::nodes::{EvalCtx, QueryNode};

/// The cached classification of one contiguous row range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownRange {
    pub start: usize,
    pub end: usize,
    /// First row in `[start, end)` where the negated condition holds.
    pub first_match: Option<usize>,
}

impl KnownRange {
    pub const EMPTY: Self = Self {
        start: 0,
        end: 0,
        first_match: None,
    };

    fn len(&self) -> usize {
        self.end - self.start
    }
}

/// One step of the five-way incremental range update.
///
/// `probe(s, e)` scans `[s, e)` and returns the first row where the
/// negated condition holds. Returns the updated cache and the query
/// result for `[start, end)`.
pub fn advance_known_range(
    known: KnownRange,
    start: usize,
    end: usize,
    probe: &mut dyn FnMut(usize, usize) -> Option<usize>,
) -> (KnownRange, Option<usize>) {
    if start <= known.start && end >= known.end {
        // The query covers the known range:  [   ######   ]
        if let Some(result) = probe(start, known.start) {
            return (
                KnownRange {
                    start,
                    end: known.end,
                    first_match: Some(result),
                },
                Some(result),
            );
        }
        if let Some(fm) = known.first_match {
            return (
                KnownRange {
                    start,
                    end: known.end,
                    first_match: Some(fm),
                },
                Some(fm),
            );
        }
        let result = probe(known.end, end);
        (
            KnownRange {
                start,
                end,
                first_match: result,
            },
            result,
        )
    } else if start >= known.start && end <= known.end {
        // The known range covers the query:  ###[#####]###
        if let Some(fm) = known.first_match {
            if fm >= end {
                return (known, None);
            }
            if fm >= start {
                return (known, Some(fm));
            }
        }
        // The first known match precedes the query; the cache cannot
        // answer, but scanning the sub-range teaches us nothing new.
        (known, probe(start, end))
    } else if start < known.start && end >= known.start {
        // Partial overlap at the lower end:  [   ###]#####
        let result = probe(start, known.start).or(known.first_match);
        (
            KnownRange {
                start,
                end: known.end,
                first_match: result,
            },
            result.filter(|&r| r < end),
        )
    } else if start <= known.end && end > known.end {
        // Partial overlap at the upper end:  ####[###   ]
        match known.first_match {
            Some(fm) if fm >= start => (
                KnownRange {
                    start: known.start,
                    end,
                    first_match: Some(fm),
                },
                Some(fm),
            ),
            Some(fm) => {
                let result = probe(start, end);
                (
                    KnownRange {
                        start: known.start,
                        end,
                        first_match: Some(fm),
                    },
                    result,
                )
            }
            None => {
                let result = probe(known.end, end);
                (
                    KnownRange {
                        start: known.start,
                        end,
                        first_match: result,
                    },
                    result,
                )
            }
        }
    } else {
        // Disjoint:  ### [   ]   or   [   ] ####
        let result = probe(start, end);
        if end - start > known.len() {
            // A larger disjoint range replaces the cache outright.
            (
                KnownRange {
                    start,
                    end,
                    first_match: result,
                },
                result,
            )
        } else {
            (known, result)
        }
    }
}

/// Negation of a child condition.
pub struct NotNode {
    child: Box<dyn QueryNode>,
    known: KnownRange,
}

impl NotNode {
    pub fn new(child: Box<dyn QueryNode>) -> Self {
        Self {
            child,
            known: KnownRange::EMPTY,
        }
    }
}

impl QueryNode for NotNode {
    fn init(&mut self, g: &GroupData, table: TableKey) {
        self.child.init(g, table);
        self.known = KnownRange::EMPTY;
    }

    fn cluster_changed(&mut self) {
        self.child.cluster_changed();
        self.known = KnownRange::EMPTY;
    }

    fn find_first_local(&mut self, ctx: &EvalCtx<'_>, start: usize, end: usize) -> Option<usize> {
        let known = self.known;
        let child = &mut self.child;
        let mut probe = |s: usize, e: usize| {
            (s..e).find(|&row| child.find_first_local(ctx, row, row + 1).is_none())
        };
        let (known, result) = advance_known_range(known, start, end, &mut probe);
        self.known = known;
        // The cache may hand back a first match beyond the queried range.
        result.filter(|&r| r >= start && r < end)
    }

    fn dt(&self) -> f64 {
        self.child.dt() + 1.0
    }

    fn describe(&self, g: &GroupData, table: TableKey) -> String {
        format!("!({})", self.child.describe(g, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference: scan the underlying boolean row set directly.
    fn run_case(
        rows: &[bool], // true = the *negated* condition holds (row matches NOT)
        calls: &[(usize, usize)],
    ) {
        let mut known = KnownRange::EMPTY;
        for &(s, e) in calls {
            let mut probe = |a: usize, b: usize| (a..b).find(|&i| rows[i]);
            let (new_known, result) = advance_known_range(known, s, e, &mut probe);
            known = new_known;
            let result = result.filter(|&r| r >= s && r < e);
            let expected = (s..e).find(|&i| rows[i]);
            assert_eq!(result, expected, "range [{s}, {e}) with cache {known:?}");
        }
    }

    #[test]
    fn monotone_advance() {
        let rows = [false, true, false, false, true, false, true, false];
        run_case(&rows, &[(0, 2), (2, 4), (4, 6), (6, 8)]);
    }

    #[test]
    fn covers_known() {
        let rows = [false, false, true, false, false, true];
        run_case(&rows, &[(2, 4), (0, 6)]);
        run_case(&rows, &[(3, 4), (0, 6), (0, 6)]);
    }

    #[test]
    fn covered_by_known() {
        let rows = [true, false, false, true, false, false];
        run_case(&rows, &[(0, 6), (1, 3), (3, 5), (0, 1)]);
    }

    #[test]
    fn overlap_lower() {
        let rows = [false, true, false, false, true, false];
        run_case(&rows, &[(2, 6), (0, 3)]);
        run_case(&rows, &[(3, 6), (0, 4)]);
    }

    #[test]
    fn overlap_upper() {
        let rows = [true, false, false, false, true, false];
        run_case(&rows, &[(0, 3), (2, 6)]);
        run_case(&rows, &[(1, 3), (2, 6)]);
    }

    #[test]
    fn disjoint_ranges() {
        let rows = [true, false, true, false, true, false, true];
        run_case(&rows, &[(0, 2), (4, 7)]);
        run_case(&rows, &[(4, 7), (0, 2)]);
        run_case(&rows, &[(0, 1), (4, 5)]);
    }

    #[test]
    fn randomized_equivalence_with_naive_loop() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0xdead);
        for _ in 0..200 {
            let n = rng.gen_range(1..20);
            let rows: Vec<bool> = (0..n).map(|_| rng.gen_bool(0.3)).collect();
            let calls: Vec<(usize, usize)> = (0..12)
                .map(|_| {
                    let s = rng.gen_range(0..n);
                    let e = rng.gen_range(s..=n);
                    (s, e)
                })
                .collect();
            run_case(&rows, &calls);
        }
    }
}
