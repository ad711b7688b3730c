//! Greedy edit scripts for ordered child lists.
//!
//! Given the list an observer currently believes in and the authoritative new
//! order, [`reconcile_children`] rewrites the observer list in place with
//! single-element inserts and removes, reporting each one to a [`ChildSink`]
//! as it happens.
//!
//! The policy is locally minimal: elements missing from the new order are
//! removed first, in place, so their neighbours are never disturbed. Then
//! slots that already hold the right element are left alone and an element
//! found further down the list is pulled forward with a remove + insert pair.
//! Block moves can therefore cost more operations than a
//! longest-common-subsequence matcher would need.

use crate::trace;
use core::fmt;

/// Receives the structural operations produced by [`reconcile_children`].
///
/// Each callback runs after the list has been updated, so the sink sees the
/// same state the observer will have once it applies the operation.
pub trait ChildSink<T> {
    /// Error that aborts the script.
    type Error;

    /// `element` now sits at `index`. `previous` is its left sibling, if any.
    fn insert(&mut self, index: usize, element: T, previous: Option<T>) -> Result<(), Self::Error>;

    /// `element` was removed from `index`.
    fn remove(&mut self, index: usize, element: T) -> Result<(), Self::Error>;
}

/// One operation of a child edit script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEdit<T> {
    /// Insert `element` at `index`, right after `previous`.
    Insert {
        /// Position after the insert
        index: usize,
        /// The inserted element
        element: T,
        /// Left sibling after the insert
        previous: Option<T>,
    },
    /// Remove `element` from `index`.
    Remove {
        /// Position before the remove
        index: usize,
        /// The removed element
        element: T,
    },
}

impl<T: fmt::Debug> fmt::Display for ChildEdit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildEdit::Insert {
                index,
                element,
                previous,
            } => match previous {
                Some(previous) => write!(f, "Insert({element:?} @{index} after {previous:?})"),
                None => write!(f, "Insert({element:?} @{index} first)"),
            },
            ChildEdit::Remove { index, element } => write!(f, "Remove({element:?} @{index})"),
        }
    }
}

impl<T: Copy> ChildSink<T> for Vec<ChildEdit<T>> {
    type Error = core::convert::Infallible;

    fn insert(&mut self, index: usize, element: T, previous: Option<T>) -> Result<(), Self::Error> {
        self.push(ChildEdit::Insert {
            index,
            element,
            previous,
        });
        Ok(())
    }

    fn remove(&mut self, index: usize, element: T) -> Result<(), Self::Error> {
        self.push(ChildEdit::Remove { index, element });
        Ok(())
    }
}

/// Rewrite `current` into `target`, reporting every step to `sink`.
///
/// Elements are compared with `==`, which callers use as an identity check.
/// Both lists are expected to hold distinct elements.
pub fn reconcile_children<T, S>(
    current: &mut Vec<T>,
    target: &[T],
    sink: &mut S,
) -> Result<(), S::Error>
where
    T: Copy + PartialEq + fmt::Debug,
    S: ChildSink<T>,
{
    // Stale elements go first. Every remaining one is still wanted, so the
    // greedy pass below only ever moves or inserts.
    let mut index = 0;
    while index < current.len() {
        if target.contains(&current[index]) {
            index += 1;
            continue;
        }
        let element = current.remove(index);
        trace!(index, ?element, "remove stale");
        sink.remove(index, element)?;
    }

    let mut index = 0;
    while index <= current.len() {
        // Append whatever is left of the target.
        if index == current.len() {
            if index == target.len() {
                break;
            }
            let element = target[index];
            insert_at(current, index, element, sink)?;
            index += 1;
            continue;
        }

        // Drop the surplus tail; the list shrinks so the cursor stays put.
        if index == target.len() {
            let element = current.remove(index);
            trace!(index, ?element, "remove surplus");
            sink.remove(index, element)?;
            continue;
        }

        let expected = target[index];
        if current[index] == expected {
            index += 1;
            continue;
        }

        match current.iter().position(|&e| e == expected) {
            Some(found) => {
                let element = current.remove(found);
                trace!(from = found, to = index, ?element, "move");
                sink.remove(found, element)?;
                insert_at(current, index, element, sink)?;
            }
            None => insert_at(current, index, expected, sink)?,
        }
        index += 1;
    }

    debug_assert!(current.as_slice() == target, "reconcile_children left a mismatch");
    Ok(())
}

fn insert_at<T, S>(current: &mut Vec<T>, index: usize, element: T, sink: &mut S) -> Result<(), S::Error>
where
    T: Copy + PartialEq + fmt::Debug,
    S: ChildSink<T>,
{
    let previous = index.checked_sub(1).map(|i| current[i]);
    current.insert(index, element);
    trace!(index, ?element, "insert");
    sink.insert(index, element, previous)
}

/// Compute the edit script that turns `old` into `new` without a custom sink.
pub fn edit_script<T>(old: &[T], new: &[T]) -> Vec<ChildEdit<T>>
where
    T: Copy + PartialEq + fmt::Debug,
{
    let mut current = old.to_vec();
    let mut ops = Vec::new();
    match reconcile_children(&mut current, new, &mut ops) {
        Ok(()) => ops,
        Err(never) => match never {},
    }
}

/// Replay `ops` on a copy of `old`.
pub fn apply_edits<T: Copy>(old: &[T], ops: &[ChildEdit<T>]) -> Vec<T> {
    let mut list = old.to_vec();
    for op in ops {
        match *op {
            ChildEdit::Insert { index, element, .. } => list.insert(index, element),
            ChildEdit::Remove { index, .. } => {
                list.remove(index);
            }
        }
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    fn check(old: &[char], new: &[char]) -> Vec<ChildEdit<char>> {
        let ops = edit_script(old, new);
        assert_eq!(
            apply_edits(old, &ops),
            new,
            "replaying {ops:?} on {old:?} did not produce {new:?}"
        );
        ops
    }

    fn touched(ops: &[ChildEdit<char>]) -> Vec<char> {
        ops.iter()
            .map(|op| match *op {
                ChildEdit::Insert { element, .. } | ChildEdit::Remove { element, .. } => element,
            })
            .collect()
    }

    #[test]
    fn test_identical_lists_produce_nothing() {
        assert!(check(&['a', 'b', 'c'], &['a', 'b', 'c']).is_empty());
        assert!(check(&[], &[]).is_empty());
    }

    #[test]
    fn test_remove_middle_touches_only_removed() {
        let ops = check(&['a', 'b', 'c'], &['a', 'c']);
        assert_eq!(ops, vec![ChildEdit::Remove { index: 1, element: 'b' }]);
    }

    #[test]
    fn test_insert_middle_touches_only_inserted() {
        let ops = check(&['a', 'c'], &['a', 'b', 'c']);
        assert_eq!(
            ops,
            vec![ChildEdit::Insert {
                index: 1,
                element: 'b',
                previous: Some('a'),
            }]
        );
    }

    #[test]
    fn test_append_and_truncate() {
        let ops = check(&['a'], &['a', 'b', 'c']);
        assert_eq!(touched(&ops), vec!['b', 'c']);

        let ops = check(&['a', 'b', 'c'], &['a']);
        assert_eq!(
            ops,
            vec![
                ChildEdit::Remove { index: 1, element: 'b' },
                ChildEdit::Remove { index: 1, element: 'c' },
            ]
        );
    }

    #[test]
    fn test_insert_at_front_has_no_previous() {
        let ops = check(&['b'], &['a', 'b']);
        assert_eq!(
            ops,
            vec![ChildEdit::Insert {
                index: 0,
                element: 'a',
                previous: None,
            }]
        );
    }

    #[test]
    fn test_swap_then_append() {
        let ops = check(&['a', 'b'], &['b', 'a', 'c']);
        assert_eq!(
            ops,
            vec![
                ChildEdit::Remove { index: 1, element: 'b' },
                ChildEdit::Insert {
                    index: 0,
                    element: 'b',
                    previous: None,
                },
                ChildEdit::Insert {
                    index: 2,
                    element: 'c',
                    previous: Some('a'),
                },
            ]
        );
    }

    #[test]
    fn test_move_to_front_is_one_pair() {
        // Greedy policy: pull 'd' forward, leave a/b/c alone.
        let ops = check(&['a', 'b', 'c', 'd'], &['d', 'a', 'b', 'c']);
        assert_eq!(touched(&ops), vec!['d', 'd']);
    }

    #[test]
    fn test_replace_everything() {
        let ops = check(&['a', 'b'], &['x', 'y', 'z']);
        // a and b go first, then x, y, z are appended.
        assert_eq!(touched(&ops), vec!['a', 'b', 'x', 'y', 'z']);
    }

    #[test]
    fn test_arbitrary_permutations_converge() {
        let pool = ['a', 'b', 'c', 'd', 'e', 'f', 'g'];
        // Deterministic pseudo-random shuffles and subsets.
        let mut seed: u32 = 0x9e37_79b9;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };
        for _ in 0..200 {
            let mut old: Vec<char> = pool.iter().copied().filter(|_| next() % 3 != 0).collect();
            let mut new: Vec<char> = pool.iter().copied().filter(|_| next() % 3 != 0).collect();
            for i in (1..old.len()).rev() {
                old.swap(i, next() as usize % (i + 1));
            }
            for i in (1..new.len()).rev() {
                new.swap(i, next() as usize % (i + 1));
            }
            check(&old, &new);
        }
    }

    #[test]
    fn test_stale_elements_leave_neighbours_alone() {
        let ops = check(&['a', 'b', 'c', 'd'], &['a', 'c', 'd']);
        assert_eq!(ops, vec![ChildEdit::Remove { index: 1, element: 'b' }]);

        let ops = check(&['x', 'a', 'y', 'b'], &['a', 'b']);
        assert_eq!(
            ops,
            vec![
                ChildEdit::Remove { index: 0, element: 'x' },
                ChildEdit::Remove { index: 1, element: 'y' },
            ]
        );
    }

    #[test]
    fn test_stale_removed_before_reorder() {
        let ops = check(&['a', 'b', 'c'], &['c', 'a']);
        assert_eq!(
            ops,
            vec![
                ChildEdit::Remove { index: 1, element: 'b' },
                ChildEdit::Remove { index: 1, element: 'c' },
                ChildEdit::Insert {
                    index: 0,
                    element: 'c',
                    previous: None,
                },
            ]
        );
    }

    #[test]
    fn test_unchanged_elements_are_never_touched() {
        let ops = check(&['a', 'b', 'c', 'd', 'e'], &['a', 'x', 'c', 'e', 'y']);
        let touched = touched(&ops);
        for kept in ['a', 'c', 'e'] {
            assert!(!touched.contains(&kept), "{kept} was touched by {ops:?}");
        }
    }

    #[test]
    fn test_sink_error_aborts_script() {
        struct FailOnRemove(usize);

        impl ChildSink<char> for FailOnRemove {
            type Error = &'static str;

            fn insert(&mut self, _: usize, _: char, _: Option<char>) -> Result<(), Self::Error> {
                self.0 += 1;
                Ok(())
            }

            fn remove(&mut self, _: usize, _: char) -> Result<(), Self::Error> {
                Err("no removals allowed")
            }
        }

        let mut current = vec!['a', 'b'];
        let mut sink = FailOnRemove(0);
        let result = reconcile_children(&mut current, &['a'], &mut sink);
        assert_eq!(result, Err("no removals allowed"));
        assert_eq!(sink.0, 0);
    }
}
