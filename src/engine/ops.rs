//! Operation types and the deterministic ordering rule from spec.md §4.1
//! step 2: "all replaces first, ordered by descending start-line ...; then
//! inserts ordered by ascending anchor; then creates."

use super::selector::Selector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Replace {
        selector: Selector,
        fragment: String,
    },
    Insert {
        anchor: Selector,
        fragment: String,
        position: InsertPosition,
    },
    Create {
        fragment: String,
    },
}

/// Sort `operations` into the engine's deterministic application order.
/// `start_line_of` resolves each operation's selector against the
/// *original* candidate so the sort key is stable even though later
/// operations are applied against a source that has already shifted.
pub fn ordered<'a, F>(operations: &'a [Operation], mut start_line_of: F) -> Vec<&'a Operation>
where
    F: FnMut(&Operation) -> Option<u32>,
{
    let mut replaces: Vec<&Operation> = Vec::new();
    let mut inserts: Vec<&Operation> = Vec::new();
    let mut creates: Vec<&Operation> = Vec::new();

    for op in operations {
        match op {
            Operation::Replace { .. } => replaces.push(op),
            Operation::Insert { .. } => inserts.push(op),
            Operation::Create { .. } => creates.push(op),
        }
    }

    replaces.sort_by_key(|op| std::cmp::Reverse(start_line_of(op).unwrap_or(0)));
    inserts.sort_by_key(|op| start_line_of(op).unwrap_or(0));

    let mut out = Vec::with_capacity(operations.len());
    out.extend(replaces);
    out.extend(inserts);
    out.extend(creates);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_before_inserts_before_creates() {
        let ops = vec![
            Operation::Create {
                fragment: "x".into(),
            },
            Operation::Insert {
                anchor: Selector::LineRange(1, 1),
                fragment: "y".into(),
                position: InsertPosition::After,
            },
            Operation::Replace {
                selector: Selector::LineRange(1, 1),
                fragment: "z".into(),
            },
        ];
        let lines = [5u32, 2u32, 9u32];
        let sorted = ordered(&ops, |op| match op {
            Operation::Create { .. } => Some(lines[0]),
            Operation::Insert { .. } => Some(lines[1]),
            Operation::Replace { .. } => Some(lines[2]),
        });
        assert!(matches!(sorted[0], Operation::Replace { .. }));
        assert!(matches!(sorted[1], Operation::Insert { .. }));
        assert!(matches!(sorted[2], Operation::Create { .. }));
    }

    #[test]
    fn replaces_sorted_by_descending_start_line() {
        let ops = vec![
            Operation::Replace {
                selector: Selector::LineRange(3, 3),
                fragment: "a".into(),
            },
            Operation::Replace {
                selector: Selector::LineRange(10, 10),
                fragment: "b".into(),
            },
        ];
        let sorted = ordered(&ops, |op| match op {
            Operation::Replace {
                selector: Selector::LineRange(s, _),
                ..
            } => Some(*s),
            _ => None,
        });
        match sorted[0] {
            Operation::Replace {
                selector: Selector::LineRange(s, _),
                ..
            } => assert_eq!(*s, 10),
            _ => panic!("expected replace"),
        }
    }
}
