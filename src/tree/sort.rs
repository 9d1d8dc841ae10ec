use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

use super::node::TreeNode;

/// Sort criteria for sibling names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// Plain byte-wise comparison of names.
    #[default]
    Name,
    /// Case-insensitive comparison with digit runs compared by value.
    Natural,
}

impl SortMode {
    /// Parse sort mode from a config string.
    pub fn from_str(s: &str) -> Self {
        match s {
            "natural" => SortMode::Natural,
            _ => SortMode::Name,
        }
    }
}

/// A configurable two-tier ordering: kind first (optional), then name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOptions {
    pub mode: SortMode,
    /// Whether composite nodes are listed before leaves.
    pub dirs_first: bool,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            mode: SortMode::Name,
            dirs_first: true,
        }
    }
}

impl SortOptions {
    pub fn compare(&self, a: &TreeNode, b: &TreeNode) -> Ordering {
        let mut cmp = Ordering::Equal;

        if self.dirs_first {
            cmp = b.is_composite().cmp(&a.is_composite());
        }

        cmp.then_with(|| match self.mode {
            SortMode::Name => a.name.cmp(&b.name),
            SortMode::Natural => natural_cmp(&a.name, &b.name),
        })
    }
}

/// Default ordering: composites before leaves, then names in lexical order.
pub fn default_sort_comparator(a: &TreeNode, b: &TreeNode) -> Ordering {
    SortOptions::default().compare(a, b)
}

/// Compare two names the way a file picker does: case-insensitive, with
/// runs of digits compared numerically (`file2` < `file10`).
///
/// Names equal under those rules fall back to a byte-wise comparison so
/// that the result is still a total order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let l = take_digits(&mut left);
                let r = take_digits(&mut right);
                let l = l.trim_start_matches('0');
                let r = r.trim_start_matches('0');
                let ord = l.len().cmp(&r.len()).then_with(|| l.cmp(r));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.to_lowercase().cmp(y.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }

    a.cmp(b)
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}
