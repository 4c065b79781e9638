//! Natural ("human") ordering for suite, case, and instance names.
//!
//! Names are split into maximal runs of ASCII digits and runs of everything
//! else. Digit runs compare as unbounded integers, text runs compare
//! case-insensitively, and at any position a digit run sorts before a text
//! run. Names whose segments compare equal (`"a07"` vs `"a7"`) fall back to a
//! plain byte comparison so the order stays total.

use std::cmp::Ordering;

/// One comparable segment of a name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Segment<'a> {
    Number(Digits<'a>),
    Text(String),
}

/// A run of ASCII digits compared by integer value without parsing.
#[derive(Debug, Clone)]
struct Digits<'a>(&'a str);

impl Digits<'_> {
    fn significant(&self) -> &str {
        let trimmed = self.0.trim_start_matches('0');
        if trimmed.is_empty() { "0" } else { trimmed }
    }
}

impl Ord for Digits<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.significant();
        let right = other.significant();
        left.len()
            .cmp(&right.len())
            .then_with(|| left.cmp(right))
    }
}

impl PartialEq for Digits<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Digits<'_> {}

impl PartialOrd for Digits<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits = None;
    for (index, ch) in text.char_indices() {
        let is_digit = ch.is_ascii_digit();
        match in_digits {
            None => in_digits = Some(is_digit),
            Some(prev) if prev != is_digit => {
                out.push(segment(&text[start..index], prev));
                start = index;
                in_digits = Some(is_digit);
            }
            Some(_) => {}
        }
    }
    if let Some(prev) = in_digits {
        out.push(segment(&text[start..], prev));
    }
    out
}

fn segment(run: &str, digits: bool) -> Segment<'_> {
    if digits {
        Segment::Number(Digits(run))
    } else {
        Segment::Text(run.to_lowercase())
    }
}

/// Compare two names in natural order.
///
/// `"case2" < "case10" < "caseA"`.
pub fn natural_cmp(left: &str, right: &str) -> Ordering {
    segments(left)
        .cmp(&segments(right))
        .then_with(|| left.cmp(right))
}

/// Sort a slice in place by a natural-order key.
pub fn sort_natural_by_key<T, F>(items: &mut [T], mut key: F)
where
    F: FnMut(&T) -> &str,
{
    items.sort_by(|left, right| natural_cmp(key(left), key(right)));
}
