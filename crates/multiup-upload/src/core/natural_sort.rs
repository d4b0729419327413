use std::cmp::Ordering;

/// Compare file names the way a desktop file explorer does.
///
/// Names are split into alternating digit and non-digit runs. Digit runs
/// compare by numeric value (so `img2` sorts before `img10`), other runs
/// compare case-insensitively, and a digit run sorts before a non-digit run
/// at the same position. Names that are otherwise equal fall back to a plain
/// byte comparison so the order is total and deterministic.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Runs::new(a);
    let mut right = Runs::new(b);

    loop {
        let ord = match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(Run::Digits(x)), Some(Run::Digits(y))) => cmp_digits(x, y),
            (Some(Run::Text(x)), Some(Run::Text(y))) => cmp_text(x, y),
            (Some(Run::Digits(_)), Some(Run::Text(_))) => Ordering::Less,
            (Some(Run::Text(_)), Some(Run::Digits(_))) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

/// Sort `items` in place by natural order of the key.
pub fn sort_naturally_by<T>(items: &mut [T], key: impl Fn(&T) -> &str) {
    items.sort_by(|a, b| natural_cmp(key(a), key(b)));
}

enum Run<'a> {
    Digits(&'a str),
    Text(&'a str),
}

struct Runs<'a> {
    rest: &'a str,
}

impl<'a> Runs<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for Runs<'a> {
    type Item = Run<'a>;

    fn next(&mut self) -> Option<Run<'a>> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digits)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (run, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if digits { Run::Digits(run) } else { Run::Text(run) })
    }
}

fn cmp_digits(x: &str, y: &str) -> Ordering {
    let xt = x.trim_start_matches('0');
    let yt = y.trim_start_matches('0');
    // longer significant part is larger; equal length compares lexically
    xt.len()
        .cmp(&yt.len())
        .then_with(|| xt.cmp(yt))
        .then_with(|| x.len().cmp(&y.len()))
}

fn cmp_text(x: &str, y: &str) -> Ordering {
    let xs = x.chars().flat_map(char::to_lowercase);
    let ys = y.chars().flat_map(char::to_lowercase);
    xs.cmp(ys)
}
