//! Link-header pagination.
//!
//! Okta returns `Link: <https://org/api/v1/groups?after=00g9&limit=200>; rel="next"`
//! while more pages exist. The transport extracts that URL as an opaque
//! [`PageCursor`]; callers pass it back to fetch the next page and stop when a
//! page carries no cursor. Draining is the caller's job.

use std::fmt;

/// Opaque continuation token for the next page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageCursor(String);

impl PageCursor {
    pub fn new(next_url: impl Into<String>) -> Self {
        Self(next_url.into())
    }

    /// The absolute URL of the next page.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value of the `after` query parameter, when present.
    pub fn after(&self) -> Option<String> {
        let url = reqwest::Url::parse(&self.0).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "after")
            .map(|(_, value)| value.into_owned())
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of decoded items plus the cursor for the next page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<PageCursor>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}

/// Extract the `rel="next"` target from one or more `Link` header values.
pub fn parse_next_link<'a, I>(values: I) -> Option<PageCursor>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .flat_map(|value| value.split(','))
        .find_map(parse_link_entry)
}

fn parse_link_entry(entry: &str) -> Option<PageCursor> {
    let mut parts = entry.split(';');
    let target = parts.next()?.trim();
    let target = target.strip_prefix('<')?.strip_suffix('>')?;

    let is_next = parts.any(|param| {
        let param = param.trim();
        match param.split_once('=') {
            Some((key, value)) => {
                key.trim().eq_ignore_ascii_case("rel")
                    && value
                        .trim()
                        .trim_matches('"')
                        .split_whitespace()
                        .any(|rel| rel.eq_ignore_ascii_case("next"))
            }
            None => false,
        }
    });

    is_next.then(|| PageCursor::new(target))
}
