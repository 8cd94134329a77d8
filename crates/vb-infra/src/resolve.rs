//! Resolution of caller-supplied id-or-name tokens against vendor catalogs.

use std::future::Future;

use vb_core::{ClassifiedError, Result};

/// Entries requested per catalog page.
pub const PAGE_SIZE: u32 = 100;

/// Scans stop here even if the backend keeps answering, e.g. when it ignores
/// the page parameter and returns the same page forever.
pub const MAX_PAGES: u32 = 100;

/// A caller token: all digits means an id, anything else a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrName {
    Id(String),
    Name(String),
}

impl IdOrName {
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            Self::Id(token.to_string())
        } else {
            Self::Name(token.to_string())
        }
    }

    /// [`IdOrName::parse`] for a token the caller must supply.
    pub fn required(field: &str, token: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(missing(field));
        }
        Ok(Self::parse(token))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Id(s) | Self::Name(s) => s,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Id(_) => None,
        }
    }
}

/// Fail on the first blank `(field, token)` pair, before any remote call.
pub fn check_present(fields: &[(&str, &str)]) -> Result<()> {
    match fields.iter().find(|(_, token)| token.trim().is_empty()) {
        Some((field, _)) => Err(missing(field)),
        None => Ok(()),
    }
}

fn missing(field: &str) -> ClassifiedError {
    ClassifiedError::validation(format!("{} parameter is required", capitalize(field)))
        .with_data("field", field)
}

pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A catalog record addressable by vendor id or by name.
pub trait CatalogEntry {
    fn entry_id(&self) -> String;

    fn entry_name(&self) -> &str;

    /// Name comparison is exact and case-sensitive.
    fn matches_name(&self, name: &str) -> bool {
        self.entry_name() == name
    }

    fn matches(&self, token: &IdOrName) -> bool {
        match token {
            IdOrName::Id(id) => same_id(&self.entry_id(), id),
            IdOrName::Name(name) => self.matches_name(name),
        }
    }
}

/// Numeric ids compare by value so `"007"` finds entry `7`.
fn same_id(a: &str, b: &str) -> bool {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// First match in an already loaded catalog.
pub fn find_in<'a, T: CatalogEntry>(entries: &'a [T], token: &IdOrName) -> Option<&'a T> {
    entries.iter().find(|entry| entry.matches(token))
}

/// Walk 1-based pages until `matches` accepts an entry or a page comes back empty.
pub async fn scan_pages<T, F, Fut, M>(mut fetch_page: F, matches: M) -> Result<Option<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
    M: Fn(&T) -> bool,
{
    for page in 1..=MAX_PAGES {
        let entries = fetch_page(page).await?;
        if entries.is_empty() {
            return Ok(None);
        }
        if let Some(found) = entries.into_iter().find(|entry| matches(entry)) {
            return Ok(Some(found));
        }
    }

    tracing::warn!(max_pages = MAX_PAGES, "catalog scan stopped at page ceiling");
    Ok(None)
}

/// Strict resolution: turn a miss into `NotFound` carrying what was attempted.
pub fn require<T>(
    found: Option<T>,
    what: &str,
    token: &IdOrName,
    filters: &[(&str, Option<&str>)],
) -> Result<T> {
    found.ok_or_else(|| not_found(what, token, filters))
}

pub fn not_found(what: &str, token: &IdOrName, filters: &[(&str, Option<&str>)]) -> ClassifiedError {
    let mut err = ClassifiedError::not_found(format!("{what} not found"));
    err = match token {
        IdOrName::Id(id) => err.with_data("id", id.as_str()),
        IdOrName::Name(name) => err.with_data("name", name.as_str()),
    };
    for (key, value) in filters {
        if let Some(value) = value {
            err = err.with_data(*key, *value);
        }
    }
    err
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;
    use vb_core::ErrorKind;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Plan {
        id: u32,
        name: String,
    }

    impl CatalogEntry for Plan {
        fn entry_id(&self) -> String {
            self.id.to_string()
        }

        fn entry_name(&self) -> &str {
            &self.name
        }
    }

    fn catalog(n: u32) -> Vec<Plan> {
        (1..=n)
            .map(|id| Plan {
                id,
                name: format!("plan-{id}"),
            })
            .collect()
    }

    fn page_of(all: &[Plan], page: u32) -> Vec<Plan> {
        all.iter()
            .skip(((page - 1) * PAGE_SIZE) as usize)
            .take(PAGE_SIZE as usize)
            .cloned()
            .collect()
    }

    #[test]
    fn digits_are_ids() {
        assert_eq!(IdOrName::parse(" 42 "), IdOrName::Id("42".into()));
        assert_eq!(IdOrName::parse("vps-c"), IdOrName::Name("vps-c".into()));
        assert_eq!(IdOrName::parse("4.5"), IdOrName::Name("4.5".into()));
        assert_eq!(IdOrName::parse(""), IdOrName::Name("".into()));
    }

    #[test]
    fn blank_tokens_are_rejected() {
        for blank in ["", "   "] {
            let err = IdOrName::required("size", blank).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationFailed);
            assert_eq!(err.message(), "Size parameter is required");
            assert_eq!(err.data()["field"], json!("size"));
        }
        assert_eq!(IdOrName::required("size", "7").unwrap(), IdOrName::Id("7".into()));

        let err = check_present(&[("size", "vps-c"), ("image", " "), ("location", "")]).unwrap_err();
        assert_eq!(err.message(), "Image parameter is required");
        assert!(check_present(&[("size", "vps-c"), ("image", "100")]).is_ok());
    }

    #[test]
    fn names_are_case_sensitive_and_first_match_wins() {
        let mut plans = catalog(3);
        plans.push(Plan {
            id: 99,
            name: "plan-2".into(),
        });

        let token = IdOrName::parse("plan-2");
        assert_eq!(find_in(&plans, &token).unwrap().id, 2);
        assert_eq!(find_in(&plans, &token), find_in(&plans, &token));
        assert!(find_in(&plans, &IdOrName::parse("PLAN-2")).is_none());
        assert_eq!(find_in(&plans, &IdOrName::parse("003")).unwrap().id, 3);
    }

    #[tokio::test]
    async fn scans_until_match_on_last_page() {
        let mut all = catalog(250);
        all[240].name = "vps-c".into();
        let fetches = AtomicU32::new(0);
        let token = IdOrName::parse("vps-c");

        let found = scan_pages(
            |page| {
                fetches.fetch_add(1, Ordering::SeqCst);
                let entries = page_of(&all, page);
                async move { Ok(entries) }
            },
            |plan: &Plan| plan.matches(&token),
        )
        .await
        .unwrap();

        assert_eq!(found.unwrap().id, 241);
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_at_first_empty_page() {
        let all = catalog(150);
        let fetches = AtomicU32::new(0);
        let token = IdOrName::parse("nope");

        let found = scan_pages(
            |page| {
                fetches.fetch_add(1, Ordering::SeqCst);
                let entries = page_of(&all, page);
                async move { Ok(entries) }
            },
            |plan: &Plan| plan.matches(&token),
        )
        .await
        .unwrap();

        assert!(found.is_none());
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn page_ceiling_bounds_a_stuck_backend() {
        let fetches = AtomicU32::new(0);
        let token = IdOrName::parse("nope");

        let found = scan_pages(
            |_page| {
                fetches.fetch_add(1, Ordering::SeqCst);
                async { Ok(catalog(5)) }
            },
            |plan: &Plan| plan.matches(&token),
        )
        .await
        .unwrap();

        assert!(found.is_none());
        assert_eq!(fetches.load(Ordering::SeqCst), MAX_PAGES);
    }

    #[test]
    fn strict_miss_reports_token_and_filters() {
        let token = IdOrName::parse("vps-z");
        let err = require(
            None::<Plan>,
            "Plan",
            &token,
            &[("virt", Some("kvm")), ("group", None)],
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), "Plan not found");
        assert_eq!(err.data()["name"], json!("vps-z"));
        assert_eq!(err.data()["virt"], json!("kvm"));
        assert!(!err.data().contains_key("group"));
    }
}
