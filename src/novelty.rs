//! Decide which listed files still need to be staged or loaded.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{PipelineError, Result};
use crate::identifier::{Identified, Identifier};

/// Width of a `YYYY-MM.parquet` suffix.
pub const DATE_SUFFIX_LEN: usize = 15;

static DATE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}\.parquet$").expect("date suffix pattern should parse"));

/// Trailing `YYYY-MM.parquet` of `s`, if it has one.
pub fn date_suffix(s: &str) -> Option<&str> {
    let start = s.len().checked_sub(DATE_SUFFIX_LEN)?;
    s.get(start..).filter(|tail| DATE_SUFFIX.is_match(tail))
}

/// Lower bound on an identifier's date suffix.
///
/// Suffixes are fixed-width and zero-padded, so plain string ordering is
/// chronological ordering. That only holds for this exact format, which is
/// why the cutoff refuses anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateCutoff(String);

impl DateCutoff {
    pub fn new(cutoff: impl Into<String>) -> Result<Self> {
        let cutoff = cutoff.into();
        if !DATE_SUFFIX.is_match(&cutoff) {
            return Err(PipelineError::Configuration(format!(
                "cutoff `{}` is not of the form YYYY-MM.parquet",
                cutoff
            )));
        }
        Ok(Self(cutoff))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Inclusive: a suffix equal to the cutoff passes.
    pub fn admits(&self, id: &Identifier) -> bool {
        date_suffix(id.as_str()).is_some_and(|suffix| suffix >= self.0.as_str())
    }
}

/// Items of `remote` whose identifier is absent from `known`, in `remote` order.
///
/// With a cutoff, items must also carry a date suffix at or after it. Repeated
/// identifiers in `remote` are kept once.
pub fn novelty_filter<T>(remote: &[T], known: &HashSet<Identifier>, cutoff: Option<&DateCutoff>) -> Vec<T>
where
    T: Identified + Clone,
{
    let mut emitted: HashSet<&Identifier> = HashSet::new();
    let mut new = Vec::new();
    for item in remote {
        let id = item.identifier();
        if cutoff.map_or(true, |c| c.admits(id)) && !known.contains(id) && emitted.insert(id) {
            new.push(item.clone());
        }
    }
    new
}

/// Collect identifiers into the `known` side of a comparison.
pub fn known_set<'a, I, T>(items: I) -> HashSet<Identifier>
where
    I: IntoIterator<Item = &'a T>,
    T: Identified + 'a,
{
    items.into_iter().map(|i| i.identifier().clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::{LoadedFileRecord, RemoteFileRef};
    use proptest::prelude::*;
    use url::Url;

    fn ids(keys: &[&str]) -> Vec<Identifier> {
        keys.iter().map(|k| Identifier::object("bucket", k)).collect()
    }

    #[test]
    fn test_empty_known_means_everything_is_new() {
        let remote = ids(&["a.parquet", "b.parquet"]);
        let new = novelty_filter(&remote, &HashSet::new(), None);
        assert_eq!(new, remote);
    }

    #[test]
    fn test_empty_remote_yields_nothing() {
        let known: HashSet<_> = ids(&["a.parquet"]).into_iter().collect();
        let new = novelty_filter::<Identifier>(&[], &known, None);
        assert!(new.is_empty());
    }

    #[test]
    fn test_preserves_remote_order() {
        let remote = ids(&["c.parquet", "a.parquet", "d.parquet", "b.parquet"]);
        let known: HashSet<_> = ids(&["a.parquet"]).into_iter().collect();
        let new = novelty_filter(&remote, &known, None);
        assert_eq!(new, ids(&["c.parquet", "d.parquet", "b.parquet"]));
    }

    #[test]
    fn test_cutoff_boundaries() {
        let cutoff = DateCutoff::new("2024-06.parquet").unwrap();
        let before = Identifier::object("b", "yellow_tripdata_2024-05.parquet");
        let at = Identifier::object("b", "yellow_tripdata_2024-06.parquet");
        let after = Identifier::object("b", "yellow_tripdata_2024-07.parquet");
        assert!(!cutoff.admits(&before));
        assert!(cutoff.admits(&at));
        assert!(cutoff.admits(&after));
    }

    #[test]
    fn test_cutoff_rejects_identifiers_without_suffix() {
        let cutoff = DateCutoff::new("2024-06.parquet").unwrap();
        assert!(!cutoff.admits(&Identifier::object("b", "weather.json")));
        assert!(!cutoff.admits(&Identifier::object("b", "x.parquet")));
    }

    #[test]
    fn test_cutoff_must_be_well_formed() {
        assert!(DateCutoff::new("2024-6.parquet").is_err());
        assert!(DateCutoff::new("2024-06").is_err());
        assert!(DateCutoff::new("2024-06.parquet").is_ok());
    }

    #[test]
    fn test_scrape_scenario_yields_empty() {
        let urls = [
            "https://cdn.example.com/trip-data/a-2024-05.parquet",
            "https://cdn.example.com/trip-data/b-2024-06.parquet",
        ];
        let remote: Vec<RemoteFileRef> = urls
            .iter()
            .map(|u| RemoteFileRef::staged_at(Url::parse(u).unwrap(), "bucket", "").unwrap())
            .collect();
        let staged = [LoadedFileRecord::staged("bucket", "b-2024-06.parquet")];
        let known = known_set(&staged);
        let cutoff = DateCutoff::new("2024-06.parquet").unwrap();

        let new = novelty_filter(&remote, &known, Some(&cutoff));
        assert!(new.is_empty());
    }

    #[test]
    fn test_duplicates_in_remote_emitted_once() {
        let remote = ids(&["a.parquet", "b.parquet", "a.parquet"]);
        let new = novelty_filter(&remote, &HashSet::new(), None);
        assert_eq!(new, ids(&["a.parquet", "b.parquet"]));
    }

    proptest! {
        #[test]
        fn prop_is_ordered_difference_and_idempotent(
            remote in prop::collection::vec("[a-e]{1,2}", 0..20),
            known in prop::collection::hash_set("[a-e]{1,2}", 0..10),
        ) {
            let remote: Vec<Identifier> = remote.iter().map(|k| Identifier::object("b", k)).collect();
            let known: HashSet<Identifier> = known.iter().map(|k| Identifier::object("b", k)).collect();

            let new = novelty_filter(&remote, &known, None);

            // every output is from remote and not known
            for id in &new {
                prop_assert!(remote.contains(id));
                prop_assert!(!known.contains(id));
            }
            // every unknown remote item appears
            for id in &remote {
                prop_assert_eq!(known.contains(id), !new.contains(id));
            }
            // order follows first occurrence in remote
            let positions: Vec<usize> = new
                .iter()
                .map(|id| remote.iter().position(|r| r == id).unwrap())
                .collect();
            prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));

            // filtering again against known ∪ output yields nothing
            let mut grown = known.clone();
            grown.extend(new.iter().cloned());
            prop_assert!(novelty_filter(&new, &grown, None).is_empty());
        }
    }
}
