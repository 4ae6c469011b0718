use std::collections::HashSet;

use crate::errors::{ExResult, StateError};

/// Single-parent inheritance lookup
pub trait ParentSource {
    /// `inherits_from_version_id` of `version_id`
    fn inherits_from(&self, version_id: &str) -> ExResult<Option<String>>;
}

/// Outcome of looking up one version in the chain
#[derive(Debug, Clone, PartialEq)]
pub enum ChainLookup<T> {
    /// The version holds a live value
    Found(T),
    /// The version holds a delete-mark; stop, nothing is visible
    Tombstone,
    /// The version holds nothing for the key; continue with its parent
    Miss,
}

/// `version_id` followed by its ancestors, nearest first
///
/// # Errors
/// `InheritanceCycle` when a version repeats.
pub fn inheritance_chain<S: ParentSource + ?Sized>(
    source: &S,
    version_id: &str,
) -> ExResult<Vec<String>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(version_id.to_string());

    while let Some(id) = current {
        if !seen.insert(id.clone()) {
            return Err(StateError::InheritanceCycle { version_id: id }.into());
        }
        current = source.inherits_from(&id)?;
        chain.push(id);
    }
    Ok(chain)
}

/// Would making `child` inherit from `new_parent` close a cycle?
pub fn would_close_cycle<S: ParentSource + ?Sized>(
    source: &S,
    child: &str,
    new_parent: &str,
) -> ExResult<bool> {
    if child == new_parent {
        return Ok(true);
    }
    Ok(inheritance_chain(source, new_parent)?
        .iter()
        .any(|id| id == child))
}

/// Walk `chain` nearest first, returning the first live value and the
/// version it was found in
///
/// A tombstone shadows everything further up the chain.
pub fn resolve_through_chain<T, F>(chain: &[String], mut lookup: F) -> ExResult<Option<(T, String)>>
where
    F: FnMut(&str) -> ExResult<ChainLookup<T>>,
{
    for version_id in chain {
        match lookup(version_id)? {
            ChainLookup::Found(value) => return Ok(Some((value, version_id.clone()))),
            ChainLookup::Tombstone => return Ok(None),
            ChainLookup::Miss => continue,
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExErrorKind;
    use std::collections::HashMap;

    struct Parents(HashMap<&'static str, &'static str>);

    impl ParentSource for Parents {
        fn inherits_from(&self, version_id: &str) -> ExResult<Option<String>> {
            Ok(self.0.get(version_id).map(|p| p.to_string()))
        }
    }

    fn forest() -> Parents {
        Parents(HashMap::from([("main", "global"), ("feature", "main")]))
    }

    #[test]
    fn test_chain_nearest_first() {
        let chain = inheritance_chain(&forest(), "feature").unwrap();
        assert_eq!(chain, vec!["feature", "main", "global"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let parents = Parents(HashMap::from([("a", "b"), ("b", "a")]));
        let err = inheritance_chain(&parents, "a").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::CycleDetected);
    }

    #[test]
    fn test_would_close_cycle() {
        let parents = forest();
        assert!(would_close_cycle(&parents, "main", "feature").unwrap());
        assert!(would_close_cycle(&parents, "main", "main").unwrap());
        assert!(!would_close_cycle(&parents, "feature", "global").unwrap());
    }

    #[test]
    fn test_resolution_stops_at_first_hit() {
        let chain: Vec<String> = ["feature", "main", "global"].map(String::from).to_vec();
        let got = resolve_through_chain(&chain, |v| {
            Ok(match v {
                "main" => ChainLookup::Found(2),
                "global" => ChainLookup::Found(3),
                _ => ChainLookup::Miss,
            })
        })
        .unwrap();
        assert_eq!(got, Some((2, "main".to_string())));
    }

    #[test]
    fn test_tombstone_shadows_parent() {
        let chain: Vec<String> = ["feature", "main"].map(String::from).to_vec();
        let got = resolve_through_chain(&chain, |v| {
            Ok(match v {
                "feature" => ChainLookup::Tombstone,
                _ => ChainLookup::Found(1),
            })
        })
        .unwrap();
        assert_eq!(got, None);
    }
}
