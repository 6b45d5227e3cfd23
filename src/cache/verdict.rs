use std::fmt;

use super::sentinel::EMPTY_QUERY;

/// Outcome of reading a QueryList.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheVerdict {
    Hit,
    Miss,
    EmptyQuery,
}

impl CacheVerdict {
    /// Decide from the stored list alone. An absent key reads as an empty list.
    pub fn of(list: &[String]) -> Self {
        match list {
            [] => Self::Miss,
            [only] if only == EMPTY_QUERY => Self::EmptyQuery,
            _ => Self::Hit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "CACHE_HIT",
            Self::Miss => "CACHE_MISS",
            Self::EmptyQuery => "EMPTY_QUERY",
        }
    }
}

impl fmt::Display for CacheVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_list_is_a_miss() {
        assert_eq!(CacheVerdict::of(&[]), CacheVerdict::Miss);
    }

    #[test]
    fn sentinel_list_is_empty_query() {
        assert_eq!(
            CacheVerdict::of(&[EMPTY_QUERY.to_string()]),
            CacheVerdict::EmptyQuery
        );
    }

    #[test]
    fn identifiers_are_a_hit() {
        let list = vec!["776f7775666f756e646d6521".to_string()];
        assert_eq!(CacheVerdict::of(&list), CacheVerdict::Hit);
        assert_eq!(CacheVerdict::of(&list).to_string(), "CACHE_HIT");
    }
}
