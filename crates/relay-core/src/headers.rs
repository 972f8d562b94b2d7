//! Ordered, case-insensitive header list.
//!
//! [`Headers`] keeps headers in arrival order and permits duplicates, which is
//! what both sides of the pipeline need: inbound requests preserve what the
//! client sent, and outbound responses can carry multi-valued headers such as
//! `Set-Cookie` or `Vary`.

use crate::error::MalformedRequestError;

/// An ordered list of `(name, value)` header pairs.
///
/// Lookups compare names ASCII case-insensitively. Names keep the casing they
/// were inserted with.
///
/// # Example
///
/// ```
/// use relay_core::Headers;
///
/// let mut headers = Headers::new();
/// headers.append("Set-Cookie", "a=1");
/// headers.append("set-cookie", "b=2");
///
/// assert_eq!(headers.get("SET-COOKIE"), Some("a=1"));
/// assert_eq!(headers.get_all("set-cookie").collect::<Vec<_>>(), ["a=1", "b=2"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a validated header list from raw pairs.
    ///
    /// Fails if any name is empty or contains control characters, whitespace
    /// or `:`, or if any value contains CR, LF or NUL.
    pub fn from_pairs<I, N, V>(pairs: I) -> Result<Self, MalformedRequestError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        let mut headers = Self::new();
        for (name, value) in pairs {
            let name = name.into();
            let value = value.into();
            validate_name(&name)?;
            validate_value(&name, &value)?;
            headers.entries.push((name, value));
        }
        Ok(headers)
    }

    /// Returns the first value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if at least one value exists for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Appends a value, keeping any existing values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replaces all values for `name` with a single value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// Removes every value for `name`, returning how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    /// Iterates over all pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of pairs, counting duplicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the list and returns the raw pairs.
    #[must_use]
    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.entries
    }
}

/// Checks a header name: non-empty, no control characters, whitespace or `:`.
pub fn validate_name(name: &str) -> Result<(), MalformedRequestError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| !c.is_control() && !c.is_whitespace() && c != ':');
    if valid {
        Ok(())
    } else {
        Err(MalformedRequestError::InvalidHeaderName(name.to_string()))
    }
}

/// Checks a header value: no CR, LF or NUL.
pub fn validate_value(name: &str, value: &str) -> Result<(), MalformedRequestError> {
    if value.contains(['\r', '\n', '\0']) {
        Err(MalformedRequestError::InvalidHeaderValue(name.to_string()))
    } else {
        Ok(())
    }
}
