//! A single parsed command-line switch.

use serde::{Deserialize, Serialize};

/// Value stored for a switch written with a trailing `+`.
pub const TRUE_VALUE: &str = "true";
/// Value stored for a switch written with a trailing `-`.
pub const FALSE_VALUE: &str = "false";

/// One switch (or positional command) together with the values it gathered.
///
/// `raw_key` is the exact token as it must reappear on a command line,
/// including its leading marker and any trailing bool (`+`/`-`) or inline
/// (`:`/`=`) marker. For positional commands `key` and `raw_key` are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandOption {
    key: String,
    raw_key: String,
    values: Vec<String>,
}

impl CommandOption {
    pub fn new<I, S>(key: impl Into<String>, raw_key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            raw_key: raw_key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// A switch or command without values.
    pub fn flag(key: impl Into<String>, raw_key: impl Into<String>) -> Self {
        Self::new(key, raw_key, Vec::<String>::new())
    }

    /// A positional command such as `start`.
    pub fn command(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::flag(name.clone(), name)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn raw_key(&self) -> &str {
        &self.raw_key
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// First value, if any.
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    /// True when the first value is exactly the true or false token.
    pub fn is_explicit_bool_option(&self) -> bool {
        matches!(self.value(), Some(TRUE_VALUE) | Some(FALSE_VALUE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_is_first_element() {
        let option = CommandOption::new("files", "--files", ["a.txt", "b.txt"]);
        assert_eq!(option.value(), Some("a.txt"));
        assert_eq!(option.values().len(), 2);

        assert_eq!(CommandOption::flag("s", "-s").value(), None);
    }

    #[test]
    fn test_explicit_bool() {
        assert!(CommandOption::new("s", "-s+", [TRUE_VALUE]).is_explicit_bool_option());
        assert!(CommandOption::new("s", "-s-", [FALSE_VALUE]).is_explicit_bool_option());
        assert!(!CommandOption::new("s", "-s:", ["yes"]).is_explicit_bool_option());
        assert!(!CommandOption::flag("s", "-s").is_explicit_bool_option());
    }

    #[test]
    fn test_command() {
        let start = CommandOption::command("start");
        assert_eq!(start.key(), "start");
        assert_eq!(start.raw_key(), "start");
        assert!(start.values().is_empty());
    }
}
