//! Conversion between raw argument vectors and [`CommandOption`] lists.
//!
//! A token is a *switch* when it matches `^(-|--|/)<name>([+-]|[:=]<value>)?$`.
//! Switches open a new option; any other token is either a value of the open
//! option or, when nothing is open, a positional command. A literal `--`
//! closes the open option and is dropped.
//!
//! [`serialize`] is the inverse: `parse(&serialize(&parse(a))) == parse(a)`.

use super::option::{CommandOption, FALSE_VALUE, TRUE_VALUE};
use regex::Regex;
use std::sync::LazyLock;

/// Token that forcibly closes the option being gathered.
pub const END_OF_OPTIONS: &str = "--";

static SWITCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<raw>(?:--|-|/)(?P<key>[^-/\s:=+]+))(?:(?P<bool>[+-])|(?P<inline>[:=])(?P<value>\S+))?$")
        .expect("switch regex must compile")
});

/// How a raw key carries its value on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawKeyShape {
    /// `-s+` / `-s-`: the value is the marker itself.
    Bool,
    /// `-s:` / `-s=`: the first value is glued to the key.
    Inline,
    /// Everything else: values follow as separate tokens.
    Plain,
}

fn shape_of(option: &CommandOption) -> RawKeyShape {
    let raw_key = option.raw_key();
    // Positional commands keep their token verbatim as both key and raw key.
    if option.key() == raw_key {
        return RawKeyShape::Plain;
    }

    if let Some(caps) = SWITCH.captures(raw_key) {
        if caps.name("bool").is_some() {
            return RawKeyShape::Bool;
        }
        return RawKeyShape::Plain;
    }

    if let Some(head) = raw_key
        .strip_suffix(':')
        .or_else(|| raw_key.strip_suffix('='))
    {
        let bare_switch = SWITCH
            .captures(head)
            .is_some_and(|caps| caps.name("bool").is_none() && caps.name("inline").is_none());
        if bare_switch {
            return RawKeyShape::Inline;
        }
    }

    RawKeyShape::Plain
}

/// True if `arg` matches the switch grammar.
pub fn is_switch(arg: &str) -> bool {
    SWITCH.is_match(arg)
}

struct OptionBuilder {
    key: String,
    raw_key: String,
    values: Vec<String>,
}

impl OptionBuilder {
    fn new(key: &str, raw_key: String) -> Self {
        Self {
            key: key.to_string(),
            raw_key,
            values: Vec::new(),
        }
    }

    fn with_optional_value(mut self, value: &str) -> Self {
        if !value.is_empty() {
            self.values.push(value.to_string());
        }
        self
    }

    fn build(self) -> CommandOption {
        CommandOption::new(self.key, self.raw_key, self.values)
    }

    fn from_token(arg: &str) -> Self {
        let Some(caps) = SWITCH.captures(arg) else {
            // Not a switch: treat it as a command.
            return Self::new(arg, arg.to_string());
        };

        let key = &caps["key"];
        let mut raw_key = caps["raw"].to_string();

        if let Some(marker) = caps.name("bool") {
            raw_key.push_str(marker.as_str());
            let value = if marker.as_str() == "+" {
                TRUE_VALUE
            } else {
                FALSE_VALUE
            };
            return Self::new(key, raw_key).with_optional_value(value);
        }

        if let (Some(separator), Some(value)) = (caps.name("inline"), caps.name("value")) {
            raw_key.push_str(separator.as_str());
            return Self::new(key, raw_key).with_optional_value(value.as_str());
        }

        Self::new(key, raw_key)
    }
}

/// Parse an argument vector into options.
pub fn parse<I, S>(args: I) -> Vec<CommandOption>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = Vec::new();
    let mut current: Option<OptionBuilder> = None;

    for arg in args {
        let arg = arg.as_ref();

        if arg == END_OF_OPTIONS {
            options.extend(current.take().map(OptionBuilder::build));
            continue;
        }

        if is_switch(arg) {
            options.extend(current.take().map(OptionBuilder::build));
        }

        current = Some(match current.take() {
            Some(builder) => builder.with_optional_value(arg),
            None => OptionBuilder::from_token(arg),
        });
    }

    options.extend(current.map(OptionBuilder::build));
    options
}

/// Rebuild an argument vector that parses back to `options`.
///
/// `--` is emitted after an option whenever the next token could otherwise
/// be read as one of its values: after a positional that is not itself a
/// switch, and before a positional that follows any option.
pub fn serialize(options: &[CommandOption]) -> Vec<String> {
    let mut args = Vec::new();

    for (index, option) in options.iter().enumerate() {
        let raw_key = option.raw_key();
        let mut values = option.values().iter();

        let head = match shape_of(option) {
            RawKeyShape::Bool => {
                values.next();
                raw_key.to_string()
            }
            RawKeyShape::Inline => match values.next() {
                Some(value) => format!("{raw_key}{value}"),
                None => raw_key.to_string(),
            },
            RawKeyShape::Plain => raw_key.to_string(),
        };

        let head_is_switch = is_switch(&head);
        args.push(head);
        args.extend(values.cloned());

        if let Some(next) = options.get(index + 1) {
            if !head_is_switch || !is_switch(next.raw_key()) {
                args.push(END_OF_OPTIONS.to_string());
            }
        }
    }

    args
}

/// Join arguments into a single display string, quoting any that contain
/// whitespace.
pub fn to_command_line<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|arg| {
            let arg = arg.as_ref();
            if arg.chars().any(char::is_whitespace) {
                format!("\"{arg}\"")
            } else {
                arg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(args: &str) -> Vec<String> {
        args.split_whitespace().map(str::to_string).collect()
    }

    fn opt(key: &str, raw_key: &str, values: &[&str]) -> CommandOption {
        CommandOption::new(key, raw_key, values.iter().copied())
    }

    fn cases() -> Vec<(&'static str, Vec<CommandOption>)> {
        vec![
            ("-s", vec![opt("s", "-s", &[])]),
            ("--s", vec![opt("s", "--s", &[])]),
            ("/s", vec![opt("s", "/s", &[])]),
            ("-s+", vec![opt("s", "-s+", &["true"])]),
            ("-s-", vec![opt("s", "-s-", &["false"])]),
            ("-s:foo", vec![opt("s", "-s:", &["foo"])]),
            ("-s=foo", vec![opt("s", "-s=", &["foo"])]),
            ("-s foo", vec![opt("s", "-s", &["foo"])]),
            (
                "--files a.txt b.txt c.txt",
                vec![opt("files", "--files", &["a.txt", "b.txt", "c.txt"])],
            ),
            (
                "files a.txt b.txt c.txt",
                vec![opt("files", "files", &["a.txt", "b.txt", "c.txt"])],
            ),
            (
                "--files a.txt b.txt --another",
                vec![
                    opt("files", "--files", &["a.txt", "b.txt"]),
                    opt("another", "--another", &[]),
                ],
            ),
            (
                "files a.txt b.txt -- another",
                vec![
                    opt("files", "files", &["a.txt", "b.txt"]),
                    opt("another", "another", &[]),
                ],
            ),
        ]
    }

    #[test]
    fn test_parse_cases() {
        for (args, expected) in cases() {
            assert_eq!(parse(split(args)), expected, "parsing {args:?}");
        }
    }

    #[test]
    fn test_serialize_cases() {
        for (args, options) in cases() {
            assert_eq!(serialize(&options), split(args), "serializing {args:?}");
        }
    }

    #[test]
    fn test_empty() {
        assert!(parse(Vec::<String>::new()).is_empty());
        assert!(serialize(&[]).is_empty());
    }

    #[test]
    fn test_end_of_options_is_never_a_value() {
        let options = parse(split("files a.txt -- another"));
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].values(), ["a.txt"]);
        assert!(options[1].values().is_empty());
        assert!(options
            .iter()
            .all(|o| o.values().iter().all(|v| v != END_OF_OPTIONS)));
    }

    #[test]
    fn test_leading_and_repeated_end_of_options() {
        let options = parse(split("-- -- start -- --verbose"));
        assert_eq!(options, vec![opt("start", "start", &[]), opt("verbose", "--verbose", &[])]);
    }

    #[test]
    fn test_round_trip() {
        let inputs = [
            "start --port 7071 --verbose",
            "start --cors * --useHttps -p:8080",
            "files a.txt b.txt -- another -- third x y",
            "/flag+ -other- --name=value --list 1 2 3",
            "-s+ stray",
            "-s:foo extra values",
            "--files a.txt b.txt -- another",
            "build- a b -- next",
            "--language-worker -- dotnet",
            "-s: a",
            "--name= x y",
            "-s: a -- --name= b --port 1",
        ];

        for input in inputs {
            let parsed = parse(split(input));
            let reparsed = parse(serialize(&parsed));
            assert_eq!(reparsed, parsed, "round trip of {input:?}");
        }
    }

    #[test]
    fn test_positional_ending_in_marker_keeps_values() {
        let options = parse(split("build- a b"));
        assert_eq!(options, vec![opt("build-", "build-", &["a", "b"])]);
        assert_eq!(serialize(&options), split("build- a b"));
    }

    #[test]
    fn test_positional_with_inline_marker_stays_positional() {
        let options = parse(split("-s: a"));
        assert_eq!(options, vec![opt("-s:", "-s:", &["a"])]);
        assert_eq!(serialize(&options), split("-s: a"));

        let options = parse(split("--name= x y"));
        assert_eq!(options, vec![opt("--name=", "--name=", &["x", "y"])]);
        assert_eq!(serialize(&options), split("--name= x y"));
    }

    #[test]
    fn test_is_switch() {
        assert!(is_switch("-s"));
        assert!(is_switch("--port"));
        assert!(is_switch("/p:8080"));
        assert!(!is_switch("start"));
        assert!(!is_switch("--"));
        assert!(!is_switch("---s"));
        assert!(!is_switch("-s:"));
    }

    #[test]
    fn test_to_command_line_quotes_whitespace() {
        let args = ["start", "--script-root", "C:\\My Functions", "--verbose"];
        assert_eq!(
            to_command_line(&args),
            "start --script-root \"C:\\My Functions\" --verbose"
        );
    }
}
