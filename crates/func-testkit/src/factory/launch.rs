//! Launch argument construction and port selection.

use crate::cmdline::{self, CommandOption};
use crate::config::HostConfig;
use crate::error::{FuncTestError, Result};
use serde::Serialize;

/// A requested port that was busy and replaced before launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortSubstitution {
    pub requested: u16,
    pub assigned: u16,
}

/// Everything needed to spawn the host.
#[derive(Debug, Clone)]
pub(crate) struct LaunchPlan {
    pub options: Vec<CommandOption>,
    pub port: u16,
    pub substitution: Option<PortSubstitution>,
}

impl LaunchPlan {
    pub fn args(&self) -> Vec<String> {
        cmdline::serialize(&self.options)
    }
}

fn is_port_option(option: &CommandOption) -> bool {
    HostConfig::PORT_KEYS.contains(&option.key())
}

/// Port named by the first `p`/`port` switch, if any.
pub(crate) fn requested_port(options: &[CommandOption]) -> Result<Option<u16>> {
    let Some(option) = options.iter().find(|o| is_port_option(o)) else {
        return Ok(None);
    };

    let value = option.value().unwrap_or_default();
    match value.parse::<u16>() {
        Ok(port) if port != 0 => Ok(Some(port)),
        _ => Err(FuncTestError::InvalidPort {
            value: value.to_string(),
        }),
    }
}

/// True if any option has `key`.
pub(crate) fn has_switch(options: &[CommandOption], key: &str) -> bool {
    options.iter().any(|o| o.key() == key)
}

/// Build the launch options: `start`, the caller's options, then the port.
///
/// A caller's port switch is kept as given when its port is free. Otherwise
/// every port switch is dropped and `--port <port>` is appended with the port
/// actually used.
pub(crate) fn plan_launch<A, F>(
    caller: &[CommandOption],
    is_available: A,
    find_free: F,
) -> Result<LaunchPlan>
where
    A: Fn(u16) -> bool,
    F: FnOnce() -> Result<u16>,
{
    let explicit = requested_port(caller)?;
    let requested = explicit.unwrap_or(HostConfig::DEFAULT_PORT);

    let (port, substitution) = if is_available(requested) {
        (requested, None)
    } else {
        let assigned = find_free()?;
        (
            assigned,
            Some(PortSubstitution {
                requested,
                assigned,
            }),
        )
    };

    let keep_caller_port = explicit.is_some() && substitution.is_none();

    let mut options = Vec::with_capacity(caller.len() + 2);
    options.push(CommandOption::command(HostConfig::START_COMMAND));
    options.extend(
        caller
            .iter()
            .filter(|o| keep_caller_port || !is_port_option(o))
            .cloned(),
    );
    if !keep_caller_port {
        options.push(CommandOption::new(
            "port",
            HostConfig::PORT_RAW_KEY,
            [port.to_string()],
        ));
    }

    Ok(LaunchPlan {
        options,
        port,
        substitution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_port() -> Result<u16> {
        Ok(50123)
    }

    fn port_after_switch(args: &[String]) -> Option<&str> {
        let index = args.iter().position(|a| a == "--port")?;
        args.get(index + 1).map(String::as_str)
    }

    #[test]
    fn test_default_port_is_appended() {
        let caller = cmdline::parse(["--verbose"]);
        let plan = plan_launch(&caller, |_| true, free_port).unwrap();

        assert_eq!(plan.port, 7071);
        assert!(plan.substitution.is_none());
        let args = plan.args();
        assert_eq!(args[0], "start");
        assert_eq!(port_after_switch(&args), Some("7071"));
    }

    #[test]
    fn test_free_explicit_port_kept_as_given() {
        let caller = cmdline::parse(["-p:7080", "--cors", "*"]);
        let plan = plan_launch(&caller, |_| true, free_port).unwrap();

        assert_eq!(plan.port, 7080);
        let args = plan.args();
        assert!(args.contains(&"-p:7080".to_string()));
        assert!(!args.contains(&"--port".to_string()));
    }

    #[test]
    fn test_busy_port_substituted() {
        let caller = cmdline::parse(["--port", "7072", "--verbose"]);
        let plan = plan_launch(&caller, |port| port != 7072, free_port).unwrap();

        assert_eq!(plan.port, 50123);
        assert_eq!(
            plan.substitution,
            Some(PortSubstitution {
                requested: 7072,
                assigned: 50123
            })
        );
        let args = plan.args();
        assert!(!args.contains(&"7072".to_string()));
        assert_eq!(port_after_switch(&args), Some("50123"));
        assert_eq!(args.last().map(String::as_str), Some("50123"));
    }

    #[test]
    fn test_busy_default_port_substituted() {
        let plan = plan_launch(&[], |_| false, free_port).unwrap();
        assert_eq!(plan.substitution.map(|s| s.requested), Some(7071));
        assert_eq!(port_after_switch(&plan.args()), Some("50123"));
    }

    #[test]
    fn test_invalid_port_rejected() {
        for args in [vec!["-p:abc"], vec!["--port"], vec!["--port", "99999"], vec!["-p", "0"]] {
            let caller = cmdline::parse(&args);
            let err = plan_launch(&caller, |_| true, free_port).unwrap_err();
            assert!(matches!(err, FuncTestError::InvalidPort { .. }), "{args:?}");
        }

        let err = requested_port(&cmdline::parse(["-p:abc"])).unwrap_err();
        assert_eq!(err.to_string(), "Invalid port parameter abc");
    }

    #[test]
    fn test_launch_args_reparse_to_plan() {
        let caller = cmdline::parse(["--cors", "*", "--useHttps", "--debug", "--", "extra"]);
        let plan = plan_launch(&caller, |_| true, free_port).unwrap();
        assert_eq!(cmdline::parse(plan.args()), plan.options);
    }

    #[test]
    fn test_has_switch() {
        let options = cmdline::parse(["--useHttps", "--verbose"]);
        assert!(has_switch(&options, "useHttps"));
        assert!(!has_switch(&options, "debug"));
    }
}
