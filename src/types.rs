// src/types.rs

use std::str::FromStr;
use serde::Deserialize;

/// Channel used by loop entries that name neither an event nor a schedule.
pub const DEFAULT_CHANNEL: &str = "default";

/// Schedule label used by plan entries that do not name one.
pub const DEFAULT_SCHEDULE: &str = "update";

/// What the engine does with a failure raised by a system body.
///
/// Failures are always caught at the entry that raised them; the policy only
/// decides how they surface afterwards.
///
/// - `Track`: record into the entry's error history and keep going.
/// - `Throw`: record, finish the tick, then hand every failure of the tick
///   back to the caller as an error (default behaviour).
/// - `Silent`: drop the failure; only a debug log line remains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    Track,
    #[default]
    Throw,
    Silent,
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "track" => Ok(ErrorPolicy::Track),
            "throw" => Ok(ErrorPolicy::Throw),
            "silent" => Ok(ErrorPolicy::Silent),
            other => Err(format!(
                "invalid error_policy: {other} (expected \"track\", \"throw\" or \"silent\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_policy_parses_case_insensitively() {
        assert_eq!(" Track ".parse::<ErrorPolicy>(), Ok(ErrorPolicy::Track));
        assert_eq!("SILENT".parse::<ErrorPolicy>(), Ok(ErrorPolicy::Silent));
        assert!("loud".parse::<ErrorPolicy>().is_err());
    }

    #[test]
    fn throw_is_the_default_policy() {
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::Throw);
    }
}
