//! Macro for implementing Display and FromStr for label enums
//!
//! Audit outcomes, error kinds and HTTP methods all travel as short string
//! labels in logs, audit records and configuration files. This macro keeps
//! the enum and its label in one place.
//!
//! # Example
//!
//! ```rust
//! use relay_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Phase {
//!     Pending,
//!     Sent,
//! }
//!
//! impl_domain_status_conversions!(Phase {
//!     Pending => "pending",
//!     Sent => "sent",
//! });
//! ```

/// Implements Display and FromStr traits for label enums
///
/// Parsing is case-insensitive: labels are compared against the lowercased
/// input, so labels themselves must be lowercase.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                }
            }
        }

        impl ::std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Phase {
        Pending,
        Sent,
        Failed,
    }

    impl_domain_status_conversions!(Phase {
        Pending => "pending",
        Sent => "sent",
        Failed => "failed",
    });

    #[test]
    fn test_display_conversion() {
        assert_eq!(Phase::Pending.to_string(), "pending");
        assert_eq!(Phase::Failed.to_string(), "failed");
    }

    #[test]
    fn test_fromstr_is_case_insensitive() {
        assert_eq!(Phase::from_str("SENT").unwrap(), Phase::Sent);
        assert_eq!(Phase::from_str(" Pending ").unwrap(), Phase::Pending);
    }

    #[test]
    fn test_fromstr_invalid() {
        let result = Phase::from_str("retrying");
        assert!(result.unwrap_err().contains("Invalid Phase: retrying"));
        assert!(Phase::from_str("").is_err());
    }

    mod with_crate_result_alias {
        use std::str::FromStr;

        #[allow(dead_code)]
        type Result<T> = std::result::Result<T, crate::IntegrationError>;

        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        enum Stage {
            Queued,
            Done,
        }

        impl_domain_status_conversions!(Stage {
            Queued => "queued",
            Done => "done",
        });

        #[test]
        fn test_expands_next_to_single_parameter_result_alias() {
            assert_eq!(Stage::from_str("DONE").unwrap(), Stage::Done);
            assert_eq!(Stage::Queued.to_string(), "queued");
        }
    }
}
