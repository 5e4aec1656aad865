use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::LifecycleError;

/// Accepted shape of a studio user role ARN.
static ROLE_ARN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^arn:aws[a-z\-]*:iam::\d{12}:role/?[a-zA-Z_0-9+=,.@\-/]+$")
        .expect("role ARN pattern is valid")
});

/// Returns the short role name, i.e. the last path segment of an IAM role ARN.
///
/// `arn:aws:iam::111122223333:role/path/StudioExecRole` -> `StudioExecRole`.
pub fn role_name_from_arn(role_arn: &str) -> Result<String, LifecycleError> {
    let trimmed = role_arn.trim();
    if !ROLE_ARN_PATTERN.is_match(trimmed) {
        return Err(malformed(role_arn, "expected arn:<partition>:iam::<account>:role/<name>"));
    }

    match trimmed.rsplit('/').next() {
        Some(leaf) if !leaf.is_empty() && !leaf.starts_with("arn:") => Ok(leaf.to_string()),
        _ => Err(malformed(role_arn, "role name segment is empty")),
    }
}

fn malformed(value: &str, reason: &str) -> LifecycleError {
    LifecycleError::MalformedIdentifier {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
