//! `${VAR}` references in server environments.
//!
//! A value may contain any number of `${NAME}` or `${NAME:-default}`
//! references. The default applies when the variable is unset or empty.
//! An unterminated `${` is kept literally.

use std::collections::BTreeMap;

/// Environment lookup backed by the supervisor's own process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Expand every reference in `value`.
///
/// Returns the name of the first variable that has neither a value nor a
/// default.
pub fn expand(
    value: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };

        let reference = &after[..end];
        let (name, default) = match reference.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (reference, None),
        };

        let resolved = match (lookup(name), default) {
            (Some(v), Some(d)) if v.is_empty() => d.to_string(),
            (Some(v), _) => v,
            (None, Some(d)) => d.to_string(),
            (None, None) => return Err(name.to_string()),
        };
        out.push_str(&resolved);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Expand every value of an environment map.
pub fn resolve_map(
    env: &BTreeMap<String, String>,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> std::result::Result<BTreeMap<String, String>, String> {
    env.iter()
        .map(|(key, value)| Ok((key.clone(), expand(value, lookup)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "SNOWFLAKE_USER" => Some("ASH073108".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn test_plain_values_pass_through() {
        assert_eq!(expand("TABLEAU_CONNECT", &lookup).unwrap(), "TABLEAU_CONNECT");
        assert_eq!(expand("", &lookup).unwrap(), "");
    }

    #[test]
    fn test_references_are_substituted() {
        assert_eq!(expand("${SNOWFLAKE_USER}", &lookup).unwrap(), "ASH073108");
        assert_eq!(
            expand("user=${SNOWFLAKE_USER};db=${DB:-RAIDER_DB}", &lookup).unwrap(),
            "user=ASH073108;db=RAIDER_DB"
        );
    }

    #[test]
    fn test_default_applies_to_empty_value() {
        assert_eq!(expand("${EMPTY:-fallback}", &lookup).unwrap(), "fallback");
        assert_eq!(expand("${EMPTY}", &lookup).unwrap(), "");
    }

    #[test]
    fn test_missing_variable_is_reported() {
        assert_eq!(
            expand("${SNOWFLAKE_PASSWORD}", &lookup).unwrap_err(),
            "SNOWFLAKE_PASSWORD"
        );
    }

    #[test]
    fn test_unterminated_reference_is_literal() {
        assert_eq!(expand("cost ${5", &lookup).unwrap(), "cost ${5");
    }

    #[test]
    fn test_resolve_map_fails_on_first_missing() {
        let mut env = BTreeMap::new();
        env.insert("USER".to_string(), "${SNOWFLAKE_USER}".to_string());
        env.insert("TOKEN".to_string(), "${FOUNDRY_AUTH_TOKEN}".to_string());

        assert_eq!(resolve_map(&env, &lookup).unwrap_err(), "FOUNDRY_AUTH_TOKEN");

        env.remove("TOKEN");
        let resolved = resolve_map(&env, &lookup).unwrap();
        assert_eq!(resolved["USER"], "ASH073108");
    }
}
