use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("([a-z])([A-Z])").expect("static camel boundary pattern"));

/// `createdAt` -> `created_at`. Already snake_case input is returned unchanged.
#[must_use]
pub fn to_snake_case(key: &str) -> String {
    match CAMEL_BOUNDARY.replace_all(key, "${1}_${2}") {
        Cow::Borrowed(unchanged) => unchanged.to_lowercase(),
        Cow::Owned(replaced) => replaced.to_lowercase(),
    }
}

/// `created_at` -> `createdAt`.
#[must_use]
pub fn to_camel_case(column: &str) -> String {
    let mut out = String::with_capacity(column.len());
    let mut upper_next = false;
    for ch in column.chars() {
        if ch == '_' && !out.is_empty() {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case() {
        assert_eq!(to_snake_case("createdAt"), "created_at");
        assert_eq!(to_snake_case("isValidUser"), "is_valid_user");
        assert_eq!(to_snake_case("id"), "id");
        assert_eq!(to_snake_case("user_id"), "user_id");
    }

    #[test]
    fn camel_case() {
        assert_eq!(to_camel_case("created_at"), "createdAt");
        assert_eq!(to_camel_case("is_valid_user"), "isValidUser");
        assert_eq!(to_camel_case("id"), "id");
    }

    #[test]
    fn keys_survive_the_round_trip() {
        for key in ["userId", "isActive", "metaJsonData", "name"] {
            assert_eq!(to_camel_case(&to_snake_case(key)), key);
        }
    }
}
