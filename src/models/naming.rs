//! Table and column naming
//!
//! Column names follow the legacy convention where field names are written
//! in Go-style camel case with upper-case initialisms (`TestModelID`).
//! Already snake-cased names pass through unchanged.

use serde::{Deserialize, Serialize};

/// How model and field names map to database identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingStrategy {
    /// Use `test_model` instead of `test_models`
    #[serde(default)]
    pub singular_table: bool,
    /// Prepended to every derived table name
    #[serde(default)]
    pub table_prefix: String,
}

impl NamingStrategy {
    pub fn new(singular_table: bool, table_prefix: impl Into<String>) -> Self {
        Self {
            singular_table,
            table_prefix: table_prefix.into(),
        }
    }

    /// Table name for a model name
    pub fn table_name(&self, model_name: &str) -> String {
        let snake = to_snake_case(model_name);
        let base = if self.singular_table {
            snake
        } else {
            pluralize(&snake)
        };
        format!("{}{}", self.table_prefix, base)
    }

    /// Column name for a field name
    pub fn column_name(field_name: &str) -> String {
        to_snake_case(field_name)
    }
}

/// `TestModelID` -> `test_model_id`, `HTTPServer` -> `http_server`
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                let boundary = prev.is_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_uppercase() && next_lower);
                if boundary && !out.ends_with('_') {
                    out.push('_');
                }
            }
            out.extend(c.to_lowercase());
        } else if c == ' ' || c == '-' {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(c);
        }
    }

    out
}

/// Plural of the last word of a snake-cased name
pub fn pluralize(word: &str) -> String {
    let (head, last) = match word.rfind('_') {
        Some(pos) => word.split_at(pos + 1),
        None => ("", word),
    };

    let plural = match last {
        "" => String::new(),
        "person" => "people".to_string(),
        "child" => "children".to_string(),
        "man" => "men".to_string(),
        w if w.ends_with('y') && !ends_with_vowel_y(w) => format!("{}ies", &w[..w.len() - 1]),
        w if w.ends_with('s')
            || w.ends_with('x')
            || w.ends_with('z')
            || w.ends_with("ch")
            || w.ends_with("sh") =>
        {
            format!("{}es", w)
        }
        w => format!("{}s", w),
    };

    format!("{}{}", head, plural)
}

fn ends_with_vowel_y(word: &str) -> bool {
    let mut rev = word.chars().rev();
    rev.next();
    matches!(rev.next(), Some('a' | 'e' | 'i' | 'o' | 'u'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case_initialisms() {
        assert_eq!(to_snake_case("TestModelID"), "test_model_id");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("ID"), "id");
        assert_eq!(to_snake_case("Address1"), "address1");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("test_model"), "test_models");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("address"), "addresses");
        assert_eq!(pluralize("user_person"), "user_people");
    }

    #[test]
    fn test_table_names() {
        let plural = NamingStrategy::default();
        assert_eq!(plural.table_name("RelatedModel"), "related_models");

        let singular = NamingStrategy::new(true, "app_");
        assert_eq!(singular.table_name("RelatedModel"), "app_related_model");
    }
}
