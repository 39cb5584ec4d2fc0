//! Inline `<meqa …>` annotations.
//!
//! Swagger authors (or a preprocessor) embed markers of the form
//! `<meqa class.property [operation]>` in description fields to say which
//! entity class and property a parameter or schema node stands for. A tag
//! closer to a leaf overrides the one inherited from its enclosing node.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeqaTag {
    pub class: String,
    pub property: String,
    pub operation: String,
}

impl MeqaTag {
    #[must_use]
    pub fn new(class: &str, property: &str, operation: &str) -> Self {
        MeqaTag {
            class: class.to_owned(),
            property: property.to_owned(),
            operation: operation.to_owned(),
        }
    }

    /// Tag carrying only a class, as seeded from a `$ref` definition name.
    #[must_use]
    pub fn for_class(class: &str) -> Self {
        MeqaTag::new(class, "", "")
    }
}

static TAG_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Returns the first `<meqa …>` marker found in the description, if any.
///
/// The first word inside the marker is `class` or `class.property`; an
/// optional second word names the operation the tag pins the value to.
#[must_use]
pub fn get_meqa_tag(description: &str) -> Option<MeqaTag> {
    let re = TAG_PATTERN.get_or_init(|| {
        Regex::new(r"<meqa\s+([^>\s]+)(?:\s+([^>\s]+))?\s*>").unwrap()
    });
    let caps = re.captures(description)?;
    let head = caps.get(1)?.as_str();
    let (class, property) = match head.split_once('.') {
        Some((c, p)) => (c.to_owned(), p.to_owned()),
        None => (head.to_owned(), String::new()),
    };
    let operation = caps
        .get(2)
        .map(|m| m.as_str().to_owned())
        .unwrap_or_default();
    Some(MeqaTag {
        class,
        property,
        operation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_only_tag() {
        let tag = get_meqa_tag("A pet. <meqa Pet>").unwrap();
        assert_eq!(tag.class, "Pet");
        assert!(tag.property.is_empty());
        assert!(tag.operation.is_empty());
    }

    #[test]
    fn test_class_and_property() {
        let tag = get_meqa_tag("<meqa Pet.id>").unwrap();
        assert_eq!(tag.class, "Pet");
        assert_eq!(tag.property, "id");
    }

    #[test]
    fn test_operation_word() {
        let tag = get_meqa_tag("the id <meqa Pet.id delete> to remove").unwrap();
        assert_eq!(tag.class, "Pet");
        assert_eq!(tag.property, "id");
        assert_eq!(tag.operation, "delete");
    }

    #[test]
    fn test_first_marker_wins() {
        let tag = get_meqa_tag("<meqa Pet.id> then <meqa Store.id>").unwrap();
        assert_eq!(tag.class, "Pet");
    }

    #[test]
    fn test_no_marker() {
        assert!(get_meqa_tag("an ordinary description").is_none());
        assert!(get_meqa_tag("").is_none());
    }
}
