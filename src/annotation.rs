//! PHPUnit test annotations.
//!
//! Test metadata comes from two places: PHPDoc tags in the docblock that
//! precedes a class or method, and PHP 8 attributes.  Both are folded into
//! one [`Annotations`] value.
//!
//! ```text
//! /**
//!  * @group slow
//!  * @dataProvider additionProvider
//!  */
//! #[Depends('testEmpty'), TestDox('Adds two numbers')]
//! public function testAdd(int $a, int $b) { … }
//! ```

use serde::Serialize;

use crate::ast::{AttributeGroup, Comment, CommentKind};

/// Namespace of PHPUnit's attribute classes.
pub const ATTRIBUTES_NAMESPACE: &str = "PHPUnit\\Framework\\Attributes\\";

/// Metadata attached to a class or test method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotations {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub data_provider: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub testdox: Vec<String>,
    /// `@test` / `#[Test]`: the method is a test regardless of its name.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub test: bool,
}

impl Annotations {
    /// Collect annotations from the docblock among `comments` and from
    /// `attr_groups`.  `resolve` maps an attribute name as written to its
    /// fully-qualified name.
    pub fn parse(comments: &[Comment], attr_groups: &[AttributeGroup], resolve: impl Fn(&str) -> String) -> Self {
        let mut annotations = comments
            .iter()
            .rev()
            .find(|c| c.kind == CommentKind::Doc)
            .map(|doc| parse_docblock(&doc.value))
            .unwrap_or_default();
        annotations.merge(parse_attributes(attr_groups, resolve));
        annotations
    }

    /// Append `other`'s values, skipping ones already present.
    pub fn merge(&mut self, other: Annotations) {
        extend_unique(&mut self.group, other.group);
        extend_unique(&mut self.depends, other.depends);
        extend_unique(&mut self.data_provider, other.data_provider);
        extend_unique(&mut self.testdox, other.testdox);
        self.test |= other.test;
    }

    pub fn is_empty(&self) -> bool {
        self == &Annotations::default()
    }
}

fn extend_unique(target: &mut Vec<String>, values: Vec<String>) {
    for value in values {
        if !target.contains(&value) {
            target.push(value);
        }
    }
}

/// Extract test tags from a `/** … */` docblock.
pub fn parse_docblock(docblock: &str) -> Annotations {
    let inner = docblock
        .trim()
        .strip_prefix("/**")
        .unwrap_or(docblock)
        .strip_suffix("*/")
        .unwrap_or(docblock);

    let mut annotations = Annotations::default();

    for line in inner.lines() {
        let trimmed = line.trim().trim_start_matches('*').trim();
        let Some(tag_line) = trimmed.strip_prefix('@') else {
            continue;
        };

        let (tag, rest) = match tag_line.find(char::is_whitespace) {
            Some(idx) => (&tag_line[..idx], tag_line[idx..].trim()),
            None => (tag_line, ""),
        };
        let first_token = rest.split_whitespace().next();

        match tag {
            "test" => annotations.test = true,
            "group" => {
                if let Some(group) = first_token {
                    extend_unique(&mut annotations.group, vec![group.to_string()]);
                }
            }
            "depends" => {
                if let Some(depends) = first_token {
                    extend_unique(&mut annotations.depends, vec![depends.to_string()]);
                }
            }
            "dataProvider" => {
                if let Some(provider) = first_token {
                    extend_unique(&mut annotations.data_provider, vec![provider.to_string()]);
                }
            }
            // The description runs to the end of the line.
            "testdox" | "testDox" => {
                if !rest.is_empty() {
                    annotations.testdox.push(rest.to_string());
                }
            }
            _ => {}
        }
    }

    annotations
}

/// `Test` for `PHPUnit\Framework\Attributes\Test`, `None` for anything
/// outside that namespace.
fn phpunit_attribute(fqn: &str) -> Option<&str> {
    let prefix = fqn.get(..ATTRIBUTES_NAMESPACE.len())?;
    prefix
        .eq_ignore_ascii_case(ATTRIBUTES_NAMESPACE)
        .then(|| &fqn[ATTRIBUTES_NAMESPACE.len()..])
}

/// Extract test metadata from PHPUnit attributes.
///
/// Names are resolved with `resolve` (imports and the current namespace),
/// so `#[Test]` counts only when `Test` is imported from PHPUnit.  A name
/// already spelled out as `PHPUnit\Framework\Attributes\…` is taken as is.
pub fn parse_attributes(attr_groups: &[AttributeGroup], resolve: impl Fn(&str) -> String) -> Annotations {
    let mut annotations = Annotations::default();

    for attribute in attr_groups.iter().flat_map(|g| g.attributes.iter()) {
        let resolved = resolve(&attribute.name);
        let Some(name) = phpunit_attribute(&attribute.name).or_else(|| phpunit_attribute(&resolved)) else {
            continue;
        };
        let first = attribute.arguments.first().cloned();
        match name {
            "Test" => annotations.test = true,
            "Group" | "Ticket" => {
                if let Some(group) = first {
                    extend_unique(&mut annotations.group, vec![group]);
                }
            }
            "Depends" | "DependsUsingDeepClone" | "DependsUsingShallowClone" => {
                if let Some(depends) = first {
                    extend_unique(&mut annotations.depends, vec![depends]);
                }
            }
            "DataProvider" => {
                if let Some(provider) = first {
                    extend_unique(&mut annotations.data_provider, vec![provider]);
                }
            }
            "TestDox" => {
                if let Some(testdox) = first {
                    annotations.testdox.push(testdox);
                }
            }
            _ => {}
        }
    }

    annotations
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::text::parse_attribute_group;
    use crate::ast::{Loc, Point};

    #[test]
    fn test_docblock_tags() {
        let doc = "/**\n     * @test\n     * @group slow\n     * @group db\n     * @depends testEmpty\n     * @dataProvider additionProvider\n     * @testdox Adds two numbers\n     */";
        let annotations = parse_docblock(doc);
        assert!(annotations.test);
        assert_eq!(annotations.group, vec!["slow", "db"]);
        assert_eq!(annotations.depends, vec!["testEmpty"]);
        assert_eq!(annotations.data_provider, vec!["additionProvider"]);
        assert_eq!(annotations.testdox, vec!["Adds two numbers"]);
    }

    #[test]
    fn test_single_line_docblock() {
        let annotations = parse_docblock("/** @group integration */");
        assert_eq!(annotations.group, vec!["integration"]);
        assert!(!annotations.test);
    }

    #[test]
    fn test_testing_tag_is_not_test() {
        let annotations = parse_docblock("/** @testing something */");
        assert!(!annotations.test);
    }

    /// Resolves against `use PHPUnit\Framework\Attributes\{Group, TestDox}`
    /// and `use ...\DataProvider as DP` inside `namespace Tests`.
    fn resolve(name: &str) -> String {
        match name {
            "Group" | "TestDox" => format!("{}{}", ATTRIBUTES_NAMESPACE, name),
            "DP" => format!("{}DataProvider", ATTRIBUTES_NAMESPACE),
            other => format!("Tests\\{}", other),
        }
    }

    #[test]
    fn test_attributes_resolve_through_imports() {
        let group = parse_attribute_group(
            "#[\\PHPUnit\\Framework\\Attributes\\Test, Group('slow'), DP('rows'), TestDox('Adds')]",
            None,
        );
        let annotations = parse_attributes(&[group], resolve);
        assert!(annotations.test);
        assert_eq!(annotations.group, vec!["slow"]);
        assert_eq!(annotations.data_provider, vec!["rows"]);
        assert_eq!(annotations.testdox, vec!["Adds"]);
    }

    #[test]
    fn test_foreign_attributes_are_ignored() {
        let group = parse_attribute_group("#[Test, DataProvider('rows'), \\App\\Group('x')]", None);
        let annotations = parse_attributes(&[group], resolve);
        assert!(annotations.is_empty());
    }

    #[test]
    fn test_only_the_closest_docblock_counts() {
        let loc = Loc::new(Point::new(0, 0), Point::new(0, 10));
        let comments = vec![
            Comment {
                kind: CommentKind::Doc,
                value: "/** @group old */".to_string(),
                loc,
            },
            Comment {
                kind: CommentKind::Line,
                value: "// @group ignored".to_string(),
                loc,
            },
            Comment {
                kind: CommentKind::Doc,
                value: "/** @group new */".to_string(),
                loc,
            },
        ];
        let annotations = Annotations::parse(&comments, &[], str::to_string);
        assert_eq!(annotations.group, vec!["new"]);
    }

    #[test]
    fn test_merge_deduplicates() {
        let mut a = parse_docblock("/** @group slow */");
        a.merge(parse_docblock("/** @group slow\n * @group fast */"));
        assert_eq!(a.group, vec!["slow", "fast"]);
    }
}
