/// Class and trait registry used to find inherited test methods.
///
/// A test class frequently inherits its tests from an abstract base class
/// or pulls them in from a trait.  Every class and trait seen by the test
/// parser is registered here by fully-qualified name, and
/// [`ClassHierarchy::resolve_methods`] merges the visible methods with
/// PHP's precedence rules:
///
///   class own > traits > parent chain
///
/// Classes are registered as files are parsed, so a parent declared in a
/// file that has not been parsed yet is not found at first.  Once it is,
/// [`ClassHierarchy::dependent_files`] names the files to re-parse.
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::ast::{MethodNode, TraitAdaptation, Visibility};

/// Depth limit for `extends` chains and trait composition.
const MAX_DEPTH: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Trait,
}

/// A class or trait as declared in one file.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub fqn: String,
    pub kind: ClassKind,
    pub is_abstract: bool,
    /// Fully-qualified parent class name.
    pub parent: Option<String>,
    /// Fully-qualified names of used traits.
    pub traits: Vec<String>,
    /// Trait adaptations with trait names resolved to FQNs.
    pub adaptations: Vec<TraitAdaptation>,
    pub methods: Vec<MethodNode>,
    /// Class imports of the declaring scope, lower-cased alias → FQN.
    pub uses: HashMap<String, String>,
    pub file: PathBuf,
}

/// A method visible on a class, with the class that declares it.
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    pub method: MethodNode,
    pub declaring_class: String,
    /// `true` when the method comes from a parent class or a trait.
    pub inherited: bool,
}

#[derive(Debug, Default)]
pub struct ClassHierarchy {
    classes: HashMap<String, ClassInfo>,
}

impl ClassHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a class by its FQN.
    pub fn register(&mut self, info: ClassInfo) {
        self.classes.insert(info.fqn.clone(), info);
    }

    pub fn get(&self, fqn: &str) -> Option<&ClassInfo> {
        self.classes.get(fqn.trim_start_matches('\\'))
    }

    /// Drop every class declared in `file`.
    pub fn remove_file(&mut self, file: &Path) {
        self.classes.retain(|_, info| info.file != file);
    }

    /// Drop every class declared in a file under `root`.
    pub fn remove_under(&mut self, root: &Path) {
        self.classes.retain(|_, info| !info.file.starts_with(root));
    }

    /// `true` when a class declared in `file` extends a class or uses a
    /// trait, i.e. when its resolved methods depend on other files.
    pub fn has_dependencies(&self, file: &Path) -> bool {
        self.classes
            .values()
            .any(|info| info.file == file && (info.parent.is_some() || !info.traits.is_empty()))
    }

    /// Files declaring classes that extend or use, directly or through
    /// other classes, a class or trait declared in `file`.  Sorted, never
    /// containing `file` itself.
    pub fn dependent_files(&self, file: &Path) -> Vec<PathBuf> {
        let mut names: HashSet<String> = self
            .classes
            .values()
            .filter(|info| info.file == file)
            .map(|info| info.fqn.to_ascii_lowercase())
            .collect();
        let mut files = BTreeSet::new();

        loop {
            let found: Vec<&ClassInfo> = self
                .classes
                .values()
                .filter(|info| !names.contains(&info.fqn.to_ascii_lowercase()))
                .filter(|info| {
                    info.parent
                        .iter()
                        .chain(&info.traits)
                        .any(|name| names.contains(&name.trim_start_matches('\\').to_ascii_lowercase()))
                })
                .collect();
            if found.is_empty() {
                break;
            }
            for info in found {
                names.insert(info.fqn.to_ascii_lowercase());
                if info.file != file {
                    files.insert(info.file.clone());
                }
            }
        }

        files.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// All methods visible on `fqn`: its own, then trait methods, then the
    /// parent chain.  Private parent methods are not inherited; private
    /// trait methods are, since PHP copies trait members into the class.
    pub fn resolve_methods(&self, fqn: &str) -> Vec<ResolvedMethod> {
        let Some(class) = self.get(fqn) else {
            return Vec::new();
        };

        let mut merged: Vec<ResolvedMethod> = class
            .methods
            .iter()
            .map(|method| ResolvedMethod {
                method: method.clone(),
                declaring_class: class.fqn.clone(),
                inherited: false,
            })
            .collect();

        self.merge_traits_into(&mut merged, class, 0);

        let mut current = class;
        let mut depth = 0;
        while let Some(parent_name) = &current.parent {
            depth += 1;
            if depth > MAX_DEPTH {
                break;
            }
            let Some(parent) = self.get(parent_name) else {
                break;
            };

            let mut parent_methods: Vec<ResolvedMethod> = parent
                .methods
                .iter()
                .map(|method| ResolvedMethod {
                    method: method.clone(),
                    declaring_class: parent.fqn.clone(),
                    inherited: true,
                })
                .collect();
            self.merge_traits_into(&mut parent_methods, parent, depth);

            for resolved in parent_methods {
                if resolved.method.visibility == Visibility::Private {
                    continue;
                }
                if merged
                    .iter()
                    .any(|m| m.method.name.eq_ignore_ascii_case(&resolved.method.name))
                {
                    continue;
                }
                merged.push(ResolvedMethod {
                    inherited: true,
                    ..resolved
                });
            }

            current = parent;
        }

        merged
    }

    /// Find one visible method by name (case-insensitive, like PHP).
    pub fn find_method(&self, fqn: &str, name: &str) -> Option<ResolvedMethod> {
        self.resolve_methods(fqn)
            .into_iter()
            .find(|m| m.method.name.eq_ignore_ascii_case(name))
    }

    /// Merge the methods of the traits used by `using` into `merged`,
    /// applying its `insteadof` and `as` adaptations.
    fn merge_traits_into(&self, merged: &mut Vec<ResolvedMethod>, using: &ClassInfo, depth: u32) {
        if depth > MAX_DEPTH {
            return;
        }

        for trait_name in &using.traits {
            let Some(trait_info) = self.get(trait_name) else {
                continue;
            };

            let mut trait_methods: Vec<ResolvedMethod> = trait_info
                .methods
                .iter()
                .map(|method| ResolvedMethod {
                    method: method.clone(),
                    declaring_class: trait_info.fqn.clone(),
                    inherited: true,
                })
                .collect();
            // Trait composition.
            self.merge_traits_into(&mut trait_methods, trait_info, depth + 1);

            for resolved in trait_methods {
                let aliases = aliases_for(&using.adaptations, &trait_info.fqn, &resolved.method.name);

                // Aliases apply even to a method excluded by `insteadof`.
                for (alias, visibility) in &aliases {
                    if let Some(name) = alias {
                        let mut aliased = resolved.clone();
                        aliased.method.name = name.to_string();
                        if let Some(visibility) = visibility {
                            aliased.method.visibility = *visibility;
                        }
                        push_unique(merged, aliased);
                    }
                }

                if excluded_by_precedence(&using.adaptations, &trait_info.fqn, &resolved.method.name) {
                    continue;
                }

                // `foo as protected;` changes the original in place.
                let mut original = resolved;
                if let Some(visibility) = aliases
                    .iter()
                    .find(|(alias, _)| alias.is_none())
                    .and_then(|(_, visibility)| *visibility)
                {
                    original.method.visibility = visibility;
                }
                push_unique(merged, original);
            }
        }
    }
}

fn push_unique(merged: &mut Vec<ResolvedMethod>, method: ResolvedMethod) {
    if merged
        .iter()
        .any(|m| m.method.name.eq_ignore_ascii_case(&method.method.name))
    {
        return;
    }
    merged.push(method);
}

fn same_trait(reference: &str, trait_fqn: &str) -> bool {
    let reference = reference.trim_start_matches('\\');
    reference.eq_ignore_ascii_case(trait_fqn)
        || trait_fqn
            .rsplit('\\')
            .next()
            .is_some_and(|short| short.eq_ignore_ascii_case(reference))
}

/// `Other::foo insteadof ThisTrait` removes `ThisTrait::foo`.
fn excluded_by_precedence(adaptations: &[TraitAdaptation], trait_fqn: &str, method: &str) -> bool {
    adaptations.iter().any(|adaptation| match adaptation {
        TraitAdaptation::Precedence {
            trait_name,
            method: m,
            insteadof,
        } => {
            m.eq_ignore_ascii_case(method)
                && !same_trait(trait_name, trait_fqn)
                && insteadof.iter().any(|t| same_trait(t, trait_fqn))
        }
        TraitAdaptation::Alias { .. } => false,
    })
}

/// `(alias, visibility)` pairs declared for `trait_fqn::method`.
fn aliases_for<'a>(
    adaptations: &'a [TraitAdaptation],
    trait_fqn: &str,
    method: &str,
) -> Vec<(Option<&'a str>, Option<Visibility>)> {
    adaptations
        .iter()
        .filter_map(|adaptation| match adaptation {
            TraitAdaptation::Alias {
                trait_name,
                method: m,
                alias,
                visibility,
            } if m.eq_ignore_ascii_case(method)
                && trait_name.as_deref().is_none_or(|t| same_trait(t, trait_fqn)) =>
            {
                Some((alias.as_deref(), *visibility))
            }
            _ => None,
        })
        .collect()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Loc;

    fn method(name: &str, visibility: Visibility) -> MethodNode {
        MethodNode {
            name: name.to_string(),
            visibility,
            is_abstract: false,
            is_static: false,
            body: None,
            leading_comments: Vec::new(),
            attr_groups: Vec::new(),
            loc: Loc::default(),
        }
    }

    fn class(fqn: &str, kind: ClassKind, methods: Vec<MethodNode>) -> ClassInfo {
        ClassInfo {
            fqn: fqn.to_string(),
            kind,
            is_abstract: false,
            parent: None,
            traits: Vec::new(),
            adaptations: Vec::new(),
            methods,
            uses: HashMap::new(),
            file: PathBuf::from(format!("/{}.php", fqn.replace('\\', "/"))),
        }
    }

    fn names(methods: &[ResolvedMethod]) -> Vec<&str> {
        methods.iter().map(|m| m.method.name.as_str()).collect()
    }

    #[test]
    fn test_parent_methods_are_inherited_child_wins() {
        let mut hierarchy = ClassHierarchy::new();
        let mut base = class(
            "Tests\\BaseTest",
            ClassKind::Class,
            vec![
                method("test_shared", Visibility::Public),
                method("test_overridden", Visibility::Public),
                method("helper", Visibility::Private),
            ],
        );
        base.is_abstract = true;
        hierarchy.register(base);

        let mut child = class(
            "Tests\\ChildTest",
            ClassKind::Class,
            vec![method("test_overridden", Visibility::Public)],
        );
        child.parent = Some("Tests\\BaseTest".to_string());
        hierarchy.register(child);

        let resolved = hierarchy.resolve_methods("Tests\\ChildTest");
        assert_eq!(names(&resolved), vec!["test_overridden", "test_shared"]);
        assert!(!resolved[0].inherited);
        assert!(resolved[1].inherited);
        assert_eq!(resolved[1].declaring_class, "Tests\\BaseTest");
    }

    #[test]
    fn test_trait_methods_with_alias_and_insteadof() {
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.register(class(
            "A",
            ClassKind::Trait,
            vec![method("test_hello", Visibility::Public)],
        ));
        hierarchy.register(class(
            "B",
            ClassKind::Trait,
            vec![method("test_hello", Visibility::Public)],
        ));

        let mut user = class("UsesTraitsTest", ClassKind::Class, Vec::new());
        user.traits = vec!["A".to_string(), "B".to_string()];
        user.adaptations = vec![
            TraitAdaptation::Precedence {
                trait_name: "A".to_string(),
                method: "test_hello".to_string(),
                insteadof: vec!["B".to_string()],
            },
            TraitAdaptation::Alias {
                trait_name: Some("B".to_string()),
                method: "test_hello".to_string(),
                alias: Some("test_hello_b".to_string()),
                visibility: None,
            },
        ];
        hierarchy.register(user);

        let resolved = hierarchy.resolve_methods("UsesTraitsTest");
        assert_eq!(names(&resolved), vec!["test_hello", "test_hello_b"]);
        assert_eq!(resolved[0].declaring_class, "A");
        assert_eq!(resolved[1].declaring_class, "B");
    }

    #[test]
    fn test_visibility_only_alias_changes_original() {
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.register(class(
            "T",
            ClassKind::Trait,
            vec![method("test_a", Visibility::Public)],
        ));
        let mut user = class("UserTest", ClassKind::Class, Vec::new());
        user.traits = vec!["T".to_string()];
        user.adaptations = vec![TraitAdaptation::Alias {
            trait_name: None,
            method: "test_a".to_string(),
            alias: None,
            visibility: Some(Visibility::Protected),
        }];
        hierarchy.register(user);

        let resolved = hierarchy.resolve_methods("UserTest");
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].method.visibility, Visibility::Protected);
    }

    #[test]
    fn test_circular_inheritance_terminates() {
        let mut hierarchy = ClassHierarchy::new();
        let mut a = class("A", ClassKind::Class, vec![method("test_a", Visibility::Public)]);
        a.parent = Some("B".to_string());
        let mut b = class("B", ClassKind::Class, vec![method("test_b", Visibility::Public)]);
        b.parent = Some("A".to_string());
        hierarchy.register(a);
        hierarchy.register(b);

        assert_eq!(names(&hierarchy.resolve_methods("A")), vec!["test_a", "test_b"]);
    }

    #[test]
    fn test_parent_methods_match_case_insensitively() {
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.register(class(
            "Tests\\BaseTest",
            ClassKind::Class,
            vec![method("testShared", Visibility::Public)],
        ));
        let mut child = class(
            "Tests\\ChildTest",
            ClassKind::Class,
            vec![method("TESTSHARED", Visibility::Public)],
        );
        child.parent = Some("Tests\\BaseTest".to_string());
        hierarchy.register(child);

        let resolved = hierarchy.resolve_methods("Tests\\ChildTest");
        assert_eq!(names(&resolved), vec!["TESTSHARED"]);
        assert!(!resolved[0].inherited);
    }

    #[test]
    fn test_dependent_files_follow_parents_and_traits() {
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.register(class("Tests\\BaseTest", ClassKind::Class, Vec::new()));
        hierarchy.register(class("Tests\\Checks", ClassKind::Trait, Vec::new()));

        let mut middle = class("Tests\\MiddleTest", ClassKind::Class, Vec::new());
        middle.parent = Some("Tests\\BaseTest".to_string());
        hierarchy.register(middle);

        let mut leaf = class("Tests\\LeafTest", ClassKind::Class, Vec::new());
        leaf.parent = Some("\\Tests\\MiddleTest".to_string());
        hierarchy.register(leaf);

        let mut user = class("Tests\\UserTest", ClassKind::Class, Vec::new());
        user.traits = vec!["Tests\\Checks".to_string()];
        hierarchy.register(user);

        assert_eq!(
            hierarchy.dependent_files(Path::new("/Tests/BaseTest.php")),
            vec![PathBuf::from("/Tests/LeafTest.php"), PathBuf::from("/Tests/MiddleTest.php")]
        );
        assert_eq!(
            hierarchy.dependent_files(Path::new("/Tests/Checks.php")),
            vec![PathBuf::from("/Tests/UserTest.php")]
        );
        assert!(hierarchy.dependent_files(Path::new("/Tests/UserTest.php")).is_empty());
        assert!(hierarchy.has_dependencies(Path::new("/Tests/LeafTest.php")));
        assert!(!hierarchy.has_dependencies(Path::new("/Tests/BaseTest.php")));
    }

    #[test]
    fn test_remove_file_drops_its_classes() {
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.register(class("A", ClassKind::Class, Vec::new()));
        hierarchy.register(class("B", ClassKind::Class, Vec::new()));
        hierarchy.remove_file(Path::new("/A.php"));
        assert!(hierarchy.get("A").is_none());
        assert!(hierarchy.get("B").is_some());
    }
}
