//! Canonical type naming
//!
//! Maps schema-tree positions to generated type names, handling:
//! - PascalCase mapping of schema local names (kebab-case in the wild)
//! - Keyword escaping for names that would collide with Rust keywords
//! - Numeric-suffix disambiguation for augmentation type names
//!
//! Naming is a pure function of the defining schema path, so multiply
//! instantiated grouping content resolves to one shared name no matter
//! which use site is being indexed.

use std::collections::HashSet;

use crate::schema::{QName, SchemaPath};
use crate::typed::TypeName;

/// Convert a schema local name to PascalCase
pub fn to_pascal_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = true;

    // All-caps inputs (SCREAMING_SNAKE enumeration constants) lowercase
    // their tails instead of being carried through verbatim.
    let is_all_caps = s
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-');

    for c in s.chars() {
        if c == '_' || c == '-' || c == ' ' || c == '.' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else if is_all_caps {
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }

    if is_rust_keyword(&result.to_lowercase()) {
        result.push('_');
    }

    result
}

/// Convert a schema local name to snake_case, used for member accessor names
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;

    for c in s.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c == '-' || c == ' ' || c == '.' {
            result.push('_');
            prev_lower = false;
        } else {
            result.push(c);
            prev_lower = c.is_ascii_lowercase();
        }
    }

    if is_rust_keyword(&result) {
        result.push('_');
    }

    result
}

fn is_rust_keyword(s: &str) -> bool {
    matches!(
        s,
        "as" | "async" | "await" | "break" | "const" | "continue" | "crate" | "dyn" |
        "else" | "enum" | "extern" | "false" | "fn" | "for" | "if" | "impl" |
        "in" | "let" | "loop" | "match" | "mod" | "move" | "mut" | "pub" |
        "ref" | "return" | "self" | "static" | "struct" | "super" |
        "trait" | "true" | "type" | "unsafe" | "use" | "where" | "while" |
        "abstract" | "become" | "box" | "do" | "final" | "macro" | "override" |
        "priv" | "try" | "typeof" | "unsized" | "virtual" | "yield"
    )
}

/// Type name of a module-level definition (typedef, identity)
pub fn module_type_name(module: &str, local: &str) -> TypeName {
    TypeName::new(format!(
        "{}.{}",
        to_snake_case(module),
        to_pascal_case(local)
    ))
}

/// Type name for a defining schema path
///
/// The first segment contributes the module prefix; every segment nests one
/// PascalCase component. Paths rooted at a grouping name the grouping's
/// shared types.
pub fn type_name_for_path(path: &SchemaPath) -> TypeName {
    let mut segments = path.segments().iter();
    let first = segments
        .next()
        .expect("type name requested for empty schema path");
    let mut name = module_type_name(&first.module, &first.name);
    for q in segments {
        name = name.nested(&to_pascal_case(&q.name));
    }
    name
}

/// Tracks assigned augmentation type names per augmenting module and hands
/// out numeric suffixes
///
/// The suffix search starts at 1 and takes the first free slot; callers are
/// responsible for feeding augmentations in a deterministic order so the
/// assignment is reproducible across builds.
#[derive(Debug, Default)]
pub struct AugmentNamer {
    taken: HashSet<TypeName>,
}

impl AugmentNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the suffixed name for an augmentation of `target_local`
    /// declared by `module`
    pub fn assign(&mut self, module: &str, target_local: &str) -> TypeName {
        let base = to_pascal_case(target_local);
        let mut index = 1usize;
        loop {
            let candidate = module_type_name(module, &format!("{base}{index}"));
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            index += 1;
        }
    }

    /// Record an explicit override name; returns false if already taken
    pub fn claim(&mut self, module: &str, override_name: &str) -> Option<TypeName> {
        let name = module_type_name(module, override_name);
        self.taken.insert(name.clone()).then_some(name)
    }
}

/// Sort key fixing the order augmentations of one target are processed in:
/// lexicographic by declaring module, then by smallest declared child name.
/// Map-iteration order never participates.
pub fn augment_sort_key(module: &str, children: &[QName]) -> (String, Option<QName>) {
    (module.to_string(), children.iter().min().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_pascal_case() {
        assert_eq!(to_pascal_case("top-level-list"), "TopLevelList");
        assert_eq!(to_pascal_case("simple_value"), "SimpleValue");
        assert_eq!(to_pascal_case("Top"), "Top");
        assert_eq!(to_pascal_case("PENDING"), "Pending");
        // Keywords get a trailing underscore
        assert_eq!(to_pascal_case("type"), "Type_");
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("TopLevelList"), "top_level_list");
        assert_eq!(to_snake_case("simple-value"), "simple_value");
        assert_eq!(to_snake_case("match"), "match_");
    }

    #[test]
    fn test_type_name_for_path() {
        let path = SchemaPath::of(QName::new("demo-test", "top"))
            .child(QName::new("demo-test", "top-level-list"));
        assert_eq!(
            type_name_for_path(&path).as_str(),
            "demo_test.Top.TopLevelList"
        );
    }

    #[test]
    fn test_augment_suffixes() {
        let mut namer = AugmentNamer::new();
        assert_eq!(namer.assign("aug-mod", "top").as_str(), "aug_mod.Top1");
        assert_eq!(namer.assign("aug-mod", "top").as_str(), "aug_mod.Top2");
        // A different module starts its own sequence
        assert_eq!(namer.assign("other", "top").as_str(), "other.Top1");
    }

    #[test]
    fn test_override_claim() {
        let mut namer = AugmentNamer::new();
        let claimed = namer.claim("aug-mod", "TopAug").unwrap();
        assert_eq!(claimed.as_str(), "aug_mod.TopAug");
        assert!(namer.claim("aug-mod", "TopAug").is_none());
        // Overrides also block generated names from reusing the slot
        assert_eq!(namer.assign("aug-mod", "top").as_str(), "aug_mod.Top1");
    }
}
