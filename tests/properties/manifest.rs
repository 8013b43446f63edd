//! Property tests for dependency manifest parsing.

use std::path::Path;

use proptest::prelude::*;

use stevedore::manifest::{normalize_name, Manifest};

fn package_name() -> impl Strategy<Value = String> {
    // Starts and ends alphanumeric; separators allowed in between.
    proptest::string::string_regex("[a-zA-Z0-9]([a-zA-Z0-9._-]{0,10}[a-zA-Z0-9])?").unwrap()
}

fn version() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[0-9]{1,4}(\\.[0-9]{1,4}){0,3}").unwrap()
}

fn operator() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("=="),
        Just(">="),
        Just("<="),
        Just("~="),
        Just("!="),
        Just("<"),
        Just(">"),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: parsing never panics, whatever the manifest contains.
    #[test]
    fn property_parse_never_panics(content in "(?s).{0,256}") {
        let _ = Manifest::parse(Path::new("requirements.txt"), &content);
    }

    /// PROPERTY: a well-formed `name<op>version` line always parses, with the
    /// name normalized and the constraint preserved verbatim.
    #[test]
    fn property_valid_specifier_parses(
        name in package_name(),
        op in operator(),
        version in version(),
    ) {
        let line = format!("{}{}{}", name, op, version);
        let manifest = Manifest::parse(Path::new("requirements.txt"), &line)
            .expect("constructed specifier should parse");

        prop_assert_eq!(manifest.len(), 1);
        let spec = &manifest.specifiers[0];
        prop_assert_eq!(&spec.name, &normalize_name(&name));
        prop_assert_eq!(spec.constraints.len(), 1);
        prop_assert_eq!(&spec.constraints[0].op, op);
        prop_assert_eq!(&spec.constraints[0].version, &version);
    }

    /// PROPERTY: spaces around the operator never change the parse result.
    #[test]
    fn property_spaced_specifier_parses_the_same(
        name in package_name(),
        op in operator(),
        version in version(),
    ) {
        let tight = format!("{}{}{}", name, op, version);
        let spaced = format!("{} {} {}", name, op, version);

        let a = Manifest::parse(Path::new("requirements.txt"), &tight)
            .expect("tight specifier should parse");
        let b = Manifest::parse(Path::new("requirements.txt"), &spaced)
            .expect("spaced specifier should parse");

        prop_assert_eq!(&a.specifiers[0].name, &b.specifiers[0].name);
        prop_assert_eq!(&a.specifiers[0].constraints, &b.specifiers[0].constraints);
    }

    /// PROPERTY: a bare package name parses with no constraints.
    #[test]
    fn property_bare_name_parses(name in package_name()) {
        let manifest = Manifest::parse(Path::new("requirements.txt"), &name)
            .expect("bare name should parse");
        prop_assert_eq!(manifest.len(), 1);
        prop_assert!(manifest.specifiers[0].constraints.is_empty());
    }

    /// PROPERTY: name normalization is idempotent.
    #[test]
    fn property_normalize_is_idempotent(name in ".{0,64}") {
        let once = normalize_name(&name);
        prop_assert_eq!(normalize_name(&once), once.clone());
    }

    /// PROPERTY: two different exact pins of one package always conflict,
    /// in either order.
    #[test]
    fn property_conflicting_pins_always_error(
        name in package_name(),
        a in version(),
        b in version(),
    ) {
        prop_assume!(a != b);
        let forward = format!("{name}=={a}\n{name}=={b}\n");
        let reverse = format!("{name}=={b}\n{name}=={a}\n");

        prop_assert!(Manifest::parse(Path::new("requirements.txt"), &forward).is_err());
        prop_assert!(Manifest::parse(Path::new("requirements.txt"), &reverse).is_err());
    }

    /// PROPERTY: comments and blank lines never contribute specifiers.
    #[test]
    fn property_comments_are_invisible(comment in "[a-zA-Z0-9 ]{0,40}") {
        let content = format!("# {}\n\n  \n", comment);
        let manifest = Manifest::parse(Path::new("requirements.txt"), &content).unwrap();
        prop_assert!(manifest.is_empty());
    }
}
