//! Unit tests for plugin name validation.

use std::path::PathBuf;

use rstest::rstest;

use super::*;

#[rstest]
#[case("left-pad")]
#[case("lodash.merge")]
#[case("@acme/tools")]
#[case("a~b")]
fn accepts_package_style_names(#[case] name: &str) {
    let parsed = PluginName::parse(name).expect("valid name");
    assert_eq!(parsed.as_str(), name);
}

#[rstest]
#[case("")]
#[case(".hidden")]
#[case("_private")]
#[case("..")]
#[case("../escape")]
#[case("a/b")]
#[case("@scope")]
#[case("@scope/")]
#[case("@/name")]
#[case("@scope/a/b")]
#[case("with space")]
fn rejects_unsafe_names(#[case] name: &str) {
    let error = PluginName::parse(name).expect_err("invalid name");
    assert!(matches!(error, PluginError::InvalidPluginName { .. }));
}

#[test]
fn rejects_overlong_names() {
    let name = "a".repeat(215);
    assert!(PluginName::parse(&name).is_err());
}

#[test]
fn scoped_names_nest_directories() {
    let name = PluginName::parse("@acme/tools").expect("valid name");
    assert_eq!(name.scope(), Some("acme"));
    assert_eq!(name.relative_path(), PathBuf::from("@acme").join("tools"));
}

#[rstest]
#[case("left-pad", ("left-pad", None))]
#[case("left-pad/lib/util.rhai", ("left-pad", Some("lib/util.rhai")))]
#[case("@acme/tools", ("@acme/tools", None))]
#[case("@acme/tools/extra.rhai", ("@acme/tools", Some("extra.rhai")))]
#[case("left-pad/", ("left-pad", None))]
fn split_request_separates_sub_paths(
    #[case] request: &str,
    #[case] expected: (&str, Option<&str>),
) {
    assert_eq!(split_request(request), expected);
}
