/// Helper macro to avoid retyping the base domain-like name of our system when creating further
/// string constants from it. When given no parameters, this returns the base domain-like name of
/// the system. When given a string literal parameter it adds `/parameter` to the end.
macro_rules! testpods {
    () => {
        "testpods.dev"
    };
    ($s:literal) => {
        concat!(testpods!(), "/", $s)
    };
}

// System identifiers
pub const TESTPODS: &str = testpods!();
pub const NAMESPACE_PREFIX: &str = "testpods";

// Label keys
pub const LABEL_APP: &str = "app";
pub const LABEL_POD_NAME: &str = testpods!("pod-name");

// Standard tags https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
pub const APP_NAME: &str = "app.kubernetes.io/name";
pub const APP_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

// Value for the managed-by label on every resource we create
pub const MANAGED_BY: &str = "testpods";

// Port name used for the primary port of every service we create
pub const PORT_NAME_PRIMARY: &str = "primary";

// Kubernetes limits namespace names to 63 characters
pub const MAX_NAMESPACE_LENGTH: usize = 63;

#[test]
fn testpods_constants_macro_test() {
    assert_eq!("testpods.dev", testpods!());
    assert_eq!("testpods.dev/pod-name", LABEL_POD_NAME);
    assert_eq!("testpods.dev/foo", testpods!("foo"));
}
