use super::ClusterConnection;
use crate::constants::{MAX_NAMESPACE_LENGTH, NAMESPACE_PREFIX};
use crate::manager::{self, KubeApiCallSnafu};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{ObjectMeta, PostParams};
use kube::Api;
use log::debug;
use rand::distributions::Alphanumeric;
use rand::Rng;
use snafu::ResultExt;

const SUFFIX_LENGTH: usize = 5;

/// A namespace that test pods are provisioned into. The namespace is not created until
/// [`ensure`](TestNamespace::ensure) is called; `ensure` is idempotent so any number of pods can
/// share one `TestNamespace`.
#[derive(Clone)]
pub struct TestNamespace {
    connection: ClusterConnection,
    name: String,
}

impl TestNamespace {
    pub fn new<S: Into<String>>(connection: ClusterConnection, name: S) -> Self {
        Self {
            connection,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> &ClusterConnection {
        &self.connection
    }

    /// Create the namespace in the cluster if it does not already exist.
    pub async fn ensure(&self) -> manager::Result<()> {
        let api: Api<Namespace> = Api::all(self.connection.client());
        match api.get(&self.name).await {
            Ok(_) => return Ok(()),
            Err(kube::Error::Api(ref response)) if response.code == 404 => {}
            Err(source) => {
                return Err(source).context(KubeApiCallSnafu {
                    method: "get",
                    what: "namespace",
                    name: self.name.clone(),
                })
            }
        }

        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        match api.create(&PostParams::default(), &namespace).await {
            Ok(_) => {
                debug!("created namespace '{}'", self.name);
                Ok(())
            }
            // A parallel test may have created it between our get and create.
            Err(kube::Error::Api(ref response)) if response.code == 409 => Ok(()),
            Err(source) => Err(source).context(KubeApiCallSnafu {
                method: "create",
                what: "namespace",
                name: self.name.clone(),
            }),
        }
    }

    /// Delete the namespace and everything in it. Deleting a namespace that does not exist is a
    /// no-op.
    pub async fn delete(&self) -> manager::Result<()> {
        let api: Api<Namespace> = Api::all(self.connection.client());
        match api.delete(&self.name, &Default::default()).await {
            Ok(_) => {
                debug!("deleted namespace '{}'", self.name);
                Ok(())
            }
            Err(kube::Error::Api(ref response)) if response.code == 404 => Ok(()),
            Err(source) => Err(source).context(KubeApiCallSnafu {
                method: "delete",
                what: "namespace",
                name: self.name.clone(),
            }),
        }
    }
}

/// Generate a namespace name of the form `testpods-xxxxx`.
pub fn generate_name() -> String {
    format!("{}-{}", NAMESPACE_PREFIX, random_suffix())
}

/// Generate a namespace name of the form `testpods-{context}-xxxxx`. The context is sanitized to
/// be DNS-safe and the result is truncated to the Kubernetes namespace length limit.
pub fn generate_name_with_context(context: &str) -> String {
    let sanitized = sanitize(context);
    if sanitized.is_empty() {
        return generate_name();
    }

    // Truncate the context so that prefix, context, suffix and separators fit in the limit.
    let max_context = MAX_NAMESPACE_LENGTH - NAMESPACE_PREFIX.len() - SUFFIX_LENGTH - 2;
    let context = if sanitized.len() > max_context {
        sanitized[..max_context].trim_end_matches('-')
    } else {
        &sanitized
    };

    format!("{}-{}-{}", NAMESPACE_PREFIX, context, random_suffix())
}

/// Sanitize a string into lowercase alphanumerics and single hyphens with no leading or trailing
/// hyphen.
fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_hyphen = true;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            out.push('-');
            last_was_hyphen = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .take(SUFFIX_LENGTH)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_have_prefix_and_suffix() {
        let name = generate_name();
        assert!(name.starts_with("testpods-"));
        assert_eq!(name.len(), "testpods-".len() + SUFFIX_LENGTH);
    }

    #[test]
    fn context_is_sanitized() {
        let name = generate_name_with_context("My_Test Class!");
        assert!(name.starts_with("testpods-my-test-class-"));
    }

    #[test]
    fn long_context_is_truncated_to_namespace_limit() {
        let context = "x".repeat(200);
        let name = generate_name_with_context(&context);
        assert!(name.len() <= MAX_NAMESPACE_LENGTH);
        assert!(name.starts_with("testpods-x"));
    }

    #[test]
    fn empty_context_falls_back_to_plain_name() {
        let name = generate_name_with_context("!!!");
        assert!(name.starts_with("testpods-"));
        assert_eq!(name.len(), "testpods-".len() + SUFFIX_LENGTH);
    }

    #[test]
    fn sanitize_collapses_and_trims_hyphens() {
        assert_eq!(sanitize("--Weird--Name--"), "weird-name");
        assert_eq!(sanitize("simple"), "simple");
        assert_eq!(sanitize(""), "");
    }
}
