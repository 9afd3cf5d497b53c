use snafu::Snafu;

/// The `Result` type returned by configuration builders.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors are raised eagerly, when a configuration object is built, so that a
/// mistake surfaces before anything is created in the cluster. They are never retried.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Missing required field '{}' for {}", field, what))]
    MissingField {
        field: &'static str,
        what: &'static str,
    },

    #[snafu(display("Invalid port for {}: port must be nonzero", what))]
    InvalidPort { what: &'static str },

    #[snafu(display("At least one {} is required for {}", item, what))]
    Empty {
        item: &'static str,
        what: &'static str,
    },

    #[snafu(display("Invalid HTTP path '{}': the path must begin with '/'", path))]
    InvalidHttpPath { path: String },

    #[snafu(display("Invalid regular expression '{}': {}", pattern, source))]
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },
}
