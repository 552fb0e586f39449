//! Model identifiers of the form `namespace/name[@version]`.

use crate::error::{AxonError, Result};
use std::fmt;
use std::str::FromStr;

/// Version sentinel used when an identifier omits `@version`.
pub const LATEST: &str = "latest";

/// Immutable `(namespace, name, version)` triple.
///
/// `name` may contain further `/` segments (`owner/repo`, `publisher/path/to/model`);
/// only the first segment is the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelIdentifier {
    namespace: String,
    name: String,
    version: String,
}

impl ModelIdentifier {
    /// Build an identifier from parts. An empty version becomes [`LATEST`].
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let version = version.into();
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: if version.trim().is_empty() {
                LATEST.to_string()
            } else {
                version
            },
        }
    }

    /// Parse `namespace/name[@version]`.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let (namespace, rest) = trimmed
            .split_once('/')
            .ok_or_else(|| invalid(input, "expected namespace/name[@version]"))?;

        let (name, version) = match rest.rsplit_once('@') {
            Some((name, version)) => (name, version),
            None => (rest, LATEST),
        };

        if namespace.is_empty() {
            return Err(invalid(input, "namespace is empty"));
        }
        if name.is_empty() || name.split('/').any(str::is_empty) {
            return Err(invalid(input, "name is empty"));
        }

        let id = Self::new(namespace, name, version);
        id.check_path_segments().map_err(|message| invalid(input, message))?;
        Ok(id)
    }

    /// Fail if any part would step outside its directory once joined onto a
    /// cache root. Identifiers built with [`new`](Self::new) from remote
    /// metadata are not checked until this is called.
    pub fn ensure_path_safe(&self) -> Result<()> {
        self.check_path_segments()
            .map_err(|message| invalid(&self.to_string(), message))
    }

    fn check_path_segments(&self) -> std::result::Result<(), &'static str> {
        if !is_plain_segment(&self.namespace) {
            return Err("namespace is not a plain path segment");
        }
        if !self.name.split('/').all(is_plain_segment) {
            return Err("name contains a relative or empty path segment");
        }
        if !is_plain_segment(&self.version) {
            return Err("version is not a plain path segment");
        }
        Ok(())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// `namespace/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn is_latest(&self) -> bool {
        self.version == LATEST
    }
}

impl fmt::Display for ModelIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.namespace, self.name, self.version)
    }
}

impl FromStr for ModelIdentifier {
    type Err = AxonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}

fn invalid(input: &str, message: &str) -> AxonError {
    AxonError::InvalidIdentifier {
        input: input.to_string(),
        message: message.to_string(),
    }
}
