use std::fmt;

pub const DEFAULT_REGISTRY: &str = "docker.io";

#[derive(Debug, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    MissingRepository,
    MissingTag,
    MissingDigest,
    InvalidFormat(String),
}

impl std::error::Error for ParseError {}
impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MissingDigest => write!(f, "digest is empty"),
            ParseError::MissingRepository => write!(f, "repository is missing"),
            ParseError::MissingTag => write!(f, "tag is empty"),
            ParseError::InvalidFormat(image) => write!(f, "invalid image format: {}", image),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl ImageReference {
    /// Parses `[registry/]repository[:tag][@digest]`. Without an explicit
    /// registry host the image lives on Docker Hub.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(ParseError::InvalidFormat(s.to_string()));
        }

        let (name, digest) = match s.split_once('@') {
            Some((_, "")) => return Err(ParseError::MissingDigest),
            Some((name, digest)) => (name, Some(digest.to_string())),
            None => (s, None),
        };

        // A tag is a colon after the last slash, a colon before it belongs to a registry port
        let last_slash = name.rfind('/');
        let (without_tag, tag) = match name.rfind(':') {
            Some(pos) if last_slash.is_none_or(|slash| pos > slash) => {
                (&name[..pos], Some(name[pos + 1..].to_string()))
            }
            _ => (name, None),
        };
        if tag.as_deref() == Some("") {
            return Err(ParseError::MissingTag);
        }

        let (registry, repository) = match without_tag.split_once('/') {
            Some((host, rest)) if is_registry_host(host) => (host, rest),
            _ => (DEFAULT_REGISTRY, without_tag),
        };

        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(ParseError::MissingRepository);
        }

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag,
            digest,
        })
    }
}

/// Docker's rule: the first path component is a registry if it looks like a host.
fn is_registry_host(component: &str) -> bool {
    component == "localhost" || component.contains('.') || component.contains(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_docker_hub_image() {
        let reference = ImageReference::parse("library/nginx:1.27").expect("Should parse");
        assert_eq!(reference.registry, "docker.io");
        assert_eq!(reference.repository, "library/nginx");
        assert_eq!(reference.tag.as_deref(), Some("1.27"));
    }

    #[test]
    fn test_parse_untagged_short_name() {
        let reference = ImageReference::parse("app").expect("Should parse");
        assert_eq!(reference.registry, "docker.io");
        assert_eq!(reference.repository, "app");
        assert_eq!(reference.tag, None);
    }

    #[test]
    fn test_parse_registry_with_port() {
        let reference = ImageReference::parse("registry.local:5000/team/app:2.0").expect("Should parse");
        assert_eq!(reference.registry, "registry.local:5000");
        assert_eq!(reference.repository, "team/app");
        assert_eq!(reference.tag.as_deref(), Some("2.0"));
        assert_eq!(reference.to_string(), "registry.local:5000/team/app:2.0");
    }

    #[test]
    fn test_parse_localhost_registry_without_tag() {
        let reference = ImageReference::parse("localhost/updater").expect("Should parse");
        assert_eq!(reference.registry, "localhost");
        assert_eq!(reference.repository, "updater");
        assert_eq!(reference.tag, None);
    }

    #[test]
    fn test_parse_digest_pinned_image() {
        let reference =
            ImageReference::parse("ghcr.io/acme/updater:1.2@sha256:0123abcd").expect("Should parse");
        assert_eq!(reference.registry, "ghcr.io");
        assert_eq!(reference.repository, "acme/updater");
        assert_eq!(reference.tag.as_deref(), Some("1.2"));
        assert_eq!(reference.digest.as_deref(), Some("sha256:0123abcd"));
        assert_eq!(reference.to_string(), "ghcr.io/acme/updater:1.2@sha256:0123abcd");

        let untagged = ImageReference::parse("updater@sha256:0123abcd").expect("Should parse");
        assert_eq!(untagged.repository, "updater");
        assert_eq!(untagged.tag, None);
    }

    #[test]
    fn test_parse_rejects_invalid_references() {
        assert_eq!(
            ImageReference::parse("ghcr.io/app@"),
            Err(ParseError::MissingDigest)
        );
        assert_eq!(ImageReference::parse("app:"), Err(ParseError::MissingTag));
        assert_eq!(
            ImageReference::parse("ghcr.io/"),
            Err(ParseError::MissingRepository)
        );
        assert_eq!(
            ImageReference::parse("my app:1"),
            Err(ParseError::InvalidFormat("my app:1".to_string()))
        );
    }
}
