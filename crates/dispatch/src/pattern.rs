//! Path patterns for routes and mounts.
//!
//! Both accept Express-style syntax: `:name` captures one segment and a lone `*` segment at
//! the end of a route captures the rest of the path (as the `wildcard` param). Route
//! patterns are compiled into a [`matchit`] router; mount prefixes are matched segment by
//! segment so a mount at `/blog` sees `/blog`, `/blog/` and `/blog/...` but not `/blogs`.

use crate::context::PathParams;
use crate::error::PatternError;
use std::fmt;

/// A compiled route pattern such as `/posts/:slug`.
pub struct RoutePattern {
    source: String,
    inner: matchit::Router<()>,
}

impl RoutePattern {
    pub fn parse(path: &str) -> Result<Self, PatternError> {
        let route = to_matchit(path)?;
        let mut inner = matchit::Router::new();
        inner
            .insert(route, ())
            .map_err(|source| PatternError::InvalidRoute { path: path.to_string(), source })?;
        Ok(Self { source: path.to_string(), inner })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Matches a full path, ignoring one trailing slash.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);
        let matched = self.inner.at(path).ok()?;
        Some(matched.params.iter().collect())
    }
}

impl fmt::Debug for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RoutePattern").field(&self.source).finish()
    }
}

/// A mount prefix such as `/blog` or `/users/:id`.
#[derive(Debug, Clone)]
pub struct MountPrefix {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Param(String),
}

/// The outcome of stripping a [`MountPrefix`] from a path.
#[derive(Debug)]
pub struct PrefixMatch<'p> {
    pub matched: &'p str,
    pub rest: String,
    pub params: PathParams,
}

impl MountPrefix {
    pub fn parse(path: &str) -> Result<Self, PatternError> {
        if !path.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash { path: path.to_string() });
        }

        let mut segments = Vec::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            match segment.strip_prefix(':') {
                Some("") => return Err(PatternError::EmptyParam { path: path.to_string() }),
                Some(name) => segments.push(Segment::Param(name.to_string())),
                None => segments.push(Segment::Static(segment.to_string())),
            }
        }
        Ok(Self { source: path.to_string(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// true for `/`, which mounts inline
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn strip<'p>(&self, path: &'p str) -> Option<PrefixMatch<'p>> {
        let mut params = PathParams::empty();
        let mut pos = 0;

        for segment in &self.segments {
            let remaining = path[pos..].strip_prefix('/')?;
            let len = remaining.find('/').unwrap_or(remaining.len());
            let value = &remaining[..len];
            if value.is_empty() {
                return None;
            }

            match segment {
                Segment::Static(expected) if expected == value => {}
                Segment::Static(_) => return None,
                Segment::Param(name) => params.push(name.as_str(), value),
            }
            pos += 1 + len;
        }

        let rest = match &path[pos..] {
            "" => "/".to_string(),
            rest => rest.to_string(),
        };
        Some(PrefixMatch { matched: &path[..pos], rest, params })
    }
}

fn to_matchit(path: &str) -> Result<String, PatternError> {
    if !path.starts_with('/') {
        return Err(PatternError::MissingLeadingSlash { path: path.to_string() });
    }

    let mut route = String::with_capacity(path.len() + 8);
    for (i, segment) in path.split('/').enumerate() {
        if i > 0 {
            route.push('/');
        }
        match segment.strip_prefix(':') {
            Some("") => return Err(PatternError::EmptyParam { path: path.to_string() }),
            Some(name) => {
                route.push('{');
                route.push_str(name);
                route.push('}');
            }
            None if segment == "*" => route.push_str("{*wildcard}"),
            None => route.push_str(&segment.replace('{', "{{").replace('}', "}}")),
        }
    }
    Ok(trim_trailing_slash(&route).to_string())
}

fn trim_trailing_slash(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_matchit() {
        assert_eq!(to_matchit("/").unwrap(), "/");
        assert_eq!(to_matchit("/posts/:slug").unwrap(), "/posts/{slug}");
        assert_eq!(to_matchit("/files/*").unwrap(), "/files/{*wildcard}");
        assert_eq!(to_matchit("/posts/").unwrap(), "/posts");
        assert!(matches!(to_matchit("posts"), Err(PatternError::MissingLeadingSlash { .. })));
        assert!(matches!(to_matchit("/posts/:"), Err(PatternError::EmptyParam { .. })));
    }

    #[test]
    fn test_route_pattern_matches() {
        let pattern = RoutePattern::parse("/posts/:slug").unwrap();

        let params = pattern.matches("/posts/hello").unwrap();
        assert_eq!(params.get("slug"), Some("hello"));

        assert!(pattern.matches("/posts/hello/").is_some());
        assert!(pattern.matches("/posts").is_none());
        assert!(pattern.matches("/posts/hello/comments").is_none());
    }

    #[test]
    fn test_route_pattern_wildcard() {
        let pattern = RoutePattern::parse("/files/*").unwrap();

        let params = pattern.matches("/files/a/b.txt").unwrap();
        assert_eq!(params.get("wildcard"), Some("a/b.txt"));
    }

    #[test]
    fn test_mount_prefix_strip() {
        let prefix = MountPrefix::parse("/blog").unwrap();

        let matched = prefix.strip("/blog/hello").unwrap();
        assert_eq!(matched.matched, "/blog");
        assert_eq!(matched.rest, "/hello");

        assert_eq!(prefix.strip("/blog").unwrap().rest, "/");
        assert_eq!(prefix.strip("/blog/").unwrap().rest, "/");
        assert!(prefix.strip("/blogs").is_none());
        assert!(prefix.strip("/").is_none());
    }

    #[test]
    fn test_mount_prefix_params() {
        let prefix = MountPrefix::parse("/users/:id").unwrap();

        let matched = prefix.strip("/users/42/posts").unwrap();
        assert_eq!(matched.matched, "/users/42");
        assert_eq!(matched.rest, "/posts");
        assert_eq!(matched.params.get("id"), Some("42"));

        assert!(MountPrefix::parse("/").unwrap().is_root());
        assert!(matches!(MountPrefix::parse("users"), Err(PatternError::MissingLeadingSlash { .. })));
    }
}
