//! Path filter algebra
//!
//! Filters are boolean predicates over `/`-separated relative paths. They are
//! evaluated on every resolution step, so all forms are allocation-free at
//! match time and cheap to clone.

use std::fmt;
use std::sync::Arc;

/// A predicate over slash-separated relative paths
#[derive(Debug, Clone)]
pub enum PathFilter {
    /// Accepts every path
    AcceptAll,
    /// Rejects every path
    RejectAll,
    /// Accepts exactly one path
    Literal(Arc<str>),
    /// Accepts paths matching a glob pattern
    Glob(GlobMatcher),
    /// Accepts a path iff every constituent accepts it
    All(Arc<[PathFilter]>),
    /// Ordered decision list; first matching constituent decides
    Multiple(Arc<MultiplePathFilter>),
}

impl PathFilter {
    /// A filter accepting every path
    pub fn accept_all() -> Self {
        PathFilter::AcceptAll
    }

    /// A filter rejecting every path
    pub fn reject_all() -> Self {
        PathFilter::RejectAll
    }

    /// A filter matching one path expression.
    ///
    /// Without wildcards the expression matches literally. `*` matches within
    /// a single path segment; `**` matches zero or more whole segments, so
    /// `org/acme/**` accepts `org/acme` as well as everything below it.
    pub fn match_path(expression: &str) -> Self {
        if expression.contains('*') {
            PathFilter::Glob(GlobMatcher::new(expression))
        } else {
            PathFilter::Literal(Arc::from(expression))
        }
    }

    /// A conjunction of filters
    pub fn all(filters: Vec<PathFilter>) -> Self {
        PathFilter::All(filters.into())
    }

    /// Evaluate this filter against a path
    pub fn accept(&self, path: &str) -> bool {
        match self {
            PathFilter::AcceptAll => true,
            PathFilter::RejectAll => false,
            PathFilter::Literal(expected) => &**expected == path,
            PathFilter::Glob(matcher) => matcher.matches(path),
            PathFilter::All(filters) => filters.iter().all(|f| f.accept(path)),
            PathFilter::Multiple(multiple) => {
                for (filter, include) in &multiple.filters {
                    if filter.accept(path) {
                        return *include;
                    }
                }
                multiple.default_accept
            }
        }
    }
}

impl fmt::Display for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathFilter::AcceptAll => write!(f, "accept-all"),
            PathFilter::RejectAll => write!(f, "reject-all"),
            PathFilter::Literal(expected) => write!(f, "match {}", expected),
            PathFilter::Glob(matcher) => write!(f, "match {}", matcher.pattern),
            PathFilter::All(filters) => {
                write!(f, "all(")?;
                for (i, filter) in filters.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            PathFilter::Multiple(multiple) => {
                write!(f, "multiple(")?;
                for (filter, include) in &multiple.filters {
                    write!(
                        f,
                        "{} {}, ",
                        if *include { "include" } else { "exclude" },
                        filter
                    )?;
                }
                write!(f, "default {})", multiple.default_accept)
            }
        }
    }
}

/// An ordered include/exclude decision list
#[derive(Debug)]
pub struct MultiplePathFilter {
    filters: Vec<(PathFilter, bool)>,
    default_accept: bool,
}

/// Builder for an ordered decision-list filter.
///
/// Filters are evaluated in the order they were added; the first whose
/// predicate matches the path determines the result. If none match, the
/// builder's default applies.
#[derive(Debug)]
pub struct MultiplePathFilterBuilder {
    filters: Vec<(PathFilter, bool)>,
    default_accept: bool,
}

impl MultiplePathFilterBuilder {
    /// Create a builder whose unmatched-path default is `default_accept`
    pub fn new(default_accept: bool) -> Self {
        Self {
            filters: Vec::new(),
            default_accept,
        }
    }

    /// Append a constituent filter with its include flag
    pub fn add(&mut self, filter: PathFilter, include: bool) -> &mut Self {
        self.filters.push((filter, include));
        self
    }

    /// Append an include rule for a path expression
    pub fn include(&mut self, expression: &str) -> &mut Self {
        self.add(PathFilter::match_path(expression), true)
    }

    /// Append an exclude rule for a path expression
    pub fn exclude(&mut self, expression: &str) -> &mut Self {
        self.add(PathFilter::match_path(expression), false)
    }

    /// Produce the finished filter
    pub fn build(self) -> PathFilter {
        PathFilter::Multiple(Arc::new(MultiplePathFilter {
            filters: self.filters,
            default_accept: self.default_accept,
        }))
    }
}

/// Compiled glob pattern over path segments
#[derive(Clone)]
pub struct GlobMatcher {
    pattern: Arc<str>,
    segments: Arc<[GlobSegment]>,
}

#[derive(Debug)]
enum GlobSegment {
    /// Matches zero or more whole segments
    Any,
    /// Matches one segment, possibly with embedded `*` wildcards
    One(String),
}

impl GlobMatcher {
    fn new(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .map(|segment| {
                if segment == "**" {
                    GlobSegment::Any
                } else {
                    GlobSegment::One(segment.to_string())
                }
            })
            .collect::<Vec<_>>();
        Self {
            pattern: Arc::from(pattern),
            segments: segments.into(),
        }
    }

    fn matches(&self, path: &str) -> bool {
        let segments: Vec<&str> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').collect()
        };
        match_segments(&self.segments, &segments)
    }
}

impl fmt::Debug for GlobMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlobMatcher({:?})", self.pattern)
    }
}

fn match_segments(pattern: &[GlobSegment], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(GlobSegment::Any) => {
            (0..=path.len()).any(|skip| match_segments(&pattern[1..], &path[skip..]))
        }
        Some(GlobSegment::One(segment)) => {
            !path.is_empty()
                && match_one_segment(segment, path[0])
                && match_segments(&pattern[1..], &path[1..])
        }
    }
}

/// Wildcard match of a single segment; `*` spans any run of characters
fn match_one_segment(pattern: &str, segment: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == segment,
        Some((prefix, rest)) => {
            if !segment.starts_with(prefix) {
                return false;
            }
            let mut remainder = &segment[prefix.len()..];
            loop {
                if match_one_segment(rest, remainder) {
                    return true;
                }
                match remainder.chars().next() {
                    Some(c) => remainder = &remainder[c.len_utf8()..],
                    None => return false,
                }
            }
        }
    }
}
