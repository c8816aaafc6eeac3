//! Path matching for mounted routes.
//!
//! Each mount point is a path template such as `/users/{id}`. A request path
//! is matched segment by segment; when several templates match, the one with
//! the most literal segments wins, so `/users/me` beats `/users/{id}`.
//! Templates that tie go to the one mounted first.
//!
//! Matching ignores the HTTP method. Method selection belongs to the
//! compiled route, which falls back to its not-found handler.

use std::sync::Arc;

use sluice_route::CompiledRoute;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug)]
struct Mount {
    template: String,
    segments: Vec<Segment>,
    route: Arc<CompiledRoute>,
}

impl Mount {
    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    fn match_path(&self, path: &[&str]) -> Option<Vec<(String, String)>> {
        if path.len() != self.segments.len() {
            return None;
        }
        let mut params = Vec::new();
        for (segment, actual) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(expected) if expected == actual => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.push((name.clone(), (*actual).to_string())),
            }
        }
        Some(params)
    }
}

/// A path matched to its mounted route.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    template: String,
    route: Arc<CompiledRoute>,
    params: Vec<(String, String)>,
}

impl RouteMatch {
    /// The template that matched.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The mounted route.
    #[must_use]
    pub fn route(&self) -> &Arc<CompiledRoute> {
        &self.route
    }

    /// Captured path parameters in template order.
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Consumes the match.
    #[must_use]
    pub fn into_parts(self) -> (Arc<CompiledRoute>, Vec<(String, String)>) {
        (self.route, self.params)
    }
}

/// Maps path templates to compiled routes.
#[derive(Debug, Default)]
pub struct Router {
    mounts: Vec<Mount>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts `route` at `template`. A template mounted twice keeps the
    /// first route.
    pub fn mount(&mut self, template: impl Into<String>, route: Arc<CompiledRoute>) {
        let template = template.into();
        if self.mounts.iter().any(|m| m.template == template) {
            tracing::warn!(template = %template, route = route.name(), "path already mounted; ignoring");
            return;
        }
        let segments = parse_template(&template);
        self.mounts.push(Mount {
            template,
            segments,
            route,
        });
    }

    /// Number of mounted templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// Returns `true` if nothing is mounted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// Mounted templates in mount order.
    pub fn templates(&self) -> impl Iterator<Item = &str> {
        self.mounts.iter().map(|m| m.template.as_str())
    }

    /// Finds the best route for `path`.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<RouteMatch> {
        let actual = split(path);
        self.mounts
            .iter()
            .filter_map(|mount| mount.match_path(&actual).map(|params| (mount, params)))
            .rev()
            .max_by_key(|(mount, _)| mount.literal_count())
            .map(|(mount, params)| RouteMatch {
                template: mount.template.clone(),
                route: Arc::clone(&mount.route),
                params,
            })
    }
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn parse_template(template: &str) -> Vec<Segment> {
    split(template)
        .into_iter()
        .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(s.to_string()),
        })
        .collect()
}
