//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store the compiled prefix table
//! - Look up the matching service for a request path
//! - Return an explicit no-match instead of a silent default
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Prefixes sorted by descending length so overlapping routes
//!   (`/api` vs `/api/auth`) resolve deterministically to the longest
//! - O(n) scan; route counts are small and static

struct Route {
    prefix: String,
    index: usize,
}

/// Path-prefix route table mapping request paths to service indices.
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Build a route table; `prefixes[i]` routes to service index `i`.
    pub fn new<S: AsRef<str>>(prefixes: &[S]) -> Self {
        let mut routes: Vec<Route> = prefixes
            .iter()
            .enumerate()
            .map(|(index, prefix)| Route {
                prefix: prefix.as_ref().to_string(),
                index,
            })
            .collect();
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { routes }
    }

    /// Index of the first (longest) service whose prefix matches `path`.
    pub fn match_path(&self, path: &str) -> Option<usize> {
        self.routes
            .iter()
            .find(|r| path.starts_with(&r.prefix))
            .map(|r| r.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_by_prefix() {
        let router = Router::new(&["/api/auth", "/api/users"]);
        assert_eq!(router.match_path("/api/auth/login"), Some(0));
        assert_eq!(router.match_path("/api/users/42"), Some(1));
        assert_eq!(router.match_path("/api/auth"), Some(0));
    }

    #[test]
    fn no_match_returns_none() {
        let router = Router::new(&["/api/auth"]);
        assert_eq!(router.match_path("/healthz"), None);
        assert_eq!(router.match_path("/api"), None);
    }

    #[test]
    fn longest_prefix_wins_regardless_of_order() {
        let router = Router::new(&["/api", "/api/auth"]);
        assert_eq!(router.match_path("/api/auth/login"), Some(1));
        assert_eq!(router.match_path("/api/other"), Some(0));

        let router = Router::new(&["/api/auth", "/api"]);
        assert_eq!(router.match_path("/api/auth/login"), Some(0));
        assert_eq!(router.match_path("/api/other"), Some(1));
    }
}
