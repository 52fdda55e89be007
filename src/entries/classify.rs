//! Compilation target selection

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::analysis::{is_edge_runtime, ServerRuntime};
use crate::error::BuildError;
use crate::routes::{is_api_route, is_instrumentation_hook_file, is_middleware_file, RouteCollection};

/// One of the three compilers an entry can be built by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "client")]
    Client,
    #[serde(rename = "server")]
    Server,
    #[serde(rename = "edge-server")]
    EdgeServer,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Client => "client",
            Target::Server => "server",
            Target::EdgeServer => "edge-server",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Target::Client),
            "server" => Ok(Target::Server),
            "edge-server" => Ok(Target::EdgeServer),
            other => Err(BuildError::Internal(format!("Invalid compiler type: {}", other))),
        }
    }
}

/// The set of compilers a route is built by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Targets {
    pub client: bool,
    pub server: bool,
    pub edge: bool,
}

impl Targets {
    const CLIENT_AND_SERVER: Targets = Targets {
        client: true,
        server: true,
        edge: false,
    };
    const CLIENT_AND_EDGE: Targets = Targets {
        client: true,
        server: false,
        edge: true,
    };
    const SERVER_AND_EDGE: Targets = Targets {
        client: false,
        server: true,
        edge: true,
    };
    const SERVER: Targets = Targets {
        client: false,
        server: true,
        edge: false,
    };
    const EDGE: Targets = Targets {
        client: false,
        server: false,
        edge: true,
    };

    /// Selected targets in client, server, edge order
    pub fn iter(&self) -> impl Iterator<Item = Target> {
        [
            (self.client, Target::Client),
            (self.server, Target::Server),
            (self.edge, Target::EdgeServer),
        ]
        .into_iter()
        .filter_map(|(enabled, target)| enabled.then_some(target))
    }
}

/// Decide which compilers build a route. The first matching rule wins, so
/// special pages never get promoted to the edge.
pub fn classify(page: &str, collection: RouteCollection, runtime: Option<ServerRuntime>) -> Targets {
    if collection == RouteCollection::Root && is_instrumentation_hook_file(page) {
        return Targets::SERVER_AND_EDGE;
    }
    if is_middleware_file(page) {
        return Targets::EDGE;
    }
    if is_api_route(page) {
        return if is_edge_runtime(runtime) {
            Targets::EDGE
        } else {
            Targets::SERVER
        };
    }
    match page {
        "/_document" => Targets::SERVER,
        "/_app" | "/_error" | "/404" | "/500" => Targets::CLIENT_AND_SERVER,
        _ if is_edge_runtime(runtime) => Targets::CLIENT_AND_EDGE,
        _ => Targets::CLIENT_AND_SERVER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const EDGE: Option<ServerRuntime> = Some(ServerRuntime::Edge);

    fn fired(page: &str, collection: RouteCollection, runtime: Option<ServerRuntime>) -> Vec<Target> {
        classify(page, collection, runtime).iter().collect()
    }

    #[test]
    fn test_decision_table() {
        use Target::*;

        assert_eq!(fired("/instrumentation", RouteCollection::Root, None), vec![Server, EdgeServer]);
        assert_eq!(fired("/middleware", RouteCollection::Root, None), vec![EdgeServer]);
        assert_eq!(fired("/api/hello", RouteCollection::Pages, EDGE), vec![EdgeServer]);
        assert_eq!(fired("/api/hello", RouteCollection::Pages, None), vec![Server]);
        assert_eq!(fired("/_document", RouteCollection::Pages, None), vec![Server]);
        for special in ["/_app", "/_error", "/404", "/500"] {
            assert_eq!(fired(special, RouteCollection::Pages, None), vec![Client, Server]);
        }
        assert_eq!(fired("/blog", RouteCollection::Pages, EDGE), vec![Client, EdgeServer]);
        assert_eq!(fired("/blog", RouteCollection::Pages, None), vec![Client, Server]);
    }

    #[test]
    fn test_special_pages_are_never_promoted_to_edge() {
        assert_eq!(
            classify("/_app", RouteCollection::Pages, EDGE),
            Targets {
                client: true,
                server: true,
                edge: false
            }
        );
        assert_eq!(
            classify("/_document", RouteCollection::Pages, Some(ServerRuntime::ExperimentalEdge)).iter().collect::<Vec<_>>(),
            vec![Target::Server]
        );
    }

    #[test]
    fn test_instrumentation_outside_root_is_an_ordinary_page() {
        assert_eq!(
            fired("/instrumentation", RouteCollection::Pages, None),
            vec![Target::Client, Target::Server]
        );
    }

    #[test]
    fn test_target_parsing() {
        assert_eq!("edge-server".parse::<Target>().unwrap(), Target::EdgeServer);
        let err = "browser".parse::<Target>().unwrap_err();
        assert!(matches!(err, BuildError::Internal(_)));
    }
}
