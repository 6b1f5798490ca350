use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Identifies a router's management endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouterEndpoint {
    pub router_id: String,
    pub host: String,
}

/// A point-in-time view of a router's configuration and connectivity.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterStatus {
    pub router_id: String,
    #[serde(default)]
    pub neighbors: Vec<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub auto_links: Vec<AutoLink>,
    #[serde(default)]
    pub link_routes: Vec<LinkRoute>,
    #[serde(default)]
    pub connections: Vec<RouterConnection>,

    /// Only populated when links were requested.
    #[serde(default)]
    pub links: Vec<RouterLink>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    In,
    Out,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoLink {
    pub name: String,
    pub address: String,
    pub direction: LinkDirection,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub oper_status: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRoute {
    pub name: String,
    pub prefix: String,
    pub direction: LinkDirection,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub oper_status: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConnection {
    pub container: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub opened: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterLink {
    pub name: String,
    pub direction: LinkDirection,
    #[serde(default)]
    pub oper_status: String,
    #[serde(default)]
    pub undelivered: u64,
    #[serde(default)]
    pub unsettled: u64,
}

#[async_trait::async_trait]
pub trait RouterManagement: Send + Sync {
    async fn routers(&self) -> Result<Vec<RouterEndpoint>>;

    /// Collects the router's status. Links are only collected when
    /// `include_links` is set since they are costly to list.
    async fn query(&self, router: &RouterEndpoint, include_links: bool) -> Result<RouterStatus>;
}

// === impl LinkDirection ===

impl LinkDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

impl std::fmt::Display for LinkDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const OPER_STATUS_ACTIVE: &str = "active";
pub const OPER_STATUS_UP: &str = "up";
