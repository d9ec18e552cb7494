//! Gateway configuration.

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Page size when a list request does not specify one.
    pub default_per_page: u64,
    /// Upper bound on requested page sizes.
    pub max_per_page: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_per_page: 25,
            max_per_page: 200,
        }
    }
}
