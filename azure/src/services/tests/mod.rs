//! Service-specific tests
//!
//! HTTP-facing services run against a local `wiremock` server; helpers that
//! only talk to `ArmApi` use the mockall mock.


// Common test utilities for services
#[cfg(test)]
pub mod common {
    use shared::{ResourceSet, TimingConfig};
    use std::sync::Arc;
    use url::Url;
    use wiremock::MockServer;

    use crate::services::arm_client::RealArmClient;
    use crate::services::token_source::StaticTokenSource;
    use crate::traits::TokenSource;

    pub const TEST_TOKEN: &str = "test-token";

    pub fn tokens() -> Arc<dyn TokenSource> {
        Arc::new(StaticTokenSource::new(TEST_TOKEN))
    }

    pub fn resources() -> ResourceSet {
        ResourceSet::new("00000000-0000-0000-0000-000000000000", "unit").expect("valid run name")
    }

    /// ARM client pointed at a mock server with zero polling delay
    pub fn arm_for(server: &MockServer) -> RealArmClient {
        RealArmClient::new(tokens(), &TimingConfig::immediate())
            .expect("client builds")
            .with_endpoint(Url::parse(&server.uri()).expect("mock server uri"))
    }
}
