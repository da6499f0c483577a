use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a write originated. All fields are optional; batch jobs usually have none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOrigin {
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestOrigin {
    #[must_use]
    pub fn builder() -> RequestOriginBuilder {
        RequestOriginBuilder::default()
    }
}

#[derive(Default)]
pub struct RequestOriginBuilder {
    user_id: Option<Uuid>,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl RequestOriginBuilder {
    #[must_use]
    pub fn user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn ip_address(mut self, ip: &str) -> Self {
        self.ip_address = Some(ip.to_owned());
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: &str) -> Self {
        self.user_agent = Some(agent.to_owned());
        self
    }

    #[must_use]
    pub fn build(self) -> RequestOrigin {
        RequestOrigin {
            user_id: self.user_id,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
        }
    }
}
