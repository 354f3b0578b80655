use anyhow::Result;
use std::future::Future;

/// A tip event observed on the hosting platform's comment feed.
#[derive(Clone, Debug, PartialEq)]
pub struct TipEvent {
    pub id: String,
    /// Username of the account that paid the tip.
    pub payer: String,
    pub credits_spent: u64,
    /// ISO-8601 timestamp as reported by the platform; lexicographic order
    /// matches chronological order.
    pub created_at: String,
}

/// Lookup of whether a user has at least one public project on the hosting
/// platform. Gate for the conversion request path.
pub trait ProjectDirectory {
    fn has_public_project(&self, username: &str) -> impl Future<Output = Result<bool>> + Send;
}

/// Source of recent tip events for the tip-redemption path.
pub trait TipFeed {
    fn recent_tips(&self) -> impl Future<Output = Result<Vec<TipEvent>>> + Send;
}

/// Canned project directory for tests and simulations.
#[cfg(any(test, feature = "mocks"))]
#[derive(Clone, Debug, Default)]
pub struct FixedProjects {
    pub eligible: bool,
    pub fail: bool,
}

#[cfg(any(test, feature = "mocks"))]
impl ProjectDirectory for FixedProjects {
    async fn has_public_project(&self, _username: &str) -> Result<bool> {
        if self.fail {
            anyhow::bail!("project lookup unavailable");
        }
        Ok(self.eligible)
    }
}

/// Canned tip feed for tests and simulations.
#[cfg(any(test, feature = "mocks"))]
#[derive(Clone, Debug, Default)]
pub struct FixedTips(pub Vec<TipEvent>);

#[cfg(any(test, feature = "mocks"))]
impl TipFeed for FixedTips {
    async fn recent_tips(&self) -> Result<Vec<TipEvent>> {
        Ok(self.0.clone())
    }
}
