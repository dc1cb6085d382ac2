use super::resource::Resource;
use crate::node::TaskInfo;
use serde::{Deserialize, Serialize};

/// One operation submitted back to the cluster master when accepting an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OfferOperation {
    Launch(Vec<TaskInfo>),
    Destroy(Vec<Resource>),
    Unreserve(Vec<Resource>),
    Reserve(Vec<Resource>),
    Create(Vec<Resource>),
}

impl OfferOperation {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Launch(_) => "launch",
            Self::Destroy(_) => "destroy",
            Self::Unreserve(_) => "unreserve",
            Self::Reserve(_) => "reserve",
            Self::Create(_) => "create",
        }
    }

    /// Resources carried by the operation; launch operations have none of
    /// their own, the fragments live inside each task.
    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        match self {
            Self::Launch(_) => &[],
            Self::Destroy(resources)
            | Self::Unreserve(resources)
            | Self::Reserve(resources)
            | Self::Create(resources) => resources,
        }
    }

    #[must_use]
    pub fn tasks(&self) -> &[TaskInfo] {
        match self {
            Self::Launch(tasks) => tasks,
            _ => &[],
        }
    }
}
