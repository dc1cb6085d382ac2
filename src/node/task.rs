use crate::error::Result;
use crate::resources::Resource;
use crate::types::{AgentId, TaskId};
use serde::{Deserialize, Serialize};

/// Payload handed to the launched database process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskData {
    pub fully_qualified_node_name: String,
    pub host: String,
    pub zookeepers: Vec<String>,
    pub framework_name: String,
    pub scheduler_uri: String,
    pub cluster_name: String,
    pub http_port: u64,
    pub pb_port: u64,
    pub disterl_port: u64,
}

impl TaskData {
    /// # Errors
    /// Returns an error if the payload cannot be serialized.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// # Errors
    /// Returns an error if the bytes are not a valid payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// `{node}@{host}`, with a trailing dot for hosts that are not fully qualified.
#[must_use]
pub fn fully_qualified_node_name(node_name: &str, host: &str) -> String {
    if host.contains('.') {
        format!("{node_name}@{host}")
    } else {
        format!("{node_name}@{host}.")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorInfo {
    pub executor_id: String,
    pub name: String,
    pub source: String,
    pub command: String,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: TaskId,
    pub name: String,
    pub agent_id: AgentId,
    pub executor: ExecutorInfo,
    pub resources: Vec<Resource>,
    pub data: Vec<u8>,
}

impl TaskInfo {
    /// Ports granted to the task, in grant order.
    #[must_use]
    pub fn ports(&self) -> Vec<u64> {
        self.resources.iter().flat_map(Resource::port_list).collect()
    }
}

/// Scheduler-wide values baked into every launch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaunchContext {
    pub zookeepers: Vec<String>,
    pub scheduler_uri: String,
    pub executor_command: String,
    pub compatibility_mode: bool,
}
