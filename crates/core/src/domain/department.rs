use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepartmentId(pub String);

impl DepartmentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DepartmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DepartmentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Busy,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "online" => Some(Self::Online),
            "busy" => Some(Self::Busy),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            Self::Online => 0,
            Self::Busy => 1,
            Self::Offline => 2,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::Online,
            1 => Self::Busy,
            _ => Self::Offline,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free status cell shared between the owning agent and administrative callers.
///
/// `busy` is only ever entered through [`StatusFlag::try_claim`], so two concurrent
/// callers can never both observe themselves as the one processing an action.
#[derive(Debug)]
pub struct StatusFlag(AtomicU8);

impl StatusFlag {
    pub fn new(status: AgentStatus) -> Self {
        Self(AtomicU8::new(status.to_bits()))
    }

    pub fn load(&self) -> AgentStatus {
        AgentStatus::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, status: AgentStatus) {
        self.0.store(status.to_bits(), Ordering::Release);
    }

    /// Moves `online -> busy`. Returns the observed status when the agent is not online.
    pub fn try_claim(&self) -> Result<BusyGuard<'_>, AgentStatus> {
        self.0
            .compare_exchange(
                AgentStatus::Online.to_bits(),
                AgentStatus::Busy.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| BusyGuard { flag: self })
            .map_err(AgentStatus::from_bits)
    }
}

impl Default for StatusFlag {
    fn default() -> Self {
        Self::new(AgentStatus::Online)
    }
}

/// Restores `online` when dropped, on every exit path of an action.
///
/// An `offline` signal raised while the action was running is left in place.
#[derive(Debug)]
pub struct BusyGuard<'a> {
    flag: &'a StatusFlag,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let _ = self.flag.0.compare_exchange(
            AgentStatus::Busy.to_bits(),
            AgentStatus::Online.to_bits(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub required_params: Vec<String>,
    pub optional_params: Vec<String>,
}

impl Capability {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required_params: Vec::new(),
            optional_params: Vec::new(),
        }
    }

    pub fn requires(mut self, params: &[&str]) -> Self {
        self.required_params.extend(params.iter().map(|param| param.to_string()));
        self
    }

    pub fn accepts(mut self, params: &[&str]) -> Self {
        self.optional_params.extend(params.iter().map(|param| param.to_string()));
        self
    }
}

/// Read-only view of an agent for dashboards and status endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentSummary {
    pub id: DepartmentId,
    pub name: String,
    pub status: AgentStatus,
    pub capabilities: Vec<String>,
    pub policies: Vec<String>,
}
