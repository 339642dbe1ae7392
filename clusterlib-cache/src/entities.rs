//! Entity field sets and the per-kind type aliases over
//! `NotifyableHeader<Fields>` (§3 data model).
use std::collections::HashMap;

use crate::distribution::DistributionFields;
use crate::notifyable::NotifyableHeader;
use crate::state::{ProcessInfo, ProcessState};

#[derive(Default)]
pub struct RootFields {
    pub application_names: Vec<String>,
}

pub type Root = NotifyableHeader<RootFields>;

/// Application *is* a Group with no parent group (Open Question (b)):
/// both use the same `GroupFields`, distinguished only by
/// `EntityKind::Application` vs `EntityKind::Group` on the header.
#[derive(Default)]
pub struct GroupFields {
    pub group_names: Vec<String>,
    pub node_names: Vec<String>,
    pub distribution_names: Vec<String>,
    pub property_list_names: Vec<String>,
}

pub type Application = NotifyableHeader<GroupFields>;
pub type Group = NotifyableHeader<GroupFields>;

pub struct NodeFields {
    pub connected: bool,
    pub client_state: String,
    pub current_state: serde_json::Value,
    pub desired_state: serde_json::Value,
    pub max_process_slots: i32,
    pub use_process_slots: bool,
}

impl Default for NodeFields {
    fn default() -> Self {
        NodeFields {
            connected: false,
            client_state: String::new(),
            current_state: serde_json::Value::Null,
            desired_state: serde_json::Value::Null,
            max_process_slots: 0,
            use_process_slots: false,
        }
    }
}

pub type Node = NotifyableHeader<NodeFields>;

#[derive(Default)]
pub struct ProcessSlotFields {
    pub current_process_state: ProcessState,
    pub desired_process_state: ProcessState,
    pub process_info: Option<ProcessInfo>,
}

pub type ProcessSlot = NotifyableHeader<ProcessSlotFields>;

pub type DataDistribution = NotifyableHeader<DistributionFields>;

#[derive(Default)]
pub struct PropertyListFields {
    pub properties: HashMap<String, String>,
}

pub type PropertyList = NotifyableHeader<PropertyListFields>;

#[derive(Default)]
pub struct QueueFields {
    pub element_names: Vec<String>,
}

pub type Queue = NotifyableHeader<QueueFields>;
