//! Exchange node (components C-G, SPEC_FULL.md §4.C-§4.G): overlay
//! routing, Paxos election, 3PC coordinator and participant, inventory,
//! and the durable pre-commit log, unified behind one node actor.

pub mod catalogue;
pub mod config;
pub mod coordinator;
pub mod inventory;
pub mod node;
pub mod order;
pub mod overlay;
pub mod participant;
pub mod paxos;
pub mod precommit_log;
pub mod reservation;

pub use catalogue::FundCatalogue;
pub use config::NodeConfig;
pub use coordinator::Coordinator;
pub use inventory::{InventoryStore, JsonFileInventory};
pub use node::{Node, NodeEvent};
pub use overlay::OverlayNode;
pub use participant::Participant;
pub use precommit_log::{JsonLinesLog, PrecommitLog};
