pub mod cache;
pub mod evaluator;
pub mod model;
pub mod store;
pub mod trigger;

pub use cache::{AlertCache, AlertIndex};
pub use evaluator::{PriceHistory, PriorPrice};
pub use model::{AlertCondition, AlertId, AlertKind, Direction, NewAlert, OwnerId};
pub use store::{AlertStore, Deactivation, Recipient, SqliteAlertStore};
pub use trigger::{TriggerCoordinator, TriggerOutcome};
