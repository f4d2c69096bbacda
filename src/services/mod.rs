pub mod chat;
pub mod dashboard;
pub mod oracle_updater;
pub mod price_client;
pub mod price_poller;
pub mod randomness;

pub use chat::{demo_reply, ChatBackend, ChatClient};
pub use dashboard::{Dashboard, DashboardCommand, RandomnessPolling};
pub use oracle_updater::OracleUpdater;
pub use price_client::{HermesClient, PriceSource};
pub use price_poller::{PollerHandle, PricePoller};
pub use randomness::{RandomnessClient, RevealStrategy};
