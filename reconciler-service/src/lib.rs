pub mod ach_callback;
pub mod api;
pub mod card_webhook;
pub mod clients;
pub mod intake;
pub mod models;
pub mod poller;
pub mod schedule;
pub mod schema;
pub mod store;

pub use ach_callback::{AchCallbackHandler, CallbackOutcome};
pub use card_webhook::{CardWebhookHandler, WebhookOutcome};
pub use intake::{IntakeOutcome, OrderIntake};
pub use poller::{PollerConfig, ReconciliationPoller, Step, SweepReport};
pub use schedule::{PollSchedule, WindowSlot};
pub use store::{InMemoryPaymentStore, Inserted, PaymentStore, PgPaymentStore};
