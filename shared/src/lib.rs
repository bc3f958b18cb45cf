//! Domain vocabulary shared by the settlement reconciler: payment rails, the
//! commerce order payload, per-rail payment records and their state machines,
//! the card gateway envelope, and the capability contracts for the upstream
//! gateways and the commerce platform.

pub mod card;
pub mod clock;
pub mod contracts;
pub mod order;
pub mod rail;
pub mod record;

pub use card::{CardContent, CardEnvelope, CardSignal};
pub use clock::{Clock, ManualClock, SystemClock};
pub use contracts::{
    bounded, AchGatewayClient, CardGatewayClient, CardOrderCreated, CardOrderRequest, CheckStatus,
    CommercePlatformClient, InvoiceCreated, InvoiceRequest, InvoiceStatus,
};
pub use order::{country_and_dial_code, Address, CommerceOrder, Customer};
pub use rail::{Rail, RailTags};
pub use record::{
    format_amount, AchPayment, AchStatus, CardPayment, CardStatus, NewAchPayment, NewCardPayment,
};
