mod audit;
mod broker_account;
mod channel;
mod credential;
mod execution;
mod preferences;
mod signal;
mod subscriber;
mod user;

pub use audit::*;
pub use broker_account::*;
pub use channel::*;
pub use credential::*;
pub use execution::*;
pub use preferences::*;
pub use signal::*;
pub use subscriber::*;
pub use user::*;
