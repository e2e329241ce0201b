pub mod bus;
pub mod error;
pub mod secret;
pub mod types;

pub use bus::{BusEvent, EventBus};
pub use error::{Error, Result};
pub use secret::{EnvSecretReader, SecretReader};
pub use types::*;
