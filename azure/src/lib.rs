//! Azure control-plane access for the harness
//!
//! Raw ARM REST over `reqwest`, Kudu zip deployment, Azure Monitor reads and
//! plain HTTP probing, each behind a mockable trait.

pub mod error;
pub mod services;
pub mod traits;
pub mod types;

pub use error::{AzureError, AzureResult};
pub use services::*;
pub use traits::*;
pub use types::*;
