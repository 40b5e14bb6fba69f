pub mod carrier;
pub mod token;

pub use carrier::{Carrier, CarrierError, CarrierInput};
pub use token::{ResetClaims, TokenError};
