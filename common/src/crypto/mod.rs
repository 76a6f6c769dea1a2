mod address;
mod keypair;

pub use address::*;
pub use keypair::*;
