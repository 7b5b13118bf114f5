pub mod asset;
pub mod company;
pub mod engine_log;
pub mod order;
pub mod transaction;
pub mod user;

pub use asset::*;
pub use company::*;
pub use engine_log::*;
pub use order::*;
pub use transaction::*;
pub use user::*;
