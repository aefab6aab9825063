// Money module - Exact fixed-point currency amounts

mod amount;

pub use amount::{Money, MoneyError};
