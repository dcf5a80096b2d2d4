pub mod optimize;
pub mod risk;
