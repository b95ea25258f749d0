pub mod device;
pub mod peer;
