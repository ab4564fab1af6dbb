pub mod box_keys;
pub mod sealed;
pub mod sign_keys;
