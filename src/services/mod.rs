pub mod confidence;
pub mod detector;
pub mod hasher;
pub mod record;
pub mod store;
