pub mod processor;
pub mod queue;
pub mod store;
pub mod upscaler;
pub mod worker;
