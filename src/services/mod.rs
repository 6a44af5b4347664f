pub mod ai;
pub mod pipeline;
pub mod queue;
pub mod quota;
pub mod scan;
pub mod storage;
