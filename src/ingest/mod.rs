/// Feed download and the dedup/insert pipeline.
pub mod nmdb;
pub mod pipeline;
