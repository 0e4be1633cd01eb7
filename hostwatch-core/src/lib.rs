pub mod broadcast;
pub mod sample;

pub use broadcast::{BroadcastSink, ChannelSink, NoopSink};
pub use sample::{LiveUpdate, Sample, SampleSource};
