//! Reference nodes built purely on the runtime.

pub mod buffer;
pub mod filter;
pub mod sink;
pub mod source;
pub mod supervisor;

pub use buffer::MediaBuffer;
pub use filter::PacketFilter;
pub use sink::MediaSink;
pub use source::SingleSource;
pub use supervisor::Supervisor;
