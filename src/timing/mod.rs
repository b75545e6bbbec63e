mod position;
mod scheduler;
mod source;
mod tempo;

pub use position::{ResolvedPosition, ResolvedRecord, Resolver, SparseTimingRecord, resolve_all};
pub use scheduler::{ReleasePolicy, Schedule, Scheduler, schedule_records};
pub use source::{ChannelSource, EventSource, LazySource, NextEvent, PrecomputedSource};
pub use tempo::{MAX_BPM, MIN_BPM, Tempo, TimeSignature};
