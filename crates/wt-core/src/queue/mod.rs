//! Producer/consumer bridging between transport delivery and dispatch.
//!
//! ```text
//!  reader task ──feed()──► BridgingQueue ──next()──► ConsumptionSequence ──► dispatcher
//!                         (two-stack FIFO +          (Claim releases the
//!                          single-flight marker)      marker on drop)
//! ```

pub mod bridging;
pub mod sequence;
pub mod stack;

pub use bridging::{BridgingQueue, ConsumedState, NextResult};
pub use sequence::{Claim, ConsumptionSequence, SequenceResult};
pub use stack::TwoStackQueue;
