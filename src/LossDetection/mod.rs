//! Loss detection (receiver side: decide when to NAK a gap) and
//! retransmission (sender side: decide whether to honour a NAK or
//! suppress it as a duplicate already in flight).

mod loss_detector;
mod retransmit_handler;

pub use loss_detector::{LossDetector, NakRequest};
pub use retransmit_handler::RetransmitHandler;
