mod progress;
mod stream;

pub use progress::{ProgressEmitter, ProgressEvent, ProgressStatus};
pub use stream::StreamMessage;
