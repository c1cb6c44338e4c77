pub mod backup;
pub mod batch;
pub mod cancel;
pub mod error;
pub mod events;
pub mod ffmpeg;
pub mod paths;
pub mod session;
pub mod sidecar_api;
#[cfg(test)]
mod test_util;

pub use cancel::CancelToken;
pub use error::{ConvertError, ErrorKind};
pub use events::{Notifier, ProgressEvent, ProgressSink, SessionEvent, StatusSink};
pub use ffmpeg::ConvertOptions;
pub use paths::{MediaKind, resolve_output_path};
pub use session::{ConversionOutcome, ConversionSession, SessionState};
