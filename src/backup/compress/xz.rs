use crate::backup::result_error::result::Result;
use liblzma::stream::{Check, MtStreamBuilder};
use liblzma::write::XzEncoder;
use std::io::Write;
use std::num::NonZero;

/// Default compression level (balance of speed vs size)
static DEFAULT_COMPRESSION_LEVEL: u32 = 6;
/// Maximum threads to prevent resource exhaustion
static DEFAULT_MAX_PARALLELIZATION: usize = 32;

/// Half of the available cores, at least one and at most
/// [`DEFAULT_MAX_PARALLELIZATION`].
fn default_thread_count() -> u32 {
    std::thread::available_parallelism()
        .map(NonZero::get)
        .map(|core| core / 2)
        .map(|t| t.clamp(1, DEFAULT_MAX_PARALLELIZATION) as u32)
        .unwrap_or(1)
}

/// Creates an XZ encoder, multi-threaded when more than one thread is available.
pub fn build_xz_encoder<W: Write>(writer: W, thread: Option<u32>) -> Result<XzEncoder<W>> {
    let level = DEFAULT_COMPRESSION_LEVEL;
    let thread = thread.unwrap_or_else(default_thread_count).max(1);

    tracing::debug!("Creating XZ compressor with level={}, threads={}", level, thread);

    if thread == 1 {
        Ok(XzEncoder::new(writer, level))
    } else {
        let stream = MtStreamBuilder::new()
            .preset(level)
            .check(Check::Crc64)
            .threads(thread)
            .encoder()?;
        Ok(XzEncoder::new_stream(writer, stream))
    }
}
