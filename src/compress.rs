//! svgz containers.

use std::io::Write;

use flate2::write::GzEncoder;

use crate::Compression;
use crate::error::CrispyError;

/// Wrap `svg` in the requested container. `Compression::None` returns the
/// bytes unchanged.
pub fn compress(svg: Vec<u8>, compression: Compression, gzip_level: u32) -> Result<Vec<u8>, CrispyError> {
    match compression {
        Compression::None => Ok(svg),
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::new(gzip_level));
            encoder.write_all(&svg)?;
            Ok(encoder.finish()?)
        }
        Compression::Zopfli => {
            let mut out = Vec::new();
            zopfli::compress(
                zopfli::Options::default(),
                zopfli::Format::Gzip,
                svg.as_slice(),
                &mut out,
            )?;
            Ok(out)
        }
    }
}
