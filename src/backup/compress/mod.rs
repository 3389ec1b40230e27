pub mod xz;

use crate::backup::finish::Finish;
use crate::backup::result_error::error::ConfigError;
use crate::backup::result_error::result::Result;
use derive_more::{Display, From};
use flate2::write::GzEncoder;
use io_enum::Write;
use liblzma::write::XzEncoder;
use std::io;
use std::io::Write;
use std::str::FromStr;

#[derive(Write, From)]
pub enum Compressor<W: Write> {
    Gzip(GzEncoder<W>),
    Xz(XzEncoder<W>),
}

impl<W: Write> Finish<W> for Compressor<W> {
    fn finish(self) -> io::Result<W> {
        match self {
            Compressor::Gzip(w) => w.finish(),
            Compressor::Xz(w) => w.finish(),
        }
    }
}

/// Compression applied to packaged file archives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
pub enum Compression {
    #[default]
    #[display("gzip")]
    Gzip,
    #[display("xz")]
    Xz,
}

impl Compression {
    /// Extension of a compressed tarball.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::Gzip => "tgz",
            Compression::Xz => "txz",
        }
    }

    pub fn build_compressor<W: Write>(&self, writer: W) -> Result<Compressor<W>> {
        match self {
            Compression::Gzip => Ok(GzEncoder::new(writer, flate2::Compression::default()).into()),
            Compression::Xz => xz::build_xz_encoder(writer, None).map(Compressor::from),
        }
    }
}

impl FromStr for Compression {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gzip" | "gz" | "tgz" => Ok(Compression::Gzip),
            "xz" | "txz" => Ok(Compression::Xz),
            other => Err(ConfigError::invalid(format!(
                "Unknown compression {other}, expected gzip or xz"
            ))),
        }
    }
}
