use flate2::write::GzEncoder;
use liblzma::write::XzEncoder;
use std::io::{Error, Write};

/// Flushes trailing bytes of a layered writer and hands back the inner writer.
pub trait Finish<O> {
    fn finish(self) -> Result<O, Error>;
}

impl<W: Write> Finish<W> for XzEncoder<W> {
    fn finish(self) -> Result<W, Error> {
        self.finish()
    }
}

impl<W: Write> Finish<W> for GzEncoder<W> {
    fn finish(self) -> Result<W, Error> {
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use flate2::Compression;
    use std::io::{Cursor, Read};

    struct TestFinisher {
        inner: Cursor<Vec<u8>>,
        should_fail: bool,
    }

    impl Finish<Cursor<Vec<u8>>> for TestFinisher {
        fn finish(self) -> Result<Cursor<Vec<u8>>, Error> {
            if self.should_fail {
                Err(Error::other("Test failure"))
            } else {
                Ok(self.inner)
            }
        }
    }

    #[test]
    fn test_finish_trait_failure() {
        let finisher = TestFinisher {
            inner: Cursor::new(vec![1, 2, 3]),
            should_fail: true,
        };

        let error = finisher.finish().unwrap_err();
        assert_eq!(error.to_string(), "Test failure");
    }

    #[test]
    fn test_gz_encoder_finish_writes_trailer() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"dump").unwrap();
        let bytes = Finish::finish(encoder).unwrap();

        let mut decoded = String::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "dump");
    }

    #[test]
    fn test_xz_encoder_finish_impl() {
        let encoder = XzEncoder::new(Cursor::new(Vec::new()), 1);
        assert!(Finish::finish(encoder).is_ok());
    }
}
