//! Transparent compression for stream adapters.
//!
//! Readers are wrapped by file extension first and, failing that, by the
//! magic bytes at the start of the stream. Writers are wrapped by extension
//! only. Available codecs depend on features:
//!
//! - **Gzip** (`.gz`): feature `compression-gzip`
//! - **Zstd** (`.zst`): feature `compression-zstd`
//!
//! Without any codec feature both functions are pass-throughs.

use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};

/// A compression format the adapters can read and write.
pub trait CompressionCodec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lowercase extensions including the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    fn magic_bytes(&self) -> Option<&'static [u8]>;

    fn wrap_reader(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>>;

    fn wrap_writer(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn Write>>;
}

/// Built-in codecs enabled for this build.
pub fn codecs() -> Vec<Box<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Box::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Box::new(ZstdCodec),
    ]
}

/// Codec matching the extension of `hint`, case-insensitively.
pub fn detect_from_extension(hint: &str) -> Option<Box<dyn CompressionCodec>> {
    let lower = hint.to_lowercase();
    codecs()
        .into_iter()
        .find(|c| c.extensions().iter().any(|ext| lower.ends_with(ext)))
}

/// Peek at the buffered start of `reader`; the reader is not advanced.
fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<Box<dyn CompressionCodec>> {
    let buf = reader.fill_buf().ok()?;
    if buf.is_empty() {
        return None;
    }
    codecs()
        .into_iter()
        .find(|c| c.magic_bytes().is_some_and(|magic| buf.starts_with(magic)))
}

/// Wrap `reader` with a decompressor if `hint` or the content says so.
pub fn auto_detect_reader<R: Read + 'static>(reader: R, hint: &str) -> io::Result<Box<dyn Read>> {
    if let Some(codec) = detect_from_extension(hint) {
        tracing::debug!(resource = hint, codec = codec.name(), "decompressing by extension");
        return codec.wrap_reader(Box::new(reader));
    }
    let mut buffered = BufReader::new(reader);
    if let Some(codec) = detect_from_magic(&mut buffered) {
        tracing::debug!(resource = hint, codec = codec.name(), "decompressing by magic bytes");
        return codec.wrap_reader(Box::new(buffered));
    }
    Ok(Box::new(buffered))
}

/// Wrap `writer` with a compressor when the extension of `hint` names one.
pub fn auto_detect_writer<W: Write + 'static>(writer: W, hint: &str) -> io::Result<Box<dyn Write>> {
    match detect_from_extension(hint) {
        Some(codec) => codec.wrap_writer(Box::new(BufWriter::new(writer))),
        None => Ok(Box::new(BufWriter::new(writer))),
    }
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn Write>> {
        Ok(Box::new(flate2::write::GzEncoder::new(writer, flate2::Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn Write>> {
        zstd::stream::write::Encoder::new(writer, 3).map(|e| Box::new(e.auto_finish()) as Box<dyn Write>)
    }
}
