//! Codec provider interfaces.
//!
//! Actual encoders and decoders wrap external processes and live outside
//! this crate; the runtime only needs a registry that resolves them by
//! MIME type and the stream-to-stream transform contracts below. A raw
//! passthrough codec is provided for media that needs no transcoding.

use crate::error::{MediaBusError, Result};
use crate::media::Metadata;
use crate::stream::MediaStream;
use std::sync::Arc;

/// Decodes an encoded byte stream into raw media data.
pub trait Decoder: Send + Sync {
    /// MIME types this decoder understands.
    fn mime_types(&self) -> &[&str];

    /// Returns a stream of decoded data read from `input`.
    fn decode(&self, input: Box<dyn MediaStream>) -> Result<Box<dyn MediaStream>>;
}

/// Encodes raw media data into a target format.
pub trait Encoder: Send + Sync {
    /// MIME types this encoder produces.
    fn mime_types(&self) -> &[&str];

    /// Returns a stream of encoded data read from `input`. Metadata may
    /// influence the encoding (e.g. a bitrate hint).
    fn encode(&self, input: Box<dyn MediaStream>, metadata: &Metadata)
        -> Result<Box<dyn MediaStream>>;
}

/// Registry of codecs, resolved by MIME type.
#[derive(Default)]
pub struct CodecRegistry {
    encoders: Vec<Arc<dyn Encoder>>,
    decoders: Vec<Arc<dyn Decoder>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_encoder(&mut self, codec: Arc<dyn Encoder>) {
        self.encoders.push(codec);
    }

    pub fn register_decoder(&mut self, codec: Arc<dyn Decoder>) {
        self.decoders.push(codec);
    }

    /// The first registered encoder producing `mime`.
    pub fn encoder(&self, mime: &str) -> Result<Arc<dyn Encoder>> {
        self.encoders
            .iter()
            .find(|c| c.mime_types().contains(&mime))
            .cloned()
            .ok_or_else(|| MediaBusError::Codec(format!("no encoder for {mime}")))
    }

    /// The first registered decoder understanding `mime`.
    pub fn decoder(&self, mime: &str) -> Result<Arc<dyn Decoder>> {
        self.decoders
            .iter()
            .find(|c| c.mime_types().contains(&mime))
            .cloned()
            .ok_or_else(|| MediaBusError::Codec(format!("no decoder for {mime}")))
    }
}

/// Passthrough codec: the encoded form is the raw form.
pub struct RawCodec;

impl Decoder for RawCodec {
    fn mime_types(&self) -> &[&str] {
        &["application/octet-stream"]
    }

    fn decode(&self, input: Box<dyn MediaStream>) -> Result<Box<dyn MediaStream>> {
        Ok(input)
    }
}

impl Encoder for RawCodec {
    fn mime_types(&self) -> &[&str] {
        &["application/octet-stream"]
    }

    fn encode(
        &self,
        input: Box<dyn MediaStream>,
        _metadata: &Metadata,
    ) -> Result<Box<dyn MediaStream>> {
        Ok(input)
    }
}
