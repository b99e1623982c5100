//! The `decompress_body` step.
//!
//! Undoes the codings listed in `content-encoding` (gzip, deflate, br, zstd),
//! last applied first.

use std::io::Read;

use bytes::Bytes;
use tracing::debug;

use crate::{
    Error, Exchange, Method, RequestContext, ResponseBody, ResponseContext, Result, StepResult,
};

/// A `content-encoding` coding this step can undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coding {
    Gzip,
    Deflate,
    Brotli,
    Zstd,
    Identity,
}

impl Coding {
    fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            "br" => Some(Self::Brotli),
            "zstd" => Some(Self::Zstd),
            "identity" | "" => Some(Self::Identity),
            _ => None,
        }
    }
}

pub(super) fn decompress_body(request: RequestContext, mut response: ResponseContext) -> StepResult {
    let empty = response.body().as_bytes().is_some_and(Bytes::is_empty);
    if request.options().is_raw() || request.method() == Method::Head || empty {
        return StepResult::Continue(Exchange::Response(request, response));
    }
    let Some(encoding) = response.header("content-encoding") else {
        return StepResult::Continue(Exchange::Response(request, response));
    };
    let codings: Option<Vec<Coding>> = encoding.split(',').map(Coding::parse).collect();
    let (Some(codings), ResponseBody::Bytes(body)) = (codings, response.body()) else {
        debug!(%encoding, "unsupported content-encoding, body left as is");
        return StepResult::Continue(Exchange::Response(request, response));
    };

    let mut body = body.clone();
    for coding in codings.into_iter().rev() {
        body = match decompress(coding, body) {
            Ok(body) => body,
            Err(err) => {
                return StepResult::halt_with(Exchange::Response(request, response), err);
            }
        };
    }

    let headers = response.headers_mut();
    headers.remove("content-encoding");
    headers.insert("content-length", body.len().to_string());
    response.set_body(body);
    StepResult::Continue(Exchange::Response(request, response))
}

fn decompress(coding: Coding, body: Bytes) -> Result<Bytes> {
    let result = match coding {
        Coding::Gzip => {
            let mut decoder = flate2::read::GzDecoder::new(body.as_ref());
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| Error::decode(format!("gzip decompression failed: {e}")))?;
            Bytes::from(decompressed)
        }
        Coding::Deflate => {
            let mut decoder = flate2::read::DeflateDecoder::new(body.as_ref());
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| Error::decode(format!("deflate decompression failed: {e}")))?;
            Bytes::from(decompressed)
        }
        Coding::Brotli => {
            let mut decompressed = Vec::new();
            brotli::BrotliDecompress(&mut body.as_ref(), &mut decompressed)
                .map_err(|e| Error::decode(format!("brotli decompression failed: {e}")))?;
            Bytes::from(decompressed)
        }
        Coding::Zstd => {
            let decompressed = zstd::decode_all(body.as_ref())
                .map_err(|e| Error::decode(format!("zstd decompression failed: {e}")))?;
            Bytes::from(decompressed)
        }
        Coding::Identity => body,
    };

    Ok(result)
}
