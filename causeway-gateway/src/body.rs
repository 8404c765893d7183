//! Response body carrying optional HTTP/2 trailers.
//!
//! gRPC status lives in trailers, which `Full`-style bodies cannot carry;
//! this body yields at most one data frame followed by at most one trailer
//! frame.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};

#[derive(Debug, Default)]
pub struct GatewayBody {
    data: Option<Bytes>,
    trailers: Option<HeaderMap>,
}

impl GatewayBody {
    pub fn empty() -> GatewayBody {
        GatewayBody::default()
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> GatewayBody {
        GatewayBody {
            data: Some(data.into()),
            trailers: None,
        }
    }

    pub fn with_trailers(data: impl Into<Bytes>, trailers: HeaderMap) -> GatewayBody {
        let data: Bytes = data.into();
        GatewayBody {
            data: (!data.is_empty()).then_some(data),
            trailers: Some(trailers),
        }
    }

    /// Trailers without any data frame (gRPC trailers-only responses).
    pub fn trailers_only(trailers: HeaderMap) -> GatewayBody {
        GatewayBody {
            data: None,
            trailers: Some(trailers),
        }
    }
}

impl Body for GatewayBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if let Some(data) = this.data.take() {
            return Poll::Ready(Some(Ok(Frame::data(data))));
        }
        if let Some(trailers) = this.trailers.take() {
            return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
        }
        Poll::Ready(None)
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none() && self.trailers.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        match (&self.data, &self.trailers) {
            (Some(data), None) => SizeHint::with_exact(data.len() as u64),
            (None, None) => SizeHint::with_exact(0),
            _ => SizeHint::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn yields_data_then_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("grpc-status", "0".parse().unwrap());
        let body = GatewayBody::with_trailers(Bytes::from_static(b"abc"), trailers);
        let collected = body.collect().await.unwrap();
        assert_eq!(
            collected.trailers().and_then(|t| t.get("grpc-status")),
            Some(&"0".parse().unwrap())
        );
        assert_eq!(collected.to_bytes(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn empty_body_ends_immediately() {
        let body = GatewayBody::empty();
        assert!(body.is_end_stream());
        let collected = body.collect().await.unwrap();
        assert!(collected.to_bytes().is_empty());
    }
}
