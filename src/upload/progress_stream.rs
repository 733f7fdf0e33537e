use std::pin::Pin;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use super::transport::ChunkProgressFn;

pin_project! {
    /// 包装分片体流，按 poll 出的字节数回调累计进度
    pub struct CountingStream<S> {
        #[pin]
        inner: S,
        callback: ChunkProgressFn,
        bytes_sent: u64,
    }
}

impl<S> CountingStream<S> {
    pub fn new(inner: S, callback: ChunkProgressFn) -> Self {
        Self {
            inner,
            callback,
            bytes_sent: 0,
        }
    }
}

impl<S> Stream for CountingStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let len = chunk.len() as u64;
                if len > 0 {
                    *this.bytes_sent += len;
                    (this.callback)(*this.bytes_sent);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                // 流结束时补一次最终值
                (this.callback)(*this.bytes_sent);
                Poll::Ready(None)
            }
            other => other,
        }
    }
}
