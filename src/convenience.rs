use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::handle::Broadcaster;
use crate::listener::CancelHandle;
use crate::signal::OneShotFlag;

impl<T> Broadcaster<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Subscribes, then reads until a value equal to one of `targets`
    /// appears or the stream ends (upstream closed or broadcaster
    /// detached), cancelling the subscription either way.
    ///
    /// Returns the matching value, or `None` if the stream ended first.
    pub async fn until(&self, targets: &[T]) -> Option<T> {
        let (mut rx, cancel) = self.listen().await;
        let result = loop {
            match rx.recv().await {
                Some(v) if targets.iter().any(|t| *t == v) => break Some(v),
                Some(_) => continue,
                None => break None,
            }
        };
        cancel.cancel();
        result
    }

    /// Asynchronous variant of [`until`](Self::until): returns immediately
    /// with a receiver that resolves once a match appears, the stream ends,
    /// or the returned handle is cancelled.
    pub fn until_channel(&self, targets: Vec<T>) -> (oneshot::Receiver<Option<T>>, CancelHandle) {
        let signal = Arc::new(OneShotFlag::new());
        let cancel = CancelHandle {
            signal: signal.clone(),
        };
        let (tx, rx) = oneshot::channel();
        let broadcaster = self.clone();
        tokio::spawn(async move {
            let (mut recv, _same_handle) = broadcaster.listen_with(signal.clone()).await;
            let result = loop {
                tokio::select! {
                    _ = signal.wait() => break None,
                    maybe = recv.recv() => match maybe {
                        Some(v) if targets.iter().any(|t| *t == v) => break Some(v),
                        Some(_) => continue,
                        None => break None,
                    },
                }
            };
            signal.fire();
            let _ = tx.send(result);
        });
        (rx, cancel)
    }

    /// As [`until`](Self::until), but also aborts (returning `None`) when
    /// `cancellation` fires.
    pub async fn until_context(&self, cancellation: CancellationToken, targets: &[T]) -> Option<T> {
        let (mut rx, cancel) = self.listen().await;
        let result = tokio::select! {
            _ = cancellation.cancelled() => None,
            result = async {
                loop {
                    match rx.recv().await {
                        Some(v) if targets.iter().any(|t| *t == v) => break Some(v),
                        Some(_) => continue,
                        None => break None,
                    }
                }
            } => result,
        };
        cancel.cancel();
        result
    }
}

#[cfg(test)]
mod tests {
    use crate::handle::Broadcaster;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn until_returns_matching_value() {
        let (tx, rx) = mpsc::channel(4);
        let b = Broadcaster::new(rx);
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        let got = b.until(&[2]).await;
        assert_eq!(got, Some(2));
    }

    #[tokio::test]
    async fn until_returns_none_when_upstream_closes_first() {
        let (tx, rx) = mpsc::channel::<i32>(4);
        let b = Broadcaster::new(rx);
        drop(tx);
        let got = b.until(&[42]).await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn until_context_aborts_on_cancellation() {
        let (_tx, rx) = mpsc::channel::<i32>(4);
        let b = Broadcaster::new(rx);
        let token = CancellationToken::new();
        token.cancel();
        let got = b.until_context(token, &[1]).await;
        assert_eq!(got, None);
    }
}
