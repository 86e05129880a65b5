use std::any::Any;

use futures::stream::{self, select_all, SelectAll, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ConvergeError;

/// A value from one of two converged sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Converged2<A, B> {
    First(A),
    Second(B),
}

/// A value from one of three converged sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Converged3<A, B, C> {
    First(A),
    Second(B),
    Third(C),
}

/// Merges two receivers into a single stream, tagging each item with which
/// source it came from. Ends once both sources are exhausted.
///
/// Grounded on the original's `Converge2`, which fans into an untyped
/// `chan any`; an enum is the idiomatic Rust stand-in for the tag Go has to
/// carry at runtime.
pub fn converge2<A, B>(a: mpsc::Receiver<A>, b: mpsc::Receiver<B>) -> mpsc::Receiver<Converged2<A, B>>
where
    A: Send + 'static,
    B: Send + 'static,
{
    let left = ReceiverStream::new(a).map(Converged2::First);
    let right = ReceiverStream::new(b).map(Converged2::Second);
    spawn_forwarder(stream::select(left, right))
}

/// As [`converge2`], but for three sources.
pub fn converge3<A, B, C>(
    a: mpsc::Receiver<A>,
    b: mpsc::Receiver<B>,
    c: mpsc::Receiver<C>,
) -> mpsc::Receiver<Converged3<A, B, C>>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
{
    let first = ReceiverStream::new(a).map(Converged3::First);
    let second = ReceiverStream::new(b).map(Converged3::Second);
    let third = ReceiverStream::new(c).map(Converged3::Third);
    spawn_forwarder(select_all([first.boxed(), second.boxed(), third.boxed()]))
}

/// Merges any number of same-typed receivers into one. An empty `sources`
/// yields an immediately-closed receiver.
pub fn converge_n<T>(sources: Vec<mpsc::Receiver<T>>) -> mpsc::Receiver<T>
where
    T: Send + 'static,
{
    let streams: SelectAll<_> = select_all(sources.into_iter().map(|rx| ReceiverStream::new(rx).boxed()));
    spawn_forwarder(streams)
}

/// A type-erased receiver used by [`converge_dyn`], the dynamic analogue of
/// Go's `ConvergeN(...any)` (which leans on `reflect.Select`). Rust has no
/// such runtime channel reflection, so instead of reflecting over arbitrary
/// values, each source is downcast once at construction time against the
/// caller-declared `T`.
pub struct ErasedSource<T> {
    rx: mpsc::Receiver<T>,
}

impl<T: Send + 'static> ErasedSource<T> {
    /// Attempts to recover a typed receiver from a boxed one. Returns
    /// [`ConvergeError::NotAChannel`] if `boxed` isn't actually a
    /// `mpsc::Receiver<T>` — the recoverable counterpart to the panic the
    /// Go original raises for a non-channel argument.
    pub fn try_from_any(index: usize, boxed: Box<dyn Any + Send>) -> Result<Self, ConvergeError> {
        match boxed.downcast::<mpsc::Receiver<T>>() {
            Ok(rx) => Ok(Self { rx: *rx }),
            Err(_) => Err(ConvergeError::NotAChannel { index }),
        }
    }
}

/// Merges a dynamically-sized, runtime-checked set of same-typed sources.
/// Construction fails fast (before any task is spawned) if any entry was not
/// actually a `mpsc::Receiver<T>`.
pub fn converge_dyn<T>(boxed_sources: Vec<Box<dyn Any + Send>>) -> Result<mpsc::Receiver<T>, ConvergeError>
where
    T: Send + 'static,
{
    let sources = boxed_sources
        .into_iter()
        .enumerate()
        .map(|(index, boxed)| ErasedSource::<T>::try_from_any(index, boxed).map(|s| s.rx))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(converge_n(sources))
}

fn spawn_forwarder<S, T>(mut merged: S) -> mpsc::Receiver<T>
where
    S: futures::Stream<Item = T> + Send + Unpin + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        while let Some(item) = merged.next().await {
            if tx.send(item).await.is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn converge2_tags_both_sources() {
        let (atx, arx) = mpsc::channel::<i32>(4);
        let (btx, brx) = mpsc::channel::<&'static str>(4);
        atx.send(1).await.unwrap();
        btx.send("hi").await.unwrap();
        drop(atx);
        drop(btx);

        let mut merged = converge2(arx, brx);
        let mut got = Vec::new();
        while let Some(v) = merged.recv().await {
            got.push(v);
        }
        assert_eq!(got.len(), 2);
        assert!(got.contains(&Converged2::First(1)));
        assert!(got.contains(&Converged2::Second("hi")));
    }

    #[tokio::test]
    async fn converge_n_empty_closes_immediately() {
        let mut merged = converge_n::<i32>(Vec::new());
        assert_eq!(merged.recv().await, None);
    }

    #[tokio::test]
    async fn converge_dyn_rejects_wrong_type() {
        let boxed: Box<dyn Any + Send> = Box::new(42_i32);
        let err = converge_dyn::<i32>(vec![boxed]).unwrap_err();
        assert!(matches!(err, ConvergeError::NotAChannel { index: 0 }));
    }

    #[tokio::test]
    async fn converge_dyn_merges_typed_sources() {
        let (atx, arx) = mpsc::channel::<i32>(4);
        let (btx, brx) = mpsc::channel::<i32>(4);
        atx.send(1).await.unwrap();
        btx.send(2).await.unwrap();
        drop(atx);
        drop(btx);

        let boxed_a: Box<dyn Any + Send> = Box::new(arx);
        let boxed_b: Box<dyn Any + Send> = Box::new(brx);
        let mut merged = converge_dyn::<i32>(vec![boxed_a, boxed_b]).unwrap();
        let mut got = Vec::new();
        while let Some(v) = merged.recv().await {
            got.push(v);
        }
        got.sort_unstable();
        assert_eq!(got, vec![1, 2]);
    }
}
