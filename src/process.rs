//! The processing routine a pool maps over its items.

use crate::error::BoxError;

/// A routine that turns one item into zero or more values.
///
/// The returned sequence is consumed lazily: each value is forwarded to the
/// caller as soon as it is produced. An `Err` element fails the item and
/// stops the worker that was processing it.
///
/// Any `Fn(I) -> impl IntoIterator<Item = Result<V, E>>` closure implements
/// this trait. Implement it on a type when the routine carries settings.
pub trait Process<I>: Send + Sync + 'static {
    type Value: Send + 'static;
    type Error: Into<BoxError>;
    type Values: IntoIterator<Item = Result<Self::Value, Self::Error>>;

    fn process(&self, item: I) -> Self::Values;
}

impl<I, F, It, V, E> Process<I> for F
where
    F: Fn(I) -> It + Send + Sync + 'static,
    It: IntoIterator<Item = Result<V, E>>,
    V: Send + 'static,
    E: Into<BoxError>,
{
    type Value = V;
    type Error = E;
    type Values = It;

    fn process(&self, item: I) -> It {
        self(item)
    }
}
