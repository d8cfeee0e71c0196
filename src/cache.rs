pub mod file;

use futures::future::BoxFuture;

use crate::model::Bar;

/// Time-bounded store of normalized bar sequences keyed by request.
///
/// Both operations are infallible at this boundary: a cache that cannot be
/// read behaves as a miss, and a write that fails is dropped.
pub trait BarCache: Send + Sync {
    /// Bars stored under `key` if the entry is younger than the TTL.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Vec<Bar>>>;

    fn put<'a>(&'a self, key: &'a str, bars: &'a [Bar]) -> BoxFuture<'a, ()>;
}
